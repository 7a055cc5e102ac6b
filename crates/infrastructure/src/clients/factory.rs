//! Client construction and connection cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use domain::{Backend, BackendClient, BackendKind, ClientFactory, DomainError};

use crate::clients::{RtorrentClient, TransmissionClient};

/// One cached client per backend id, keyed by the record's version counter.
/// An updated record or an explicit invalidation forces a reconnect;
/// concurrent callers share the cached client's RPC channel.
pub struct CachedClientFactory {
    cache: Mutex<HashMap<String, (i64, Arc<dyn BackendClient>)>>,
}

impl CachedClientFactory {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn build(backend: &Backend) -> Result<Arc<dyn BackendClient>, DomainError> {
        Ok(match backend.kind {
            BackendKind::Rtorrent => Arc::new(RtorrentClient::from_backend(backend)?),
            BackendKind::Transmission => Arc::new(TransmissionClient::from_backend(backend)?),
        })
    }
}

impl Default for CachedClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientFactory for CachedClientFactory {
    fn client_for(&self, backend: &Backend) -> Result<Arc<dyn BackendClient>, DomainError> {
        let mut cache = self.cache.lock().expect("client cache poisoned");
        if let Some((version, client)) = cache.get(&backend.id) {
            if *version == backend.version {
                return Ok(Arc::clone(client));
            }
        }
        debug!(backend = %backend.name, version = backend.version, "Constructing backend client");
        let client = Self::build(backend)?;
        cache.insert(backend.id.clone(), (backend.version, Arc::clone(&client)));
        Ok(client)
    }

    fn invalidate(&self, backend_id: &str) {
        self.cache
            .lock()
            .expect("client cache poisoned")
            .remove(backend_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn backend(version: i64) -> Backend {
        Backend {
            id: "b1".to_string(),
            user_id: "u1".to_string(),
            name: "box".to_string(),
            kind: BackendKind::Rtorrent,
            host: "localhost".to_string(),
            port: 9080,
            rpc_path: None,
            use_ssl: false,
            username: None,
            password: None,
            enabled: true,
            is_default: false,
            version,
            last_used_at: None,
            created_at: Utc::now().naive_utc(),
            http_download: None,
            mount_path: None,
            download_dir: None,
            auto_download: None,
            ssh: None,
        }
    }

    #[test]
    fn same_version_shares_one_client() {
        let factory = CachedClientFactory::new();
        let a = factory.client_for(&backend(1)).unwrap();
        let b = factory.client_for(&backend(1)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn version_bump_reconstructs() {
        let factory = CachedClientFactory::new();
        let a = factory.client_for(&backend(1)).unwrap();
        let b = factory.client_for(&backend(2)).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn invalidate_discards_cached_client() {
        let factory = CachedClientFactory::new();
        let a = factory.client_for(&backend(1)).unwrap();
        factory.invalidate("b1");
        let b = factory.client_for(&backend(1)).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
