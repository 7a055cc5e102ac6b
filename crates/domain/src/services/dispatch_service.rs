//! Per-user aggregation and routing over all configured backends.
//!
//! Reads fan out concurrently to every enabled backend; a failing backend
//! degrades to an entry in the `errors` sidecar, never a failed request.
//! Writes route to an explicit backend, or search in default →
//! most-recently-used → remaining-enabled order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::clients::{BackendClient, ClientFactory, FileView, TorrentView};
use crate::entities::{Action, ActionKind, Backend, Torrent};
use crate::errors::DomainError;
use crate::magnet;
use crate::repositories::{ActionRepository, BackendRepository, TorrentRepository};
use crate::services::{ActivityService, EventBus, EventKind};
use crate::torrent_file;

pub const DEFAULT_FANOUT_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub fanout_timeout: Duration,
    pub public_seed_duration: i64,
    pub private_seed_duration: i64,
    pub max_gap_seconds: i64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            fanout_timeout: Duration::from_secs(DEFAULT_FANOUT_TIMEOUT_SECONDS),
            public_seed_duration: 24 * 3600,
            private_seed_duration: 7 * 24 * 3600,
            max_gap_seconds: 300,
        }
    }
}

/// One backend's failure inside a fan-out read.
#[derive(Debug, Clone, Serialize)]
pub struct BackendError {
    pub server_id: String,
    pub server_name: String,
    pub message: String,
}

/// A torrent view tagged with its backend and seeding bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedTorrent {
    #[serde(flatten)]
    pub view: TorrentView,
    pub server_id: String,
    pub server_name: String,
    pub server_type: String,
    pub seeding_duration: i64,
    pub seed_threshold: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregatedList {
    pub torrents: Vec<AggregatedTorrent>,
    pub errors: Vec<BackendError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionTest {
    Connected,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct AddTorrentRequest {
    pub uri: String,
    pub backend_id: String,
    pub start: bool,
    pub priority: i32,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AddOutcome {
    pub info_hash: Option<String>,
    pub name: Option<String>,
    pub message: String,
}

pub struct DispatchService {
    backends: Arc<dyn BackendRepository>,
    torrents: Arc<dyn TorrentRepository>,
    actions: Arc<dyn ActionRepository>,
    activity: Arc<ActivityService>,
    factory: Arc<dyn ClientFactory>,
    events: EventBus,
    config: DispatchConfig,
}

impl DispatchService {
    pub fn new(
        backends: Arc<dyn BackendRepository>,
        torrents: Arc<dyn TorrentRepository>,
        actions: Arc<dyn ActionRepository>,
        activity: Arc<ActivityService>,
        factory: Arc<dyn ClientFactory>,
        events: EventBus,
        config: DispatchConfig,
    ) -> Self {
        Self {
            backends,
            torrents,
            actions,
            activity,
            factory,
            events,
            config,
        }
    }

    /// A backend the user owns, or `NotFound` (ownership is never disclosed).
    pub async fn owned_backend(
        &self,
        user_id: &str,
        backend_id: &str,
    ) -> Result<Backend, DomainError> {
        match self.backends.find_by_id(backend_id).await? {
            Some(backend) if backend.user_id == user_id => Ok(backend),
            _ => Err(DomainError::NotFound(format!("Server {backend_id}"))),
        }
    }

    /// List torrents across one backend or all enabled backends.
    pub async fn list_torrents(
        &self,
        user_id: &str,
        backend_id: Option<&str>,
    ) -> Result<AggregatedList, DomainError> {
        let targets = match backend_id {
            Some(id) => vec![self.owned_backend(user_id, id).await?],
            None => self.backends.list_for_user(user_id, true).await?,
        };

        let mut tasks: JoinSet<(Backend, Result<Vec<TorrentView>, DomainError>)> = JoinSet::new();
        let mut errors = Vec::new();
        let timeout = self.config.fanout_timeout;

        for backend in targets {
            let client = match self.factory.client_for(&backend) {
                Ok(client) => client,
                Err(e) => {
                    errors.push(backend_error(&backend, &e.to_string()));
                    continue;
                }
            };
            tasks.spawn(async move {
                let result = match tokio::time::timeout(timeout, client.list_torrents(None, false))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(DomainError::BackendFailure(format!(
                        "Timed out after {}s",
                        timeout.as_secs()
                    ))),
                };
                (backend, result)
            });
        }

        let mut torrents = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (backend, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("Fan-out task panicked: {e}");
                    continue;
                }
            };
            match result {
                Ok(views) => {
                    for view in views {
                        torrents.push(self.annotate(view, &backend).await);
                    }
                }
                Err(e) => {
                    warn!(server = %backend.name, "Failed to list torrents: {e}");
                    errors.push(backend_error(&backend, &e.to_string()));
                }
            }
        }

        let added = self.added_at_index(user_id).await?;
        for torrent in &mut torrents {
            torrent.added_at = added
                .get(&(torrent.view.info_hash.clone(), torrent.server_id.clone()))
                .copied();
        }
        sort_aggregated(&mut torrents);

        Ok(AggregatedList { torrents, errors })
    }

    /// One torrent, routed like a write and annotated like a read.
    pub async fn get_torrent(
        &self,
        user_id: &str,
        info_hash: &str,
        backend_id: Option<&str>,
    ) -> Result<AggregatedTorrent, DomainError> {
        let (backend, _, view) = self.locate(user_id, info_hash, backend_id).await?;
        let mut aggregated = self.annotate(view, &backend).await;
        aggregated.added_at = self
            .torrents
            .get(user_id, &aggregated.view.info_hash, &backend.id)
            .await?
            .map(|t| t.added_at);
        Ok(aggregated)
    }

    pub async fn start(
        &self,
        user_id: &str,
        info_hash: &str,
        backend_id: Option<&str>,
    ) -> Result<(), DomainError> {
        let (backend, client, view) = self.locate(user_id, info_hash, backend_id).await?;
        client.start(&view.info_hash).await?;
        self.record_action(&backend, &view.info_hash, ActionKind::Start, None)
            .await?;
        self.events.publish(
            EventKind::Started,
            user_id,
            Some(&backend.id),
            Some(&view.info_hash),
            json!({ "name": view.name }),
        );
        Ok(())
    }

    pub async fn stop(
        &self,
        user_id: &str,
        info_hash: &str,
        backend_id: Option<&str>,
    ) -> Result<(), DomainError> {
        let (backend, client, view) = self.locate(user_id, info_hash, backend_id).await?;
        client.stop(&view.info_hash).await?;
        self.record_action(&backend, &view.info_hash, ActionKind::Stop, None)
            .await?;
        self.events.publish(
            EventKind::Stopped,
            user_id,
            Some(&backend.id),
            Some(&view.info_hash),
            json!({ "name": view.name }),
        );
        Ok(())
    }

    pub async fn erase(
        &self,
        user_id: &str,
        info_hash: &str,
        backend_id: Option<&str>,
        delete_data: bool,
    ) -> Result<(), DomainError> {
        let (backend, client, view) = self.locate(user_id, info_hash, backend_id).await?;
        client.erase(&view.info_hash, delete_data).await?;
        self.torrents
            .delete(user_id, &view.info_hash, &backend.id)
            .await?;
        self.record_action(
            &backend,
            &view.info_hash,
            ActionKind::Remove,
            delete_data.then(|| "delete_data".to_string()),
        )
        .await?;
        self.events.publish(
            EventKind::Removed,
            user_id,
            Some(&backend.id),
            Some(&view.info_hash),
            json!({ "name": view.name, "delete_data": delete_data }),
        );
        info!(info_hash = %view.info_hash, server = %backend.name, "Removed torrent");
        Ok(())
    }

    pub async fn files(
        &self,
        user_id: &str,
        info_hash: &str,
        backend_id: Option<&str>,
    ) -> Result<(Backend, TorrentView, Vec<FileView>), DomainError> {
        let (backend, client, view) = self.locate(user_id, info_hash, backend_id).await?;
        let files = client.files(&view.info_hash).await?;
        Ok((backend, view, files))
    }

    pub async fn set_priority(
        &self,
        user_id: &str,
        info_hash: &str,
        backend_id: Option<&str>,
        file_index: Option<i32>,
        priority: i32,
    ) -> Result<(), DomainError> {
        if !(0..=2).contains(&priority) {
            return Err(DomainError::BadRequest(format!(
                "Priority must be 0, 1 or 2, got {priority}"
            )));
        }
        let (_, client, view) = self.locate(user_id, info_hash, backend_id).await?;
        match file_index {
            Some(index) => client.set_file_priority(&view.info_hash, index, priority).await,
            None => client.set_priority(&view.info_hash, priority).await,
        }
    }

    pub async fn labels(
        &self,
        user_id: &str,
        info_hash: &str,
        backend_id: Option<&str>,
    ) -> Result<Vec<String>, DomainError> {
        let (_, client, view) = self.locate(user_id, info_hash, backend_id).await?;
        client.labels(&view.info_hash).await
    }

    pub async fn set_labels(
        &self,
        user_id: &str,
        info_hash: &str,
        backend_id: Option<&str>,
        labels: &[String],
    ) -> Result<(), DomainError> {
        let (backend, client, view) = self.locate(user_id, info_hash, backend_id).await?;
        client.set_labels(&view.info_hash, labels).await?;
        self.torrents
            .set_labels(user_id, &view.info_hash, &backend.id, labels)
            .await
    }

    /// Add by bare info hash, magnet URI, or HTTP URL. The target backend is
    /// mandatory and must be enabled.
    pub async fn add(
        &self,
        user_id: &str,
        request: AddTorrentRequest,
    ) -> Result<AddOutcome, DomainError> {
        let backend = self.owned_backend(user_id, &request.backend_id).await?;
        if !backend.enabled {
            return Err(DomainError::BadRequest(format!(
                "Server {} is disabled",
                backend.name
            )));
        }
        let client = self.factory.client_for(&backend)?;

        let mut uri = request.uri.trim().to_string();
        if magnet::is_info_hash(&uri) {
            uri = magnet::info_hash_to_magnet(&uri)?;
            debug!("Converted bare info hash to magnet URI");
        }

        let info_hash = if uri.starts_with("magnet:") {
            let hash = magnet::info_hash_from_magnet(&uri)?;
            client
                .add_magnet(&uri, request.start, request.priority)
                .await?;
            Some(hash)
        } else if uri.starts_with("http://") || uri.starts_with("https://") {
            client
                .add_torrent_url(&uri, request.start, request.priority)
                .await?;
            // The info hash is only known once the backend has fetched the
            // metainfo, so no local rows are written for URL adds.
            None
        } else {
            return Err(DomainError::BadRequest(
                "URI must be an info hash, magnet URI, or http(s) URL".to_string(),
            ));
        };

        if let Some(hash) = &info_hash {
            if !request.labels.is_empty() {
                if let Err(e) = client.set_labels(hash, &request.labels).await {
                    warn!(info_hash = %hash, "Failed to set labels on add: {e}");
                }
            }
            self.torrents
                .upsert(&Torrent {
                    info_hash: hash.clone(),
                    user_id: user_id.to_string(),
                    backend_id: backend.id.clone(),
                    name: hash.clone(),
                    size: 0,
                    is_private: false,
                    base_path: None,
                    labels: request.labels.clone(),
                    added_at: chrono::Utc::now().naive_utc(),
                })
                .await?;
            self.record_action(&backend, hash, ActionKind::Add, Some(uri.clone()))
                .await?;
        } else {
            self.backends.touch_last_used(&backend.id).await?;
        }

        self.events.publish(
            EventKind::Added,
            user_id,
            Some(&backend.id),
            info_hash.as_deref(),
            json!({ "uri": uri, "start": request.start }),
        );
        info!(server = %backend.name, "Added torrent");

        Ok(AddOutcome {
            info_hash,
            name: None,
            message: format!("Torrent added to {}", backend.name),
        })
    }

    /// Add from uploaded `.torrent` bytes.
    pub async fn upload(
        &self,
        user_id: &str,
        backend_id: &str,
        data: &[u8],
        start: bool,
        priority: i32,
        labels: Vec<String>,
    ) -> Result<AddOutcome, DomainError> {
        let backend = self.owned_backend(user_id, backend_id).await?;
        if !backend.enabled {
            return Err(DomainError::BadRequest(format!(
                "Server {} is disabled",
                backend.name
            )));
        }
        let meta = torrent_file::parse(data)?;
        let client = self.factory.client_for(&backend)?;
        client.add_torrent_file(data, start, priority).await?;

        if !labels.is_empty() {
            if let Err(e) = client.set_labels(&meta.info_hash, &labels).await {
                warn!(info_hash = %meta.info_hash, "Failed to set labels on upload: {e}");
            }
        }
        self.torrents
            .upsert(&Torrent {
                info_hash: meta.info_hash.clone(),
                user_id: user_id.to_string(),
                backend_id: backend.id.clone(),
                name: meta.name.clone(),
                size: meta.size,
                is_private: meta.is_private,
                base_path: None,
                labels,
                added_at: chrono::Utc::now().naive_utc(),
            })
            .await?;
        self.record_action(&backend, &meta.info_hash, ActionKind::Add, Some("upload".into()))
            .await?;
        self.events.publish(
            EventKind::Added,
            user_id,
            Some(&backend.id),
            Some(&meta.info_hash),
            json!({ "name": meta.name, "start": start }),
        );
        info!(name = %meta.name, server = %backend.name, "Uploaded torrent");

        Ok(AddOutcome {
            info_hash: Some(meta.info_hash),
            name: Some(meta.name),
            message: format!("Torrent uploaded to {}", backend.name),
        })
    }

    /// Connection probe for the test endpoint. A failed ping evicts the
    /// cached client so the next request reconnects from scratch.
    pub async fn test_backend(
        &self,
        user_id: &str,
        backend_id: &str,
    ) -> Result<ConnectionTest, DomainError> {
        let backend = self.owned_backend(user_id, backend_id).await?;
        let client = match self.factory.client_for(&backend) {
            Ok(client) => client,
            Err(e) => return Ok(ConnectionTest::Failed(e.to_string())),
        };
        match tokio::time::timeout(self.config.fanout_timeout, client.ping()).await {
            Ok(Ok(())) => Ok(ConnectionTest::Connected),
            Ok(Err(e)) => {
                self.factory.invalidate(&backend.id);
                Ok(ConnectionTest::Failed(e.to_string()))
            }
            Err(_) => {
                self.factory.invalidate(&backend.id);
                Ok(ConnectionTest::Failed("Connection timed out".to_string()))
            }
        }
    }

    /// Route a by-hash operation: explicit backend if given, otherwise the
    /// first backend (default → MRU → rest) that knows the hash.
    async fn locate(
        &self,
        user_id: &str,
        info_hash: &str,
        backend_id: Option<&str>,
    ) -> Result<(Backend, Arc<dyn BackendClient>, TorrentView), DomainError> {
        let hash = normalize_hash_param(info_hash)?;

        if let Some(id) = backend_id {
            let backend = self.owned_backend(user_id, id).await?;
            let client = self.factory.client_for(&backend)?;
            let view = first_view(client.list_torrents(Some(&hash), false).await?)
                .ok_or_else(|| DomainError::NotFound(format!("Torrent {hash}")))?;
            self.backends.touch_last_used(&backend.id).await?;
            return Ok((backend, client, view));
        }

        let backends = self.backends.list_for_user(user_id, true).await?;
        if backends.is_empty() {
            return Err(DomainError::Unavailable("No servers configured".to_string()));
        }
        for backend in route_order(backends) {
            let client = match self.factory.client_for(&backend) {
                Ok(client) => client,
                Err(e) => {
                    warn!(server = %backend.name, "Skipping server: {e}");
                    continue;
                }
            };
            match tokio::time::timeout(
                self.config.fanout_timeout,
                client.list_torrents(Some(&hash), false),
            )
            .await
            {
                Ok(Ok(views)) => {
                    if let Some(view) = first_view(views) {
                        self.backends.touch_last_used(&backend.id).await?;
                        return Ok((backend, client, view));
                    }
                }
                Ok(Err(e)) => warn!(server = %backend.name, "Skipping server: {e}"),
                Err(_) => warn!(server = %backend.name, "Skipping server: timed out"),
            }
        }
        Err(DomainError::NotFound(format!("Torrent {hash}")))
    }

    async fn annotate(&self, view: TorrentView, backend: &Backend) -> AggregatedTorrent {
        let (seeding_duration, seed_threshold) = if view.complete {
            let duration = self
                .activity
                .seeding_duration(&view.info_hash, self.config.max_gap_seconds)
                .await
                .unwrap_or(0);
            let threshold = if view.is_private {
                self.config.private_seed_duration
            } else {
                self.config.public_seed_duration
            };
            (duration, threshold)
        } else {
            (0, 0)
        };
        AggregatedTorrent {
            view,
            server_id: backend.id.clone(),
            server_name: backend.name.clone(),
            server_type: backend.kind.as_str().to_string(),
            seeding_duration,
            seed_threshold,
            added_at: None,
        }
    }

    async fn added_at_index(
        &self,
        user_id: &str,
    ) -> Result<HashMap<(String, String), NaiveDateTime>, DomainError> {
        let rows = self.torrents.list_for_user(user_id).await?;
        Ok(rows
            .into_iter()
            .map(|t| ((t.info_hash, t.backend_id), t.added_at))
            .collect())
    }

    async fn record_action(
        &self,
        backend: &Backend,
        info_hash: &str,
        kind: ActionKind,
        detail: Option<String>,
    ) -> Result<(), DomainError> {
        self.actions
            .append(&Action {
                torrent_hash: info_hash.to_string(),
                backend_id: Some(backend.id.clone()),
                kind,
                detail,
                timestamp: chrono::Utc::now().naive_utc(),
            })
            .await?;
        self.backends.touch_last_used(&backend.id).await
    }
}

fn backend_error(backend: &Backend, message: &str) -> BackendError {
    BackendError {
        server_id: backend.id.clone(),
        server_name: backend.name.clone(),
        message: message.to_string(),
    }
}

fn first_view(views: Vec<TorrentView>) -> Option<TorrentView> {
    views.into_iter().next()
}

fn normalize_hash_param(info_hash: &str) -> Result<String, DomainError> {
    magnet::normalize_info_hash(info_hash)
        .map_err(|_| DomainError::BadRequest(format!("Malformed info hash: {info_hash}")))
}

/// Write routing order: default first, then most recently used, then age.
pub fn route_order(mut backends: Vec<Backend>) -> Vec<Backend> {
    backends.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| b.last_used_at.cmp(&a.last_used_at))
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    backends
}

/// Cross-backend total order: `added_at` descending, then hash ascending.
/// Unknown `added_at` sorts last.
pub fn sort_aggregated(torrents: &mut [AggregatedTorrent]) {
    torrents.sort_by(|a, b| {
        b.added_at
            .cmp(&a.added_at)
            .then_with(|| a.view.info_hash.cmp(&b.view.info_hash))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::BackendKind;
    use chrono::DateTime;

    fn backend(id: &str, is_default: bool, used: Option<i64>, created: i64) -> Backend {
        Backend {
            id: id.to_string(),
            user_id: "u1".to_string(),
            name: id.to_string(),
            kind: BackendKind::Rtorrent,
            host: "localhost".to_string(),
            port: 9080,
            rpc_path: None,
            use_ssl: false,
            username: None,
            password: None,
            enabled: true,
            is_default,
            version: 1,
            last_used_at: used.map(|s| DateTime::from_timestamp(s, 0).unwrap().naive_utc()),
            created_at: DateTime::from_timestamp(created, 0).unwrap().naive_utc(),
            http_download: None,
            mount_path: None,
            download_dir: None,
            auto_download: None,
            ssh: None,
        }
    }

    #[test]
    fn route_order_prefers_default_then_mru_then_age() {
        let ordered = route_order(vec![
            backend("old", false, None, 100),
            backend("recent", false, Some(5000), 300),
            backend("main", true, None, 200),
            backend("stale", false, Some(1000), 50),
        ]);
        let ids: Vec<&str> = ordered.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["main", "recent", "stale", "old"]);
    }

    #[test]
    fn hash_params_normalize_case_and_reject_garbage() {
        assert_eq!(
            normalize_hash_param("0123456789abcdef0123456789abcdef01234567").unwrap(),
            "0123456789ABCDEF0123456789ABCDEF01234567"
        );
        assert!(matches!(
            normalize_hash_param("nope"),
            Err(DomainError::BadRequest(_))
        ));
    }
}
