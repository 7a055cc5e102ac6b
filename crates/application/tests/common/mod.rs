//! Shared fixtures: a tempfile-backed store, in-memory mock backend clients,
//! and inert transcoder/transport stand-ins.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use domain::{
    Backend, BackendClient, BackendKind, ClientFactory, DomainError, FileView, TorrentView,
    TranscodeHandle, Transcoder, TransferTransport, TransportKind,
};
use infrastructure::Store;

pub struct TempStore {
    pub store: Store,
    _dir: tempfile::TempDir,
}

pub fn open_store() -> TempStore {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("gateway.db");
    let store = Store::open(path.to_str().unwrap()).expect("open store");
    TempStore { store, _dir: dir }
}

pub fn view(info_hash: &str, name: &str) -> TorrentView {
    TorrentView {
        info_hash: info_hash.to_string(),
        name: name.to_string(),
        base_path: format!("/downloads/{}", info_hash.to_lowercase()),
        size: 4096,
        is_multi_file: false,
        bytes_done: 4096,
        state: "seeding".to_string(),
        is_active: true,
        complete: true,
        ratio: 1.0,
        up_rate: 0,
        down_rate: 0,
        peers: 1,
        priority: 1,
        is_private: false,
        progress: 1.0,
        is_magnet_pending: false,
        files: None,
    }
}

pub fn backend(id: &str, user_id: &str, kind: BackendKind) -> Backend {
    Backend {
        id: id.to_string(),
        user_id: user_id.to_string(),
        name: format!("server-{id}"),
        kind,
        host: "127.0.0.1".to_string(),
        port: 9080,
        rpc_path: None,
        use_ssl: false,
        username: None,
        password: None,
        enabled: true,
        is_default: false,
        version: 1,
        last_used_at: None,
        created_at: Utc::now().naive_utc(),
        http_download: None,
        mount_path: None,
        download_dir: Some("/downloads".to_string()),
        auto_download: None,
        ssh: None,
    }
}

#[derive(Default)]
pub struct MockBackendState {
    pub torrents: Vec<TorrentView>,
    pub fail: bool,
    pub started: Vec<String>,
    pub stopped: Vec<String>,
    pub erased: Vec<(String, bool)>,
    pub added_magnets: Vec<String>,
    pub added_files: usize,
    pub labels: HashMap<String, Vec<String>>,
}

/// In-memory `BackendClient`; every mutation is recorded for assertions.
#[derive(Clone, Default)]
pub struct MockBackendClient {
    pub state: Arc<Mutex<MockBackendState>>,
}

impl MockBackendClient {
    pub fn with_torrents(torrents: Vec<TorrentView>) -> Self {
        let client = Self::default();
        client.state.lock().unwrap().torrents = torrents;
        client
    }

    pub fn failing() -> Self {
        let client = Self::default();
        client.state.lock().unwrap().fail = true;
        client
    }

    fn check(&self) -> Result<(), DomainError> {
        if self.state.lock().unwrap().fail {
            Err(DomainError::BackendFailure(
                "Mock backend unreachable".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BackendClient for MockBackendClient {
    async fn ping(&self) -> Result<(), DomainError> {
        self.check()
    }

    async fn list_torrents(
        &self,
        info_hash: Option<&str>,
        _include_files: bool,
    ) -> Result<Vec<TorrentView>, DomainError> {
        self.check()?;
        let torrents = self.state.lock().unwrap().torrents.clone();
        Ok(match info_hash {
            Some(hash) => torrents
                .into_iter()
                .filter(|t| t.info_hash.eq_ignore_ascii_case(hash))
                .collect(),
            None => torrents,
        })
    }

    async fn add_torrent_file(
        &self,
        _data: &[u8],
        _start: bool,
        _priority: i32,
    ) -> Result<(), DomainError> {
        self.check()?;
        self.state.lock().unwrap().added_files += 1;
        Ok(())
    }

    async fn add_magnet(&self, uri: &str, _start: bool, _priority: i32) -> Result<(), DomainError> {
        self.check()?;
        self.state.lock().unwrap().added_magnets.push(uri.to_string());
        Ok(())
    }

    async fn add_torrent_url(
        &self,
        _url: &str,
        _start: bool,
        _priority: i32,
    ) -> Result<(), DomainError> {
        self.check()
    }

    async fn start(&self, info_hash: &str) -> Result<(), DomainError> {
        self.check()?;
        self.state.lock().unwrap().started.push(info_hash.to_string());
        Ok(())
    }

    async fn stop(&self, info_hash: &str) -> Result<(), DomainError> {
        self.check()?;
        self.state.lock().unwrap().stopped.push(info_hash.to_string());
        Ok(())
    }

    async fn erase(&self, info_hash: &str, delete_data: bool) -> Result<(), DomainError> {
        self.check()?;
        self.state
            .lock()
            .unwrap()
            .erased
            .push((info_hash.to_string(), delete_data));
        Ok(())
    }

    async fn files(&self, _info_hash: &str) -> Result<Vec<FileView>, DomainError> {
        self.check()?;
        Ok(Vec::new())
    }

    async fn set_priority(&self, _info_hash: &str, _priority: i32) -> Result<(), DomainError> {
        self.check()
    }

    async fn set_file_priority(
        &self,
        _info_hash: &str,
        _index: i32,
        _priority: i32,
    ) -> Result<(), DomainError> {
        self.check()
    }

    async fn labels(&self, info_hash: &str) -> Result<Vec<String>, DomainError> {
        self.check()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .labels
            .get(info_hash)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_labels(&self, info_hash: &str, labels: &[String]) -> Result<(), DomainError> {
        self.check()?;
        self.state
            .lock()
            .unwrap()
            .labels
            .insert(info_hash.to_string(), labels.to_vec());
        Ok(())
    }
}

/// Factory mapping backend ids to pre-registered mock clients.
#[derive(Default)]
pub struct MockFactory {
    clients: Mutex<HashMap<String, Arc<MockBackendClient>>>,
    pub invalidated: Mutex<Vec<String>>,
}

impl MockFactory {
    pub fn register(&self, backend_id: &str, client: MockBackendClient) -> Arc<MockBackendClient> {
        let client = Arc::new(client);
        self.clients
            .lock()
            .unwrap()
            .insert(backend_id.to_string(), Arc::clone(&client));
        client
    }
}

impl ClientFactory for MockFactory {
    fn client_for(&self, backend: &Backend) -> Result<Arc<dyn BackendClient>, DomainError> {
        self.clients
            .lock()
            .unwrap()
            .get(&backend.id)
            .map(|client| Arc::clone(client) as Arc<dyn BackendClient>)
            .ok_or_else(|| DomainError::BackendFailure("No mock client registered".to_string()))
    }

    fn invalidate(&self, backend_id: &str) {
        self.invalidated.lock().unwrap().push(backend_id.to_string());
    }
}

pub struct MockHandle;

#[async_trait]
impl TranscodeHandle for MockHandle {
    async fn try_wait(&mut self) -> Result<Option<bool>, DomainError> {
        Ok(None)
    }

    async fn kill(&mut self) {}
}

/// Transcoder that never runs a process; duration is fixed and spawn counts
/// invocations.
#[derive(Default)]
pub struct MockTranscoder {
    pub spawned: Arc<AtomicU64>,
}

#[async_trait]
impl Transcoder for MockTranscoder {
    async fn probe_duration(&self, _source: &Path) -> Result<f64, DomainError> {
        Ok(120.0)
    }

    async fn spawn(
        &self,
        _source: &Path,
        _out_dir: &Path,
    ) -> Result<Box<dyn TranscodeHandle>, DomainError> {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockHandle))
    }
}

/// Transport that "moves" a fixed number of bytes instantly.
pub struct MockTransport {
    pub bytes: u64,
    pub calls: Arc<AtomicU64>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            bytes: 4096,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }
}

#[async_trait]
impl TransferTransport for MockTransport {
    async fn transfer(
        &self,
        _kind: TransportKind,
        _backend: &Backend,
        _source_path: &str,
        _dest_path: &str,
        bytes_done: Arc<AtomicU64>,
    ) -> Result<u64, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        bytes_done.store(self.bytes, Ordering::Relaxed);
        Ok(self.bytes)
    }
}

pub const HASH_A: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
pub const HASH_B: &str = "BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB";
pub const HASH_C: &str = "CCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCC";
