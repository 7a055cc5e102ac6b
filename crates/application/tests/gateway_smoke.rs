//! End-to-end wiring: the assembled gateway serves the register → add server
//! → list flow against mock backends, then shuts down cleanly.

mod common;

use std::sync::Arc;
use std::time::Duration;

use application::GatewayApp;
use config::Config;

use domain::{AddTorrentRequest, BackendKind, BackendRepository};

use common::{backend, open_store, view, MockBackendClient, MockFactory, MockTranscoder, MockTransport, HASH_A};

fn test_config(db_path: &str, stream_dir: &std::path::Path) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        sqlite_db_path: db_path.to_string(),
        cookie_secure: false,
        public_seed_duration: 86_400,
        private_seed_duration: 604_800,
        auto_pause_seeding: true,
        maintenance_interval_seconds: 3600,
        status_retention_days: 30,
        stream_idle_seconds: 600,
        stream_dir: stream_dir.to_path_buf(),
        max_status_gap_seconds: 300,
        dispatch_timeout_seconds: 5,
        callback_dir: None,
    }
}

#[tokio::test]
async fn assembled_gateway_serves_the_core_flow() {
    let store = open_store();
    let stream_dir = tempfile::tempdir().unwrap();
    let config = test_config("unused", stream_dir.path());

    let factory = Arc::new(MockFactory::default());
    let client = factory.register("b1", MockBackendClient::with_torrents(vec![]));

    let app = GatewayApp::assemble(
        &config,
        store.store,
        factory,
        Arc::new(MockTranscoder::default()),
        Arc::new(MockTransport::default()),
    )
    .unwrap();

    // Register and authenticate.
    let user = app.auth.register("alice", "pw-alice-1234").await.unwrap();
    let (session, _) = app.auth.create_session(&user, None, None, false).await.unwrap();
    let resolved = app
        .auth
        .resolve_session(Some(&session.id), None, None, None)
        .await
        .unwrap();
    assert_eq!(resolved.user.username, "alice");

    // Configure a backend and add a torrent to it.
    app.backends
        .create(&backend("b1", &user.id, BackendKind::Rtorrent))
        .await
        .unwrap();
    app.dispatch
        .add(
            &user.id,
            AddTorrentRequest {
                uri: format!("magnet:?xt=urn:btih:{HASH_A}"),
                backend_id: "b1".to_string(),
                start: true,
                priority: 1,
                labels: Vec::new(),
            },
        )
        .await
        .unwrap();
    client.state.lock().unwrap().torrents.push(view(HASH_A, "demo"));

    let list = app.dispatch.list_torrents(&user.id, None).await.unwrap();
    assert_eq!(list.torrents.len(), 1);
    assert_eq!(list.torrents[0].view.info_hash, HASH_A);
    assert!(list.errors.is_empty());
    assert!(list.torrents[0].added_at.is_some(), "add recorded locally");

    // Background loops stop on shutdown without hanging the test.
    tokio::time::timeout(Duration::from_secs(5), app.shutdown())
        .await
        .expect("shutdown completes");
}
