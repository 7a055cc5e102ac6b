//! Transfer job manager: idempotent submission, worker execution, transport
//! selection failures, and post-transfer cleanup.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use domain::{
    ActionKind, ActionRepository, AutoDownload, BackendKind, BackendRepository, DomainError,
    EventBus, SettingRepository, Torrent, TorrentRepository, TorrentSetting, TransferConfig,
    TransferRepository, TransferService, TransferState,
};
use infrastructure::{
    SqliteActionRepository, SqliteBackendRepository, SqliteSettingRepository,
    SqliteTorrentRepository, SqliteTransferRepository,
};

use common::{backend, open_store, MockBackendClient, MockFactory, MockTransport, HASH_A};

struct Fixture {
    service: Arc<TransferService>,
    transport_calls: Arc<std::sync::atomic::AtomicU64>,
    factory: Arc<MockFactory>,
    backends: Arc<SqliteBackendRepository>,
    torrents: Arc<SqliteTorrentRepository>,
    transfers: Arc<SqliteTransferRepository>,
    actions: Arc<SqliteActionRepository>,
    settings: Arc<SqliteSettingRepository>,
    _store: common::TempStore,
}

fn fixture() -> Fixture {
    let store = open_store();
    let pool = store.store.pool();
    let backends = Arc::new(SqliteBackendRepository::new(pool.clone()));
    let torrents = Arc::new(SqliteTorrentRepository::new(pool.clone()));
    let actions = Arc::new(SqliteActionRepository::new(pool.clone()));
    let transfers = Arc::new(SqliteTransferRepository::new(pool.clone()));
    let settings = Arc::new(SqliteSettingRepository::new(pool));
    let factory = Arc::new(MockFactory::default());
    let transport = MockTransport::default();
    let transport_calls = transport.calls.clone();
    let service = Arc::new(TransferService::new(
        transfers.clone(),
        backends.clone(),
        torrents.clone(),
        actions.clone(),
        settings.clone(),
        factory.clone(),
        Arc::new(transport),
        EventBus::default(),
        TransferConfig {
            max_concurrent: 2,
            poll_interval: Duration::from_millis(50),
        },
    ));
    Fixture {
        service,
        transport_calls,
        factory,
        backends,
        torrents,
        transfers,
        actions,
        settings,
        _store: store,
    }
}

async fn seed_backend(fx: &Fixture, mount: bool) {
    let mut b = backend("b1", "u1", BackendKind::Rtorrent);
    b.auto_download = Some(AutoDownload {
        local_path: "/srv/media".to_string(),
        delete_remote_after: false,
    });
    if mount {
        b.mount_path = Some("/mnt/seedbox".to_string());
    }
    fx.backends.create(&b).await.unwrap();
    fx.torrents
        .upsert(&Torrent {
            info_hash: HASH_A.to_string(),
            user_id: "u1".to_string(),
            backend_id: "b1".to_string(),
            name: "payload".to_string(),
            size: 4096,
            is_private: false,
            base_path: Some("/downloads/payload".to_string()),
            labels: Vec::new(),
            added_at: chrono::Utc::now().naive_utc(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn resubmission_returns_the_existing_job() {
    let fx = fixture();
    seed_backend(&fx, true).await;

    let first = fx.service.submit("u1", HASH_A, "b1", None).await.unwrap();
    let second = fx.service.submit("u1", HASH_A, "b1", None).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.state, TransferState::Pending);

    // Lowercase resubmission hits the same job too.
    let third = fx
        .service
        .submit("u1", &HASH_A.to_lowercase(), "b1", None)
        .await
        .unwrap();
    assert_eq!(first.id, third.id);
}

#[tokio::test]
async fn submission_records_the_audit_row() {
    let fx = fixture();
    seed_backend(&fx, true).await;
    fx.service.submit("u1", HASH_A, "b1", None).await.unwrap();

    let actions = fx.actions.for_torrent(HASH_A).await.unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].kind, ActionKind::TransferStart);
}

#[tokio::test]
async fn worker_runs_jobs_to_done() {
    let fx = fixture();
    seed_backend(&fx, true).await;
    fx.factory.register("b1", MockBackendClient::default());

    let job = fx.service.submit("u1", HASH_A, "b1", None).await.unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker = tokio::spawn(Arc::clone(&fx.service).run_worker(shutdown_rx));

    let mut finished = None;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let current = fx.transfers.get(&job.id).await.unwrap().unwrap();
        if !current.state.is_active() {
            finished = Some(current);
            break;
        }
    }
    let _ = shutdown_tx.send(true);
    let _ = worker.await;

    let finished = finished.expect("job finished in time");
    assert_eq!(finished.state, TransferState::Done);
    assert_eq!(finished.bytes_done, 4096);
    assert!(finished.finished_at.is_some());
    assert_eq!(fx.transport_calls.load(Ordering::SeqCst), 1);

    // A completed pair accepts a fresh submission.
    let next = fx.service.submit("u1", HASH_A, "b1", None).await.unwrap();
    assert_ne!(next.id, job.id);
}

#[tokio::test]
async fn missing_transport_fails_terminally() {
    let fx = fixture();
    // No mount, no http, no ssh.
    seed_backend(&fx, false).await;
    fx.factory.register("b1", MockBackendClient::default());

    let job = fx.service.submit("u1", HASH_A, "b1", None).await.unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker = tokio::spawn(Arc::clone(&fx.service).run_worker(shutdown_rx));
    let mut finished = None;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let current = fx.transfers.get(&job.id).await.unwrap().unwrap();
        if !current.state.is_active() {
            finished = Some(current);
            break;
        }
    }
    let _ = shutdown_tx.send(true);
    let _ = worker.await;

    let finished = finished.expect("job finished in time");
    assert_eq!(finished.state, TransferState::Failed);
    assert!(finished
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("transport"));
    assert_eq!(fx.transport_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn delete_remote_after_erases_without_data() {
    let fx = fixture();
    let mut b = backend("b1", "u1", BackendKind::Rtorrent);
    b.mount_path = Some("/mnt/seedbox".to_string());
    b.auto_download = Some(AutoDownload {
        local_path: "/srv/media".to_string(),
        delete_remote_after: true,
    });
    fx.backends.create(&b).await.unwrap();
    fx.torrents
        .upsert(&Torrent {
            info_hash: HASH_A.to_string(),
            user_id: "u1".to_string(),
            backend_id: "b1".to_string(),
            name: "payload".to_string(),
            size: 4096,
            is_private: false,
            base_path: Some("/downloads/payload".to_string()),
            labels: Vec::new(),
            added_at: chrono::Utc::now().naive_utc(),
        })
        .await
        .unwrap();
    let client = fx.factory.register("b1", MockBackendClient::default());

    let job = fx.service.submit("u1", HASH_A, "b1", None).await.unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker = tokio::spawn(Arc::clone(&fx.service).run_worker(shutdown_rx));
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let current = fx.transfers.get(&job.id).await.unwrap().unwrap();
        if !current.state.is_active() {
            break;
        }
    }
    let _ = shutdown_tx.send(true);
    let _ = worker.await;

    assert_eq!(
        client.state.lock().unwrap().erased,
        vec![(HASH_A.to_string(), false)],
        "remote erase keeps payload data"
    );
    let actions = fx.actions.for_torrent(HASH_A).await.unwrap();
    assert!(actions.iter().any(|a| a.kind == ActionKind::TransferDone));
}

#[tokio::test]
async fn per_torrent_setting_overrides_the_destination() {
    let fx = fixture();
    seed_backend(&fx, true).await;
    fx.settings
        .set(&TorrentSetting {
            user_id: "u1".to_string(),
            torrent_hash: HASH_A.to_string(),
            key: "download_path".to_string(),
            value: "/srv/special".to_string(),
        })
        .await
        .unwrap();

    let job = fx.service.submit("u1", HASH_A, "b1", None).await.unwrap();
    assert_eq!(
        job.dest_path,
        format!("/srv/special/{}", HASH_A.to_lowercase())
    );

    // An explicit override still wins over the stored setting.
    let fx = fixture();
    seed_backend(&fx, true).await;
    let job = fx
        .service
        .submit("u1", HASH_A, "b1", Some("/srv/explicit"))
        .await
        .unwrap();
    assert_eq!(
        job.dest_path,
        format!("/srv/explicit/{}", HASH_A.to_lowercase())
    );
}

#[tokio::test]
async fn submitting_against_foreign_backend_is_not_found() {
    let fx = fixture();
    seed_backend(&fx, true).await;
    assert!(matches!(
        fx.service.submit("intruder", HASH_A, "b1", None).await,
        Err(DomainError::NotFound(_))
    ));
}
