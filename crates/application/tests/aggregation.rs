//! Dispatch-layer behavior: per-user isolation, graceful partial failure,
//! hash normalization, routing order, and add validation.

mod common;

use std::sync::Arc;

use domain::{
    ActionKind, ActionRepository, ActivityService, AddTorrentRequest, BackendKind,
    BackendRepository, ConnectionTest, DispatchConfig, DispatchService, DomainError, EventBus,
    StatusRepository,
};
use infrastructure::{
    SqliteActionRepository, SqliteBackendRepository, SqliteStatusRepository,
    SqliteTorrentRepository,
};

use common::{backend, open_store, view, MockBackendClient, MockFactory, HASH_A, HASH_B};

struct Fixture {
    dispatch: DispatchService,
    factory: Arc<MockFactory>,
    backends: Arc<SqliteBackendRepository>,
    actions: Arc<SqliteActionRepository>,
    _store: common::TempStore,
}

fn fixture() -> Fixture {
    let store = open_store();
    let pool = store.store.pool();
    let backends = Arc::new(SqliteBackendRepository::new(pool.clone()));
    let torrents = Arc::new(SqliteTorrentRepository::new(pool.clone()));
    let statuses: Arc<dyn StatusRepository> = Arc::new(SqliteStatusRepository::new(pool.clone()));
    let actions = Arc::new(SqliteActionRepository::new(pool));
    let activity = Arc::new(ActivityService::new(statuses));
    let factory = Arc::new(MockFactory::default());
    let dispatch = DispatchService::new(
        backends.clone(),
        torrents,
        actions.clone(),
        activity,
        factory.clone(),
        EventBus::default(),
        DispatchConfig::default(),
    );
    Fixture {
        dispatch,
        factory,
        backends,
        actions,
        _store: store,
    }
}

#[tokio::test]
async fn users_never_see_each_others_torrents() {
    let fx = fixture();
    let backend_a = backend("ba", "user-a", BackendKind::Rtorrent);
    let backend_b = backend("bb", "user-b", BackendKind::Rtorrent);
    fx.backends.create(&backend_a).await.unwrap();
    fx.backends.create(&backend_b).await.unwrap();
    // Both backends expose the same torrent.
    fx.factory
        .register("ba", MockBackendClient::with_torrents(vec![view(HASH_A, "shared")]));
    fx.factory
        .register("bb", MockBackendClient::with_torrents(vec![view(HASH_A, "shared")]));

    let list = fx.dispatch.list_torrents("user-a", None).await.unwrap();
    assert_eq!(list.torrents.len(), 1);
    assert_eq!(list.torrents[0].server_id, "ba");
    assert!(list.errors.is_empty());
}

#[tokio::test]
async fn failing_backend_degrades_to_errors_sidecar() {
    let fx = fixture();
    fx.backends
        .create(&backend("good", "u1", BackendKind::Rtorrent))
        .await
        .unwrap();
    fx.backends
        .create(&backend("bad", "u1", BackendKind::Transmission))
        .await
        .unwrap();
    fx.factory
        .register("good", MockBackendClient::with_torrents(vec![view(HASH_A, "ok")]));
    fx.factory.register("bad", MockBackendClient::failing());

    let list = fx.dispatch.list_torrents("u1", None).await.unwrap();
    assert_eq!(list.torrents.len(), 1);
    assert_eq!(list.torrents[0].view.info_hash, HASH_A);
    assert_eq!(list.errors.len(), 1);
    assert_eq!(list.errors[0].server_id, "bad");
    assert!(!list.errors[0].message.is_empty());
}

#[tokio::test]
async fn listings_annotate_seeding_duration_and_threshold() {
    let fx = fixture();
    fx.backends
        .create(&backend("b1", "u1", BackendKind::Rtorrent))
        .await
        .unwrap();
    let mut private_view = view(HASH_A, "private");
    private_view.is_private = true;
    fx.factory
        .register("b1", MockBackendClient::with_torrents(vec![private_view]));

    let list = fx.dispatch.list_torrents("u1", None).await.unwrap();
    let torrent = &list.torrents[0];
    assert_eq!(torrent.seed_threshold, 7 * 24 * 3600);
    assert_eq!(torrent.seeding_duration, 0, "no history yet");
}

#[tokio::test]
async fn writes_route_to_the_default_backend_first() {
    let fx = fixture();
    let mut first = backend("b1", "u1", BackendKind::Rtorrent);
    first.is_default = false;
    fx.backends.create(&first).await.unwrap();
    let mut preferred = backend("b2", "u1", BackendKind::Rtorrent);
    preferred.is_default = true;
    fx.backends.create(&preferred).await.unwrap();

    let one = fx
        .factory
        .register("b1", MockBackendClient::with_torrents(vec![view(HASH_A, "t")]));
    let two = fx
        .factory
        .register("b2", MockBackendClient::with_torrents(vec![view(HASH_A, "t")]));

    fx.dispatch.stop("u1", HASH_A, None).await.unwrap();
    assert!(one.state.lock().unwrap().stopped.is_empty());
    assert_eq!(two.state.lock().unwrap().stopped, vec![HASH_A.to_string()]);

    // The stop leaves an audit row behind.
    let actions = fx.actions.for_torrent(HASH_A).await.unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].kind, ActionKind::Stop);
    assert_eq!(actions[0].backend_id.as_deref(), Some("b2"));
}

#[tokio::test]
async fn lowercase_hashes_normalize_on_every_path() {
    let fx = fixture();
    fx.backends
        .create(&backend("b1", "u1", BackendKind::Rtorrent))
        .await
        .unwrap();
    let client = fx
        .factory
        .register("b1", MockBackendClient::with_torrents(vec![view(HASH_B, "t")]));

    let lower = HASH_B.to_lowercase();
    fx.dispatch.start("u1", &lower, None).await.unwrap();
    assert_eq!(client.state.lock().unwrap().started, vec![HASH_B.to_string()]);

    // Adding a lowercase bare hash stores the canonical uppercase form.
    let outcome = fx
        .dispatch
        .add(
            "u1",
            AddTorrentRequest {
                uri: lower.clone(),
                backend_id: "b1".to_string(),
                start: true,
                priority: 1,
                labels: Vec::new(),
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.info_hash.as_deref(), Some(HASH_B));
}

#[tokio::test]
async fn unknown_torrent_is_not_found() {
    let fx = fixture();
    fx.backends
        .create(&backend("b1", "u1", BackendKind::Rtorrent))
        .await
        .unwrap();
    fx.factory.register("b1", MockBackendClient::default());

    assert!(matches!(
        fx.dispatch.stop("u1", HASH_A, None).await,
        Err(DomainError::NotFound(_))
    ));
}

#[tokio::test]
async fn adds_require_an_enabled_owned_backend() {
    let fx = fixture();
    let mut disabled = backend("b1", "u1", BackendKind::Rtorrent);
    disabled.enabled = false;
    fx.backends.create(&disabled).await.unwrap();
    fx.factory.register("b1", MockBackendClient::default());

    let request = |backend_id: &str| AddTorrentRequest {
        uri: format!("magnet:?xt=urn:btih:{HASH_A}"),
        backend_id: backend_id.to_string(),
        start: true,
        priority: 1,
        labels: Vec::new(),
    };
    assert!(matches!(
        fx.dispatch.add("u1", request("b1")).await,
        Err(DomainError::BadRequest(_))
    ));
    assert!(matches!(
        fx.dispatch.add("u1", request("missing")).await,
        Err(DomainError::NotFound(_))
    ));
    // Another user's backend reads as missing, not forbidden.
    assert!(matches!(
        fx.dispatch.add("u2", request("b1")).await,
        Err(DomainError::NotFound(_))
    ));
}

#[tokio::test]
async fn magnet_adds_reach_the_backend_and_audit_log() {
    let fx = fixture();
    fx.backends
        .create(&backend("b1", "u1", BackendKind::Rtorrent))
        .await
        .unwrap();
    let client = fx.factory.register("b1", MockBackendClient::default());

    let uri = format!("magnet:?xt=urn:btih:{HASH_A}&dn=example");
    fx.dispatch
        .add(
            "u1",
            AddTorrentRequest {
                uri: uri.clone(),
                backend_id: "b1".to_string(),
                start: true,
                priority: 1,
                labels: vec!["tv".to_string()],
            },
        )
        .await
        .unwrap();

    assert_eq!(client.state.lock().unwrap().added_magnets, vec![uri]);
    assert_eq!(
        client.state.lock().unwrap().labels.get(HASH_A).unwrap(),
        &vec!["tv".to_string()]
    );
    let actions = fx.actions.for_torrent(HASH_A).await.unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].kind, ActionKind::Add);
}

#[tokio::test]
async fn ping_failure_reports_and_invalidates() {
    let fx = fixture();
    fx.backends
        .create(&backend("b1", "u1", BackendKind::Rtorrent))
        .await
        .unwrap();
    fx.factory.register("b1", MockBackendClient::failing());

    let outcome = fx.dispatch.test_backend("u1", "b1").await.unwrap();
    assert!(matches!(outcome, ConnectionTest::Failed(_)));
    assert_eq!(*fx.factory.invalidated.lock().unwrap(), vec!["b1".to_string()]);

    let fx2 = fixture();
    fx2.backends
        .create(&backend("b1", "u1", BackendKind::Rtorrent))
        .await
        .unwrap();
    fx2.factory.register("b1", MockBackendClient::default());
    let outcome = fx2.dispatch.test_backend("u1", "b1").await.unwrap();
    assert!(matches!(outcome, ConnectionTest::Connected));
}
