//! Seeding-duration math over the real status table, plus never-seeded and
//! retention queries.

mod common;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use domain::{
    ActivityService, BackendKind, BackendRepository, Status, StatusRepository, Torrent,
    TorrentRepository,
};
use infrastructure::{
    SqliteBackendRepository, SqliteStatusRepository, SqliteTorrentRepository,
};

use common::{backend, open_store, HASH_A, HASH_B};

fn status_at(hash: &str, seconds: i64, seeding: bool) -> Status {
    Status {
        torrent_hash: hash.to_string(),
        backend_id: Some("b1".to_string()),
        is_seeding: seeding,
        is_private: false,
        progress: if seeding { 1.0 } else { 0.5 },
        down_rate: 0,
        up_rate: 0,
        peers: 0,
        seeds: 0,
        timestamp: DateTime::from_timestamp(1_700_000_000 + seconds, 0)
            .unwrap()
            .naive_utc(),
    }
}

#[tokio::test]
async fn duration_is_pure_over_the_status_table() {
    let store = open_store();
    let statuses = Arc::new(SqliteStatusRepository::new(store.store.pool()));
    let activity = ActivityService::new(statuses.clone());

    for t in [0, 60, 120, 180] {
        statuses.append(&status_at(HASH_A, t, true)).await.unwrap();
    }
    assert_eq!(activity.seeding_duration(HASH_A, 300).await.unwrap(), 180);

    // Re-computation over the same rows yields the same number.
    assert_eq!(activity.seeding_duration(HASH_A, 300).await.unwrap(), 180);
}

#[tokio::test]
async fn a_stop_observation_resets_the_total() {
    let store = open_store();
    let statuses = Arc::new(SqliteStatusRepository::new(store.store.pool()));
    let activity = ActivityService::new(statuses.clone());

    for (t, seeding) in [(0, true), (60, true), (90, false), (120, true), (180, true)] {
        statuses.append(&status_at(HASH_A, t, seeding)).await.unwrap();
    }
    assert_eq!(activity.seeding_duration(HASH_A, 300).await.unwrap(), 60);
}

#[tokio::test]
async fn offline_gaps_are_skipped_not_reset() {
    let store = open_store();
    let statuses = Arc::new(SqliteStatusRepository::new(store.store.pool()));
    let activity = ActivityService::new(statuses.clone());

    // Gap of 600 >= 300 between 120 and 720.
    for t in [0, 60, 120, 720, 780] {
        statuses.append(&status_at(HASH_A, t, true)).await.unwrap();
    }
    assert_eq!(
        activity.seeding_duration(HASH_A, 300).await.unwrap(),
        120 + 60
    );
}

#[tokio::test]
async fn never_seeded_reports_only_observed_non_seeders() {
    let store = open_store();
    let pool = store.store.pool();
    let backends = Arc::new(SqliteBackendRepository::new(pool.clone()));
    let torrents = Arc::new(SqliteTorrentRepository::new(pool.clone()));
    let statuses = Arc::new(SqliteStatusRepository::new(pool));

    backends
        .create(&backend("b1", "u1", BackendKind::Rtorrent))
        .await
        .unwrap();
    for hash in [HASH_A, HASH_B] {
        torrents
            .upsert(&Torrent {
                info_hash: hash.to_string(),
                user_id: "u1".to_string(),
                backend_id: "b1".to_string(),
                name: hash.to_string(),
                size: 0,
                is_private: false,
                base_path: None,
                labels: Vec::new(),
                added_at: Utc::now().naive_utc(),
            })
            .await
            .unwrap();
    }
    statuses.append(&status_at(HASH_A, 0, true)).await.unwrap();
    statuses.append(&status_at(HASH_B, 0, false)).await.unwrap();
    statuses.append(&status_at(HASH_B, 60, false)).await.unwrap();

    let never = statuses.never_seeded("u1").await.unwrap();
    assert_eq!(never, vec![HASH_B.to_string()]);
}

#[tokio::test]
async fn pruning_respects_the_cutoff() {
    let store = open_store();
    let statuses = Arc::new(SqliteStatusRepository::new(store.store.pool()));
    let activity = ActivityService::new(statuses.clone());

    let now = Utc::now().naive_utc();
    let mut old = status_at(HASH_A, 0, true);
    old.timestamp = now - Duration::days(45);
    let mut recent = status_at(HASH_A, 0, true);
    recent.timestamp = now - Duration::days(2);
    statuses.append(&old).await.unwrap();
    statuses.append(&recent).await.unwrap();

    let removed = activity.prune(30).await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(statuses.for_torrent(HASH_A).await.unwrap().len(), 1);
}
