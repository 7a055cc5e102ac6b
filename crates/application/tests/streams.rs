//! HLS job manager: dedup on (backend, file), mount/path validation, and
//! idle reaping.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use domain::{
    BackendKind, BackendRepository, DomainError, StreamConfig, StreamService, StreamStatus,
};
use infrastructure::SqliteBackendRepository;

use common::{backend, open_store, MockTranscoder};

struct Fixture {
    streams: StreamService,
    transcoder_spawns: Arc<std::sync::atomic::AtomicU64>,
    backends: Arc<SqliteBackendRepository>,
    mount: tempfile::TempDir,
    scratch: tempfile::TempDir,
    _store: common::TempStore,
}

fn fixture(idle_timeout: Duration) -> Fixture {
    let store = open_store();
    let backends = Arc::new(SqliteBackendRepository::new(store.store.pool()));
    let mount = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let transcoder = MockTranscoder::default();
    let transcoder_spawns = transcoder.spawned.clone();
    let streams = StreamService::new(
        backends.clone(),
        Arc::new(transcoder),
        StreamConfig {
            stream_dir: scratch.path().to_path_buf(),
            idle_timeout,
        },
    );
    Fixture {
        streams,
        transcoder_spawns,
        backends,
        mount,
        scratch,
        _store: store,
    }
}

async fn seed_media(fx: &Fixture) {
    let mut b = backend("b1", "u1", BackendKind::Rtorrent);
    b.mount_path = Some(fx.mount.path().to_string_lossy().into_owned());
    fx.backends.create(&b).await.unwrap();
    tokio::fs::create_dir_all(fx.mount.path().join("movies"))
        .await
        .unwrap();
    tokio::fs::write(fx.mount.path().join("movies/film.mkv"), b"fake media")
        .await
        .unwrap();
}

#[tokio::test]
async fn identical_streams_share_one_job() {
    let fx = fixture(Duration::from_secs(600));
    seed_media(&fx).await;

    let first = fx
        .streams
        .start_stream("u1", "b1", "movies/film.mkv")
        .await
        .unwrap();
    assert_eq!(first.status, StreamStatus::Starting);
    assert_eq!(first.media_type, "video");
    assert!((first.duration_seconds - 120.0).abs() < 1e-9);
    assert!(first.playlist_url.contains(&first.job_id));

    let second = fx
        .streams
        .start_stream("u1", "b1", "movies/film.mkv")
        .await
        .unwrap();
    assert_eq!(first.job_id, second.job_id);
    assert_eq!(fx.transcoder_spawns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn progress_comes_from_the_playlist() {
    let fx = fixture(Duration::from_secs(600));
    seed_media(&fx).await;
    let info = fx
        .streams
        .start_stream("u1", "b1", "movies/film.mkv")
        .await
        .unwrap();

    // Simulate the transcoder writing three 4s segments.
    let job_dir = fx.scratch.path().join(&info.job_id);
    tokio::fs::write(
        job_dir.join("playlist.m3u8"),
        "#EXTM3U\n#EXTINF:4.0,\nseg0.ts\n#EXTINF:4.0,\nseg1.ts\n#EXTINF:4.0,\nseg2.ts\n",
    )
    .await
    .unwrap();

    let polled = fx.streams.job_info("u1", &info.job_id).await.unwrap();
    assert_eq!(polled.status, StreamStatus::Running);
    assert!((polled.transcoded_seconds - 12.0).abs() < 1e-9);
}

#[tokio::test]
async fn streams_require_a_mount_and_a_media_extension() {
    let fx = fixture(Duration::from_secs(600));
    // Backend without mount_path.
    fx.backends
        .create(&backend("b1", "u1", BackendKind::Rtorrent))
        .await
        .unwrap();
    assert!(matches!(
        fx.streams.start_stream("u1", "b1", "movies/film.mkv").await,
        Err(DomainError::BadRequest(_))
    ));

    let fx = fixture(Duration::from_secs(600));
    seed_media(&fx).await;
    tokio::fs::write(fx.mount.path().join("notes.txt"), b"text")
        .await
        .unwrap();
    assert!(matches!(
        fx.streams.start_stream("u1", "b1", "notes.txt").await,
        Err(DomainError::BadRequest(_))
    ));
    assert!(matches!(
        fx.streams.start_stream("u1", "b1", "../escape.mkv").await,
        Err(DomainError::BadRequest(_))
    ));
    assert!(matches!(
        fx.streams.start_stream("u1", "b1", "movies/missing.mkv").await,
        Err(DomainError::NotFound(_))
    ));
}

#[tokio::test]
async fn foreign_users_cannot_poll_jobs() {
    let fx = fixture(Duration::from_secs(600));
    seed_media(&fx).await;
    let info = fx
        .streams
        .start_stream("u1", "b1", "movies/film.mkv")
        .await
        .unwrap();
    assert!(matches!(
        fx.streams.job_info("intruder", &info.job_id).await,
        Err(DomainError::NotFound(_))
    ));
}

#[tokio::test]
async fn idle_jobs_are_reaped_with_their_scratch_dirs() {
    let fx = fixture(Duration::from_millis(0));
    seed_media(&fx).await;
    let info = fx
        .streams
        .start_stream("u1", "b1", "movies/film.mkv")
        .await
        .unwrap();
    let job_dir = fx.scratch.path().join(&info.job_id);
    assert!(job_dir.exists());

    // Zero idle allowance: the next sweep removes the job.
    fx.streams.reap_idle().await;
    assert!(!job_dir.exists());
    assert!(matches!(
        fx.streams.job_info("u1", &info.job_id).await,
        Err(DomainError::NotFound(_))
    ));

    // And the same stream can start over afterwards.
    let again = fx
        .streams
        .start_stream("u1", "b1", "movies/film.mkv")
        .await
        .unwrap();
    assert_ne!(again.job_id, info.job_id);
}
