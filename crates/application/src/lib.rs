//! Wires the store, repositories, services, and background tasks into one
//! running gateway.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use config::Config;
use domain::{
    ActionRepository, ActivityService, AuthService, BackendRepository, ClientFactory,
    CredentialRepository, DispatchConfig, DispatchService, DomainError, EventBus,
    MaintenanceConfig, MaintenanceService, SettingRepository, StatusRepository, StreamConfig,
    StreamService, TorrentRepository, TransferConfig, TransferService, TransferTransport,
    Transcoder, UserRepository, WebhookRepository,
};
use infrastructure::{
    CachedClientFactory, FfmpegTranscoder, GatewayTransport, SqliteActionRepository,
    SqliteBackendRepository, SqliteCredentialRepository, SqliteSettingRepository,
    SqliteStatusRepository, SqliteTorrentRepository, SqliteTransferRepository,
    SqliteUserRepository, SqliteWebhookRepository, Store, WebhookForwarder,
};

/// The assembled gateway: repositories, services, and the background tasks
/// that keep it maintained.
pub struct GatewayApp {
    pub backends: Arc<dyn BackendRepository>,
    pub settings: Arc<dyn SettingRepository>,
    pub webhooks: Arc<dyn WebhookRepository>,

    pub auth: Arc<AuthService>,
    pub dispatch: Arc<DispatchService>,
    pub transfers: Arc<TransferService>,
    pub streams: Arc<StreamService>,

    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl GatewayApp {
    /// Open the store and assemble every service with the production
    /// factory, transcoder, and transports. Background loops start
    /// immediately.
    pub fn open(config: &Config) -> Result<Self, DomainError> {
        let store = Store::open(&config.sqlite_db_path)?;
        let factory: Arc<dyn ClientFactory> = Arc::new(CachedClientFactory::new());
        let transcoder: Arc<dyn Transcoder> = Arc::new(FfmpegTranscoder::new());
        let transport: Arc<dyn TransferTransport> = Arc::new(GatewayTransport::new()?);
        Self::assemble(config, store, factory, transcoder, transport)
    }

    /// Assembly with injectable process/RPC seams; tests pass mock factories
    /// and transcoders against a temp store.
    pub fn assemble(
        config: &Config,
        store: Store,
        factory: Arc<dyn ClientFactory>,
        transcoder: Arc<dyn Transcoder>,
        transport: Arc<dyn TransferTransport>,
    ) -> Result<Self, DomainError> {
        let pool = store.pool();

        let users: Arc<dyn UserRepository> = Arc::new(SqliteUserRepository::new(pool.clone()));
        let backends: Arc<dyn BackendRepository> =
            Arc::new(SqliteBackendRepository::new(pool.clone()));
        let torrents: Arc<dyn TorrentRepository> =
            Arc::new(SqliteTorrentRepository::new(pool.clone()));
        let statuses: Arc<dyn StatusRepository> =
            Arc::new(SqliteStatusRepository::new(pool.clone()));
        let actions: Arc<dyn ActionRepository> =
            Arc::new(SqliteActionRepository::new(pool.clone()));
        let credentials: Arc<dyn CredentialRepository> =
            Arc::new(SqliteCredentialRepository::new(pool.clone()));
        let transfers_repo = Arc::new(SqliteTransferRepository::new(pool.clone()));
        let settings: Arc<dyn SettingRepository> =
            Arc::new(SqliteSettingRepository::new(pool.clone()));
        let webhooks: Arc<dyn WebhookRepository> =
            Arc::new(SqliteWebhookRepository::new(pool));

        let events = EventBus::default();
        let auth = Arc::new(AuthService::new(Arc::clone(&users), credentials));
        let activity = Arc::new(ActivityService::new(Arc::clone(&statuses)));

        let dispatch = Arc::new(DispatchService::new(
            Arc::clone(&backends),
            Arc::clone(&torrents),
            Arc::clone(&actions),
            Arc::clone(&activity),
            Arc::clone(&factory),
            events.clone(),
            DispatchConfig {
                fanout_timeout: Duration::from_secs(config.dispatch_timeout_seconds),
                public_seed_duration: config.public_seed_duration,
                private_seed_duration: config.private_seed_duration,
                max_gap_seconds: config.max_status_gap_seconds,
            },
        ));

        let transfers = Arc::new(TransferService::new(
            transfers_repo,
            Arc::clone(&backends),
            Arc::clone(&torrents),
            Arc::clone(&actions),
            Arc::clone(&settings),
            Arc::clone(&factory),
            transport,
            events.clone(),
            TransferConfig::default(),
        ));

        let streams = Arc::new(StreamService::new(
            Arc::clone(&backends),
            transcoder,
            StreamConfig {
                stream_dir: config.stream_dir.clone(),
                idle_timeout: Duration::from_secs(config.stream_idle_seconds),
            },
        ));

        let maintenance = Arc::new(MaintenanceService::new(
            Arc::clone(&backends),
            Arc::clone(&torrents),
            Arc::clone(&actions),
            Arc::clone(&activity),
            Arc::clone(&auth),
            Arc::clone(&transfers),
            Arc::clone(&factory),
            events.clone(),
            MaintenanceConfig {
                interval: Duration::from_secs(config.maintenance_interval_seconds),
                rpc_deadline: Duration::from_secs(config.dispatch_timeout_seconds),
                auto_pause_seeding: config.auto_pause_seeding,
                public_seed_duration: config.public_seed_duration,
                private_seed_duration: config.private_seed_duration,
                max_gap_seconds: config.max_status_gap_seconds,
                status_retention_days: config.status_retention_days,
            },
        ));

        let forwarder = Arc::new(WebhookForwarder::new(
            Arc::clone(&webhooks),
            events.clone(),
        ));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(maintenance.run(shutdown_rx.clone())),
            tokio::spawn(Arc::clone(&transfers).run_worker(shutdown_rx.clone())),
            tokio::spawn(Arc::clone(&streams).run_janitor(shutdown_rx.clone())),
            tokio::spawn(forwarder.run(shutdown_rx)),
        ];
        info!("Gateway assembled");

        Ok(GatewayApp {
            backends,
            settings,
            webhooks,
            auth,
            dispatch,
            transfers,
            streams,
            shutdown,
            tasks,
        })
    }

    /// Signal every background loop, wait for them, and tear down stream
    /// jobs.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        self.streams.shutdown_all().await;
        info!("Gateway stopped");
    }
}
