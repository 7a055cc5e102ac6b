//! Background maintenance loop.
//!
//! Each tick samples every enabled backend, appends status history, enforces
//! the seed-duration auto-pause policy, queues auto-download transfers for
//! newly completed torrents, and prunes aged rows. A failing backend never
//! aborts the tick.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::clients::{BackendClient, ClientFactory, TorrentView};
use crate::entities::{Action, ActionKind, Backend, Status, Torrent};
use crate::errors::DomainError;
use crate::repositories::{ActionRepository, BackendRepository, TorrentRepository};
use crate::services::{ActivityService, AuthService, EventBus, EventKind, TransferService};

#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub interval: Duration,
    /// Per-backend RPC deadline within a tick.
    pub rpc_deadline: Duration,
    pub auto_pause_seeding: bool,
    pub public_seed_duration: i64,
    pub private_seed_duration: i64,
    pub max_gap_seconds: i64,
    pub status_retention_days: i64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            rpc_deadline: Duration::from_secs(10),
            auto_pause_seeding: true,
            public_seed_duration: 24 * 3600,
            private_seed_duration: 7 * 24 * 3600,
            max_gap_seconds: 300,
            status_retention_days: 30,
        }
    }
}

pub struct MaintenanceService {
    backends: Arc<dyn BackendRepository>,
    torrents: Arc<dyn TorrentRepository>,
    actions: Arc<dyn ActionRepository>,
    activity: Arc<ActivityService>,
    auth: Arc<AuthService>,
    transfers: Arc<TransferService>,
    factory: Arc<dyn ClientFactory>,
    events: EventBus,
    config: MaintenanceConfig,
    /// Completed hashes per backend from the previous tick, for completion
    /// detection.
    completed: tokio::sync::Mutex<HashMap<String, HashSet<String>>>,
}

impl MaintenanceService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backends: Arc<dyn BackendRepository>,
        torrents: Arc<dyn TorrentRepository>,
        actions: Arc<dyn ActionRepository>,
        activity: Arc<ActivityService>,
        auth: Arc<AuthService>,
        transfers: Arc<TransferService>,
        factory: Arc<dyn ClientFactory>,
        events: EventBus,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            backends,
            torrents,
            actions,
            activity,
            auth,
            transfers,
            factory,
            events,
            config,
            completed: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Run until the shutdown channel flips. The in-flight tick finishes
    /// (bounded by its per-backend deadlines) before the loop exits.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval = self.config.interval.as_secs(),
            "Maintenance scheduler started"
        );
        // interval_at so the first sample waits one full period instead of
        // firing immediately.
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.interval,
            self.config.interval,
        );
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Maintenance scheduler stopped");
    }

    /// One full maintenance pass. Public so tests can drive ticks directly.
    pub async fn run_tick(&self) {
        let backends = match self.backends.list_enabled().await {
            Ok(backends) => backends,
            Err(e) => {
                error!("Maintenance tick could not load backends: {e}");
                return;
            }
        };

        for backend in backends {
            if let Err(e) = self.sample_backend(&backend).await {
                warn!(server = %backend.name, "Maintenance sampling failed: {e}");
            }
        }

        match self.activity.prune(self.config.status_retention_days).await {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "Pruned old status rows"),
            Err(e) => warn!("Status pruning failed: {e}"),
        }
        if let Err(e) = self.auth.cleanup_expired().await {
            warn!("Credential cleanup failed: {e}");
        }
    }

    async fn sample_backend(&self, backend: &Backend) -> Result<(), DomainError> {
        let client = self.factory.client_for(backend)?;
        let views = tokio::time::timeout(
            self.config.rpc_deadline,
            client.list_torrents(None, false),
        )
        .await
        .map_err(|_| DomainError::BackendFailure("Listing timed out".to_string()))??;

        let now = Utc::now().naive_utc();
        let mut current_completed = HashSet::new();
        let mut newly_completed = Vec::new();
        {
            let completed = self.completed.lock().await;
            let previous = completed.get(&backend.id);
            for view in &views {
                if view.complete {
                    current_completed.insert(view.info_hash.clone());
                    if previous.map(|set| !set.contains(&view.info_hash)).unwrap_or(false) {
                        newly_completed.push(view.clone());
                    }
                }
            }
        }

        // One torrent's flaky RPC or store write must not cost the rest of
        // the backend their status history this tick.
        for view in &views {
            if let Err(e) = self.sample_torrent(&client, backend, view, now).await {
                warn!(
                    info_hash = %view.info_hash,
                    server = %backend.name,
                    "Torrent sample failed: {e}"
                );
            }
        }

        for view in newly_completed {
            info!(name = %view.name, server = %backend.name, "Torrent completed");
            self.events.publish(
                EventKind::Completed,
                &backend.user_id,
                Some(&backend.id),
                Some(&view.info_hash),
                json!({ "name": view.name, "size": view.size }),
            );
            if self
                .transfers
                .auto_download_enabled(backend, &view.info_hash)
                .await
            {
                if let Err(e) = self
                    .transfers
                    .submit(&backend.user_id, &view.info_hash, &backend.id, None)
                    .await
                {
                    warn!(info_hash = %view.info_hash, "Auto transfer submission failed: {e}");
                }
            }
        }

        self.completed
            .lock()
            .await
            .insert(backend.id.clone(), current_completed);
        Ok(())
    }

    /// Record one torrent's status, refresh its local row, and enforce the
    /// auto-pause policy.
    async fn sample_torrent(
        &self,
        client: &Arc<dyn BackendClient>,
        backend: &Backend,
        view: &TorrentView,
        now: NaiveDateTime,
    ) -> Result<(), DomainError> {
        let is_seeding = view.is_seeding();
        self.activity
            .record(&Status {
                torrent_hash: view.info_hash.clone(),
                backend_id: Some(backend.id.clone()),
                is_seeding,
                is_private: view.is_private,
                progress: view.progress,
                down_rate: view.down_rate,
                up_rate: view.up_rate,
                peers: view.peers,
                seeds: 0,
                timestamp: now,
            })
            .await?;

        // Keep the local torrent row in sync with what the backend sees.
        self.torrents
            .upsert(&Torrent {
                info_hash: view.info_hash.clone(),
                user_id: backend.user_id.clone(),
                backend_id: backend.id.clone(),
                name: view.name.clone(),
                size: view.size,
                is_private: view.is_private,
                base_path: Some(view.base_path.clone()),
                labels: Vec::new(),
                added_at: now,
            })
            .await?;

        if is_seeding && self.config.auto_pause_seeding {
            let duration = self
                .activity
                .seeding_duration(&view.info_hash, self.config.max_gap_seconds)
                .await?;
            let threshold = if view.is_private {
                self.config.private_seed_duration
            } else {
                self.config.public_seed_duration
            };
            if duration >= threshold {
                info!(
                    name = %view.name,
                    private = view.is_private,
                    hours = duration / 3600,
                    "Auto-pausing seeded torrent"
                );
                client.stop(&view.info_hash).await?;
                self.actions
                    .append(&Action {
                        torrent_hash: view.info_hash.clone(),
                        backend_id: Some(backend.id.clone()),
                        kind: ActionKind::Stop,
                        detail: Some("auto_pause".to_string()),
                        timestamp: now,
                    })
                    .await?;
                self.events.publish(
                    EventKind::Stopped,
                    &backend.user_id,
                    Some(&backend.id),
                    Some(&view.info_hash),
                    json!({ "name": view.name, "reason": "auto_pause" }),
                );
            }
        }
        Ok(())
    }
}
