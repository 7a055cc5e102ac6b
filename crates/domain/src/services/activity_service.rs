//! Status history and gap-aware seeding accumulation.

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, Utc};

use crate::entities::Status;
use crate::errors::DomainError;
use crate::repositories::StatusRepository;

/// Observations further apart than this count as offline time.
pub const DEFAULT_MAX_GAP_SECONDS: i64 = 300;
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

pub struct ActivityService {
    statuses: Arc<dyn StatusRepository>,
}

impl ActivityService {
    pub fn new(statuses: Arc<dyn StatusRepository>) -> Self {
        Self { statuses }
    }

    pub async fn record(&self, status: &Status) -> Result<(), DomainError> {
        self.statuses.append(status).await
    }

    /// Total seeding time for a torrent, computed purely from its status
    /// rows.
    ///
    /// Consecutive seeding observations accrue their spacing when it is
    /// under `max_gap_seconds`; a wider gap is treated as offline and
    /// skipped. A non-seeding observation resets the accumulated total.
    pub async fn seeding_duration(
        &self,
        torrent_hash: &str,
        max_gap_seconds: i64,
    ) -> Result<i64, DomainError> {
        let rows = self.statuses.for_torrent(torrent_hash).await?;
        Ok(accumulate_seeding(&rows, max_gap_seconds))
    }

    pub async fn never_seeded(&self, user_id: &str) -> Result<Vec<String>, DomainError> {
        self.statuses.never_seeded(user_id).await
    }

    pub async fn prune(&self, retention_days: i64) -> Result<usize, DomainError> {
        let cutoff = Utc::now().naive_utc() - Duration::days(retention_days);
        self.statuses.prune_before(cutoff).await
    }
}

/// Pure fold over timestamp-ordered status rows; see `seeding_duration`.
pub fn accumulate_seeding(rows: &[Status], max_gap_seconds: i64) -> i64 {
    let mut total: i64 = 0;
    let mut previous: Option<NaiveDateTime> = None;
    for row in rows {
        if !row.is_seeding {
            total = 0;
            previous = None;
            continue;
        }
        if let Some(prev) = previous {
            let gap = (row.timestamp - prev).num_seconds();
            if gap < max_gap_seconds {
                total += gap;
            }
        }
        previous = Some(row.timestamp);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn status_at(seconds: i64, seeding: bool) -> Status {
        Status {
            torrent_hash: "AAAA000000000000000000000000000000000000".to_string(),
            backend_id: Some("b1".to_string()),
            is_seeding: seeding,
            is_private: false,
            progress: 1.0,
            down_rate: 0,
            up_rate: 0,
            peers: 0,
            seeds: 0,
            timestamp: DateTime::from_timestamp(seconds, 0).unwrap().naive_utc(),
        }
    }

    #[test]
    fn continuous_seeding_spans_first_to_last() {
        let rows: Vec<Status> = [0, 60, 120, 180]
            .iter()
            .map(|t| status_at(*t, true))
            .collect();
        assert_eq!(accumulate_seeding(&rows, 300), 180);
    }

    #[test]
    fn non_seeding_observation_resets_the_accumulator() {
        let rows = vec![
            status_at(0, true),
            status_at(60, true),
            status_at(90, false),
            status_at(120, true),
            status_at(180, true),
        ];
        assert_eq!(accumulate_seeding(&rows, 300), 60);
    }

    #[test]
    fn wide_gap_is_skipped_without_resetting() {
        // Gap of 400 >= 300 between t=120 and t=520.
        let rows = vec![
            status_at(0, true),
            status_at(60, true),
            status_at(120, true),
            status_at(520, true),
            status_at(580, true),
        ];
        assert_eq!(accumulate_seeding(&rows, 300), (120 - 0) + (580 - 520));
    }

    #[test]
    fn gap_exactly_at_threshold_is_offline() {
        let rows = vec![status_at(0, true), status_at(300, true)];
        assert_eq!(accumulate_seeding(&rows, 300), 0);
    }

    #[test]
    fn empty_and_single_row_accrue_nothing() {
        assert_eq!(accumulate_seeding(&[], 300), 0);
        assert_eq!(accumulate_seeding(&[status_at(0, true)], 300), 0);
    }
}
