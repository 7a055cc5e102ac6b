use async_trait::async_trait;
use chrono::NaiveDateTime;
use diesel::prelude::*;

use domain::{DomainError, TransferJob, TransferRepository, TransferState};

use crate::database::schema::transfer_jobs;
use crate::database::SqlitePool;
use crate::repositories::{blocking, get_conn};

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = transfer_jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct TransferModel {
    id: String,
    user_id: String,
    torrent_hash: String,
    backend_id: String,
    source_path: String,
    dest_path: String,
    state: String,
    bytes_done: i64,
    bytes_total: i64,
    error: Option<String>,
    started_at: NaiveDateTime,
    finished_at: Option<NaiveDateTime>,
}

impl From<TransferModel> for TransferJob {
    fn from(model: TransferModel) -> Self {
        TransferJob {
            id: model.id,
            user_id: model.user_id,
            torrent_hash: model.torrent_hash,
            backend_id: model.backend_id,
            source_path: model.source_path,
            dest_path: model.dest_path,
            state: TransferState::parse(&model.state).unwrap_or(TransferState::Failed),
            bytes_done: model.bytes_done,
            bytes_total: model.bytes_total,
            error: model.error,
            started_at: model.started_at,
            finished_at: model.finished_at,
        }
    }
}

pub struct SqliteTransferRepository {
    pool: SqlitePool,
}

impl SqliteTransferRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransferRepository for SqliteTransferRepository {
    async fn create(&self, job: &TransferJob) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let job = job.clone();
        blocking(move || {
            diesel::insert_into(transfer_jobs::table)
                .values((
                    transfer_jobs::id.eq(&job.id),
                    transfer_jobs::user_id.eq(&job.user_id),
                    transfer_jobs::torrent_hash.eq(&job.torrent_hash),
                    transfer_jobs::backend_id.eq(&job.backend_id),
                    transfer_jobs::source_path.eq(&job.source_path),
                    transfer_jobs::dest_path.eq(&job.dest_path),
                    transfer_jobs::state.eq(job.state.as_str()),
                    transfer_jobs::bytes_done.eq(job.bytes_done),
                    transfer_jobs::bytes_total.eq(job.bytes_total),
                    transfer_jobs::error.eq(&job.error),
                    transfer_jobs::started_at.eq(job.started_at),
                    transfer_jobs::finished_at.eq(job.finished_at),
                ))
                .execute(&mut conn)
                .map(|_| ())
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<TransferJob>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let id = id.to_string();
        let model = blocking(move || {
            transfer_jobs::table
                .filter(transfer_jobs::id.eq(id))
                .select(TransferModel::as_select())
                .first::<TransferModel>(&mut conn)
                .optional()
        })
        .await?;
        Ok(model.map(Into::into))
    }

    async fn find_active(
        &self,
        torrent_hash: &str,
        backend_id: &str,
    ) -> Result<Option<TransferJob>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let torrent_hash = torrent_hash.to_string();
        let backend_id = backend_id.to_string();
        let model = blocking(move || {
            transfer_jobs::table
                .filter(transfer_jobs::torrent_hash.eq(torrent_hash))
                .filter(transfer_jobs::backend_id.eq(backend_id))
                .filter(transfer_jobs::state.eq_any(vec!["pending", "running"]))
                .select(TransferModel::as_select())
                .first::<TransferModel>(&mut conn)
                .optional()
        })
        .await?;
        Ok(model.map(Into::into))
    }

    async fn claim_pending(&self, limit: usize) -> Result<Vec<TransferJob>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let models = blocking(move || {
            conn.transaction(|conn| {
                let claimed: Vec<TransferModel> = transfer_jobs::table
                    .filter(transfer_jobs::state.eq("pending"))
                    .order(transfer_jobs::started_at.asc())
                    .limit(limit as i64)
                    .select(TransferModel::as_select())
                    .load(conn)?;
                let ids: Vec<&str> = claimed.iter().map(|m| m.id.as_str()).collect();
                diesel::update(transfer_jobs::table.filter(transfer_jobs::id.eq_any(ids)))
                    .set(transfer_jobs::state.eq("running"))
                    .execute(conn)?;
                Ok(claimed)
            })
        })
        .await?;
        Ok(models
            .into_iter()
            .map(|model| {
                let mut job: TransferJob = model.into();
                job.state = TransferState::Running;
                job
            })
            .collect())
    }

    async fn update_progress(&self, id: &str, bytes_done: i64) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let id = id.to_string();
        blocking(move || {
            diesel::update(transfer_jobs::table.filter(transfer_jobs::id.eq(id)))
                .set(transfer_jobs::bytes_done.eq(bytes_done))
                .execute(&mut conn)
                .map(|_| ())
        })
        .await
    }

    async fn finish(
        &self,
        id: &str,
        state: TransferState,
        bytes_done: i64,
        error: Option<String>,
        finished_at: NaiveDateTime,
    ) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let id = id.to_string();
        blocking(move || {
            diesel::update(transfer_jobs::table.filter(transfer_jobs::id.eq(id)))
                .set((
                    transfer_jobs::state.eq(state.as_str()),
                    transfer_jobs::bytes_done.eq(bytes_done),
                    transfer_jobs::error.eq(error),
                    transfer_jobs::finished_at.eq(finished_at),
                ))
                .execute(&mut conn)
                .map(|_| ())
        })
        .await
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<TransferJob>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let user_id = user_id.to_string();
        let models = blocking(move || {
            transfer_jobs::table
                .filter(transfer_jobs::user_id.eq(user_id))
                .order(transfer_jobs::started_at.desc())
                .select(TransferModel::as_select())
                .load::<TransferModel>(&mut conn)
        })
        .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }
}
