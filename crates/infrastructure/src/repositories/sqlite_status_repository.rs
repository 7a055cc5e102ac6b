use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use diesel::prelude::*;

use domain::{Action, ActionKind, ActionRepository, DomainError, Status, StatusRepository};

use crate::database::schema::{actions, statuses, torrents};
use crate::database::SqlitePool;
use crate::repositories::{blocking, get_conn};

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = statuses)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct StatusModel {
    #[allow(dead_code)]
    id: i32,
    torrent_hash: String,
    backend_id: Option<String>,
    is_seeding: bool,
    is_private: bool,
    progress: f64,
    down_rate: i64,
    up_rate: i64,
    peers: i32,
    seeds: i32,
    timestamp: NaiveDateTime,
}

impl From<StatusModel> for Status {
    fn from(model: StatusModel) -> Self {
        Status {
            torrent_hash: model.torrent_hash,
            backend_id: model.backend_id,
            is_seeding: model.is_seeding,
            is_private: model.is_private,
            progress: model.progress,
            down_rate: model.down_rate,
            up_rate: model.up_rate,
            peers: model.peers,
            seeds: model.seeds,
            timestamp: model.timestamp,
        }
    }
}

pub struct SqliteStatusRepository {
    pool: SqlitePool,
}

impl SqliteStatusRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusRepository for SqliteStatusRepository {
    async fn append(&self, status: &Status) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let status = status.clone();
        blocking(move || {
            diesel::insert_into(statuses::table)
                .values((
                    statuses::torrent_hash.eq(&status.torrent_hash),
                    statuses::backend_id.eq(&status.backend_id),
                    statuses::is_seeding.eq(status.is_seeding),
                    statuses::is_private.eq(status.is_private),
                    statuses::progress.eq(status.progress),
                    statuses::down_rate.eq(status.down_rate),
                    statuses::up_rate.eq(status.up_rate),
                    statuses::peers.eq(status.peers),
                    statuses::seeds.eq(status.seeds),
                    statuses::timestamp.eq(status.timestamp),
                ))
                .execute(&mut conn)
                .map(|_| ())
        })
        .await
    }

    async fn for_torrent(&self, torrent_hash: &str) -> Result<Vec<Status>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let torrent_hash = torrent_hash.to_string();
        let models = blocking(move || {
            statuses::table
                .filter(statuses::torrent_hash.eq(torrent_hash))
                .order(statuses::timestamp.asc())
                .select(StatusModel::as_select())
                .load::<StatusModel>(&mut conn)
        })
        .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn prune_before(&self, cutoff: NaiveDateTime) -> Result<usize, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        blocking(move || {
            diesel::delete(statuses::table.filter(statuses::timestamp.lt(cutoff)))
                .execute(&mut conn)
        })
        .await
    }

    async fn never_seeded(&self, user_id: &str) -> Result<Vec<String>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let user_id = user_id.to_string();
        blocking(move || {
            let owned: Vec<String> = torrents::table
                .filter(torrents::user_id.eq(&user_id))
                .select(torrents::info_hash)
                .distinct()
                .load(&mut conn)?;
            let observed: Vec<String> = statuses::table
                .filter(statuses::torrent_hash.eq_any(&owned))
                .select(statuses::torrent_hash)
                .distinct()
                .load(&mut conn)?;
            let seeded: HashSet<String> = statuses::table
                .filter(statuses::torrent_hash.eq_any(&owned))
                .filter(statuses::is_seeding.eq(true))
                .select(statuses::torrent_hash)
                .distinct()
                .load::<String>(&mut conn)?
                .into_iter()
                .collect();
            Ok(observed
                .into_iter()
                .filter(|hash| !seeded.contains(hash))
                .collect())
        })
        .await
    }
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = actions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct ActionModel {
    #[allow(dead_code)]
    id: i32,
    torrent_hash: String,
    backend_id: Option<String>,
    kind: String,
    detail: Option<String>,
    timestamp: NaiveDateTime,
}

pub struct SqliteActionRepository {
    pool: SqlitePool,
}

impl SqliteActionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActionRepository for SqliteActionRepository {
    async fn append(&self, action: &Action) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let action = action.clone();
        blocking(move || {
            diesel::insert_into(actions::table)
                .values((
                    actions::torrent_hash.eq(&action.torrent_hash),
                    actions::backend_id.eq(&action.backend_id),
                    actions::kind.eq(action.kind.as_str()),
                    actions::detail.eq(&action.detail),
                    actions::timestamp.eq(action.timestamp),
                ))
                .execute(&mut conn)
                .map(|_| ())
        })
        .await
    }

    async fn for_torrent(&self, torrent_hash: &str) -> Result<Vec<Action>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let torrent_hash = torrent_hash.to_string();
        let models = blocking(move || {
            actions::table
                .filter(actions::torrent_hash.eq(torrent_hash))
                .order(actions::timestamp.asc())
                .select(ActionModel::as_select())
                .load::<ActionModel>(&mut conn)
        })
        .await?;
        Ok(models
            .into_iter()
            .map(|model| Action {
                torrent_hash: model.torrent_hash,
                backend_id: model.backend_id,
                kind: ActionKind::parse(&model.kind).unwrap_or(ActionKind::Error),
                detail: model.detail,
                timestamp: model.timestamp,
            })
            .collect())
    }
}
