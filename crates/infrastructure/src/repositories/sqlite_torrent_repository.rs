use async_trait::async_trait;
use chrono::NaiveDateTime;
use diesel::prelude::*;

use domain::{DomainError, Torrent, TorrentRepository};

use crate::database::schema::torrents;
use crate::database::SqlitePool;
use crate::repositories::{blocking, get_conn, join_list, split_list};

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = torrents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct TorrentModel {
    #[allow(dead_code)]
    id: i32,
    info_hash: String,
    user_id: String,
    backend_id: String,
    name: String,
    size: i64,
    is_private: bool,
    base_path: Option<String>,
    labels: String,
    added_at: NaiveDateTime,
}

impl From<TorrentModel> for Torrent {
    fn from(model: TorrentModel) -> Self {
        Torrent {
            info_hash: model.info_hash,
            user_id: model.user_id,
            backend_id: model.backend_id,
            name: model.name,
            size: model.size,
            is_private: model.is_private,
            base_path: model.base_path,
            labels: split_list(&model.labels),
            added_at: model.added_at,
        }
    }
}

pub struct SqliteTorrentRepository {
    pool: SqlitePool,
}

impl SqliteTorrentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TorrentRepository for SqliteTorrentRepository {
    async fn upsert(&self, torrent: &Torrent) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let torrent = torrent.clone();
        blocking(move || {
            // Refresh live fields on conflict; added_at and labels belong to
            // the first insert.
            diesel::insert_into(torrents::table)
                .values((
                    torrents::info_hash.eq(&torrent.info_hash),
                    torrents::user_id.eq(&torrent.user_id),
                    torrents::backend_id.eq(&torrent.backend_id),
                    torrents::name.eq(&torrent.name),
                    torrents::size.eq(torrent.size),
                    torrents::is_private.eq(torrent.is_private),
                    torrents::base_path.eq(&torrent.base_path),
                    torrents::labels.eq(join_list(&torrent.labels)),
                    torrents::added_at.eq(torrent.added_at),
                ))
                .on_conflict((
                    torrents::user_id,
                    torrents::info_hash,
                    torrents::backend_id,
                ))
                .do_update()
                .set((
                    torrents::name.eq(&torrent.name),
                    torrents::size.eq(torrent.size),
                    torrents::is_private.eq(torrent.is_private),
                    torrents::base_path.eq(&torrent.base_path),
                ))
                .execute(&mut conn)
                .map(|_| ())
        })
        .await
    }

    async fn find(&self, user_id: &str, info_hash: &str) -> Result<Vec<Torrent>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let user_id = user_id.to_string();
        let info_hash = info_hash.to_string();
        let models = blocking(move || {
            torrents::table
                .filter(torrents::user_id.eq(user_id))
                .filter(torrents::info_hash.eq(info_hash))
                .select(TorrentModel::as_select())
                .load::<TorrentModel>(&mut conn)
        })
        .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn get(
        &self,
        user_id: &str,
        info_hash: &str,
        backend_id: &str,
    ) -> Result<Option<Torrent>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let user_id = user_id.to_string();
        let info_hash = info_hash.to_string();
        let backend_id = backend_id.to_string();
        let model = blocking(move || {
            torrents::table
                .filter(torrents::user_id.eq(user_id))
                .filter(torrents::info_hash.eq(info_hash))
                .filter(torrents::backend_id.eq(backend_id))
                .select(TorrentModel::as_select())
                .first::<TorrentModel>(&mut conn)
                .optional()
        })
        .await?;
        Ok(model.map(Into::into))
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Torrent>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let user_id = user_id.to_string();
        let models = blocking(move || {
            torrents::table
                .filter(torrents::user_id.eq(user_id))
                .order(torrents::added_at.desc())
                .select(TorrentModel::as_select())
                .load::<TorrentModel>(&mut conn)
        })
        .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn delete(
        &self,
        user_id: &str,
        info_hash: &str,
        backend_id: &str,
    ) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let user_id = user_id.to_string();
        let info_hash = info_hash.to_string();
        let backend_id = backend_id.to_string();
        blocking(move || {
            diesel::delete(
                torrents::table
                    .filter(torrents::user_id.eq(user_id))
                    .filter(torrents::info_hash.eq(info_hash))
                    .filter(torrents::backend_id.eq(backend_id)),
            )
            .execute(&mut conn)
            .map(|_| ())
        })
        .await
    }

    async fn set_labels(
        &self,
        user_id: &str,
        info_hash: &str,
        backend_id: &str,
        labels: &[String],
    ) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let user_id = user_id.to_string();
        let info_hash = info_hash.to_string();
        let backend_id = backend_id.to_string();
        let labels = join_list(labels);
        blocking(move || {
            diesel::update(
                torrents::table
                    .filter(torrents::user_id.eq(user_id))
                    .filter(torrents::info_hash.eq(info_hash))
                    .filter(torrents::backend_id.eq(backend_id)),
            )
            .set(torrents::labels.eq(labels))
            .execute(&mut conn)
            .map(|_| ())
        })
        .await
    }
}
