use async_trait::async_trait;
use diesel::prelude::*;

use domain::{DomainError, SettingRepository, TorrentSetting};

use crate::database::schema::torrent_settings;
use crate::database::SqlitePool;
use crate::repositories::{blocking, get_conn};

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = torrent_settings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct SettingModel {
    #[allow(dead_code)]
    id: i32,
    user_id: String,
    torrent_hash: String,
    key: String,
    value: String,
}

impl From<SettingModel> for TorrentSetting {
    fn from(model: SettingModel) -> Self {
        TorrentSetting {
            user_id: model.user_id,
            torrent_hash: model.torrent_hash,
            key: model.key,
            value: model.value,
        }
    }
}

pub struct SqliteSettingRepository {
    pool: SqlitePool,
}

impl SqliteSettingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingRepository for SqliteSettingRepository {
    async fn set(&self, setting: &TorrentSetting) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let setting = setting.clone();
        blocking(move || {
            diesel::insert_into(torrent_settings::table)
                .values((
                    torrent_settings::user_id.eq(&setting.user_id),
                    torrent_settings::torrent_hash.eq(&setting.torrent_hash),
                    torrent_settings::key.eq(&setting.key),
                    torrent_settings::value.eq(&setting.value),
                ))
                .on_conflict((
                    torrent_settings::user_id,
                    torrent_settings::torrent_hash,
                    torrent_settings::key,
                ))
                .do_update()
                .set(torrent_settings::value.eq(&setting.value))
                .execute(&mut conn)
                .map(|_| ())
        })
        .await
    }

    async fn get(
        &self,
        user_id: &str,
        torrent_hash: &str,
        key: &str,
    ) -> Result<Option<TorrentSetting>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let user_id = user_id.to_string();
        let torrent_hash = torrent_hash.to_string();
        let key = key.to_string();
        let model = blocking(move || {
            torrent_settings::table
                .filter(torrent_settings::user_id.eq(user_id))
                .filter(torrent_settings::torrent_hash.eq(torrent_hash))
                .filter(torrent_settings::key.eq(key))
                .select(SettingModel::as_select())
                .first::<SettingModel>(&mut conn)
                .optional()
        })
        .await?;
        Ok(model.map(Into::into))
    }

    async fn list(
        &self,
        user_id: &str,
        torrent_hash: &str,
    ) -> Result<Vec<TorrentSetting>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let user_id = user_id.to_string();
        let torrent_hash = torrent_hash.to_string();
        let models = blocking(move || {
            torrent_settings::table
                .filter(torrent_settings::user_id.eq(user_id))
                .filter(torrent_settings::torrent_hash.eq(torrent_hash))
                .select(SettingModel::as_select())
                .load::<SettingModel>(&mut conn)
        })
        .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn delete(
        &self,
        user_id: &str,
        torrent_hash: &str,
        key: &str,
    ) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let user_id = user_id.to_string();
        let torrent_hash = torrent_hash.to_string();
        let key = key.to_string();
        blocking(move || {
            diesel::delete(
                torrent_settings::table
                    .filter(torrent_settings::user_id.eq(user_id))
                    .filter(torrent_settings::torrent_hash.eq(torrent_hash))
                    .filter(torrent_settings::key.eq(key)),
            )
            .execute(&mut conn)
            .map(|_| ())
        })
        .await
    }
}
