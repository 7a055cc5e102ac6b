use async_trait::async_trait;
use chrono::NaiveDateTime;
use diesel::prelude::*;

use domain::{DomainError, User, UserRepository};

use crate::database::schema::{
    actions, api_keys, backends, remember_tokens, sessions, statuses, torrent_settings, torrents,
    transfer_jobs, users, webhooks,
};
use crate::database::SqlitePool;
use crate::repositories::{blocking, get_conn};

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct UserModel {
    id: String,
    username: String,
    password_hash: String,
    is_admin: bool,
    created_at: NaiveDateTime,
}

impl From<UserModel> for User {
    fn from(model: UserModel) -> Self {
        User::new(
            model.id,
            model.username,
            model.password_hash,
            model.is_admin,
            model.created_at,
        )
    }
}

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, user: &User) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let user = user.clone();
        blocking(move || {
            diesel::insert_into(users::table)
                .values((
                    users::id.eq(&user.id),
                    users::username.eq(&user.username),
                    users::password_hash.eq(&user.password_hash),
                    users::is_admin.eq(user.is_admin),
                    users::created_at.eq(user.created_at),
                ))
                .execute(&mut conn)
                .map(|_| ())
        })
        .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let id = id.to_string();
        let result = blocking(move || {
            users::table
                .filter(users::id.eq(id))
                .select(UserModel::as_select())
                .first::<UserModel>(&mut conn)
                .optional()
        })
        .await?;
        Ok(result.map(Into::into))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let username = username.to_string();
        let result = blocking(move || {
            users::table
                .filter(users::username.eq(username))
                .select(UserModel::as_select())
                .first::<UserModel>(&mut conn)
                .optional()
        })
        .await?;
        Ok(result.map(Into::into))
    }

    async fn list(&self) -> Result<Vec<User>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let result = blocking(move || {
            users::table
                .order(users::created_at.asc())
                .select(UserModel::as_select())
                .load::<UserModel>(&mut conn)
        })
        .await?;
        Ok(result.into_iter().map(Into::into).collect())
    }

    async fn count(&self) -> Result<i64, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        blocking(move || users::table.count().get_result(&mut conn)).await
    }

    async fn delete_cascade(&self, id: &str) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let id = id.to_string();
        blocking(move || {
            conn.transaction(|conn| {
                let hashes: Vec<String> = torrents::table
                    .filter(torrents::user_id.eq(&id))
                    .select(torrents::info_hash)
                    .load(conn)?;
                diesel::delete(statuses::table.filter(statuses::torrent_hash.eq_any(&hashes)))
                    .execute(conn)?;
                diesel::delete(actions::table.filter(actions::torrent_hash.eq_any(&hashes)))
                    .execute(conn)?;
                diesel::delete(torrents::table.filter(torrents::user_id.eq(&id))).execute(conn)?;
                diesel::delete(backends::table.filter(backends::user_id.eq(&id))).execute(conn)?;
                diesel::delete(transfer_jobs::table.filter(transfer_jobs::user_id.eq(&id)))
                    .execute(conn)?;
                diesel::delete(
                    torrent_settings::table.filter(torrent_settings::user_id.eq(&id)),
                )
                .execute(conn)?;
                diesel::delete(sessions::table.filter(sessions::user_id.eq(&id))).execute(conn)?;
                diesel::delete(
                    remember_tokens::table.filter(remember_tokens::user_id.eq(&id)),
                )
                .execute(conn)?;
                diesel::delete(api_keys::table.filter(api_keys::user_id.eq(&id))).execute(conn)?;
                diesel::delete(webhooks::table.filter(webhooks::user_id.eq(&id))).execute(conn)?;
                diesel::delete(users::table.filter(users::id.eq(&id))).execute(conn)?;
                Ok(())
            })
        })
        .await
    }
}
