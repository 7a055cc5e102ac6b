use async_trait::async_trait;
use chrono::NaiveDateTime;
use diesel::prelude::*;

use domain::{ApiKey, CredentialRepository, DomainError, RememberToken, Session};

use crate::database::schema::{api_keys, remember_tokens, sessions};
use crate::database::SqlitePool;
use crate::repositories::{blocking, get_conn};

#[derive(Queryable, Selectable, Insertable, Debug)]
#[diesel(table_name = sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct SessionModel {
    id: String,
    user_id: String,
    created_at: NaiveDateTime,
    last_activity: NaiveDateTime,
    expires_at: NaiveDateTime,
    ip: Option<String>,
    user_agent: Option<String>,
}

impl From<SessionModel> for Session {
    fn from(model: SessionModel) -> Self {
        Session {
            id: model.id,
            user_id: model.user_id,
            created_at: model.created_at,
            last_activity: model.last_activity,
            expires_at: model.expires_at,
            ip: model.ip,
            user_agent: model.user_agent,
        }
    }
}

impl From<&Session> for SessionModel {
    fn from(session: &Session) -> Self {
        SessionModel {
            id: session.id.clone(),
            user_id: session.user_id.clone(),
            created_at: session.created_at,
            last_activity: session.last_activity,
            expires_at: session.expires_at,
            ip: session.ip.clone(),
            user_agent: session.user_agent.clone(),
        }
    }
}

#[derive(Queryable, Selectable, Insertable, Debug)]
#[diesel(table_name = remember_tokens)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct RememberModel {
    id: String,
    user_id: String,
    created_at: NaiveDateTime,
    expires_at: NaiveDateTime,
    ip: Option<String>,
    user_agent: Option<String>,
    revoked: bool,
}

impl From<RememberModel> for RememberToken {
    fn from(model: RememberModel) -> Self {
        RememberToken {
            id: model.id,
            user_id: model.user_id,
            created_at: model.created_at,
            expires_at: model.expires_at,
            ip: model.ip,
            user_agent: model.user_agent,
            revoked: model.revoked,
        }
    }
}

#[derive(Queryable, Selectable, Insertable, Debug)]
#[diesel(table_name = api_keys)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct ApiKeyModel {
    id: String,
    prefix: String,
    user_id: String,
    name: String,
    created_at: NaiveDateTime,
    last_used_at: Option<NaiveDateTime>,
    expires_at: Option<NaiveDateTime>,
    revoked: bool,
}

impl From<ApiKeyModel> for ApiKey {
    fn from(model: ApiKeyModel) -> Self {
        ApiKey {
            id: model.id,
            prefix: model.prefix,
            user_id: model.user_id,
            name: model.name,
            created_at: model.created_at,
            last_used_at: model.last_used_at,
            expires_at: model.expires_at,
            revoked: model.revoked,
        }
    }
}

pub struct SqliteCredentialRepository {
    pool: SqlitePool,
}

impl SqliteCredentialRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialRepository for SqliteCredentialRepository {
    async fn create_session(&self, session: &Session) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let model = SessionModel::from(session);
        blocking(move || {
            diesel::insert_into(sessions::table)
                .values(&model)
                .execute(&mut conn)
                .map(|_| ())
        })
        .await
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let id = id.to_string();
        let model = blocking(move || {
            sessions::table
                .filter(sessions::id.eq(id))
                .select(SessionModel::as_select())
                .first::<SessionModel>(&mut conn)
                .optional()
        })
        .await?;
        Ok(model.map(Into::into))
    }

    async fn slide_session(
        &self,
        id: &str,
        last_activity: NaiveDateTime,
        expires_at: NaiveDateTime,
    ) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let id = id.to_string();
        blocking(move || {
            diesel::update(sessions::table.filter(sessions::id.eq(id)))
                .set((
                    sessions::last_activity.eq(last_activity),
                    sessions::expires_at.eq(expires_at),
                ))
                .execute(&mut conn)
                .map(|_| ())
        })
        .await
    }

    async fn delete_session(&self, id: &str) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let id = id.to_string();
        blocking(move || {
            diesel::delete(sessions::table.filter(sessions::id.eq(id)))
                .execute(&mut conn)
                .map(|_| ())
        })
        .await
    }

    async fn create_remember_token(&self, token: &RememberToken) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let model = RememberModel {
            id: token.id.clone(),
            user_id: token.user_id.clone(),
            created_at: token.created_at,
            expires_at: token.expires_at,
            ip: token.ip.clone(),
            user_agent: token.user_agent.clone(),
            revoked: token.revoked,
        };
        blocking(move || {
            diesel::insert_into(remember_tokens::table)
                .values(&model)
                .execute(&mut conn)
                .map(|_| ())
        })
        .await
    }

    async fn get_remember_token(&self, id: &str) -> Result<Option<RememberToken>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let id = id.to_string();
        let model = blocking(move || {
            remember_tokens::table
                .filter(remember_tokens::id.eq(id))
                .select(RememberModel::as_select())
                .first::<RememberModel>(&mut conn)
                .optional()
        })
        .await?;
        Ok(model.map(Into::into))
    }

    async fn revoke_remember_token(&self, id: &str) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let id = id.to_string();
        blocking(move || {
            diesel::update(remember_tokens::table.filter(remember_tokens::id.eq(id)))
                .set(remember_tokens::revoked.eq(true))
                .execute(&mut conn)
                .map(|_| ())
        })
        .await
    }

    async fn create_api_key(&self, key: &ApiKey) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let model = ApiKeyModel {
            id: key.id.clone(),
            prefix: key.prefix.clone(),
            user_id: key.user_id.clone(),
            name: key.name.clone(),
            created_at: key.created_at,
            last_used_at: key.last_used_at,
            expires_at: key.expires_at,
            revoked: key.revoked,
        };
        blocking(move || {
            diesel::insert_into(api_keys::table)
                .values(&model)
                .execute(&mut conn)
                .map(|_| ())
        })
        .await
    }

    async fn get_api_key(&self, id: &str) -> Result<Option<ApiKey>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let id = id.to_string();
        let model = blocking(move || {
            api_keys::table
                .filter(api_keys::id.eq(id))
                .select(ApiKeyModel::as_select())
                .first::<ApiKeyModel>(&mut conn)
                .optional()
        })
        .await?;
        Ok(model.map(Into::into))
    }

    async fn find_api_key_by_prefix(
        &self,
        user_id: &str,
        prefix: &str,
    ) -> Result<Option<ApiKey>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let user_id = user_id.to_string();
        let prefix = prefix.to_string();
        let model = blocking(move || {
            api_keys::table
                .filter(api_keys::user_id.eq(user_id))
                .filter(api_keys::prefix.eq(prefix))
                .select(ApiKeyModel::as_select())
                .first::<ApiKeyModel>(&mut conn)
                .optional()
        })
        .await?;
        Ok(model.map(Into::into))
    }

    async fn list_api_keys(&self, user_id: &str) -> Result<Vec<ApiKey>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let user_id = user_id.to_string();
        let models = blocking(move || {
            api_keys::table
                .filter(api_keys::user_id.eq(user_id))
                .order(api_keys::created_at.asc())
                .select(ApiKeyModel::as_select())
                .load::<ApiKeyModel>(&mut conn)
        })
        .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn revoke_api_key(&self, id: &str) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let id = id.to_string();
        blocking(move || {
            diesel::update(api_keys::table.filter(api_keys::id.eq(id)))
                .set(api_keys::revoked.eq(true))
                .execute(&mut conn)
                .map(|_| ())
        })
        .await
    }

    async fn touch_api_key(&self, id: &str, used_at: NaiveDateTime) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let id = id.to_string();
        blocking(move || {
            diesel::update(api_keys::table.filter(api_keys::id.eq(id)))
                .set(api_keys::last_used_at.eq(used_at))
                .execute(&mut conn)
                .map(|_| ())
        })
        .await
    }

    async fn delete_expired(&self, now: NaiveDateTime) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        blocking(move || {
            diesel::delete(sessions::table.filter(sessions::expires_at.lt(now)))
                .execute(&mut conn)?;
            diesel::delete(
                remember_tokens::table.filter(
                    remember_tokens::expires_at
                        .lt(now)
                        .or(remember_tokens::revoked.eq(true)),
                ),
            )
            .execute(&mut conn)
            .map(|_| ())
        })
        .await
    }
}
