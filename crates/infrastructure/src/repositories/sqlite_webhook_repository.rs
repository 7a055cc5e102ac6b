use async_trait::async_trait;
use chrono::NaiveDateTime;
use diesel::prelude::*;

use domain::{DomainError, Webhook, WebhookRepository};

use crate::database::schema::webhooks;
use crate::database::SqlitePool;
use crate::repositories::{blocking, get_conn, join_list, split_list};

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = webhooks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct WebhookModel {
    id: String,
    user_id: String,
    url: String,
    events: String,
    created_at: NaiveDateTime,
}

impl From<WebhookModel> for Webhook {
    fn from(model: WebhookModel) -> Self {
        Webhook {
            id: model.id,
            user_id: model.user_id,
            url: model.url,
            events: split_list(&model.events),
            created_at: model.created_at,
        }
    }
}

pub struct SqliteWebhookRepository {
    pool: SqlitePool,
}

impl SqliteWebhookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookRepository for SqliteWebhookRepository {
    async fn create(&self, webhook: &Webhook) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let webhook = webhook.clone();
        blocking(move || {
            diesel::insert_into(webhooks::table)
                .values((
                    webhooks::id.eq(&webhook.id),
                    webhooks::user_id.eq(&webhook.user_id),
                    webhooks::url.eq(&webhook.url),
                    webhooks::events.eq(join_list(&webhook.events)),
                    webhooks::created_at.eq(webhook.created_at),
                ))
                .execute(&mut conn)
                .map(|_| ())
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<Webhook>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let id = id.to_string();
        let model = blocking(move || {
            webhooks::table
                .filter(webhooks::id.eq(id))
                .select(WebhookModel::as_select())
                .first::<WebhookModel>(&mut conn)
                .optional()
        })
        .await?;
        Ok(model.map(Into::into))
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Webhook>, DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let user_id = user_id.to_string();
        let models = blocking(move || {
            webhooks::table
                .filter(webhooks::user_id.eq(user_id))
                .order(webhooks::created_at.asc())
                .select(WebhookModel::as_select())
                .load::<WebhookModel>(&mut conn)
        })
        .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn delete(&self, id: &str) -> Result<(), DomainError> {
        let mut conn = get_conn(&self.pool)?;
        let id = id.to_string();
        blocking(move || {
            diesel::delete(webhooks::table.filter(webhooks::id.eq(id)))
                .execute(&mut conn)
                .map(|_| ())
        })
        .await
    }
}
