use crate::models::{NewNotification, NotificationRecord, PushMessage};
use crate::services::{fcm::FcmClient, NotificationDispatcher};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

pub async fn create_notification(pool: &PgPool, notification: &NewNotification) -> Result<NotificationRecord> {
    let record = sqlx::query_as::<_, NotificationRecord>(
        r#"
        INSERT INTO notifications (from_user_id, to_user_id, kind, title, body)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, from_user_id, to_user_id, kind, sub_kind, title, body, is_read, created_at
        "#,
    )
    .bind(notification.from_user_id)
    .bind(notification.to_user_id)
    .bind(&notification.kind)
    .bind(&notification.title)
    .bind(&notification.body)
    .fetch_one(pool)
    .await?;

    Ok(record)
}

/// Stores notifications in Postgres and pushes them through FCM when a push
/// client is configured.
#[derive(Clone)]
pub struct PgNotificationDispatcher {
    pool: PgPool,
    push: Option<FcmClient>,
}

impl PgNotificationDispatcher {
    pub fn new(pool: PgPool, push: Option<FcmClient>) -> Self {
        Self { pool, push }
    }
}

#[async_trait]
impl NotificationDispatcher for PgNotificationDispatcher {
    async fn create_notification(&self, notification: NewNotification) -> Result<NotificationRecord> {
        create_notification(&self.pool, &notification).await
    }

    async fn send(&self, message: PushMessage) -> Result<()> {
        match &self.push {
            Some(client) => client.send(&message).await,
            None => {
                debug!("Push disabled, notification {} not delivered", message.notification_id);
                Ok(())
            }
        }
    }
}
