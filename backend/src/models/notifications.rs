use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub from_user_id: i32,
    pub to_user_id: i32,
    pub kind: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct NotificationRecord {
    pub id: i64,
    pub from_user_id: i32,
    pub to_user_id: i32,
    pub kind: String,
    pub sub_kind: Option<String>,
    pub title: String,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A device push for an already persisted notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub device_token: String,
    pub notification_id: i64,
    pub kind: String,
    pub sub_kind: String,
    pub title: String,
    pub body: String,
    pub counterparty_id: i32,
    pub counterparty_image_url: Option<String>,
}
