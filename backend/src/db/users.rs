use crate::models::{Photo, User, UserProfile};
use crate::services::UserDirectory;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgPool};

#[derive(Debug, FromRow)]
struct UserRow {
    id: i32,
    full_name: Option<String>,
    role: String,
    is_deleted: bool,
    fcm_token: Option<String>,
    photos: Option<Json<Vec<Photo>>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            full_name: row.full_name,
            role: row.role,
            is_deleted: row.is_deleted,
            fcm_token: row.fcm_token,
            photos: row.photos.map(|photos| photos.0).unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ProfileRow {
    id: i32,
    full_name: Option<String>,
    photos: Option<Json<Vec<Photo>>>,
}

impl From<ProfileRow> for UserProfile {
    fn from(row: ProfileRow) -> Self {
        Self {
            id: row.id,
            full_name: row.full_name,
            photos: row.photos.map(|photos| photos.0).unwrap_or_default(),
        }
    }
}

pub async fn get_user_by_id(pool: &PgPool, user_id: i32) -> Result<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT id, full_name, role, is_deleted, fcm_token, photos, created_at, updated_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(User::from))
}

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_id(&self, id: i32) -> Result<Option<User>> {
        get_user_by_id(&self.pool, id).await
    }
}
