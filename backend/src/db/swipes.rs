use crate::constants::ADMIN_ROLE;
use crate::models::{MatchPair, SwipeRecord, UserProfile};
use crate::services::{SwipeStore, UnknownUser};
use super::users::ProfileRow;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::{PgPool, Row};

const FOREIGN_KEY_VIOLATION: &str = "23503";
const ACTOR_FOREIGN_KEY: &str = "swipes_actor_id_fkey";

pub async fn find_swipe(pool: &PgPool, actor_id: i32, target_id: i32) -> Result<Option<SwipeRecord>> {
    let swipe = sqlx::query_as::<_, SwipeRecord>(
        r#"
        SELECT id, actor_id, target_id, created_at, presence_synced_at
        FROM swipes
        WHERE actor_id = $1 AND target_id = $2
        "#,
    )
    .bind(actor_id)
    .bind(target_id)
    .fetch_optional(pool)
    .await?;

    Ok(swipe)
}

/// Returns `None` when the edge already exists.
pub async fn insert_swipe(pool: &PgPool, actor_id: i32, target_id: i32) -> Result<Option<SwipeRecord>> {
    let result = sqlx::query_as::<_, SwipeRecord>(
        r#"
        INSERT INTO swipes (actor_id, target_id)
        VALUES ($1, $2)
        ON CONFLICT ON CONSTRAINT swipes_actor_target_unique DO NOTHING
        RETURNING id, actor_id, target_id, created_at, presence_synced_at
        "#,
    )
    .bind(actor_id)
    .bind(target_id)
    .fetch_optional(pool)
    .await;

    match result {
        Ok(swipe) => Ok(swipe),
        Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) => {
            let missing = if db_err.constraint() == Some(ACTOR_FOREIGN_KEY) {
                actor_id
            } else {
                target_id
            };
            Err(UnknownUser(missing).into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Returns `true` only for the first caller on a given closing edge.
pub async fn claim_match(pool: &PgPool, match_id: i64) -> Result<bool> {
    let claimed = sqlx::query(
        r#"
        UPDATE swipes
        SET finalized_at = NOW()
        WHERE id = $1 AND finalized_at IS NULL
        RETURNING id
        "#,
    )
    .bind(match_id)
    .fetch_optional(pool)
    .await?;

    Ok(claimed.is_some())
}

pub async fn list_matched_users(pool: &PgPool, user_id: i32) -> Result<Vec<UserProfile>> {
    let rows = sqlx::query_as::<_, ProfileRow>(
        r#"
        SELECT u.id, u.full_name, u.photos
        FROM swipes mine
        JOIN swipes theirs ON theirs.actor_id = mine.target_id AND theirs.target_id = mine.actor_id
        JOIN users u ON u.id = mine.target_id
        WHERE mine.actor_id = $1
        AND u.id <> $1
        AND u.is_deleted = FALSE
        AND u.role <> $2
        AND NOT EXISTS (
            SELECT 1 FROM blocked_users b
            WHERE b.user_id = $1 AND b.blocked_user_id = u.id
        )
        ORDER BY GREATEST(mine.id, theirs.id) DESC
        "#,
    )
    .bind(user_id)
    .bind(ADMIN_ROLE)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(UserProfile::from).collect())
}

pub async fn mark_presence_synced(pool: &PgPool, swipe_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE swipes
        SET presence_synced_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(swipe_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_unsynced_matches(pool: &PgPool, limit: i64) -> Result<Vec<MatchPair>> {
    let rows = sqlx::query(
        r#"
        SELECT
            o.id as o_id, o.actor_id as o_actor, o.target_id as o_target,
            o.created_at as o_created_at, o.presence_synced_at as o_synced_at,
            c.id as c_id, c.actor_id as c_actor, c.target_id as c_target,
            c.created_at as c_created_at, c.presence_synced_at as c_synced_at
        FROM swipes c
        JOIN swipes o ON o.actor_id = c.target_id AND o.target_id = c.actor_id
        WHERE o.id < c.id -- c is the closing edge
        AND c.presence_synced_at IS NULL
        ORDER BY c.id ASC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut result = Vec::with_capacity(rows.len());
    for row in rows {
        let opening = SwipeRecord {
            id: row.try_get("o_id")?,
            actor_id: row.try_get("o_actor")?,
            target_id: row.try_get("o_target")?,
            created_at: row.try_get("o_created_at")?,
            presence_synced_at: row.try_get("o_synced_at")?,
        };

        let closing = SwipeRecord {
            id: row.try_get("c_id")?,
            actor_id: row.try_get("c_actor")?,
            target_id: row.try_get("c_target")?,
            created_at: row.try_get("c_created_at")?,
            presence_synced_at: row.try_get("c_synced_at")?,
        };

        result.push(MatchPair { opening, closing });
    }

    Ok(result)
}

#[derive(Clone)]
pub struct PgSwipeStore {
    pool: PgPool,
}

impl PgSwipeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SwipeStore for PgSwipeStore {
    async fn find_swipe(&self, actor_id: i32, target_id: i32) -> Result<Option<SwipeRecord>> {
        find_swipe(&self.pool, actor_id, target_id).await
    }

    async fn insert_swipe(&self, actor_id: i32, target_id: i32) -> Result<Option<SwipeRecord>> {
        insert_swipe(&self.pool, actor_id, target_id).await
    }

    async fn claim_match(&self, match_id: i64) -> Result<bool> {
        claim_match(&self.pool, match_id).await
    }

    async fn list_matches(&self, user_id: i32) -> Result<Vec<UserProfile>> {
        list_matched_users(&self.pool, user_id).await
    }

    async fn mark_presence_synced(&self, match_id: i64) -> Result<()> {
        mark_presence_synced(&self.pool, match_id).await
    }

    async fn list_unsynced_matches(&self, limit: i64) -> Result<Vec<MatchPair>> {
        find_unsynced_matches(&self.pool, limit).await
    }
}
