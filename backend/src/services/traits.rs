// Trait definitions for the collaborators of the match engine.
//
// Infrastructure only: storage, lookup, delivery and credential issuing.
// Matching rules live in services::matching and only talk to these traits.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{
    MatchPair, NewNotification, NotificationRecord, PushMessage, SwipeRecord, User, UserProfile,
};

// =============================================================================
// Swipe Store (relational system of record)
// =============================================================================

/// A swipe referenced a user that does not exist.
#[derive(Debug, Error)]
#[error("User {0} does not exist")]
pub struct UnknownUser(pub i32);

#[async_trait]
pub trait SwipeStore: Send + Sync {
    /// Directed edge `actor_id -> target_id`, if recorded.
    async fn find_swipe(&self, actor_id: i32, target_id: i32) -> Result<Option<SwipeRecord>>;

    /// Insert a directed edge. Returns `None` when the edge already exists,
    /// fails with [`UnknownUser`] when either user does not exist.
    async fn insert_swipe(&self, actor_id: i32, target_id: i32) -> Result<Option<SwipeRecord>>;

    /// Mark the closing edge of a match as finalized. Returns `true` for
    /// exactly one caller per match.
    async fn claim_match(&self, match_id: i64) -> Result<bool>;

    /// Users that form a mutual pair with `user_id`, excluding admins,
    /// soft-deleted users and users `user_id` has blocked. Newest match first.
    async fn list_matches(&self, user_id: i32) -> Result<Vec<UserProfile>>;

    /// Mark the presence projection of a match as written.
    async fn mark_presence_synced(&self, match_id: i64) -> Result<()>;

    /// Matches whose presence projection has not been confirmed, oldest first.
    async fn list_unsynced_matches(&self, limit: i64) -> Result<Vec<MatchPair>>;
}

// =============================================================================
// User Directory
// =============================================================================

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: i32) -> Result<Option<User>>;
}

// =============================================================================
// Notification Dispatcher
// =============================================================================

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Persist a notification so it shows up in the recipient's inbox.
    async fn create_notification(&self, notification: NewNotification) -> Result<NotificationRecord>;

    /// Push a persisted notification to a device.
    async fn send(&self, message: PushMessage) -> Result<()>;
}

// =============================================================================
// Presence Store (real-time document store)
// =============================================================================

/// Document contents as plain JSON.
pub type Document = Map<String, Value>;

/// Field writes for `set` / `update`.
pub type Fields = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Write this value as-is.
    Value(Value),
    /// Append each element not already present in the array field.
    ArrayUnion(Vec<Value>),
    /// Store the store's own commit time.
    ServerTimestamp,
}

/// Build a `Fields` map from literal entries.
pub fn fields<const N: usize>(entries: [(&str, FieldValue); N]) -> Fields {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Document>>;

    /// Create or replace the document at `path`.
    async fn set(&self, path: &str, fields: Fields) -> Result<()>;

    /// Merge `fields` into an existing document. Fails if it does not exist.
    async fn update(&self, path: &str, fields: Fields) -> Result<()>;
}

// =============================================================================
// Session Token Issuer
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    Publisher,
    Audience,
}

impl ChannelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelRole::Publisher => "publisher",
            ChannelRole::Audience => "audience",
        }
    }
}

pub trait TokenIssuer: Send + Sync {
    fn generate_token(
        &self,
        channel: &str,
        principal: &str,
        role: ChannelRole,
        ttl_seconds: u32,
    ) -> Result<String>;
}
