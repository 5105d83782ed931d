// In-memory collaborators for engine and route tests. The Failing* variants
// error on every call.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::{
    MatchPair, NewNotification, NotificationRecord, PushMessage, SwipeRecord, User, UserProfile,
};
use super::traits::{
    ChannelRole, Document, FieldValue, Fields, NotificationDispatcher, PresenceStore, SwipeStore,
    TokenIssuer, UnknownUser, UserDirectory,
};

/// A panicked holder leaves the data consistent for these stores, so a
/// poisoned lock is taken over rather than propagated.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// User Directory
// =============================================================================

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: Mutex<HashMap<i32, User>>,
    blocked: Mutex<HashSet<(i32, i32)>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        lock(&self.users).insert(user.id, user);
    }

    /// `user_id` blocks `blocked_user_id`.
    pub fn block(&self, user_id: i32, blocked_user_id: i32) {
        lock(&self.blocked).insert((user_id, blocked_user_id));
    }

    fn get(&self, id: i32) -> Option<User> {
        lock(&self.users).get(&id).cloned()
    }

    fn has_blocked(&self, user_id: i32, other_id: i32) -> bool {
        lock(&self.blocked).contains(&(user_id, other_id))
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_id(&self, id: i32) -> Result<Option<User>> {
        Ok(self.get(id))
    }
}

// =============================================================================
// Swipe Store
// =============================================================================

pub struct InMemorySwipeStore {
    directory: Arc<InMemoryUserDirectory>,
    edges: Mutex<Vec<SwipeRecord>>,
    finalized: Mutex<HashSet<i64>>,
}

impl InMemorySwipeStore {
    /// The directory supplies the user filters applied by `list_matches` and
    /// the existence check on insert.
    pub fn new(directory: Arc<InMemoryUserDirectory>) -> Self {
        Self {
            directory,
            edges: Mutex::new(Vec::new()),
            finalized: Mutex::new(HashSet::new()),
        }
    }

    /// Every recorded edge, in insertion order.
    pub fn edges(&self) -> Vec<SwipeRecord> {
        lock(&self.edges).clone()
    }

    fn mutual_pairs(edges: &[SwipeRecord]) -> Vec<MatchPair> {
        edges
            .iter()
            .filter_map(|edge| {
                let reverse = edges
                    .iter()
                    .find(|e| e.actor_id == edge.target_id && e.target_id == edge.actor_id)?;
                // Yield each pair once, from its opening edge.
                (edge.id < reverse.id)
                    .then(|| MatchPair::from_edges(edge.clone(), reverse.clone()))
                    .flatten()
            })
            .collect()
    }
}

#[async_trait]
impl SwipeStore for InMemorySwipeStore {
    async fn find_swipe(&self, actor_id: i32, target_id: i32) -> Result<Option<SwipeRecord>> {
        Ok(lock(&self.edges)
            .iter()
            .find(|e| e.actor_id == actor_id && e.target_id == target_id)
            .cloned())
    }

    async fn insert_swipe(&self, actor_id: i32, target_id: i32) -> Result<Option<SwipeRecord>> {
        for id in [actor_id, target_id] {
            if self.directory.get(id).is_none() {
                return Err(UnknownUser(id).into());
            }
        }

        let mut edges = lock(&self.edges);
        if edges
            .iter()
            .any(|e| e.actor_id == actor_id && e.target_id == target_id)
        {
            return Ok(None);
        }
        let record = SwipeRecord {
            id: edges.len() as i64 + 1,
            actor_id,
            target_id,
            created_at: Utc::now(),
            presence_synced_at: None,
        };
        edges.push(record.clone());
        Ok(Some(record))
    }

    async fn claim_match(&self, match_id: i64) -> Result<bool> {
        Ok(lock(&self.finalized).insert(match_id))
    }

    async fn list_matches(&self, user_id: i32) -> Result<Vec<UserProfile>> {
        let mut pairs: Vec<MatchPair> = Self::mutual_pairs(&lock(&self.edges))
            .into_iter()
            .filter(|pair| pair.initiator_id() == user_id || pair.closer_id() == user_id)
            .collect();
        pairs.sort_by_key(|pair| std::cmp::Reverse(pair.match_id()));

        Ok(pairs
            .iter()
            .map(|pair| {
                if pair.initiator_id() == user_id {
                    pair.closer_id()
                } else {
                    pair.initiator_id()
                }
            })
            .filter(|other| *other != user_id && !self.directory.has_blocked(user_id, *other))
            .filter_map(|other| self.directory.get(other))
            .filter(|user| !user.is_deleted && !user.is_admin())
            .map(|user| UserProfile::from(&user))
            .collect())
    }

    async fn mark_presence_synced(&self, match_id: i64) -> Result<()> {
        if let Some(edge) = lock(&self.edges).iter_mut().find(|e| e.id == match_id) {
            edge.presence_synced_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn list_unsynced_matches(&self, limit: i64) -> Result<Vec<MatchPair>> {
        let mut pairs: Vec<MatchPair> = Self::mutual_pairs(&lock(&self.edges))
            .into_iter()
            .filter(|pair| pair.closing.presence_synced_at.is_none())
            .collect();
        pairs.sort_by_key(|pair| pair.match_id());
        pairs.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(pairs)
    }
}

// =============================================================================
// Presence Store
// =============================================================================

#[derive(Default)]
pub struct InMemoryPresenceStore {
    documents: Mutex<HashMap<String, Document>>,
}

impl InMemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a document.
    pub fn document(&self, path: &str) -> Option<Document> {
        lock(&self.documents).get(path).cloned()
    }

    fn apply(document: &mut Document, fields: Fields) {
        for (key, value) in fields {
            match value {
                FieldValue::Value(v) => {
                    document.insert(key, v);
                }
                FieldValue::ServerTimestamp => {
                    document.insert(key, Value::String(Utc::now().to_rfc3339()));
                }
                FieldValue::ArrayUnion(items) => {
                    let entry = document
                        .entry(key)
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if !entry.is_array() {
                        *entry = Value::Array(Vec::new());
                    }
                    if let Value::Array(existing) = entry {
                        for item in items {
                            if !existing.contains(&item) {
                                existing.push(item);
                            }
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl PresenceStore for InMemoryPresenceStore {
    async fn get(&self, path: &str) -> Result<Option<Document>> {
        Ok(self.document(path))
    }

    async fn set(&self, path: &str, fields: Fields) -> Result<()> {
        let mut document = Document::new();
        Self::apply(&mut document, fields);
        lock(&self.documents).insert(path.to_string(), document);
        Ok(())
    }

    async fn update(&self, path: &str, fields: Fields) -> Result<()> {
        let mut documents = lock(&self.documents);
        let Some(document) = documents.get_mut(path) else {
            anyhow::bail!("presence document {} does not exist", path);
        };
        Self::apply(document, fields);
        Ok(())
    }
}

pub struct FailingPresenceStore;

#[async_trait]
impl PresenceStore for FailingPresenceStore {
    async fn get(&self, path: &str) -> Result<Option<Document>> {
        anyhow::bail!("presence store unavailable ({})", path)
    }

    async fn set(&self, path: &str, _fields: Fields) -> Result<()> {
        anyhow::bail!("presence store unavailable ({})", path)
    }

    async fn update(&self, path: &str, _fields: Fields) -> Result<()> {
        anyhow::bail!("presence store unavailable ({})", path)
    }
}

// =============================================================================
// Notification Dispatcher
// =============================================================================

/// Records notifications and pushes instead of delivering them.
#[derive(Default)]
pub struct RecordingNotificationDispatcher {
    created: Mutex<Vec<NotificationRecord>>,
    pushed: Mutex<Vec<PushMessage>>,
    failing_recipient: Option<i32>,
}

impl RecordingNotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `create_notification` whenever `user_id` is the recipient.
    pub fn failing_for(user_id: i32) -> Self {
        Self {
            failing_recipient: Some(user_id),
            ..Self::default()
        }
    }

    pub fn created(&self) -> Vec<NotificationRecord> {
        lock(&self.created).clone()
    }

    pub fn pushed(&self) -> Vec<PushMessage> {
        lock(&self.pushed).clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotificationDispatcher {
    async fn create_notification(&self, notification: NewNotification) -> Result<NotificationRecord> {
        if self.failing_recipient == Some(notification.to_user_id) {
            anyhow::bail!("notification insert failed for user {}", notification.to_user_id);
        }
        let mut created = lock(&self.created);
        let record = NotificationRecord {
            id: created.len() as i64 + 1,
            from_user_id: notification.from_user_id,
            to_user_id: notification.to_user_id,
            kind: notification.kind,
            sub_kind: None,
            title: notification.title,
            body: notification.body,
            is_read: false,
            created_at: Utc::now(),
        };
        created.push(record.clone());
        Ok(record)
    }

    async fn send(&self, message: PushMessage) -> Result<()> {
        lock(&self.pushed).push(message);
        Ok(())
    }
}

pub struct FailingNotificationDispatcher;

#[async_trait]
impl NotificationDispatcher for FailingNotificationDispatcher {
    async fn create_notification(&self, notification: NewNotification) -> Result<NotificationRecord> {
        anyhow::bail!("notification service unavailable (to {})", notification.to_user_id)
    }

    async fn send(&self, message: PushMessage) -> Result<()> {
        anyhow::bail!("push service unavailable ({})", message.notification_id)
    }
}

// =============================================================================
// Token Issuer
// =============================================================================

pub struct FailingTokenIssuer;

impl TokenIssuer for FailingTokenIssuer {
    fn generate_token(
        &self,
        channel: &str,
        _principal: &str,
        _role: ChannelRole,
        _ttl_seconds: u32,
    ) -> Result<String> {
        anyhow::bail!("token issuer misconfigured (channel {})", channel)
    }
}
