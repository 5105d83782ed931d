//! Swipe recording, mutual match detection and match finalization.
//!
//! A pair is finalized by whichever request first claims its closing edge
//! (the greater id) once both edges are visible. Edge ids come from a
//! sequence drawn before commit, so id order alone cannot decide which of two
//! crossing requests announces the match.
//!
//! The closing edge insert is the only write that can fail a swipe. Everything
//! after it (notifications, channel token, presence projection) is best
//! effort: failures are logged and the match is still reported. Presence
//! writes that did not all succeed leave the match unsynced so the
//! reconciler picks it up again.

use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::constants::{
    CHANNEL_TOKEN_ANY_UID, CHANNEL_TOKEN_TTL_SECS, CHAT_COLLECTION_SUFFIX, MATCH_NOTIFICATION_TITLE,
    NOTIFICATION_KIND_MATCHES, SETTINGS_SUBCOLLECTION, USERS_COLLECTION_SUFFIX,
};
use crate::models::{
    Match, MatchPair, NewNotification, PushMessage, SwipeRecord, SwipeResult, User, UserProfile,
};
use super::traits::{
    fields, ChannelRole, FieldValue, NotificationDispatcher, PresenceStore, SwipeStore,
    TokenIssuer, UnknownUser, UserDirectory,
};

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("You cannot swipe on yourself")]
    SelfSwipe,

    #[error("User {0} not found")]
    UnknownUser(i32),

    #[error("Storage error: {0}")]
    Storage(anyhow::Error),
}

impl From<anyhow::Error> for MatchError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<UnknownUser>() {
            Ok(UnknownUser(id)) => MatchError::UnknownUser(id),
            Err(err) => MatchError::Storage(err),
        }
    }
}

pub struct MatchEngine {
    swipes: Arc<dyn SwipeStore>,
    users: Arc<dyn UserDirectory>,
    notifications: Arc<dyn NotificationDispatcher>,
    presence: Arc<dyn PresenceStore>,
    tokens: Arc<dyn TokenIssuer>,
    environment: String,
}

impl MatchEngine {
    pub fn new(
        swipes: Arc<dyn SwipeStore>,
        users: Arc<dyn UserDirectory>,
        notifications: Arc<dyn NotificationDispatcher>,
        presence: Arc<dyn PresenceStore>,
        tokens: Arc<dyn TokenIssuer>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            swipes,
            users,
            notifications,
            presence,
            tokens,
            environment: environment.into(),
        }
    }

    /// Record that `actor_id` swiped on `target_id`.
    pub async fn swipe(&self, actor_id: i32, target_id: i32) -> Result<SwipeResult, MatchError> {
        if actor_id == target_id {
            return Err(MatchError::SelfSwipe);
        }

        let reverse = self.swipes.find_swipe(target_id, actor_id).await?;
        let forward = self.swipes.find_swipe(actor_id, target_id).await?;

        match (forward, reverse) {
            (Some(forward), Some(reverse)) => {
                // Normally claimed already. Only a request that stopped between
                // its insert and its claim leaves the pair for us.
                let result = self.claim_and_finalize(forward, reverse).await?;
                Ok(result.unwrap_or_else(|| {
                    debug!("Users {} and {} are already matched", actor_id, target_id);
                    SwipeResult::AlreadyMatched
                }))
            }
            (Some(_), None) => Ok(SwipeResult::AlreadySwiped),
            (None, reverse) => {
                let Some(edge) = self.swipes.insert_swipe(actor_id, target_id).await? else {
                    // A concurrent identical swipe won the insert and carries on.
                    return Ok(SwipeResult::AlreadySwiped);
                };

                // A crossing swipe may have committed after our first read.
                let reverse = match reverse {
                    Some(reverse) => Some(reverse),
                    None => self.swipes.find_swipe(target_id, actor_id).await?,
                };
                let Some(reverse) = reverse else {
                    info!("Swipe {} -> {} recorded, waiting for mutual swipe", actor_id, target_id);
                    return Ok(SwipeResult::WaitingForMutual);
                };

                let result = self.claim_and_finalize(edge, reverse).await?;
                Ok(result.unwrap_or_else(|| {
                    info!(
                        "Crossing swipes between {} and {}, finalized by the other request",
                        actor_id, target_id
                    );
                    SwipeResult::AlreadyMatched
                }))
            }
        }
    }

    /// Finalize the pair if this request wins the claim on its closing edge.
    /// `None` when another request already has.
    async fn claim_and_finalize(
        &self,
        first: SwipeRecord,
        second: SwipeRecord,
    ) -> Result<Option<SwipeResult>, MatchError> {
        let Some(pair) = MatchPair::from_edges(first, second) else {
            return Err(anyhow::anyhow!("swipe edges do not form a pair").into());
        };
        if !self.swipes.claim_match(pair.match_id()).await? {
            return Ok(None);
        }
        Ok(Some(self.finalize(pair).await))
    }

    /// Mutual matches of `user_id`.
    pub async fn list_matches(&self, user_id: i32) -> Result<Vec<UserProfile>, MatchError> {
        Ok(self.swipes.list_matches(user_id).await?)
    }

    /// Both edges between two users, if they are matched.
    pub async fn match_pair(&self, user_a: i32, user_b: i32) -> Result<Option<MatchPair>, MatchError> {
        let forward = self.swipes.find_swipe(user_a, user_b).await?;
        let reverse = self.swipes.find_swipe(user_b, user_a).await?;

        Ok(forward
            .zip(reverse)
            .and_then(|(forward, reverse)| MatchPair::from_edges(forward, reverse)))
    }

    /// The match between two users, whichever order they are given in.
    pub async fn get_specific_match(&self, user_a: i32, user_b: i32) -> Result<Option<Match>, MatchError> {
        let Some(pair) = self.match_pair(user_a, user_b).await? else {
            return Ok(None);
        };

        let initiator = self.users.find_by_id(pair.initiator_id()).await?;
        let closer = self.users.find_by_id(pair.closer_id()).await?;
        Ok(Some(Match::from_pair(
            &pair,
            initiator.as_ref().map(UserProfile::from),
            closer.as_ref().map(UserProfile::from),
        )))
    }

    /// Matches still waiting for a complete presence projection.
    pub async fn unsynced_matches(&self, limit: i64) -> Result<Vec<MatchPair>, MatchError> {
        Ok(self.swipes.list_unsynced_matches(limit).await?)
    }

    /// Re-run the presence projection for an existing match and mark it
    /// synced when every write lands. Returns whether it is now synced.
    pub async fn reproject_presence(&self, pair: &MatchPair) -> anyhow::Result<bool> {
        let (Some(initiator), Some(closer)) = (
            self.users.find_by_id(pair.initiator_id()).await?,
            self.users.find_by_id(pair.closer_id()).await?,
        ) else {
            anyhow::bail!("match {} references a missing user", pair.match_id());
        };

        if !self.project_presence(pair.match_id(), &initiator, &closer).await {
            return Ok(false);
        }
        self.swipes.mark_presence_synced(pair.match_id()).await?;
        Ok(true)
    }

    /// Side effects of a freshly closed pair. Never fails: the closing edge
    /// is already persisted, so the match stands regardless.
    async fn finalize(&self, pair: MatchPair) -> SwipeResult {
        let match_id = pair.match_id();
        info!(
            "Match {} created between {} and {}",
            match_id,
            pair.initiator_id(),
            pair.closer_id()
        );

        let Some((initiator, closer)) = self.load_participants(&pair).await else {
            return SwipeResult::MatchOccurred { pair };
        };

        self.notify(&initiator, &closer).await;
        self.notify(&closer, &initiator).await;

        if self.project_presence(match_id, &initiator, &closer).await {
            if let Err(e) = self.swipes.mark_presence_synced(match_id).await {
                warn!("Failed to mark match {} as synced: {}", match_id, e);
            }
        } else {
            warn!("Presence projection for match {} incomplete, left for reconciler", match_id);
        }

        SwipeResult::MatchOccurred { pair }
    }

    async fn load_participants(&self, pair: &MatchPair) -> Option<(User, User)> {
        let initiator = self.users.find_by_id(pair.initiator_id()).await;
        let closer = self.users.find_by_id(pair.closer_id()).await;

        match (initiator, closer) {
            (Ok(Some(initiator)), Ok(Some(closer))) => Some((initiator, closer)),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to load users for match {}: {}", pair.match_id(), e);
                None
            }
            _ => {
                warn!("Match {} references a missing user, skipping side effects", pair.match_id());
                None
            }
        }
    }

    async fn notify(&self, recipient: &User, counterparty: &User) {
        if let Err(e) = self.try_notify(recipient, counterparty).await {
            error!("Failed to notify user {} of match: {}", recipient.id, e);
        }
    }

    async fn try_notify(&self, recipient: &User, counterparty: &User) -> anyhow::Result<()> {
        let body = format!("You and {} have matched!", counterparty.display_name());
        let record = self
            .notifications
            .create_notification(NewNotification {
                from_user_id: counterparty.id,
                to_user_id: recipient.id,
                kind: NOTIFICATION_KIND_MATCHES.to_string(),
                title: MATCH_NOTIFICATION_TITLE.to_string(),
                body: body.clone(),
            })
            .await?;

        let Some(device_token) = recipient.notification_token() else {
            debug!("User {} has no device token, notification {} stored only", recipient.id, record.id);
            return Ok(());
        };

        self.notifications
            .send(PushMessage {
                device_token: device_token.to_string(),
                notification_id: record.id,
                kind: record.kind,
                sub_kind: record.sub_kind.unwrap_or_default(),
                title: record.title,
                body,
                counterparty_id: counterparty.id,
                counterparty_image_url: counterparty.profile_image_url().map(str::to_string),
            })
            .await
    }

    /// Upsert both users' presence documents and both per-pair settings
    /// documents. Every write is attempted; returns whether all succeeded.
    async fn project_presence(&self, match_id: i64, initiator: &User, closer: &User) -> bool {
        let channel = match_id.to_string();
        let token = self
            .tokens
            .generate_token(
                &channel,
                CHANNEL_TOKEN_ANY_UID,
                ChannelRole::Publisher,
                CHANNEL_TOKEN_TTL_SECS,
            )
            .unwrap_or_else(|e| {
                warn!("Channel token for match {} unavailable: {}", match_id, e);
                String::new()
            });

        let writes = [
            self.upsert_user_document(initiator, closer).await,
            self.upsert_user_document(closer, initiator).await,
            self.upsert_settings(initiator.id, closer.id, match_id, &token).await,
            self.upsert_settings(closer.id, initiator.id, match_id, &token).await,
        ];

        let mut all_ok = true;
        for result in writes {
            if let Err(e) = result {
                error!("Presence write for match {} failed: {}", match_id, e);
                all_ok = false;
            }
        }
        if all_ok {
            info!("Presence updated for match {}", match_id);
        }
        all_ok
    }

    async fn upsert_user_document(&self, user: &User, matched: &User) -> anyhow::Result<()> {
        let path = self.user_document_path(user.id);

        if self.presence.get(&path).await?.is_some() {
            self.presence
                .update(
                    &path,
                    fields([
                        ("matches", FieldValue::ArrayUnion(vec![json!(matched.id)])),
                        ("lastActivityOn", FieldValue::ServerTimestamp),
                        ("deletedAt", FieldValue::Value(Value::Null)),
                    ]),
                )
                .await
        } else {
            self.presence
                .set(
                    &path,
                    fields([
                        ("id", FieldValue::Value(json!(user.id))),
                        ("fullName", FieldValue::Value(json!(user.full_name))),
                        ("matches", FieldValue::Value(json!([matched.id]))),
                        ("lastActivityOn", FieldValue::ServerTimestamp),
                        ("createdAt", FieldValue::ServerTimestamp),
                        ("deletedAt", FieldValue::Value(Value::Null)),
                    ]),
                )
                .await
        }
    }

    async fn upsert_settings(
        &self,
        user_id: i32,
        other_id: i32,
        match_id: i64,
        token: &str,
    ) -> anyhow::Result<()> {
        let path = self.settings_document_path(user_id, other_id);

        if self.presence.get(&path).await?.is_some() {
            self.presence
                .update(
                    &path,
                    fields([
                        ("agoraToken", FieldValue::Value(json!(token))),
                        ("matchId", FieldValue::Value(json!(match_id))),
                        ("updatedAt", FieldValue::ServerTimestamp),
                    ]),
                )
                .await
        } else {
            self.presence
                .set(
                    &path,
                    fields([
                        ("agoraToken", FieldValue::Value(json!(token))),
                        ("matchId", FieldValue::Value(json!(match_id))),
                        ("createdAt", FieldValue::ServerTimestamp),
                        ("updatedAt", FieldValue::ServerTimestamp),
                    ]),
                )
                .await
        }
    }

    pub fn user_document_path(&self, user_id: i32) -> String {
        format!("{}_{}/{}", self.environment, USERS_COLLECTION_SUFFIX, user_id)
    }

    pub fn settings_document_path(&self, user_id: i32, other_id: i32) -> String {
        format!(
            "{}_{}/{}/{}/{}",
            self.environment, CHAT_COLLECTION_SUFFIX, user_id, SETTINGS_SUBCOLLECTION, other_id
        )
    }
}
