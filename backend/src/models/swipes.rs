use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{DateTime, Utc};
use crate::constants::{MSG_ALREADY_MATCHED, MSG_ALREADY_SWIPED, MSG_MATCH_CREATED, MSG_SWIPE_WAITING};
use super::users::UserProfile;

/// A directed swipe edge from `actor_id` to `target_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SwipeRecord {
    pub id: i64,
    pub actor_id: i32,
    pub target_id: i32,
    pub created_at: DateTime<Utc>,
    pub presence_synced_at: Option<DateTime<Utc>>,
}

/// Both edges of a mutual match. The closing edge is the one written last
/// and is the authoritative match record; its id is the match id.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchPair {
    pub opening: SwipeRecord,
    pub closing: SwipeRecord,
}

impl MatchPair {
    /// Orders two opposite edges by id. Returns `None` unless they are
    /// actually the two directions of one pair.
    pub fn from_edges(first: SwipeRecord, second: SwipeRecord) -> Option<Self> {
        if first.actor_id != second.target_id || first.target_id != second.actor_id {
            return None;
        }
        let (opening, closing) = if first.id < second.id {
            (first, second)
        } else {
            (second, first)
        };
        Some(Self { opening, closing })
    }

    pub fn match_id(&self) -> i64 {
        self.closing.id
    }

    /// The user who swiped first.
    pub fn initiator_id(&self) -> i32 {
        self.opening.actor_id
    }

    /// The user whose swipe completed the match.
    pub fn closer_id(&self) -> i32 {
        self.closing.actor_id
    }
}

/// Match as returned to clients. Identical whichever side asks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: i64,
    pub user_a_id: i32,
    pub user_b_id: i32,
    pub created_at: DateTime<Utc>,
    pub user_a: Option<UserProfile>,
    pub user_b: Option<UserProfile>,
}

impl Match {
    pub fn from_pair(pair: &MatchPair, user_a: Option<UserProfile>, user_b: Option<UserProfile>) -> Self {
        Self {
            id: pair.match_id(),
            user_a_id: pair.initiator_id(),
            user_b_id: pair.closer_id(),
            created_at: pair.closing.created_at,
            user_a,
            user_b,
        }
    }
}

/// Outcome of a single swipe.
#[derive(Debug, Clone, PartialEq)]
pub enum SwipeResult {
    /// First swipe on this user; waiting for them to swipe back.
    WaitingForMutual,
    /// This swipe was already recorded and the other side has not swiped yet.
    AlreadySwiped,
    /// Both sides had already swiped; nothing was written.
    AlreadyMatched,
    /// This swipe closed the pair.
    MatchOccurred { pair: MatchPair },
}

impl SwipeResult {
    pub fn message(&self) -> &'static str {
        match self {
            SwipeResult::WaitingForMutual => MSG_SWIPE_WAITING,
            SwipeResult::AlreadySwiped => MSG_ALREADY_SWIPED,
            SwipeResult::AlreadyMatched => MSG_ALREADY_MATCHED,
            SwipeResult::MatchOccurred { .. } => MSG_MATCH_CREATED,
        }
    }

    pub fn match_occurred(&self) -> bool {
        matches!(self, SwipeResult::MatchOccurred { .. })
    }
}
