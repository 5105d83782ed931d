// Swipe recording and match finalization against the in-memory collaborators
mod common;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use common::{user, Harness, HarnessOptions};
use kindred::constants::{MSG_ALREADY_MATCHED, MSG_ALREADY_SWIPED, MSG_SWIPE_WAITING};
use kindred::models::{MatchPair, SwipeRecord, SwipeResult, UserProfile};
use kindred::services::memory::{
    FailingNotificationDispatcher, FailingPresenceStore, FailingTokenIssuer, InMemorySwipeStore,
    RecordingNotificationDispatcher,
};
use kindred::services::{MatchError, SwipeStore, UnconfiguredPresenceStore};

fn profile_ids(profiles: &[UserProfile]) -> Vec<i32> {
    profiles.iter().map(|p| p.id).collect()
}

// =============================================================================
// One-sided swipes
// =============================================================================

#[tokio::test]
async fn test_first_swipe_waits_for_mutual() {
    let h = Harness::new();

    let result = h.engine.swipe(10, 20).await.unwrap();

    assert_eq!(result, SwipeResult::WaitingForMutual);
    assert_eq!(result.message(), MSG_SWIPE_WAITING);
    assert!(!result.match_occurred());
    assert_eq!(h.edge_pairs(), vec![(10, 20)]);
    assert!(h.notifications.created().is_empty());
}

#[tokio::test]
async fn test_repeat_one_sided_swipe_is_idempotent() {
    let h = Harness::new();

    h.engine.swipe(10, 20).await.unwrap();
    let again = h.engine.swipe(10, 20).await.unwrap();
    let third = h.engine.swipe(10, 20).await.unwrap();

    assert_eq!(again, SwipeResult::AlreadySwiped);
    assert_eq!(again.message(), MSG_ALREADY_SWIPED);
    assert_eq!(third, SwipeResult::AlreadySwiped);
    assert_eq!(h.edge_pairs(), vec![(10, 20)]);
    assert!(h.engine.get_specific_match(10, 20).await.unwrap().is_none());
}

#[tokio::test]
async fn test_swipe_on_unknown_user_is_rejected() {
    let h = Harness::new();

    let result = h.engine.swipe(10, 999).await;

    assert!(matches!(result, Err(MatchError::UnknownUser(999))));
    assert!(h.edge_pairs().is_empty());
}

#[tokio::test]
async fn test_self_swipe_is_rejected() {
    let h = Harness::new();

    let result = h.engine.swipe(10, 10).await;

    assert!(matches!(result, Err(MatchError::SelfSwipe)));
    assert!(h.edge_pairs().is_empty());
}

// =============================================================================
// Mutual matches
// =============================================================================

#[tokio::test]
async fn test_closing_swipe_creates_single_match() {
    let h = Harness::new();

    h.engine.swipe(10, 20).await.unwrap();
    let closing = h.engine.swipe(20, 10).await.unwrap();

    let SwipeResult::MatchOccurred { pair } = &closing else {
        panic!("expected a match, got {:?}", closing);
    };
    assert_eq!(pair.initiator_id(), 10);
    assert_eq!(pair.closer_id(), 20);
    assert_eq!(pair.match_id(), pair.closing.id);
    assert!(closing.match_occurred());
    assert_eq!(h.edge_pairs(), vec![(10, 20), (20, 10)]);

    // Neither side can produce a second match record.
    for (actor, target) in [(20, 10), (10, 20)] {
        let repeat = h.engine.swipe(actor, target).await.unwrap();
        assert_eq!(repeat, SwipeResult::AlreadyMatched);
        assert_eq!(repeat.message(), MSG_ALREADY_MATCHED);
        assert!(!repeat.match_occurred());
    }
    assert_eq!(h.edge_pairs().len(), 2);
    assert_eq!(h.notifications.created().len(), 2);
}

#[tokio::test]
async fn test_match_is_identical_whichever_side_swipes_first() {
    let forward = Harness::new();
    forward.engine.swipe(10, 20).await.unwrap();
    forward.engine.swipe(20, 10).await.unwrap();

    let backward = Harness::new();
    backward.engine.swipe(20, 10).await.unwrap();
    backward.engine.swipe(10, 20).await.unwrap();

    let a = forward.engine.get_specific_match(10, 20).await.unwrap().unwrap();
    let b = backward.engine.get_specific_match(10, 20).await.unwrap().unwrap();

    assert_eq!(a.id, b.id);
    let mut a_users = [a.user_a_id, a.user_b_id];
    let mut b_users = [b.user_a_id, b.user_b_id];
    a_users.sort();
    b_users.sort();
    assert_eq!(a_users, b_users);
    assert!(a.user_a.is_some() && a.user_b.is_some());
    assert!(b.user_a.is_some() && b.user_b.is_some());

    // Only the initiator differs.
    assert_eq!(a.user_a_id, 10);
    assert_eq!(b.user_a_id, 20);
}

#[tokio::test]
async fn test_specific_match_is_symmetric() {
    let h = Harness::new();

    assert!(h.engine.get_specific_match(10, 20).await.unwrap().is_none());
    assert!(h.engine.get_specific_match(20, 10).await.unwrap().is_none());

    h.engine.swipe(10, 20).await.unwrap();
    h.engine.swipe(20, 10).await.unwrap();

    let one = h.engine.get_specific_match(10, 20).await.unwrap().unwrap();
    let other = h.engine.get_specific_match(20, 10).await.unwrap().unwrap();
    assert_eq!(one, other);
    assert_eq!(one.user_a.as_ref().map(|u| u.id), Some(10));
    assert_eq!(one.user_b.as_ref().and_then(|u| u.full_name.clone()), Some("Bea".to_string()));
}

// =============================================================================
// Listing
// =============================================================================

#[tokio::test]
async fn test_list_matches_filters_and_orders_newest_first() {
    let h = Harness::new();

    let mut admin = user(40, "Admin");
    admin.role = "admin".to_string();
    let mut deleted = user(50, "Gone");
    deleted.is_deleted = true;
    h.directory.insert(admin);
    h.directory.insert(deleted);
    h.directory.insert(user(60, "Blocked"));
    h.directory.block(10, 60);

    for other in [20, 30, 40, 50, 60] {
        h.engine.swipe(10, other).await.unwrap();
        h.engine.swipe(other, 10).await.unwrap();
    }
    // One-sided swipes never show up.
    h.directory.insert(user(70, "Dee"));
    h.engine.swipe(10, 70).await.unwrap();

    let matches = h.engine.list_matches(10).await.unwrap();
    assert_eq!(profile_ids(&matches), vec![30, 20]);

    let from_other_side = h.engine.list_matches(20).await.unwrap();
    assert_eq!(profile_ids(&from_other_side), vec![10]);
}

#[tokio::test]
async fn test_list_matches_empty_without_mutual_swipes() {
    let h = Harness::new();
    h.engine.swipe(10, 20).await.unwrap();
    h.engine.swipe(30, 10).await.unwrap();

    assert!(h.engine.list_matches(10).await.unwrap().is_empty());
}

// =============================================================================
// Notifications
// =============================================================================

#[tokio::test]
async fn test_both_users_are_notified() {
    let h = Harness::new();
    h.engine.swipe(10, 20).await.unwrap();
    h.engine.swipe(20, 10).await.unwrap();

    let created = h.notifications.created();
    assert_eq!(created.len(), 2);

    let to_ada = created.iter().find(|n| n.to_user_id == 10).unwrap();
    assert_eq!(to_ada.from_user_id, 20);
    assert_eq!(to_ada.kind, "matches");
    assert_eq!(to_ada.title, "It's a match!");
    assert_eq!(to_ada.body, "You and Bea have matched!");

    let to_bea = created.iter().find(|n| n.to_user_id == 20).unwrap();
    assert_eq!(to_bea.from_user_id, 10);
    assert_eq!(to_bea.body, "You and Ada have matched!");

    let pushed = h.notifications.pushed();
    assert_eq!(pushed.len(), 2);
    let push_to_ada = pushed.iter().find(|p| p.device_token == "device-10").unwrap();
    assert_eq!(push_to_ada.counterparty_id, 20);
    assert_eq!(
        push_to_ada.counterparty_image_url.as_deref(),
        Some("https://cdn.example/20.jpg")
    );
    assert_eq!(push_to_ada.notification_id, to_ada.id);
}

#[tokio::test]
async fn test_user_without_device_token_gets_stored_notification_only() {
    let h = Harness::new();
    let mut silent = user(20, "Bea");
    silent.fcm_token = None;
    silent.full_name = None;
    h.directory.insert(silent);

    h.engine.swipe(10, 20).await.unwrap();
    h.engine.swipe(20, 10).await.unwrap();

    assert_eq!(h.notifications.created().len(), 2);
    let pushed = h.notifications.pushed();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].device_token, "device-10");
    assert_eq!(pushed[0].body, "You and Someone have matched!");
}

#[tokio::test]
async fn test_one_failed_notification_does_not_block_the_other() {
    let recording = Arc::new(RecordingNotificationDispatcher::failing_for(10));
    let h = Harness::with(HarnessOptions {
        notifications: Some(recording.clone()),
        ..Default::default()
    });

    h.engine.swipe(10, 20).await.unwrap();
    let result = h.engine.swipe(20, 10).await.unwrap();

    assert!(result.match_occurred());
    let created = recording.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].to_user_id, 20);
    assert_eq!(recording.pushed().len(), 1);
}

// =============================================================================
// Best-effort side effects
// =============================================================================

#[tokio::test]
async fn test_notification_and_token_failures_do_not_fail_the_swipe() {
    let h = Harness::with(HarnessOptions {
        notifications: Some(Arc::new(FailingNotificationDispatcher)),
        tokens: Some(Arc::new(FailingTokenIssuer)),
        ..Default::default()
    });

    h.engine.swipe(10, 20).await.unwrap();
    let result = h.engine.swipe(20, 10).await.unwrap();

    assert!(result.match_occurred());
    assert!(h.engine.get_specific_match(10, 20).await.unwrap().is_some());

    // Presence still lands, with an empty channel token.
    let settings = h
        .presence
        .document(&h.engine.settings_document_path(10, 20))
        .unwrap();
    assert_eq!(settings["agoraToken"], json!(""));
    assert!(h.engine.unsynced_matches(50).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_presence_failure_leaves_match_for_reconciler() {
    let h = Harness::with(HarnessOptions {
        presence: Some(Arc::new(FailingPresenceStore)),
        ..Default::default()
    });

    h.engine.swipe(10, 20).await.unwrap();
    let result = h.engine.swipe(20, 10).await.unwrap();

    let SwipeResult::MatchOccurred { pair } = result else {
        panic!("expected a match");
    };
    assert_eq!(h.notifications.created().len(), 2);

    let pending = h.engine.unsynced_matches(50).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].match_id(), pair.match_id());

    // Still failing: stays pending.
    assert!(!h.engine.reproject_presence(&pending[0]).await.unwrap());
    assert_eq!(h.engine.unsynced_matches(50).await.unwrap().len(), 1);

    let recovered = h.engine_with_presence(h.presence.clone());
    assert!(recovered.reproject_presence(&pending[0]).await.unwrap());
    assert!(recovered.unsynced_matches(50).await.unwrap().is_empty());
    assert!(h.presence.document("test_users/10").is_some());
    assert!(h.presence.document("test_chat/20/settings/10").is_some());
}

#[tokio::test]
async fn test_unconfigured_presence_never_marks_matches_synced() {
    let h = Harness::with(HarnessOptions {
        presence: Some(Arc::new(UnconfiguredPresenceStore)),
        ..Default::default()
    });

    h.engine.swipe(10, 20).await.unwrap();
    let result = h.engine.swipe(20, 10).await.unwrap();

    assert!(result.match_occurred());
    let pending = h.engine.unsynced_matches(50).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].closing.presence_synced_at.is_none());
    assert!(!h.engine.reproject_presence(&pending[0]).await.unwrap());
    assert_eq!(h.engine.unsynced_matches(50).await.unwrap().len(), 1);
}

// =============================================================================
// Presence projection
// =============================================================================

#[tokio::test]
async fn test_presence_documents_written_for_both_users() {
    let h = Harness::new();
    h.engine.swipe(10, 20).await.unwrap();
    let SwipeResult::MatchOccurred { pair } = h.engine.swipe(20, 10).await.unwrap() else {
        panic!("expected a match");
    };

    let ada = h.presence.document("test_users/10").unwrap();
    assert_eq!(ada["id"], json!(10));
    assert_eq!(ada["fullName"], json!("Ada"));
    assert_eq!(ada["matches"], json!([20]));
    assert!(ada["lastActivityOn"].is_string());
    assert!(ada["deletedAt"].is_null());

    let bea = h.presence.document("test_users/20").unwrap();
    assert_eq!(bea["matches"], json!([10]));

    let mine = h.presence.document("test_chat/10/settings/20").unwrap();
    let theirs = h.presence.document("test_chat/20/settings/10").unwrap();
    assert_eq!(mine["matchId"], json!(pair.match_id()));
    assert_eq!(theirs["matchId"], json!(pair.match_id()));
    assert_eq!(mine["agoraToken"], theirs["agoraToken"]);
    assert!(!mine["agoraToken"].as_str().unwrap().is_empty());

    assert!(h.engine.unsynced_matches(50).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_presence_matches_accumulate_without_duplicates() {
    let h = Harness::new();
    for other in [20, 30] {
        h.engine.swipe(10, other).await.unwrap();
        h.engine.swipe(other, 10).await.unwrap();
    }

    let ada = h.presence.document("test_users/10").unwrap();
    assert_eq!(ada["matches"], json!([20, 30]));

    // Re-projecting an already synced match is harmless.
    let pair = h.engine.match_pair(10, 20).await.unwrap().unwrap();
    assert!(h.engine.reproject_presence(&pair).await.unwrap());
    let ada = h.presence.document("test_users/10").unwrap();
    assert_eq!(ada["matches"], json!([20, 30]));
}

#[tokio::test]
async fn test_match_pair_requires_both_edges() {
    let h = Harness::new();
    h.engine.swipe(10, 20).await.unwrap();
    assert!(h.engine.match_pair(10, 20).await.unwrap().is_none());

    h.engine.swipe(20, 10).await.unwrap();
    let pair = h.engine.match_pair(20, 10).await.unwrap().unwrap();
    assert_eq!(pair.initiator_id(), 10);
    assert_eq!(pair.closer_id(), 20);
}

// =============================================================================
// Crossing swipes
// =============================================================================

/// Lands the reverse swipe of the first insert concurrently: before it when
/// `reverse_first`, right after it otherwise.
struct CrossingSwipeStore {
    inner: Arc<InMemorySwipeStore>,
    reverse_first: bool,
    crossed: AtomicBool,
}

#[async_trait]
impl SwipeStore for CrossingSwipeStore {
    async fn find_swipe(&self, actor_id: i32, target_id: i32) -> Result<Option<SwipeRecord>> {
        self.inner.find_swipe(actor_id, target_id).await
    }

    async fn insert_swipe(&self, actor_id: i32, target_id: i32) -> Result<Option<SwipeRecord>> {
        if self.crossed.swap(true, Ordering::SeqCst) {
            return self.inner.insert_swipe(actor_id, target_id).await;
        }
        if self.reverse_first {
            self.inner.insert_swipe(target_id, actor_id).await?;
            self.inner.insert_swipe(actor_id, target_id).await
        } else {
            let ours = self.inner.insert_swipe(actor_id, target_id).await?;
            self.inner.insert_swipe(target_id, actor_id).await?;
            Ok(ours)
        }
    }

    async fn claim_match(&self, match_id: i64) -> Result<bool> {
        self.inner.claim_match(match_id).await
    }

    async fn list_matches(&self, user_id: i32) -> Result<Vec<UserProfile>> {
        self.inner.list_matches(user_id).await
    }

    async fn mark_presence_synced(&self, match_id: i64) -> Result<()> {
        self.inner.mark_presence_synced(match_id).await
    }

    async fn list_unsynced_matches(&self, limit: i64) -> Result<Vec<MatchPair>> {
        self.inner.list_unsynced_matches(limit).await
    }
}

fn crossing_harness(reverse_first: bool) -> Harness {
    // Built twice so the crossing store can wrap the harness's own swipe store.
    let base = Harness::new();
    let crossing = Arc::new(CrossingSwipeStore {
        inner: base.swipes.clone(),
        reverse_first,
        crossed: AtomicBool::new(false),
    });
    let mut h = Harness::with(HarnessOptions {
        swipes: Some(crossing),
        ..Default::default()
    });
    h.swipes = base.swipes;
    h
}

#[tokio::test]
async fn test_crossing_swipe_landing_first_is_finalized_once() {
    let h = crossing_harness(true);

    let result = h.engine.swipe(10, 20).await.unwrap();

    let SwipeResult::MatchOccurred { pair } = result else {
        panic!("expected the request that saw both edges to finalize");
    };
    assert_eq!(pair.initiator_id(), 20);
    assert_eq!(pair.closer_id(), 10);
    assert_eq!(h.notifications.created().len(), 2);

    // The other request sees the claim taken and does not finalize again.
    assert_eq!(h.engine.swipe(20, 10).await.unwrap(), SwipeResult::AlreadyMatched);
    assert_eq!(h.notifications.created().len(), 2);
}

#[tokio::test]
async fn test_crossing_swipe_landing_after_insert_is_finalized_once() {
    let h = crossing_harness(false);

    let result = h.engine.swipe(10, 20).await.unwrap();

    let SwipeResult::MatchOccurred { pair } = result else {
        panic!("expected the request that saw both edges to finalize");
    };
    assert_eq!(pair.initiator_id(), 10);
    assert_eq!(pair.closer_id(), 20);
    assert_eq!(h.swipes.edges().len(), 2);

    assert_eq!(h.engine.swipe(20, 10).await.unwrap(), SwipeResult::AlreadyMatched);
    assert_eq!(h.notifications.created().len(), 2);
}

/// Postgres-like edge store: ids are drawn from a sequence when the insert
/// starts, but an edge only becomes visible once its insert returns. The
/// `held` insert waits until another insert has committed.
struct SequencedSwipeStore {
    ids: HashMap<(i32, i32), i64>,
    held: (i32, i32),
    committed: Notify,
    edges: Mutex<Vec<SwipeRecord>>,
    finalized: Mutex<HashSet<i64>>,
}

impl SequencedSwipeStore {
    fn new(ids: HashMap<(i32, i32), i64>, held: (i32, i32)) -> Self {
        Self {
            ids,
            held,
            committed: Notify::new(),
            edges: Mutex::new(Vec::new()),
            finalized: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl SwipeStore for SequencedSwipeStore {
    async fn find_swipe(&self, actor_id: i32, target_id: i32) -> Result<Option<SwipeRecord>> {
        Ok(self
            .edges
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.actor_id == actor_id && e.target_id == target_id)
            .cloned())
    }

    async fn insert_swipe(&self, actor_id: i32, target_id: i32) -> Result<Option<SwipeRecord>> {
        let id = self.ids[&(actor_id, target_id)];
        if (actor_id, target_id) == self.held {
            self.committed.notified().await;
        }

        let record = SwipeRecord {
            id,
            actor_id,
            target_id,
            created_at: chrono::Utc::now(),
            presence_synced_at: None,
        };
        self.edges.lock().unwrap().push(record.clone());
        if (actor_id, target_id) != self.held {
            self.committed.notify_one();
        }
        Ok(Some(record))
    }

    async fn claim_match(&self, match_id: i64) -> Result<bool> {
        Ok(self.finalized.lock().unwrap().insert(match_id))
    }

    async fn list_matches(&self, _user_id: i32) -> Result<Vec<UserProfile>> {
        Ok(Vec::new())
    }

    async fn mark_presence_synced(&self, _match_id: i64) -> Result<()> {
        Ok(())
    }

    async fn list_unsynced_matches(&self, _limit: i64) -> Result<Vec<MatchPair>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_crossing_swipes_committing_out_of_id_order_match_exactly_once() {
    // 10 -> 20 draws id 5 but commits after 20 -> 10 (id 6) has committed
    // and re-read without seeing it.
    let store = Arc::new(SequencedSwipeStore::new(
        HashMap::from([((10, 20), 5), ((20, 10), 6)]),
        (10, 20),
    ));
    let h = Harness::with(HarnessOptions {
        swipes: Some(store.clone()),
        ..Default::default()
    });

    let (first, second) = tokio::join!(biased; h.engine.swipe(10, 20), h.engine.swipe(20, 10));
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(second, SwipeResult::WaitingForMutual);
    let SwipeResult::MatchOccurred { pair } = first else {
        panic!("both edges exist but no request finalized: {:?}", first);
    };
    assert_eq!(pair.match_id(), 6);
    assert_eq!(store.edges.lock().unwrap().len(), 2);
    assert_eq!(h.notifications.created().len(), 2);
}

#[tokio::test]
async fn test_unclaimed_pair_is_finalized_by_next_swipe() {
    let h = Harness::new();
    // Both edges written, but the request that wrote the second never claimed.
    h.swipes.insert_swipe(10, 20).await.unwrap();
    h.swipes.insert_swipe(20, 10).await.unwrap();

    assert!(h.engine.swipe(10, 20).await.unwrap().match_occurred());
    assert_eq!(h.notifications.created().len(), 2);

    assert_eq!(h.engine.swipe(20, 10).await.unwrap(), SwipeResult::AlreadyMatched);
    assert_eq!(h.notifications.created().len(), 2);
}
