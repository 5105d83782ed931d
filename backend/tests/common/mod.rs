// Common test utilities
#![allow(dead_code)]

use chrono::Utc;
use std::sync::Arc;

use kindred::models::{Photo, User};
use kindred::services::memory::{
    InMemoryPresenceStore, InMemorySwipeStore, InMemoryUserDirectory,
    RecordingNotificationDispatcher,
};
use kindred::services::{
    ChannelTokenIssuer, MatchEngine, NotificationDispatcher, PresenceStore, SwipeStore,
    TokenIssuer,
};

pub const ENVIRONMENT: &str = "test";

pub fn user(id: i32, name: &str) -> User {
    User {
        id,
        full_name: Some(name.to_string()),
        role: "user".to_string(),
        is_deleted: false,
        fcm_token: Some(format!("device-{}", id)),
        photos: vec![Photo {
            id: format!("photo-{}", id),
            url: format!("https://cdn.example/{}.jpg", id),
        }],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Collaborator overrides; anything left `None` uses the recording/in-memory
/// implementation held by the harness.
#[derive(Default)]
pub struct HarnessOptions {
    pub swipes: Option<Arc<dyn SwipeStore>>,
    pub notifications: Option<Arc<dyn NotificationDispatcher>>,
    pub presence: Option<Arc<dyn PresenceStore>>,
    pub tokens: Option<Arc<dyn TokenIssuer>>,
}

pub struct Harness {
    pub directory: Arc<InMemoryUserDirectory>,
    pub swipes: Arc<InMemorySwipeStore>,
    pub notifications: Arc<RecordingNotificationDispatcher>,
    pub presence: Arc<InMemoryPresenceStore>,
    pub engine: MatchEngine,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(HarnessOptions::default())
    }

    pub fn with(options: HarnessOptions) -> Self {
        let directory = Arc::new(InMemoryUserDirectory::new());
        for (id, name) in [(10, "Ada"), (20, "Bea"), (30, "Cy")] {
            directory.insert(user(id, name));
        }

        let swipes = Arc::new(InMemorySwipeStore::new(directory.clone()));
        let notifications = Arc::new(RecordingNotificationDispatcher::new());
        let presence = Arc::new(InMemoryPresenceStore::new());

        let default_swipes: Arc<dyn SwipeStore> = swipes.clone();
        let default_notifications: Arc<dyn NotificationDispatcher> = notifications.clone();
        let default_presence: Arc<dyn PresenceStore> = presence.clone();
        let default_tokens: Arc<dyn TokenIssuer> = Arc::new(configured_issuer());

        let engine = MatchEngine::new(
            options.swipes.unwrap_or(default_swipes),
            directory.clone(),
            options.notifications.unwrap_or(default_notifications),
            options.presence.unwrap_or(default_presence),
            options.tokens.unwrap_or(default_tokens),
            ENVIRONMENT,
        );

        Self {
            directory,
            swipes,
            notifications,
            presence,
            engine,
        }
    }

    /// A second engine over the same users and swipes, with its own presence
    /// store. Used to re-run projections after a failed one.
    pub fn engine_with_presence(&self, presence: Arc<dyn PresenceStore>) -> MatchEngine {
        MatchEngine::new(
            self.swipes.clone(),
            self.directory.clone(),
            self.notifications.clone(),
            presence,
            Arc::new(configured_issuer()),
            ENVIRONMENT,
        )
    }

    pub fn edge_pairs(&self) -> Vec<(i32, i32)> {
        self.swipes
            .edges()
            .iter()
            .map(|edge| (edge.actor_id, edge.target_id))
            .collect()
    }
}

pub fn configured_issuer() -> ChannelTokenIssuer {
    ChannelTokenIssuer::new(Some("test-app".into()), Some("test-cert".into()))
}
