pub mod channel_token;
pub mod fcm;
pub mod matching;
pub mod memory;
pub mod presence;
pub mod traits;

pub use channel_token::ChannelTokenIssuer;
pub use presence::UnconfiguredPresenceStore;
pub use matching::{MatchEngine, MatchError};
pub use traits::{
    ChannelRole, Document, FieldValue, Fields, NotificationDispatcher, PresenceStore, SwipeStore,
    TokenIssuer, UnknownUser, UserDirectory,
};

use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::db::{PgNotificationDispatcher, PgSwipeStore, PgUserDirectory};
use crate::utils::Config;
use fcm::FcmClient;
use presence::FirestorePresenceStore;

/// Firestore when configured. Otherwise a store that rejects every write, so
/// matches stay queued for the reconciler instead of being marked synced.
pub fn presence_store(config: &Config, timeout: Duration) -> Result<Arc<dyn PresenceStore>> {
    match &config.firestore {
        Some(firestore) => {
            info!("Presence store: Firestore project {}", firestore.project_id);
            Ok(Arc::new(FirestorePresenceStore::new(
                firestore.project_id.clone(),
                firestore.access_token.clone(),
                timeout,
            )?))
        }
        None => {
            warn!("FIRESTORE_PROJECT_ID not set, presence projection disabled until configured");
            Ok(Arc::new(UnconfiguredPresenceStore))
        }
    }
}

/// Wire the production collaborators from config.
pub fn build_match_engine(pool: PgPool, config: &Config) -> Result<MatchEngine> {
    let timeout = Duration::from_secs(config.http_timeout_secs);
    let presence = presence_store(config, timeout)?;

    let push = match &config.fcm {
        Some(fcm) => Some(FcmClient::new(fcm.project_id.clone(), fcm.access_token.clone(), timeout)?),
        None => {
            warn!("FCM_PROJECT_ID not set, push delivery disabled");
            None
        }
    };

    let tokens = ChannelTokenIssuer::new(
        config.agora_app_id.clone(),
        config.agora_app_certificate.clone(),
    );
    if !tokens.is_configured() {
        warn!("AGORA_APP_ID / AGORA_APP_CERTIFICATE not set, matches get empty channel tokens");
    }

    Ok(MatchEngine::new(
        Arc::new(PgSwipeStore::new(pool.clone())),
        Arc::new(PgUserDirectory::new(pool.clone())),
        Arc::new(PgNotificationDispatcher::new(pool, push)),
        presence,
        Arc::new(tokens),
        config.environment.clone(),
    ))
}
