// =============================================================================
// Kindred Backend Constants
// =============================================================================
// Tunables and wire strings for the match service, kept in one place.

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP port when PORT is not set
pub const DEFAULT_SERVER_PORT: u16 = 3000;

/// Default collection prefix for the presence store
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Default timeout for outbound HTTP calls (presence store, push)
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// SWIPE RESPONSES
// =============================================================================

pub const MSG_SWIPE_WAITING: &str = "Swipe recorded. Waiting for mutual swipe to create a match.";

pub const MSG_ALREADY_SWIPED: &str = "Swipe recorded. You have already swiped on this user.";

pub const MSG_ALREADY_MATCHED: &str = "You have already matched with this user.";

pub const MSG_MATCH_CREATED: &str = "Match created successfully and notifications sent";

pub const MSG_MATCH_NOT_FOUND: &str = "Match not found.";

// =============================================================================
// USERS
// =============================================================================

/// Role excluded from match listings
pub const ADMIN_ROLE: &str = "admin";

/// Used in notification bodies when a user has no name on file
pub const FALLBACK_DISPLAY_NAME: &str = "Someone";

// =============================================================================
// NOTIFICATIONS
// =============================================================================

pub const NOTIFICATION_KIND_MATCHES: &str = "matches";

pub const MATCH_NOTIFICATION_TITLE: &str = "It's a match!";

/// FCM HTTP v1 API base
pub const FCM_API_BASE: &str = "https://fcm.googleapis.com/v1";

// =============================================================================
// PRESENCE STORE
// =============================================================================

/// Firestore REST API base
pub const FIRESTORE_API_BASE: &str = "https://firestore.googleapis.com/v1";

/// Suffix of the per-user presence collection ("{env}_users")
pub const USERS_COLLECTION_SUFFIX: &str = "users";

/// Suffix of the per-user chat collection ("{env}_chat")
pub const CHAT_COLLECTION_SUFFIX: &str = "chat";

/// Per-pair sub-collection under a chat document
pub const SETTINGS_SUBCOLLECTION: &str = "settings";

// =============================================================================
// CHANNEL TOKENS
// =============================================================================

/// Media channel credential lifetime (one year)
pub const CHANNEL_TOKEN_TTL_SECS: u32 = 31_536_000;

/// Agora uid bound into match tokens; 0 admits either participant
pub const CHANNEL_TOKEN_ANY_UID: &str = "0";

// =============================================================================
// PRESENCE RECONCILER
// =============================================================================

/// How often the reconciler looks for unsynced matches
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 30;

/// Matches re-projected per reconciler pass
pub const RECONCILE_BATCH_SIZE: i64 = 50;
