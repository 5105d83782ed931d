pub mod notifications;
pub mod swipes;
pub mod users;

pub use notifications::{NewNotification, NotificationRecord, PushMessage};
pub use swipes::{Match, MatchPair, SwipeRecord, SwipeResult};
pub use users::{Photo, User, UserProfile};
