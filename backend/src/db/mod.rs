pub mod connection;
pub mod migrations;
pub mod notifications;
pub mod swipes;
pub mod users;

pub use connection::{get_db_pool, DatabaseConfig};
pub use notifications::PgNotificationDispatcher;
pub use swipes::PgSwipeStore;
pub use users::PgUserDirectory;
