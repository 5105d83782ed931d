pub mod config;
pub mod logging;

pub use config::{Config, GoogleApiConfig};
pub use logging::init_logging;
