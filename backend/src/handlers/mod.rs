pub mod auth;
pub mod error;
pub mod matches;

pub use auth::{AuthUser, JwtKeys};
pub use error::ApiError;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::services::MatchEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MatchEngine>,
    pub jwt: Arc<JwtKeys>,
}

impl AppState {
    pub fn new(engine: MatchEngine, jwt: JwtKeys) -> Self {
        Self {
            engine: Arc::new(engine),
            jwt: Arc::new(jwt),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/matches", get(matches::list_matches))
        .route("/matches/swipe/{target_user_id}", post(matches::swipe))
        .route("/matches/user/with/{target_user_id}", get(matches::specific_match))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
