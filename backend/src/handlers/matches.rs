use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};

use super::{auth::AuthUser, error::ApiError, AppState};
use crate::constants::MSG_MATCH_NOT_FOUND;
use crate::models::{Match, SwipeResult, UserProfile};

#[derive(Debug, Serialize, Deserialize)]
pub struct SwipeResponse {
    pub msg: String,
    // Wire name kept as existing clients spell it.
    pub match_occured: bool,
}

impl From<&SwipeResult> for SwipeResponse {
    fn from(result: &SwipeResult) -> Self {
        Self {
            msg: result.message().to_string(),
            match_occured: result.match_occurred(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SpecificMatchResponse {
    Found(Match),
    NotFound { message: &'static str },
}

/// POST /matches/swipe/{target_user_id}
pub async fn swipe(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(target_user_id): Path<i32>,
) -> Result<Json<SwipeResponse>, ApiError> {
    let result = state.engine.swipe(auth.user_id, target_user_id).await?;
    Ok(Json(SwipeResponse::from(&result)))
}

/// GET /matches
pub async fn list_matches(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
    Ok(Json(state.engine.list_matches(auth.user_id).await?))
}

/// GET /matches/user/with/{target_user_id}
pub async fn specific_match(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(target_user_id): Path<i32>,
) -> Result<Json<SpecificMatchResponse>, ApiError> {
    let response = match state
        .engine
        .get_specific_match(auth.user_id, target_user_id)
        .await?
    {
        Some(found) => SpecificMatchResponse::Found(found),
        None => SpecificMatchResponse::NotFound {
            message: MSG_MATCH_NOT_FOUND,
        },
    };
    Ok(Json(response))
}
