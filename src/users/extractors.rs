use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::warn;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;
use crate::users::repo_types::User;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Resolves the calling user from the `x-user-id` header.
pub struct CurrentUser(pub User);

pub(crate) fn user_id_from_parts(parts: &Parts) -> Result<Uuid, ApiError> {
    let raw = parts
        .headers
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or(ApiError::Unauthorized("missing x-user-id header"))?;
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::Unauthorized("invalid x-user-id header"))
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user_id = user_id_from_parts(parts)?;
        let user = User::find_by_id(&state.db, user_id)
            .await?
            .ok_or(ApiError::Unauthorized("unknown user"))?;
        if !user.is_active {
            warn!(%user_id, "inactive user rejected");
            return Err(ApiError::Unauthorized("user is inactive"));
        }
        Ok(CurrentUser(user))
    }
}
