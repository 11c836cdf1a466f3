use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    users::{
        dto::{EmailQuery, GetOrCreateUserRequest, UpdateUserRequest, UserResponse},
        extractors::CurrentUser,
        repo_types::User,
        services,
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(get_or_create_user).get(find_user_by_email))
        .route("/users/:id", get(get_user).patch(update_user))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

/// 201 when the user was created by this call, 200 when it already existed.
#[instrument(skip(state, payload))]
pub async fn get_or_create_user(
    State(state): State<AppState>,
    Json(payload): Json<GetOrCreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let (user, created) =
        services::get_or_create_user(&state.db, &payload.email, &payload.name).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    info!(user_id = %user.id, created, "get_or_create user");
    Ok((status, Json(user.into())))
}

/// GET /users?email=...
#[instrument(skip(state, q))]
pub async fn find_user_by_email(
    State(state): State<AppState>,
    Query(q): Query<EmailQuery>,
) -> ApiResult<Json<UserResponse>> {
    let user = services::get_user_by_email(&state.db, &q.email)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserResponse>> {
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    let user = services::update_user(&state.db, id, payload.into()).await?;
    Ok(Json(user.into()))
}

#[instrument(skip_all)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(user.into())
}

#[cfg(test)]
mod me_tests {
    use super::*;
    use time::OffsetDateTime;

    #[test]
    fn user_response_serialization() {
        let now = OffsetDateTime::now_utc();
        let response = UserResponse::from(User {
            id: Uuid::new_v4(),
            name: "Test User".into(),
            email: "test@example.com".into(),
            is_active: true,
            created_at: now,
            updated_at: now,
        });

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["email"], "test@example.com");
        assert_eq!(json["is_active"], true);
        assert!(json["created_at"].as_str().unwrap().contains('T'));
    }
}
