use axum::{extract::State, routing::get, Json, Router};
use tracing::instrument;

use crate::{
    allergens::{repo, repo_types::Allergen},
    error::ApiResult,
    state::AppState,
};

pub fn allergen_routes() -> Router<AppState> {
    Router::new().route("/allergens", get(list_allergens))
}

#[instrument(skip(state))]
pub async fn list_allergens(State(state): State<AppState>) -> ApiResult<Json<Vec<Allergen>>> {
    Ok(Json(repo::list_active(&state.db).await?))
}
