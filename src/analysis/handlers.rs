use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    analysis::{
        dto::HistoryQuery,
        services,
        view::{AnalysisView, HistoryCard},
    },
    error::{ApiError, ApiResult},
    state::AppState,
    users::CurrentUser,
};

pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/analyses", get(list_history))
        .route("/analyses/:id", get(get_analysis))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<HistoryCard>>> {
    let analyses = services::get_recent_analyses(&state, user.id, q.limit()).await?;
    Ok(Json(analyses.iter().map(HistoryCard::from).collect()))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_analysis(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AnalysisView>> {
    let full = services::get_analysis_with_allergens(&state, id, user.id)
        .await?
        .ok_or(ApiError::NotFound("Analysis not found"))?;
    Ok(Json(AnalysisView::from(&full)))
}
