use crate::config::UploadConfig;
use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
pub mod processing;
pub mod repo;
pub mod repo_types;
pub mod services;

pub fn router(cfg: &UploadConfig) -> Router<AppState> {
    handlers::image_routes(cfg)
}
