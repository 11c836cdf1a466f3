use crate::state::AppState;
use axum::Router;

pub mod classifier;
mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod view;

pub use classifier::{FoodClassifier, StubClassifier};

pub fn router() -> Router<AppState> {
    handlers::analysis_routes()
}
