use crate::state::AppState;
use axum::Router;

pub mod handlers;
pub mod repo;
pub mod repo_types;

pub use repo_types::{Allergen, Severity};

pub fn router() -> Router<AppState> {
    handlers::allergen_routes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parses_known_levels() {
        assert_eq!("mild".parse::<Severity>().unwrap(), Severity::Mild);
        assert_eq!("severe".parse::<Severity>().unwrap(), Severity::Severe);
        assert!("fatal".parse::<Severity>().is_err());
        assert_eq!(Severity::default().to_string(), "moderate");
    }
}
