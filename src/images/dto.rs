use serde::{Deserialize, Serialize};

use crate::analysis::view::AnalysisView;
use crate::images::repo_types::FoodImage;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// An image together with its latest analysis, if one was run.
#[derive(Debug, Serialize)]
pub struct ImageDetails {
    pub image: FoodImage,
    pub analysis: Option<AnalysisView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_bounds() {
        let p = Pagination::default();
        assert_eq!((p.limit(), p.offset()), (20, 0));

        let p = Pagination {
            limit: Some(1000),
            offset: Some(-5),
        };
        assert_eq!((p.limit(), p.offset()), (100, 0));
    }
}
