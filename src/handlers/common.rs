use crate::{
    auth::{consts as perm, AuthUser},
    config::AppConfig,
    ApiResponse, PaginatedResponse,
};
use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

/// Pagination parameters for list operations
#[derive(Debug, Default, Deserialize, Serialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// One-based page number
    pub page: Option<u64>,
    /// Items per page, capped by configuration
    pub per_page: Option<u64>,
}

impl PaginationParams {
    /// Page and page size after defaults and limits are applied
    pub fn resolve(&self, config: &AppConfig) -> (u64, u64) {
        (self.page.unwrap_or(1).max(1), config.page_size(self.per_page))
    }
}

/// Opt-in to soft-deleted catalog records; honoured for staff only
#[derive(Debug, Default, Deserialize, Serialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VisibilityParams {
    #[serde(default)]
    pub include_inactive: bool,
}

impl VisibilityParams {
    pub fn allowed_for(&self, user: Option<&AuthUser>) -> bool {
        self.include_inactive
            && user.map_or(false, |u| {
                u.is_admin() || u.has_permission(perm::CATALOG_READ_INACTIVE)
            })
    }
}

/// Wrap a page of results
pub fn paginated<T>(items: Vec<T>, total: u64, page: u64, per_page: u64) -> PaginatedResponse<T> {
    let total_pages = if total == 0 || per_page == 0 {
        0
    } else {
        total.div_ceil(per_page)
    };
    PaginatedResponse {
        items,
        total,
        page,
        limit: per_page,
        total_pages,
    }
}

/// 201 with the standard envelope
pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::success(data)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_round_up() {
        let page = paginated(vec![1, 2], 41, 1, 20);
        assert_eq!(page.total_pages, 3);
        assert_eq!(paginated::<u8>(vec![], 0, 1, 20).total_pages, 0);
    }

    #[test]
    fn guests_never_see_inactive_records() {
        let params = VisibilityParams {
            include_inactive: true,
        };
        assert!(!params.allowed_for(None));
    }
}
