use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    entities::book,
    services::dashboard::{DailySales, DashboardSummary, DateRangeQuery, TopBook},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TopBooksQuery {
    /// Number of books, 1 to 100 (default 10)
    pub limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LowStockQuery {
    /// Defaults to the configured threshold
    pub threshold: Option<i32>,
}

#[utoipa::path(
    get,
    path = "/api/v1/dashboard/summary",
    params(DateRangeQuery),
    responses(
        (status = 200, description = "Order and revenue summary", body = ApiResponse<DashboardSummary>),
        (status = 400, description = "Invalid range", body = crate::errors::ErrorResponse)
    ),
    tag = "dashboard"
)]
pub async fn summary(
    State(state): State<AppState>,
    Query(range): Query<DateRangeQuery>,
) -> ApiResult<DashboardSummary> {
    let summary = state.services.dashboard.summary(range).await?;
    Ok(Json(ApiResponse::success(summary)))
}

#[utoipa::path(
    get,
    path = "/api/v1/dashboard/sales",
    params(DateRangeQuery),
    responses(
        (status = 200, description = "Daily order count and revenue", body = ApiResponse<Vec<DailySales>>)
    ),
    tag = "dashboard"
)]
pub async fn sales_over_time(
    State(state): State<AppState>,
    Query(range): Query<DateRangeQuery>,
) -> ApiResult<Vec<DailySales>> {
    let sales = state.services.dashboard.sales_over_time(range).await?;
    Ok(Json(ApiResponse::success(sales)))
}

#[utoipa::path(
    get,
    path = "/api/v1/dashboard/top-books",
    params(TopBooksQuery, DateRangeQuery),
    responses(
        (status = 200, description = "Best-selling books", body = ApiResponse<Vec<TopBook>>)
    ),
    tag = "dashboard"
)]
pub async fn top_books(
    State(state): State<AppState>,
    Query(query): Query<TopBooksQuery>,
    Query(range): Query<DateRangeQuery>,
) -> ApiResult<Vec<TopBook>> {
    let books = state.services.dashboard.top_books(query.limit, range).await?;
    Ok(Json(ApiResponse::success(books)))
}

#[utoipa::path(
    get,
    path = "/api/v1/dashboard/low-stock",
    params(LowStockQuery),
    responses(
        (status = 200, description = "Books at or under the threshold", body = ApiResponse<Vec<book::Model>>)
    ),
    tag = "dashboard"
)]
pub async fn low_stock(
    State(state): State<AppState>,
    Query(query): Query<LowStockQuery>,
) -> ApiResult<Vec<book::Model>> {
    let books = state.services.dashboard.low_stock(query.threshold).await?;
    Ok(Json(ApiResponse::success(books)))
}
