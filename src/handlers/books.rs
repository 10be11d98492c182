use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::common::{created, paginated, PaginationParams, VisibilityParams};
use crate::{
    auth::AuthUser,
    entities::book,
    errors::ServiceError,
    services::books::{AdjustStockInput, BookCriteria, BookDetail, CreateBookInput, UpdateBookInput},
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[utoipa::path(
    get,
    path = "/api/v1/books",
    params(BookCriteria, PaginationParams, VisibilityParams),
    responses(
        (status = 200, description = "Books matching the criteria", body = ApiResponse<PaginatedResponse<BookDetail>>),
        (status = 400, description = "Invalid criteria", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn list_books(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Query(mut criteria): Query<BookCriteria>,
    Query(pagination): Query<PaginationParams>,
    Query(visibility): Query<VisibilityParams>,
) -> ApiResult<PaginatedResponse<BookDetail>> {
    let (page, per_page) = pagination.resolve(&state.config);
    criteria.include_inactive = visibility.allowed_for(user.as_ref());
    let (books, total) = state
        .services
        .books
        .list_books(criteria, page, per_page)
        .await?;
    Ok(Json(ApiResponse::success(paginated(books, total, page, per_page))))
}

#[utoipa::path(
    get,
    path = "/api/v1/books/:id",
    params(("id" = Uuid, Path, description = "Book ID"), VisibilityParams),
    responses(
        (status = 200, description = "Book with author and tags", body = ApiResponse<BookDetail>),
        (status = 404, description = "Book not found", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn get_book(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Path(id): Path<Uuid>,
    Query(visibility): Query<VisibilityParams>,
) -> ApiResult<BookDetail> {
    let book = state
        .services
        .books
        .get_book(id, visibility.allowed_for(user.as_ref()))
        .await?;
    Ok(Json(ApiResponse::success(book)))
}

#[utoipa::path(
    post,
    path = "/api/v1/books",
    request_body = CreateBookInput,
    responses(
        (status = 201, description = "Book created", body = ApiResponse<BookDetail>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn create_book(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateBookInput>,
) -> Result<(StatusCode, Json<ApiResponse<BookDetail>>), ServiceError> {
    let book = state
        .services
        .books
        .create_book(payload, &user.audit_name())
        .await?;
    Ok(created(book))
}

#[utoipa::path(
    put,
    path = "/api/v1/books/:id",
    params(("id" = Uuid, Path, description = "Book ID")),
    request_body = UpdateBookInput,
    responses(
        (status = 200, description = "Book updated", body = ApiResponse<BookDetail>),
        (status = 404, description = "Book not found", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn update_book(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBookInput>,
) -> ApiResult<BookDetail> {
    let book = state
        .services
        .books
        .update_book(id, payload, &user.audit_name())
        .await?;
    Ok(Json(ApiResponse::success(book)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/books/:id",
    params(("id" = Uuid, Path, description = "Book ID")),
    responses(
        (status = 204, description = "Book deactivated"),
        (status = 404, description = "Book not found", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn delete_book(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .books
        .delete_book(id, &user.audit_name())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/books/:id/stock",
    params(("id" = Uuid, Path, description = "Book ID")),
    request_body = AdjustStockInput,
    responses(
        (status = 200, description = "Stock adjusted", body = ApiResponse<book::Model>),
        (status = 400, description = "Adjustment would leave negative stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Book not found", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdjustStockInput>,
) -> ApiResult<book::Model> {
    let book = state
        .services
        .books
        .adjust_stock(id, payload, &user.audit_name())
        .await?;
    Ok(Json(ApiResponse::success(book)))
}
