use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::{created, paginated, PaginationParams, VisibilityParams};
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::book_packs::{BookPackDetail, CreateBookPackInput, UpdateBookPackInput},
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BookPackQuery {
    /// Case-insensitive match on the title
    pub title: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/book-packs",
    params(BookPackQuery, PaginationParams, VisibilityParams),
    responses(
        (status = 200, description = "Packs with their books and availability", body = ApiResponse<PaginatedResponse<BookPackDetail>>)
    ),
    tag = "catalog"
)]
pub async fn list_packs(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Query(query): Query<BookPackQuery>,
    Query(pagination): Query<PaginationParams>,
    Query(visibility): Query<VisibilityParams>,
) -> ApiResult<PaginatedResponse<BookPackDetail>> {
    let (page, per_page) = pagination.resolve(&state.config);
    let (packs, total) = state
        .services
        .book_packs
        .list_packs(
            query.title,
            visibility.allowed_for(user.as_ref()),
            page,
            per_page,
        )
        .await?;
    Ok(Json(ApiResponse::success(paginated(packs, total, page, per_page))))
}

#[utoipa::path(
    get,
    path = "/api/v1/book-packs/:id",
    params(("id" = Uuid, Path, description = "Book pack ID"), VisibilityParams),
    responses(
        (status = 200, description = "Pack fetched", body = ApiResponse<BookPackDetail>),
        (status = 404, description = "Pack not found", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn get_pack(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Path(id): Path<Uuid>,
    Query(visibility): Query<VisibilityParams>,
) -> ApiResult<BookPackDetail> {
    let pack = state
        .services
        .book_packs
        .get_pack(id, visibility.allowed_for(user.as_ref()))
        .await?;
    Ok(Json(ApiResponse::success(pack)))
}

#[utoipa::path(
    post,
    path = "/api/v1/book-packs",
    request_body = CreateBookPackInput,
    responses(
        (status = 201, description = "Pack created", body = ApiResponse<BookPackDetail>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn create_pack(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateBookPackInput>,
) -> Result<(StatusCode, Json<ApiResponse<BookPackDetail>>), ServiceError> {
    let pack = state
        .services
        .book_packs
        .create_pack(payload, &user.audit_name())
        .await?;
    Ok(created(pack))
}

#[utoipa::path(
    put,
    path = "/api/v1/book-packs/:id",
    params(("id" = Uuid, Path, description = "Book pack ID")),
    request_body = UpdateBookPackInput,
    responses(
        (status = 200, description = "Pack updated", body = ApiResponse<BookPackDetail>),
        (status = 404, description = "Pack not found", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn update_pack(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBookPackInput>,
) -> ApiResult<BookPackDetail> {
    let pack = state
        .services
        .book_packs
        .update_pack(id, payload, &user.audit_name())
        .await?;
    Ok(Json(ApiResponse::success(pack)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/book-packs/:id",
    params(("id" = Uuid, Path, description = "Book pack ID")),
    responses(
        (status = 204, description = "Pack deactivated"),
        (status = 404, description = "Pack not found", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn delete_pack(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .book_packs
        .delete_pack(id, &user.audit_name())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
