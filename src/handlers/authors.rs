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
    entities::author,
    errors::ServiceError,
    services::authors::{AuthorFilter, CreateAuthorInput, UpdateAuthorInput},
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorQuery {
    /// Case-insensitive match on the name
    pub name: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/authors",
    params(AuthorQuery, PaginationParams, VisibilityParams),
    responses(
        (status = 200, description = "Authors listed", body = ApiResponse<PaginatedResponse<author::Model>>)
    ),
    tag = "catalog"
)]
pub async fn list_authors(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Query(query): Query<AuthorQuery>,
    Query(pagination): Query<PaginationParams>,
    Query(visibility): Query<VisibilityParams>,
) -> ApiResult<PaginatedResponse<author::Model>> {
    let (page, per_page) = pagination.resolve(&state.config);
    let filter = AuthorFilter {
        name: query.name,
        include_inactive: visibility.allowed_for(user.as_ref()),
    };
    let (authors, total) = state
        .services
        .authors
        .list_authors(filter, page, per_page)
        .await?;
    Ok(Json(ApiResponse::success(paginated(
        authors, total, page, per_page,
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/authors/:id",
    params(("id" = Uuid, Path, description = "Author ID"), VisibilityParams),
    responses(
        (status = 200, description = "Author fetched", body = ApiResponse<author::Model>),
        (status = 404, description = "Author not found", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn get_author(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Path(id): Path<Uuid>,
    Query(visibility): Query<VisibilityParams>,
) -> ApiResult<author::Model> {
    let author = state
        .services
        .authors
        .get_author(id, visibility.allowed_for(user.as_ref()))
        .await?;
    Ok(Json(ApiResponse::success(author)))
}

#[utoipa::path(
    post,
    path = "/api/v1/authors",
    request_body = CreateAuthorInput,
    responses(
        (status = 201, description = "Author created", body = ApiResponse<author::Model>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 409, description = "Name already used", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn create_author(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateAuthorInput>,
) -> Result<(StatusCode, Json<ApiResponse<author::Model>>), ServiceError> {
    let author = state
        .services
        .authors
        .create_author(payload, &user.audit_name())
        .await?;
    Ok(created(author))
}

#[utoipa::path(
    put,
    path = "/api/v1/authors/:id",
    params(("id" = Uuid, Path, description = "Author ID")),
    request_body = UpdateAuthorInput,
    responses(
        (status = 200, description = "Author updated", body = ApiResponse<author::Model>),
        (status = 404, description = "Author not found", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn update_author(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAuthorInput>,
) -> ApiResult<author::Model> {
    let author = state
        .services
        .authors
        .update_author(id, payload, &user.audit_name())
        .await?;
    Ok(Json(ApiResponse::success(author)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/authors/:id",
    params(("id" = Uuid, Path, description = "Author ID")),
    responses(
        (status = 204, description = "Author deactivated"),
        (status = 404, description = "Author not found", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn delete_author(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .authors
        .delete_author(id, &user.audit_name())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
