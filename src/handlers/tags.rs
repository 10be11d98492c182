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
    entities::tag::{self, TagType},
    errors::ServiceError,
    services::tags::{CreateTagInput, TagFilter, UpdateTagInput},
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TagQuery {
    pub tag_type: Option<TagType>,
    /// Matches the English or French name
    pub search: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/tags",
    params(TagQuery, PaginationParams, VisibilityParams),
    responses(
        (status = 200, description = "Tags listed", body = ApiResponse<PaginatedResponse<tag::Model>>)
    ),
    tag = "catalog"
)]
pub async fn list_tags(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Query(query): Query<TagQuery>,
    Query(pagination): Query<PaginationParams>,
    Query(visibility): Query<VisibilityParams>,
) -> ApiResult<PaginatedResponse<tag::Model>> {
    let (page, per_page) = pagination.resolve(&state.config);
    let filter = TagFilter {
        tag_type: query.tag_type,
        search: query.search,
        include_inactive: visibility.allowed_for(user.as_ref()),
    };
    let (tags, total) = state.services.tags.list_tags(filter, page, per_page).await?;
    Ok(Json(ApiResponse::success(paginated(tags, total, page, per_page))))
}

#[utoipa::path(
    get,
    path = "/api/v1/tags/:id",
    params(("id" = Uuid, Path, description = "Tag ID"), VisibilityParams),
    responses(
        (status = 200, description = "Tag fetched", body = ApiResponse<tag::Model>),
        (status = 404, description = "Tag not found", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn get_tag(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Path(id): Path<Uuid>,
    Query(visibility): Query<VisibilityParams>,
) -> ApiResult<tag::Model> {
    let tag = state
        .services
        .tags
        .get_tag(id, visibility.allowed_for(user.as_ref()))
        .await?;
    Ok(Json(ApiResponse::success(tag)))
}

#[utoipa::path(
    post,
    path = "/api/v1/tags",
    request_body = CreateTagInput,
    responses(
        (status = 201, description = "Tag created", body = ApiResponse<tag::Model>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn create_tag(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateTagInput>,
) -> Result<(StatusCode, Json<ApiResponse<tag::Model>>), ServiceError> {
    let tag = state
        .services
        .tags
        .create_tag(payload, &user.audit_name())
        .await?;
    Ok(created(tag))
}

#[utoipa::path(
    put,
    path = "/api/v1/tags/:id",
    params(("id" = Uuid, Path, description = "Tag ID")),
    request_body = UpdateTagInput,
    responses(
        (status = 200, description = "Tag updated", body = ApiResponse<tag::Model>),
        (status = 404, description = "Tag not found", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn update_tag(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTagInput>,
) -> ApiResult<tag::Model> {
    let tag = state
        .services
        .tags
        .update_tag(id, payload, &user.audit_name())
        .await?;
    Ok(Json(ApiResponse::success(tag)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/tags/:id",
    params(("id" = Uuid, Path, description = "Tag ID")),
    responses(
        (status = 204, description = "Tag deactivated"),
        (status = 404, description = "Tag not found", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn delete_tag(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .tags
        .delete_tag(id, &user.audit_name())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
