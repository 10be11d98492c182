use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::common::{paginated, PaginationParams};
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::users::{
        ChangePasswordInput, SetActivatedInput, SetRoleInput, UpdateAccountInput, UserFilter,
        UserResponse,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[utoipa::path(
    get,
    path = "/api/v1/account",
    responses(
        (status = 200, description = "Profile of the caller", body = ApiResponse<UserResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "account"
)]
pub async fn get_account(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<UserResponse> {
    let account = state.services.users.get_account(user.user_id).await?;
    Ok(Json(ApiResponse::success(account)))
}

#[utoipa::path(
    put,
    path = "/api/v1/account",
    request_body = UpdateAccountInput,
    responses(
        (status = 200, description = "Profile updated", body = ApiResponse<UserResponse>),
        (status = 409, description = "E-mail already used", body = crate::errors::ErrorResponse)
    ),
    tag = "account"
)]
pub async fn update_account(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateAccountInput>,
) -> ApiResult<UserResponse> {
    let account = state
        .services
        .users
        .update_account(user.user_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(account)))
}

#[utoipa::path(
    post,
    path = "/api/v1/account/password",
    request_body = ChangePasswordInput,
    responses(
        (status = 204, description = "Password changed"),
        (status = 401, description = "Current password is wrong", body = crate::errors::ErrorResponse)
    ),
    tag = "account"
)]
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ChangePasswordInput>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .users
        .change_password(user.user_id, payload)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(UserFilter, PaginationParams),
    responses(
        (status = 200, description = "Accounts listed", body = ApiResponse<PaginatedResponse<UserResponse>>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(filter): Query<UserFilter>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<UserResponse>> {
    let (page, per_page) = pagination.resolve(&state.config);
    let (users, total) = state
        .services
        .users
        .list_users(filter, page, per_page)
        .await?;
    Ok(Json(ApiResponse::success(paginated(users, total, page, per_page))))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/:id",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Account fetched", body = ApiResponse<UserResponse>),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse)
    ),
    tag = "users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<UserResponse> {
    let user = state.services.users.get_user(id).await?;
    Ok(Json(ApiResponse::success(user)))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/:id/activation",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = SetActivatedInput,
    responses(
        (status = 200, description = "Activation changed", body = ApiResponse<UserResponse>),
        (status = 400, description = "Cannot deactivate yourself", body = crate::errors::ErrorResponse)
    ),
    tag = "users"
)]
pub async fn set_activated(
    State(state): State<AppState>,
    admin: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetActivatedInput>,
) -> ApiResult<UserResponse> {
    let user = state
        .services
        .users
        .set_activated(id, payload.activated, admin.user_id)
        .await?;
    Ok(Json(ApiResponse::success(user)))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/:id/role",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = SetRoleInput,
    responses(
        (status = 200, description = "Role changed", body = ApiResponse<UserResponse>),
        (status = 400, description = "Cannot demote yourself", body = crate::errors::ErrorResponse)
    ),
    tag = "users"
)]
pub async fn set_role(
    State(state): State<AppState>,
    admin: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetRoleInput>,
) -> ApiResult<UserResponse> {
    let user = state
        .services
        .users
        .set_role(id, payload.role, admin.user_id)
        .await?;
    Ok(Json(ApiResponse::success(user)))
}
