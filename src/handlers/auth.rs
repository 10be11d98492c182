use axum::{extract::State, http::StatusCode, Json};

use super::common::created;
use crate::{
    auth::TokenPair,
    errors::ServiceError,
    services::users::{LoginInput, RefreshInput, RegisterInput, UserResponse},
    ApiResponse, ApiResult, AppState,
};

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterInput,
    responses(
        (status = 201, description = "Account created", body = ApiResponse<UserResponse>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 409, description = "Login or e-mail already used", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterInput>,
) -> Result<(StatusCode, Json<ApiResponse<UserResponse>>), ServiceError> {
    let user = state.services.users.register(payload).await?;
    Ok(created(user))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginInput,
    responses(
        (status = 200, description = "Signed in", body = ApiResponse<TokenPair>),
        (status = 401, description = "Invalid credentials", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginInput>,
) -> ApiResult<TokenPair> {
    let tokens = state.services.users.login(payload).await?;
    Ok(Json(ApiResponse::success(tokens)))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshInput,
    responses(
        (status = 200, description = "New token pair", body = ApiResponse<TokenPair>),
        (status = 401, description = "Invalid or expired refresh token", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshInput>,
) -> ApiResult<TokenPair> {
    let tokens = state.services.users.refresh(payload).await?;
    Ok(Json(ApiResponse::success(tokens)))
}
