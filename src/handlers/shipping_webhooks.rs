use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;

use crate::{
    errors::ServiceError,
    services::shipping::{webhook::SIGNATURE_HEADER, WebhookSummary},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WebhookHandshake {
    pub subscribe: Option<String>,
    /// Echoed back to confirm the endpoint
    pub crc_token: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/shipping/yalidine/webhook",
    params(WebhookHandshake),
    responses(
        (status = 200, description = "crc_token echoed", body = String),
        (status = 400, description = "crc_token missing", body = crate::errors::ErrorResponse)
    ),
    tag = "shipping"
)]
pub async fn webhook_handshake(
    Query(query): Query<WebhookHandshake>,
) -> Result<String, ServiceError> {
    let token = query
        .crc_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ServiceError::InvalidInput("crc_token is required".into()))?;
    info!(subscribe = ?query.subscribe, "Yalidine webhook subscription confirmed");
    Ok(token)
}

#[utoipa::path(
    post,
    path = "/api/v1/shipping/yalidine/webhook",
    request_body(content = String, description = "Raw Yalidine event batch", content_type = "application/json"),
    responses(
        (status = 200, description = "Events processed", body = ApiResponse<WebhookSummary>),
        (status = 400, description = "Malformed payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Bad signature", body = crate::errors::ErrorResponse)
    ),
    tag = "shipping"
)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<WebhookSummary> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let summary = state
        .services
        .shipping_webhooks
        .handle(&body, signature)
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}
