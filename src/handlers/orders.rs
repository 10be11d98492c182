use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::{created, paginated, PaginationParams};
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::orders::{
        CreateShipmentInput, OrderDetail, OrderFilter, PlaceOrderInput, ShipmentDetail,
        UpdateOrderStatusInput,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TrackOrderQuery {
    /// Order reference, `EL-YYYYMMDD-XXXXXX`
    pub unique_id: String,
    /// Phone number given at checkout
    pub phone: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = PlaceOrderInput,
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<OrderDetail>),
        (status = 400, description = "Invalid order", body = crate::errors::ErrorResponse),
        (status = 404, description = "Book or pack unavailable", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
        (status = 502, description = "Shipping provider unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn place_order(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Json(payload): Json<PlaceOrderInput>,
) -> Result<(StatusCode, Json<ApiResponse<OrderDetail>>), ServiceError> {
    let order = state
        .services
        .orders
        .place_order(payload, user.as_ref())
        .await?;
    Ok(created(order))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/track",
    params(TrackOrderQuery),
    responses(
        (status = 200, description = "Order found", body = ApiResponse<OrderDetail>),
        (status = 404, description = "No order for this reference and phone", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn track_order(
    State(state): State<AppState>,
    Query(query): Query<TrackOrderQuery>,
) -> ApiResult<OrderDetail> {
    let order = state
        .services
        .orders
        .track_order(&query.unique_id, &query.phone)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/mine",
    params(PaginationParams),
    responses(
        (status = 200, description = "Orders of the caller", body = ApiResponse<PaginatedResponse<OrderDetail>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<OrderDetail>> {
    let (page, per_page) = pagination.resolve(&state.config);
    let (orders, total) = state
        .services
        .orders
        .list_user_orders(user.user_id, page, per_page)
        .await?;
    Ok(Json(ApiResponse::success(paginated(orders, total, page, per_page))))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(OrderFilter, PaginationParams),
    responses(
        (status = 200, description = "Orders listed", body = ApiResponse<PaginatedResponse<OrderDetail>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(filter): Query<OrderFilter>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<OrderDetail>> {
    let (page, per_page) = pagination.resolve(&state.config);
    let (orders, total) = state
        .services
        .orders
        .list_orders(filter, page, per_page)
        .await?;
    Ok(Json(ApiResponse::success(paginated(orders, total, page, per_page))))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/:id",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order with its items", body = ApiResponse<OrderDetail>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderDetail> {
    let order = state.services.orders.get_order(id, &user).await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/:id/status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusInput,
    responses(
        (status = 200, description = "Status changed", body = ApiResponse<OrderDetail>),
        (status = 400, description = "Transition not allowed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusInput>,
) -> ApiResult<OrderDetail> {
    let order = state
        .services
        .orders
        .update_status(id, payload, &user)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/:id/cancel",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order cancelled and stock restored", body = ApiResponse<OrderDetail>),
        (status = 400, description = "Order can no longer be cancelled", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderDetail> {
    let order = state.services.orders.cancel_order(id, &user).await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/:id/shipment",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = CreateShipmentInput,
    responses(
        (status = 201, description = "Parcel registered", body = ApiResponse<ShipmentDetail>),
        (status = 400, description = "Order is not confirmed", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order already shipped", body = crate::errors::ErrorResponse),
        (status = 502, description = "Carrier rejected the parcel", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn create_shipment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<CreateShipmentInput>>,
) -> Result<(StatusCode, Json<ApiResponse<ShipmentDetail>>), ServiceError> {
    let input = payload.map(|Json(input)| input).unwrap_or_default();
    let shipment = state
        .services
        .orders
        .create_shipment(id, input, &user)
        .await?;
    Ok(created(shipment))
}

#[utoipa::path(
    delete,
    path = "/api/v1/orders/:id",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 204, description = "Order deactivated"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn delete_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.orders.delete_order(id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}
