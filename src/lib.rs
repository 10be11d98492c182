//! Esprit Livre API Library
//!
//! Backend for the Esprit Livre online bookstore: catalog, checkout,
//! Yalidine shipping, accounts and the back-office dashboard.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::State,
    http::HeaderValue,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use utoipa::ToSchema;

use crate::auth::consts as perm;
use crate::auth::{AuthRouterExt, AuthService};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub services: handlers::AppServices,
    pub auth: Arc<AuthService>,
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors: Some(errors),
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    // Catalog reads are public; staff may opt in to inactive records
    let catalog_read = Router::new()
        .route("/authors", get(handlers::authors::list_authors))
        .route("/authors/:id", get(handlers::authors::get_author))
        .route("/tags", get(handlers::tags::list_tags))
        .route("/tags/:id", get(handlers::tags::get_tag))
        .route("/books", get(handlers::books::list_books))
        .route("/books/:id", get(handlers::books::get_book))
        .route("/book-packs", get(handlers::book_packs::list_packs))
        .route("/book-packs/:id", get(handlers::book_packs::get_pack))
        .with_optional_auth();

    let catalog_write = Router::new()
        .route("/authors", post(handlers::authors::create_author))
        .route(
            "/authors/:id",
            put(handlers::authors::update_author).delete(handlers::authors::delete_author),
        )
        .route("/tags", post(handlers::tags::create_tag))
        .route(
            "/tags/:id",
            put(handlers::tags::update_tag).delete(handlers::tags::delete_tag),
        )
        .route("/books", post(handlers::books::create_book))
        .route(
            "/books/:id",
            put(handlers::books::update_book).delete(handlers::books::delete_book),
        )
        .route("/books/:id/stock", post(handlers::books::adjust_stock))
        .route("/book-packs", post(handlers::book_packs::create_pack))
        .route(
            "/book-packs/:id",
            put(handlers::book_packs::update_pack).delete(handlers::book_packs::delete_pack),
        )
        .with_permission(perm::CATALOG_WRITE);

    // Guests may check out; a signed-in customer is attached to the order
    let checkout = Router::new()
        .route("/orders", post(handlers::orders::place_order))
        .with_optional_auth();

    let order_tracking = Router::new().route("/orders/track", get(handlers::orders::track_order));

    let orders_own = Router::new()
        .route("/orders/mine", get(handlers::orders::list_my_orders))
        .with_permission(perm::ORDERS_READ_OWN);

    // Ownership or staff permission is checked by the service
    let orders_authenticated = Router::new()
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/cancel", post(handlers::orders::cancel_order))
        .with_auth();

    let orders_read = Router::new()
        .route("/orders", get(handlers::orders::list_orders))
        .with_permission(perm::ORDERS_READ);

    let orders_update = Router::new()
        .route(
            "/orders/:id/status",
            put(handlers::orders::update_order_status),
        )
        .with_permission(perm::ORDERS_UPDATE);

    let orders_ship = Router::new()
        .route(
            "/orders/:id/shipment",
            post(handlers::orders::create_shipment),
        )
        .with_permission(perm::SHIPMENTS_CREATE);

    let orders_delete = Router::new()
        .route(
            "/orders/:id",
            axum::routing::delete(handlers::orders::delete_order),
        )
        .with_permission(perm::ORDERS_DELETE);

    // Carrier webhook (does not require auth, but signature-verified)
    let shipping_webhook = Router::new().route(
        "/shipping/yalidine/webhook",
        get(handlers::shipping_webhooks::webhook_handshake)
            .post(handlers::shipping_webhooks::receive_webhook),
    );

    let dashboard = Router::new()
        .route("/summary", get(handlers::dashboard::summary))
        .route("/sales", get(handlers::dashboard::sales_over_time))
        .route("/top-books", get(handlers::dashboard::top_books))
        .route("/low-stock", get(handlers::dashboard::low_stock))
        .with_permission(perm::DASHBOARD_READ);

    let auth_routes = Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        .route("/refresh", post(handlers::auth::refresh));

    let account = Router::new()
        .route(
            "/",
            get(handlers::users::get_account).put(handlers::users::update_account),
        )
        .route("/password", post(handlers::users::change_password))
        .with_permission(perm::ACCOUNT_MANAGE);

    let users = Router::new()
        .route("/", get(handlers::users::list_users))
        .route("/:id", get(handlers::users::get_user))
        .route("/:id/activation", put(handlers::users::set_activated))
        .route("/:id/role", put(handlers::users::set_role))
        .with_permission(perm::USERS_MANAGE);

    Router::new()
        // Status endpoint
        .route("/status", get(api_status))
        .route("/health", get(health::readiness))
        // Catalog
        .merge(catalog_read)
        .merge(catalog_write)
        // Orders
        .merge(checkout)
        .merge(order_tracking)
        .merge(orders_own)
        .merge(orders_authenticated)
        .merge(orders_read)
        .merge(orders_update)
        .merge(orders_ship)
        .merge(orders_delete)
        // Shipping
        .merge(shipping_webhook)
        // Back office
        .nest("/dashboard", dashboard)
        .nest("/users", users)
        // Accounts
        .nest("/auth", auth_routes)
        .nest("/account", account)
}

/// Full HTTP application: health checks, metrics, docs and the v1 API with the shared layers
pub fn build_router(state: AppState) -> Router {
    let auth_service = state.auth.clone();
    let cors = cors_layer(&state.config);

    Router::<AppState>::new()
        .route("/", get(|| async { "esprit-livre-api up" }))
        .route("/metrics", get(metrics::metrics_handler))
        .nest("/health", health::health_routes())
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(cors)
        // Inject AuthService into request extensions for auth middleware
        .layer(axum::middleware::from_fn_with_state(
            auth_service,
            |State(auth): State<Arc<AuthService>>,
             mut req: axum::http::Request<axum::body::Body>,
             next: axum::middleware::Next| async move {
                req.extensions_mut().insert(auth);
                next.run(req).await
            },
        ))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

/// Explicit origins when configured; configuration validation guarantees the
/// permissive fallback is only reached when it is allowed
fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if origins.is_empty() {
        ::tracing::info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

async fn api_status(State(state): State<AppState>) -> ApiResult<Value> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "git": option_env!("GIT_HASH").unwrap_or("unknown"),
        "service": "esprit-livre-api",
        "environment": state.config.environment,
        "currency": state.config.default_currency,
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}
