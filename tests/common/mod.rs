#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use esprit_livre_api::{
    auth::{AuthConfig, AuthService},
    build_router,
    config::AppConfig,
    db,
    entities::{
        book::BookLanguage,
        order::{OrderStatus, ShippingMethod},
    },
    events::{self, EventSender},
    handlers::AppServices,
    services::{
        authors::CreateAuthorInput,
        book_packs::{BookPackDetail, CreateBookPackInput},
        books::{BookDetail, CreateBookInput},
        orders::{OrderDetail, OrderLineInput, PlaceOrderInput},
        shipping,
        users::{LoginInput, RegisterInput},
    },
    AppState,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const ADMIN_EMAIL: &str = "admin@espritlivre.dz";
pub const ADMIN_PASSWORD: &str = "admin-password-1";
pub const CUSTOMER_PASSWORD: &str = "reader-password-1";

/// Configuration for an isolated in-memory SQLite database
pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        "test_secret_key_for_esprit_livre_integration_tests_0123".to_string(),
        3600,
        86_400,
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    );
    cfg.auto_migrate = true;
    // One connection, otherwise every pooled connection sees its own empty memory database
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;
    cfg
}

/// Application backed by an in-memory SQLite database, driven through the router with `oneshot`
pub struct TestApp {
    router: Router,
    pub state: AppState,
    admin_token: String,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Fresh application after adjusting the test configuration
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = test_config();
        adjust(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let auth_service = Arc::new(AuthService::new(AuthConfig::from_app_config(&cfg)));
        let provider = shipping::build_provider(&cfg).expect("shipping provider for tests");
        let services = AppServices::new(
            db_arc.clone(),
            event_sender.clone(),
            auth_service.clone(),
            provider,
            &cfg,
        );
        services
            .users
            .bootstrap_admin(ADMIN_EMAIL, ADMIN_PASSWORD)
            .await
            .expect("bootstrap admin");

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
            auth: auth_service,
        };
        let admin_token = state
            .services
            .users
            .login(LoginInput {
                login: ADMIN_EMAIL.to_string(),
                password: ADMIN_PASSWORD.to_string(),
            })
            .await
            .expect("admin login")
            .access_token;

        Self {
            router: build_router(state.clone()),
            state,
            admin_token,
            _event_task: event_task,
        }
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    /// Register a customer and return their access token
    pub async fn customer_token(&self, login: &str) -> String {
        self.state
            .services
            .users
            .register(RegisterInput {
                login: login.to_string(),
                email: format!("{}@example.dz", login),
                password: CUSTOMER_PASSWORD.to_string(),
                first_name: None,
                last_name: None,
                phone: None,
            })
            .await
            .expect("register customer");
        self.state
            .services
            .users
            .login(LoginInput {
                login: login.to_string(),
                password: CUSTOMER_PASSWORD.to_string(),
            })
            .await
            .expect("customer login")
            .access_token
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        self.send(builder.body(body).expect("failed to build request"))
            .await
    }

    pub async fn request_admin(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, Some(&self.admin_token)).await
    }

    /// Raw request, for bodies that must reach the handler byte for byte
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn seed_author(&self, name: &str) -> Uuid {
        self.state
            .services
            .authors
            .create_author(
                CreateAuthorInput {
                    name: name.to_string(),
                    biography: None,
                    profile_picture_url: None,
                },
                "tests",
            )
            .await
            .expect("seed author")
            .id
    }

    pub async fn seed_book(&self, title: &str, price: Decimal, stock: i32) -> BookDetail {
        self.state
            .services
            .books
            .create_book(
                CreateBookInput {
                    title: title.to_string(),
                    description: None,
                    author_id: None,
                    price,
                    on_sale_price: None,
                    stock_quantity: stock,
                    cover_image_url: None,
                    language: BookLanguage::FR,
                    tag_ids: Vec::new(),
                },
                "tests",
            )
            .await
            .expect("seed book")
    }

    pub async fn seed_pack(&self, title: &str, price: Decimal, book_ids: Vec<Uuid>) -> BookPackDetail {
        self.state
            .services
            .book_packs
            .create_pack(
                CreateBookPackInput {
                    title: title.to_string(),
                    description: None,
                    price,
                    cover_image_url: None,
                    book_ids,
                },
                "tests",
            )
            .await
            .expect("seed pack")
    }

    pub async fn book_stock(&self, id: Uuid) -> i32 {
        self.state
            .services
            .books
            .find_book(id, true)
            .await
            .expect("book exists")
            .stock_quantity
    }

    /// Guest order placed straight through the service
    pub async fn place_order(&self, lines: Vec<OrderLineInput>) -> OrderDetail {
        self.state
            .services
            .orders
            .place_order(order_input(lines), None)
            .await
            .expect("place order")
    }

    /// Move an order along through the admin API
    pub async fn set_status(&self, order_id: Uuid, status: OrderStatus) -> Response {
        self.request_admin(
            Method::PUT,
            &format!("/api/v1/orders/{}/status", order_id),
            Some(serde_json::json!({ "status": status })),
        )
        .await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn book_line(book_id: Uuid, quantity: i32) -> OrderLineInput {
    OrderLineInput {
        book_id: Some(book_id),
        book_pack_id: None,
        quantity,
    }
}

pub fn pack_line(pack_id: Uuid, quantity: i32) -> OrderLineInput {
    OrderLineInput {
        book_id: None,
        book_pack_id: Some(pack_id),
        quantity,
    }
}

pub fn order_input(items: Vec<OrderLineInput>) -> PlaceOrderInput {
    PlaceOrderInput {
        full_name: "Amina Bensalem".to_string(),
        phone: "0551 23 45 67".to_string(),
        email: Some("amina@example.dz".to_string()),
        wilaya: "Alger".to_string(),
        city: "Bab Ezzouar".to_string(),
        street_address: "Cité 5 Juillet, bt 12".to_string(),
        shipping_method: ShippingMethod::HomeDelivery,
        stopdesk_id: None,
        items,
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
