pub mod auth;
pub mod authors;
pub mod book_packs;
pub mod books;
pub mod common;
pub mod dashboard;
pub mod orders;
pub mod shipping_webhooks;
pub mod tags;
pub mod users;

use crate::{
    auth::AuthService,
    config::AppConfig,
    events::EventSender,
    services::{
        authors::AuthorService,
        book_packs::BookPackService,
        books::BookService,
        dashboard::DashboardService,
        orders::OrderService,
        shipping::{ShippingProvider, ShippingWebhookService},
        tags::TagService,
        users::UserService,
    },
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub authors: Arc<AuthorService>,
    pub tags: Arc<TagService>,
    pub books: Arc<BookService>,
    pub book_packs: Arc<BookPackService>,
    pub orders: Arc<OrderService>,
    pub shipping_webhooks: Arc<ShippingWebhookService>,
    pub dashboard: Arc<DashboardService>,
    pub users: Arc<UserService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        auth: Arc<AuthService>,
        shipping: Arc<dyn ShippingProvider>,
        config: &AppConfig,
    ) -> Self {
        let books = Arc::new(BookService::new(
            db.clone(),
            event_sender.clone(),
            config.low_stock_threshold,
        ));
        let orders = Arc::new(OrderService::new(
            db.clone(),
            event_sender.clone(),
            shipping,
            config.free_shipping_threshold,
            config.low_stock_threshold,
        ));
        let shipping_webhooks = Arc::new(ShippingWebhookService::new(
            db.clone(),
            orders.clone(),
            config.yalidine_webhook_secret.clone(),
        ));

        Self {
            authors: Arc::new(AuthorService::new(db.clone())),
            tags: Arc::new(TagService::new(db.clone())),
            book_packs: Arc::new(BookPackService::new(db.clone())),
            dashboard: Arc::new(DashboardService::new(db.clone(), books.clone())),
            users: Arc::new(UserService::new(db, auth, event_sender)),
            books,
            orders,
            shipping_webhooks,
        }
    }
}
