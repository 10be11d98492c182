use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Esprit Livre API",
        version = "0.1.0",
        description = r#"
# Esprit Livre Bookstore API

Backend of the Esprit Livre online bookstore.

## Features

- **Catalog**: books, authors, tags and book packs
- **Checkout**: guest or signed-in orders with stock reserved atomically
- **Shipping**: Yalidine parcels and carrier status webhooks
- **Accounts**: registration, sign-in and profile management
- **Dashboard**: sales aggregates and low-stock reporting

## Authentication

Staff and customer endpoints expect an access token from `/api/v1/auth/login`:

```
Authorization: Bearer <your-jwt-token>
```

Catalog reads, checkout, order tracking and the carrier webhook are public.

## Error Handling

Errors share one shape with an HTTP status matching the failure:

```json
{
  "error": "Unprocessable Entity",
  "message": "Insufficient stock: only 2 copies of 'Nedjma' left",
  "request_id": "req-abc123xyz",
  "timestamp": "2024-12-09T10:30:00Z"
}
```

## Pagination

List endpoints accept `page` (default 1) and `per_page` (bounded by configuration).
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "catalog", description = "Books, authors, tags and book packs"),
        (name = "orders", description = "Checkout, tracking and order administration"),
        (name = "shipping", description = "Carrier webhooks"),
        (name = "dashboard", description = "Back-office aggregates"),
        (name = "auth", description = "Registration and tokens"),
        (name = "account", description = "The caller's own account"),
        (name = "users", description = "User administration")
    ),
    paths(
        // Catalog
        crate::handlers::authors::list_authors,
        crate::handlers::authors::get_author,
        crate::handlers::authors::create_author,
        crate::handlers::authors::update_author,
        crate::handlers::authors::delete_author,
        crate::handlers::tags::list_tags,
        crate::handlers::tags::get_tag,
        crate::handlers::tags::create_tag,
        crate::handlers::tags::update_tag,
        crate::handlers::tags::delete_tag,
        crate::handlers::books::list_books,
        crate::handlers::books::get_book,
        crate::handlers::books::create_book,
        crate::handlers::books::update_book,
        crate::handlers::books::delete_book,
        crate::handlers::books::adjust_stock,
        crate::handlers::book_packs::list_packs,
        crate::handlers::book_packs::get_pack,
        crate::handlers::book_packs::create_pack,
        crate::handlers::book_packs::update_pack,
        crate::handlers::book_packs::delete_pack,

        // Orders
        crate::handlers::orders::place_order,
        crate::handlers::orders::track_order,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::create_shipment,
        crate::handlers::orders::delete_order,

        // Shipping
        crate::handlers::shipping_webhooks::webhook_handshake,
        crate::handlers::shipping_webhooks::receive_webhook,

        // Dashboard
        crate::handlers::dashboard::summary,
        crate::handlers::dashboard::sales_over_time,
        crate::handlers::dashboard::top_books,
        crate::handlers::dashboard::low_stock,

        // Accounts
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::refresh,
        crate::handlers::users::get_account,
        crate::handlers::users::update_account,
        crate::handlers::users::change_password,
        crate::handlers::users::list_users,
        crate::handlers::users::get_user,
        crate::handlers::users::set_activated,
        crate::handlers::users::set_role,
    ),
    components(
        schemas(
            // Catalog
            crate::entities::author::Model,
            crate::entities::tag::Model,
            crate::entities::tag::TagType,
            crate::entities::book::Model,
            crate::entities::book::BookLanguage,
            crate::entities::book_pack::Model,
            crate::services::authors::CreateAuthorInput,
            crate::services::authors::UpdateAuthorInput,
            crate::services::tags::CreateTagInput,
            crate::services::tags::UpdateTagInput,
            crate::services::books::CreateBookInput,
            crate::services::books::UpdateBookInput,
            crate::services::books::BookDetail,
            crate::services::books::BookSort,
            crate::services::books::AdjustStockInput,
            crate::services::book_packs::CreateBookPackInput,
            crate::services::book_packs::UpdateBookPackInput,
            crate::services::book_packs::BookPackDetail,

            // Orders
            crate::entities::order::Model,
            crate::entities::order::OrderStatus,
            crate::entities::order::ShippingMethod,
            crate::entities::order::ShippingProviderKind,
            crate::entities::order_item::Model,
            crate::entities::order_item::OrderItemType,
            crate::services::orders::OrderLineInput,
            crate::services::orders::PlaceOrderInput,
            crate::services::orders::OrderDetail,
            crate::services::orders::UpdateOrderStatusInput,
            crate::services::orders::CreateShipmentInput,
            crate::services::orders::ShipmentDetail,

            // Shipping
            crate::services::shipping::Parcel,
            crate::services::shipping::WebhookSummary,

            // Dashboard
            crate::services::dashboard::DashboardSummary,
            crate::services::dashboard::DailySales,
            crate::services::dashboard::TopBook,

            // Accounts
            crate::entities::user::UserRole,
            crate::auth::TokenPair,
            crate::services::users::RegisterInput,
            crate::services::users::LoginInput,
            crate::services::users::RefreshInput,
            crate::services::users::UpdateAccountInput,
            crate::services::users::ChangePasswordInput,
            crate::services::users::SetActivatedInput,
            crate::services::users::SetRoleInput,
            crate::services::users::UserResponse,

            // Error types
            crate::errors::ErrorResponse,
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_bookstore_routes() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Esprit Livre API"));
        assert!(json.contains("/api/v1/orders"));
        assert!(json.contains("/api/v1/shipping/yalidine/webhook"));
        assert!(json.contains("PlaceOrderInput"));
    }
}
