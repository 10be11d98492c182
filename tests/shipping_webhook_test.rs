//! Carrier status webhooks driving orders forward.

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use common::{book_line, response_json, TestApp};
use esprit_livre_api::{
    entities::{order::OrderStatus, shipping_event},
    services::shipping::webhook::{sign_payload, SIGNATURE_HEADER},
};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::{json, Value};
use uuid::Uuid;

const SECRET: &str = "yalidine-webhook-secret";

async fn signed_app() -> TestApp {
    TestApp::with_config(|cfg| cfg.yalidine_webhook_secret = Some(SECRET.to_string())).await
}

/// Confirmed order with a hand-entered tracking number
async fn shipped_order(app: &TestApp, tracking: &str) -> Uuid {
    let book = app.seed_book("Le Village de l'Allemand", dec!(1300), 4).await;
    let order = app.place_order(vec![book_line(book.book.id, 1)]).await;
    let id = order.order.id;

    let response = app.set_status(id, OrderStatus::Confirmed).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .request_admin(
            Method::POST,
            &format!("/api/v1/orders/{}/shipment", id),
            Some(json!({ "tracking_number": tracking })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    id
}

fn status_event(event_id: &str, tracking: &str, status: &str) -> Value {
    json!({
        "type": "parcel_status_updated",
        "events": [{
            "event_id": event_id,
            "occurred_at": "2024-05-02 08:15:00",
            "data": { "tracking": tracking, "status": status }
        }]
    })
}

async fn deliver(app: &TestApp, payload: &Value, signature: Option<String>) -> axum::response::Response {
    let body = serde_json::to_vec(payload).unwrap();
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/shipping/yalidine/webhook")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    app.send(builder.body(Body::from(body)).unwrap()).await
}

async fn deliver_signed(app: &TestApp, payload: &Value) -> Value {
    let body = serde_json::to_vec(payload).unwrap();
    let signature = sign_payload(SECRET, &body).unwrap();
    let response = deliver(app, payload, Some(signature)).await;
    assert_eq!(response.status(), StatusCode::OK);
    response_json(response).await["data"].clone()
}

async fn order_status(app: &TestApp, id: Uuid) -> Value {
    let response = app
        .request_admin(Method::GET, &format!("/api/v1/orders/{}", id), None)
        .await;
    response_json(response).await["data"]["status"].clone()
}

#[tokio::test]
async fn delivered_label_completes_the_order() {
    let app = signed_app().await;
    let id = shipped_order(&app, "yal-100001").await;

    let summary = deliver_signed(&app, &status_event("evt-1", "yal-100001", "Livré")).await;

    assert_eq!(summary["applied"], 1);
    assert_eq!(order_status(&app, id).await, "DELIVERED");
}

#[tokio::test]
async fn unsigned_or_forged_deliveries_are_refused() {
    let app = signed_app().await;
    let id = shipped_order(&app, "yal-100002").await;
    let payload = status_event("evt-2", "yal-100002", "Livré");

    let missing = deliver(&app, &payload, None).await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let forged = sign_payload("not-the-secret", &serde_json::to_vec(&payload).unwrap()).unwrap();
    let forged = deliver(&app, &payload, Some(forged)).await;
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(order_status(&app, id).await, "CONFIRMED");
}

#[tokio::test]
async fn repeated_event_ids_are_processed_once() {
    let app = signed_app().await;
    shipped_order(&app, "yal-100003").await;
    let payload = status_event("evt-3", "yal-100003", "Expédié");

    let first = deliver_signed(&app, &payload).await;
    assert_eq!(first["applied"], 1);

    let second = deliver_signed(&app, &payload).await;
    assert_eq!(second["applied"], 0);
    assert_eq!(second["duplicates"], 1);
}

#[tokio::test]
async fn simultaneous_redeliveries_apply_once() {
    let app = signed_app().await;
    let id = shipped_order(&app, "yal-100009").await;
    let payload = status_event("evt-9", "yal-100009", "Expédié");

    let (a, b) = tokio::join!(deliver_signed(&app, &payload), deliver_signed(&app, &payload));

    let applied = a["applied"].as_u64().unwrap() + b["applied"].as_u64().unwrap();
    let duplicates = a["duplicates"].as_u64().unwrap() + b["duplicates"].as_u64().unwrap();
    assert_eq!((applied, duplicates), (1, 1));
    assert_eq!(order_status(&app, id).await, "SHIPPED");

    let stored = shipping_event::Entity::find()
        .filter(shipping_event::Column::EventId.eq("evt-9"))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].outcome, "applied");
    assert_eq!(stored[0].order_id, Some(id));
}

#[tokio::test]
async fn backward_labels_never_regress_an_order() {
    let app = signed_app().await;
    let id = shipped_order(&app, "yal-100004").await;

    deliver_signed(&app, &status_event("evt-4a", "yal-100004", "Sorti en livraison")).await;
    assert_eq!(order_status(&app, id).await, "SHIPPED");

    let late = deliver_signed(&app, &status_event("evt-4b", "yal-100004", "En préparation")).await;
    assert_eq!(late["stale"], 1);
    assert_eq!(order_status(&app, id).await, "SHIPPED");
}

#[tokio::test]
async fn returned_parcels_restock_their_books() {
    let app = signed_app().await;
    let book = app.seed_book("Le Serment des barbares", dec!(1100), 3).await;
    let order = app.place_order(vec![book_line(book.book.id, 2)]).await;
    let id = order.order.id;
    app.set_status(id, OrderStatus::Confirmed).await;
    let shipment = app
        .request_admin(
            Method::POST,
            &format!("/api/v1/orders/{}/shipment", id),
            Some(json!({ "tracking_number": "yal-100005" })),
        )
        .await;
    assert_eq!(shipment.status(), StatusCode::CREATED);
    assert_eq!(app.book_stock(book.book.id).await, 1);

    let summary = deliver_signed(&app, &status_event("evt-5", "yal-100005", "Retourné au vendeur")).await;

    assert_eq!(summary["applied"], 1);
    assert_eq!(order_status(&app, id).await, "RETURNED");
    assert_eq!(app.book_stock(book.book.id).await, 3);
}

#[tokio::test]
async fn unknown_tracking_and_labels_are_acknowledged() {
    let app = signed_app().await;
    let payload = json!({
        "type": "parcel_status_updated",
        "events": [
            { "event_id": "evt-6a", "data": { "tracking": "yal-999999", "status": "Livré" } },
            { "event_id": "evt-6b", "data": { "tracking": "yal-999999", "status": "Colis perdu dans la nature" } }
        ]
    });

    let summary = deliver_signed(&app, &payload).await;

    assert_eq!(summary["received"], 2);
    assert_eq!(summary["unknown_tracking"], 1);
    assert_eq!(summary["unknown_status"], 1);
}

#[tokio::test]
async fn other_event_types_are_ignored() {
    let app = TestApp::new().await;
    let payload = json!({
        "type": "parcel_payment_updated",
        "events": [{ "event_id": "evt-7", "data": { "tracking": "yal-1", "status": "Livré" } }]
    });

    // No secret configured, so no signature required
    let response = deliver(&app, &payload, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"]["ignored"], 1);
}

#[tokio::test]
async fn malformed_payloads_are_bad_requests() {
    let app = TestApp::new().await;
    let response = app
        .send(
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/shipping/yalidine/webhook")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn subscription_handshake_echoes_the_token() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::GET,
            "/api/v1/shipping/yalidine/webhook?subscribe=parcel_status_updated&crc_token=abc123",
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"abc123");

    let missing = app
        .request(Method::GET, "/api/v1/shipping/yalidine/webhook", None, None)
        .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
}
