//! Yalidine client against a mocked carrier API.

mod common;

use axum::http::{Method as HttpMethod, StatusCode};
use common::{book_line, order_input, response_json, TestApp};
use esprit_livre_api::{
    entities::order::{OrderStatus, ShippingMethod, ShippingProviderKind},
    errors::ServiceError,
    services::shipping::{ShippingProvider, YalidineProvider},
};
use rust_decimal_macros::dec;
use serde_json::json;
use std::time::Duration;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

const API_ID: &str = "yal-api-id";
const API_TOKEN: &str = "yal-api-token";

fn provider(server: &MockServer) -> YalidineProvider {
    YalidineProvider::new(&server.uri(), API_ID, API_TOKEN, "Alger").unwrap()
}

async fn mount_fees(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/deliveryfees/"))
        .and(header("X-API-ID", API_ID))
        .and(header("X-API-TOKEN", API_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "has_more": false,
            "total_data": 2,
            "data": [
                { "wilaya_id": 16, "wilaya_name": "Alger", "home_fee": 500, "desk_fee": 350 },
                { "wilaya_id": 31, "wilaya_name": "Oran", "home_fee": 750, "desk_fee": 450 }
            ]
        })))
        .mount(server)
        .await;
}

async fn app_against(server: &MockServer) -> TestApp {
    let base_url = server.uri();
    TestApp::with_config(move |cfg| {
        cfg.yalidine_api_id = Some(API_ID.to_string());
        cfg.yalidine_api_token = Some(API_TOKEN.to_string());
        cfg.yalidine_base_url = base_url;
    })
    .await
}

#[tokio::test]
async fn quote_picks_the_fee_for_the_method() {
    let server = MockServer::start().await;
    mount_fees(&server).await;
    let provider = provider(&server);

    let home = provider.quote("oran", ShippingMethod::HomeDelivery).await.unwrap();
    let desk = provider.quote("Oran", ShippingMethod::Stopdesk).await.unwrap();

    assert_eq!(home, dec!(750));
    assert_eq!(desk, dec!(450));
}

#[tokio::test]
async fn quote_for_an_unknown_wilaya_is_a_validation_error() {
    let server = MockServer::start().await;
    mount_fees(&server).await;

    let result = provider(&server)
        .quote("Atlantide", ShippingMethod::HomeDelivery)
        .await;

    assert!(matches!(result, Err(ServiceError::ValidationError(_))));
}

#[tokio::test]
async fn carrier_outage_surfaces_as_external_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/deliveryfees/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let result = provider(&server)
        .quote("Alger", ShippingMethod::HomeDelivery)
        .await;

    assert!(matches!(result, Err(ServiceError::ExternalServiceError(_))));
}

#[tokio::test]
async fn deleting_a_missing_parcel_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/parcels/yal-404"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    provider(&server).cancel_parcel("yal-404").await.unwrap();
}

#[tokio::test]
async fn checkout_quotes_and_shipment_registers_a_parcel() {
    let server = MockServer::start().await;
    mount_fees(&server).await;
    let app = app_against(&server).await;
    let book = app.seed_book("Meursault, contre-enquête", dec!(1400), 3).await;

    let mut input = order_input(vec![book_line(book.book.id, 1)]);
    input.wilaya = "Oran".to_string();
    let order = app
        .state
        .services
        .orders
        .place_order(input, None)
        .await
        .unwrap();
    assert_eq!(order.order.delivery_fee, dec!(750));
    assert_eq!(order.order.shipping_provider, ShippingProviderKind::Yalidine);

    let unique_id = order.order.unique_id.clone();
    let key = unique_id.clone();
    Mock::given(method("POST"))
        .and(path("/parcels/"))
        .and(body_partial_json(json!([{
            "order_id": unique_id,
            "firstname": "Amina",
            "familyname": "Bensalem",
            "to_wilaya_name": "Oran",
            "is_stopdesk": false
        }])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            key: {
                "success": true,
                "order_id": unique_id,
                "tracking": "yal-7TQ2KF",
                "import_id": 42,
                "label": "https://yalidine.app/app/bordereau.php?tracking=yal-7TQ2KF",
                "message": ""
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = app.set_status(order.order.id, OrderStatus::Confirmed).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .request_admin(
            HttpMethod::POST,
            &format!("/api/v1/orders/{}/shipment", order.order.id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["data"]["tracking_number"], "yal-7TQ2KF");
    assert_eq!(
        body["data"]["label_url"],
        "https://yalidine.app/app/bordereau.php?tracking=yal-7TQ2KF"
    );

    // The parcel mock expects exactly one call
    let again = app
        .request_admin(
            HttpMethod::POST,
            &format!("/api/v1/orders/{}/shipment", order.order.id),
            None,
        )
        .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn rejected_parcel_leaves_the_order_unshipped() {
    let server = MockServer::start().await;
    mount_fees(&server).await;
    let app = app_against(&server).await;
    let book = app.seed_book("Le Vieil Homme et la mer", dec!(900), 2).await;
    let order = app.place_order(vec![book_line(book.book.id, 1)]).await;
    let unique_id = order.order.unique_id.clone();
    let key = unique_id.clone();

    Mock::given(method("POST"))
        .and(path("/parcels/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            key: {
                "success": false,
                "order_id": unique_id,
                "tracking": null,
                "label": null,
                "message": "commune introuvable"
            }
        })))
        .mount(&server)
        .await;

    app.set_status(order.order.id, OrderStatus::Confirmed).await;
    let response = app
        .request_admin(
            HttpMethod::POST,
            &format!("/api/v1/orders/{}/shipment", order.order.id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let detail = app
        .request_admin(
            HttpMethod::GET,
            &format!("/api/v1/orders/{}", order.order.id),
            None,
        )
        .await;
    let body = response_json(detail).await;
    assert_eq!(body["data"]["tracking_number"], serde_json::Value::Null);
    assert_eq!(body["data"]["status"], "CONFIRMED");
}

#[tokio::test]
async fn cancelling_a_confirmed_order_withdraws_its_parcel() {
    let server = MockServer::start().await;
    mount_fees(&server).await;
    let app = app_against(&server).await;
    let book = app.seed_book("Les Chercheurs d'os", dec!(1000), 2).await;
    let order = app.place_order(vec![book_line(book.book.id, 1)]).await;

    Mock::given(method("DELETE"))
        .and(path("/parcels/yal-MANUAL1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "tracking": "yal-MANUAL1", "deleted": 1 }])))
        .expect(1)
        .mount(&server)
        .await;

    app.set_status(order.order.id, OrderStatus::Confirmed).await;
    let response = app
        .request_admin(
            HttpMethod::POST,
            &format!("/api/v1/orders/{}/shipment", order.order.id),
            Some(json!({ "tracking_number": "yal-MANUAL1" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .request_admin(
            HttpMethod::POST,
            &format!("/api/v1/orders/{}/cancel", order.order.id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.book_stock(book.book.id).await, 2);
}

#[tokio::test]
async fn cancel_during_parcel_registration_withdraws_the_parcel() {
    let server = MockServer::start().await;
    mount_fees(&server).await;
    let app = app_against(&server).await;
    let book = app.seed_book("L'Honneur de la tribu", dec!(1100), 2).await;
    let order = app.place_order(vec![book_line(book.book.id, 1)]).await;
    let unique_id = order.order.unique_id.clone();
    let key = unique_id.clone();

    Mock::given(method("POST"))
        .and(path("/parcels/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    key: {
                        "success": true,
                        "order_id": unique_id,
                        "tracking": "yal-RACE",
                        "label": null,
                        "message": ""
                    }
                }))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/parcels/yal-RACE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "tracking": "yal-RACE", "deleted": 1 }])))
        .expect(1)
        .mount(&server)
        .await;

    app.set_status(order.order.id, OrderStatus::Confirmed).await;
    let shipment_uri = format!("/api/v1/orders/{}/shipment", order.order.id);
    let cancel_uri = format!("/api/v1/orders/{}/cancel", order.order.id);
    let (shipment, cancel) = tokio::join!(
        app.request_admin(HttpMethod::POST, &shipment_uri, None),
        async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            app.request_admin(HttpMethod::POST, &cancel_uri, None).await
        }
    );
    assert_eq!(cancel.status(), StatusCode::OK);
    assert_eq!(shipment.status(), StatusCode::BAD_REQUEST);

    let detail = app
        .request_admin(
            HttpMethod::GET,
            &format!("/api/v1/orders/{}", order.order.id),
            None,
        )
        .await;
    let body = response_json(detail).await;
    assert_eq!(body["data"]["status"], "CANCELLED");
    assert_eq!(body["data"]["tracking_number"], serde_json::Value::Null);
    assert_eq!(app.book_stock(book.book.id).await, 2);
}
