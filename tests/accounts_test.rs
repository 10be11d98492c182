//! Registration, sign-in and account administration.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp, ADMIN_EMAIL, CUSTOMER_PASSWORD};
use serde_json::{json, Value};

async fn register(app: &TestApp, login: &str, email: &str) -> axum::response::Response {
    app.request(
        Method::POST,
        "/api/v1/auth/register",
        Some(json!({
            "login": login,
            "email": email,
            "password": CUSTOMER_PASSWORD,
            "first_name": "Lina"
        })),
        None,
    )
    .await
}

async fn login(app: &TestApp, login: &str, password: &str) -> axum::response::Response {
    app.request(
        Method::POST,
        "/api/v1/auth/login",
        Some(json!({ "login": login, "password": password })),
        None,
    )
    .await
}

async fn tokens(app: &TestApp, who: &str) -> Value {
    let response = login(app, who, CUSTOMER_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    response_json(response).await["data"].clone()
}

#[tokio::test]
async fn registered_customers_sign_in_by_login_or_email() {
    let app = TestApp::new().await;

    let response = register(&app, "Lina.K", "Lina@Example.dz").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["data"]["login"], "lina.k");
    assert_eq!(body["data"]["email"], "lina@example.dz");
    assert_eq!(body["data"]["role"], "user");
    assert!(body["data"].get("password_hash").is_none());

    let by_login = tokens(&app, "lina.k").await;
    assert_eq!(by_login["token_type"], "Bearer");
    let by_email = tokens(&app, "LINA@example.dz").await;
    assert!(by_email["access_token"].as_str().is_some());

    let wrong = login(&app, "lina.k", "not-the-password").await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_login_or_email_conflicts() {
    let app = TestApp::new().await;
    assert_eq!(
        register(&app, "omar", "omar@example.dz").await.status(),
        StatusCode::CREATED
    );

    let same_login = register(&app, "OMAR", "other@example.dz").await;
    assert_eq!(same_login.status(), StatusCode::CONFLICT);

    let same_email = register(&app, "omar2", "Omar@Example.dz").await;
    assert_eq!(same_email.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn weak_registrations_are_rejected() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/register",
            Some(json!({ "login": "ab", "email": "not-an-email", "password": "short" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn refresh_issues_a_new_access_token() {
    let app = TestApp::new().await;
    app.customer_token("meriem").await;
    let pair = tokens(&app, "meriem").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/refresh",
            Some(json!({ "refresh_token": pair["refresh_token"] })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let refreshed = response_json(response).await;
    let access = refreshed["data"]["access_token"].as_str().unwrap().to_string();

    let account = app
        .request(Method::GET, "/api/v1/account", None, Some(&access))
        .await;
    assert_eq!(account.status(), StatusCode::OK);

    // An access token is not a refresh token
    let misuse = app
        .request(
            Method::POST,
            "/api/v1/auth/refresh",
            Some(json!({ "refresh_token": pair["access_token"] })),
            None,
        )
        .await;
    assert_eq!(misuse.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn customers_manage_their_own_profile_and_password() {
    let app = TestApp::new().await;
    let token = app.customer_token("sofiane").await;

    let response = app
        .request(
            Method::PUT,
            "/api/v1/account",
            Some(json!({ "first_name": "Sofiane", "phone": "0661 00 11 22" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["first_name"], "Sofiane");
    assert_eq!(body["data"]["login"], "sofiane");

    let wrong_current = app
        .request(
            Method::POST,
            "/api/v1/account/password",
            Some(json!({ "current_password": "guess-guess", "new_password": "brand-new-pass-2" })),
            Some(&token),
        )
        .await;
    assert_eq!(wrong_current.status(), StatusCode::UNAUTHORIZED);

    let changed = app
        .request(
            Method::POST,
            "/api/v1/account/password",
            Some(json!({
                "current_password": CUSTOMER_PASSWORD,
                "new_password": "brand-new-pass-2"
            })),
            Some(&token),
        )
        .await;
    assert_eq!(changed.status(), StatusCode::NO_CONTENT);

    assert_eq!(
        login(&app, "sofiane", CUSTOMER_PASSWORD).await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        login(&app, "sofiane", "brand-new-pass-2").await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn account_requires_a_token() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/api/v1/account", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn deactivated_users_cannot_sign_in() {
    let app = TestApp::new().await;
    let response = register(&app, "hakim", "hakim@example.dz").await;
    let user_id = response_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    let pair = tokens(&app, "hakim").await;

    let response = app
        .request_admin(
            Method::PUT,
            &format!("/api/v1/users/{}/activation", user_id),
            Some(json!({ "activated": false })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"]["activated"], false);

    assert_eq!(
        login(&app, "hakim", CUSTOMER_PASSWORD).await.status(),
        StatusCode::UNAUTHORIZED
    );
    let refresh = app
        .request(
            Method::POST,
            "/api/v1/auth/refresh",
            Some(json!({ "refresh_token": pair["refresh_token"] })),
            None,
        )
        .await;
    assert_eq!(refresh.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn promoted_users_gain_staff_access() {
    let app = TestApp::new().await;
    let response = register(&app, "ines", "ines@example.dz").await;
    let user_id = response_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let before = tokens(&app, "ines").await;
    let denied = app
        .request(
            Method::GET,
            "/api/v1/dashboard/summary",
            None,
            before["access_token"].as_str(),
        )
        .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let response = app
        .request_admin(
            Method::PUT,
            &format!("/api/v1/users/{}/role", user_id),
            Some(json!({ "role": "admin" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Roles are baked into tokens, so a fresh sign-in picks up the promotion
    let after = tokens(&app, "ines").await;
    let allowed = app
        .request(
            Method::GET,
            "/api/v1/dashboard/summary",
            None,
            after["access_token"].as_str(),
        )
        .await;
    assert_eq!(allowed.status(), StatusCode::OK);
}

#[tokio::test]
async fn administrators_cannot_lock_themselves_out() {
    let app = TestApp::new().await;
    let account = app.request_admin(Method::GET, "/api/v1/account", None).await;
    let body = response_json(account).await;
    assert_eq!(body["data"]["email"], ADMIN_EMAIL);
    let admin_id = body["data"]["id"].as_str().unwrap().to_string();

    let deactivate = app
        .request_admin(
            Method::PUT,
            &format!("/api/v1/users/{}/activation", admin_id),
            Some(json!({ "activated": false })),
        )
        .await;
    assert_eq!(deactivate.status(), StatusCode::BAD_REQUEST);

    let demote = app
        .request_admin(
            Method::PUT,
            &format!("/api/v1/users/{}/role", admin_id),
            Some(json!({ "role": "user" })),
        )
        .await;
    assert_eq!(demote.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn user_listing_is_admin_only_and_searchable() {
    let app = TestApp::new().await;
    let customer = app.customer_token("walid").await;
    app.customer_token("zineb").await;

    let forbidden = app
        .request(Method::GET, "/api/v1/users", None, Some(&customer))
        .await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let response = app
        .request_admin(Method::GET, "/api/v1/users?search=zin", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["login"], "zineb");
}
