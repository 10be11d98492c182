//! Catalog endpoints: public reads, staff-only writes and soft deletes.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn guests_browse_books_with_author_and_effective_price() {
    let app = TestApp::new().await;
    let author = app.seed_author("Kateb Yacine").await;

    let response = app
        .request_admin(
            Method::POST,
            "/api/v1/books",
            Some(json!({
                "title": "Nedjma",
                "author_id": author,
                "price": "1500",
                "on_sale_price": "1200",
                "stock_quantity": 7,
                "language": "FR"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .request(Method::GET, "/api/v1/books?title=nedj", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    let book = &body["data"]["items"][0];
    assert_eq!(book["title"], "Nedjma");
    assert_eq!(book["author"]["name"], "Kateb Yacine");
    assert_eq!(book["effective_price"], "1200");
}

#[tokio::test]
async fn catalog_writes_require_staff() {
    let app = TestApp::new().await;
    let payload = json!({ "name": "Assia Djebar" });

    let anonymous = app
        .request(Method::POST, "/api/v1/authors", Some(payload.clone()), None)
        .await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let customer = app.customer_token("lecteur").await;
    let forbidden = app
        .request(Method::POST, "/api/v1/authors", Some(payload.clone()), Some(&customer))
        .await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let created = app
        .request_admin(Method::POST, "/api/v1/authors", Some(payload))
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn deleted_books_are_hidden_from_guests_but_not_from_staff() {
    let app = TestApp::new().await;
    let book = app.seed_book("L'Étranger", dec!(900), 3).await;
    let uri = format!("/api/v1/books/{}", book.book.id);

    let deleted = app.request_admin(Method::DELETE, &uri, None).await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let guest = app.request(Method::GET, &uri, None, None).await;
    assert_eq!(guest.status(), StatusCode::NOT_FOUND);

    // Guests cannot opt in to inactive records
    let guest_opt_in = app
        .request(Method::GET, &format!("{}?include_inactive=true", uri), None, None)
        .await;
    assert_eq!(guest_opt_in.status(), StatusCode::NOT_FOUND);

    let staff = app
        .request_admin(Method::GET, &format!("{}?include_inactive=true", uri), None)
        .await;
    assert_eq!(staff.status(), StatusCode::OK);
    let body = response_json(staff).await;
    assert_eq!(body["data"]["active"], false);
}

#[tokio::test]
async fn invalid_sale_price_is_rejected() {
    let app = TestApp::new().await;
    let response = app
        .request_admin(
            Method::POST,
            "/api/v1/books",
            Some(json!({
                "title": "Le Fils du pauvre",
                "price": "800",
                "on_sale_price": "900",
                "stock_quantity": 1,
                "language": "FR"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn pack_availability_follows_scarcest_book() {
    let app = TestApp::new().await;
    let first = app.seed_book("La Grande Maison", dec!(1000), 4).await;
    let second = app.seed_book("L'Incendie", dec!(1000), 2).await;
    let pack = app
        .seed_pack(
            "Trilogie Algérie",
            dec!(2500),
            vec![first.book.id, second.book.id],
        )
        .await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/book-packs/{}", pack.pack.id),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["available_quantity"], 2);
    assert_eq!(body["data"]["available"], true);
    assert_eq!(body["data"]["books"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn stock_adjustment_cannot_go_negative() {
    let app = TestApp::new().await;
    let book = app.seed_book("Le Quai aux fleurs", dec!(700), 2).await;
    let uri = format!("/api/v1/books/{}/stock", book.book.id);

    let response = app
        .request_admin(Method::POST, &uri, Some(json!({ "delta": -3 })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.book_stock(book.book.id).await, 2);

    let response = app
        .request_admin(Method::POST, &uri, Some(json!({ "delta": 5, "reason": "restock" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.book_stock(book.book.id).await, 7);
}

#[tokio::test]
async fn tags_filter_by_type() {
    let app = TestApp::new().await;
    for (name, kind) in [("Roman", "CATEGORY"), ("Nouveautés", "MAIN_DISPLAY")] {
        let response = app
            .request_admin(
                Method::POST,
                "/api/v1/tags",
                Some(json!({ "name_en": name, "name_fr": name, "tag_type": kind })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .request(Method::GET, "/api/v1/tags?tag_type=CATEGORY", None, None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["name_fr"], "Roman");
}

async fn create_book(app: &TestApp, body: serde_json::Value) -> String {
    let response = app.request_admin(Method::POST, "/api/v1/books", Some(body)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    response_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string()
}

async fn listed_titles(app: &TestApp, query: &str) -> Vec<String> {
    let response = app
        .request(Method::GET, &format!("/api/v1/books?{}", query), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    response_json(response).await["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["title"].as_str().unwrap().to_string())
        .collect()
}

/// Three books: a discounted French one, an Arabic one out of stock, an English one
async fn seed_shelf(app: &TestApp) -> String {
    let response = app
        .request_admin(
            Method::POST,
            "/api/v1/tags",
            Some(json!({ "name_en": "Novel", "name_fr": "Roman", "tag_type": "CATEGORY" })),
        )
        .await;
    let tag_id = response_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    create_book(
        app,
        json!({
            "title": "Nedjma",
            "price": "2500",
            "on_sale_price": "900",
            "stock_quantity": 4,
            "language": "FR",
            "tag_ids": [tag_id]
        }),
    )
    .await;
    create_book(
        app,
        json!({
            "title": "Ammarat Yacoubian",
            "price": "1800",
            "stock_quantity": 0,
            "language": "AR",
            "tag_ids": [tag_id]
        }),
    )
    .await;
    create_book(
        app,
        json!({
            "title": "Beloved",
            "price": "1200",
            "stock_quantity": 9,
            "language": "EN"
        }),
    )
    .await;
    tag_id
}

#[tokio::test]
async fn price_filters_use_the_sale_price_when_present() {
    let app = TestApp::new().await;
    seed_shelf(&app).await;

    // Nedjma lists at 2500 but sells at 900
    assert_eq!(listed_titles(&app, "max_price=1000").await, vec!["Nedjma"]);
    assert_eq!(
        listed_titles(&app, "min_price=1000&sort=price_asc").await,
        vec!["Beloved", "Ammarat Yacoubian"]
    );
    assert_eq!(
        listed_titles(&app, "min_price=1000&max_price=1500").await,
        vec!["Beloved"]
    );
}

#[tokio::test]
async fn inverted_price_bounds_are_rejected() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::GET,
            "/api/v1/books?min_price=2000&max_price=1000",
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn books_filter_by_tag_language_and_stock() {
    let app = TestApp::new().await;
    let tag_id = seed_shelf(&app).await;

    assert_eq!(
        listed_titles(&app, &format!("tag_id={}&sort=title", tag_id)).await,
        vec!["Ammarat Yacoubian", "Nedjma"]
    );
    assert_eq!(listed_titles(&app, "language=AR").await, vec!["Ammarat Yacoubian"]);
    assert_eq!(
        listed_titles(&app, "in_stock=true&sort=title").await,
        vec!["Beloved", "Nedjma"]
    );
    assert_eq!(
        listed_titles(&app, &format!("tag_id={}&in_stock=true", tag_id)).await,
        vec!["Nedjma"]
    );
}

#[tokio::test]
async fn books_sort_by_price_and_title() {
    let app = TestApp::new().await;
    seed_shelf(&app).await;

    assert_eq!(
        listed_titles(&app, "sort=price_asc").await,
        vec!["Nedjma", "Beloved", "Ammarat Yacoubian"]
    );
    assert_eq!(
        listed_titles(&app, "sort=price_desc").await,
        vec!["Ammarat Yacoubian", "Beloved", "Nedjma"]
    );
    assert_eq!(
        listed_titles(&app, "sort=title").await,
        vec!["Ammarat Yacoubian", "Beloved", "Nedjma"]
    );
}

#[tokio::test]
async fn author_names_are_unique_ignoring_case() {
    let app = TestApp::new().await;
    app.seed_author("Assia Djebar").await;

    let response = app
        .request_admin(
            Method::POST,
            "/api/v1/authors",
            Some(json!({ "name": "ASSIA DJEBAR" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn a_deleted_author_frees_the_name() {
    let app = TestApp::new().await;
    let author = app.seed_author("Malek Haddad").await;

    let response = app
        .request_admin(Method::DELETE, &format!("/api/v1/authors/{}", author), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .request_admin(
            Method::POST,
            "/api/v1/authors",
            Some(json!({ "name": "malek haddad" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn title_search_treats_wildcards_literally() {
    let app = TestApp::new().await;
    app.seed_book("Nedjma", dec!(1000), 1).await;
    app.seed_book("100% Alger", dec!(1000), 1).await;
    app.seed_book("mot_de_passe", dec!(1000), 1).await;

    assert_eq!(listed_titles(&app, "title=%25").await, vec!["100% Alger"]);
    assert_eq!(listed_titles(&app, "title=_").await, vec!["mot_de_passe"]);
}
