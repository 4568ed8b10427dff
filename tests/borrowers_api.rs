mod common;

use axum::http::StatusCode;
use common::{error_code, id_of, TestApp};
use serde_json::json;

#[tokio::test]
async fn register_and_fetch_borrower() {
    let app = TestApp::new();
    let (status, created) = app
        .post(
            "/api/borrowers",
            json!({ "name": "Ada Lovelace", "email": "Ada@Example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["email"], "ada@example.com");

    let (status, fetched) = app
        .get(&format!("/api/borrowers/{}", id_of(&created)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (_, all) = app.get("/api/borrowers").await;
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn emails_are_unique() {
    let app = TestApp::new();
    app.create_borrower("Ada").await;
    let (status, body) = app
        .post("/api/borrowers", json!({ "name": "Other", "email": "ADA@example.com" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "duplicate_email");
}

#[tokio::test]
async fn malformed_path_id_is_not_found() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/borrowers/not-a-uuid").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "invalid_path");
}

#[tokio::test]
async fn health_check_is_up() {
    let app = TestApp::new();
    let (status, _) = app.send(axum::http::Method::GET, "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
}
