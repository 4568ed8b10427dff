mod common;

use axum::http::{Method, StatusCode};
use common::{error_code, id_of, TestApp};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn borrow_and_return_moves_the_copy() {
    let app = TestApp::new();
    let ada = app.create_borrower("Ada").await;
    let item = app.create_item("BK-1", 1).await;

    let (status, loan) = app
        .send(Method::POST, "/api/loans", Some(ada), Some(json!({ "item_id": item })))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{loan}");
    assert_eq!(loan["closed"], false);
    assert!(loan["closed_at"].is_null());
    let loan_id = id_of(&loan);

    let (_, shelf) = app.get(&format!("/api/catalog/items/{item}")).await;
    assert_eq!(shelf["quantity"], 0);

    let (status, returned) = app
        .send(Method::POST, &format!("/api/loans/{loan_id}/return"), Some(ada), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{returned}");
    assert_eq!(returned["closed"], true);
    assert!(returned["closed_at"].is_string());
    assert_eq!(returned["created_at"], loan["created_at"]);

    let (_, shelf) = app.get(&format!("/api/catalog/items/{item}")).await;
    assert_eq!(shelf["quantity"], 1);
}

#[tokio::test]
async fn last_copy_passes_between_borrowers() {
    let app = TestApp::new();
    let ada = app.create_borrower("Ada").await;
    let grace = app.create_borrower("Grace").await;
    let item = app.create_item("BK-1", 1).await;

    let (status, loan) = app
        .send(Method::POST, "/api/loans", Some(ada), Some(json!({ "item_id": item })))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send(Method::POST, "/api/loans", Some(grace), Some(json!({ "item_id": item })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "item_unavailable");

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/loans/{}/return", id_of(&loan)),
            Some(ada),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, shelf) = app.get(&format!("/api/catalog/items/{item}")).await;
    assert_eq!(shelf["quantity"], 1);

    let (status, second) = app
        .send(Method::POST, "/api/loans", Some(grace), Some(json!({ "item_id": item })))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{second}");
    assert_eq!(second["borrower_id"], grace.to_string());
    let (_, shelf) = app.get(&format!("/api/catalog/items/{item}")).await;
    assert_eq!(shelf["quantity"], 0);
}

#[tokio::test]
async fn second_open_loan_of_same_item_is_refused() {
    let app = TestApp::new();
    let ada = app.create_borrower("Ada").await;
    let item = app.create_item("BK-1", 3).await;

    let (status, _) = app
        .send(Method::POST, "/api/loans", Some(ada), Some(json!({ "item_id": item })))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send(Method::POST, "/api/loans", Some(ada), Some(json!({ "item_id": item })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "duplicate_active_loan");

    let (_, shelf) = app.get(&format!("/api/catalog/items/{item}")).await;
    assert_eq!(shelf["quantity"], 2);
}

#[tokio::test]
async fn only_the_borrower_may_return() {
    let app = TestApp::new();
    let ada = app.create_borrower("Ada").await;
    let grace = app.create_borrower("Grace").await;
    let item = app.create_item("BK-1", 1).await;

    let (_, loan) = app
        .send(Method::POST, "/api/loans", Some(ada), Some(json!({ "item_id": item })))
        .await;
    let return_uri = format!("/api/loans/{}/return", id_of(&loan));

    let (status, body) = app.send(Method::POST, &return_uri, Some(grace), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "not_owner");

    let (status, _) = app.send(Method::POST, &return_uri, Some(ada), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.send(Method::POST, &return_uri, Some(ada), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "already_returned");

    let (_, shelf) = app.get(&format!("/api/catalog/items/{item}")).await;
    assert_eq!(shelf["quantity"], 1);
}

#[tokio::test]
async fn unknown_references_are_not_found() {
    let app = TestApp::new();
    let ada = app.create_borrower("Ada").await;
    let item = app.create_item("BK-1", 1).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/loans",
            Some(ada),
            Some(json!({ "item_id": Uuid::now_v7() })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "item_not_found");

    let (status, body) = app
        .send(
            Method::POST,
            "/api/loans",
            Some(Uuid::now_v7()),
            Some(json!({ "item_id": item })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "borrower_not_found");

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/loans/{}/return", Uuid::now_v7()),
            Some(ada),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "loan_not_found");
}

#[tokio::test]
async fn borrowing_requires_a_borrower_header() {
    let app = TestApp::new();
    let item = app.create_item("BK-1", 1).await;

    let (status, body) = app.post("/api/loans", json!({ "item_id": item })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "missing_borrower");
}

#[tokio::test]
async fn unlisted_items_cannot_be_borrowed() {
    let app = TestApp::new();
    let ada = app.create_borrower("Ada").await;
    let (_, item) = app
        .post(
            "/api/catalog/items",
            json!({ "title": "Archive copy", "code": "AR-1", "quantity": 2, "listed": false }),
        )
        .await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/loans",
            Some(ada),
            Some(json!({ "item_id": id_of(&item) })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "item_unavailable");
}

#[tokio::test]
async fn my_loans_filters_by_state() {
    let app = TestApp::new();
    let ada = app.create_borrower("Ada").await;
    let grace = app.create_borrower("Grace").await;
    let first = app.create_item("BK-1", 1).await;
    let second = app.create_item("BK-2", 1).await;
    let third = app.create_item("BK-3", 1).await;

    let mut loans = Vec::new();
    for item in [first, second] {
        let (_, loan) = app
            .send(Method::POST, "/api/loans", Some(ada), Some(json!({ "item_id": item })))
            .await;
        loans.push(id_of(&loan));
    }
    app.send(Method::POST, "/api/loans", Some(grace), Some(json!({ "item_id": third })))
        .await;
    app.send(
        Method::POST,
        &format!("/api/loans/{}/return", loans[0]),
        Some(ada),
        None,
    )
    .await;

    let (status, all) = app.send(Method::GET, "/api/loans/mine", Some(ada), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (_, open) = app
        .send(Method::GET, "/api/loans/mine?open=true", Some(ada), None)
        .await;
    let open = open.as_array().unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0]["id"], loans[1].to_string());

    let (_, closed) = app
        .send(Method::GET, "/api/loans/mine?open=false", Some(ada), None)
        .await;
    let closed = closed.as_array().unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0]["id"], loans[0].to_string());
}

#[tokio::test]
async fn item_history_lists_every_loan() {
    let app = TestApp::new();
    let ada = app.create_borrower("Ada").await;
    let item = app.create_item("BK-1", 1).await;

    for _ in 0..2 {
        let (_, loan) = app
            .send(Method::POST, "/api/loans", Some(ada), Some(json!({ "item_id": item })))
            .await;
        app.send(
            Method::POST,
            &format!("/api/loans/{}/return", id_of(&loan)),
            Some(ada),
            None,
        )
        .await;
    }

    let (status, history) = app.get(&format!("/api/loans/items/{item}")).await;
    assert_eq!(status, StatusCode::OK);
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|loan| loan["closed"] == true));
}
