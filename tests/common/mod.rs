#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use lending_app::{modules, Stores};
use lending_authz::BORROWER_HEADER;
use lending_kernel::{settings::Settings, ModuleRegistry};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

/// A router over a fresh in-memory store.
pub struct TestApp {
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let settings = Settings::default();
        let stores = Stores::in_memory();
        let mut registry = ModuleRegistry::new();
        modules::register_all(&mut registry, &stores, &settings).unwrap();
        Self {
            router: lending_http::build_router(&registry, &settings),
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        borrower: Option<Uuid>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(id) = borrower {
            request = request.header(BORROWER_HEADER, id.to_string());
        }
        let request = match body {
            Some(json) => request
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, None, Some(body)).await
    }

    pub async fn create_borrower(&self, name: &str) -> Uuid {
        let (status, body) = self
            .post(
                "/api/borrowers",
                serde_json::json!({
                    "name": name,
                    "email": format!("{}@example.com", name.to_lowercase()),
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        id_of(&body)
    }

    pub async fn create_item(&self, code: &str, quantity: i32) -> Uuid {
        let (status, body) = self
            .post(
                "/api/catalog/items",
                serde_json::json!({
                    "title": format!("Item {code}"),
                    "code": code,
                    "quantity": quantity,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        id_of(&body)
    }
}

pub fn id_of(body: &Value) -> Uuid {
    Uuid::parse_str(body["id"].as_str().unwrap()).unwrap()
}

pub fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap()
}
