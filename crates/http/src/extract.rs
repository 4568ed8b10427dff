//! Extractors whose rejections render as [`AppError`] envelopes instead of
//! axum's plain-text bodies.

use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::{request::Parts, StatusCode},
    Json,
};
use serde::de::DeserializeOwned;

use crate::AppError;

fn rejected(status: StatusCode, message: String, code: &str) -> AppError {
    if status == StatusCode::UNPROCESSABLE_ENTITY {
        AppError::validation(vec![], message).with_code(code)
    } else {
        AppError::bad_request(message).with_code(code)
    }
}

/// JSON request body.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(rejected(rejection.status(), rejection.body_text(), "invalid_body")),
        }
    }
}

/// Query string parameters.
pub struct QueryParams<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::bad_request(rejection.body_text()).with_code("invalid_query")),
        }
    }
}

/// Path parameters; a malformed id reads as a missing resource.
pub struct PathParam<T>(pub T);

impl<S, T> FromRequestParts<S> for PathParam<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::not_found(rejection.body_text()).with_code("invalid_path")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, response::IntoResponse, routing::post, Router};
    use serde::Deserialize;
    use tower::ServiceExt;

    #[derive(Deserialize)]
    struct Shelf {
        label: String,
    }

    fn app() -> Router {
        Router::new().route(
            "/shelves",
            post(|JsonBody(shelf): JsonBody<Shelf>| async move { shelf.label.into_response() }),
        )
    }

    async fn post_body(body: &'static str) -> StatusCode {
        app()
            .oneshot(
                Request::post("/shelves")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn json_body_accepts_valid_payload() {
        assert_eq!(post_body(r#"{"label":"A"}"#).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn syntax_errors_are_bad_requests() {
        assert_eq!(post_body("{").await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_fields_are_unprocessable() {
        assert_eq!(post_body("{}").await, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
