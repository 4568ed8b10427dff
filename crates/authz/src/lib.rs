//! Identifies the borrower acting on a request.
//!
//! Session and login screens live outside this service; an upstream gateway
//! authenticates the user and forwards their id in [`BORROWER_HEADER`].

use axum::{extract::FromRequestParts, http::request::Parts};
use lending_http::AppError;
use uuid::Uuid;

pub const BORROWER_HEADER: &str = "x-borrower-id";

/// The borrower on whose behalf the request acts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentBorrower(pub Uuid);

impl CurrentBorrower {
    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl<S> FromRequestParts<S> for CurrentBorrower
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts.headers.get(BORROWER_HEADER).ok_or_else(|| {
            AppError::unauthorized(format!("missing {} header", BORROWER_HEADER))
                .with_code("missing_borrower")
        })?;

        let id = value
            .to_str()
            .ok()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .ok_or_else(|| {
                tracing::debug!(target: "lending-authz", "rejected malformed borrower header");
                AppError::bad_request(format!("{} must be a UUID", BORROWER_HEADER))
                    .with_code("invalid_borrower")
            })?;

        Ok(CurrentBorrower(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<CurrentBorrower, AppError> {
        let mut builder = Request::get("/");
        if let Some(value) = header {
            builder = builder.header(BORROWER_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        CurrentBorrower::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn extracts_uuid_header() {
        let id = Uuid::now_v7();
        let borrower = extract(Some(&id.to_string())).await.unwrap();
        assert_eq!(borrower.id(), id);
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let err = extract(None).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized { .. }));
        assert_eq!(err.code(), "missing_borrower");
    }

    #[tokio::test]
    async fn malformed_header_is_bad_request() {
        let err = extract(Some("borrower-1")).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest { .. }));
    }
}
