//! Error taxonomy shared by the domain modules.

use lending_http::AppError;

/// Broad class of a domain failure, independent of the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced entity does not exist.
    NotFound,
    /// The request is well formed but the entity's state forbids it.
    InvalidState,
    /// The caller acts on something that is not theirs.
    PermissionDenied,
    /// A uniqueness rule or a concurrent writer got in the way.
    Conflict,
    /// Field-level rule violated.
    Invalid,
    /// Storage failure; never the caller's fault.
    Internal,
}

impl ErrorKind {
    /// HTTP rendering of a non-storage domain error.
    pub(crate) fn respond(self, code: &str, message: String) -> AppError {
        match self {
            ErrorKind::NotFound => AppError::not_found(message).with_code(code),
            ErrorKind::InvalidState | ErrorKind::Conflict => {
                AppError::conflict(vec![], message).with_code(code)
            }
            ErrorKind::PermissionDenied => AppError::forbidden(message).with_code(code),
            ErrorKind::Invalid => AppError::validation(vec![], message).with_code(code),
            ErrorKind::Internal => AppError::Internal(anyhow::anyhow!(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, response::IntoResponse};
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::NotFound, StatusCode::NOT_FOUND)]
    #[case(ErrorKind::InvalidState, StatusCode::CONFLICT)]
    #[case(ErrorKind::PermissionDenied, StatusCode::FORBIDDEN)]
    #[case(ErrorKind::Conflict, StatusCode::CONFLICT)]
    #[case(ErrorKind::Invalid, StatusCode::UNPROCESSABLE_ENTITY)]
    #[case(ErrorKind::Internal, StatusCode::INTERNAL_SERVER_ERROR)]
    fn kinds_map_to_statuses(#[case] kind: ErrorKind, #[case] status: StatusCode) {
        let response = kind.respond("some_code", "message".to_string()).into_response();
        assert_eq!(response.status(), status);
    }

    #[test]
    fn specific_code_survives() {
        let err = ErrorKind::InvalidState.respond("item_unavailable", "no copies".to_string());
        assert_eq!(err.code(), "item_unavailable");
    }
}
