use async_trait::async_trait;
use thiserror::Error;

use super::models::{Borrower, BorrowerInput};
use crate::error::ErrorKind;
use crate::ids::BorrowerId;

#[derive(Debug, Error)]
pub enum BorrowerError {
    #[error("borrower {0} not found")]
    NotFound(BorrowerId),

    #[error("a borrower with email '{0}' already exists")]
    DuplicateEmail(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl BorrowerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BorrowerError::NotFound(_) => ErrorKind::NotFound,
            BorrowerError::DuplicateEmail(_) => ErrorKind::Conflict,
            BorrowerError::Storage(_) => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            BorrowerError::NotFound(_) => "borrower_not_found",
            BorrowerError::DuplicateEmail(_) => "duplicate_email",
            BorrowerError::Storage(_) => "internal_error",
        }
    }
}

#[async_trait]
pub trait BorrowerRepository: Send + Sync {
    /// Emails are unique, compared case-insensitively.
    async fn create_borrower(&self, input: BorrowerInput) -> Result<Borrower, BorrowerError>;
    async fn find_borrower(&self, id: BorrowerId) -> Result<Option<Borrower>, BorrowerError>;
    /// All borrowers ordered by name.
    async fn list_borrowers(&self) -> Result<Vec<Borrower>, BorrowerError>;
}
