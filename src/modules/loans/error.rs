use thiserror::Error;

use crate::error::ErrorKind;
use crate::ids::{BorrowerId, ItemId, LoanId};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    #[error("borrower {0} not found")]
    BorrowerNotFound(BorrowerId),

    #[error("item {0} has no copies available")]
    ItemUnavailable(ItemId),

    #[error("borrower {borrower_id} already holds item {item_id}")]
    DuplicateActiveLoan {
        item_id: ItemId,
        borrower_id: BorrowerId,
    },

    #[error("loan {0} not found")]
    LoanNotFound(LoanId),

    #[error("loan {0} belongs to another borrower")]
    NotOwner(LoanId),

    #[error("loan {0} has already been returned")]
    AlreadyReturned(LoanId),

    #[error("item {0} cannot hold another copy")]
    StockOverflow(ItemId),

    #[error("concurrent modification, the operation was rolled back")]
    Conflict,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::ItemNotFound(_)
            | LedgerError::BorrowerNotFound(_)
            | LedgerError::LoanNotFound(_) => ErrorKind::NotFound,
            LedgerError::ItemUnavailable(_)
            | LedgerError::DuplicateActiveLoan { .. }
            | LedgerError::AlreadyReturned(_)
            | LedgerError::StockOverflow(_) => ErrorKind::InvalidState,
            LedgerError::NotOwner(_) => ErrorKind::PermissionDenied,
            LedgerError::Conflict => ErrorKind::Conflict,
            LedgerError::Storage(_) => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::ItemNotFound(_) => "item_not_found",
            LedgerError::BorrowerNotFound(_) => "borrower_not_found",
            LedgerError::ItemUnavailable(_) => "item_unavailable",
            LedgerError::DuplicateActiveLoan { .. } => "duplicate_active_loan",
            LedgerError::LoanNotFound(_) => "loan_not_found",
            LedgerError::NotOwner(_) => "not_owner",
            LedgerError::AlreadyReturned(_) => "already_returned",
            LedgerError::StockOverflow(_) => "stock_overflow",
            LedgerError::Conflict => "conflict",
            LedgerError::Storage(_) => "internal_error",
        }
    }
}
