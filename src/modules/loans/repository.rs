use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::LedgerError;
use super::models::{ItemStock, Loan, LoanFilter};
use crate::ids::{BorrowerId, ItemId, LoanId};

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Storage behind the loan ledger.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Open a unit of work. Rows read through it stay locked until it is
    /// committed or dropped; dropping without commit discards every change.
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTransaction>>;

    async fn find_loan(&self, id: LoanId) -> LedgerResult<Option<Loan>>;

    async fn list_loans(&self, filter: LoanFilter) -> LedgerResult<Vec<Loan>>;
}

/// One serializable ledger operation.
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Read and lock the counter of an item.
    async fn item_stock(&mut self, item_id: ItemId) -> LedgerResult<Option<ItemStock>>;

    async fn borrower_exists(&mut self, borrower_id: BorrowerId) -> LedgerResult<bool>;

    async fn has_open_loan(&mut self, item_id: ItemId, borrower_id: BorrowerId)
        -> LedgerResult<bool>;

    /// Decrement the counter only if it is above zero. Returns whether a copy
    /// was taken.
    async fn take_one(&mut self, item_id: ItemId) -> LedgerResult<bool>;

    /// Increment the counter.
    async fn put_back(&mut self, item_id: ItemId) -> LedgerResult<()>;

    async fn insert_loan(&mut self, loan: &Loan) -> LedgerResult<()>;

    /// Read and lock a loan.
    async fn loan_for_update(&mut self, loan_id: LoanId) -> LedgerResult<Option<Loan>>;

    async fn close_loan(&mut self, loan_id: LoanId, closed_at: DateTime<Utc>) -> LedgerResult<()>;

    async fn commit(self: Box<Self>) -> LedgerResult<()>;
}
