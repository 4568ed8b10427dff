//! The loan ledger: borrowing takes a copy off the shelf, returning puts it
//! back. Both run as one storage transaction so the counter and the loan rows
//! never disagree.

use std::sync::Arc;

use super::error::LedgerError;
use super::models::{Loan, LoanFilter};
use super::repository::{LedgerRepository, LedgerResult};
use crate::ids::{BorrowerId, ItemId, LoanId};

#[derive(Clone)]
pub struct LoanLedger {
    repo: Arc<dyn LedgerRepository>,
}

impl LoanLedger {
    pub fn new(repo: Arc<dyn LedgerRepository>) -> Self {
        Self { repo }
    }

    /// Lend one copy of `item_id` to `borrower_id`.
    ///
    /// Rejections come in a fixed order: missing item, missing borrower, no
    /// copy available, open loan already held.
    pub async fn borrow_item(
        &self,
        item_id: ItemId,
        borrower_id: BorrowerId,
    ) -> LedgerResult<Loan> {
        let result = self.try_borrow(item_id, borrower_id).await;
        match &result {
            Ok(loan) => tracing::info!(
                loan_id = %loan.id,
                item_id = %item_id,
                borrower_id = %borrower_id,
                "item borrowed"
            ),
            Err(err) => tracing::debug!(
                item_id = %item_id,
                borrower_id = %borrower_id,
                code = err.code(),
                "borrow rejected"
            ),
        }
        result
    }

    async fn try_borrow(&self, item_id: ItemId, borrower_id: BorrowerId) -> LedgerResult<Loan> {
        let mut tx = self.repo.begin().await?;

        let stock = tx
            .item_stock(item_id)
            .await?
            .ok_or(LedgerError::ItemNotFound(item_id))?;
        if !tx.borrower_exists(borrower_id).await? {
            return Err(LedgerError::BorrowerNotFound(borrower_id));
        }
        if !stock.can_lend() {
            return Err(LedgerError::ItemUnavailable(item_id));
        }
        if tx.has_open_loan(item_id, borrower_id).await? {
            return Err(LedgerError::DuplicateActiveLoan {
                item_id,
                borrower_id,
            });
        }
        if !tx.take_one(item_id).await? {
            return Err(LedgerError::ItemUnavailable(item_id));
        }

        let loan = Loan::open(item_id, borrower_id, crate::now());
        tx.insert_loan(&loan).await?;
        tx.commit().await?;
        Ok(loan)
    }

    /// Close `loan_id` on behalf of `borrower_id` and put the copy back.
    pub async fn return_item(
        &self,
        loan_id: LoanId,
        borrower_id: BorrowerId,
    ) -> LedgerResult<Loan> {
        let result = self.try_return(loan_id, borrower_id).await;
        match &result {
            Ok(loan) => tracing::info!(
                loan_id = %loan_id,
                item_id = %loan.item_id,
                borrower_id = %borrower_id,
                "item returned"
            ),
            Err(err) => tracing::debug!(
                loan_id = %loan_id,
                borrower_id = %borrower_id,
                code = err.code(),
                "return rejected"
            ),
        }
        result
    }

    async fn try_return(&self, loan_id: LoanId, borrower_id: BorrowerId) -> LedgerResult<Loan> {
        let mut tx = self.repo.begin().await?;

        let mut loan = tx
            .loan_for_update(loan_id)
            .await?
            .ok_or(LedgerError::LoanNotFound(loan_id))?;
        let closed_at = crate::now();
        loan.close(borrower_id, closed_at)?;

        tx.close_loan(loan_id, closed_at).await?;
        tx.put_back(loan.item_id).await?;
        tx.commit().await?;
        Ok(loan)
    }

    pub async fn loan(&self, loan_id: LoanId) -> LedgerResult<Loan> {
        self.repo
            .find_loan(loan_id)
            .await?
            .ok_or(LedgerError::LoanNotFound(loan_id))
    }

    pub async fn loans(&self, filter: LoanFilter) -> LedgerResult<Vec<Loan>> {
        self.repo.list_loans(filter).await
    }
}
