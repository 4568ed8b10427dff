use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::LedgerError;
use crate::ids::{BorrowerId, ItemId, LoanId};

/// An item lent to a borrower.
///
/// A loan is created open and closed exactly once; `created_at` never
/// changes and `closed_at` is set together with `closed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Loan {
    pub id: LoanId,
    pub item_id: ItemId,
    pub borrower_id: BorrowerId,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed: bool,
}

impl Loan {
    pub fn open(item_id: ItemId, borrower_id: BorrowerId, at: DateTime<Utc>) -> Self {
        Self {
            id: LoanId::new(),
            item_id,
            borrower_id,
            created_at: at,
            closed_at: None,
            closed: false,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// Close the loan on behalf of `borrower_id`.
    pub fn close(&mut self, borrower_id: BorrowerId, at: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.borrower_id != borrower_id {
            return Err(LedgerError::NotOwner(self.id));
        }
        if self.closed {
            return Err(LedgerError::AlreadyReturned(self.id));
        }
        self.closed = true;
        self.closed_at = Some(at);
        Ok(())
    }
}

/// Counter row of an item as seen by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemStock {
    pub quantity: i32,
    pub listed: bool,
}

impl ItemStock {
    pub fn can_lend(&self) -> bool {
        self.listed && self.quantity > 0
    }
}

/// Selection for loan listings. Results are newest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoanFilter {
    pub borrower: Option<BorrowerId>,
    pub item: Option<ItemId>,
    /// `Some(true)` keeps open loans, `Some(false)` returned ones.
    pub open: Option<bool>,
}

impl LoanFilter {
    pub fn matches(&self, loan: &Loan) -> bool {
        self.borrower.map_or(true, |b| loan.borrower_id == b)
            && self.item.map_or(true, |i| loan.item_id == i)
            && self.open.map_or(true, |open| loan.is_open() == open)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorrowRequest {
    pub item_id: ItemId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_is_one_way() {
        let borrower = BorrowerId::new();
        let mut loan = Loan::open(ItemId::new(), borrower, Utc::now());
        assert!(loan.is_open());

        let at = Utc::now();
        loan.close(borrower, at).unwrap();
        assert!(loan.closed);
        assert_eq!(loan.closed_at, Some(at));

        let err = loan.close(borrower, Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyReturned(id) if id == loan.id));
        assert_eq!(loan.closed_at, Some(at));
    }

    #[test]
    fn only_the_borrower_may_close() {
        let mut loan = Loan::open(ItemId::new(), BorrowerId::new(), Utc::now());
        let err = loan.close(BorrowerId::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::NotOwner(_)));
        assert!(loan.is_open());
    }

    #[test]
    fn ownership_is_checked_before_state() {
        let owner = BorrowerId::new();
        let mut loan = Loan::open(ItemId::new(), owner, Utc::now());
        loan.close(owner, Utc::now()).unwrap();
        let err = loan.close(BorrowerId::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::NotOwner(_)));
    }

    #[test]
    fn filter_matches_open_loans_of_borrower() {
        let borrower = BorrowerId::new();
        let mut loan = Loan::open(ItemId::new(), borrower, Utc::now());
        let filter = LoanFilter {
            borrower: Some(borrower),
            open: Some(true),
            ..LoanFilter::default()
        };
        assert!(filter.matches(&loan));
        loan.close(borrower, Utc::now()).unwrap();
        assert!(!filter.matches(&loan));
        assert!(LoanFilter {
            open: Some(false),
            ..filter
        }
        .matches(&loan));
        assert!(LoanFilter::default().matches(&loan));
    }
}
