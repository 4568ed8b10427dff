use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lending_authz::CurrentBorrower;
use lending_http::{AppError, AppResult, JsonBody, PathParam, QueryParams};
use serde::Deserialize;

use super::error::LedgerError;
use super::ledger::LoanLedger;
use super::models::{BorrowRequest, Loan, LoanFilter};
use crate::ids::{BorrowerId, ItemId, LoanId};

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Storage(source) => AppError::Internal(source),
            other => other.kind().respond(other.code(), other.to_string()),
        }
    }
}

pub fn router(ledger: LoanLedger) -> Router {
    Router::new()
        .route("/", post(borrow_item))
        .route("/mine", get(my_loans))
        .route("/items/{item_id}", get(item_history))
        .route("/{loan_id}", get(get_loan))
        .route("/{loan_id}/return", post(return_item))
        .with_state(ledger)
}

fn acting(borrower: CurrentBorrower) -> BorrowerId {
    BorrowerId::from(borrower.id())
}

async fn borrow_item(
    State(ledger): State<LoanLedger>,
    borrower: CurrentBorrower,
    JsonBody(request): JsonBody<BorrowRequest>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    let loan = ledger.borrow_item(request.item_id, acting(borrower)).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

async fn return_item(
    State(ledger): State<LoanLedger>,
    borrower: CurrentBorrower,
    PathParam(loan_id): PathParam<LoanId>,
) -> AppResult<Json<Loan>> {
    Ok(Json(ledger.return_item(loan_id, acting(borrower)).await?))
}

#[derive(Debug, Default, Deserialize)]
struct MineParams {
    open: Option<bool>,
}

async fn my_loans(
    State(ledger): State<LoanLedger>,
    borrower: CurrentBorrower,
    QueryParams(params): QueryParams<MineParams>,
) -> AppResult<Json<Vec<Loan>>> {
    let filter = LoanFilter {
        borrower: Some(acting(borrower)),
        open: params.open,
        ..LoanFilter::default()
    };
    Ok(Json(ledger.loans(filter).await?))
}

async fn item_history(
    State(ledger): State<LoanLedger>,
    PathParam(item_id): PathParam<ItemId>,
) -> AppResult<Json<Vec<Loan>>> {
    let filter = LoanFilter {
        item: Some(item_id),
        ..LoanFilter::default()
    };
    Ok(Json(ledger.loans(filter).await?))
}

async fn get_loan(
    State(ledger): State<LoanLedger>,
    PathParam(loan_id): PathParam<LoanId>,
) -> AppResult<Json<Loan>> {
    Ok(Json(ledger.loan(loan_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;
    use rstest::rstest;

    #[rstest]
    #[case(LedgerError::ItemUnavailable(ItemId::new()), StatusCode::CONFLICT, "item_unavailable")]
    #[case(
        LedgerError::DuplicateActiveLoan { item_id: ItemId::new(), borrower_id: BorrowerId::new() },
        StatusCode::CONFLICT,
        "duplicate_active_loan"
    )]
    #[case(LedgerError::AlreadyReturned(LoanId::new()), StatusCode::CONFLICT, "already_returned")]
    #[case(LedgerError::NotOwner(LoanId::new()), StatusCode::FORBIDDEN, "not_owner")]
    #[case(LedgerError::LoanNotFound(LoanId::new()), StatusCode::NOT_FOUND, "loan_not_found")]
    #[case(LedgerError::StockOverflow(ItemId::new()), StatusCode::CONFLICT, "stock_overflow")]
    #[case(LedgerError::Conflict, StatusCode::CONFLICT, "conflict")]
    fn ledger_errors_map_to_http(
        #[case] err: LedgerError,
        #[case] status: StatusCode,
        #[case] code: &str,
    ) {
        let err = AppError::from(err);
        assert_eq!(err.code(), code);
        assert_eq!(err.into_response().status(), status);
    }

    #[test]
    fn storage_failures_are_internal() {
        let err = AppError::from(LedgerError::Storage(anyhow::anyhow!("disk on fire")));
        assert!(matches!(err, AppError::Internal(_)));
    }
}
