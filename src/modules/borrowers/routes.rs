use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use garde::Validate;
use lending_http::{AppError, AppResult, JsonBody, PathParam};

use super::models::{Borrower, BorrowerInput};
use super::repository::{BorrowerError, BorrowerRepository};
use crate::ids::BorrowerId;

type Repo = Arc<dyn BorrowerRepository>;

impl From<BorrowerError> for AppError {
    fn from(err: BorrowerError) -> Self {
        match err {
            BorrowerError::Storage(source) => AppError::Internal(source),
            other => other.kind().respond(other.code(), other.to_string()),
        }
    }
}

pub fn router(repo: Repo) -> Router {
    Router::new()
        .route("/", get(list_borrowers).post(create_borrower))
        .route("/{id}", get(get_borrower))
        .with_state(repo)
}

async fn list_borrowers(State(repo): State<Repo>) -> AppResult<Json<Vec<Borrower>>> {
    Ok(Json(repo.list_borrowers().await?))
}

async fn create_borrower(
    State(repo): State<Repo>,
    JsonBody(input): JsonBody<BorrowerInput>,
) -> AppResult<(StatusCode, Json<Borrower>)> {
    let input = input.normalized();
    input.validate()?;
    let borrower = repo.create_borrower(input).await?;
    tracing::info!(borrower_id = %borrower.id, "borrower registered");
    Ok((StatusCode::CREATED, Json(borrower)))
}

async fn get_borrower(
    State(repo): State<Repo>,
    PathParam(id): PathParam<BorrowerId>,
) -> AppResult<Json<Borrower>> {
    repo.find_borrower(id)
        .await?
        .map(Json)
        .ok_or_else(|| BorrowerError::NotFound(id).into())
}
