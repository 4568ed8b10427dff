//! Loan ledger: lending items to borrowers and taking them back.

pub mod error;
pub mod ledger;
pub mod models;
pub mod repository;
pub mod routes;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use lending_kernel::{InitCtx, Migration, Module};

use ledger::LoanLedger;
use repository::LedgerRepository;

pub struct LoansModule {
    ledger: LoanLedger,
}

impl LoansModule {
    pub fn new(repo: Arc<dyn LedgerRepository>) -> Self {
        Self {
            ledger: LoanLedger::new(repo),
        }
    }
}

#[async_trait]
impl Module for LoansModule {
    fn name(&self) -> &'static str {
        "loans"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            backend = ?ctx.settings.database.backend,
            "loans module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(self.ledger.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let error = |description: &str| {
            serde_json::json!({
                "description": description,
                "content": { "application/json": { "schema": { "$ref": "#/components/schemas/ErrorResponse" } } }
            })
        };
        let loan = serde_json::json!({ "application/json": { "schema": { "$ref": "#/components/schemas/Loan" } } });
        let loans = serde_json::json!({
            "application/json": { "schema": { "type": "array", "items": { "$ref": "#/components/schemas/Loan" } } }
        });
        let borrower_header = serde_json::json!({
            "name": "x-borrower-id", "in": "header", "required": true,
            "schema": { "type": "string", "format": "uuid" }
        });
        let loan_id = serde_json::json!({
            "name": "loan_id", "in": "path", "required": true,
            "schema": { "type": "string", "format": "uuid" }
        });

        Some(serde_json::json!({
            "paths": {
                "/": {
                    "post": {
                        "summary": "Borrow an item",
                        "tags": ["Loans"],
                        "parameters": [borrower_header],
                        "requestBody": {
                            "required": true,
                            "content": { "application/json": { "schema": { "$ref": "#/components/schemas/BorrowRequest" } } }
                        },
                        "responses": {
                            "201": { "description": "Loan opened", "content": loan },
                            "404": error("Item or borrower not found"),
                            "409": error("No copy available, or the borrower already holds the item")
                        }
                    }
                },
                "/{loan_id}/return": {
                    "post": {
                        "summary": "Return a borrowed item",
                        "tags": ["Loans"],
                        "parameters": [borrower_header, loan_id],
                        "responses": {
                            "200": { "description": "Loan closed", "content": loan },
                            "403": error("Loan belongs to another borrower"),
                            "404": error("Loan not found"),
                            "409": error("Loan already returned")
                        }
                    }
                },
                "/mine": {
                    "get": {
                        "summary": "Loans of the acting borrower, newest first",
                        "tags": ["Loans"],
                        "parameters": [
                            borrower_header,
                            { "name": "open", "in": "query", "schema": { "type": "boolean" } }
                        ],
                        "responses": { "200": { "description": "Loans", "content": loans } }
                    }
                },
                "/items/{item_id}": {
                    "get": {
                        "summary": "Loan history of an item",
                        "tags": ["Loans"],
                        "parameters": [{
                            "name": "item_id", "in": "path", "required": true,
                            "schema": { "type": "string", "format": "uuid" }
                        }],
                        "responses": { "200": { "description": "Loans", "content": loans } }
                    }
                },
                "/{loan_id}": {
                    "get": {
                        "summary": "Get a loan",
                        "tags": ["Loans"],
                        "parameters": [loan_id],
                        "responses": {
                            "200": { "description": "Loan", "content": loan },
                            "404": error("Loan not found")
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "BorrowRequest": {
                        "type": "object",
                        "properties": { "item_id": { "type": "string", "format": "uuid" } },
                        "required": ["item_id"]
                    },
                    "Loan": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string", "format": "uuid" },
                            "item_id": { "type": "string", "format": "uuid" },
                            "borrower_id": { "type": "string", "format": "uuid" },
                            "created_at": { "type": "string", "format": "date-time" },
                            "closed_at": { "type": ["string", "null"], "format": "date-time" },
                            "closed": { "type": "boolean" }
                        },
                        "required": ["id", "item_id", "borrower_id", "created_at", "closed"]
                    }
                }
            }
        }))
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration {
            id: "001_init",
            up: r#"
                CREATE TABLE loans (
                    id          UUID        PRIMARY KEY,
                    item_id     UUID        NOT NULL REFERENCES items (id) ON DELETE RESTRICT,
                    borrower_id UUID        NOT NULL REFERENCES borrowers (id) ON DELETE RESTRICT,
                    created_at  TIMESTAMPTZ NOT NULL,
                    closed_at   TIMESTAMPTZ,
                    closed      BOOLEAN     NOT NULL DEFAULT FALSE,
                    CONSTRAINT loans_closed_at_set CHECK (closed = (closed_at IS NOT NULL))
                );
                CREATE UNIQUE INDEX loans_one_open_per_borrower
                    ON loans (item_id, borrower_id) WHERE NOT closed;
                CREATE INDEX loans_borrower_idx ON loans (borrower_id, created_at DESC);
                CREATE INDEX loans_item_idx ON loans (item_id, created_at DESC);
            "#,
        }]
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "loans module stopped");
        Ok(())
    }
}

pub fn create_module(repo: Arc<dyn LedgerRepository>) -> Arc<dyn Module> {
    Arc::new(LoansModule::new(repo))
}
