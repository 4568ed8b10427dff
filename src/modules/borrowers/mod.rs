//! Borrowers: the people loans are recorded against.

pub mod models;
pub mod repository;
pub mod routes;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use lending_kernel::{InitCtx, Migration, Module};
use serde_json::json;

use repository::BorrowerRepository;

pub struct BorrowersModule {
    repo: Arc<dyn BorrowerRepository>,
}

impl BorrowersModule {
    pub fn new(repo: Arc<dyn BorrowerRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl Module for BorrowersModule {
    fn name(&self) -> &'static str {
        "borrowers"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            "borrowers module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(self.repo.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List borrowers by name",
                        "tags": ["Borrowers"],
                        "responses": {
                            "200": {
                                "description": "Borrowers",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "array",
                                            "items": { "$ref": "#/components/schemas/Borrower" }
                                        }
                                    }
                                }
                            }
                        }
                    },
                    "post": {
                        "summary": "Register a borrower",
                        "tags": ["Borrowers"],
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/CreateBorrower" }
                                }
                            }
                        },
                        "responses": {
                            "201": {
                                "description": "Borrower created",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/Borrower" }
                                    }
                                }
                            },
                            "409": {
                                "description": "Email already registered",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                                    }
                                }
                            },
                            "422": {
                                "description": "Validation error",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                                    }
                                }
                            }
                        }
                    }
                },
                "/{id}": {
                    "get": {
                        "summary": "Get a borrower",
                        "tags": ["Borrowers"],
                        "parameters": [{
                            "name": "id", "in": "path", "required": true,
                            "schema": { "type": "string", "format": "uuid" }
                        }],
                        "responses": {
                            "200": {
                                "description": "Borrower",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/Borrower" }
                                    }
                                }
                            },
                            "404": {
                                "description": "Borrower not found",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                                    }
                                }
                            }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Borrower": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string", "format": "uuid" },
                            "name": { "type": "string" },
                            "email": { "type": "string", "format": "email" },
                            "created_at": { "type": "string", "format": "date-time" }
                        },
                        "required": ["id", "name", "email", "created_at"]
                    },
                    "CreateBorrower": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string", "maxLength": 150 },
                            "email": { "type": "string", "format": "email" }
                        },
                        "required": ["name", "email"]
                    }
                }
            }
        }))
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration {
            id: "001_init",
            up: r#"
                CREATE TABLE borrowers (
                    id         UUID         PRIMARY KEY,
                    name       VARCHAR(150) NOT NULL,
                    email      VARCHAR(254) NOT NULL,
                    created_at TIMESTAMPTZ  NOT NULL
                );
                CREATE UNIQUE INDEX borrowers_email_key ON borrowers (lower(email));
            "#,
        }]
    }
}

pub fn create_module(repo: Arc<dyn BorrowerRepository>) -> Arc<dyn Module> {
    Arc::new(BorrowersModule::new(repo))
}
