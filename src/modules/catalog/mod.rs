//! Catalog: items, categories and tags.

pub mod import;
pub mod models;
pub mod repository;
pub mod routes;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use lending_kernel::{settings::CatalogSettings, InitCtx, Migration, Module};
use serde_json::{json, Value};

use repository::CatalogRepository;
use routes::CatalogState;

pub struct CatalogModule {
    state: CatalogState,
}

impl CatalogModule {
    pub fn new(repo: Arc<dyn CatalogRepository>, paging: CatalogSettings) -> Self {
        Self {
            state: CatalogState { repo, paging },
        }
    }
}

fn json_body(schema: Value) -> Value {
    json!({ "application/json": { "schema": schema } })
}

fn schema_ref(name: &str) -> Value {
    json!({ "$ref": format!("#/components/schemas/{name}") })
}

fn error_response(description: &str) -> Value {
    json!({ "description": description, "content": json_body(schema_ref("ErrorResponse")) })
}

fn id_param() -> Value {
    json!({ "name": "id", "in": "path", "required": true, "schema": { "type": "string", "format": "uuid" } })
}

/// Create, read, update and delete operations for a label resource.
fn label_paths(tag: &str, schema: &str, summary_schema: &str) -> (Value, Value) {
    let collection = json!({
        "get": {
            "summary": format!("List {} with item counts", tag.to_lowercase()),
            "tags": [tag],
            "responses": {
                "200": {
                    "description": "Ordered by name",
                    "content": json_body(json!({ "type": "array", "items": schema_ref(summary_schema) }))
                }
            }
        },
        "post": {
            "summary": format!("Create one of the {}", tag.to_lowercase()),
            "tags": [tag],
            "requestBody": { "required": true, "content": json_body(schema_ref("LabelInput")) },
            "responses": {
                "201": { "description": "Created", "content": json_body(schema_ref(schema)) },
                "409": error_response("Name already taken"),
                "422": error_response("Validation error")
            }
        }
    });
    let member = json!({
        "parameters": [id_param()],
        "put": {
            "summary": "Rename or redescribe",
            "tags": [tag],
            "requestBody": { "required": true, "content": json_body(schema_ref("LabelInput")) },
            "responses": {
                "200": { "description": "Updated", "content": json_body(schema_ref(schema)) },
                "404": error_response("Not found"),
                "409": error_response("Name already taken")
            }
        },
        "delete": {
            "summary": "Delete and detach from items",
            "tags": [tag],
            "responses": {
                "204": { "description": "Deleted" },
                "404": error_response("Not found")
            }
        }
    });
    (collection, member)
}

#[async_trait]
impl Module for CatalogModule {
    fn name(&self) -> &'static str {
        "catalog"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            page_size = ctx.settings.catalog.page_size,
            max_page_size = ctx.settings.catalog.max_page_size,
            "catalog module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(self.state.clone())
    }

    fn openapi(&self) -> Option<Value> {
        let (categories, category) = label_paths("Categories", "Category", "CategorySummary");
        let (tags, tag) = label_paths("Tags", "Tag", "TagSummary");
        let mut category = category;
        category["get"] = json!({
            "summary": "Get a category",
            "tags": ["Categories"],
            "responses": {
                "200": { "description": "Category", "content": json_body(schema_ref("Category")) },
                "404": error_response("Not found")
            }
        });

        let query = |name: &str, schema: Value| json!({ "name": name, "in": "query", "schema": schema });
        let uuid = json!({ "type": "string", "format": "uuid" });
        let decimal = json!({ "type": "string", "pattern": "^\\d+(\\.\\d{1,2})?$" });
        let label = json!({
            "type": "object",
            "properties": {
                "id": uuid.clone(),
                "name": { "type": "string" },
                "description": { "type": ["string", "null"] },
                "created_at": { "type": "string", "format": "date-time" }
            },
            "required": ["id", "name", "created_at"]
        });
        let mut category_schema = label.clone();
        category_schema["properties"]["updated_at"] = json!({ "type": "string", "format": "date-time" });
        let counted = |base: &Value| {
            let mut counted = base.clone();
            counted["properties"]["item_count"] = json!({ "type": "integer" });
            counted
        };

        Some(json!({
            "paths": {
                "/items": {
                    "get": {
                        "summary": "Search, filter and page through items",
                        "tags": ["Items"],
                        "parameters": [
                            query("q", json!({ "type": "string" })),
                            query("category", uuid.clone()),
                            query("tag", uuid.clone()),
                            query("min_price", decimal.clone()),
                            query("max_price", decimal.clone()),
                            query("available", json!({ "type": "boolean" })),
                            query("order", json!({
                                "type": "string",
                                "enum": ["-created_at", "created_at", "title", "-title", "price", "-price"]
                            })),
                            query("page", json!({ "type": "integer", "minimum": 1 })),
                            query("page_size", json!({ "type": "integer", "minimum": 1 }))
                        ],
                        "responses": {
                            "200": { "description": "One page of items", "content": json_body(schema_ref("ItemPage")) },
                            "400": error_response("Malformed query string")
                        }
                    },
                    "post": {
                        "summary": "Create an item",
                        "tags": ["Items"],
                        "requestBody": { "required": true, "content": json_body(schema_ref("ItemInput")) },
                        "responses": {
                            "201": { "description": "Created", "content": json_body(schema_ref("Item")) },
                            "409": error_response("Code already in use"),
                            "422": error_response("Validation error or unknown category/tag")
                        }
                    }
                },
                "/items/{id}": {
                    "parameters": [id_param()],
                    "get": {
                        "summary": "Item with up to four related items",
                        "tags": ["Items"],
                        "responses": {
                            "200": { "description": "Item", "content": json_body(schema_ref("ItemDetail")) },
                            "404": error_response("Not found")
                        }
                    },
                    "put": {
                        "summary": "Replace an item",
                        "tags": ["Items"],
                        "requestBody": { "required": true, "content": json_body(schema_ref("ItemInput")) },
                        "responses": {
                            "200": { "description": "Updated", "content": json_body(schema_ref("Item")) },
                            "404": error_response("Not found"),
                            "409": error_response("Code already in use"),
                            "422": error_response("Validation error or unknown category/tag")
                        }
                    },
                    "delete": {
                        "summary": "Delete an item without loans",
                        "tags": ["Items"],
                        "responses": {
                            "204": { "description": "Deleted" },
                            "404": error_response("Not found"),
                            "409": error_response("Item has loans on record")
                        }
                    }
                },
                "/categories": categories,
                "/categories/{id}": category,
                "/tags": tags,
                "/tags/{id}": tag,
                "/summary": {
                    "get": {
                        "summary": "Catalog totals and the newest items",
                        "tags": ["Items"],
                        "responses": {
                            "200": { "description": "Summary", "content": json_body(schema_ref("CatalogStats")) }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "LabelInput": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string", "minLength": 1, "maxLength": 100 },
                            "description": { "type": ["string", "null"] }
                        },
                        "required": ["name"]
                    },
                    "Category": category_schema.clone(),
                    "CategorySummary": counted(&category_schema),
                    "Tag": label.clone(),
                    "TagSummary": counted(&label),
                    "ItemDetails": {
                        "type": "object",
                        "properties": {
                            "weight_kg": decimal.clone(),
                            "length_cm": decimal.clone(),
                            "width_cm": decimal.clone(),
                            "height_cm": decimal.clone(),
                            "material": { "type": "string" },
                            "color": { "type": "string" },
                            "manufacturer": { "type": "string" }
                        },
                        "required": ["weight_kg", "length_cm", "width_cm", "height_cm"]
                    },
                    "ItemInput": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string", "minLength": 1, "maxLength": 300 },
                            "author": { "type": ["string", "null"], "maxLength": 200 },
                            "description": { "type": "string" },
                            "code": { "type": "string", "minLength": 1, "maxLength": 50 },
                            "price": { "type": ["string", "null"] },
                            "quantity": { "type": "integer", "minimum": 0, "default": 1 },
                            "listed": { "type": "boolean", "default": true },
                            "category_id": { "type": ["string", "null"], "format": "uuid" },
                            "tag_ids": { "type": "array", "items": uuid.clone() },
                            "details": schema_ref("ItemDetails")
                        },
                        "required": ["title", "code"]
                    },
                    "Item": {
                        "type": "object",
                        "properties": {
                            "id": uuid.clone(),
                            "title": { "type": "string" },
                            "author": { "type": ["string", "null"] },
                            "description": { "type": "string" },
                            "code": { "type": "string" },
                            "price": { "type": ["string", "null"] },
                            "quantity": { "type": "integer", "description": "Copies on the shelf" },
                            "listed": { "type": "boolean" },
                            "category": {
                                "type": ["object", "null"],
                                "properties": { "id": uuid.clone(), "name": { "type": "string" } }
                            },
                            "tags": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": { "id": uuid.clone(), "name": { "type": "string" } }
                                }
                            },
                            "details": schema_ref("ItemDetails"),
                            "created_at": { "type": "string", "format": "date-time" },
                            "updated_at": { "type": "string", "format": "date-time" }
                        },
                        "required": ["id", "title", "code", "quantity", "listed", "tags", "created_at", "updated_at"]
                    },
                    "ItemDetail": {
                        "allOf": [
                            schema_ref("Item"),
                            {
                                "type": "object",
                                "properties": { "related": { "type": "array", "items": schema_ref("Item") } }
                            }
                        ]
                    },
                    "ItemPage": {
                        "type": "object",
                        "properties": {
                            "items": { "type": "array", "items": schema_ref("Item") },
                            "total": { "type": "integer" },
                            "page": { "type": "integer" },
                            "page_size": { "type": "integer" },
                            "pages": { "type": "integer" }
                        },
                        "required": ["items", "total", "page", "page_size", "pages"]
                    },
                    "CatalogStats": {
                        "type": "object",
                        "properties": {
                            "total_items": { "type": "integer" },
                            "total_categories": { "type": "integer" },
                            "total_tags": { "type": "integer" },
                            "available_items": { "type": "integer" },
                            "recent_items": { "type": "array", "items": schema_ref("Item") }
                        }
                    }
                }
            }
        }))
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![
            Migration {
                id: "001_labels",
                up: r#"
                    CREATE TABLE categories (
                        id          UUID         PRIMARY KEY,
                        name        VARCHAR(100) NOT NULL CONSTRAINT categories_name_key UNIQUE,
                        description TEXT,
                        created_at  TIMESTAMPTZ  NOT NULL,
                        updated_at  TIMESTAMPTZ  NOT NULL
                    );
                    CREATE TABLE tags (
                        id          UUID         PRIMARY KEY,
                        name        VARCHAR(100) NOT NULL CONSTRAINT tags_name_key UNIQUE,
                        description TEXT,
                        created_at  TIMESTAMPTZ  NOT NULL
                    );
                "#,
            },
            Migration {
                id: "002_items",
                up: r#"
                    CREATE TABLE items (
                        id          UUID          PRIMARY KEY,
                        title       VARCHAR(300)  NOT NULL,
                        author      VARCHAR(200),
                        description TEXT          NOT NULL DEFAULT '',
                        code        VARCHAR(50)   NOT NULL CONSTRAINT items_code_key UNIQUE,
                        price       NUMERIC(10,2) CHECK (price IS NULL OR price >= 0.01),
                        quantity    INTEGER       NOT NULL DEFAULT 1 CHECK (quantity >= 0),
                        listed      BOOLEAN       NOT NULL DEFAULT TRUE,
                        category_id UUID          REFERENCES categories (id) ON DELETE SET NULL,
                        created_at  TIMESTAMPTZ   NOT NULL,
                        updated_at  TIMESTAMPTZ   NOT NULL
                    );
                    CREATE INDEX items_category_idx ON items (category_id);
                    CREATE INDEX items_created_at_idx ON items (created_at DESC);
                    CREATE INDEX items_title_idx ON items (title);

                    CREATE TABLE item_tags (
                        item_id UUID NOT NULL REFERENCES items (id) ON DELETE CASCADE,
                        tag_id  UUID NOT NULL REFERENCES tags (id) ON DELETE CASCADE,
                        PRIMARY KEY (item_id, tag_id)
                    );
                    CREATE INDEX item_tags_tag_idx ON item_tags (tag_id);

                    CREATE TABLE item_details (
                        item_id      UUID          PRIMARY KEY REFERENCES items (id) ON DELETE CASCADE,
                        weight_kg    NUMERIC(10,2) NOT NULL CHECK (weight_kg >= 0),
                        length_cm    NUMERIC(10,2) NOT NULL CHECK (length_cm >= 0),
                        width_cm     NUMERIC(10,2) NOT NULL CHECK (width_cm >= 0),
                        height_cm    NUMERIC(10,2) NOT NULL CHECK (height_cm >= 0),
                        material     VARCHAR(100)  NOT NULL DEFAULT '',
                        color        VARCHAR(100)  NOT NULL DEFAULT '',
                        manufacturer VARCHAR(200)  NOT NULL DEFAULT ''
                    );
                "#,
            },
        ]
    }
}

pub fn create_module(
    repo: Arc<dyn CatalogRepository>,
    paging: CatalogSettings,
) -> Arc<dyn Module> {
    Arc::new(CatalogModule::new(repo, paging))
}
