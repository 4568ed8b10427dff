//! Postgres implementation of the repositories.
//!
//! Ledger transactions run at READ COMMITTED and take row locks
//! (`SELECT ... FOR UPDATE`) on the item and loan they touch; concurrent
//! borrowers queue on the item row and re-read the counter once it is free.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::ids::{BorrowerId, CategoryId, ItemId, LoanId, TagId};
use crate::modules::borrowers::models::{Borrower, BorrowerInput};
use crate::modules::borrowers::repository::{BorrowerError, BorrowerRepository};
use crate::modules::catalog::models::{
    Category, CategoryRef, CategorySummary, CatalogStats, ImportedItem, Item, ItemDetails,
    ItemInput, ItemOrder, ItemQuery, LabelInput, Page, PageWindow, Tag, TagRef, TagSummary,
    Upserted,
};
use crate::modules::catalog::repository::{CatalogError, CatalogRepository, CatalogResult};
use crate::modules::loans::error::LedgerError;
use crate::modules::loans::models::{ItemStock, Loan, LoanFilter};
use crate::modules::loans::repository::{LedgerRepository, LedgerResult, LedgerTransaction};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const NUMERIC_OUT_OF_RANGE: &str = "22003";

const OPEN_LOAN_INDEX: &str = "loans_one_open_per_borrower";

macro_rules! item_select {
    ($tail:literal) => {
        concat!(
            "SELECT i.id, i.title, i.author, i.description, i.code, i.price, i.quantity, i.listed, \
                    i.category_id, c.name::text AS category_name, \
                    ARRAY(SELECT t.id FROM item_tags it JOIN tags t ON t.id = it.tag_id \
                          WHERE it.item_id = i.id ORDER BY t.name) AS tag_ids, \
                    ARRAY(SELECT t.name::text FROM item_tags it JOIN tags t ON t.id = it.tag_id \
                          WHERE it.item_id = i.id ORDER BY t.name) AS tag_names, \
                    d.weight_kg, d.length_cm, d.width_cm, d.height_cm, \
                    d.material::text AS material, d.color::text AS color, \
                    d.manufacturer::text AS manufacturer, \
                    i.created_at, i.updated_at \
             FROM items i \
             LEFT JOIN categories c ON c.id = i.category_id \
             LEFT JOIN item_details d ON d.item_id = i.id ",
            $tail
        )
    };
}

const LOAN_COLUMNS: &str = "id, item_id, borrower_id, created_at, closed_at, closed";

fn storage(err: sqlx::Error) -> anyhow::Error {
    anyhow::Error::new(err)
}

/// Constraint name of a database error carrying `sqlstate`.
fn violated<'a>(err: &'a sqlx::Error, sqlstate: &str) -> Option<&'a str> {
    match err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(sqlstate) => {
            Some(db.constraint().unwrap_or_default())
        }
        _ => None,
    }
}

fn ledger_error(err: sqlx::Error) -> LedgerError {
    if violated(&err, SERIALIZATION_FAILURE).is_some()
        || violated(&err, DEADLOCK_DETECTED).is_some()
    {
        return LedgerError::Conflict;
    }
    LedgerError::Storage(storage(err))
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: ItemId,
    title: String,
    author: Option<String>,
    description: String,
    code: String,
    price: Option<Decimal>,
    quantity: i32,
    listed: bool,
    category_id: Option<CategoryId>,
    category_name: Option<String>,
    tag_ids: Vec<Uuid>,
    tag_names: Vec<String>,
    weight_kg: Option<Decimal>,
    length_cm: Option<Decimal>,
    width_cm: Option<Decimal>,
    height_cm: Option<Decimal>,
    material: Option<String>,
    color: Option<String>,
    manufacturer: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        let category = row
            .category_id
            .zip(row.category_name)
            .map(|(id, name)| CategoryRef { id, name });
        let tags = row
            .tag_ids
            .into_iter()
            .zip(row.tag_names)
            .map(|(id, name)| TagRef {
                id: TagId::from(id),
                name,
            })
            .collect();
        let details = match (row.weight_kg, row.length_cm, row.width_cm, row.height_cm) {
            (Some(weight_kg), Some(length_cm), Some(width_cm), Some(height_cm)) => {
                Some(ItemDetails {
                    weight_kg,
                    length_cm,
                    width_cm,
                    height_cm,
                    material: row.material.unwrap_or_default(),
                    color: row.color.unwrap_or_default(),
                    manufacturer: row.manufacturer.unwrap_or_default(),
                })
            }
            _ => None,
        };

        Item {
            id: row.id,
            title: row.title,
            author: row.author,
            description: row.description,
            code: row.code,
            price: row.price,
            quantity: row.quantity,
            listed: row.listed,
            category,
            tags,
            details,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

async fn load_item<'e, E>(executor: E, id: ItemId) -> sqlx::Result<Option<Item>>
where
    E: PgExecutor<'e>,
{
    let row: Option<ItemRow> = sqlx::query_as(item_select!("WHERE i.id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(Item::from))
}

fn order_clause(order: ItemOrder) -> &'static str {
    match order {
        ItemOrder::Newest => " ORDER BY i.created_at DESC, i.id DESC",
        ItemOrder::Oldest => " ORDER BY i.created_at ASC, i.id ASC",
        ItemOrder::TitleAsc => " ORDER BY i.title ASC, i.created_at DESC, i.id DESC",
        ItemOrder::TitleDesc => " ORDER BY i.title DESC, i.created_at DESC, i.id DESC",
        ItemOrder::PriceAsc => " ORDER BY i.price ASC NULLS LAST, i.created_at DESC, i.id DESC",
        ItemOrder::PriceDesc => " ORDER BY i.price DESC NULLS LAST, i.created_at DESC, i.id DESC",
    }
}

fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn push_item_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &ItemQuery) {
    qb.push(" WHERE TRUE");
    if let Some(term) = query.search_term() {
        let pattern = like_pattern(term);
        qb.push(" AND (i.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR i.author ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR i.description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR i.code ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(category) = query.category {
        qb.push(" AND i.category_id = ").push_bind(category);
    }
    if let Some(tag) = query.tag {
        qb.push(" AND EXISTS (SELECT 1 FROM item_tags x WHERE x.item_id = i.id AND x.tag_id = ")
            .push_bind(tag)
            .push(")");
    }
    if let Some(min) = query.min_price {
        qb.push(" AND i.price >= ").push_bind(min);
    }
    if let Some(max) = query.max_price {
        qb.push(" AND i.price <= ").push_bind(max);
    }
    if query.available_only {
        qb.push(" AND i.listed AND i.quantity > 0");
    }
}

async fn check_references(conn: &mut PgConnection, input: &ItemInput) -> CatalogResult<()> {
    if let Some(id) = input.category_id {
        check_category(conn, id).await?;
    }
    if input.tag_ids.is_empty() {
        return Ok(());
    }

    let wanted: Vec<Uuid> = input.tag_ids.iter().map(|id| id.raw()).collect();
    let found: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM tags WHERE id = ANY($1)")
        .bind(&wanted)
        .fetch_all(&mut *conn)
        .await
        .map_err(storage)?;
    match wanted.into_iter().find(|id| !found.contains(id)) {
        Some(id) => Err(CatalogError::UnknownReference { entity: "tag", id }),
        None => Ok(()),
    }
}

async fn check_category(conn: &mut PgConnection, id: CategoryId) -> CatalogResult<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM categories WHERE id = $1)")
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .map_err(storage)?;
    if !exists {
        return Err(CatalogError::UnknownReference {
            entity: "category",
            id: id.raw(),
        });
    }
    Ok(())
}

async fn replace_tags(conn: &mut PgConnection, id: ItemId, tags: &[TagId]) -> CatalogResult<()> {
    sqlx::query("DELETE FROM item_tags WHERE item_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(storage)?;
    if tags.is_empty() {
        return Ok(());
    }

    let tag_ids: Vec<Uuid> = tags.iter().map(|t| t.raw()).collect();
    sqlx::query("INSERT INTO item_tags (item_id, tag_id) SELECT $1, unnest($2::uuid[])")
        .bind(id)
        .bind(&tag_ids)
        .execute(&mut *conn)
        .await
        .map_err(storage)?;
    Ok(())
}

async fn replace_details(
    conn: &mut PgConnection,
    id: ItemId,
    details: Option<&ItemDetails>,
) -> CatalogResult<()> {
    let Some(details) = details else {
        sqlx::query("DELETE FROM item_details WHERE item_id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(storage)?;
        return Ok(());
    };

    sqlx::query(
        r#"
        INSERT INTO item_details
            (item_id, weight_kg, length_cm, width_cm, height_cm, material, color, manufacturer)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (item_id) DO UPDATE SET
            weight_kg = EXCLUDED.weight_kg,
            length_cm = EXCLUDED.length_cm,
            width_cm = EXCLUDED.width_cm,
            height_cm = EXCLUDED.height_cm,
            material = EXCLUDED.material,
            color = EXCLUDED.color,
            manufacturer = EXCLUDED.manufacturer
        "#,
    )
    .bind(id)
    .bind(details.weight_kg)
    .bind(details.length_cm)
    .bind(details.width_cm)
    .bind(details.height_cm)
    .bind(&details.material)
    .bind(&details.color)
    .bind(&details.manufacturer)
    .execute(&mut *conn)
    .await
    .map_err(storage)?;
    Ok(())
}

fn item_write_error(err: sqlx::Error, code: &str) -> CatalogError {
    if violated(&err, UNIQUE_VIOLATION).is_some() {
        return CatalogError::DuplicateCode(code.to_string());
    }
    CatalogError::Storage(storage(err))
}

fn label_write_error(err: sqlx::Error, entity: &'static str, name: &str) -> CatalogError {
    if violated(&err, UNIQUE_VIOLATION).is_some() {
        return CatalogError::DuplicateName {
            entity,
            name: name.to_string(),
        };
    }
    CatalogError::Storage(storage(err))
}

/// Repositories backed by a Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn transaction(&self) -> CatalogResult<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await.map_err(storage)?)
    }
}

#[async_trait]
impl CatalogRepository for PgStore {
    async fn create_category(&self, input: LabelInput) -> CatalogResult<Category> {
        let input = input.normalized();
        let now = crate::now();
        sqlx::query_as(
            "INSERT INTO categories (id, name, description, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $4) \
             RETURNING id, name::text AS name, description, created_at, updated_at",
        )
        .bind(CategoryId::new())
        .bind(&input.name)
        .bind(&input.description)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| label_write_error(err, "category", &input.name))
    }

    async fn update_category(&self, id: CategoryId, input: LabelInput) -> CatalogResult<Category> {
        let input = input.normalized();
        sqlx::query_as(
            "UPDATE categories SET name = $2, description = $3, updated_at = $4 WHERE id = $1 \
             RETURNING id, name::text AS name, description, created_at, updated_at",
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(crate::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| label_write_error(err, "category", &input.name))?
        .ok_or_else(|| CatalogError::category_not_found(id))
    }

    async fn delete_category(&self, id: CategoryId) -> CatalogResult<u64> {
        let mut tx = self.transaction().await?;
        let detached = sqlx::query("UPDATE items SET category_id = NULL WHERE category_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?
            .rows_affected();
        let deleted = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?
            .rows_affected();
        if deleted == 0 {
            return Err(CatalogError::category_not_found(id));
        }
        tx.commit().await.map_err(storage)?;
        Ok(detached)
    }

    async fn find_category(&self, id: CategoryId) -> CatalogResult<Option<Category>> {
        Ok(sqlx::query_as(
            "SELECT id, name::text AS name, description, created_at, updated_at \
             FROM categories WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?)
    }

    async fn list_categories(&self) -> CatalogResult<Vec<CategorySummary>> {
        Ok(sqlx::query_as(
            "SELECT c.id, c.name::text AS name, c.description, c.created_at, c.updated_at, \
                    count(i.id) AS item_count \
             FROM categories c LEFT JOIN items i ON i.category_id = c.id \
             GROUP BY c.id ORDER BY c.name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?)
    }

    async fn category_named(&self, name: &str) -> CatalogResult<Category> {
        let input = LabelInput::named(name).normalized();
        let now = crate::now();
        sqlx::query(
            "INSERT INTO categories (id, name, created_at, updated_at) VALUES ($1, $2, $3, $3) \
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(CategoryId::new())
        .bind(&input.name)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(sqlx::query_as(
            "SELECT id, name::text AS name, description, created_at, updated_at \
             FROM categories WHERE name = $1",
        )
        .bind(&input.name)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?)
    }

    async fn create_tag(&self, input: LabelInput) -> CatalogResult<Tag> {
        let input = input.normalized();
        sqlx::query_as(
            "INSERT INTO tags (id, name, description, created_at) VALUES ($1, $2, $3, $4) \
             RETURNING id, name::text AS name, description, created_at",
        )
        .bind(TagId::new())
        .bind(&input.name)
        .bind(&input.description)
        .bind(crate::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|err| label_write_error(err, "tag", &input.name))
    }

    async fn update_tag(&self, id: TagId, input: LabelInput) -> CatalogResult<Tag> {
        let input = input.normalized();
        sqlx::query_as(
            "UPDATE tags SET name = $2, description = $3 WHERE id = $1 \
             RETURNING id, name::text AS name, description, created_at",
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| label_write_error(err, "tag", &input.name))?
        .ok_or_else(|| CatalogError::tag_not_found(id))
    }

    async fn delete_tag(&self, id: TagId) -> CatalogResult<u64> {
        let mut tx = self.transaction().await?;
        let untagged = sqlx::query("DELETE FROM item_tags WHERE tag_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?
            .rows_affected();
        let deleted = sqlx::query("DELETE FROM tags WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?
            .rows_affected();
        if deleted == 0 {
            return Err(CatalogError::tag_not_found(id));
        }
        tx.commit().await.map_err(storage)?;
        Ok(untagged)
    }

    async fn list_tags(&self) -> CatalogResult<Vec<TagSummary>> {
        Ok(sqlx::query_as(
            "SELECT t.id, t.name::text AS name, t.description, t.created_at, \
                    count(it.item_id) AS item_count \
             FROM tags t LEFT JOIN item_tags it ON it.tag_id = t.id \
             GROUP BY t.id ORDER BY t.name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?)
    }

    async fn create_item(&self, input: ItemInput) -> CatalogResult<Item> {
        let input = input.normalized();
        let mut tx = self.transaction().await?;
        check_references(&mut tx, &input).await?;

        let id = ItemId::new();
        sqlx::query(
            r#"
            INSERT INTO items
                (id, title, author, description, code, price, quantity, listed, category_id,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            "#,
        )
        .bind(id)
        .bind(&input.title)
        .bind(&input.author)
        .bind(&input.description)
        .bind(&input.code)
        .bind(input.price)
        .bind(input.quantity)
        .bind(input.listed)
        .bind(input.category_id)
        .bind(crate::now())
        .execute(&mut *tx)
        .await
        .map_err(|err| item_write_error(err, &input.code))?;

        replace_tags(&mut tx, id, &input.tag_ids).await?;
        replace_details(&mut tx, id, input.details.as_ref()).await?;

        let item = load_item(&mut *tx, id)
            .await
            .map_err(storage)?
            .ok_or_else(|| CatalogError::item_not_found(id))?;
        tx.commit().await.map_err(storage)?;
        Ok(item)
    }

    async fn update_item(&self, id: ItemId, input: ItemInput) -> CatalogResult<Item> {
        let input = input.normalized();
        let mut tx = self.transaction().await?;

        let exists: Option<ItemId> =
            sqlx::query_scalar("SELECT id FROM items WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage)?;
        if exists.is_none() {
            return Err(CatalogError::item_not_found(id));
        }
        check_references(&mut tx, &input).await?;

        sqlx::query(
            r#"
            UPDATE items SET
                title = $2, author = $3, description = $4, code = $5, price = $6,
                quantity = $7, listed = $8, category_id = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&input.title)
        .bind(&input.author)
        .bind(&input.description)
        .bind(&input.code)
        .bind(input.price)
        .bind(input.quantity)
        .bind(input.listed)
        .bind(input.category_id)
        .bind(crate::now())
        .execute(&mut *tx)
        .await
        .map_err(|err| item_write_error(err, &input.code))?;

        replace_tags(&mut tx, id, &input.tag_ids).await?;
        replace_details(&mut tx, id, input.details.as_ref()).await?;

        let item = load_item(&mut *tx, id)
            .await
            .map_err(storage)?
            .ok_or_else(|| CatalogError::item_not_found(id))?;
        tx.commit().await.map_err(storage)?;
        Ok(item)
    }

    async fn delete_item(&self, id: ItemId) -> CatalogResult<()> {
        let result = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| {
                if violated(&err, FOREIGN_KEY_VIOLATION).is_some() {
                    CatalogError::ItemHasLoans(id)
                } else {
                    CatalogError::Storage(storage(err))
                }
            })?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::item_not_found(id));
        }
        Ok(())
    }

    async fn find_item(&self, id: ItemId) -> CatalogResult<Option<Item>> {
        Ok(load_item(&self.pool, id).await.map_err(storage)?)
    }

    async fn list_items(&self, query: &ItemQuery) -> CatalogResult<Page<Item>> {
        let mut count = QueryBuilder::new("SELECT count(*) FROM items i");
        push_item_filters(&mut count, query);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;

        let total = u64::try_from(total).unwrap_or_default();
        let window = PageWindow::resolve(total, query.page, query.page_size);

        let mut select = QueryBuilder::new(item_select!(""));
        push_item_filters(&mut select, query);
        select
            .push(order_clause(query.order))
            .push(" LIMIT ")
            .push_bind(i64::from(window.page_size))
            .push(" OFFSET ")
            .push_bind(i64::try_from(window.offset).unwrap_or(i64::MAX));
        let rows: Vec<ItemRow> = select
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;

        Ok(Page::new(
            rows.into_iter().map(Item::from).collect(),
            total,
            window,
        ))
    }

    async fn related_items(&self, id: ItemId, limit: u32) -> CatalogResult<Vec<Item>> {
        let category: Option<Option<CategoryId>> =
            sqlx::query_scalar("SELECT category_id FROM items WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;
        let Some(category) = category.ok_or_else(|| CatalogError::item_not_found(id))? else {
            return Ok(Vec::new());
        };

        let rows: Vec<ItemRow> = sqlx::query_as(item_select!(
            "WHERE i.category_id = $1 AND i.id <> $2 ORDER BY i.created_at DESC, i.id DESC LIMIT $3"
        ))
        .bind(category)
        .bind(id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn upsert_imported(&self, imported: ImportedItem) -> CatalogResult<Upserted<Item>> {
        let mut tx = self.transaction().await?;
        if let Some(category) = imported.category_id {
            check_category(&mut tx, category).await?;
        }

        let now = crate::now();
        let listed = imported.quantity > 0;
        let existing: Option<ItemId> =
            sqlx::query_scalar("SELECT id FROM items WHERE code = $1 FOR UPDATE")
                .bind(&imported.code)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage)?;

        let id = match existing {
            Some(id) => {
                sqlx::query(
                    "UPDATE items SET title = $2, author = $3, category_id = $4, quantity = $5, \
                     listed = $6, updated_at = $7 WHERE id = $1",
                )
                .bind(id)
                .bind(&imported.title)
                .bind(&imported.author)
                .bind(imported.category_id)
                .bind(imported.quantity)
                .bind(listed)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
                id
            }
            None => {
                let id = ItemId::new();
                sqlx::query(
                    "INSERT INTO items (id, title, author, description, code, quantity, listed, \
                     category_id, created_at, updated_at) \
                     VALUES ($1, $2, $3, '', $4, $5, $6, $7, $8, $8)",
                )
                .bind(id)
                .bind(&imported.title)
                .bind(&imported.author)
                .bind(&imported.code)
                .bind(imported.quantity)
                .bind(listed)
                .bind(imported.category_id)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|err| item_write_error(err, &imported.code))?;
                id
            }
        };

        let item = load_item(&mut *tx, id)
            .await
            .map_err(storage)?
            .ok_or_else(|| CatalogError::item_not_found(id))?;
        tx.commit().await.map_err(storage)?;

        Ok(match existing {
            Some(_) => Upserted::Updated(item),
            None => Upserted::Created(item),
        })
    }

    async fn stats(&self, recent: u32) -> CatalogResult<CatalogStats> {
        let (items, categories, tags, available): (i64, i64, i64, i64) = sqlx::query_as(
            "SELECT (SELECT count(*) FROM items), \
                    (SELECT count(*) FROM categories), \
                    (SELECT count(*) FROM tags), \
                    (SELECT count(*) FROM items WHERE listed AND quantity > 0)",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;

        let rows: Vec<ItemRow> =
            sqlx::query_as(item_select!("ORDER BY i.created_at DESC, i.id DESC LIMIT $1"))
                .bind(i64::from(recent))
                .fetch_all(&self.pool)
                .await
                .map_err(storage)?;

        let count = |n: i64| u64::try_from(n).unwrap_or_default();
        Ok(CatalogStats {
            total_items: count(items),
            total_categories: count(categories),
            total_tags: count(tags),
            available_items: count(available),
            recent_items: rows.into_iter().map(Item::from).collect(),
        })
    }
}

#[async_trait]
impl BorrowerRepository for PgStore {
    async fn create_borrower(&self, input: BorrowerInput) -> Result<Borrower, BorrowerError> {
        let input = input.normalized();
        sqlx::query_as(
            "INSERT INTO borrowers (id, name, email, created_at) VALUES ($1, $2, $3, $4) \
             RETURNING id, name::text AS name, email::text AS email, created_at",
        )
        .bind(BorrowerId::new())
        .bind(&input.name)
        .bind(&input.email)
        .bind(crate::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if violated(&err, UNIQUE_VIOLATION).is_some() {
                BorrowerError::DuplicateEmail(input.email.clone())
            } else {
                BorrowerError::Storage(storage(err))
            }
        })
    }

    async fn find_borrower(&self, id: BorrowerId) -> Result<Option<Borrower>, BorrowerError> {
        Ok(sqlx::query_as(
            "SELECT id, name::text AS name, email::text AS email, created_at \
             FROM borrowers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?)
    }

    async fn list_borrowers(&self) -> Result<Vec<Borrower>, BorrowerError> {
        Ok(sqlx::query_as(
            "SELECT id, name::text AS name, email::text AS email, created_at \
             FROM borrowers ORDER BY name, email",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?)
    }
}

#[async_trait]
impl LedgerRepository for PgStore {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTransaction>> {
        let tx = self.pool.begin().await.map_err(ledger_error)?;
        Ok(Box::new(PgLedgerTransaction { tx }))
    }

    async fn find_loan(&self, id: LoanId) -> LedgerResult<Option<Loan>> {
        let mut query = QueryBuilder::new("SELECT ");
        query.push(LOAN_COLUMNS).push(" FROM loans WHERE id = ").push_bind(id);
        query
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .map_err(ledger_error)
    }

    async fn list_loans(&self, filter: LoanFilter) -> LedgerResult<Vec<Loan>> {
        let mut query = QueryBuilder::new("SELECT ");
        query.push(LOAN_COLUMNS).push(" FROM loans WHERE TRUE");
        if let Some(borrower) = filter.borrower {
            query.push(" AND borrower_id = ").push_bind(borrower);
        }
        if let Some(item) = filter.item {
            query.push(" AND item_id = ").push_bind(item);
        }
        if let Some(open) = filter.open {
            query.push(" AND closed = ").push_bind(!open);
        }
        query.push(" ORDER BY created_at DESC, id DESC");
        query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(ledger_error)
    }
}

struct PgLedgerTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    async fn item_stock(&mut self, item_id: ItemId) -> LedgerResult<Option<ItemStock>> {
        let row: Option<(i32, bool)> =
            sqlx::query_as("SELECT quantity, listed FROM items WHERE id = $1 FOR UPDATE")
                .bind(item_id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(ledger_error)?;
        Ok(row.map(|(quantity, listed)| ItemStock { quantity, listed }))
    }

    async fn borrower_exists(&mut self, borrower_id: BorrowerId) -> LedgerResult<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM borrowers WHERE id = $1)")
            .bind(borrower_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(ledger_error)
    }

    async fn has_open_loan(
        &mut self,
        item_id: ItemId,
        borrower_id: BorrowerId,
    ) -> LedgerResult<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM loans \
             WHERE item_id = $1 AND borrower_id = $2 AND NOT closed)",
        )
        .bind(item_id)
        .bind(borrower_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(ledger_error)
    }

    async fn take_one(&mut self, item_id: ItemId) -> LedgerResult<bool> {
        let result = sqlx::query(
            "UPDATE items SET quantity = quantity - 1, updated_at = $2 \
             WHERE id = $1 AND quantity > 0",
        )
        .bind(item_id)
        .bind(crate::now())
        .execute(&mut *self.tx)
        .await
        .map_err(ledger_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn put_back(&mut self, item_id: ItemId) -> LedgerResult<()> {
        let result = sqlx::query(
            "UPDATE items SET quantity = quantity + 1, updated_at = $2 WHERE id = $1",
        )
        .bind(item_id)
        .bind(crate::now())
        .execute(&mut *self.tx)
        .await
        .map_err(|err| match violated(&err, NUMERIC_OUT_OF_RANGE) {
            Some(_) => LedgerError::StockOverflow(item_id),
            None => ledger_error(err),
        })?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::ItemNotFound(item_id));
        }
        Ok(())
    }

    async fn insert_loan(&mut self, loan: &Loan) -> LedgerResult<()> {
        sqlx::query(
            "INSERT INTO loans (id, item_id, borrower_id, created_at, closed_at, closed) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(loan.id)
        .bind(loan.item_id)
        .bind(loan.borrower_id)
        .bind(loan.created_at)
        .bind(loan.closed_at)
        .bind(loan.closed)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| {
            if violated(&err, UNIQUE_VIOLATION) == Some(OPEN_LOAN_INDEX) {
                LedgerError::DuplicateActiveLoan {
                    item_id: loan.item_id,
                    borrower_id: loan.borrower_id,
                }
            } else {
                ledger_error(err)
            }
        })?;
        Ok(())
    }

    async fn loan_for_update(&mut self, loan_id: LoanId) -> LedgerResult<Option<Loan>> {
        let mut query = QueryBuilder::new("SELECT ");
        query
            .push(LOAN_COLUMNS)
            .push(" FROM loans WHERE id = ")
            .push_bind(loan_id)
            .push(" FOR UPDATE");
        query
            .build_query_as()
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(ledger_error)
    }

    async fn close_loan(&mut self, loan_id: LoanId, closed_at: DateTime<Utc>) -> LedgerResult<()> {
        let result = sqlx::query(
            "UPDATE loans SET closed = TRUE, closed_at = $2 WHERE id = $1 AND NOT closed",
        )
        .bind(loan_id)
        .bind(closed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(ledger_error)?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::AlreadyReturned(loan_id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        self.tx.commit().await.map_err(ledger_error)
    }
}
