use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use garde::Validate;
use lending_http::{AppError, AppResult, JsonBody, PathParam, QueryParams};
use lending_kernel::settings::CatalogSettings;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::models::{
    Category, CategorySummary, CatalogStats, Item, ItemInput, ItemOrder, ItemQuery, LabelInput,
    Page, Tag, TagSummary,
};
use super::repository::{CatalogError, CatalogRepository};
use crate::ids::{CategoryId, ItemId, TagId};

const RELATED_ITEMS: u32 = 4;
const RECENT_ITEMS: u32 = 6;

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Storage(source) => AppError::Internal(source),
            other => other.kind().respond(other.code(), other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct CatalogState {
    pub repo: Arc<dyn CatalogRepository>,
    pub paging: CatalogSettings,
}

pub fn router(state: CatalogState) -> Router {
    Router::new()
        .route("/items", get(list_items).post(create_item))
        .route(
            "/items/{id}",
            get(get_item).put(update_item).delete(delete_item),
        )
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/{id}",
            get(get_category)
                .put(update_category)
                .delete(delete_category),
        )
        .route("/tags", get(list_tags).post(create_tag))
        .route("/tags/{id}", put(update_tag).delete(delete_tag))
        .route("/summary", get(summary))
        .with_state(state)
}

/// Query string of the item listing.
#[derive(Debug, Default, Deserialize)]
pub struct ItemListParams {
    pub q: Option<String>,
    pub category: Option<CategoryId>,
    pub tag: Option<TagId>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub available: Option<bool>,
    pub order: Option<ItemOrder>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ItemListParams {
    pub fn into_query(self, paging: &CatalogSettings) -> ItemQuery {
        ItemQuery {
            search: self.q,
            category: self.category,
            tag: self.tag,
            min_price: self.min_price,
            max_price: self.max_price,
            available_only: self.available.unwrap_or(false),
            order: self.order.unwrap_or_default(),
            page: self.page.unwrap_or(1),
            page_size: self
                .page_size
                .unwrap_or(paging.page_size)
                .clamp(1, paging.max_page_size),
        }
    }
}

async fn list_items(
    State(state): State<CatalogState>,
    QueryParams(params): QueryParams<ItemListParams>,
) -> AppResult<Json<Page<Item>>> {
    let query = params.into_query(&state.paging);
    Ok(Json(state.repo.list_items(&query).await?))
}

fn checked(input: ItemInput) -> AppResult<ItemInput> {
    let input = input.normalized();
    input.validate()?;
    Ok(input)
}

async fn create_item(
    State(state): State<CatalogState>,
    JsonBody(input): JsonBody<ItemInput>,
) -> AppResult<(StatusCode, Json<Item>)> {
    let item = state.repo.create_item(checked(input)?).await?;
    tracing::info!(item_id = %item.id, code = %item.code, "item created");
    Ok((StatusCode::CREATED, Json(item)))
}

#[derive(Debug, Serialize)]
struct ItemDetail {
    #[serde(flatten)]
    item: Item,
    related: Vec<Item>,
}

async fn get_item(
    State(state): State<CatalogState>,
    PathParam(id): PathParam<ItemId>,
) -> AppResult<Json<ItemDetail>> {
    let item = state
        .repo
        .find_item(id)
        .await?
        .ok_or_else(|| CatalogError::item_not_found(id))?;
    let related = state.repo.related_items(id, RELATED_ITEMS).await?;
    Ok(Json(ItemDetail { item, related }))
}

async fn update_item(
    State(state): State<CatalogState>,
    PathParam(id): PathParam<ItemId>,
    JsonBody(input): JsonBody<ItemInput>,
) -> AppResult<Json<Item>> {
    Ok(Json(state.repo.update_item(id, checked(input)?).await?))
}

async fn delete_item(
    State(state): State<CatalogState>,
    PathParam(id): PathParam<ItemId>,
) -> AppResult<StatusCode> {
    state.repo.delete_item(id).await?;
    tracing::info!(item_id = %id, "item deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn label(input: LabelInput) -> AppResult<LabelInput> {
    let input = input.normalized();
    input.validate()?;
    Ok(input)
}

async fn list_categories(
    State(state): State<CatalogState>,
) -> AppResult<Json<Vec<CategorySummary>>> {
    Ok(Json(state.repo.list_categories().await?))
}

async fn create_category(
    State(state): State<CatalogState>,
    JsonBody(input): JsonBody<LabelInput>,
) -> AppResult<(StatusCode, Json<Category>)> {
    let category = state.repo.create_category(label(input)?).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn get_category(
    State(state): State<CatalogState>,
    PathParam(id): PathParam<CategoryId>,
) -> AppResult<Json<Category>> {
    state
        .repo
        .find_category(id)
        .await?
        .map(Json)
        .ok_or_else(|| CatalogError::category_not_found(id).into())
}

async fn update_category(
    State(state): State<CatalogState>,
    PathParam(id): PathParam<CategoryId>,
    JsonBody(input): JsonBody<LabelInput>,
) -> AppResult<Json<Category>> {
    Ok(Json(state.repo.update_category(id, label(input)?).await?))
}

async fn delete_category(
    State(state): State<CatalogState>,
    PathParam(id): PathParam<CategoryId>,
) -> AppResult<StatusCode> {
    let detached = state.repo.delete_category(id).await?;
    tracing::info!(category_id = %id, detached, "category deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_tags(State(state): State<CatalogState>) -> AppResult<Json<Vec<TagSummary>>> {
    Ok(Json(state.repo.list_tags().await?))
}

async fn create_tag(
    State(state): State<CatalogState>,
    JsonBody(input): JsonBody<LabelInput>,
) -> AppResult<(StatusCode, Json<Tag>)> {
    let tag = state.repo.create_tag(label(input)?).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

async fn update_tag(
    State(state): State<CatalogState>,
    PathParam(id): PathParam<TagId>,
    JsonBody(input): JsonBody<LabelInput>,
) -> AppResult<Json<Tag>> {
    Ok(Json(state.repo.update_tag(id, label(input)?).await?))
}

async fn delete_tag(
    State(state): State<CatalogState>,
    PathParam(id): PathParam<TagId>,
) -> AppResult<StatusCode> {
    let untagged = state.repo.delete_tag(id).await?;
    tracing::info!(tag_id = %id, untagged, "tag deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn summary(State(state): State<CatalogState>) -> AppResult<Json<CatalogStats>> {
    Ok(Json(state.repo.stats(RECENT_ITEMS).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, 12)]
    #[case(Some(0), 1)]
    #[case(Some(30), 30)]
    #[case(Some(500), 100)]
    fn page_size_is_bounded(#[case] requested: Option<u32>, #[case] expected: u32) {
        let params = ItemListParams {
            page_size: requested,
            ..ItemListParams::default()
        };
        let query = params.into_query(&CatalogSettings::default());
        assert_eq!(query.page_size, expected);
        assert_eq!(query.page, 1);
        assert_eq!(query.order, ItemOrder::Newest);
    }

    #[test]
    fn catalog_errors_carry_specific_codes() {
        let err = AppError::from(CatalogError::ItemHasLoans(ItemId::new()));
        assert_eq!(err.code(), "item_has_loans");

        let err = AppError::from(CatalogError::DuplicateCode("X".to_string()));
        assert_eq!(err.code(), "duplicate_code");

        let err = AppError::from(CatalogError::UnknownReference {
            entity: "tag",
            id: uuid::Uuid::now_v7(),
        });
        assert!(matches!(err, AppError::Validation { .. }));
    }
}
