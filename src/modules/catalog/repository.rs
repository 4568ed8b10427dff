use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::models::{
    Category, CategorySummary, CatalogStats, ImportedItem, Item, ItemInput, ItemQuery, LabelInput,
    Page, Tag, TagSummary, Upserted,
};
use crate::error::ErrorKind;
use crate::ids::{CategoryId, ItemId, TagId};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("a {entity} named '{name}' already exists")]
    DuplicateName { entity: &'static str, name: String },

    #[error("item code '{0}' is already in use")]
    DuplicateCode(String),

    #[error("unknown {entity} {id}")]
    UnknownReference { entity: &'static str, id: Uuid },

    #[error("item {0} has loans on record and cannot be deleted")]
    ItemHasLoans(ItemId),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl CatalogError {
    pub fn category_not_found(id: CategoryId) -> Self {
        Self::NotFound {
            entity: "category",
            id: id.raw(),
        }
    }

    pub fn tag_not_found(id: TagId) -> Self {
        Self::NotFound {
            entity: "tag",
            id: id.raw(),
        }
    }

    pub fn item_not_found(id: ItemId) -> Self {
        Self::NotFound {
            entity: "item",
            id: id.raw(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::NotFound { .. } => ErrorKind::NotFound,
            CatalogError::DuplicateName { .. } | CatalogError::DuplicateCode(_) => {
                ErrorKind::Conflict
            }
            CatalogError::UnknownReference { .. } => ErrorKind::Invalid,
            CatalogError::ItemHasLoans(_) => ErrorKind::InvalidState,
            CatalogError::Storage(_) => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::NotFound { entity, .. } => match *entity {
                "category" => "category_not_found",
                "tag" => "tag_not_found",
                _ => "item_not_found",
            },
            CatalogError::DuplicateName { .. } => "duplicate_name",
            CatalogError::DuplicateCode(_) => "duplicate_code",
            CatalogError::UnknownReference { .. } => "unknown_reference",
            CatalogError::ItemHasLoans(_) => "item_has_loans",
            CatalogError::Storage(_) => "internal_error",
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Persistence for categories, tags and items.
///
/// Implementations must keep these rules:
/// - category and tag names and item codes are unique;
/// - deleting a category detaches (nulls) it on every item that referenced it;
/// - deleting a tag removes it from every item;
/// - an item with loans on record cannot be deleted;
/// - writes referencing a missing category or tag fail with
///   [`CatalogError::UnknownReference`].
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn create_category(&self, input: LabelInput) -> CatalogResult<Category>;
    async fn update_category(&self, id: CategoryId, input: LabelInput) -> CatalogResult<Category>;
    /// Returns how many items lost their category.
    async fn delete_category(&self, id: CategoryId) -> CatalogResult<u64>;
    async fn find_category(&self, id: CategoryId) -> CatalogResult<Option<Category>>;
    /// Categories ordered by name, with item counts.
    async fn list_categories(&self) -> CatalogResult<Vec<CategorySummary>>;
    /// Look a category up by exact name, creating it when absent.
    async fn category_named(&self, name: &str) -> CatalogResult<Category>;

    async fn create_tag(&self, input: LabelInput) -> CatalogResult<Tag>;
    async fn update_tag(&self, id: TagId, input: LabelInput) -> CatalogResult<Tag>;
    /// Returns how many items carried the tag.
    async fn delete_tag(&self, id: TagId) -> CatalogResult<u64>;
    /// Tags ordered by name, with item counts.
    async fn list_tags(&self) -> CatalogResult<Vec<TagSummary>>;

    async fn create_item(&self, input: ItemInput) -> CatalogResult<Item>;
    async fn update_item(&self, id: ItemId, input: ItemInput) -> CatalogResult<Item>;
    async fn delete_item(&self, id: ItemId) -> CatalogResult<()>;
    async fn find_item(&self, id: ItemId) -> CatalogResult<Option<Item>>;
    async fn list_items(&self, query: &ItemQuery) -> CatalogResult<Page<Item>>;
    /// Other items of the same category, newest first.
    async fn related_items(&self, id: ItemId, limit: u32) -> CatalogResult<Vec<Item>>;
    /// Create or refresh an item by code. Price, description, tags and
    /// details of an existing item are left alone.
    async fn upsert_imported(&self, item: ImportedItem) -> CatalogResult<Upserted<Item>>;
    async fn stats(&self, recent: u32) -> CatalogResult<CatalogStats>;
}
