use chrono::{DateTime, Utc};
use garde::Validate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{CategoryId, ItemId, TagId};

/// Grouping of items; an item belongs to at most one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CategorySummary {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub category: Category,
    pub item_count: i64,
}

/// Free-form label; items carry any number of tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TagSummary {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub tag: Tag,
    pub item_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: CategoryId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub id: TagId,
    pub name: String,
}

/// Physical description of an item, owned by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ItemDetails {
    #[garde(custom(non_negative))]
    pub weight_kg: Decimal,
    #[garde(custom(non_negative))]
    pub length_cm: Decimal,
    #[garde(custom(non_negative))]
    pub width_cm: Decimal,
    #[garde(custom(non_negative))]
    pub height_cm: Decimal,
    #[serde(default)]
    #[garde(length(max = 100))]
    pub material: String,
    #[serde(default)]
    #[garde(length(max = 100))]
    pub color: String,
    #[serde(default)]
    #[garde(length(max = 200))]
    pub manufacturer: String,
}

/// A lendable catalog entry.
///
/// `quantity` is the number of copies currently on the shelf: borrowing
/// takes one, returning puts it back. It never drops below zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    pub author: Option<String>,
    pub description: String,
    pub code: String,
    pub price: Option<Decimal>,
    pub quantity: i32,
    /// Whether the item is offered for lending at all.
    pub listed: bool,
    pub category: Option<CategoryRef>,
    pub tags: Vec<TagRef>,
    pub details: Option<ItemDetails>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    pub fn is_available(&self) -> bool {
        self.listed && self.quantity > 0
    }
}

/// Request body for creating or renaming a category or tag.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LabelInput {
    #[garde(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default)]
    #[garde(length(max = 2000))]
    pub description: Option<String>,
}

impl LabelInput {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub(crate) fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self
    }
}

fn default_quantity() -> i32 {
    1
}

fn default_listed() -> bool {
    true
}

/// Request body for creating or replacing an item.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ItemInput {
    #[garde(length(min = 1, max = 300))]
    pub title: String,
    #[serde(default)]
    #[garde(length(max = 200))]
    pub author: Option<String>,
    #[serde(default)]
    #[garde(skip)]
    pub description: String,
    #[garde(length(min = 1, max = 50))]
    pub code: String,
    #[serde(default)]
    #[garde(custom(positive_price))]
    pub price: Option<Decimal>,
    /// Copies on the shelf right now, not the total owned: copies out on
    /// loan are not counted, and a write replaces the counter as given.
    #[serde(default = "default_quantity")]
    #[garde(range(min = 0, max = MAX_QUANTITY))]
    pub quantity: i32,
    #[serde(default = "default_listed")]
    #[garde(skip)]
    pub listed: bool,
    #[serde(default)]
    #[garde(skip)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    #[garde(skip)]
    pub tag_ids: Vec<TagId>,
    #[serde(default)]
    #[garde(dive)]
    pub details: Option<ItemDetails>,
}

impl ItemInput {
    pub(crate) fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.code = self.code.trim().to_string();
        self.author = self
            .author
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        self.tag_ids.sort();
        self.tag_ids.dedup();
        self
    }
}

/// Upper bound of an item's shelf count.
pub const MAX_QUANTITY: i32 = 1_000_000;

const PRICE_DIGITS: u32 = 10;
const DIMENSION_DIGITS: u32 = 8;

/// `value` must fit a fixed-point column with `digits` digits, two of them
/// after the point.
fn fits_digits(value: &Decimal, digits: u32) -> garde::Result {
    if value.normalize().scale() > 2 {
        return Err(garde::Error::new("at most 2 decimal places"));
    }
    let limit = Decimal::from(10_i64.pow(digits - 2));
    if value.abs() >= limit {
        return Err(garde::Error::new(format!("must be below {limit}")));
    }
    Ok(())
}

fn non_negative(value: &Decimal, _ctx: &()) -> garde::Result {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(garde::Error::new("must not be negative"));
    }
    fits_digits(value, DIMENSION_DIGITS)
}

fn positive_price(value: &Option<Decimal>, _ctx: &()) -> garde::Result {
    match value {
        Some(price) if *price < Decimal::new(1, 2) => {
            Err(garde::Error::new("must be at least 0.01"))
        }
        Some(price) => fits_digits(price, PRICE_DIGITS),
        None => Ok(()),
    }
}

/// Sort order of item listings. Serialized the way query strings spell it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ItemOrder {
    #[default]
    #[serde(rename = "-created_at")]
    Newest,
    #[serde(rename = "created_at")]
    Oldest,
    #[serde(rename = "title")]
    TitleAsc,
    #[serde(rename = "-title")]
    TitleDesc,
    #[serde(rename = "price")]
    PriceAsc,
    #[serde(rename = "-price")]
    PriceDesc,
}

/// Filters and paging for item listings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ItemQuery {
    /// Case-insensitive substring matched against title, author, description
    /// and code.
    pub search: Option<String>,
    pub category: Option<CategoryId>,
    pub tag: Option<TagId>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    /// Only items that are listed and have at least one copy on the shelf.
    pub available_only: bool,
    pub order: ItemOrder,
    /// 1-based page number as requested; clamped when resolved.
    pub page: u32,
    pub page_size: u32,
}

impl ItemQuery {
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }
}

/// Resolved page window: which page is served and where it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u32,
    pub pages: u32,
    pub page_size: u32,
    pub offset: u64,
}

impl PageWindow {
    /// Clamp `requested` into `1..=pages`. An empty result still has one
    /// (empty) page.
    pub fn resolve(total: u64, requested: u32, page_size: u32) -> Self {
        let page_size = page_size.max(1);
        let pages = total.div_ceil(u64::from(page_size)).max(1);
        let pages = u32::try_from(pages).unwrap_or(u32::MAX);
        let page = requested.clamp(1, pages);
        Self {
            page,
            pages,
            page_size,
            offset: u64::from(page - 1) * u64::from(page_size),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, window: PageWindow) -> Self {
        Self {
            items,
            total,
            page: window.page,
            page_size: window.page_size,
            pages: window.pages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total_items: u64,
    pub total_categories: u64,
    pub total_tags: u64,
    pub available_items: u64,
    pub recent_items: Vec<Item>,
}

/// Outcome of an upsert keyed by item code.
#[derive(Debug, Clone, PartialEq)]
pub enum Upserted<T> {
    Created(T),
    Updated(T),
}

impl<T> Upserted<T> {
    pub fn into_inner(self) -> T {
        match self {
            Upserted::Created(value) | Upserted::Updated(value) => value,
        }
    }
}

/// Fields the bulk importer sets on an item identified by `code`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedItem {
    pub code: String,
    pub title: String,
    pub author: String,
    pub category_id: Option<CategoryId>,
    pub quantity: i32,
}
