//! Process-local store. Everything sits behind one async mutex, so every
//! operation is serializable; ledger transactions hold the lock until they
//! commit or are dropped.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

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

#[derive(Debug, Clone)]
struct StoredItem {
    id: ItemId,
    title: String,
    author: Option<String>,
    description: String,
    code: String,
    price: Option<Decimal>,
    quantity: i32,
    listed: bool,
    category_id: Option<CategoryId>,
    tag_ids: Vec<TagId>,
    details: Option<ItemDetails>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StoredItem {
    fn matches(&self, query: &ItemQuery, needle: Option<&str>) -> bool {
        if let Some(needle) = needle {
            let hit = [
                Some(self.title.as_str()),
                self.author.as_deref(),
                Some(self.description.as_str()),
                Some(self.code.as_str()),
            ]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(needle));
            if !hit {
                return false;
            }
        }
        if query.category.is_some() && self.category_id != query.category {
            return false;
        }
        if let Some(tag) = query.tag {
            if !self.tag_ids.contains(&tag) {
                return false;
            }
        }
        if let Some(min) = query.min_price {
            if !self.price.is_some_and(|price| price >= min) {
                return false;
            }
        }
        if let Some(max) = query.max_price {
            if !self.price.is_some_and(|price| price <= max) {
                return false;
            }
        }
        !query.available_only || (self.listed && self.quantity > 0)
    }
}

fn newest_first(a: &StoredItem, b: &StoredItem) -> Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

/// Items without a price sort last in both directions.
fn by_price(a: &StoredItem, b: &StoredItem, descending: bool) -> Ordering {
    match (a.price, b.price) {
        (Some(x), Some(y)) if descending => y.cmp(&x),
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare(order: ItemOrder, a: &StoredItem, b: &StoredItem) -> Ordering {
    let primary = match order {
        ItemOrder::Newest => Ordering::Equal,
        ItemOrder::Oldest => a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)),
        ItemOrder::TitleAsc => a.title.cmp(&b.title),
        ItemOrder::TitleDesc => b.title.cmp(&a.title),
        ItemOrder::PriceAsc => by_price(a, b, false),
        ItemOrder::PriceDesc => by_price(a, b, true),
    };
    primary.then_with(|| newest_first(a, b))
}

#[derive(Default)]
struct State {
    categories: HashMap<CategoryId, Category>,
    tags: HashMap<TagId, Tag>,
    items: HashMap<ItemId, StoredItem>,
    borrowers: HashMap<BorrowerId, Borrower>,
    loans: HashMap<LoanId, Loan>,
}

impl State {
    fn materialize(&self, item: &StoredItem) -> Item {
        let category = item
            .category_id
            .and_then(|id| self.categories.get(&id))
            .map(|c| CategoryRef {
                id: c.id,
                name: c.name.clone(),
            });
        let mut tags: Vec<TagRef> = item
            .tag_ids
            .iter()
            .filter_map(|id| self.tags.get(id))
            .map(|t| TagRef {
                id: t.id,
                name: t.name.clone(),
            })
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));

        Item {
            id: item.id,
            title: item.title.clone(),
            author: item.author.clone(),
            description: item.description.clone(),
            code: item.code.clone(),
            price: item.price,
            quantity: item.quantity,
            listed: item.listed,
            category,
            tags,
            details: item.details.clone(),
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }

    fn check_references(&self, input: &ItemInput) -> CatalogResult<()> {
        if let Some(id) = input.category_id {
            if !self.categories.contains_key(&id) {
                return Err(CatalogError::UnknownReference {
                    entity: "category",
                    id: id.raw(),
                });
            }
        }
        if let Some(id) = input.tag_ids.iter().find(|id| !self.tags.contains_key(id)) {
            return Err(CatalogError::UnknownReference {
                entity: "tag",
                id: id.raw(),
            });
        }
        Ok(())
    }

    fn check_code(&self, code: &str, except: Option<ItemId>) -> CatalogResult<()> {
        let taken = self
            .items
            .values()
            .any(|item| item.code == code && Some(item.id) != except);
        if taken {
            return Err(CatalogError::DuplicateCode(code.to_string()));
        }
        Ok(())
    }

    fn check_category_name(&self, name: &str, except: Option<CategoryId>) -> CatalogResult<()> {
        if self
            .categories
            .values()
            .any(|c| c.name == name && Some(c.id) != except)
        {
            return Err(CatalogError::DuplicateName {
                entity: "category",
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn check_tag_name(&self, name: &str, except: Option<TagId>) -> CatalogResult<()> {
        if self
            .tags
            .values()
            .any(|t| t.name == name && Some(t.id) != except)
        {
            return Err(CatalogError::DuplicateName {
                entity: "tag",
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn insert_category(&mut self, input: LabelInput) -> Category {
        let now = crate::now();
        let category = Category {
            id: CategoryId::new(),
            name: input.name,
            description: input.description,
            created_at: now,
            updated_at: now,
        };
        self.categories.insert(category.id, category.clone());
        category
    }

    fn sorted_items<'a>(
        &'a self,
        order: ItemOrder,
        mut keep: impl FnMut(&StoredItem) -> bool,
    ) -> Vec<&'a StoredItem> {
        let mut items: Vec<&StoredItem> = self.items.values().filter(|i| keep(i)).collect();
        items.sort_by(|a, b| compare(order, a, b));
        items
    }
}

/// In-memory implementation of every repository.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn create_category(&self, input: LabelInput) -> CatalogResult<Category> {
        let input = input.normalized();
        let mut state = self.state.lock().await;
        state.check_category_name(&input.name, None)?;
        Ok(state.insert_category(input))
    }

    async fn update_category(&self, id: CategoryId, input: LabelInput) -> CatalogResult<Category> {
        let input = input.normalized();
        let mut state = self.state.lock().await;
        state.check_category_name(&input.name, Some(id))?;
        let category = state
            .categories
            .get_mut(&id)
            .ok_or_else(|| CatalogError::category_not_found(id))?;
        category.name = input.name;
        category.description = input.description;
        category.updated_at = crate::now();
        Ok(category.clone())
    }

    async fn delete_category(&self, id: CategoryId) -> CatalogResult<u64> {
        let mut state = self.state.lock().await;
        state
            .categories
            .remove(&id)
            .ok_or_else(|| CatalogError::category_not_found(id))?;

        let mut detached = 0;
        for item in state.items.values_mut() {
            if item.category_id == Some(id) {
                item.category_id = None;
                detached += 1;
            }
        }
        Ok(detached)
    }

    async fn find_category(&self, id: CategoryId) -> CatalogResult<Option<Category>> {
        Ok(self.state.lock().await.categories.get(&id).cloned())
    }

    async fn list_categories(&self) -> CatalogResult<Vec<CategorySummary>> {
        let state = self.state.lock().await;
        let mut categories: Vec<CategorySummary> = state
            .categories
            .values()
            .map(|category| CategorySummary {
                category: category.clone(),
                item_count: state
                    .items
                    .values()
                    .filter(|i| i.category_id == Some(category.id))
                    .count() as i64,
            })
            .collect();
        categories.sort_by(|a, b| a.category.name.cmp(&b.category.name));
        Ok(categories)
    }

    async fn category_named(&self, name: &str) -> CatalogResult<Category> {
        let input = LabelInput::named(name).normalized();
        let mut state = self.state.lock().await;
        if let Some(existing) = state.categories.values().find(|c| c.name == input.name) {
            return Ok(existing.clone());
        }
        Ok(state.insert_category(input))
    }

    async fn create_tag(&self, input: LabelInput) -> CatalogResult<Tag> {
        let input = input.normalized();
        let mut state = self.state.lock().await;
        state.check_tag_name(&input.name, None)?;
        let tag = Tag {
            id: TagId::new(),
            name: input.name,
            description: input.description,
            created_at: crate::now(),
        };
        state.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    async fn update_tag(&self, id: TagId, input: LabelInput) -> CatalogResult<Tag> {
        let input = input.normalized();
        let mut state = self.state.lock().await;
        state.check_tag_name(&input.name, Some(id))?;
        let tag = state
            .tags
            .get_mut(&id)
            .ok_or_else(|| CatalogError::tag_not_found(id))?;
        tag.name = input.name;
        tag.description = input.description;
        Ok(tag.clone())
    }

    async fn delete_tag(&self, id: TagId) -> CatalogResult<u64> {
        let mut state = self.state.lock().await;
        state
            .tags
            .remove(&id)
            .ok_or_else(|| CatalogError::tag_not_found(id))?;

        let mut untagged = 0;
        for item in state.items.values_mut() {
            let before = item.tag_ids.len();
            item.tag_ids.retain(|t| *t != id);
            if item.tag_ids.len() != before {
                untagged += 1;
            }
        }
        Ok(untagged)
    }

    async fn list_tags(&self) -> CatalogResult<Vec<TagSummary>> {
        let state = self.state.lock().await;
        let mut tags: Vec<TagSummary> = state
            .tags
            .values()
            .map(|tag| TagSummary {
                tag: tag.clone(),
                item_count: state
                    .items
                    .values()
                    .filter(|i| i.tag_ids.contains(&tag.id))
                    .count() as i64,
            })
            .collect();
        tags.sort_by(|a, b| a.tag.name.cmp(&b.tag.name));
        Ok(tags)
    }

    async fn create_item(&self, input: ItemInput) -> CatalogResult<Item> {
        let input = input.normalized();
        let mut state = self.state.lock().await;
        state.check_code(&input.code, None)?;
        state.check_references(&input)?;

        let now = crate::now();
        let item = StoredItem {
            id: ItemId::new(),
            title: input.title,
            author: input.author,
            description: input.description,
            code: input.code,
            price: input.price,
            quantity: input.quantity,
            listed: input.listed,
            category_id: input.category_id,
            tag_ids: input.tag_ids,
            details: input.details,
            created_at: now,
            updated_at: now,
        };
        let created = state.materialize(&item);
        state.items.insert(item.id, item);
        Ok(created)
    }

    async fn update_item(&self, id: ItemId, input: ItemInput) -> CatalogResult<Item> {
        let input = input.normalized();
        let mut state = self.state.lock().await;
        if !state.items.contains_key(&id) {
            return Err(CatalogError::item_not_found(id));
        }
        state.check_code(&input.code, Some(id))?;
        state.check_references(&input)?;

        let item = state
            .items
            .get_mut(&id)
            .ok_or_else(|| CatalogError::item_not_found(id))?;
        item.title = input.title;
        item.author = input.author;
        item.description = input.description;
        item.code = input.code;
        item.price = input.price;
        item.quantity = input.quantity;
        item.listed = input.listed;
        item.category_id = input.category_id;
        item.tag_ids = input.tag_ids;
        item.details = input.details;
        item.updated_at = crate::now();

        let item = item.clone();
        Ok(state.materialize(&item))
    }

    async fn delete_item(&self, id: ItemId) -> CatalogResult<()> {
        let mut state = self.state.lock().await;
        if !state.items.contains_key(&id) {
            return Err(CatalogError::item_not_found(id));
        }
        if state.loans.values().any(|loan| loan.item_id == id) {
            return Err(CatalogError::ItemHasLoans(id));
        }
        state.items.remove(&id);
        Ok(())
    }

    async fn find_item(&self, id: ItemId) -> CatalogResult<Option<Item>> {
        let state = self.state.lock().await;
        Ok(state.items.get(&id).map(|item| state.materialize(item)))
    }

    async fn list_items(&self, query: &ItemQuery) -> CatalogResult<Page<Item>> {
        let needle = query.search_term().map(str::to_lowercase);
        let state = self.state.lock().await;
        let matching = state.sorted_items(query.order, |item| {
            item.matches(query, needle.as_deref())
        });

        let window = PageWindow::resolve(matching.len() as u64, query.page, query.page_size);
        let items = matching
            .iter()
            .skip(usize::try_from(window.offset).unwrap_or(usize::MAX))
            .take(window.page_size as usize)
            .map(|item| state.materialize(item))
            .collect();
        Ok(Page::new(items, matching.len() as u64, window))
    }

    async fn related_items(&self, id: ItemId, limit: u32) -> CatalogResult<Vec<Item>> {
        let state = self.state.lock().await;
        let item = state
            .items
            .get(&id)
            .ok_or_else(|| CatalogError::item_not_found(id))?;
        let Some(category) = item.category_id else {
            return Ok(Vec::new());
        };

        Ok(state
            .sorted_items(ItemOrder::Newest, |other| {
                other.id != id && other.category_id == Some(category)
            })
            .into_iter()
            .take(limit as usize)
            .map(|item| state.materialize(item))
            .collect())
    }

    async fn upsert_imported(&self, imported: ImportedItem) -> CatalogResult<Upserted<Item>> {
        let mut state = self.state.lock().await;
        if let Some(id) = imported.category_id {
            if !state.categories.contains_key(&id) {
                return Err(CatalogError::UnknownReference {
                    entity: "category",
                    id: id.raw(),
                });
            }
        }

        let now = crate::now();
        let existing = state
            .items
            .values()
            .find(|item| item.code == imported.code)
            .map(|item| item.id);

        match existing {
            Some(id) => {
                let item = state
                    .items
                    .get_mut(&id)
                    .ok_or_else(|| CatalogError::item_not_found(id))?;
                item.title = imported.title;
                item.author = Some(imported.author);
                item.category_id = imported.category_id;
                item.quantity = imported.quantity;
                item.listed = imported.quantity > 0;
                item.updated_at = now;
                let item = item.clone();
                Ok(Upserted::Updated(state.materialize(&item)))
            }
            None => {
                let item = StoredItem {
                    id: ItemId::new(),
                    title: imported.title,
                    author: Some(imported.author),
                    description: String::new(),
                    code: imported.code,
                    price: None,
                    quantity: imported.quantity,
                    listed: imported.quantity > 0,
                    category_id: imported.category_id,
                    tag_ids: Vec::new(),
                    details: None,
                    created_at: now,
                    updated_at: now,
                };
                let created = state.materialize(&item);
                state.items.insert(item.id, item);
                Ok(Upserted::Created(created))
            }
        }
    }

    async fn stats(&self, recent: u32) -> CatalogResult<CatalogStats> {
        let state = self.state.lock().await;
        let recent_items = state
            .sorted_items(ItemOrder::Newest, |_| true)
            .into_iter()
            .take(recent as usize)
            .map(|item| state.materialize(item))
            .collect();

        Ok(CatalogStats {
            total_items: state.items.len() as u64,
            total_categories: state.categories.len() as u64,
            total_tags: state.tags.len() as u64,
            available_items: state
                .items
                .values()
                .filter(|i| i.listed && i.quantity > 0)
                .count() as u64,
            recent_items,
        })
    }
}

#[async_trait]
impl BorrowerRepository for MemoryStore {
    async fn create_borrower(&self, input: BorrowerInput) -> Result<Borrower, BorrowerError> {
        let input = input.normalized();
        let mut state = self.state.lock().await;
        if state.borrowers.values().any(|b| b.email == input.email) {
            return Err(BorrowerError::DuplicateEmail(input.email));
        }
        let borrower = Borrower {
            id: BorrowerId::new(),
            name: input.name,
            email: input.email,
            created_at: crate::now(),
        };
        state.borrowers.insert(borrower.id, borrower.clone());
        Ok(borrower)
    }

    async fn find_borrower(&self, id: BorrowerId) -> Result<Option<Borrower>, BorrowerError> {
        Ok(self.state.lock().await.borrowers.get(&id).cloned())
    }

    async fn list_borrowers(&self) -> Result<Vec<Borrower>, BorrowerError> {
        let state = self.state.lock().await;
        let mut borrowers: Vec<Borrower> = state.borrowers.values().cloned().collect();
        borrowers.sort_by(|a, b| a.name.cmp(&b.name).then(a.email.cmp(&b.email)));
        Ok(borrowers)
    }
}

fn newest_loans_first(loans: &mut [Loan]) {
    loans.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl LedgerRepository for MemoryStore {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            guard,
            quantities: HashMap::new(),
            loans: HashMap::new(),
        }))
    }

    async fn find_loan(&self, id: LoanId) -> LedgerResult<Option<Loan>> {
        Ok(self.state.lock().await.loans.get(&id).cloned())
    }

    async fn list_loans(&self, filter: LoanFilter) -> LedgerResult<Vec<Loan>> {
        let state = self.state.lock().await;
        let mut loans: Vec<Loan> = state
            .loans
            .values()
            .filter(|loan| filter.matches(loan))
            .cloned()
            .collect();
        newest_loans_first(&mut loans);
        Ok(loans)
    }
}

/// Holds the store lock for its whole life. Writes are staged and only
/// applied by `commit`.
struct MemoryTransaction {
    guard: OwnedMutexGuard<State>,
    quantities: HashMap<ItemId, i32>,
    loans: HashMap<LoanId, Loan>,
}

impl MemoryTransaction {
    fn quantity(&self, item_id: ItemId) -> Option<i32> {
        self.quantities
            .get(&item_id)
            .copied()
            .or_else(|| self.guard.items.get(&item_id).map(|item| item.quantity))
    }

    fn loan(&self, loan_id: LoanId) -> Option<&Loan> {
        self.loans
            .get(&loan_id)
            .or_else(|| self.guard.loans.get(&loan_id))
    }
}

#[async_trait]
impl LedgerTransaction for MemoryTransaction {
    async fn item_stock(&mut self, item_id: ItemId) -> LedgerResult<Option<ItemStock>> {
        let Some(item) = self.guard.items.get(&item_id) else {
            return Ok(None);
        };
        let listed = item.listed;
        Ok(self
            .quantity(item_id)
            .map(|quantity| ItemStock { quantity, listed }))
    }

    async fn borrower_exists(&mut self, borrower_id: BorrowerId) -> LedgerResult<bool> {
        Ok(self.guard.borrowers.contains_key(&borrower_id))
    }

    async fn has_open_loan(
        &mut self,
        item_id: ItemId,
        borrower_id: BorrowerId,
    ) -> LedgerResult<bool> {
        let open = |loan: &Loan| {
            loan.item_id == item_id && loan.borrower_id == borrower_id && loan.is_open()
        };
        let staged = self.loans.values().any(open);
        let stored = self
            .guard
            .loans
            .values()
            .filter(|loan| !self.loans.contains_key(&loan.id))
            .any(open);
        Ok(staged || stored)
    }

    async fn take_one(&mut self, item_id: ItemId) -> LedgerResult<bool> {
        match self.quantity(item_id) {
            Some(quantity) if quantity > 0 => {
                self.quantities.insert(item_id, quantity - 1);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn put_back(&mut self, item_id: ItemId) -> LedgerResult<()> {
        let quantity = self
            .quantity(item_id)
            .ok_or_else(|| anyhow!("item {item_id} vanished while on loan"))?;
        let quantity = quantity
            .checked_add(1)
            .ok_or(LedgerError::StockOverflow(item_id))?;
        self.quantities.insert(item_id, quantity);
        Ok(())
    }

    async fn insert_loan(&mut self, loan: &Loan) -> LedgerResult<()> {
        self.loans.insert(loan.id, loan.clone());
        Ok(())
    }

    async fn loan_for_update(&mut self, loan_id: LoanId) -> LedgerResult<Option<Loan>> {
        Ok(self.loan(loan_id).cloned())
    }

    async fn close_loan(&mut self, loan_id: LoanId, closed_at: DateTime<Utc>) -> LedgerResult<()> {
        let mut loan = self
            .loan(loan_id)
            .cloned()
            .ok_or_else(|| anyhow!("loan {loan_id} vanished inside its transaction"))?;
        loan.closed = true;
        loan.closed_at = Some(closed_at);
        self.loans.insert(loan_id, loan);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        let MemoryTransaction {
            mut guard,
            quantities,
            loans,
        } = *self;

        let now = crate::now();
        for (item_id, quantity) in quantities {
            let item = guard
                .items
                .get_mut(&item_id)
                .ok_or_else(|| anyhow!("item {item_id} vanished inside its transaction"))?;
            item.quantity = quantity;
            item.updated_at = now;
        }
        guard.loans.extend(loans);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn item(code: &str) -> ItemInput {
        serde_json::from_value(serde_json::json!({
            "title": format!("Title {code}"),
            "code": code,
        }))
        .unwrap()
    }

    fn priced(code: &str, title: &str, price: Option<&str>) -> ItemInput {
        let mut input = item(code);
        input.title = title.to_string();
        input.price = price.map(|p| p.parse().unwrap());
        input
    }

    #[tokio::test]
    async fn deleting_a_category_detaches_its_items() {
        let store = MemoryStore::new();
        let books = store.create_category(LabelInput::named("Books")).await.unwrap();
        let mut input = item("B-1");
        input.category_id = Some(books.id);
        let created = store.create_item(input).await.unwrap();
        assert_eq!(created.category.as_ref().map(|c| c.name.as_str()), Some("Books"));

        assert_eq!(store.delete_category(books.id).await.unwrap(), 1);
        let reloaded = store.find_item(created.id).await.unwrap().unwrap();
        assert!(reloaded.category.is_none());
    }

    #[tokio::test]
    async fn deleting_a_tag_untags_items() {
        let store = MemoryStore::new();
        let tag = store.create_tag(LabelInput::named("classic")).await.unwrap();
        let mut input = item("B-2");
        input.tag_ids = vec![tag.id];
        let created = store.create_item(input).await.unwrap();
        assert_eq!(created.tags.len(), 1);

        assert_eq!(store.delete_tag(tag.id).await.unwrap(), 1);
        assert!(store.find_item(created.id).await.unwrap().unwrap().tags.is_empty());
    }

    #[tokio::test]
    async fn codes_and_names_are_unique() {
        let store = MemoryStore::new();
        store.create_item(item("DUP")).await.unwrap();
        assert!(matches!(
            store.create_item(item("DUP")).await,
            Err(CatalogError::DuplicateCode(_))
        ));

        store.create_category(LabelInput::named("Games")).await.unwrap();
        assert!(matches!(
            store.create_category(LabelInput::named(" Games ")).await,
            Err(CatalogError::DuplicateName { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_references_are_rejected() {
        let store = MemoryStore::new();
        let mut input = item("REF");
        input.category_id = Some(CategoryId::new());
        assert!(matches!(
            store.create_item(input).await,
            Err(CatalogError::UnknownReference { entity: "category", .. })
        ));

        let mut input = item("REF");
        input.tag_ids = vec![TagId::new()];
        assert!(matches!(
            store.create_item(input).await,
            Err(CatalogError::UnknownReference { entity: "tag", .. })
        ));
    }

    #[tokio::test]
    async fn category_named_is_get_or_create() {
        let store = MemoryStore::new();
        let first = store.category_named("Novels").await.unwrap();
        let again = store.category_named("Novels").await.unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(store.list_categories().await.unwrap().len(), 1);
    }

    #[rstest]
    #[case(ItemOrder::TitleAsc, &["alpha", "bravo", "charlie"])]
    #[case(ItemOrder::TitleDesc, &["charlie", "bravo", "alpha"])]
    #[case(ItemOrder::PriceAsc, &["bravo", "alpha", "charlie"])]
    #[case(ItemOrder::PriceDesc, &["alpha", "bravo", "charlie"])]
    #[tokio::test]
    async fn listing_orders(#[case] order: ItemOrder, #[case] expected: &[&str]) {
        let store = MemoryStore::new();
        store.create_item(priced("O-1", "alpha", Some("20.00"))).await.unwrap();
        store.create_item(priced("O-2", "bravo", Some("5.50"))).await.unwrap();
        store.create_item(priced("O-3", "charlie", None)).await.unwrap();

        let page = store
            .list_items(&ItemQuery {
                order,
                page: 1,
                page_size: 10,
                ..ItemQuery::default()
            })
            .await
            .unwrap();
        let titles: Vec<&str> = page.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, expected);
    }

    #[tokio::test]
    async fn listing_filters_and_clamps_pages() {
        let store = MemoryStore::new();
        for n in 0..5 {
            let mut input = priced(&format!("F-{n}"), &format!("Rust vol {n}"), Some("10.00"));
            input.quantity = n % 2;
            store.create_item(input).await.unwrap();
        }
        store
            .create_item(priced("F-X", "Cooking", Some("30.00")))
            .await
            .unwrap();

        let query = ItemQuery {
            search: Some("RUST".to_string()),
            page: 7,
            page_size: 2,
            ..ItemQuery::default()
        };
        let page = store.list_items(&query).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.pages, 3);
        assert_eq!(page.page, 3);
        assert_eq!(page.items.len(), 1);

        let available = store
            .list_items(&ItemQuery {
                available_only: true,
                min_price: Some("9".parse().unwrap()),
                max_price: Some("11".parse().unwrap()),
                page: 1,
                page_size: 10,
                ..ItemQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(available.total, 2);
    }

    #[tokio::test]
    async fn related_items_share_the_category() {
        let store = MemoryStore::new();
        let cat = store.create_category(LabelInput::named("Maps")).await.unwrap();
        let mut ids = Vec::new();
        for n in 0..6 {
            let mut input = item(&format!("M-{n}"));
            input.category_id = Some(cat.id);
            ids.push(store.create_item(input).await.unwrap().id);
        }
        store.create_item(item("OTHER")).await.unwrap();

        let related = store.related_items(ids[0], 4).await.unwrap();
        assert_eq!(related.len(), 4);
        assert!(related.iter().all(|i| i.id != ids[0]));
    }

    #[tokio::test]
    async fn upsert_by_code() {
        let store = MemoryStore::new();
        let imported = ImportedItem {
            code: "IMP-1".to_string(),
            title: "Dune".to_string(),
            author: "Herbert".to_string(),
            category_id: None,
            quantity: 0,
        };
        let created = store.upsert_imported(imported.clone()).await.unwrap();
        assert!(matches!(&created, Upserted::Created(item) if !item.listed));

        let updated = store
            .upsert_imported(ImportedItem {
                quantity: 3,
                ..imported
            })
            .await
            .unwrap();
        let Upserted::Updated(item) = updated else {
            panic!("expected an update");
        };
        assert!(item.listed);
        assert_eq!(item.quantity, 3);
        assert_eq!(store.stats(6).await.unwrap().total_items, 1);
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let store = MemoryStore::new();
        let created = store.create_item(item("TX-1")).await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            assert!(tx.take_one(created.id).await.unwrap());
            assert!(!tx.take_one(created.id).await.unwrap());
            tx.insert_loan(&Loan::open(created.id, BorrowerId::new(), crate::now()))
                .await
                .unwrap();
        }

        assert_eq!(store.find_item(created.id).await.unwrap().unwrap().quantity, 1);
        assert!(store.list_loans(LoanFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_borrower_email_is_rejected() {
        let store = MemoryStore::new();
        let input = BorrowerInput {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
        };
        store.create_borrower(input.clone()).await.unwrap();
        let again = BorrowerInput {
            email: "ADA@example.com".to_string(),
            ..input
        };
        assert!(matches!(
            store.create_borrower(again).await,
            Err(BorrowerError::DuplicateEmail(_))
        ));
    }
}
