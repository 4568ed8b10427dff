//! Storage backends. Both implement every repository trait, so a single
//! store instance backs all modules and ledger transactions see catalog
//! writes.

use std::sync::Arc;

use sqlx::PgPool;

use crate::modules::borrowers::repository::BorrowerRepository;
use crate::modules::catalog::repository::CatalogRepository;
use crate::modules::loans::repository::LedgerRepository;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// The repositories handed to the modules.
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn CatalogRepository>,
    pub borrowers: Arc<dyn BorrowerRepository>,
    pub ledger: Arc<dyn LedgerRepository>,
}

impl Stores {
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            catalog: store.clone(),
            borrowers: store.clone(),
            ledger: store,
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            catalog: store.clone(),
            borrowers: store.clone(),
            ledger: store,
        }
    }
}
