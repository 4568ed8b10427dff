//! Lending application library
//!
//! Domain modules (catalog, borrowers, loans), their storage backends and the
//! bootstrap that wires them into the lending framework crates.

#![recursion_limit = "256"]

use chrono::{DateTime, SubsecRound, Utc};

pub mod app;
pub mod error;
pub mod ids;
pub mod modules;
pub mod store;

pub use app::{build_app, run};
pub use store::Stores;

/// Current time at the microsecond precision Postgres stores.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
