//! Core traits, layered settings, and the module registry shared by every
//! crate of the lending service.

pub mod module;
pub mod registry;
pub mod settings;

pub use module::{InitCtx, Migration, Module};
pub use registry::ModuleRegistry;
