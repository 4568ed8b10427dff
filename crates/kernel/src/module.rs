//! The unit of composition: each domain area (catalog, borrowers, loans)
//! ships as one [`Module`] that brings its routes, its schema and its
//! OpenAPI fragment.

use async_trait::async_trait;
use axum::Router;

/// Borrowed view of the application handed to lifecycle hooks.
pub struct InitCtx<'a> {
    pub settings: &'a crate::settings::Settings,
}

/// One schema step owned by a module.
///
/// `up` may hold several statements. It runs in a single transaction and is
/// recorded as `(module, id)`, so ids only need to be unique per module.
#[derive(Debug, Clone)]
pub struct Migration {
    pub id: &'static str,
    pub up: &'static str,
}

#[async_trait]
pub trait Module: Sync + Send {
    /// Registry key and mount point: routes are served under `/api/{name}`.
    fn name(&self) -> &'static str;

    fn routes(&self) -> Router {
        Router::new()
    }

    /// Paths are relative to the module mount point; the HTTP layer prefixes
    /// them when merging.
    fn openapi(&self) -> Option<serde_json::Value> {
        None
    }

    /// Applied in the order returned, after the migrations of every module
    /// registered earlier.
    fn migrations(&self) -> Vec<Migration> {
        vec![]
    }

    /// Runs after storage is migrated and before any request is served.
    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs once the server has drained, in reverse registration order.
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
