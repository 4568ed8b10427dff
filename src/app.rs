//! Bootstrap: storage, module registry and the HTTP server.

use anyhow::Context;
use axum::Router;
use lending_kernel::{
    settings::{Settings, StorageBackend},
    InitCtx, ModuleRegistry,
};
use sqlx::PgPool;

use crate::modules;
use crate::store::Stores;

/// A fully wired application, ready to serve.
pub struct App {
    pub settings: Settings,
    pub stores: Stores,
    pub registry: ModuleRegistry,
    pool: Option<PgPool>,
}

impl App {
    pub fn router(&self) -> Router {
        lending_http::build_router(&self.registry, &self.settings)
    }

    /// Apply pending module migrations. A no-op on the memory backend.
    pub async fn migrate(&self) -> anyhow::Result<usize> {
        let Some(pool) = &self.pool else {
            tracing::info!("memory backend selected, no migrations to apply");
            return Ok(0);
        };
        let applied = lending_db::migrate(pool, &self.registry.collect_migrations()).await?;
        tracing::info!(applied, "database schema up to date");
        Ok(applied)
    }

    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}

/// Open storage for the configured backend and register every module.
///
/// Migrations are not applied here; see [`App::migrate`].
pub async fn build_app(settings: Settings) -> anyhow::Result<App> {
    let (stores, pool) = match settings.database.backend {
        StorageBackend::Memory => {
            tracing::warn!("using the in-memory backend, data is lost on restart");
            (Stores::in_memory(), None)
        }
        StorageBackend::Postgres => {
            let pool = lending_db::connect(&settings.database).await?;
            (Stores::postgres(pool.clone()), Some(pool))
        }
    };

    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, &stores, &settings)
        .context("failed to register modules")?;

    Ok(App {
        settings,
        stores,
        registry,
        pool,
    })
}

/// Serve until ctrl-c.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    tracing::info!(
        env = ?settings.environment,
        backend = ?settings.database.backend,
        "lending-app bootstrap starting"
    );

    let app = build_app(settings).await?;
    if app.settings.database.migrate_on_start {
        app.migrate().await?;
    }

    let ctx = InitCtx {
        settings: &app.settings,
    };
    app.registry.init_all(&ctx).await?;
    app.registry.start_all(&ctx).await?;

    let served = lending_http::start_server(&app.registry, &app.settings, shutdown_signal()).await;

    app.registry.stop_all().await?;
    app.close().await;
    served
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
}
