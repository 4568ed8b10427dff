//! Postgres connectivity for the lending service.
//!
//! Modules own their schema as [`Migration`] fragments; this crate only knows
//! how to open a pool and apply those fragments exactly once.

use std::time::Duration;

use anyhow::Context;
use lending_kernel::{settings::DatabaseSettings, Migration};
use sqlx::{postgres::PgPoolOptions, PgPool};

const MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_migrations (
        module     TEXT        NOT NULL,
        id         TEXT        NOT NULL,
        applied_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (module, id)
    )
"#;

/// Open a connection pool using the configured limits.
pub async fn connect(settings: &DatabaseSettings) -> anyhow::Result<PgPool> {
    tracing::info!(
        target: "lending-db",
        max_connections = settings.max_connections,
        "connecting to postgres"
    );

    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(Duration::from_millis(settings.acquire_timeout_ms))
        .connect(&settings.url)
        .await
        .context("failed to connect to postgres")
}

/// Apply every migration not yet recorded in `schema_migrations`.
///
/// Migrations run in the order given, each in its own transaction together
/// with its bookkeeping row. Returns the number of migrations applied.
pub async fn migrate(pool: &PgPool, migrations: &[(String, Migration)]) -> anyhow::Result<usize> {
    sqlx::query(MIGRATIONS_TABLE)
        .execute(pool)
        .await
        .context("failed to create schema_migrations table")?;

    let mut applied = 0;
    for (module, migration) in migrations {
        let mut tx = pool.begin().await.context("failed to open transaction")?;

        let already: Option<(String,)> =
            sqlx::query_as("SELECT id FROM schema_migrations WHERE module = $1 AND id = $2")
                .bind(module)
                .bind(migration.id)
                .fetch_optional(&mut *tx)
                .await
                .context("failed to read schema_migrations")?;

        if already.is_some() {
            tracing::debug!(target: "lending-db", %module, id = migration.id, "migration already applied");
            continue;
        }

        tracing::info!(target: "lending-db", %module, id = migration.id, "applying migration");

        sqlx::raw_sql(migration.up)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("migration {}/{} failed", module, migration.id))?;

        sqlx::query("INSERT INTO schema_migrations (module, id) VALUES ($1, $2)")
            .bind(module)
            .bind(migration.id)
            .execute(&mut *tx)
            .await
            .context("failed to record migration")?;

        tx.commit()
            .await
            .with_context(|| format!("failed to commit migration {}/{}", module, migration.id))?;
        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixtures() -> Vec<(String, Migration)> {
        vec![
            (
                "shelf".to_string(),
                Migration {
                    id: "001_init",
                    up: "CREATE TABLE shelves (id BIGINT PRIMARY KEY); CREATE INDEX shelves_id ON shelves (id);",
                },
            ),
            (
                "shelf".to_string(),
                Migration {
                    id: "002_label",
                    up: "ALTER TABLE shelves ADD COLUMN label TEXT;",
                },
            ),
        ]
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL pointing at a disposable postgres"]
    async fn migrations_apply_once(pool: PgPool) {
        assert_eq!(migrate(&pool, &fixtures()).await.unwrap(), 2);
        assert_eq!(migrate(&pool, &fixtures()).await.unwrap(), 0);

        let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM schema_migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }
}
