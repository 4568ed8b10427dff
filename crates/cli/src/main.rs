use std::{fs::File, path::PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use lending_app::modules::catalog::import::import_csv;
use lending_kernel::settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "lending-cli", version, about = "Catalog and loan ledger service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve,
    /// Apply pending schema migrations and exit
    Migrate,
    /// Load items from a CSV sheet, upserting by code
    Import {
        /// CSV file with title, author, category, code and stock columns
        path: PathBuf,
        /// Parse and validate only, write nothing
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the merged OpenAPI document
    Openapi,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load().context("failed to load lending settings")?;
    lending_telemetry::init(&settings.telemetry);

    match cli.command {
        Command::Serve => lending_app::run(settings).await,
        Command::Migrate => {
            let app = lending_app::build_app(settings).await?;
            let applied = app.migrate().await?;
            println!("applied {applied} migration(s)");
            app.close().await;
            Ok(())
        }
        Command::Import { path, dry_run } => import(settings, path, dry_run).await,
        Command::Openapi => {
            let app = lending_app::build_app(settings).await?;
            let document = lending_http::router::merged_openapi(&app.registry);
            println!("{}", serde_json::to_string_pretty(&document)?);
            Ok(())
        }
    }
}

async fn import(settings: Settings, path: PathBuf, dry_run: bool) -> anyhow::Result<()> {
    let file = File::open(&path).with_context(|| format!("cannot open {}", path.display()))?;

    let app = lending_app::build_app(settings).await?;
    if app.settings.database.migrate_on_start && !dry_run {
        app.migrate().await?;
    }

    let report = import_csv(app.stores.catalog.as_ref(), file, dry_run).await?;
    app.close().await;
    tracing::info!(
        path = %path.display(),
        dry_run,
        created = report.created,
        updated = report.updated,
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "import finished"
    );

    if dry_run {
        println!("dry run: {} row(s) would be imported", report.accepted);
    } else {
        println!("created: {}", report.created);
        println!("updated: {}", report.updated);
    }
    for row in &report.skipped {
        println!("skipped line {}: {}", row.line, row.reason);
    }
    for row in &report.failed {
        println!("failed line {}: {}", row.line, row.reason);
    }
    Ok(())
}
