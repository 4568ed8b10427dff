//! Bulk import of the library sheet.
//!
//! Rows are keyed by item code: an unknown code creates an item, a known one
//! refreshes its title, author, category and stock. Bad rows are reported
//! and skipped; the rest of the file still loads.

use std::io::Read;

use anyhow::Context;
use serde::Deserialize;

use super::models::{ImportedItem, Upserted, MAX_QUANTITY};
use super::repository::CatalogRepository;

/// One CSV record. The headings of the original sheet are accepted too.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ImportRow {
    #[serde(alias = "TÍTULO", alias = "TITULO")]
    title: String,
    #[serde(alias = "AUTOR")]
    author: String,
    #[serde(alias = "TIPO")]
    category: String,
    #[serde(alias = "CÓDIGO", alias = "CODIGO")]
    code: String,
    #[serde(alias = "STOCK")]
    stock: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedRow {
    title: String,
    author: String,
    category: Option<String>,
    code: String,
    quantity: i32,
}

impl ImportRow {
    fn parse(self) -> Result<ParsedRow, String> {
        if self.author.is_empty() {
            return Err(format!("missing author for '{}'", self.title));
        }
        if self.title.is_empty() || self.code.is_empty() {
            return Err(format!("missing title or code for '{}'", self.title));
        }
        if self.title.chars().count() > 300 || self.author.chars().count() > 200 {
            return Err(format!("title or author too long for code '{}'", self.code));
        }
        if self.code.chars().count() > 50 || self.category.chars().count() > 100 {
            return Err(format!("code or category too long for '{}'", self.title));
        }

        let quantity = match self.stock.as_str() {
            "" => 1,
            raw => match raw.parse::<i32>() {
                Ok(n) if (0..=MAX_QUANTITY).contains(&n) => n,
                _ => return Err(format!("invalid stock '{raw}' for code '{}'", self.code)),
            },
        };

        Ok(ParsedRow {
            title: self.title,
            author: self.author,
            category: Some(self.category).filter(|c| !c.is_empty()),
            code: self.code,
            quantity,
        })
    }
}

/// A row that was not imported, with its 1-based line in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ImportReport {
    /// Rows that parsed; in a dry run nothing else is counted.
    pub accepted: usize,
    pub created: usize,
    pub updated: usize,
    /// Malformed rows.
    pub skipped: Vec<RejectedRow>,
    /// Well-formed rows the store refused.
    pub failed: Vec<RejectedRow>,
}

pub async fn import_csv<R: Read>(
    repo: &dyn CatalogRepository,
    input: R,
    dry_run: bool,
) -> anyhow::Result<ImportReport> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input);
    let headers = reader.headers().context("failed to read CSV headers")?.clone();

    let mut report = ImportReport::default();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                let line = err.position().map(|p| p.line()).unwrap_or_default();
                report.skipped.push(RejectedRow {
                    line,
                    reason: err.to_string(),
                });
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        let parsed = record
            .deserialize::<ImportRow>(Some(&headers))
            .map_err(|err| err.to_string())
            .and_then(ImportRow::parse);
        let row = match parsed {
            Ok(row) => row,
            Err(reason) => {
                tracing::warn!(line, %reason, "skipping import row");
                report.skipped.push(RejectedRow { line, reason });
                continue;
            }
        };

        report.accepted += 1;
        if dry_run {
            continue;
        }

        match store_row(repo, row).await {
            Ok(Upserted::Created(_)) => report.created += 1,
            Ok(Upserted::Updated(_)) => report.updated += 1,
            Err(err) => {
                tracing::error!(line, error = %err, "import row failed");
                report.failed.push(RejectedRow {
                    line,
                    reason: err.to_string(),
                });
            }
        }
    }

    tracing::info!(
        accepted = report.accepted,
        created = report.created,
        updated = report.updated,
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        dry_run,
        "catalog import finished"
    );
    Ok(report)
}

async fn store_row(
    repo: &dyn CatalogRepository,
    row: ParsedRow,
) -> anyhow::Result<Upserted<super::models::Item>> {
    let category_id = match row.category {
        Some(name) => Some(repo.category_named(&name).await?.id),
        None => None,
    };
    Ok(repo
        .upsert_imported(ImportedItem {
            code: row.code,
            title: row.title,
            author: row.author,
            category_id,
            quantity: row.quantity,
        })
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::catalog::models::ItemQuery;
    use crate::store::MemoryStore;
    use rstest::rstest;

    const SHEET: &str = "\
TÍTULO,AUTOR,TIPO,CÓDIGO,STOCK
Cien años de soledad,García Márquez,Novela,978-0307474728,2
Rayuela,Cortázar,Novela,978-8437604572,
Sin autor,,Novela,X-1,1
,Anónimo,Poesía,X-2,1
Ficciones,Borges,,X-3,abc
Pedro Páramo,Rulfo,Novela,X-4,0
";

    async fn items(store: &MemoryStore) -> Vec<crate::modules::catalog::models::Item> {
        store
            .list_items(&ItemQuery {
                order: crate::modules::catalog::models::ItemOrder::TitleAsc,
                page: 1,
                page_size: 50,
                ..ItemQuery::default()
            })
            .await
            .unwrap()
            .items
    }

    #[tokio::test]
    async fn imports_sheet_with_original_headings() {
        let store = MemoryStore::new();
        let report = import_csv(&store, SHEET.as_bytes(), false).await.unwrap();

        assert_eq!(report.created, 3);
        assert_eq!(report.updated, 0);
        assert_eq!(report.accepted, 3);
        let lines: Vec<u64> = report.skipped.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![4, 5, 6]);

        let items = items(&store).await;
        let rayuela = items.iter().find(|i| i.title == "Rayuela").unwrap();
        assert_eq!(rayuela.quantity, 1);
        assert!(rayuela.listed);
        let paramo = items.iter().find(|i| i.title == "Pedro Páramo").unwrap();
        assert!(!paramo.listed);

        let categories = store.list_categories().await.unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].item_count, 3);
    }

    #[tokio::test]
    async fn reimport_updates_by_code() {
        let store = MemoryStore::new();
        import_csv(&store, SHEET.as_bytes(), false).await.unwrap();

        let again = "title,author,category,code,stock\n\
                     Rayuela (2a ed.),Cortázar,Clásicos,978-8437604572,5\n";
        let report = import_csv(&store, again.as_bytes(), false).await.unwrap();
        assert_eq!((report.created, report.updated), (0, 1));

        let items = items(&store).await;
        assert_eq!(items.len(), 3);
        let rayuela = items.iter().find(|i| i.code == "978-8437604572").unwrap();
        assert_eq!(rayuela.title, "Rayuela (2a ed.)");
        assert_eq!(rayuela.quantity, 5);
        assert_eq!(rayuela.category.as_ref().unwrap().name, "Clásicos");
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let store = MemoryStore::new();
        let report = import_csv(&store, SHEET.as_bytes(), true).await.unwrap();
        assert_eq!(report.accepted, 3);
        assert_eq!(report.created, 0);
        assert!(items(&store).await.is_empty());
        assert!(store.list_categories().await.unwrap().is_empty());
    }

    #[rstest]
    #[case("", Some(1))]
    #[case("7", Some(7))]
    #[case("0", Some(0))]
    #[case("-2", None)]
    #[case("two", None)]
    #[case("1000001", None)]
    fn stock_parsing(#[case] stock: &str, #[case] expected: Option<i32>) {
        let row = ImportRow {
            title: "T".to_string(),
            author: "A".to_string(),
            category: String::new(),
            code: "C".to_string(),
            stock: stock.to_string(),
        };
        assert_eq!(row.parse().ok().map(|r| r.quantity), expected);
    }
}
