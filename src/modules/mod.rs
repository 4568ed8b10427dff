pub mod borrowers;
pub mod catalog;
pub mod loans;

use lending_kernel::{settings::Settings, ModuleRegistry};

use crate::store::Stores;

/// Register every domain module.
///
/// Order matters: loans reference both borrowers and catalog items, so their
/// tables must exist first.
pub fn register_all(
    registry: &mut ModuleRegistry,
    stores: &Stores,
    settings: &Settings,
) -> anyhow::Result<()> {
    registry.register(borrowers::create_module(stores.borrowers.clone()))?;
    registry.register(catalog::create_module(
        stores.catalog.clone(),
        settings.catalog.clone(),
    ))?;
    registry.register(loans::create_module(stores.ledger.clone()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modules_register_in_dependency_order() {
        let mut registry = ModuleRegistry::new();
        register_all(&mut registry, &Stores::in_memory(), &Settings::default()).unwrap();

        let names: Vec<&str> = registry.modules().map(|m| m.name()).collect();
        assert_eq!(names, vec!["borrowers", "catalog", "loans"]);

        let migrations: Vec<String> = registry
            .collect_migrations()
            .into_iter()
            .map(|(module, m)| format!("{module}/{}", m.id))
            .collect();
        assert_eq!(
            migrations,
            vec![
                "borrowers/001_init",
                "catalog/001_labels",
                "catalog/002_items",
                "loans/001_init",
            ]
        );
    }
}
