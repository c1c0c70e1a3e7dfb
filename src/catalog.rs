//! Per-jurisdiction catalog of canonical regulated-item names
//!
//! Loaded once at process start and shared read-only afterwards. The catalog
//! is the closed vocabulary the mapper selects from: nothing outside it ever
//! reaches the precision retrieval path.

use std::collections::HashMap;

use sqlx::PgPool;
use tracing::info;

use crate::error::AdvisorError;

/// One record of the catalog source
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CatalogRecord {
    pub jurisdiction: String,
    pub item: String,
}

/// Immutable jurisdiction → canonical item names mapping
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: HashMap<String, Vec<String>>,
}

impl Catalog {
    /// Build from records, deduplicating while preserving first-seen order.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = CatalogRecord>,
    {
        let mut items: HashMap<String, Vec<String>> = HashMap::new();
        for rec in records {
            if rec.item.is_empty() {
                continue;
            }
            let list = items.entry(rec.jurisdiction).or_default();
            if !list.contains(&rec.item) {
                list.push(rec.item);
            }
        }
        Self { items }
    }

    /// Load the full catalog from the regulation store.
    pub async fn load(pool: &PgPool) -> Result<Self, AdvisorError> {
        let records = sqlx::query_as::<_, CatalogRecord>(
            r#"
            SELECT DISTINCT jurisdiction, item
            FROM regulation_chunks
            ORDER BY jurisdiction, item
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(|e| AdvisorError::Catalog(e.to_string()))?;

        let catalog = Self::from_records(records);
        info!(
            jurisdictions = catalog.items.len(),
            entries = catalog.items.values().map(Vec::len).sum::<usize>(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    /// Canonical item names for a jurisdiction. Empty slice when the
    /// jurisdiction is unknown.
    pub fn items_for(&self, jurisdiction: &str) -> &[String] {
        self.items
            .get(jurisdiction)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Jurisdiction codes present in the catalog
    pub fn jurisdictions(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
