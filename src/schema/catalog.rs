//! Schema Catalog
//!
//! Table/column metadata for the visible part of the warehouse. A catalog is
//! immutable once loaded; [`CatalogHandle::refresh`] builds a complete new
//! snapshot (catalog plus search index) and swaps it in with a single write.

use crate::error::{QaError, Result};
use crate::schema::source::SchemaSource;
use crate::schema_rag::{build_search, SearchBackend, SimilaritySearch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnEntry {
    pub name: String,
    #[serde(default)]
    pub data_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

/// One table (or view) of the warehouse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub columns: Vec<ColumnEntry>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
}

impl SchemaEntry {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            columns: Vec::new(),
            description: None,
            visibility: Visibility::Visible,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_column(mut self, name: &str, data_type: &str, description: Option<&str>) -> Self {
        self.columns.push(ColumnEntry {
            name: name.to_string(),
            data_type: data_type.to_string(),
            description: description.map(str::to_string),
        });
        self
    }

    /// `namespace.name`, or just `name` without a namespace
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visibility == Visibility::Visible
    }

    /// Normalized identifier parts of the qualified name
    pub fn name_parts(&self) -> Vec<String> {
        identifier_parts(&self.qualified_name())
    }

    /// True when `reference` (already split into normalized parts) names this
    /// table, i.e. it is a suffix of the qualified name parts.
    pub fn matches_reference(&self, reference: &[String]) -> bool {
        let parts = self.name_parts();
        !reference.is_empty() && reference.len() <= parts.len() && parts.ends_with(reference)
    }
}

/// Split a possibly quoted, dotted identifier into lower-cased parts.
///
/// `awsdatacatalog."Sales".Orders` → `["awsdatacatalog", "sales", "orders"]`
pub fn identifier_parts(identifier: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for ch in identifier.trim().chars() {
        match ch {
            '"' | '`' => quoted = !quoted,
            '.' if !quoted => {
                parts.push(current.trim().to_lowercase());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    parts.push(current.trim().to_lowercase());
    parts.retain(|p| !p.is_empty());
    parts
}

/// True when a description carries the hidden marker as a whole word
pub fn is_hidden_description(description: Option<&str>, marker: &str) -> bool {
    let marker = marker.trim().to_lowercase();
    if marker.is_empty() {
        return false;
    }
    description
        .map(|d| {
            d.to_lowercase()
                .split(|c: char| !c.is_alphanumeric() && c != '_')
                .any(|word| word == marker)
        })
        .unwrap_or(false)
}

/// The visible tables of the warehouse, in declaration order
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    tables: Vec<SchemaEntry>,
}

impl SchemaCatalog {
    /// Build a catalog, dropping hidden entries and duplicate names
    pub fn new(tables: Vec<SchemaEntry>) -> Self {
        let mut seen = HashSet::new();
        let tables = tables
            .into_iter()
            .filter(|t| t.is_visible())
            .filter(|t| {
                let fresh = seen.insert(t.name_parts());
                if !fresh {
                    warn!("Duplicate table {} in catalog, keeping the first", t.qualified_name());
                }
                fresh
            })
            .collect();
        Self { tables }
    }

    pub fn tables(&self) -> &[SchemaEntry] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn qualified_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.qualified_name()).collect()
    }

    /// Resolve a table name. Qualified names match exactly; a bare or partial
    /// name matches only when exactly one table ends with it.
    pub fn get(&self, name: &str) -> Option<&SchemaEntry> {
        let parts = identifier_parts(name);
        if parts.is_empty() {
            return None;
        }

        if let Some(exact) = self.tables.iter().find(|t| t.name_parts() == parts) {
            return Some(exact);
        }

        let mut matches = self.tables.iter().filter(|t| t.matches_reference(&parts));
        match (matches.next(), matches.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    }

    /// Index of a table in declaration order
    pub fn position(&self, entry: &SchemaEntry) -> Option<usize> {
        let parts = entry.name_parts();
        self.tables.iter().position(|t| t.name_parts() == parts)
    }
}

/// A loaded catalog together with the search index built over it
pub struct CatalogSnapshot {
    pub catalog: SchemaCatalog,
    pub search: Option<Arc<dyn SimilaritySearch>>,
    pub loaded_at: DateTime<Utc>,
}

impl CatalogSnapshot {
    pub fn new(catalog: SchemaCatalog, search: Option<Arc<dyn SimilaritySearch>>) -> Self {
        Self {
            catalog,
            search,
            loaded_at: Utc::now(),
        }
    }
}

/// Reads the schema source, applies hidden filtering and builds the index
pub struct CatalogLoader {
    source: Arc<dyn SchemaSource>,
    search_backend: SearchBackend,
    hidden_marker: String,
}

impl CatalogLoader {
    pub fn new(source: Arc<dyn SchemaSource>, search_backend: SearchBackend, hidden_marker: impl Into<String>) -> Self {
        Self {
            source,
            search_backend,
            hidden_marker: hidden_marker.into(),
        }
    }

    pub async fn load(&self) -> Result<CatalogSnapshot> {
        let listed = self.source.list_tables().await?;
        let listed_count = listed.len();
        let mut tables = Vec::with_capacity(listed_count);

        for mut table in listed {
            if !table.is_visible() || is_hidden_description(table.description.as_deref(), &self.hidden_marker) {
                debug!("Skipping hidden table {}", table.qualified_name());
                continue;
            }

            let columns = self.source.list_columns(&table).await?;
            table.columns = columns
                .into_iter()
                .filter(|c| !is_hidden_description(c.description.as_deref(), &self.hidden_marker))
                .collect();

            if table.columns.is_empty() {
                warn!("Table {} has no visible columns", table.qualified_name());
            }
            tables.push(table);
        }

        let catalog = SchemaCatalog::new(tables);
        info!(
            "Loaded schema catalog from {}: {} visible of {} tables",
            self.source.name(),
            catalog.len(),
            listed_count
        );

        let search = build_search(&self.search_backend, &catalog).await?;
        Ok(CatalogSnapshot::new(catalog, search))
    }
}

/// Shared, atomically replaceable catalog
pub struct CatalogHandle {
    loader: Option<CatalogLoader>,
    current: RwLock<Arc<CatalogSnapshot>>,
}

impl CatalogHandle {
    /// Load the first snapshot
    pub async fn load(loader: CatalogLoader) -> Result<Self> {
        let snapshot = loader.load().await?;
        Ok(Self {
            loader: Some(loader),
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// A fixed snapshot that cannot be refreshed
    pub fn fixed(snapshot: CatalogSnapshot) -> Self {
        Self {
            loader: None,
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Reload from the source and replace the current snapshot. The old
    /// snapshot stays valid for turns already holding it.
    pub async fn refresh(&self) -> Result<usize> {
        let loader = self
            .loader
            .as_ref()
            .ok_or_else(|| QaError::Schema("This catalog has no source to refresh from".to_string()))?;

        let snapshot = Arc::new(loader.load().await?);
        let count = snapshot.catalog.len();

        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = snapshot;

        info!("Schema catalog refreshed: {} visible tables", count);
        Ok(count)
    }
}
