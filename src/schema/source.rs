//! Schema introspection collaborator

use crate::error::{QaError, Result};
use crate::schema::catalog::{ColumnEntry, SchemaEntry};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Lists tables and their columns. Implementations return everything they
/// see; hidden filtering happens in the catalog loader.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    fn name(&self) -> &str;

    async fn list_tables(&self) -> Result<Vec<SchemaEntry>>;

    async fn list_columns(&self, table: &SchemaEntry) -> Result<Vec<ColumnEntry>>;
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    tables: Vec<SchemaEntry>,
}

/// Catalog described in a JSON file:
///
/// ```json
/// {"tables": [{"namespace": "public", "name": "orders", "description": "...",
///              "columns": [{"name": "id", "data_type": "integer"}]}]}
/// ```
///
/// The file is re-read on every `list_tables`, so a catalog refresh picks up
/// edits.
pub struct FileSchemaSource {
    path: PathBuf,
    last_read: RwLock<Vec<SchemaEntry>>,
}

impl FileSchemaSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            last_read: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SchemaSource for FileSchemaSource {
    fn name(&self) -> &str {
        "schema file"
    }

    async fn list_tables(&self) -> Result<Vec<SchemaEntry>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| QaError::Schema(format!("Failed to read schema file {}: {}", self.path.display(), e)))?;
        let file: CatalogFile = serde_json::from_str(&content)
            .map_err(|e| QaError::Schema(format!("Invalid schema file {}: {}", self.path.display(), e)))?;

        *self.last_read.write().unwrap_or_else(|p| p.into_inner()) = file.tables.clone();

        Ok(file
            .tables
            .into_iter()
            .map(|mut t| {
                t.columns.clear();
                t
            })
            .collect())
    }

    async fn list_columns(&self, table: &SchemaEntry) -> Result<Vec<ColumnEntry>> {
        let tables = self.last_read.read().unwrap_or_else(|p| p.into_inner());
        tables
            .iter()
            .find(|t| t.qualified_name() == table.qualified_name())
            .map(|t| t.columns.clone())
            .ok_or_else(|| QaError::Schema(format!("Unknown table {}", table.qualified_name())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::catalog::{CatalogLoader, Visibility};
    use crate::schema_rag::SearchBackend;
    use std::sync::Arc;

    const CATALOG: &str = r#"{
        "tables": [
            {"namespace": "public", "name": "orders", "description": "One row per order",
             "columns": [
                {"name": "order_id", "data_type": "integer"},
                {"name": "placed_at", "data_type": "timestamp", "description": "When the order was placed"},
                {"name": "card_number", "data_type": "varchar", "description": "hidden"}
             ]},
            {"namespace": "public", "name": "etl_audit", "description": "hidden"},
            {"namespace": "public", "name": "staging", "visibility": "hidden"}
        ]
    }"#;

    #[tokio::test]
    async fn test_file_source_with_hidden_filtering() {
        let path = std::env::temp_dir().join(format!("warehouse-qa-schema-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, CATALOG).unwrap();

        let source = FileSchemaSource::new(&path);
        let listed = source.list_tables().await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[2].visibility, Visibility::Hidden);

        let loader = CatalogLoader::new(Arc::new(source), SearchBackend::None, "hidden");
        let snapshot = loader.load().await.unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(snapshot.catalog.qualified_names(), vec!["public.orders"]);
        let columns: Vec<&str> = snapshot.catalog.tables()[0].columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(columns, vec!["order_id", "placed_at"]);
        assert!(snapshot.search.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_schema_error() {
        let source = FileSchemaSource::new("/nonexistent/warehouse-qa/schema.json");
        assert!(matches!(source.list_tables().await, Err(QaError::Schema(_))));
    }
}
