pub mod catalog;
pub mod postgres_source;
pub mod source;

pub use catalog::{
    identifier_parts, is_hidden_description, CatalogHandle, CatalogLoader, CatalogSnapshot, ColumnEntry,
    SchemaCatalog, SchemaEntry, Visibility,
};
pub use postgres_source::PostgresSchemaSource;
pub use source::{FileSchemaSource, SchemaSource};

/// Render tables for a prompt:
///
/// ```text
/// Table: public.orders
/// Description: One row per order
/// Columns:
/// - order_id (integer)
/// - placed_at (timestamp) / When the order was placed
/// ```
pub fn format_schema_description(tables: &[&SchemaEntry]) -> String {
    let mut lines = Vec::new();
    for table in tables {
        lines.push(format!("Table: {}", table.qualified_name()));
        lines.push(format!("Description: {}", table.description.as_deref().unwrap_or("")));
        lines.push("Columns:".to_string());
        for column in &table.columns {
            let mut line = format!("- {}", column.name);
            if !column.data_type.is_empty() {
                line.push_str(&format!(" ({})", column.data_type));
            }
            if let Some(description) = column.description.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
                line.push_str(&format!(" / {}", description));
            }
            lines.push(line);
        }
        lines.push(String::new());
    }
    lines.join("\n")
}
