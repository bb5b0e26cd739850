//! Catalog introspection for Redshift / PostgreSQL
//!
//! Native tables come from `pg_catalog` with their comments as descriptions.
//! When an external (federated) schema is configured its tables are listed
//! from Redshift's `svv_external_tables` / `svv_external_columns`; they end up
//! in the same catalog and are queried by their qualified name like any other
//! table. An external table's description is the `comment` entry of its
//! Glue parameters; external columns carry none.

use crate::db::DbPool;
use crate::error::Result;
use crate::schema::catalog::{ColumnEntry, SchemaEntry};
use crate::schema::source::SchemaSource;
use async_trait::async_trait;
use tracing::debug;

const NATIVE_TABLES_SQL: &str = r#"
SELECT
    c.relname::text AS table_name,
    obj_description(c.oid)::text AS table_comment
FROM pg_catalog.pg_namespace n
JOIN pg_catalog.pg_class c ON c.relnamespace = n.oid
WHERE c.relkind IN ('r', 'v', 'm')
    AND n.nspname = $1
ORDER BY c.relname
"#;

const NATIVE_COLUMNS_SQL: &str = r#"
SELECT
    c.column_name::text,
    c.data_type::text,
    d.description::text AS column_comment
FROM information_schema.columns c
JOIN pg_catalog.pg_class cls
    ON cls.relname = c.table_name
JOIN pg_catalog.pg_namespace ns
    ON ns.nspname = c.table_schema
    AND ns.oid = cls.relnamespace
LEFT JOIN pg_catalog.pg_description d
    ON d.objoid = cls.oid
    AND d.objsubid = c.ordinal_position
WHERE c.table_schema = $1
    AND c.table_name = $2
ORDER BY c.ordinal_position
"#;

const EXTERNAL_TABLES_SQL: &str = r#"
SELECT
    tablename::text AS table_name,
    parameters::text AS table_parameters
FROM svv_external_tables
WHERE schemaname = $1
ORDER BY tablename
"#;

const EXTERNAL_COLUMNS_SQL: &str = r#"
SELECT
    columnname::text,
    external_type::text,
    NULL::text AS column_comment
FROM svv_external_columns
WHERE schemaname = $1
    AND tablename = $2
ORDER BY columnnum
"#;

/// `comment` out of the JSON parameter map Redshift reports for a Glue table
fn external_table_comment(parameters: String) -> Option<String> {
    let parameters: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&parameters).ok()?;
    parameters
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("comment"))
        .and_then(|(_, value)| value.as_str())
        .map(|comment| comment.trim().to_string())
}

pub struct PostgresSchemaSource {
    pool: DbPool,
    schema: String,
    external_schema: Option<String>,
}

impl PostgresSchemaSource {
    pub fn new(pool: DbPool, schema: String, external_schema: Option<String>) -> Self {
        Self {
            pool,
            schema,
            external_schema,
        }
    }

    fn is_external(&self, table: &SchemaEntry) -> bool {
        self.external_schema.as_deref() == Some(table.namespace.as_str())
    }

    async fn tables_in(
        &self,
        sql: &str,
        namespace: &str,
        describe: fn(String) -> Option<String>,
    ) -> Result<Vec<SchemaEntry>> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(sql)
            .bind(namespace)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(name, comment)| {
                let mut entry = SchemaEntry::new(namespace, name);
                entry.description = comment.and_then(describe).filter(|c| !c.trim().is_empty());
                entry
            })
            .collect())
    }
}

#[async_trait]
impl SchemaSource for PostgresSchemaSource {
    fn name(&self) -> &str {
        "warehouse catalog"
    }

    async fn list_tables(&self) -> Result<Vec<SchemaEntry>> {
        let mut tables = self.tables_in(NATIVE_TABLES_SQL, &self.schema, Some).await?;
        debug!("{} native tables in schema {}", tables.len(), self.schema);

        if let Some(ref external) = self.external_schema {
            let external_tables = self
                .tables_in(EXTERNAL_TABLES_SQL, external, external_table_comment)
                .await?;
            debug!("{} external tables in schema {}", external_tables.len(), external);
            tables.extend(external_tables);
        }

        Ok(tables)
    }

    async fn list_columns(&self, table: &SchemaEntry) -> Result<Vec<ColumnEntry>> {
        let sql = if self.is_external(table) {
            EXTERNAL_COLUMNS_SQL
        } else {
            NATIVE_COLUMNS_SQL
        };

        let rows: Vec<(String, Option<String>, Option<String>)> = sqlx::query_as(sql)
            .bind(&table.namespace)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, description)| ColumnEntry {
                name,
                data_type: data_type.unwrap_or_default(),
                description: description.filter(|d| !d.trim().is_empty()),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_table_comment() {
        let parameters = r#"{"EXTERNAL":"TRUE","comment":" Daily clickstream events ","transient_lastDdlTime":"1700000000"}"#;
        assert_eq!(
            external_table_comment(parameters.to_string()).as_deref(),
            Some("Daily clickstream events")
        );
        assert_eq!(external_table_comment(r#"{"EXTERNAL":"TRUE"}"#.to_string()), None);
        assert_eq!(external_table_comment("not json".to_string()), None);
    }
}
