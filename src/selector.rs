//! Table Selector
//!
//! Narrows the catalog to the tables a question needs: an optional
//! similarity search pass, then the model picks the final subset from the
//! remaining candidates.

use crate::error::{QaError, Result};
use crate::llm::{invoke_structured, LanguageModel, Prompt, PromptTask};
use crate::prompts::{table_selection_schema, TABLE_SELECTION_SYSTEM_PROMPT};
use crate::schema::catalog::{CatalogSnapshot, SchemaEntry};
use itertools::Itertools;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ordered, de-duplicated tables chosen for one question
#[derive(Debug, Clone, PartialEq)]
pub struct TableSelection {
    pub tables: Vec<SchemaEntry>,
}

impl TableSelection {
    pub fn names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.qualified_name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct SelectionReply {
    tables: Vec<String>,
}

pub struct TableSelector {
    model: Arc<dyn LanguageModel>,
    top_k: usize,
}

impl TableSelector {
    pub fn new(model: Arc<dyn LanguageModel>, top_k: usize) -> Self {
        Self { model, top_k }
    }

    /// Candidate tables for the model: the search hits when narrowing
    /// applies, otherwise the whole visible catalog
    pub async fn candidates<'a>(&self, question: &str, snapshot: &'a CatalogSnapshot) -> Vec<&'a SchemaEntry> {
        let catalog = &snapshot.catalog;
        let all: Vec<&SchemaEntry> = catalog.tables().iter().collect();

        let Some(ref search) = snapshot.search else {
            return all;
        };
        if catalog.len() <= self.top_k {
            return all;
        }

        match search.search(question, self.top_k).await {
            Ok(hits) => {
                let narrowed: Vec<&SchemaEntry> = hits
                    .iter()
                    .filter_map(|id| {
                        let entry = catalog.get(id);
                        if entry.is_none() {
                            debug!("Search returned unknown table {}", id);
                        }
                        entry
                    })
                    .unique_by(|entry| entry.qualified_name())
                    .collect();
                debug!("Search narrowed {} tables to {}", catalog.len(), narrowed.len());
                narrowed
            }
            Err(e) => {
                warn!("Schema search failed, using the full catalog: {}", e);
                all
            }
        }
    }

    pub async fn select_tables(&self, question: &str, snapshot: &CatalogSnapshot) -> Result<TableSelection> {
        if snapshot.catalog.is_empty() {
            return Err(QaError::Selection("The catalog has no visible tables".to_string()));
        }

        let candidates = self.candidates(question, snapshot).await;
        if candidates.is_empty() {
            return Err(QaError::Selection("No candidate tables for this question".to_string()));
        }

        let candidate_names: Vec<String> = candidates.iter().map(|t| t.qualified_name()).collect();
        let listing = candidates
            .iter()
            .map(|t| format!("- {}: {}", t.qualified_name(), t.description.as_deref().unwrap_or("")))
            .join("\n");

        let prompt = Prompt::new(
            PromptTask::SelectTables,
            TABLE_SELECTION_SYSTEM_PROMPT,
            format!("Candidate tables:\n{}\n\nQuestion: {}", listing, question),
        )
        .with_schema(table_selection_schema(&candidate_names));

        let reply: SelectionReply = invoke_structured(self.model.as_ref(), &prompt)
            .await
            .map_err(|e| QaError::Selection(e.to_string()))?;

        let tables: Vec<SchemaEntry> = reply
            .tables
            .iter()
            .filter_map(|name| {
                let position = snapshot
                    .catalog
                    .get(name)
                    .and_then(|entry| candidates.iter().position(|c| c.qualified_name() == entry.qualified_name()));
                if position.is_none() {
                    debug!("Dropping unknown table '{}' from selection", name);
                }
                position
            })
            .unique()
            .sorted()
            .map(|position| candidates[position].clone())
            .collect();

        if tables.is_empty() {
            return Err(QaError::Selection("No relevant tables were selected".to_string()));
        }

        let selection = TableSelection { tables };
        info!(tables = selection.len(), "Selected tables: {}", selection.names().join(", "));
        Ok(selection)
    }
}
