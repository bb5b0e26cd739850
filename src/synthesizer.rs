//! Query Synthesizer
//!
//! Writes one read-only SQL statement for a question over the selected
//! tables. The model's reply is free text; the statement is extracted and
//! checked by the query guard.

use crate::config::WarehouseDialect;
use crate::conversation::{history_messages, TurnRecord};
use crate::error::{QaError, Result};
use crate::llm::{LanguageModel, Prompt, PromptTask};
use crate::prompts::QUERY_SYSTEM_PROMPT;
use crate::schema::format_schema_description;
use crate::security::QueryGuard;
use crate::selector::TableSelection;
use std::sync::Arc;
use tracing::{debug, info};

/// A statement ready for the reference check and execution
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedQuery {
    pub sql: String,
    pub selection: TableSelection,
}

pub struct QuerySynthesizer {
    model: Arc<dyn LanguageModel>,
    guard: Arc<QueryGuard>,
    dialect: WarehouseDialect,
    row_limit: usize,
}

impl QuerySynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, guard: Arc<QueryGuard>, dialect: WarehouseDialect, row_limit: usize) -> Self {
        Self {
            model,
            guard,
            dialect,
            row_limit,
        }
    }

    pub fn build_prompt(&self, question: &str, selection: &TableSelection, history: &[TurnRecord]) -> Prompt {
        let tables: Vec<_> = selection.tables.iter().collect();
        let system = QUERY_SYSTEM_PROMPT
            .replace("{platform}", self.dialect.platform_name())
            .replace("{dialect_rules}", self.dialect.prompt_rules())
            .replace("{row_limit}", &self.row_limit.to_string())
            .replace("{table_info}", &format_schema_description(&tables));

        Prompt::new(PromptTask::WriteQuery, system, format!("Question: {}", question))
            .with_history(history_messages(history, true))
    }

    pub async fn generate_query(
        &self,
        question: &str,
        selection: &TableSelection,
        history: &[TurnRecord],
    ) -> Result<GeneratedQuery> {
        let prompt = self.build_prompt(question, selection, history);
        let reply = self
            .model
            .invoke(&prompt)
            .await
            .map_err(|e| QaError::Synthesis(e.to_string()))?;
        debug!("Query model reply: {}", reply);

        if reply.trim().is_empty() {
            return Err(QaError::Synthesis("The model returned an empty reply".to_string()));
        }

        let sql = self.guard.extract_statement(&reply)?;
        self.guard.ensure_read_only(&sql)?;

        info!("Generated query: {}", sql);
        Ok(GeneratedQuery {
            sql,
            selection: selection.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::RouteDecision;
    use crate::schema::catalog::SchemaEntry;
    use async_trait::async_trait;
    use chrono::Utc;

    struct Writes(&'static str);

    #[async_trait]
    impl LanguageModel for Writes {
        fn name(&self) -> &str {
            "writes"
        }

        async fn invoke(&self, _prompt: &Prompt) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn selection() -> TableSelection {
        TableSelection {
            tables: vec![SchemaEntry::new("public", "orders")
                .with_description("One row per order")
                .with_column("order_id", "integer", None)
                .with_column("placed_at", "timestamp", Some("When the order was placed"))],
        }
    }

    fn synthesizer(reply: &'static str) -> QuerySynthesizer {
        QuerySynthesizer::new(
            Arc::new(Writes(reply)),
            Arc::new(QueryGuard::new(WarehouseDialect::Redshift)),
            WarehouseDialect::Redshift,
            10,
        )
    }

    #[test]
    fn test_prompt_contains_schema_limit_and_prior_sql() {
        let history = vec![TurnRecord {
            question: "How many orders in May?".to_string(),
            answer: "There were 12 orders.".to_string(),
            route: RouteDecision::Sql,
            sql: Some("SELECT COUNT(*) FROM public.orders".to_string()),
            asked_at: Utc::now(),
        }];

        let prompt = synthesizer("").build_prompt("And in June?", &selection(), &history);
        assert!(prompt.system.contains("AWS Redshift"));
        assert!(prompt.system.contains("at most 10 results"));
        assert!(prompt.system.contains("- placed_at (timestamp) / When the order was placed"));
        assert!(prompt.history[1].content.contains("SELECT COUNT(*) FROM public.orders"));
        assert_eq!(prompt.user, "Question: And in June?");
        assert!(prompt.output_schema.is_none());
    }

    #[tokio::test]
    async fn test_generate_extracts_statement() {
        let query = synthesizer("```sql\nSELECT COUNT(*) AS count FROM public.orders;\n```")
            .generate_query("How many orders?", &selection(), &[])
            .await
            .unwrap();
        assert_eq!(query.sql, "SELECT COUNT(*) AS count FROM public.orders");
        assert_eq!(query.selection, selection());
    }

    #[tokio::test]
    async fn test_generate_rejects_writes_and_prose() {
        let err = synthesizer("DELETE FROM public.orders")
            .generate_query("Remove all orders", &selection(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, QaError::Synthesis(_)));

        let err = synthesizer("   ")
            .generate_query("q", &selection(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, QaError::Synthesis(_)));
    }
}
