//! Answer Composer
//!
//! Turns query results or retrieved passages into the text shown to the
//! user. Only result rows go through the model; empty results, failures and
//! retrieval answers use fixed phrasing.

use crate::conversation::{history_messages, TurnRecord};
use crate::execution::{ExecutionErrorKind, QueryResult, ResultSet};
use crate::llm::{LanguageModel, Prompt, PromptTask};
use crate::orchestrator::FailureKind;
use crate::prompts::ANSWER_SYSTEM_PROMPT;
use crate::retrieval::RetrievedAnswer;
use itertools::Itertools;
use std::sync::Arc;
use tracing::warn;

pub const NO_DATA_ANSWER: &str = "No matching data was found for your question.";

/// What an answer is composed from
pub enum Evidence<'a> {
    Query { sql: &'a str, result: &'a QueryResult },
    Retrieved(&'a RetrievedAnswer),
}

pub struct AnswerComposer {
    model: Arc<dyn LanguageModel>,
    max_result_rows: usize,
}

impl AnswerComposer {
    pub fn new(model: Arc<dyn LanguageModel>, max_result_rows: usize) -> Self {
        Self { model, max_result_rows }
    }

    pub async fn compose(&self, question: &str, evidence: Evidence<'_>, history: &[TurnRecord]) -> String {
        match evidence {
            Evidence::Query { sql, result } => match result {
                QueryResult::Rows(rows) => self.describe_rows(question, sql, rows, history).await,
                QueryResult::Empty { .. } => NO_DATA_ANSWER.to_string(),
                QueryResult::Failed(failure) => apology(&FailureKind::Execution(failure.kind)),
            },
            Evidence::Retrieved(answer) => with_sources(answer),
        }
    }

    pub fn build_prompt(&self, question: &str, sql: &str, rows: &ResultSet, history: &[TurnRecord]) -> Prompt {
        let shown = rows.to_json_rows(self.max_result_rows);
        let mut user = format!(
            "Question: {}\nSQL Query: {}\nSQL Result: {}",
            question,
            sql,
            serde_json::Value::Array(shown)
        );
        if rows.row_count() > self.max_result_rows {
            user.push_str(&format!(
                "\n(Showing the first {} of {} rows.)",
                self.max_result_rows,
                rows.row_count()
            ));
        }

        Prompt::new(PromptTask::ComposeAnswer, ANSWER_SYSTEM_PROMPT, user).with_history(history_messages(history, false))
    }

    async fn describe_rows(&self, question: &str, sql: &str, rows: &ResultSet, history: &[TurnRecord]) -> String {
        let prompt = self.build_prompt(question, sql, rows, history);
        match self.model.invoke(&prompt).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("Answer model returned nothing, rendering rows directly");
                render_rows(rows, self.max_result_rows)
            }
            Err(e) => {
                warn!("Answer model failed, rendering rows directly: {}", e);
                render_rows(rows, self.max_result_rows)
            }
        }
    }
}

fn cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

/// Plain-text table of the first `limit` rows
pub fn render_rows(rows: &ResultSet, limit: usize) -> String {
    let mut lines = vec!["Here is what the query returned:".to_string(), rows.columns.join(" | ")];
    lines.extend(rows.rows.iter().take(limit).map(|row| row.iter().map(cell).join(" | ")));
    if rows.row_count() > limit {
        lines.push(format!("... {} more rows", rows.row_count() - limit));
    }
    lines.join("\n")
}

/// Retrieved answer text followed by its sources
pub fn with_sources(answer: &RetrievedAnswer) -> String {
    if answer.citations.is_empty() {
        return answer.text.clone();
    }
    let sources = answer
        .citations
        .iter()
        .map(|c| format!("[{}] {}: {}", c.index, c.source, c.excerpt))
        .join("\n");
    format!("{}\n\nSources:\n{}", answer.text, sources)
}

/// User-facing text for a failed turn
pub fn apology(kind: &FailureKind) -> String {
    match kind {
        FailureKind::Routing => "Sorry, I couldn't work out how to answer that question right now. Please try again.",
        FailureKind::Selection => "Sorry, no relevant data found for that question in the available tables.",
        FailureKind::Synthesis => "Sorry, I couldn't write a valid query for that question. Please try rephrasing it.",
        FailureKind::Execution(ExecutionErrorKind::Syntax) => {
            "Sorry, the query could not be executed. Please try rephrasing your question."
        }
        FailureKind::Execution(ExecutionErrorKind::Permission) => {
            "Sorry, I don't have permission to read the data needed for that question."
        }
        FailureKind::Execution(ExecutionErrorKind::Timeout) => {
            "Sorry, the query took too long to run. Try narrowing the question, for example to a shorter time range."
        }
        FailureKind::Execution(ExecutionErrorKind::Unavailable) => {
            "Sorry, the data warehouse is not reachable right now. Please try again later."
        }
        FailureKind::Retrieval => "Sorry, I couldn't find an answer in the knowledge base right now.",
    }
    .to_string()
}
