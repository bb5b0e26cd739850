#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use warehouse_qa::config::PipelineSettings;
use warehouse_qa::error::{QaError, Result};
use warehouse_qa::execution::{ExecutionFailure, QueryEngine, ResultSet};
use warehouse_qa::llm::{LanguageModel, Prompt, PromptTask};
use warehouse_qa::retrieval::{RetrievalSource, RetrievedAnswer};
use warehouse_qa::schema::{CatalogHandle, CatalogLoader, ColumnEntry, SchemaEntry, SchemaSource};
use warehouse_qa::schema_rag::SearchBackend;
use warehouse_qa::Assistant;

/// Model with one canned reply per pipeline task; records every prompt
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<HashMap<PromptTask, std::result::Result<String, String>>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, task: PromptTask, text: &str) -> Self {
        self.replies.lock().unwrap().insert(task, Ok(text.to_string()));
        self
    }

    pub fn fail(self, task: PromptTask, message: &str) -> Self {
        self.replies.lock().unwrap().insert(task, Err(message.to_string()));
        self
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self, task: PromptTask) -> usize {
        self.prompts.lock().unwrap().iter().filter(|p| p.task == task).count()
    }

    /// Every piece of text sent to the model
    pub fn all_prompt_text(&self) -> String {
        self.prompts()
            .iter()
            .map(|p| {
                let history: Vec<&str> = p.history.iter().map(|m| m.content.as_str()).collect();
                format!("{}\n{}\n{}", p.system, history.join("\n"), p.user)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, prompt: &Prompt) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.clone());
        match self.replies.lock().unwrap().get(&prompt.task) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(message)) => Err(QaError::Llm(message.clone())),
            None => Err(QaError::Llm(format!("no scripted reply for {}", prompt.task.as_str()))),
        }
    }
}

pub struct StaticSchemaSource {
    tables: Vec<SchemaEntry>,
}

impl StaticSchemaSource {
    pub fn new(tables: Vec<SchemaEntry>) -> Self {
        Self { tables }
    }
}

#[async_trait]
impl SchemaSource for StaticSchemaSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn list_tables(&self) -> Result<Vec<SchemaEntry>> {
        Ok(self.tables.clone())
    }

    async fn list_columns(&self, table: &SchemaEntry) -> Result<Vec<ColumnEntry>> {
        Ok(self
            .tables
            .iter()
            .find(|t| t.qualified_name() == table.qualified_name())
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }
}

/// Engine returning a fixed outcome; records the SQL it was given
pub struct RecordingEngine {
    outcome: std::result::Result<ResultSet, ExecutionFailure>,
    executed: Mutex<Vec<String>>,
}

impl RecordingEngine {
    pub fn returning(outcome: std::result::Result<ResultSet, ExecutionFailure>) -> Self {
        Self {
            outcome,
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryEngine for RecordingEngine {
    fn name(&self) -> &str {
        "recording"
    }

    async fn run(&self, sql: &str) -> std::result::Result<ResultSet, ExecutionFailure> {
        self.executed.lock().unwrap().push(sql.to_string());
        self.outcome.clone()
    }
}

pub struct StaticRetrieval {
    answer: RetrievedAnswer,
}

impl StaticRetrieval {
    pub fn new(answer: RetrievedAnswer) -> Self {
        Self { answer }
    }
}

#[async_trait]
impl RetrievalSource for StaticRetrieval {
    fn name(&self) -> &str {
        "static"
    }

    async fn ask(&self, _question: &str) -> Result<RetrievedAnswer> {
        Ok(self.answer.clone())
    }
}

pub fn orders_table() -> SchemaEntry {
    SchemaEntry::new("public", "orders")
        .with_description("One row per customer order")
        .with_column("order_id", "integer", None)
        .with_column("customer_id", "integer", None)
        .with_column("placed_at", "timestamp", Some("When the order was placed"))
        .with_column("amount", "numeric", None)
}

pub fn customers_table() -> SchemaEntry {
    SchemaEntry::new("public", "customers")
        .with_description("Customer master data")
        .with_column("customer_id", "integer", None)
        .with_column("region", "varchar", None)
}

pub async fn assistant(
    model: Arc<ScriptedModel>,
    engine: Arc<RecordingEngine>,
    tables: Vec<SchemaEntry>,
    retrieval: Option<Arc<dyn RetrievalSource>>,
) -> Assistant {
    let loader = CatalogLoader::new(Arc::new(StaticSchemaSource::new(tables)), SearchBackend::None, "hidden");
    let catalog = CatalogHandle::load(loader).await.unwrap();
    Assistant::new(model, engine, Arc::new(catalog), retrieval, &PipelineSettings::default())
}
