//! Orchestrator
//!
//! Runs one turn through the pipeline:
//!
//! ```text
//! INIT → ROUTED → TABLES_SELECTED → QUERY_GENERATED → QUERY_EXECUTED → ANSWERED
//!               ↘ RETRIEVED ─────────────────────────────────────────↗
//! ```
//!
//! Every stage failure ends the turn with an apology. The turn is then
//! recorded in the session's conversation, exactly once.

use crate::composer::{apology, AnswerComposer, Evidence};
use crate::config::PipelineSettings;
use crate::conversation::{Session, TurnRecord};
use crate::error::{QaError, Result};
use crate::execution::{ExecutionErrorKind, QueryEngine, QueryExecutor};
use crate::llm::LanguageModel;
use crate::retrieval::{Citation, RetrievalSource};
use crate::router::{RouteDecision, Router};
use crate::schema::catalog::CatalogHandle;
use crate::security::QueryGuard;
use crate::selector::TableSelector;
use crate::synthesizer::QuerySynthesizer;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnStage {
    Init,
    Routed,
    TablesSelected,
    QueryGenerated,
    QueryExecuted,
    Retrieved,
    Answered,
}

/// Why a turn ended with an apology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    Routing,
    Selection,
    Synthesis,
    Execution(ExecutionErrorKind),
    Retrieval,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnAnswer {
    pub text: String,
    pub route: RouteDecision,
    pub citations: Vec<Citation>,
    /// Generated SQL, when the turn got that far
    pub sql: Option<String>,
    pub failure: Option<FailureKind>,
    pub trace: Vec<TurnStage>,
}

impl TurnAnswer {
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }

    pub fn reached(&self, stage: TurnStage) -> bool {
        self.trace.contains(&stage)
    }
}

/// In-flight turn state
struct Turn {
    route: RouteDecision,
    sql: Option<String>,
    trace: Vec<TurnStage>,
}

impl Turn {
    fn new() -> Self {
        Self {
            route: RouteDecision::Sql,
            sql: None,
            trace: vec![TurnStage::Init],
        }
    }

    fn advance(&mut self, stage: TurnStage) {
        self.trace.push(stage);
    }

    fn answer(mut self, text: String, citations: Vec<Citation>, failure: Option<FailureKind>) -> TurnAnswer {
        self.trace.push(TurnStage::Answered);
        TurnAnswer {
            text,
            route: self.route,
            citations,
            sql: self.sql,
            failure,
            trace: self.trace,
        }
    }

    fn fail(self, kind: FailureKind, error: &QaError) -> TurnAnswer {
        error!(route = %self.route, failure = ?kind, "Turn failed: {}", error);
        self.answer(apology(&kind), Vec::new(), Some(kind))
    }
}

/// The question-answering pipeline. Holds only shared collaborators, so one
/// assistant can serve many sessions.
pub struct Assistant {
    router: Router,
    selector: TableSelector,
    synthesizer: QuerySynthesizer,
    guard: Arc<QueryGuard>,
    executor: QueryExecutor,
    composer: AnswerComposer,
    retrieval: Option<Arc<dyn RetrievalSource>>,
    catalog: Arc<CatalogHandle>,
    history_turns: usize,
}

impl Assistant {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        engine: Arc<dyn QueryEngine>,
        catalog: Arc<CatalogHandle>,
        retrieval: Option<Arc<dyn RetrievalSource>>,
        settings: &PipelineSettings,
    ) -> Self {
        let guard = Arc::new(QueryGuard::new(settings.dialect));
        Self {
            router: Router::new(model.clone(), retrieval.is_some()),
            selector: TableSelector::new(model.clone(), settings.top_k),
            synthesizer: QuerySynthesizer::new(model.clone(), guard.clone(), settings.dialect, settings.row_limit),
            guard,
            executor: QueryExecutor::new(engine, settings.query_timeout),
            composer: AnswerComposer::new(model, settings.max_result_rows),
            retrieval,
            catalog,
            history_turns: settings.history_turns,
        }
    }

    /// Answer one question and record it in the session
    pub async fn ask(&self, session: &mut Session, question: &str) -> TurnAnswer {
        let answer = {
            let history = session.conversation.recent(self.history_turns);
            self.run_turn(question, history).await
        };

        let executed = answer.reached(TurnStage::QueryExecuted);
        session.conversation.record(TurnRecord {
            question: question.to_string(),
            answer: answer.text.clone(),
            route: answer.route,
            sql: answer.sql.clone().filter(|_| executed),
            asked_at: Utc::now(),
        });

        info!(
            session = %session.id,
            route = %answer.route,
            failed = answer.is_failure(),
            turns = session.conversation.len(),
            "Turn answered"
        );
        answer
    }

    async fn run_turn(&self, question: &str, history: &[TurnRecord]) -> TurnAnswer {
        let mut turn = Turn::new();

        turn.route = match self.router.route(question, history).await {
            Ok(route) => route,
            Err(e) => return turn.fail(FailureKind::Routing, &e),
        };
        turn.advance(TurnStage::Routed);
        info!(route = %turn.route, "Question routed");

        match turn.route {
            RouteDecision::Sql => self.answer_with_sql(turn, question, history).await,
            RouteDecision::Retrieval => self.answer_with_retrieval(turn, question).await,
        }
    }

    async fn answer_with_sql(&self, mut turn: Turn, question: &str, history: &[TurnRecord]) -> TurnAnswer {
        let snapshot = self.catalog.snapshot();

        let selection = match self.selector.select_tables(question, &snapshot).await {
            Ok(selection) => selection,
            Err(e) => return turn.fail(FailureKind::Selection, &e),
        };
        turn.advance(TurnStage::TablesSelected);

        let query = match self.synthesizer.generate_query(question, &selection, history).await {
            Ok(query) => query,
            Err(e) => return turn.fail(FailureKind::Synthesis, &e),
        };
        turn.sql = Some(query.sql.clone());

        if let Err(e) = self.guard.check_references(&query.sql, &query.selection.tables) {
            return turn.fail(FailureKind::Synthesis, &e);
        }
        turn.advance(TurnStage::QueryGenerated);

        let result = self.executor.execute(&query.sql).await;
        turn.advance(TurnStage::QueryExecuted);

        let failure = result.failure().map(|f| FailureKind::Execution(f.kind));
        let text = self
            .composer
            .compose(question, Evidence::Query { sql: &query.sql, result: &result }, history)
            .await;
        turn.answer(text, Vec::new(), failure)
    }

    async fn answer_with_retrieval(&self, mut turn: Turn, question: &str) -> TurnAnswer {
        let Some(ref retrieval) = self.retrieval else {
            let e = QaError::Retrieval("No retrieval source is configured".to_string());
            return turn.fail(FailureKind::Retrieval, &e);
        };

        let answer = match retrieval.ask(question).await {
            Ok(answer) => answer,
            Err(e) => return turn.fail(FailureKind::Retrieval, &e),
        };
        turn.advance(TurnStage::Retrieved);

        if answer.citations.is_empty() {
            warn!("{} answered without citations", retrieval.name());
        }
        let text = self.composer.compose(question, Evidence::Retrieved(&answer), &[]).await;
        turn.answer(text, answer.citations, None)
    }

    /// Reload the schema catalog and its search index
    pub async fn refresh_schema(&self) -> Result<usize> {
        self.catalog.refresh().await
    }

    /// Qualified names of the tables currently visible
    pub fn visible_tables(&self) -> Vec<String> {
        self.catalog.snapshot().catalog.qualified_names()
    }
}
