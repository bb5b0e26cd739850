//! Query Executor
//!
//! Runs one generated statement under a timeout. Runs exactly once: no
//! retries, and failures are never sent back for re-synthesis.

use crate::execution::engine::QueryEngine;
use crate::execution::result::{ExecutionErrorKind, ExecutionFailure, QueryResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub struct QueryExecutor {
    engine: Arc<dyn QueryEngine>,
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(engine: Arc<dyn QueryEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    pub async fn execute(&self, sql: &str) -> QueryResult {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.engine.run(sql)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Err(_) => {
                warn!(engine = self.engine.name(), elapsed_ms, "Query timed out");
                QueryResult::Failed(ExecutionFailure::new(
                    ExecutionErrorKind::Timeout,
                    format!("Query exceeded {}s", self.timeout.as_secs()),
                ))
            }
            Ok(Err(failure)) => {
                warn!(
                    engine = self.engine.name(),
                    kind = %failure.kind,
                    elapsed_ms,
                    "Query failed: {}",
                    failure.message
                );
                QueryResult::Failed(failure)
            }
            Ok(Ok(result)) if result.is_empty() => {
                info!(engine = self.engine.name(), elapsed_ms, rows = 0, "Query returned no rows");
                QueryResult::Empty { columns: result.columns }
            }
            Ok(Ok(result)) => {
                info!(
                    engine = self.engine.name(),
                    elapsed_ms,
                    rows = result.row_count(),
                    "Query executed"
                );
                QueryResult::Rows(result)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::result::ResultSet;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedEngine {
        reply: Result<ResultSet, ExecutionFailure>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FixedEngine {
        fn new(reply: Result<ResultSet, ExecutionFailure>) -> Self {
            Self {
                reply,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl QueryEngine for FixedEngine {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn run(&self, _sql: &str) -> Result<ResultSet, ExecutionFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.reply.clone()
        }
    }

    #[tokio::test]
    async fn test_rows_and_empty() {
        let rows = ResultSet::new(vec!["count".to_string()], vec![vec![json!(42)]]);
        let executor = QueryExecutor::new(Arc::new(FixedEngine::new(Ok(rows.clone()))), Duration::from_secs(5));
        assert_eq!(executor.execute("SELECT 1").await, QueryResult::Rows(rows));

        let empty = ResultSet::new(vec!["count".to_string()], Vec::new());
        let executor = QueryExecutor::new(Arc::new(FixedEngine::new(Ok(empty))), Duration::from_secs(5));
        assert_eq!(
            executor.execute("SELECT 1").await,
            QueryResult::Empty {
                columns: vec!["count".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_failure_is_not_retried() {
        let engine = Arc::new(FixedEngine::new(Err(ExecutionFailure::new(
            ExecutionErrorKind::Syntax,
            "syntax error at or near \"FORM\"",
        ))));
        let executor = QueryExecutor::new(engine.clone(), Duration::from_secs(5));

        let result = executor.execute("SELECT * FORM orders").await;
        assert_eq!(result.failure().map(|f| f.kind), Some(ExecutionErrorKind::Syntax));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout() {
        let mut engine = FixedEngine::new(Ok(ResultSet::default()));
        engine.delay = Duration::from_secs(5);
        let executor = QueryExecutor::new(Arc::new(engine), Duration::from_millis(20));

        let result = executor.execute("SELECT pg_sleep(5)").await;
        assert_eq!(result.failure().map(|f| f.kind), Some(ExecutionErrorKind::Timeout));
    }
}
