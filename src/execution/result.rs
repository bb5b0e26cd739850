//! Query Result - what a warehouse query produced

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rows returned by the warehouse; every value already rendered to JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The first `limit` rows as `{column: value}` objects
    pub fn to_json_rows(&self, limit: usize) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .take(limit)
            .map(|row| {
                let object: serde_json::Map<String, serde_json::Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionErrorKind {
    Syntax,
    Permission,
    Timeout,
    /// The warehouse could not be reached
    Unavailable,
}

impl ExecutionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionErrorKind::Syntax => "syntax",
            ExecutionErrorKind::Permission => "permission",
            ExecutionErrorKind::Timeout => "timeout",
            ExecutionErrorKind::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub kind: ExecutionErrorKind,
    pub message: String,
}

impl ExecutionFailure {
    pub fn new(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl std::error::Error for ExecutionFailure {}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Rows(ResultSet),
    /// Ran fine, matched nothing
    Empty { columns: Vec<String> },
    Failed(ExecutionFailure),
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        match self {
            QueryResult::Rows(rows) => rows.row_count(),
            _ => 0,
        }
    }

    pub fn failure(&self) -> Option<&ExecutionFailure> {
        match self {
            QueryResult::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}
