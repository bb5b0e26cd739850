use thiserror::Error;

#[derive(Error, Debug)]
pub enum QaError {
    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Table selection error: {0}")]
    Selection(String),

    #[error("Query synthesis error: {0}")]
    Synthesis(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Structured output error: {0}")]
    StructuredOutput(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<sqlx::Error> for QaError {
    fn from(err: sqlx::Error) -> Self {
        QaError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QaError>;
