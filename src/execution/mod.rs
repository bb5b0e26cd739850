pub mod engine;
pub mod error_classifier;
pub mod executor;
pub mod postgres_engine;
pub mod result;

pub use engine::QueryEngine;
pub use executor::QueryExecutor;
pub use postgres_engine::PostgresEngine;
pub use result::{ExecutionErrorKind, ExecutionFailure, QueryResult, ResultSet};
