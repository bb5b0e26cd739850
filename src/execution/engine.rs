//! Query engine contract
//!
//! The warehouse driver behind the executor. Engines report failures as
//! classified [`ExecutionFailure`]s; they never retry.

use crate::execution::result::{ExecutionFailure, ResultSet};
use async_trait::async_trait;

#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Engine name (e.g., "postgres")
    fn name(&self) -> &str;

    /// Run one read-only statement
    async fn run(&self, sql: &str) -> Result<ResultSet, ExecutionFailure>;
}
