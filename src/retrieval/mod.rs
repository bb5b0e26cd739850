//! Retrieval collaborator
//!
//! Answers narrative questions from a document knowledge base.

pub mod knowledge_base;

pub use knowledge_base::KnowledgeBaseClient;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One source passage backing a retrieved answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based marker shown as `[n]`
    pub index: usize,
    pub source: String,
    pub excerpt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedAnswer {
    pub text: String,
    /// In the order supplied by the backend
    pub citations: Vec<Citation>,
}

#[async_trait]
pub trait RetrievalSource: Send + Sync {
    fn name(&self) -> &str;

    async fn ask(&self, question: &str) -> Result<RetrievedAnswer>;
}
