pub mod embedder;
pub mod retriever;
pub mod vector_store;

pub use embedder::{BedrockEmbedder, Embedder, OpenAiEmbedder};
pub use retriever::{KeywordIndex, TableIndex};
pub use vector_store::{Document, Embedding, InMemoryVectorStore, SearchResult};

use crate::config::{EmbeddingProvider, EmbeddingSettings, LlmSettings};
use crate::error::{QaError, Result};
use crate::schema::catalog::SchemaCatalog;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Ranks catalog tables against free text
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// Qualified names of the `k` best tables, best first
    async fn search(&self, query_text: &str, k: usize) -> Result<Vec<String>>;
}

/// Which index a catalog snapshot gets
#[derive(Clone)]
pub enum SearchBackend {
    None,
    Keyword,
    Embedding(Arc<dyn Embedder>),
}

impl SearchBackend {
    /// Backend for the configured embedding provider. API keys and regions
    /// are shared with the language model settings.
    pub fn from_settings(embedding: &EmbeddingSettings, llm: &LlmSettings) -> Result<Self> {
        match embedding.provider {
            EmbeddingProvider::None => Ok(SearchBackend::None),
            EmbeddingProvider::Keyword => Ok(SearchBackend::Keyword),
            EmbeddingProvider::OpenAi => {
                let api_key = llm.openai.api_key.clone().ok_or_else(|| {
                    QaError::Config("OPENAI_API_KEY is required for OpenAI embeddings".to_string())
                })?;
                let model = embedding
                    .model
                    .clone()
                    .unwrap_or_else(|| "text-embedding-3-small".to_string());
                Ok(SearchBackend::Embedding(Arc::new(OpenAiEmbedder::new(
                    api_key,
                    llm.openai.base_url.clone(),
                    model,
                )?)))
            }
            EmbeddingProvider::Bedrock => {
                let token = llm.bedrock.bearer_token.clone().ok_or_else(|| {
                    QaError::Config("AWS_BEARER_TOKEN_BEDROCK is required for Bedrock embeddings".to_string())
                })?;
                let model = embedding
                    .model
                    .clone()
                    .unwrap_or_else(|| "amazon.titan-embed-text-v2:0".to_string());
                Ok(SearchBackend::Embedding(Arc::new(BedrockEmbedder::new(
                    token,
                    llm.bedrock.region.clone(),
                    model,
                )?)))
            }
        }
    }
}

/// Build the index for a freshly loaded catalog
pub async fn build_search(
    backend: &SearchBackend,
    catalog: &SchemaCatalog,
) -> Result<Option<Arc<dyn SimilaritySearch>>> {
    match backend {
        SearchBackend::None => Ok(None),
        SearchBackend::Keyword => Ok(Some(Arc::new(KeywordIndex::build(catalog)))),
        SearchBackend::Embedding(embedder) => {
            let index = TableIndex::build(embedder.clone(), catalog).await?;
            info!("Built embedding index over {} tables", index.len());
            Ok(Some(Arc::new(index)))
        }
    }
}
