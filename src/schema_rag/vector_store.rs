//! Vector Store
//!
//! In-memory cosine-similarity store. Documents keep insertion order and the
//! ranking sort is stable, so equal scores come back in insertion order.

use crate::error::{QaError, Result};
use std::collections::HashMap;

/// Vector embedding (simple f32 vector)
pub type Embedding = Vec<f32>;

/// Document in the vector store
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: HashMap<String, String>,
    pub embedding: Embedding,
}

/// Search result from vector store
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub document: Document,
    pub score: f32,
}

#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    documents: Vec<Document>,
    /// Set by the first document added
    dimension: Option<usize>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document; all embeddings must share one dimension
    pub fn add_document(&mut self, document: Document) -> Result<()> {
        let dimension = *self.dimension.get_or_insert(document.embedding.len());
        if document.embedding.len() != dimension {
            return Err(QaError::Embedding(format!(
                "Embedding dimension {} of '{}' doesn't match store dimension {}",
                document.embedding.len(),
                document.id,
                dimension
            )));
        }
        self.documents.push(document);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Top `top_k` documents by cosine similarity, best first
    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let Some(dimension) = self.dimension else {
            return Ok(Vec::new());
        };

        if query_embedding.len() != dimension {
            return Err(QaError::Embedding(format!(
                "Query embedding dimension {} doesn't match store dimension {}",
                query_embedding.len(),
                dimension
            )));
        }

        let mut results: Vec<SearchResult> = self
            .documents
            .iter()
            .map(|doc| SearchResult {
                document: doc.clone(),
                score: cosine_similarity(query_embedding, &doc.embedding),
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);

        Ok(results)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, embedding: Vec<f32>) -> Document {
        Document {
            id: id.to_string(),
            text: id.to_string(),
            metadata: HashMap::new(),
            embedding,
        }
    }

    #[test]
    fn test_search_orders_by_score_then_insertion() {
        let mut store = InMemoryVectorStore::new();
        store.add_document(doc("a", vec![0.0, 1.0])).unwrap();
        store.add_document(doc("b", vec![1.0, 0.0])).unwrap();
        store.add_document(doc("c", vec![2.0, 0.0])).unwrap();

        let ids: Vec<String> = store
            .search(&[1.0, 0.0], 3)
            .unwrap()
            .into_iter()
            .map(|r| r.document.id)
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert_eq!(store.search(&[1.0, 0.0], 1).unwrap().len(), 1);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut store = InMemoryVectorStore::new();
        assert!(store.search(&[1.0], 3).unwrap().is_empty());
        store.add_document(doc("a", vec![1.0, 0.0])).unwrap();
        assert!(store.add_document(doc("b", vec![1.0])).is_err());
        assert!(store.search(&[1.0], 3).is_err());
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }
}
