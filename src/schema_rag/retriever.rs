//! Schema RAG Retriever
//!
//! Ranks catalog tables against a question. [`TableIndex`] embeds one
//! document per table (`name: description`); [`KeywordIndex`] needs no
//! embedding service and fuzzy-matches question words against table names,
//! descriptions and column names.

use crate::error::Result;
use crate::schema::catalog::{SchemaCatalog, SchemaEntry};
use crate::schema_rag::embedder::Embedder;
use crate::schema_rag::vector_store::{Document, InMemoryVectorStore};
use crate::schema_rag::SimilaritySearch;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Text embedded for a table
pub fn table_document_text(table: &SchemaEntry) -> String {
    format!("{}: {}", table.qualified_name(), table.description.as_deref().unwrap_or(""))
}

/// Embedding index over the catalog's tables
pub struct TableIndex {
    vector_store: InMemoryVectorStore,
    embedder: Arc<dyn Embedder>,
}

impl TableIndex {
    /// Embed every table of the catalog
    pub async fn build(embedder: Arc<dyn Embedder>, catalog: &SchemaCatalog) -> Result<Self> {
        let texts: Vec<String> = catalog.tables().iter().map(table_document_text).collect();
        let embeddings = embedder.embed_batch(&texts).await?;

        let mut vector_store = InMemoryVectorStore::new();
        for ((table, text), embedding) in catalog.tables().iter().zip(texts).zip(embeddings) {
            let mut metadata = HashMap::new();
            metadata.insert("type".to_string(), "table".to_string());
            metadata.insert("namespace".to_string(), table.namespace.clone());
            vector_store.add_document(Document {
                id: table.qualified_name(),
                text,
                metadata,
                embedding,
            })?;
        }

        debug!("Embedded {} tables with {}", vector_store.len(), embedder.name());
        Ok(Self { vector_store, embedder })
    }

    pub fn len(&self) -> usize {
        self.vector_store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector_store.is_empty()
    }
}

#[async_trait]
impl SimilaritySearch for TableIndex {
    async fn search(&self, query_text: &str, k: usize) -> Result<Vec<String>> {
        if self.vector_store.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self.embedder.embed(query_text).await?;
        Ok(self
            .vector_store
            .search(&query_embedding, k)?
            .into_iter()
            .map(|r| r.document.id)
            .collect())
    }
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "by", "did", "do", "does", "for", "from", "how", "in", "is", "it", "last", "many",
    "me", "much", "of", "on", "or", "show", "the", "there", "to", "was", "we", "what", "which", "who", "with",
];

/// Similarity above which two words count as the same term
const MATCH_THRESHOLD: f64 = 0.88;

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 1 && !STOPWORDS.contains(&w.as_str()))
}

struct KeywordEntry {
    qualified_name: String,
    terms: HashSet<String>,
}

/// Fuzzy keyword index, used when no embedding service is configured
pub struct KeywordIndex {
    entries: Vec<KeywordEntry>,
}

impl KeywordIndex {
    pub fn build(catalog: &SchemaCatalog) -> Self {
        let entries = catalog
            .tables()
            .iter()
            .map(|table| {
                let mut terms: HashSet<String> = words(&table.name).collect();
                if let Some(ref description) = table.description {
                    terms.extend(words(description));
                }
                for column in &table.columns {
                    terms.extend(words(&column.name));
                }
                KeywordEntry {
                    qualified_name: table.qualified_name(),
                    terms,
                }
            })
            .collect();
        Self { entries }
    }

    fn score(&self, entry: &KeywordEntry, question_words: &[String]) -> f64 {
        question_words
            .iter()
            .map(|word| {
                entry
                    .terms
                    .iter()
                    .map(|term| strsim::jaro_winkler(word, term))
                    .fold(0.0, f64::max)
            })
            .filter(|best| *best >= MATCH_THRESHOLD)
            .sum()
    }
}

#[async_trait]
impl SimilaritySearch for KeywordIndex {
    async fn search(&self, query_text: &str, k: usize) -> Result<Vec<String>> {
        let question_words: Vec<String> = words(query_text).collect();

        let mut scored: Vec<(&KeywordEntry, f64)> = self
            .entries
            .iter()
            .map(|entry| (entry, self.score(entry, &question_words)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(entry, _)| entry.qualified_name.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_rag::vector_store::Embedding;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new(vec![
            SchemaEntry::new("public", "customers")
                .with_description("Customer master data")
                .with_column("customer_id", "integer", None)
                .with_column("region", "varchar", None),
            SchemaEntry::new("public", "orders")
                .with_description("One row per order")
                .with_column("order_id", "integer", None)
                .with_column("placed_at", "timestamp", None),
            SchemaEntry::new("public", "shipments")
                .with_description("Carrier shipments")
                .with_column("shipped_at", "timestamp", None),
        ])
    }

    /// Maps texts onto fixed axes by the words they contain
    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        fn name(&self) -> &str {
            "axis"
        }

        async fn embed(&self, text: &str) -> Result<Embedding> {
            let text = text.to_lowercase();
            Ok(vec![
                if text.contains("customer") { 1.0 } else { 0.0 },
                if text.contains("order") { 1.0 } else { 0.0 },
                if text.contains("shipment") { 1.0 } else { 0.0 },
            ])
        }
    }

    #[tokio::test]
    async fn test_table_index_ranks_by_similarity() {
        let index = TableIndex::build(Arc::new(AxisEmbedder), &catalog()).await.unwrap();
        assert_eq!(index.len(), 3);

        let hits = index.search("how many orders last month", 2).await.unwrap();
        assert_eq!(hits[0], "public.orders");
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_keyword_index_matches_fuzzy_terms() {
        let index = KeywordIndex::build(&catalog());

        let hits = index.search("How many orders were placed?", 5).await.unwrap();
        assert_eq!(hits, vec!["public.orders"]);

        let hits = index.search("customer count by region", 5).await.unwrap();
        assert_eq!(hits[0], "public.customers");

        assert!(index.search("weather tomorrow", 5).await.unwrap().is_empty());
    }

    #[test]
    fn test_table_document_text() {
        let entry = SchemaEntry::new("public", "orders").with_description("One row per order");
        assert_eq!(table_document_text(&entry), "public.orders: One row per order");
    }
}
