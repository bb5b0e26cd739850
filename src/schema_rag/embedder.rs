//! Text embedders
//!
//! OpenAI embeddings endpoint and Bedrock Titan text embeddings.

use crate::error::{QaError, Result};
use crate::schema_rag::vector_store::Embedding;
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::future::Future;
use std::time::Duration;

/// Inputs per `/embeddings` request; the API rejects more than 2048
const OPENAI_BATCH_SIZE: usize = 512;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed several texts, in order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }
}

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| QaError::Embedding(format!("Failed to create HTTP client: {}", e)))
}

fn parse_vector(value: &serde_json::Value) -> Result<Embedding> {
    let values = value
        .as_array()
        .ok_or_else(|| QaError::Embedding("No embedding vector in response".to_string()))?;
    let embedding: Embedding = values.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect();
    if embedding.is_empty() {
        return Err(QaError::Embedding("Empty embedding vector in response".to_string()));
    }
    Ok(embedding)
}

/// Embedding client using OpenAI API
pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String, // e.g., "text-embedding-3-small"
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, base_url: String, model: String) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    async fn request(&self, input: serde_json::Value) -> Result<serde_json::Value> {
        let body = serde_json::json!({
            "model": self.model,
            "input": input,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| QaError::Embedding(format!("Embedding API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(QaError::Embedding(format!("Embedding API error ({}): {}", status, error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| QaError::Embedding(format!("Failed to parse embedding response: {}", e)))
    }
}

/// `data[*].embedding`, ordered by each item's `index`
fn openai_vectors(response_json: &serde_json::Value, expected: usize) -> Result<Vec<Embedding>> {
    let data = response_json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| QaError::Embedding("No embedding data in response".to_string()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item.get("index").and_then(|i| i.as_u64()).map(|i| i as usize).unwrap_or(position);
        indexed.push((index, parse_vector(&item["embedding"])?));
    }
    indexed.sort_by_key(|(index, _)| *index);

    if indexed.len() != expected {
        return Err(QaError::Embedding(format!(
            "Expected {} embeddings, got {}",
            expected,
            indexed.len()
        )));
    }
    Ok(indexed.into_iter().map(|(_, e)| e).collect())
}

/// Send `texts` in chunks of at most `chunk_size`, keeping input order
async fn embed_in_chunks<F, Fut>(texts: &[String], chunk_size: usize, mut request: F) -> Result<Vec<Embedding>>
where
    F: FnMut(Vec<String>) -> Fut,
    Fut: Future<Output = Result<Vec<Embedding>>>,
{
    let mut embeddings = Vec::with_capacity(texts.len());
    for chunk in texts.chunks(chunk_size.max(1)) {
        embeddings.extend(request(chunk.to_vec()).await?);
    }
    Ok(embeddings)
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let response_json = self.request(serde_json::json!(text)).await?;
        let mut vectors = openai_vectors(&response_json, 1)?;
        vectors
            .pop()
            .ok_or_else(|| QaError::Embedding("No embedding data in response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        embed_in_chunks(texts, OPENAI_BATCH_SIZE, |chunk| async move {
            let response_json = self.request(serde_json::json!(chunk)).await?;
            openai_vectors(&response_json, chunk.len())
        })
        .await
    }
}

/// Titan text embeddings through Bedrock `InvokeModel`
pub struct BedrockEmbedder {
    client: Client,
    bearer_token: String,
    endpoint: String,
    model_id: String,
}

impl BedrockEmbedder {
    pub fn new(bearer_token: String, region: String, model_id: String) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            bearer_token,
            endpoint: format!("https://bedrock-runtime.{}.amazonaws.com", region),
            model_id,
        })
    }

    fn invoke_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| QaError::Config(format!("Invalid Bedrock endpoint {}: {}", self.endpoint, e)))?;
        url.path_segments_mut()
            .map_err(|_| QaError::Config(format!("Invalid Bedrock endpoint {}", self.endpoint)))?
            .extend(["model", self.model_id.as_str(), "invoke"]);
        Ok(url)
    }
}

#[async_trait]
impl Embedder for BedrockEmbedder {
    fn name(&self) -> &str {
        "bedrock"
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let response = self
            .client
            .post(self.invoke_url()?)
            .bearer_auth(&self.bearer_token)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(&serde_json::json!({ "inputText": text }))
            .send()
            .await
            .map_err(|e| QaError::Embedding(format!("Bedrock embedding call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(QaError::Embedding(format!(
                "Bedrock embedding error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| QaError::Embedding(format!("Failed to parse Bedrock embedding response: {}", e)))?;

        parse_vector(&response_json["embedding"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_vectors_follow_index() {
        let response = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vectors = openai_vectors(&response, 2).unwrap();
        assert_eq!(vectors[0], vec![1.0, 0.0]);
        assert_eq!(vectors[1], vec![0.0, 1.0]);

        assert!(openai_vectors(&response, 3).is_err());
        assert!(openai_vectors(&serde_json::json!({"error": "x"}), 1).is_err());
    }

    #[tokio::test]
    async fn test_large_batches_are_chunked_in_order() {
        let texts: Vec<String> = (0..1200).map(|i| format!("table_{}", i)).collect();
        let mut sizes = Vec::new();
        let embeddings = embed_in_chunks(&texts, OPENAI_BATCH_SIZE, |chunk| {
            sizes.push(chunk.len());
            async move {
                Ok(chunk
                    .iter()
                    .map(|t| vec![t.trim_start_matches("table_").parse::<f32>().unwrap()])
                    .collect())
            }
        })
        .await
        .unwrap();

        assert_eq!(sizes, vec![512, 512, 176]);
        assert_eq!(embeddings.len(), 1200);
        assert_eq!(embeddings[0], vec![0.0]);
        assert_eq!(embeddings[513], vec![513.0]);
        assert_eq!(embeddings[1199], vec![1199.0]);
    }

    #[tokio::test]
    async fn test_chunk_failure_aborts_batch() {
        let texts: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        let mut calls = 0;
        let result = embed_in_chunks(&texts, 4, |chunk| {
            calls += 1;
            let fail = calls == 2;
            async move {
                if fail {
                    Err(QaError::Embedding("rate limited".to_string()))
                } else {
                    Ok(chunk.iter().map(|_| vec![1.0]).collect())
                }
            }
        })
        .await;

        assert!(matches!(result, Err(QaError::Embedding(_))));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_bedrock_invoke_url_encodes_model() {
        let embedder = BedrockEmbedder::new(
            "token".to_string(),
            "us-west-2".to_string(),
            "amazon.titan-embed-text-v2:0".to_string(),
        )
        .unwrap();
        let url = embedder.invoke_url().unwrap();
        assert_eq!(url.host_str(), Some("bedrock-runtime.us-west-2.amazonaws.com"));
        assert!(url.path().starts_with("/model/amazon.titan-embed-text-v2"));
        assert!(url.path().ends_with("/invoke"));
    }
}
