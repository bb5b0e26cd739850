//! Bedrock knowledge base client (`RetrieveAndGenerate`)

use crate::error::{QaError, Result};
use crate::retrieval::{Citation, RetrievalSource, RetrievedAnswer};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Characters of a passage kept in its citation
const EXCERPT_CHARS: usize = 200;

pub struct KnowledgeBaseClient {
    client: Client,
    bearer_token: String,
    endpoint: String,
    knowledge_base_id: String,
    model_arn: String,
    max_citations: usize,
}

impl KnowledgeBaseClient {
    pub fn new(
        bearer_token: String,
        region: &str,
        knowledge_base_id: String,
        model: &str,
        max_citations: usize,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| QaError::Retrieval(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            bearer_token,
            endpoint: format!("https://bedrock-agent-runtime.{}.amazonaws.com", region),
            knowledge_base_id,
            model_arn: model_arn(region, model),
            max_citations,
        })
    }

    fn request_body(&self, question: &str) -> serde_json::Value {
        serde_json::json!({
            "input": {"text": question},
            "retrieveAndGenerateConfiguration": {
                "type": "KNOWLEDGE_BASE",
                "knowledgeBaseConfiguration": {
                    "knowledgeBaseId": self.knowledge_base_id,
                    "modelArn": self.model_arn,
                    "retrievalConfiguration": {
                        "vectorSearchConfiguration": {"numberOfResults": self.max_citations.max(1)}
                    }
                }
            }
        })
    }
}

/// Full ARN for a model id; ARNs pass through unchanged
pub fn model_arn(region: &str, model: &str) -> String {
    if model.starts_with("arn:") {
        model.to_string()
    } else {
        format!("arn:aws:bedrock:{}::foundation-model/{}", region, model)
    }
}

fn reference_source(reference: &serde_json::Value) -> String {
    let metadata = &reference["metadata"];
    metadata["source"]
        .as_str()
        .or_else(|| metadata["x-amz-bedrock-kb-source-uri"].as_str())
        .or_else(|| reference["location"]["s3Location"]["uri"].as_str())
        .or_else(|| reference["location"]["webLocation"]["url"].as_str())
        .unwrap_or("Unknown source")
        .to_string()
}

fn excerpt(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= EXCERPT_CHARS {
        text.to_string()
    } else {
        let cut: String = text.chars().take(EXCERPT_CHARS).collect();
        format!("{}...", cut.trim_end())
    }
}

/// Parse a `RetrieveAndGenerate` response. Each citation group gets one
/// marker number, shared by its references; at most `max_citations`
/// references are kept.
pub fn parse_response(response_json: &serde_json::Value, max_citations: usize) -> Result<RetrievedAnswer> {
    let text = response_json["output"]["text"].as_str().unwrap_or("").trim().to_string();
    if text.is_empty() {
        return Err(QaError::Retrieval("The knowledge base returned no answer".to_string()));
    }

    let mut citations = Vec::new();
    let groups = response_json["citations"].as_array().cloned().unwrap_or_default();
    'groups: for (group_index, group) in groups.iter().enumerate() {
        let references = group["retrievedReferences"].as_array().cloned().unwrap_or_default();
        for reference in &references {
            if citations.len() >= max_citations {
                break 'groups;
            }
            citations.push(Citation {
                index: group_index + 1,
                source: reference_source(reference),
                excerpt: excerpt(reference["content"]["text"].as_str().unwrap_or("")),
            });
        }
    }

    Ok(RetrievedAnswer { text, citations })
}

#[async_trait]
impl RetrievalSource for KnowledgeBaseClient {
    fn name(&self) -> &str {
        "bedrock knowledge base"
    }

    async fn ask(&self, question: &str) -> Result<RetrievedAnswer> {
        debug!("Querying knowledge base {}", self.knowledge_base_id);

        let response = self
            .client
            .post(format!("{}/retrieveAndGenerate", self.endpoint))
            .bearer_auth(&self.bearer_token)
            .header("Content-Type", "application/json")
            .json(&self.request_body(question))
            .send()
            .await
            .map_err(|e| QaError::Retrieval(format!("Knowledge base request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(QaError::Retrieval(format!(
                "Knowledge base error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| QaError::Retrieval(format!("Failed to parse knowledge base response: {}", e)))?;

        let answer = parse_response(&response_json, self.max_citations)?;
        info!(citations = answer.citations.len(), "Knowledge base answered");
        Ok(answer)
    }
}
