//! Amazon Bedrock backend (Converse API)
//!
//! Authenticates with a Bedrock API key sent as a bearer token. Structured
//! output is obtained by forcing a single tool whose input schema is the
//! requested output schema; the tool input is returned as the JSON reply.

use crate::error::{QaError, Result};
use crate::llm::{LanguageModel, Prompt};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct BedrockClient {
    client: Client,
    bearer_token: String,
    endpoint: String,
    model_id: String,
}

impl BedrockClient {
    pub fn new(bearer_token: String, region: String, model_id: String) -> Result<Self> {
        Self::with_endpoint(
            bearer_token,
            format!("https://bedrock-runtime.{}.amazonaws.com", region),
            model_id,
        )
    }

    pub fn with_endpoint(bearer_token: String, endpoint: String, model_id: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| QaError::Llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            bearer_token,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model_id,
        })
    }

    /// `{endpoint}/model/{model_id}/converse` with the model id percent-encoded
    /// (inference profile ARNs contain `:` and `/`).
    fn converse_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| QaError::Config(format!("Invalid Bedrock endpoint {}: {}", self.endpoint, e)))?;
        url.path_segments_mut()
            .map_err(|_| QaError::Config(format!("Invalid Bedrock endpoint {}", self.endpoint)))?
            .extend(["model", self.model_id.as_str(), "converse"]);
        Ok(url)
    }

    fn request_body(&self, prompt: &Prompt) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = prompt
            .messages()
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": [{"text": m.content}],
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "system": [{"text": prompt.system}],
            "messages": messages,
            "inferenceConfig": {"temperature": 0, "maxTokens": 1500},
        });

        if let Some(ref schema) = prompt.output_schema {
            body["toolConfig"] = serde_json::json!({
                "tools": [{
                    "toolSpec": {
                        "name": schema.name,
                        "description": schema.description,
                        "inputSchema": {"json": schema.schema},
                    }
                }],
                "toolChoice": {"tool": {"name": schema.name}},
            });
        }

        body
    }
}

/// Pull the reply out of a Converse response: the forced tool's input when a
/// schema was requested, otherwise the concatenated text blocks.
fn extract_reply(response_json: &serde_json::Value, structured: bool) -> Result<String> {
    let content = response_json["output"]["message"]["content"]
        .as_array()
        .ok_or_else(|| QaError::Llm(format!("No message content in Bedrock response: {}", response_json)))?;

    if structured {
        if let Some(input) = content.iter().find_map(|block| block.get("toolUse").map(|t| &t["input"])) {
            return Ok(input.to_string());
        }
        warn!("Bedrock reply did not use the requested tool, falling back to text");
    }

    let text: Vec<&str> = content.iter().filter_map(|block| block["text"].as_str()).collect();
    let text = text.join("\n");
    if text.trim().is_empty() {
        return Err(QaError::Llm("Empty content in Bedrock response".to_string()));
    }
    Ok(text)
}

#[async_trait]
impl LanguageModel for BedrockClient {
    fn name(&self) -> &str {
        "bedrock"
    }

    async fn invoke(&self, prompt: &Prompt) -> Result<String> {
        debug!(task = prompt.task.as_str(), model = %self.model_id, "calling Bedrock");

        let response = self
            .client
            .post(self.converse_url()?)
            .bearer_auth(&self.bearer_token)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| QaError::Llm(format!("Bedrock API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(QaError::Llm(format!("Bedrock API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| QaError::Llm(format!("Failed to parse Bedrock response: {}", e)))?;

        if response_json["stopReason"].as_str() == Some("max_tokens") {
            warn!(task = prompt.task.as_str(), "Bedrock response was truncated due to length limit");
        }

        extract_reply(&response_json, prompt.output_schema.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{OutputSchema, PromptTask};

    #[test]
    fn test_converse_url_encodes_profile_arn() {
        let client = BedrockClient::new(
            "token".into(),
            "us-east-1".into(),
            "arn:aws:bedrock:us-east-1:123:inference-profile/us.anthropic.claude".into(),
        )
        .unwrap();
        let url = client.converse_url().unwrap();
        assert!(url.as_str().starts_with("https://bedrock-runtime.us-east-1.amazonaws.com/model/arn"));
        assert!(url.as_str().contains("inference-profile%2Fus.anthropic.claude"));
        assert!(url.as_str().ends_with("/converse"));
    }

    #[test]
    fn test_request_body_forces_tool() {
        let client = BedrockClient::new("t".into(), "us-east-1".into(), "m".into()).unwrap();
        let prompt = Prompt::new(PromptTask::Route, "classify", "q").with_schema(OutputSchema {
            name: "route_question".into(),
            description: "d".into(),
            schema: serde_json::json!({"type": "object"}),
        });
        let body = client.request_body(&prompt);
        assert_eq!(body["toolConfig"]["toolChoice"]["tool"]["name"], "route_question");
        assert_eq!(body["messages"][0]["content"][0]["text"], "q");
    }

    #[test]
    fn test_extract_reply() {
        let tool = serde_json::json!({
            "output": {"message": {"content": [{"toolUse": {"toolUseId": "1", "name": "r", "input": {"route": "SQL"}}}]}}
        });
        assert_eq!(extract_reply(&tool, true).unwrap(), r#"{"route":"SQL"}"#);

        let text = serde_json::json!({"output": {"message": {"content": [{"text": "SELECT 1"}]}}});
        assert_eq!(extract_reply(&text, false).unwrap(), "SELECT 1");
        assert!(extract_reply(&serde_json::json!({}), false).is_err());
    }
}
