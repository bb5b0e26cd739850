//! OpenAI chat completions backend

use crate::error::{QaError, Result};
use crate::llm::{LanguageModel, Prompt};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| QaError::Llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    fn request_body(&self, prompt: &Prompt) -> serde_json::Value {
        let mut messages = vec![serde_json::json!({"role": "system", "content": prompt.system})];
        messages.extend(
            prompt
                .messages()
                .iter()
                .map(|m| serde_json::json!({"role": m.role.as_str(), "content": m.content})),
        );

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0,
        });

        // Reasoning models reject a temperature and spend extra tokens
        if self.model.starts_with("gpt-5") || self.model.starts_with('o') {
            if let Some(obj) = body.as_object_mut() {
                obj.remove("temperature");
            }
            body["max_completion_tokens"] = serde_json::json!(4000);
        } else {
            body["max_completion_tokens"] = serde_json::json!(1500);
        }

        if let Some(ref schema) = prompt.output_schema {
            body["response_format"] = serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "description": schema.description,
                    "strict": true,
                    "schema": schema.schema,
                }
            });
        }

        body
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn invoke(&self, prompt: &Prompt) -> Result<String> {
        debug!(task = prompt.task.as_str(), model = %self.model, "calling OpenAI");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| QaError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(QaError::Llm(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| QaError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        if let Some(error) = response_json.get("error") {
            return Err(QaError::Llm(format!("LLM API error: {}", error)));
        }

        let choice = response_json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| QaError::Llm(format!("No choices in LLM response: {}", response_json)))?;

        match choice.get("finish_reason").and_then(|r| r.as_str()) {
            Some("length") => warn!(task = prompt.task.as_str(), "LLM response was truncated due to length limit"),
            Some("content_filter") => {
                return Err(QaError::Llm("LLM response was filtered by content policy".to_string()))
            }
            _ => {}
        }

        if let Some(refusal) = choice["message"]["refusal"].as_str() {
            return Err(QaError::Llm(format!("LLM refused the request: {}", refusal)));
        }

        let content = choice["message"]["content"]
            .as_str()
            .ok_or_else(|| QaError::Llm(format!("No content in LLM response: {}", response_json)))?;

        if content.trim().is_empty() {
            return Err(QaError::Llm("Empty content in LLM response".to_string()));
        }

        Ok(content.to_string())
    }
}
