//! Language-model collaborator
//!
//! Every stage talks to the model through [`LanguageModel`]. The concrete
//! backend (OpenAI or Bedrock) is picked once at startup by [`from_settings`].

pub mod bedrock;
pub mod openai;

pub use bedrock::BedrockClient;
pub use openai::OpenAiClient;

use crate::config::{LlmProvider, LlmSettings};
use crate::error::{QaError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Which pipeline stage issued a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PromptTask {
    Route,
    SelectTables,
    WriteQuery,
    ComposeAnswer,
}

impl PromptTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptTask::Route => "route",
            PromptTask::SelectTables => "select_tables",
            PromptTask::WriteQuery => "write_query",
            PromptTask::ComposeAnswer => "compose_answer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// JSON schema the reply must conform to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSchema {
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
}

/// A single model request: system instructions, prior turns, the new user
/// message and an optional output schema.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub task: PromptTask,
    pub system: String,
    pub history: Vec<ChatMessage>,
    pub user: String,
    pub output_schema: Option<OutputSchema>,
}

impl Prompt {
    pub fn new(task: PromptTask, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            task,
            system: system.into(),
            history: Vec::new(),
            user: user.into(),
            output_schema: None,
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_schema(mut self, schema: OutputSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// History followed by the user message, in send order
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = self.history.clone();
        messages.push(ChatMessage::user(self.user.clone()));
        messages
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Backend name for logging (e.g. "openai", "bedrock")
    fn name(&self) -> &str;

    /// Send the prompt and return the raw reply text. When the prompt carries
    /// an output schema the reply is the JSON document.
    async fn invoke(&self, prompt: &Prompt) -> Result<String>;
}

/// Invoke with an output schema and decode the reply strictly into `T`.
///
/// Transport failures come back as [`QaError::Llm`]; replies that do not
/// decode come back as [`QaError::StructuredOutput`], so callers can apply
/// their own fallback.
pub async fn invoke_structured<T: DeserializeOwned>(
    model: &dyn LanguageModel,
    prompt: &Prompt,
) -> Result<T> {
    if prompt.output_schema.is_none() {
        return Err(QaError::StructuredOutput(format!(
            "prompt for {} has no output schema",
            prompt.task.as_str()
        )));
    }

    let response = model.invoke(prompt).await?;
    let cleaned = strip_code_fences(&response);
    debug!(task = prompt.task.as_str(), "structured reply: {}", cleaned);

    serde_json::from_str(cleaned).map_err(|e| {
        QaError::StructuredOutput(format!("Failed to decode {} reply: {}. Reply: {}", prompt.task.as_str(), e, cleaned))
    })
}

/// Remove a surrounding markdown code fence, if any
pub fn strip_code_fences(text: &str) -> &str {
    text.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```sql")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Build the configured backend
pub fn from_settings(settings: &LlmSettings) -> Result<Arc<dyn LanguageModel>> {
    match settings.provider {
        LlmProvider::OpenAi => {
            let api_key = settings
                .openai
                .api_key
                .clone()
                .ok_or_else(|| QaError::Config("OPENAI_API_KEY must be set for LLM_PROVIDER=openai".to_string()))?;
            Ok(Arc::new(OpenAiClient::new(
                api_key,
                settings.openai.model.clone(),
                settings.openai.base_url.clone(),
            )?))
        }
        LlmProvider::Bedrock => {
            let model_id = settings.bedrock.model_id.clone().ok_or_else(|| {
                QaError::Config("BEDROCK_INFERENCE_PROFILE_ID must be set for LLM_PROVIDER=bedrock".to_string())
            })?;
            let token = settings.bedrock.bearer_token.clone().ok_or_else(|| {
                QaError::Config("AWS_BEARER_TOKEN_BEDROCK must be set for LLM_PROVIDER=bedrock".to_string())
            })?;
            Ok(Arc::new(BedrockClient::new(
                token,
                settings.bedrock.region.clone(),
                model_id,
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl LanguageModel for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn invoke(&self, _prompt: &Prompt) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[derive(Deserialize)]
    struct Choice {
        route: String,
    }

    fn schema() -> OutputSchema {
        OutputSchema {
            name: "route".to_string(),
            description: "route".to_string(),
            schema: serde_json::json!({"type": "object"}),
        }
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  SELECT 1 "), "SELECT 1");
    }

    #[tokio::test]
    async fn test_invoke_structured_decodes_fenced_json() {
        let prompt = Prompt::new(PromptTask::Route, "sys", "q").with_schema(schema());
        let choice: Choice = invoke_structured(&Fixed("```json\n{\"route\":\"SQL\"}\n```"), &prompt)
            .await
            .unwrap();
        assert_eq!(choice.route, "SQL");
    }

    #[tokio::test]
    async fn test_invoke_structured_fails_closed() {
        let prompt = Prompt::new(PromptTask::Route, "sys", "q").with_schema(schema());
        let result: Result<Choice> = invoke_structured(&Fixed("I think SQL"), &prompt).await;
        assert!(matches!(result, Err(QaError::StructuredOutput(_))));

        let unschematized = Prompt::new(PromptTask::Route, "sys", "q");
        let result: Result<Choice> = invoke_structured(&Fixed("{\"route\":\"SQL\"}"), &unschematized).await;
        assert!(matches!(result, Err(QaError::StructuredOutput(_))));
    }
}
