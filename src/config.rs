//! Assistant configuration
//!
//! Everything is read from environment variables (the binary loads `.env`
//! first). Provider choices are resolved here once; the rest of the crate
//! only sees the resulting trait objects.

use crate::error::{QaError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Bedrock,
}

impl FromStr for LlmProvider {
    type Err = QaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "bedrock" => Ok(LlmProvider::Bedrock),
            other => Err(QaError::Config(format!("Unsupported LLM_PROVIDER: {}", other))),
        }
    }
}

/// Backend used to narrow the catalog before table selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    OpenAi,
    Bedrock,
    Keyword,
    None,
}

impl FromStr for EmbeddingProvider {
    type Err = QaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(EmbeddingProvider::OpenAi),
            "bedrock" => Ok(EmbeddingProvider::Bedrock),
            "keyword" => Ok(EmbeddingProvider::Keyword),
            "none" | "" => Ok(EmbeddingProvider::None),
            other => Err(QaError::Config(format!("Unsupported EMBEDDING_PROVIDER: {}", other))),
        }
    }
}

/// SQL flavour of the warehouse, used for prompting and parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarehouseDialect {
    Redshift,
    Postgres,
    Generic,
}

impl WarehouseDialect {
    pub fn platform_name(&self) -> &'static str {
        match self {
            WarehouseDialect::Redshift => "AWS Redshift",
            WarehouseDialect::Postgres => "PostgreSQL",
            WarehouseDialect::Generic => "ANSI SQL",
        }
    }

    /// Extra rules appended to the synthesis prompt
    pub fn prompt_rules(&self) -> &'static str {
        match self {
            WarehouseDialect::Redshift => {
                "Use Redshift functions such as DATEADD, DATE_TRUNC and GETDATE() for date arithmetic."
            }
            WarehouseDialect::Postgres => {
                "Use PostgreSQL date arithmetic such as now() - interval '1 month' and date_trunc."
            }
            WarehouseDialect::Generic => "",
        }
    }
}

impl FromStr for WarehouseDialect {
    type Err = QaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "redshift" => Ok(WarehouseDialect::Redshift),
            "postgres" | "postgresql" => Ok(WarehouseDialect::Postgres),
            "generic" | "ansi" => Ok(WarehouseDialect::Generic),
            other => Err(QaError::Config(format!("Unsupported WAREHOUSE_DIALECT: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct BedrockSettings {
    pub region: String,
    pub model_id: Option<String>,
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub openai: OpenAiSettings,
    pub bedrock: BedrockSettings,
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    /// Provider default when unset
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WarehouseSettings {
    pub url: Option<String>,
    pub schema: String,
    pub external_schema: Option<String>,
    pub schema_file: Option<PathBuf>,
    pub hidden_marker: String,
}

/// Knobs of the turn pipeline itself
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub dialect: WarehouseDialect,
    pub top_k: usize,
    pub history_turns: usize,
    pub row_limit: usize,
    pub max_result_rows: usize,
    pub query_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            dialect: WarehouseDialect::Redshift,
            top_k: 5,
            history_turns: 6,
            row_limit: 10,
            max_result_rows: 50,
            query_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub knowledge_base_id: Option<String>,
    pub model_arn: Option<String>,
    pub region: String,
    pub max_citations: usize,
}

impl RetrievalSettings {
    pub fn enabled(&self) -> bool {
        self.knowledge_base_id.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub warehouse: WarehouseSettings,
    pub pipeline: PipelineSettings,
    pub retrieval: RetrievalSettings,
}

impl AssistantConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let provider = match get("LLM_PROVIDER") {
            Some(p) => p.parse()?,
            None => LlmProvider::OpenAi,
        };

        let region = get("BEDROCK_REGION")
            .or_else(|| get("AWS_REGION"))
            .unwrap_or_else(|| "us-east-1".to_string());

        let llm = LlmSettings {
            provider,
            openai: OpenAiSettings {
                api_key: get("OPENAI_API_KEY"),
                model: get("OPENAI_MODEL_ID").unwrap_or_else(|| "gpt-4.1".to_string()),
                base_url: get("OPENAI_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            },
            bedrock: BedrockSettings {
                region: region.clone(),
                model_id: get("BEDROCK_INFERENCE_PROFILE_ID"),
                bearer_token: get("AWS_BEARER_TOKEN_BEDROCK"),
            },
        };

        let embedding = EmbeddingSettings {
            provider: match get("EMBEDDING_PROVIDER") {
                Some(p) => p.parse()?,
                None => EmbeddingProvider::None,
            },
            model: get("EMBEDDING_MODEL"),
        };

        let warehouse = WarehouseSettings {
            url: get("WAREHOUSE_URL").or_else(|| get("DATABASE_URL")),
            schema: get("WAREHOUSE_SCHEMA")
                .or_else(|| get("REDSHIFT_SCHEMA"))
                .unwrap_or_else(|| "public".to_string()),
            external_schema: get("WAREHOUSE_EXTERNAL_SCHEMA"),
            schema_file: get("SCHEMA_FILE").map(PathBuf::from),
            hidden_marker: get("HIDDEN_MARKER").unwrap_or_else(|| "hidden".to_string()),
        };

        let defaults = PipelineSettings::default();
        let pipeline = PipelineSettings {
            dialect: match get("WAREHOUSE_DIALECT") {
                Some(d) => d.parse()?,
                None => defaults.dialect,
            },
            top_k: parse_number(&get, "SCHEMA_SEARCH_TOP_K", defaults.top_k)?,
            history_turns: parse_number(&get, "HISTORY_TURNS", defaults.history_turns)?,
            row_limit: parse_number(&get, "QUERY_ROW_LIMIT", defaults.row_limit)?,
            max_result_rows: parse_number(&get, "MAX_RESULT_ROWS", defaults.max_result_rows)?,
            query_timeout: Duration::from_secs(parse_number(
                &get,
                "QUERY_TIMEOUT_SECS",
                defaults.query_timeout.as_secs(),
            )?),
        };

        if pipeline.top_k == 0 {
            return Err(QaError::Config("SCHEMA_SEARCH_TOP_K must be at least 1".to_string()));
        }

        let retrieval = RetrievalSettings {
            knowledge_base_id: get("AWS_KNOWLEDGE_BASE_ID"),
            model_arn: get("KNOWLEDGE_BASE_MODEL_ARN").or_else(|| get("BEDROCK_INFERENCE_PROFILE_ID")),
            region,
            max_citations: parse_number(&get, "KNOWLEDGE_BASE_MAX_CITATIONS", 5)?,
        };

        Ok(Self {
            llm,
            embedding,
            warehouse,
            pipeline,
            retrieval,
        })
    }
}

fn parse_number<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| QaError::Config(format!("{} must be a non-negative integer, got '{}'", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AssistantConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AssistantConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.openai.model, "gpt-4.1");
        assert_eq!(config.embedding.provider, EmbeddingProvider::None);
        assert_eq!(config.warehouse.schema, "public");
        assert_eq!(config.warehouse.hidden_marker, "hidden");
        assert_eq!(config.pipeline.top_k, 5);
        assert_eq!(config.pipeline.query_timeout, Duration::from_secs(30));
        assert!(!config.retrieval.enabled());
    }

    #[test]
    fn test_bedrock_and_legacy_names() {
        let config = config_from(&[
            ("LLM_PROVIDER", "Bedrock"),
            ("AWS_REGION", "eu-west-1"),
            ("BEDROCK_INFERENCE_PROFILE_ID", "eu.anthropic.claude"),
            ("REDSHIFT_SCHEMA", "sales"),
            ("DATABASE_URL", "postgres://localhost/dw"),
            ("AWS_KNOWLEDGE_BASE_ID", "KB123"),
        ])
        .unwrap();
        assert_eq!(config.llm.provider, LlmProvider::Bedrock);
        assert_eq!(config.llm.bedrock.region, "eu-west-1");
        assert_eq!(config.warehouse.schema, "sales");
        assert_eq!(config.warehouse.url.as_deref(), Some("postgres://localhost/dw"));
        assert!(config.retrieval.enabled());
        assert_eq!(config.retrieval.model_arn.as_deref(), Some("eu.anthropic.claude"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(config_from(&[("LLM_PROVIDER", "azure")]), Err(QaError::Config(_))));
        assert!(matches!(config_from(&[("HISTORY_TURNS", "many")]), Err(QaError::Config(_))));
        assert!(matches!(config_from(&[("SCHEMA_SEARCH_TOP_K", "0")]), Err(QaError::Config(_))));
    }
}
