//! Router
//!
//! Decides per question whether it is answered from warehouse tables (SQL)
//! or from the document knowledge base (RETRIEVAL).

use crate::conversation::{history_messages, TurnRecord};
use crate::error::{QaError, Result};
use crate::llm::{invoke_structured, LanguageModel, Prompt, PromptTask};
use crate::prompts::{router_schema, ROUTER_SYSTEM_PROMPT};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RouteDecision {
    Sql,
    Retrieval,
}

impl RouteDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteDecision::Sql => "SQL",
            RouteDecision::Retrieval => "RETRIEVAL",
        }
    }

    /// Strict parse of the model's label
    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim() {
            "SQL" => Some(RouteDecision::Sql),
            "RETRIEVAL" => Some(RouteDecision::Retrieval),
            _ => None,
        }
    }
}

impl fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct RouteReply {
    route: String,
}

pub struct Router {
    model: Arc<dyn LanguageModel>,
    retrieval_enabled: bool,
}

impl Router {
    pub fn new(model: Arc<dyn LanguageModel>, retrieval_enabled: bool) -> Self {
        Self {
            model,
            retrieval_enabled,
        }
    }

    /// Classify a question. `history` is the already windowed conversation.
    ///
    /// Replies that fail to decode, or name an unknown route, fall back to
    /// SQL. A failed model call is a routing error.
    pub async fn route(&self, question: &str, history: &[TurnRecord]) -> Result<RouteDecision> {
        if !self.retrieval_enabled {
            debug!("No retrieval source configured, routing to SQL");
            return Ok(RouteDecision::Sql);
        }

        let prompt = Prompt::new(PromptTask::Route, ROUTER_SYSTEM_PROMPT, question)
            .with_history(history_messages(history, false))
            .with_schema(router_schema());

        match invoke_structured::<RouteReply>(self.model.as_ref(), &prompt).await {
            Ok(reply) => match RouteDecision::parse_label(&reply.route) {
                Some(decision) => Ok(decision),
                None => {
                    warn!("Router returned unknown route '{}', defaulting to SQL", reply.route);
                    Ok(RouteDecision::Sql)
                }
            },
            Err(QaError::StructuredOutput(message)) => {
                warn!("Router reply could not be decoded, defaulting to SQL: {}", message);
                Ok(RouteDecision::Sql)
            }
            Err(e) => Err(QaError::Routing(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Reply {
        text: std::result::Result<&'static str, &'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for Reply {
        fn name(&self) -> &str {
            "reply"
        }

        async fn invoke(&self, _prompt: &Prompt) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.text
                .map(str::to_string)
                .map_err(|e| QaError::Llm(e.to_string()))
        }
    }

    fn router(text: std::result::Result<&'static str, &'static str>, retrieval: bool) -> (Router, Arc<Reply>) {
        let model = Arc::new(Reply {
            text,
            calls: AtomicUsize::new(0),
        });
        (Router::new(model.clone(), retrieval), model)
    }

    #[tokio::test]
    async fn test_routes_from_model_label() {
        let (r, _) = router(Ok(r#"{"route": "RETRIEVAL"}"#), true);
        assert_eq!(r.route("What is our refund policy?", &[]).await.unwrap(), RouteDecision::Retrieval);

        let (r, _) = router(Ok(r#"{"route": "SQL"}"#), true);
        assert_eq!(r.route("How many orders?", &[]).await.unwrap(), RouteDecision::Sql);
    }

    #[tokio::test]
    async fn test_unknown_or_garbled_defaults_to_sql() {
        let (r, _) = router(Ok(r#"{"route": "WEB"}"#), true);
        assert_eq!(r.route("q", &[]).await.unwrap(), RouteDecision::Sql);

        let (r, _) = router(Ok("I think SQL"), true);
        assert_eq!(r.route("q", &[]).await.unwrap(), RouteDecision::Sql);
    }

    #[tokio::test]
    async fn test_model_failure_is_routing_error() {
        let (r, _) = router(Err("503"), true);
        assert!(matches!(r.route("q", &[]).await, Err(QaError::Routing(_))));
    }

    #[tokio::test]
    async fn test_no_retrieval_skips_model() {
        let (r, model) = router(Ok(r#"{"route": "RETRIEVAL"}"#), false);
        assert_eq!(r.route("What is our refund policy?", &[]).await.unwrap(), RouteDecision::Sql);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_serde_labels() {
        assert_eq!(serde_json::to_string(&RouteDecision::Retrieval).unwrap(), "\"RETRIEVAL\"");
        assert_eq!(RouteDecision::parse_label(" SQL "), Some(RouteDecision::Sql));
        assert_eq!(RouteDecision::parse_label("sql"), None);
    }
}
