//! Natural-language question answering over a data warehouse.
//!
//! Each question is routed either to SQL (select tables, write a query, run
//! it, describe the rows) or to a document knowledge base. See
//! [`orchestrator::Assistant`] for the turn pipeline.

pub mod composer;
pub mod config;
pub mod conversation;
pub mod db;
pub mod error;
pub mod execution;
pub mod llm;
pub mod orchestrator;
pub mod prompts;
pub mod retrieval;
pub mod router;
pub mod schema;
pub mod schema_rag;
pub mod security;
pub mod selector;
pub mod synthesizer;

pub use config::AssistantConfig;
pub use conversation::{ConversationState, Session, TurnRecord};
pub use error::{QaError, Result};
pub use orchestrator::{Assistant, FailureKind, TurnAnswer, TurnStage};
pub use router::RouteDecision;
