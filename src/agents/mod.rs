//! Pipeline stages
//!
//! Each stage is an async `State -> State` transformation. Stages only write
//! the state fields they own and report backend failures through the error
//! taxonomy; the graph decides what runs next.

pub mod analyzer;
pub mod error_corrector;
pub mod guardrails;
pub mod sql_executor;
pub mod sql_generator;
pub mod visualizer;
pub mod viz_decision;

use crate::config::PipelineSettings;
use crate::db::{DataStore, SCHEMA_DEFINITION};
use crate::llm::LanguageModel;
use std::sync::Arc;

/// Collaborators shared by all stages of a turn.
#[derive(Clone)]
pub struct StageContext {
    pub model: Arc<dyn LanguageModel>,
    pub store: Arc<dyn DataStore>,
    pub settings: PipelineSettings,
    pub schema: Arc<str>,
}

impl StageContext {
    pub fn new(model: Arc<dyn LanguageModel>, store: Arc<dyn DataStore>, settings: PipelineSettings) -> Self {
        Self {
            model,
            store,
            settings,
            schema: Arc::from(SCHEMA_DEFINITION),
        }
    }
}

/// Apology used whenever the retry budget is spent.
pub fn retry_exhausted_message(attempts: u32, error: &str) -> String {
    format!(
        "I apologize, but I'm unable to generate a correct SQL query for your question after {} attempts. \
         The error encountered was: {}\n\n\
         Please try rephrasing your question or contact support for assistance.",
        attempts, error
    )
}
