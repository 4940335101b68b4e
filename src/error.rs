use std::time::Duration;
use thiserror::Error;

/// Text shown to the user when a turn fails for any reason other than a
/// recoverable SQL error.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "An error occurred while processing your question. Please try rephrasing it.";

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(String),

    /// The backend answered with a non-success HTTP status.
    #[error("LLM API error ({status}): {message}")]
    LlmStatus { status: u16, message: String },

    /// The request never got an HTTP answer (connect, reset, DNS).
    #[error("LLM API call failed: {0}")]
    LlmTransport(String),

    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("SQL generation failed: {0}")]
    Generation(String),

    #[error("Analysis failed: {0}")]
    Analysis(String),

    #[error("Data store error: {0}")]
    Store(String),

    #[error("{stage} timed out after {elapsed:?}")]
    Timeout { stage: String, elapsed: Duration },

    #[error("Pipeline exceeded {0} stage executions")]
    StepLimit(usize),

    #[error("Chart error: {0}")]
    Chart(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl AgentError {
    /// Message safe to display at the chat boundary.
    pub fn user_message(&self) -> &'static str {
        GENERIC_FAILURE_MESSAGE
    }

    /// Transport failures worth another attempt against the model backend.
    pub fn is_transient(&self) -> bool {
        match self {
            AgentError::Timeout { .. } | AgentError::LlmTransport(_) => true,
            AgentError::LlmStatus { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
