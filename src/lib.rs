pub mod agents;
pub mod chart;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod llm;
pub mod prompts;
pub mod responses;
pub mod retry;
pub mod state;

pub use config::{AppConfig, LlmSettings, PipelineSettings};
pub use error::{AgentError, Result};
pub use graph::{EventKind, EventSink, Orchestrator, ProgressEvent};
pub use llm::{LanguageModel, LlmClient};
pub use state::{ChartType, FinalState, QuerySessionState};
