//! Application configuration
//!
//! Everything is read from the environment (after `.env` is loaded by the
//! binaries). Defaults match the bundled e-commerce dataset.

use crate::error::{AgentError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Model backend settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
    pub max_retries: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            max_tokens: None,
            timeout: Duration::from_secs(60),
            max_retries: 2,
        }
    }
}

/// Knobs the orchestrator and its stages read on every turn.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Retry ceiling shared by the router and the correction stage.
    pub max_retry_attempts: u32,
    /// Hard cap on node executions per turn.
    pub max_steps: usize,
    pub store_timeout: Duration,
    pub chart_max_points: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            max_steps: 50,
            store_timeout: Duration::from_secs(30),
            chart_max_points: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmSettings,
    pub pipeline: PipelineSettings,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub server_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            pipeline: PipelineSettings::default(),
            data_dir: PathBuf::from("data"),
            db_path: PathBuf::from("db_data").join("ecommerce.db"),
            server_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; `from_env` plugs in the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let llm = LlmSettings {
            api_key: get("OPENAI_API_KEY").unwrap_or_default(),
            base_url: get("LLM_BASE_URL").unwrap_or(defaults.llm.base_url),
            model: get("LLM_MODEL").unwrap_or(defaults.llm.model),
            temperature: parse_or(get("LLM_TEMPERATURE"), "LLM_TEMPERATURE", defaults.llm.temperature)?,
            max_tokens: match get("LLM_MAX_TOKENS") {
                Some(raw) => Some(parse_value(&raw, "LLM_MAX_TOKENS")?),
                None => None,
            },
            timeout: Duration::from_secs(parse_or(
                get("LLM_TIMEOUT_SECS"),
                "LLM_TIMEOUT_SECS",
                defaults.llm.timeout.as_secs(),
            )?),
            max_retries: parse_or(get("LLM_MAX_RETRIES"), "LLM_MAX_RETRIES", defaults.llm.max_retries)?,
        };

        let pipeline = PipelineSettings {
            max_retry_attempts: parse_or(
                get("MAX_SQL_RETRY_ATTEMPTS"),
                "MAX_SQL_RETRY_ATTEMPTS",
                defaults.pipeline.max_retry_attempts,
            )?,
            max_steps: parse_or(get("MAX_PIPELINE_STEPS"), "MAX_PIPELINE_STEPS", defaults.pipeline.max_steps)?,
            store_timeout: Duration::from_secs(parse_or(
                get("STORE_TIMEOUT_SECS"),
                "STORE_TIMEOUT_SECS",
                defaults.pipeline.store_timeout.as_secs(),
            )?),
            chart_max_points: parse_or(
                get("CHART_MAX_POINTS"),
                "CHART_MAX_POINTS",
                defaults.pipeline.chart_max_points,
            )?,
        };

        if pipeline.max_steps == 0 {
            return Err(AgentError::Config("MAX_PIPELINE_STEPS must be at least 1".to_string()));
        }

        Ok(Self {
            llm,
            pipeline,
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            db_path: get("DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            server_addr: get("SERVER_ADDR").unwrap_or(defaults.server_addr),
        })
    }

    /// The HTTP model client cannot work without a key.
    pub fn require_api_key(&self) -> Result<&str> {
        if self.llm.api_key.is_empty() {
            return Err(AgentError::Config(
                "OPENAI_API_KEY is not set. Put it in your .env file or environment.".to_string(),
            ));
        }
        Ok(&self.llm.api_key)
    }
}

fn parse_value<T: FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| AgentError::Config(format!("Invalid value for {}: '{}'", key, raw)))
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        Some(raw) => parse_value(&raw, key),
        None => Ok(default),
    }
}
