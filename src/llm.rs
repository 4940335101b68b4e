use crate::config::LlmSettings;
use crate::error::{AgentError, Result};
use crate::responses::{ResponseShape, StructuredResponse};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"```[A-Za-z0-9_-]*").unwrap();
}

/// Model backend seam. Every stage talks to the model through this trait so
/// that the backend is injected rather than looked up globally.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Ask for a result matching `shape`; returns the raw JSON object.
    async fn invoke(&self, prompt: &str, shape: &ResponseShape) -> Result<serde_json::Value>;

    fn name(&self) -> &str {
        "llm"
    }
}

/// Invoke the model and decode its result into the stage's response type.
pub async fn invoke_structured<T: StructuredResponse>(
    model: &dyn LanguageModel,
    prompt: &str,
) -> Result<T> {
    let shape = T::shape();
    let value = model.invoke(prompt, &shape).await?;
    serde_json::from_value(value.clone()).map_err(|e| {
        AgentError::Llm(format!(
            "Response for '{}' did not match the expected shape: {}. Response: {}",
            shape.name, e, value
        ))
    })
}

/// Remove markdown code fences (```sql ... ```) a model may wrap text in.
pub fn strip_code_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text.trim(), "").trim().to_string()
}

/// OpenAI-compatible chat-completions client using function calling to get
/// structured results.
#[derive(Clone)]
pub struct LlmClient {
    settings: LlmSettings,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        let http = build_http_client(&settings)?;
        let retry = RetryPolicy::with_max_retries(settings.max_retries);
        Ok(Self { settings, http, retry })
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    /// Swap in new settings (model, key, timeouts) without touching callers.
    pub fn reconfigure(&mut self, settings: LlmSettings) -> Result<()> {
        self.http = build_http_client(&settings)?;
        self.retry = RetryPolicy::with_max_retries(settings.max_retries);
        self.settings = settings;
        Ok(())
    }

    fn request_body(&self, prompt: &str, shape: &ResponseShape) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.settings.model,
            "messages": [
                {"role": "system", "content": "You are part of a text-to-SQL assistant. Always answer by calling the provided function."},
                {"role": "user", "content": prompt}
            ],
            "functions": [{
                "name": shape.name,
                "description": shape.description,
                "parameters": shape.schema,
            }],
            "function_call": {"name": shape.name},
            "temperature": self.settings.temperature,
        });

        if let Some(max_tokens) = self.settings.max_tokens {
            if self.settings.model.starts_with("gpt-4") || self.settings.model.starts_with("gpt-5") || self.settings.model.contains("o1") {
                body["max_completion_tokens"] = serde_json::json!(max_tokens);
            } else {
                body["max_tokens"] = serde_json::json!(max_tokens);
            }
        }
        body
    }

    async fn call_once(&self, body: &serde_json::Value, shape: &ResponseShape) -> Result<serde_json::Value> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.settings.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::Timeout {
                        stage: format!("LLM call '{}'", shape.name),
                        elapsed: self.settings.timeout,
                    }
                } else if e.is_connect() || e.is_request() {
                    AgentError::LlmTransport(e.to_string())
                } else {
                    AgentError::Llm(format!("LLM API call failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AgentError::LlmStatus {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AgentError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        parse_function_arguments(&response_json, shape)
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn invoke(&self, prompt: &str, shape: &ResponseShape) -> Result<serde_json::Value> {
        if self.settings.api_key.is_empty() {
            return Err(AgentError::Config("OPENAI_API_KEY is not set".to_string()));
        }
        debug!("LLM request '{}' ({} prompt chars)", shape.name, prompt.len());
        let body = self.request_body(prompt, shape);
        self.retry
            .run(shape.name, || self.call_once(&body, shape))
            .await
    }

    fn name(&self) -> &str {
        &self.settings.model
    }
}

fn build_http_client(settings: &LlmSettings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(settings.timeout)
        .build()
        .map_err(|e| AgentError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Pull the function-call arguments out of a chat-completions response.
/// Falls back to message content when a backend answers with plain JSON.
fn parse_function_arguments(response_json: &serde_json::Value, shape: &ResponseShape) -> Result<serde_json::Value> {
    if let Some(error) = response_json.get("error") {
        return Err(AgentError::Llm(format!("LLM API error: {}", error)));
    }

    let choices = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| AgentError::Llm("No choices array in LLM response".to_string()))?;
    let message = choices
        .first()
        .map(|c| &c["message"])
        .ok_or_else(|| AgentError::Llm("Empty choices array in LLM response".to_string()))?;

    if let Some(finish_reason) = choices[0].get("finish_reason").and_then(|r| r.as_str()) {
        match finish_reason {
            "length" => warn!("LLM response for '{}' was truncated due to length limit", shape.name),
            "content_filter" => {
                return Err(AgentError::Llm("LLM response was filtered by content policy".to_string()))
            }
            _ => {}
        }
    }

    let raw = message
        .get("function_call")
        .and_then(|f| f.get("arguments"))
        .and_then(|a| a.as_str())
        .or_else(|| message.get("content").and_then(|c| c.as_str()))
        .ok_or_else(|| AgentError::Llm(format!("LLM did not call '{}'", shape.name)))?;

    let cleaned = strip_code_fences(raw);
    let value: serde_json::Value = serde_json::from_str(&cleaned).map_err(|e| {
        AgentError::Llm(format!("Failed to parse '{}' arguments: {}. Response: {}", shape.name, e, cleaned))
    })?;
    if !value.is_object() {
        return Err(AgentError::Llm(format!("'{}' arguments are not a JSON object", shape.name)));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responses::{GuardrailsResponse, SqlGenerationResponse};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```sql\nSELECT 1;\n```"), "SELECT 1;");
        assert_eq!(strip_code_fences("  SELECT 2  "), "SELECT 2");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn test_parse_function_call_arguments() {
        let shape = GuardrailsResponse::shape();
        let response = json!({
            "choices": [{
                "finish_reason": "stop",
                "message": {"function_call": {
                    "name": "classify_question",
                    "arguments": "{\"is_question_relevant\": true, \"is_greeting\": false, \"reason\": \"sales\"}"
                }}
            }]
        });
        let value = parse_function_arguments(&response, &shape).unwrap();
        assert_eq!(value["is_question_relevant"], json!(true));
    }

    #[test]
    fn test_parse_content_fallback_and_errors() {
        let shape = SqlGenerationResponse::shape();
        let content = json!({"choices": [{"message": {"content": "```json\n{\"sql_query\": \"SELECT 1\"}\n```"}}]});
        assert_eq!(parse_function_arguments(&content, &shape).unwrap()["sql_query"], json!("SELECT 1"));

        let filtered = json!({"choices": [{"finish_reason": "content_filter", "message": {}}]});
        assert!(parse_function_arguments(&filtered, &shape).is_err());

        let api_error = json!({"error": {"message": "quota"}});
        assert!(parse_function_arguments(&api_error, &shape).is_err());
    }

    #[test]
    fn test_request_body_forces_function() {
        let client = LlmClient::new(LlmSettings {
            api_key: "k".into(),
            max_tokens: Some(300),
            ..LlmSettings::default()
        })
        .unwrap();
        let body = client.request_body("hi", &GuardrailsResponse::shape());
        assert_eq!(body["function_call"]["name"], json!("classify_question"));
        assert_eq!(body["max_completion_tokens"], json!(300));
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let client = LlmClient::new(LlmSettings::default()).unwrap();
        let err = client.invoke("hi", &GuardrailsResponse::shape()).await.unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    /// Serve `status` with a fixed body on every connection; returns the base
    /// URL and a counter of requests served.
    async fn canned_backend(status: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let served = Arc::new(AtomicUsize::new(0));
        let counter = served.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut request = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                    let text = String::from_utf8_lossy(&request);
                    if let Some(head_end) = text.find("\r\n\r\n") {
                        let length = text[..head_end]
                            .lines()
                            .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
                            .and_then(|v| v.parse::<usize>().ok())
                            .unwrap_or(0);
                        if request.len() >= head_end + 4 + length {
                            break;
                        }
                    }
                }
                let reply = format!("HTTP/1.1 {}\r\nContent-Length: 4\r\nConnection: close\r\n\r\nbusy", status);
                let _ = socket.write_all(reply.as_bytes()).await;
            }
        });
        (format!("http://{}", addr), served)
    }

    fn client_for(base_url: String, max_retries: usize) -> LlmClient {
        LlmClient::new(LlmSettings {
            api_key: "k".into(),
            base_url,
            max_retries,
            timeout: std::time::Duration::from_secs(5),
            ..LlmSettings::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_by_status() {
        let (url, served) = canned_backend("503 Service Unavailable").await;
        let err = client_for(url, 1).invoke("hi", &GuardrailsResponse::shape()).await.unwrap_err();
        assert!(matches!(err, AgentError::LlmStatus { status: 503, .. }));
        assert_eq!(served.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let (url, served) = canned_backend("400 Bad Request").await;
        let err = client_for(url, 2).invoke("hi", &GuardrailsResponse::shape()).await.unwrap_err();
        assert!(matches!(err, AgentError::LlmStatus { status: 400, .. }));
        assert!(!err.is_transient());
        assert_eq!(served.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_error() {
        let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let err = client_for(format!("http://127.0.0.1:{}", port), 0)
            .invoke("hi", &GuardrailsResponse::shape())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::LlmTransport(_)), "{:?}", err);
    }

    #[test]
    fn test_reconfigure_swaps_model() {
        let mut client = LlmClient::new(LlmSettings::default()).unwrap();
        client
            .reconfigure(LlmSettings { model: "local-model".into(), ..LlmSettings::default() })
            .unwrap();
        assert_eq!(client.settings().model, "local-model");
        assert_eq!(client.name(), "local-model");
    }
}
