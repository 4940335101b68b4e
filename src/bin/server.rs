//! HTTP server for the text-to-SQL assistant
//! Plain tokio TCP with minimal HTTP/1.1 handling; one turn per request.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use text2sql_agent::config::AppConfig;
use text2sql_agent::error::GENERIC_FAILURE_MESSAGE;
use text2sql_agent::graph::{CollectingSink, Orchestrator};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const MAX_REQUEST_BYTES: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Debug, PartialEq)]
struct Request {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let orchestrator = Arc::new(Orchestrator::from_config(&config).context("Failed to set up the pipeline")?);

    let listener = TcpListener::bind(&config.server_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server_addr))?;
    info!("Server listening on http://{}", config.server_addr);

    loop {
        let (stream, addr) = listener.accept().await?;
        info!("New connection from: {}", addr);
        tokio::spawn(handle_connection(stream, orchestrator.clone()));
    }
}

async fn handle_connection(mut stream: TcpStream, orchestrator: Arc<Orchestrator>) {
    let response = match read_request(&mut stream).await {
        Ok(Some(request)) => handle_request(request, &orchestrator).await,
        Ok(None) => create_response(400, "Bad Request", r#"{"error":"malformed request"}"#),
        Err(e) => {
            warn!("Failed to read from stream: {}", e);
            return;
        }
    };

    if let Err(e) = stream.write_all(response.as_bytes()).await {
        warn!("Failed to write response: {}", e);
    }
}

/// Read headers, then as much body as Content-Length announces.
async fn read_request(stream: &mut TcpStream) -> std::io::Result<Option<Request>> {
    let mut data = Vec::new();
    let mut buffer = [0u8; 4096];

    loop {
        let size = stream.read(&mut buffer).await?;
        if size == 0 {
            break;
        }
        data.extend_from_slice(&buffer[..size]);
        if data.len() > MAX_REQUEST_BYTES {
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&data);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let expected = content_length(&text[..header_end]);
            if data.len() >= header_end + 4 + expected {
                break;
            }
        }
    }

    Ok(parse_request(&String::from_utf8_lossy(&data)))
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

fn parse_request(raw: &str) -> Option<Request> {
    let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw, ""));
    let mut lines = head.lines();
    let mut parts = lines.next()?.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?;

    // Drop query parameters and trailing slash (except for root)
    let path = target.split('?').next().unwrap_or(target).trim_end_matches('/');
    let path = if path.is_empty() { "/" } else { path }.to_string();

    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_lowercase(), value.trim().to_string()))
        .collect();

    Some(Request {
        method,
        path,
        headers,
        body: body.to_string(),
    })
}

async fn handle_request(request: Request, orchestrator: &Orchestrator) -> String {
    info!("Request: {} {}", request.method, request.path);

    match (request.method.as_str(), request.path.as_str()) {
        ("OPTIONS", _) => create_response(204, "No Content", ""),
        ("GET", "/health") | ("GET", "/api/health") => {
            create_response(200, "OK", r#"{"status":"ok","service":"text2sql-agent"}"#)
        }
        ("POST", "/api/ask") => {
            if let Some(kind) = request.headers.get("content-type") {
                if !kind.starts_with("application/json") {
                    warn!("Unexpected content type: {}", kind);
                }
            }
            let ask: AskRequest = match serde_json::from_str::<AskRequest>(&request.body) {
                Ok(ask) if !ask.question.trim().is_empty() => ask,
                _ => {
                    return create_response(
                        400,
                        "Bad Request",
                        r#"{"error":"expected a JSON body with a non-empty \"question\""}"#,
                    )
                }
            };

            let sink = CollectingSink::new();
            match orchestrator.run_turn_with_events(ask.question.trim(), &sink).await {
                Ok(result) => {
                    let body = json!({"events": sink.events(), "result": result});
                    create_response(200, "OK", &body.to_string())
                }
                Err(e) => {
                    error!("Turn failed: {}", e);
                    let body = json!({"events": sink.events(), "error": GENERIC_FAILURE_MESSAGE});
                    create_response(500, "Internal Server Error", &body.to_string())
                }
            }
        }
        _ => create_response(404, "Not Found", r#"{"error":"not found"}"#),
    }
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}
