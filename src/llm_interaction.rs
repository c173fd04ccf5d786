use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, instrument, warn};

use crate::error::InferenceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message as sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// A full completion request: system instruction first, then the history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub stream: bool,
}

/// Lazy, finite, non-restartable sequence of text increments.
pub type CompletionStream = BoxStream<'static, Result<String, InferenceError>>;

/// Capability contract for whatever runs the model.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Makes the model available, reporting human-readable progress lines.
    async fn initialize(
        &self,
        progress: &(dyn Fn(String) + Send + Sync),
    ) -> Result<(), InferenceError>;

    /// Starts a streamed completion. Fails with [`InferenceError::NotReady`]
    /// until `initialize` has succeeded.
    async fn stream_completion(
        &self,
        request: ChatRequest,
    ) -> Result<CompletionStream, InferenceError>;
}

// Structures matching Ollama's /api/chat endpoint
#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct OllamaChatChunk {
    #[serde(default)]
    message: Option<OllamaChunkMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize, Debug)]
struct OllamaChunkMessage {
    #[serde(default)]
    content: String,
}

// Structures matching Ollama's /api/pull endpoint
#[derive(Serialize)]
struct OllamaPullRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Deserialize, Debug, Default)]
struct OllamaPullStatus {
    #[serde(default)]
    status: String,
    total: Option<u64>,
    completed: Option<u64>,
    error: Option<String>,
}

/// [`InferenceClient`] backed by a local Ollama server.
pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
    ready: AtomicBool,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            ready: AtomicBool::new(false),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn init_failed(&self, reason: impl Into<String>) -> InferenceError {
        InferenceError::InitFailed {
            model: self.model.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    #[instrument(skip(self, progress), fields(model = %self.model))]
    async fn initialize(
        &self,
        progress: &(dyn Fn(String) + Send + Sync),
    ) -> Result<(), InferenceError> {
        let url = format!("{}/api/pull", self.base_url);
        info!(%url, "Requesting model from Ollama");

        let response = self
            .http
            .post(&url)
            .json(&OllamaPullRequest {
                model: &self.model,
                stream: true,
            })
            .send()
            .await
            .map_err(|e| self.init_failed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %error_body, "Ollama pull request failed");
            return Err(self.init_failed(format!("status {}: {}", status, error_body)));
        }

        let mut lines = Box::pin(ndjson_lines(Box::pin(response.bytes_stream())));
        let mut succeeded = false;
        while let Some(line) = lines.next().await {
            let line = line.map_err(|e| self.init_failed(e.to_string()))?;
            let pull_status = match serde_json::from_str::<OllamaPullStatus>(&line) {
                Ok(s) => s,
                Err(e) => {
                    warn!(line_len = line.len(), error = %e, "Skipping malformed pull status line");
                    continue;
                }
            };
            if let Some(reason) = &pull_status.error {
                error!(%reason, "Ollama reported a pull error");
                return Err(self.init_failed(reason.clone()));
            }
            if pull_status.status == "success" {
                succeeded = true;
            }
            progress(describe_pull_status(&pull_status));
        }

        if !succeeded {
            return Err(self.init_failed("pull ended without a success status"));
        }

        self.ready.store(true, Ordering::Release);
        info!("Model ready");
        Ok(())
    }

    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn stream_completion(
        &self,
        request: ChatRequest,
    ) -> Result<CompletionStream, InferenceError> {
        if !self.is_ready() {
            return Err(InferenceError::NotReady);
        }

        let url = format!("{}/api/chat", self.base_url);
        let payload = OllamaChatRequest {
            model: &self.model,
            messages: &request.messages,
            stream: request.stream,
            options: OllamaOptions {
                temperature: request.temperature,
            },
        };

        let response = self.http.post(&url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %error_body, "Ollama chat request failed");
            return Err(InferenceError::StreamFailed(format!(
                "Ollama returned status {}: {}",
                status, error_body
            )));
        }

        debug!(messages = request.messages.len(), "Streaming completion started");
        let deltas = ndjson_lines(Box::pin(response.bytes_stream())).filter_map(|line| async move {
            match line {
                Ok(line) => parse_chat_line(&line).transpose(),
                Err(e) => Some(Err(e)),
            }
        });
        Ok(deltas.boxed())
    }
}

/// Text content of one /api/chat stream line, if any.
fn parse_chat_line(line: &str) -> Result<Option<String>, InferenceError> {
    let chunk = match serde_json::from_str::<OllamaChatChunk>(line) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(line_len = line.len(), error = %e, "Skipping malformed chat stream line");
            return Ok(None);
        }
    };
    if let Some(reason) = chunk.error {
        return Err(InferenceError::StreamFailed(reason));
    }
    Ok(chunk
        .message
        .map(|m| m.content)
        .filter(|content| !content.is_empty()))
}

fn describe_pull_status(status: &OllamaPullStatus) -> String {
    match (status.total, status.completed) {
        (Some(total), Some(completed)) if total > 0 => {
            format!("{} ({}%)", status.status, completed.min(total) * 100 / total)
        }
        _ => status.status.clone(),
    }
}

/// Splits a chunked byte body into newline-delimited lines. Lines may span
/// chunk boundaries; blank lines are skipped.
fn ndjson_lines<S, B, E>(body: S) -> impl Stream<Item = Result<String, InferenceError>> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    stream::unfold(
        (body, Vec::<u8>::new(), false),
        |(mut body, mut buf, mut exhausted)| async move {
            loop {
                if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                    let raw: Vec<u8> = buf.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&raw).trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    return Some((Ok(line), (body, buf, exhausted)));
                }
                if exhausted {
                    let line = String::from_utf8_lossy(&buf).trim().to_string();
                    buf.clear();
                    if line.is_empty() {
                        return None;
                    }
                    return Some((Ok(line), (body, buf, exhausted)));
                }
                match body.next().await {
                    Some(Ok(chunk)) => buf.extend_from_slice(chunk.as_ref()),
                    Some(Err(e)) => {
                        error!("Stream error: {}", e);
                        buf.clear();
                        exhausted = true;
                        return Some((
                            Err(InferenceError::StreamFailed(e.to_string())),
                            (body, buf, exhausted),
                        ));
                    }
                    None => exhausted = true,
                }
            }
        },
    )
}
