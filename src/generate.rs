use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A text-generation backend.
#[async_trait]
pub trait Generate: Send + Sync {
    /// Generate a completion for `prompt`, giving up after `deadline`.
    async fn generate(&self, prompt: &str, deadline: Duration) -> Result<String>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

/// One line of the streamed response body.
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: Option<bool>,
}

/// Client for an Ollama-style `/api/generate` endpoint.
#[derive(Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            model: model.into(),
        }
    }

    async fn stream_completion(&self, prompt: &str) -> Result<String> {
        let response = self
            .http
            .post(&self.url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
            })
            .send()
            .await
            .map_err(|e| Error::service(e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "generation request rejected");
            return Err(Error::service(Some(status.as_u16()), body));
        }

        let mut assembler = ChunkAssembler::default();
        let mut stream = response.bytes_stream();
        while let Some(bytes) = stream.next().await {
            let bytes = bytes.map_err(|e| Error::service(None, e.to_string()))?;
            if assembler.feed(&bytes) {
                return Ok(assembler.into_text());
            }
        }
        assembler.finish();
        Ok(assembler.into_text())
    }
}

#[async_trait]
impl Generate for OllamaClient {
    async fn generate(&self, prompt: &str, deadline: Duration) -> Result<String> {
        debug!(model = %self.model, url = %self.url, prompt_len = prompt.len(), "generate");
        tokio::time::timeout(deadline, self.stream_completion(prompt))
            .await
            .map_err(|_| Error::Timeout(deadline))?
    }
}

/// Splits a byte stream into newline-delimited JSON chunks and concatenates
/// their `response` fragments. Undecodable lines are skipped.
#[derive(Default)]
struct ChunkAssembler {
    pending: Vec<u8>,
    text: String,
    done: bool,
}

impl ChunkAssembler {
    /// Returns `true` once a chunk has signalled completion.
    fn feed(&mut self, bytes: &[u8]) -> bool {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.consume_line(&line);
            if self.done {
                return true;
            }
        }
        false
    }

    /// Flush a trailing line that arrived without a newline.
    fn finish(&mut self) {
        if !self.done && !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.consume_line(&line);
        }
    }

    fn consume_line(&mut self, line: &[u8]) {
        let line = line.trim_ascii();
        if line.is_empty() {
            return;
        }
        match serde_json::from_slice::<GenerateChunk>(line) {
            Ok(chunk) => {
                if let Some(fragment) = chunk.response {
                    self.text.push_str(&fragment);
                }
                if chunk.done == Some(true) {
                    self.done = true;
                }
            }
            Err(e) => debug!(error = %e, "skipping undecodable chunk"),
        }
    }

    fn into_text(self) -> String {
        self.text
    }
}

// ── Tests ──
