//! Optional embedding client for the analyzer's similarity adjustment.
//!
//! Disabled entirely when the configured API key env var is unset; every
//! caller treats failures as "no adjustment".

use serde::{Deserialize, Serialize};

use switchboard_common::config::EmbeddingConfig;
use switchboard_common::GatewayError;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: u32,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

pub struct EmbeddingClient {
    http: reqwest::Client,
    config: EmbeddingConfig,
    api_key: String,
}

impl EmbeddingClient {
    /// Returns None when the configured key env var is unset or empty.
    pub fn new(config: EmbeddingConfig) -> Option<Self> {
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.is_empty() => key,
            _ => {
                tracing::info!(
                    env_var = %config.api_key_env,
                    "Embedding API key not set — similarity adjustment disabled"
                );
                return None;
            }
        };

        Some(Self {
            http: reqwest::Client::new(),
            config,
            api_key,
        })
    }

    /// Embed a batch of texts, preserving input order.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
        let start = std::time::Instant::now();

        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
            dimensions: self.config.dimensions,
        };

        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        metrics::histogram!("embedding.api.latency").record(start.elapsed().as_secs_f64());

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::ServerError {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(format!("embedding response: {}", e)))?;

        let mut sorted = body.data;
        sorted.sort_by_key(|d| d.index);
        Ok(sorted.into_iter().map(|d| d.embedding).collect())
    }
}

/// Cosine similarity of two vectors; 0.0 when either is degenerate.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
