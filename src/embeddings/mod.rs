#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::EmbeddingConfig;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// OpenAI-style embeddings endpoint, relative to the configured base URL.
pub const EMBEDDINGS_PATH: &str = "/v1/embeddings";

/// Client for the remote embedding service.
///
/// Batches are issued sequentially with a fixed cooldown between them to
/// respect the provider's rate limits. A failed batch is fatal for the whole
/// run; retry policy, if any, belongs to the caller.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    base_url: Url,
    api_key: String,
    model: String,
    batch_size: usize,
    cooldown: Duration,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingItem>,
}

/// One embedding in a batch response. The service may return items permuted
/// within a batch; `index` identifies the submitted text each belongs to.
#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = config
            .service_url()
            .context("Invalid embedding service URL")?;
        let api_key = config
            .resolve_api_key()
            .context("Embedding credentials are required before ingestion can start")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            api_key,
            model: config.model.clone(),
            batch_size: config.batch_size as usize,
            cooldown: Duration::from_millis(config.cooldown_ms),
            agent,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Embed an ordered list of texts, returning vectors in the same order.
    #[inline]
    pub fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding {} texts in batches of {}", texts.len(), self.batch_size);

        let batches: Vec<&[String]> = texts.chunks(self.batch_size).collect();
        let batch_count = batches.len();

        let mut vectors = Vec::with_capacity(texts.len());
        for (batch_index, batch) in batches.into_iter().enumerate() {
            let batch_vectors = self.embed_single_batch(batch).with_context(|| {
                format!(
                    "Embedding batch {}/{} failed ({} texts)",
                    batch_index + 1,
                    batch_count,
                    batch.len()
                )
            })?;
            vectors.extend(batch_vectors);

            // Cooldown between batches only, not after the final one.
            if batch_index + 1 < batch_count && !self.cooldown.is_zero() {
                thread::sleep(self.cooldown);
            }
        }

        debug!("Generated {} embeddings", vectors.len());
        Ok(vectors)
    }

    /// Embed a single query text with the same model as ingestion. Vectors
    /// from different models are not comparable, so query embedding must go
    /// through the same client.
    #[inline]
    pub fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_texts(&[text.to_string()])?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding service returned no vector for query"))
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self
            .base_url
            .join(EMBEDDINGS_PATH)
            .context("Failed to build embeddings URL")?;

        let request = EmbedRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| match e {
                ureq::Error::StatusCode(status) => {
                    anyhow::anyhow!("Embedding service returned HTTP {status}")
                }
                other => anyhow::anyhow!("Embedding request failed: {other}"),
            })?;

        let response: EmbedResponse = serde_json::from_str(&response_text)
            .context("Failed to parse embedding response")?;

        restore_batch_order(response.data, texts.len())
    }
}

/// Place each returned embedding at its submitted position. The service is
/// allowed to permute items within a batch; anything missing, duplicated, or
/// out of range makes the whole batch unusable.
fn restore_batch_order(items: Vec<EmbeddingItem>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if items.len() != expected {
        anyhow::bail!(
            "Embedding service returned {} vectors for {} inputs",
            items.len(),
            expected
        );
    }

    let mut ordered: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in items {
        let slot = ordered
            .get_mut(item.index)
            .ok_or_else(|| anyhow::anyhow!("Embedding index {} out of range", item.index))?;
        if slot.is_some() {
            anyhow::bail!("Embedding index {} returned twice", item.index);
        }
        *slot = Some(item.embedding);
    }

    ordered
        .into_iter()
        .enumerate()
        .map(|(i, slot)| slot.ok_or_else(|| anyhow::anyhow!("No embedding returned for index {i}")))
        .collect()
}
