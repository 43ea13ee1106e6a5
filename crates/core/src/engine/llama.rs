//! Client for a llama.cpp-compatible server hosting the on-device model.
//!
//! The server owns tokenisation and sampling; this client only checks that the model file is
//! present, probes `/health`, and posts prompts to `/completion`.

use super::{EngineLoader, EngineOptions, InferenceEngine};
use crate::error::{ScribeError, ScribeResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: u32,
    top_k: u32,
    temperature: f32,
    seed: u64,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: String,
}

/// An engine backed by a running llama.cpp server.
#[derive(Debug, Clone)]
pub struct LlamaServerEngine {
    http_client: reqwest::Client,
    options: EngineOptions,
}

impl LlamaServerEngine {
    /// Loads the engine described by `options`.
    ///
    /// # Errors
    ///
    /// - `ScribeError::ModelNotFound` if `options.model_path` is not a file.
    /// - `ScribeError::EngineUnavailable` if the server cannot be reached or reports unhealthy.
    /// - `ScribeError::EngineRequest` if the HTTP client cannot be built.
    pub async fn load(options: EngineOptions) -> ScribeResult<Self> {
        if !options.model_path.is_file() {
            return Err(ScribeError::ModelNotFound(options.model_path.clone()));
        }

        let http_client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()?;

        let health_url = format!("{}/health", options.endpoint.trim_end_matches('/'));
        let response = http_client
            .get(&health_url)
            .send()
            .await
            .map_err(|e| ScribeError::EngineUnavailable(format!("{}: {}", health_url, e)))?;
        if !response.status().is_success() {
            return Err(ScribeError::EngineUnavailable(format!(
                "{} returned {}",
                health_url,
                response.status()
            )));
        }

        tracing::info!(
            "inference engine ready (model: {}, endpoint: {})",
            options.model_path.display(),
            options.endpoint
        );

        Ok(Self {
            http_client,
            options,
        })
    }
}

#[async_trait]
impl InferenceEngine for LlamaServerEngine {
    async fn generate(&self, prompt: &str) -> ScribeResult<String> {
        let url = format!("{}/completion", self.options.endpoint.trim_end_matches('/'));
        let request = CompletionRequest {
            prompt,
            n_predict: self.options.max_tokens,
            top_k: self.options.top_k,
            temperature: self.options.temperature,
            seed: self.options.random_seed,
            stream: false,
        };

        let response = self.http_client.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScribeError::EngineResponse(format!("{}: {}", status, body)));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ScribeError::EngineResponse(e.to_string()))?;
        Ok(completion.content)
    }
}

/// [`EngineLoader`] producing [`LlamaServerEngine`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct LlamaServerLoader;

#[async_trait]
impl EngineLoader for LlamaServerLoader {
    async fn load(&self, options: &EngineOptions) -> ScribeResult<Arc<dyn InferenceEngine>> {
        let engine = LlamaServerEngine::load(options.clone()).await?;
        Ok(Arc::new(engine))
    }
}
