/// LLM call node: prompt a model provider
///
/// Providers are looked up by the node's `provider` config (default
/// `openai`). Transient provider failures (network errors, 429, 5xx) are
/// retried with exponential back-off.

use super::{NodeExecutor, NodeInvocation, NodeOutput};
use crate::error::NodeError;
use crate::runtime::template;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

const DEFAULT_PROVIDER: &str = "openai";
const BASE_BACKOFF_MS: u64 = 200;
const MAX_BACKOFF_MS: u64 = 30_000;

/// A single completion call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: Option<f64>,
}

/// Failure reported by a provider
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub message: String,
    /// Whether retrying the same request may succeed
    pub transient: bool,
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Identifier matched against the node's `provider` config
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
}

/// Chat-completions client for OpenAI and compatible endpoints
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let mut body = json!({ "model": request.model, "messages": messages });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }

        let mut http = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http
            .send()
            .await
            .map_err(|e| ProviderError::transient(format!("request failed: {}", e)))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(ProviderError::transient(format!("provider returned {}", status)));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError::permanent(format!(
                "provider returned {}: {}",
                status, detail
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::permanent(format!("invalid response body: {}", e)))?;

        payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProviderError::permanent("response has no completion text"))
    }
}

/// Executor for `llm-call` nodes
///
/// Config: `provider`, `model`, `prompt` (template over `input`), optional
/// `system` and `temperature`. Output is `{ text, model, provider }`.
#[derive(Clone)]
pub struct LlmCallExecutor {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    default_model: String,
    max_retries: u32,
}

impl fmt::Debug for LlmCallExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.providers.keys().collect();
        names.sort();
        f.debug_struct("LlmCallExecutor")
            .field("providers", &names)
            .field("default_model", &self.default_model)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl LlmCallExecutor {
    pub fn new(default_model: impl Into<String>, max_retries: u32) -> Self {
        Self {
            providers: HashMap::new(),
            default_model: default_model.into(),
            max_retries,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    async fn complete_with_retry(
        &self,
        provider: &dyn LlmProvider,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, NodeError> {
        let mut attempt = 0;
        loop {
            let result = tokio::select! {
                result = provider.complete(request) => result,
                _ = cancel.cancelled() => return Err(NodeError::Cancelled),
            };

            match result {
                Ok(text) => return Ok(text),
                Err(err) if err.transient && attempt < self.max_retries => {
                    let delay = backoff(attempt);
                    attempt += 1;
                    tracing::warn!(
                        "🔁 Provider '{}' failed ({}), retry {}/{} in {:?}",
                        provider.name(),
                        err.message,
                        attempt,
                        self.max_retries,
                        delay
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(NodeError::Cancelled),
                    }
                }
                Err(err) => {
                    return Err(NodeError::Provider {
                        provider: provider.name().to_string(),
                        message: err.message,
                    })
                }
            }
        }
    }
}

/// Exponential back-off before retry `attempt` (0-based), capped
fn backoff(attempt: u32) -> Duration {
    let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(BASE_BACKOFF_MS.saturating_mul(factor).min(MAX_BACKOFF_MS))
}

#[async_trait]
impl NodeExecutor for LlmCallExecutor {
    async fn execute(&self, invocation: NodeInvocation) -> Result<NodeOutput, NodeError> {
        let provider_name = invocation.config_str("provider").unwrap_or(DEFAULT_PROVIDER);
        let provider = self.providers.get(provider_name).cloned().ok_or_else(|| {
            NodeError::InvalidConfig(format!("unknown provider '{}'", provider_name))
        })?;

        let prompt_template = invocation.require_str("prompt")?;
        let prompt =
            template::render_str(prompt_template, &invocation.inputs).map_err(NodeError::InvalidConfig)?;
        let system = invocation
            .config_str("system")
            .map(|s| template::render_str(s, &invocation.inputs))
            .transpose()
            .map_err(NodeError::InvalidConfig)?;

        let request = CompletionRequest {
            model: invocation
                .config_str("model")
                .unwrap_or(&self.default_model)
                .to_string(),
            prompt,
            system,
            temperature: invocation.config.get("temperature").and_then(Value::as_f64),
        };

        tracing::debug!(
            "🤖 Node '{}' calling {} ({})",
            invocation.node_id,
            provider_name,
            request.model
        );

        let text = self
            .complete_with_retry(provider.as_ref(), &request, &invocation.cancel)
            .await?;

        Ok(NodeOutput::value(json!({
            "text": text,
            "model": request.model,
            "provider": provider_name,
        })))
    }
}
