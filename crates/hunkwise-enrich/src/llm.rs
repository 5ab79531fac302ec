use std::time::Duration;

use async_trait::async_trait;
use hunkwise_core::{HunkwiseError, LlmConfig, Provider, Result};
use serde_json::{json, Value};
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

/// Anything that turns a prompt into generated text.
///
/// [`LlmClient`] is the production implementation; tests substitute canned
/// responders.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Generate a completion for a single user prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// HTTP client for the configured text-generation backend.
///
/// Speaks the Anthropic messages API, OpenAI-compatible chat completions
/// (OpenAI and LM Studio), and the Ollama generate API.
///
/// # Examples
///
/// ```
/// use hunkwise_core::{LlmConfig, Provider};
/// use hunkwise_enrich::llm::LlmClient;
///
/// let config = LlmConfig {
///     provider: Provider::LmStudio,
///     ..LlmConfig::default()
/// };
/// let client = LlmClient::new(&config).unwrap();
/// assert_eq!(client.concurrency(), 1);
///
/// assert!(LlmClient::new(&LlmConfig::default()).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a client for the configured provider.
    ///
    /// # Errors
    ///
    /// Returns [`HunkwiseError::Config`] when no provider is configured and
    /// [`HunkwiseError::Llm`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if !config.is_enabled() {
            return Err(HunkwiseError::Config("no AI provider configured".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| HunkwiseError::Llm(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// The configured provider.
    pub fn provider(&self) -> Provider {
        self.config.provider
    }

    /// Model name sent with each request.
    pub fn model(&self) -> &str {
        self.config.model()
    }

    /// Parallel requests this backend should receive.
    pub fn concurrency(&self) -> usize {
        self.config.provider.default_concurrency()
    }

    /// Send one prompt and return the generated text.
    ///
    /// # Errors
    ///
    /// Returns [`HunkwiseError::Llm`] on transport failures, non-success
    /// statuses, or responses without text.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let provider = self.config.provider;
        let base = self.config.base_url();
        let url = endpoint_url(provider, base);
        let body = request_body(provider, self.model(), prompt);

        let mut request = self.client.post(&url).json(&body);
        request = match provider {
            Provider::Anthropic => request
                .header("x-api-key", self.api_key().unwrap_or_default())
                .header("anthropic-version", ANTHROPIC_VERSION),
            _ => match self.api_key() {
                Some(key) => request.bearer_auth(key),
                None => request,
            },
        };

        debug!(%provider, %url, prompt_chars = prompt.len(), "sending completion request");
        let response = request
            .send()
            .await
            .map_err(|e| HunkwiseError::Llm(format!("{provider} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(HunkwiseError::Llm(format!(
                "{provider} returned status {status}: {body_text}"
            )));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| HunkwiseError::Llm(format!("failed to parse {provider} response: {e}")))?;
        extract_text(provider, &value)
    }

    /// Check that the backend is reachable and ready.
    ///
    /// LM Studio must list the configured model when it reports any models;
    /// Ollama must answer its tag listing. Hosted APIs are assumed available.
    ///
    /// # Errors
    ///
    /// Returns [`HunkwiseError::Preflight`] describing why the backend is not
    /// usable.
    pub async fn preflight(&self) -> Result<()> {
        let provider = self.config.provider;
        let url = match provider {
            Provider::LmStudio => models_url(self.config.base_url()),
            Provider::Ollama => format!(
                "{}/api/tags",
                self.config.base_url().trim_end_matches('/')
            ),
            Provider::Anthropic | Provider::OpenAi => return Ok(()),
            Provider::None => {
                return Err(HunkwiseError::Preflight("no AI provider configured".into()))
            }
        };

        let mut request = self.client.get(&url);
        if let Some(key) = self.api_key() {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| HunkwiseError::Preflight(format!("{provider} is not reachable at {url}: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| HunkwiseError::Preflight(format!("{provider} preflight read failed: {e}")))?;
        if !status.is_success() {
            return Err(HunkwiseError::Preflight(format!(
                "{provider} preflight returned status {status}: {body}"
            )));
        }

        if provider == Provider::LmStudio {
            if let Some(model) = self.config.model.as_deref() {
                check_model_loaded(&body, model)?;
            }
        }
        Ok(())
    }

    fn api_key(&self) -> Option<&str> {
        self.config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        LlmClient::complete(self, prompt).await
    }
}

/// Completion endpoint for `provider` rooted at `base`.
///
/// # Examples
///
/// ```
/// use hunkwise_core::Provider;
/// use hunkwise_enrich::llm::endpoint_url;
///
/// assert_eq!(
///     endpoint_url(Provider::LmStudio, "http://localhost:1234/v1"),
///     "http://localhost:1234/v1/chat/completions"
/// );
/// assert_eq!(
///     endpoint_url(Provider::OpenAi, "https://api.openai.com"),
///     "https://api.openai.com/v1/chat/completions"
/// );
/// ```
pub fn endpoint_url(provider: Provider, base: &str) -> String {
    let base = base.trim_end_matches('/');
    match provider {
        Provider::Anthropic => format!("{base}/v1/messages"),
        Provider::Ollama => format!("{base}/api/generate"),
        Provider::OpenAi | Provider::LmStudio | Provider::None => chat_completions_url(base),
    }
}

fn chat_completions_url(base: &str) -> String {
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{base}/chat/completions")
    } else {
        format!("{base}/v1/chat/completions")
    }
}

fn models_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    let base = base.strip_suffix("/chat/completions").unwrap_or(base);
    if base.ends_with("/v1") {
        format!("{base}/models")
    } else {
        format!("{base}/v1/models")
    }
}

/// JSON request body for `provider`.
pub fn request_body(provider: Provider, model: &str, prompt: &str) -> Value {
    match provider {
        Provider::Anthropic => json!({
            "model": model,
            "max_tokens": MAX_TOKENS,
            "messages": [{ "role": "user", "content": prompt }],
        }),
        Provider::Ollama => json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": { "num_predict": MAX_TOKENS },
        }),
        Provider::OpenAi | Provider::LmStudio | Provider::None => json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.2,
            "max_tokens": MAX_TOKENS,
        }),
    }
}

/// Pull the generated text out of a provider response.
///
/// # Errors
///
/// Returns [`HunkwiseError::Llm`] when the expected field is missing.
pub fn extract_text(provider: Provider, value: &Value) -> Result<String> {
    let text = match provider {
        Provider::Anthropic => value
            .get("content")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("text")),
        Provider::Ollama => value.get("response"),
        Provider::OpenAi | Provider::LmStudio | Provider::None => value
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content")),
    }
    .and_then(Value::as_str)
    .ok_or_else(|| HunkwiseError::Llm(format!("unexpected {provider} response structure: {value}")))?;
    Ok(text.trim().to_string())
}

fn check_model_loaded(body: &str, model: &str) -> Result<()> {
    let Ok(listing) = serde_json::from_str::<Value>(body) else {
        return Ok(());
    };
    let ids: Vec<&str> = listing
        .get("data")
        .and_then(Value::as_array)
        .map(|models| {
            models
                .iter()
                .filter_map(|m| m.get("id").and_then(Value::as_str))
                .map(str::trim)
                .collect()
        })
        .unwrap_or_default();

    if ids.is_empty() || ids.contains(&model.trim()) {
        return Ok(());
    }
    Err(HunkwiseError::Preflight(format!(
        "LM Studio model \"{model}\" is not loaded ({} available)",
        ids.len()
    )))
}
