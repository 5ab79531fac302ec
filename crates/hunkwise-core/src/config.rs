use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::HunkwiseError;

/// Top-level configuration loaded from `.hunkwise.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
/// The file layer is read here, [`HunkwiseConfig::apply_env`] layers the
/// environment on top, and the binary applies flags last.
///
/// # Examples
///
/// ```
/// use hunkwise_core::{HunkwiseConfig, Provider};
///
/// let config = HunkwiseConfig::default();
/// assert_eq!(config.llm.provider, Provider::None);
/// assert_eq!(config.analysis.per_file_timeout_secs, 25);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HunkwiseConfig {
    /// External scoring backend.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Enrichment pipeline tuning.
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Default comparison when reading from a repository.
    #[serde(default)]
    pub diff: DiffConfig,
}

impl HunkwiseConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`HunkwiseError::FileNotFound`] if `path` does not exist,
    /// [`HunkwiseError::Io`] if it cannot be read, or
    /// [`HunkwiseError::Toml`] if the content is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, HunkwiseError> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => HunkwiseError::FileNotFound(path.to_path_buf()),
            _ => HunkwiseError::Io(e),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`HunkwiseError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use hunkwise_core::{HunkwiseConfig, Provider};
    ///
    /// let toml = r#"
    /// [llm]
    /// provider = "lmstudio"
    /// "#;
    /// let config = HunkwiseConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.llm.provider, Provider::LmStudio);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, HunkwiseError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Layer process environment variables over the file values.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Layer variables from `lookup` over the file values. Empty values are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use hunkwise_core::{HunkwiseConfig, Provider};
    ///
    /// let mut config = HunkwiseConfig::default();
    /// config.apply_env_from(|key| match key {
    ///     "HUNKWISE_AI_PROVIDER" => Some("ollama".into()),
    ///     "OLLAMA_URL" => Some("http://gpu-box:11434".into()),
    ///     _ => None,
    /// });
    /// assert_eq!(config.llm.provider, Provider::Ollama);
    /// assert_eq!(config.llm.base_url.as_deref(), Some("http://gpu-box:11434"));
    /// ```
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(provider) = get("HUNKWISE_AI_PROVIDER").and_then(|p| p.parse().ok()) {
            self.llm.provider = provider;
        }

        let (key_var, url_var, model_var) = match self.llm.provider {
            Provider::Anthropic => (Some("ANTHROPIC_API_KEY"), None, None),
            Provider::OpenAi => (Some("OPENAI_API_KEY"), None, None),
            Provider::Ollama => (None, Some("OLLAMA_URL"), Some("OLLAMA_MODEL")),
            Provider::LmStudio => (
                Some("LMSTUDIO_API_KEY"),
                Some("LMSTUDIO_URL"),
                Some("LMSTUDIO_MODEL"),
            ),
            Provider::None => (None, None, None),
        };

        if let Some(value) = key_var.and_then(get) {
            self.llm.api_key = Some(value);
        }
        if let Some(value) = url_var.and_then(get) {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = model_var.and_then(get) {
            self.llm.model = Some(value);
        }
    }
}

/// Supported text-generation backends.
///
/// # Examples
///
/// ```
/// use hunkwise_core::Provider;
///
/// let p: Provider = "LMStudio".parse().unwrap();
/// assert_eq!(p, Provider::LmStudio);
/// assert_eq!(p.to_string(), "lmstudio");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// AI enrichment disabled.
    #[default]
    None,
    /// Anthropic messages API.
    Anthropic,
    /// Any OpenAI-compatible chat completions endpoint.
    OpenAi,
    /// Local Ollama server.
    Ollama,
    /// Local LM Studio server; serves one request at a time.
    LmStudio,
}

impl Provider {
    /// Model used when the config does not name one.
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::None => "",
            Provider::Anthropic => "claude-sonnet-4-20250514",
            Provider::OpenAi => "gpt-4o",
            Provider::Ollama => "llama3.1",
            Provider::LmStudio => "local-model",
        }
    }

    /// Endpoint used when the config does not name one.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::None => "",
            Provider::Anthropic => "https://api.anthropic.com",
            Provider::OpenAi => "https://api.openai.com",
            Provider::Ollama => "http://localhost:11434",
            Provider::LmStudio => "http://localhost:1234/v1",
        }
    }

    /// Parallel requests the backend tolerates.
    pub fn default_concurrency(self) -> usize {
        match self {
            Provider::LmStudio => 1,
            _ => 3,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::None => write!(f, "none"),
            Provider::Anthropic => write!(f, "anthropic"),
            Provider::OpenAi => write!(f, "openai"),
            Provider::Ollama => write!(f, "ollama"),
            Provider::LmStudio => write!(f, "lmstudio"),
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" => Ok(Provider::None),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "openai" => Ok(Provider::OpenAi),
            "ollama" => Ok(Provider::Ollama),
            "lmstudio" | "lm-studio" => Ok(Provider::LmStudio),
            other => Err(format!("unknown AI provider: {other}")),
        }
    }
}

/// LLM provider configuration.
///
/// # Examples
///
/// ```
/// use hunkwise_core::{LlmConfig, Provider};
///
/// let config = LlmConfig {
///     provider: Provider::Ollama,
///     ..LlmConfig::default()
/// };
/// assert_eq!(config.model(), "llama3.1");
/// assert_eq!(config.base_url(), "http://localhost:11434");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Backend to use (default: `none`).
    #[serde(default)]
    pub provider: Provider,
    /// Model identifier; the provider default applies when unset.
    pub model: Option<String>,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Custom base URL for API requests.
    pub base_url: Option<String>,
}

impl LlmConfig {
    /// Configured model or the provider default.
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Configured endpoint or the provider default, without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
    }

    /// Whether AI enrichment is switched on.
    pub fn is_enabled(&self) -> bool {
        self.provider != Provider::None
    }
}

/// How a successful AI assessment combines with the heuristic score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorePolicy {
    /// The AI score replaces the heuristic score.
    #[default]
    Replace,
    /// Confidence-weighted mix of heuristic and AI scores.
    Blend,
}

/// Enrichment pipeline tuning.
///
/// # Examples
///
/// ```
/// use hunkwise_core::{AnalysisConfig, ScorePolicy};
///
/// let config = AnalysisConfig::default();
/// assert_eq!(config.concurrency, None);
/// assert_eq!(config.preflight_timeout_secs, 4);
/// assert_eq!(config.score_policy, ScorePolicy::Replace);
/// assert_eq!(config.max_prompt_chars, 2200);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Override for the backend's parallel request budget.
    pub concurrency: Option<usize>,
    /// Budget for the availability check (default: 4).
    #[serde(default = "default_preflight_timeout_secs")]
    pub preflight_timeout_secs: u64,
    /// Budget for each per-file assessment (default: 25).
    #[serde(default = "default_per_file_timeout_secs")]
    pub per_file_timeout_secs: u64,
    /// Score combination policy (default: replace).
    #[serde(default)]
    pub score_policy: ScorePolicy,
    /// Diff characters included in a risk prompt (default: 2200).
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
}

fn default_preflight_timeout_secs() -> u64 {
    4
}

fn default_per_file_timeout_secs() -> u64 {
    25
}

fn default_max_prompt_chars() -> usize {
    2200
}

impl AnalysisConfig {
    /// Preflight budget as a [`Duration`].
    pub fn preflight_timeout(&self) -> Duration {
        Duration::from_secs(self.preflight_timeout_secs)
    }

    /// Per-file budget as a [`Duration`].
    pub fn per_file_timeout(&self) -> Duration {
        Duration::from_secs(self.per_file_timeout_secs)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            concurrency: None,
            preflight_timeout_secs: default_preflight_timeout_secs(),
            per_file_timeout_secs: default_per_file_timeout_secs(),
            score_policy: ScorePolicy::default(),
            max_prompt_chars: default_max_prompt_chars(),
        }
    }
}

/// Default comparison used when reading a repository.
///
/// # Examples
///
/// ```
/// use hunkwise_core::DiffConfig;
///
/// let config = DiffConfig::default();
/// assert_eq!(config.base, "main");
/// assert_eq!(config.head, "HEAD");
/// assert_eq!(config.context_lines, 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Base ref (default: `main`).
    #[serde(default = "default_base")]
    pub base: String,
    /// Head ref (default: `HEAD`).
    #[serde(default = "default_head")]
    pub head: String,
    /// Unchanged context lines around each hunk (default: 3).
    #[serde(default = "default_context_lines")]
    pub context_lines: u32,
}

fn default_base() -> String {
    "main".into()
}

fn default_head() -> String {
    "HEAD".into()
}

fn default_context_lines() -> u32 {
    3
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            base: default_base(),
            head: default_head(),
            context_lines: default_context_lines(),
        }
    }
}
