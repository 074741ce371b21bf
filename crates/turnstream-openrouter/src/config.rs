//! OpenRouter upstream configuration.

use std::time::Duration;

use turnstream::EngineError;

/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "OPENROUTER_API_KEY";
/// Environment variable overriding [`OpenRouterConfig::base_url`].
pub const BASE_URL_VAR: &str = "OPENROUTER_BASE_URL";
/// Environment variable overriding [`OpenRouterConfig::model`].
pub const MODEL_VAR: &str = "OPENROUTER_MODEL";

/// Configuration for the OpenRouter upstream.
///
/// Use struct update syntax with [`Default`] for ergonomic construction:
///
/// ```rust
/// use turnstream_openrouter::OpenRouterConfig;
///
/// let config = OpenRouterConfig {
///     api_key: "sk-or-...".into(),
///     model: "anthropic/claude-sonnet-4".into(),
///     ..Default::default()
/// };
/// ```
#[derive(Clone)]
pub struct OpenRouterConfig {
    /// OpenRouter API key. Required.
    pub api_key: String,
    /// Model used when a request does not name one.
    pub model: String,
    /// Base URL for the API. Override for proxies or test servers.
    pub base_url: String,
    /// Application name, sent as `X-Title`.
    pub app_name: Option<String>,
    /// Application URL, sent as `HTTP-Referer`.
    pub referer: Option<String>,
    /// Deadline for establishing a connection.
    pub connect_timeout: Duration,
    /// Deadline for one whole upstream call, body included.
    pub timeout: Duration,
    /// Idle connections kept per host by the built-in client.
    pub pool_max_idle_per_host: usize,
    /// Ask OpenRouter to compress over-long prompts (`middle-out`).
    pub use_transforms: bool,
    /// Pre-configured HTTP client to share a connection pool. When `None`,
    /// one is built from the timeouts above.
    pub client: Option<reqwest::Client>,
}

impl std::fmt::Debug for OpenRouterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("app_name", &self.app_name)
            .field("referer", &self.referer)
            .field("connect_timeout", &self.connect_timeout)
            .field("timeout", &self.timeout)
            .field("pool_max_idle_per_host", &self.pool_max_idle_per_host)
            .field("use_transforms", &self.use_transforms)
            .field("client", &self.client.as_ref().map(|_| "..."))
            .finish()
    }
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "openai/gpt-4o-mini".into(),
            base_url: "https://openrouter.ai/api/v1".into(),
            app_name: None,
            referer: None,
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
            pool_max_idle_per_host: 32,
            use_transforms: true,
            client: None,
        }
    }
}

impl OpenRouterConfig {
    /// Builds a config from `OPENROUTER_API_KEY`, `OPENROUTER_BASE_URL`
    /// and `OPENROUTER_MODEL`, falling back to defaults for the latter two.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidRequest`] if the API key is missing or empty.
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EngineError> {
        let api_key = lookup(API_KEY_VAR)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| EngineError::InvalidRequest(format!("{API_KEY_VAR} is not set")))?;
        let defaults = Self::default();
        Ok(Self {
            api_key,
            base_url: lookup(BASE_URL_VAR).unwrap_or(defaults.base_url),
            model: lookup(MODEL_VAR).unwrap_or(defaults.model),
            ..Self::default()
        })
    }
}
