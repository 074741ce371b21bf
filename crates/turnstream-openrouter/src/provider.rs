//! OpenRouter [`Upstream`] implementation.

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::instrument;
use turnstream::delta::DeltaStream;
use turnstream::{ChatRequest, EngineError, Upstream};

use crate::config::OpenRouterConfig;
use crate::{convert, sse, stream};

/// OpenRouter upstream implementing [`Upstream`].
///
/// One instance is meant to be shared across turns; the underlying
/// `reqwest::Client` pools connections per host.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use turnstream::{ChatMessage, ChatRequest, EngineConfig, ToolRegistry};
/// use turnstream_openrouter::{OpenRouterConfig, OpenRouterProvider};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), turnstream::EngineError> {
/// let provider = OpenRouterProvider::new(OpenRouterConfig::from_env()?)?;
/// let (mut events, handle) = turnstream::spawn_turn(
///     Arc::new(provider),
///     Arc::new(ToolRegistry::new()),
///     ChatRequest {
///         messages: vec![ChatMessage::user("Hello!")],
///         ..Default::default()
///     },
///     EngineConfig::default(),
///     CancellationToken::new(),
/// );
/// while let Some(event) = events.recv().await {
///     print!("{}", event.to_sse());
/// }
/// let _outcome = handle.await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct OpenRouterProvider {
    config: OpenRouterConfig,
    client: reqwest::Client,
}

impl OpenRouterProvider {
    /// Creates a provider from configuration.
    ///
    /// If `config.client` is `Some`, that client is reused. Otherwise a
    /// pooled client is built from the configured timeouts.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidRequest`] if the HTTP client cannot be built.
    pub fn new(config: OpenRouterConfig) -> Result<Self, EngineError> {
        let client = match &config.client {
            Some(client) => client.clone(),
            None => reqwest::Client::builder()
                .connect_timeout(config.connect_timeout)
                .timeout(config.timeout)
                .pool_max_idle_per_host(config.pool_max_idle_per_host)
                .build()
                .map_err(|e| {
                    EngineError::InvalidRequest(format!("failed to build HTTP client: {e}"))
                })?,
        };
        Ok(Self { config, client })
    }

    /// The model used when a request names none.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn default_headers(&self) -> Result<HeaderMap, EngineError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("Bearer {}", self.config.api_key);
        headers.insert(
            "authorization",
            HeaderValue::from_str(&auth_value)
                .map_err(|_| EngineError::Auth("API key contains invalid header characters".into()))?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("accept", HeaderValue::from_static("text/event-stream"));

        if let Some(referer) = &self.config.referer {
            headers.insert(
                "http-referer",
                HeaderValue::from_str(referer).map_err(|_| {
                    EngineError::InvalidRequest("Referer contains invalid header characters".into())
                })?,
            );
        }
        if let Some(app_name) = &self.config.app_name {
            headers.insert(
                "x-title",
                HeaderValue::from_str(app_name).map_err(|_| {
                    EngineError::InvalidRequest("App name contains invalid header characters".into())
                })?,
            );
        }

        Ok(headers)
    }

    fn completions_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    async fn send_request(&self, request: &ChatRequest) -> Result<reqwest::Response, EngineError> {
        let body = convert::build_request(request, &self.config);
        let model = body.model.to_string();

        let response = self
            .client
            .post(self.completions_url())
            .headers(self.default_headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| convert::convert_transport_error(&e, self.timeout_ms()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let http_status = http::StatusCode::from_u16(status.as_u16())
                .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
            return Err(convert::convert_error(http_status, &body, &model));
        }

        Ok(response)
    }
}

impl Upstream for OpenRouterProvider {
    #[instrument(skip_all, fields(model = %request.model.as_deref().unwrap_or(&self.config.model)))]
    async fn stream(&self, request: &ChatRequest) -> Result<DeltaStream, EngineError> {
        let response = self.send_request(request).await?;
        let timeout_ms = self.timeout_ms();
        let bytes = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| read_error(&e, timeout_ms)));
        Ok(stream::into_delta_stream(sse::frames(bytes)))
    }
}

fn read_error(err: &reqwest::Error, timeout_ms: u64) -> EngineError {
    if err.is_timeout() {
        EngineError::Timeout {
            elapsed_ms: timeout_ms,
        }
    } else {
        EngineError::Http {
            status: None,
            message: format!("Stream read error: {err}"),
            retryable: true,
        }
    }
}
