//! Unified error type for turn execution.
//!
//! Only upstream transport failures end a turn. Malformed frames,
//! malformed tool calls and failing tools are absorbed into client
//! events by the engine, so they never surface as an [`EngineError`].
//!
//! # Retryability
//!
//! The engine never retries on its own. Callers that want a retry
//! policy can inspect [`EngineError::is_retryable`]:
//!
//! ```rust
//! use turnstream::EngineError;
//!
//! fn should_retry(err: &EngineError) -> bool {
//!     err.is_retryable()
//! }
//!
//! assert!(should_retry(&EngineError::Timeout { elapsed_ms: 60_000 }));
//! assert!(!should_retry(&EngineError::Auth("bad key".into())));
//! ```

/// The error type returned by upstream calls and by a failed turn.
///
/// Variants are `#[non_exhaustive]`; always include a wildcard arm when
/// matching.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    /// An HTTP-level failure: connection error, broken stream, or an
    /// unexpected status code without a more specific variant.
    ///
    /// `status` is `None` when no response was received.
    #[error("HTTP error (status={status:?}): {message}")]
    Http {
        /// The HTTP status code, if one was received.
        status: Option<http::StatusCode>,
        /// A human-readable description of the failure.
        message: String,
        /// Whether the caller may retry this request.
        retryable: bool,
    },

    /// The API key was rejected (401/403).
    #[error("Invalid API credentials: {0}")]
    Auth(String),

    /// The account cannot pay for the request (402).
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// The upstream is throttling this client (429).
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The requested model does not exist or is unavailable (404).
    #[error("Model not found or not available: {0}")]
    ModelNotFound(String),

    /// The request or configuration was rejected before streaming.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// An error object delivered inside an otherwise healthy stream.
    #[error("Upstream error ({code}): {message}")]
    Upstream {
        /// Provider-defined error code.
        code: String,
        /// Human-readable error description.
        message: String,
    },

    /// The response body could not be used.
    #[error("Response format error: {message}")]
    ResponseFormat {
        /// What went wrong.
        message: String,
        /// The offending raw text, for diagnostics.
        raw: String,
    },

    /// The upstream call exceeded its connect or overall deadline.
    #[error("Upstream request timed out after {elapsed_ms}ms")]
    Timeout {
        /// Milliseconds allowed before the timeout fired.
        elapsed_ms: u64,
    },

    /// The model kept requesting tools past the configured round cap.
    #[error("Tool loop exceeded {limit} rounds")]
    MaxRoundsExceeded {
        /// The configured maximum number of rounds.
        limit: u32,
    },
}

impl EngineError {
    /// Stable snake_case discriminator, carried by the `error` client event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http { .. } => "http",
            Self::Auth(_) => "auth",
            Self::InsufficientBalance(_) => "insufficient_balance",
            Self::RateLimited(_) => "rate_limited",
            Self::ModelNotFound(_) => "model_not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Upstream { .. } => "upstream",
            Self::ResponseFormat { .. } => "response_format",
            Self::Timeout { .. } => "timeout",
            Self::MaxRoundsExceeded { .. } => "max_rounds_exceeded",
        }
    }

    /// Returns `true` if the error is transient and a fresh turn may succeed.
    ///
    /// ```rust
    /// use turnstream::EngineError;
    ///
    /// assert!(EngineError::RateLimited("slow down".into()).is_retryable());
    /// assert!(!EngineError::MaxRoundsExceeded { limit: 10 }.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { retryable, .. } => *retryable,
            Self::RateLimited(_) | Self::Timeout { .. } => true,
            _ => false,
        }
    }
}
