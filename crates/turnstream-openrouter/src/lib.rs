//! OpenRouter upstream for [`turnstream`].
//!
//! Speaks the OpenAI-compatible streaming chat completions protocol:
//!
//! ```text
//!   reqwest bytes ─▶ sse::frames ─▶ stream::into_delta_stream ─▶ DeltaStream
//!                    (RawFrame)      (Delta)
//! ```
//!
//! Non-success statuses are mapped to typed [`EngineError`](turnstream::EngineError)s
//! before any frame is read: 401/403 auth, 402 insufficient balance,
//! 429 rate limited, 404 unknown model, 400 invalid request.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use turnstream_openrouter::{OpenRouterConfig, OpenRouterProvider};
//!
//! # fn example() -> Result<(), turnstream::EngineError> {
//! let provider = OpenRouterProvider::new(OpenRouterConfig {
//!     api_key: std::env::var("OPENROUTER_API_KEY").unwrap_or_default(),
//!     app_name: Some("my-app".into()),
//!     ..Default::default()
//! })?;
//! # let _ = provider;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod config;
mod convert;
mod provider;
pub mod sse;
pub mod stream;
mod types;

pub use config::{API_KEY_VAR, BASE_URL_VAR, MODEL_VAR, OpenRouterConfig};
pub use provider::OpenRouterProvider;
