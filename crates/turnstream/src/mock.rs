//! Mock upstream for testing.
//!
//! [`MockUpstream`] is a queue-based fake that lets tests script exactly
//! what each round streams, without touching the network. It implements
//! [`Upstream`], so it also works behind `Arc<dyn DynUpstream>` through
//! the blanket impl.
//!
//! ```rust
//! use turnstream::delta::{Delta, FinishReason};
//! use turnstream::mock::{MockError, MockUpstream};
//!
//! let mock = MockUpstream::new();
//! mock.queue_stream(vec![
//!     Delta::Content("Hello".into()),
//!     Delta::Finish { reason: FinishReason::Stop },
//! ])
//! .queue_stream_error(MockError::RateLimited("slow down".into()));
//! assert!(mock.recorded_calls().is_empty());
//! ```
//!
//! [`EngineError`] is not `Clone`, so errors are queued as [`MockError`]
//! and converted when dequeued.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::StreamExt;

use crate::delta::{Delta, DeltaStream};
use crate::error::EngineError;
use crate::upstream::{ChatRequest, Upstream};

/// Cloneable error subset for mock queuing.
#[derive(Debug, Clone)]
pub enum MockError {
    /// Maps to [`EngineError::Http`].
    Http {
        /// HTTP status code, if any.
        status: Option<http::StatusCode>,
        /// Error message.
        message: String,
        /// Whether the error is retryable.
        retryable: bool,
    },
    /// Maps to [`EngineError::Auth`].
    Auth(String),
    /// Maps to [`EngineError::InsufficientBalance`].
    InsufficientBalance(String),
    /// Maps to [`EngineError::RateLimited`].
    RateLimited(String),
    /// Maps to [`EngineError::ModelNotFound`].
    ModelNotFound(String),
    /// Maps to [`EngineError::Upstream`].
    Upstream {
        /// Provider error code.
        code: String,
        /// Error message.
        message: String,
    },
    /// Maps to [`EngineError::Timeout`].
    Timeout {
        /// Elapsed milliseconds.
        elapsed_ms: u64,
    },
}

impl MockError {
    fn into_engine_error(self) -> EngineError {
        match self {
            Self::Http {
                status,
                message,
                retryable,
            } => EngineError::Http {
                status,
                message,
                retryable,
            },
            Self::Auth(msg) => EngineError::Auth(msg),
            Self::InsufficientBalance(msg) => EngineError::InsufficientBalance(msg),
            Self::RateLimited(msg) => EngineError::RateLimited(msg),
            Self::ModelNotFound(msg) => EngineError::ModelNotFound(msg),
            Self::Upstream { code, message } => EngineError::Upstream { code, message },
            Self::Timeout { elapsed_ms } => EngineError::Timeout { elapsed_ms },
        }
    }
}

enum Script {
    Deltas(Vec<Delta>),
    FailAfter(Vec<Delta>, MockError),
    Hanging(Vec<Delta>),
    OpenError(MockError),
}

/// A queue-based mock upstream.
///
/// Each call to `stream` pops the next scripted round and records the
/// request for [`recorded_calls`](Self::recorded_calls).
///
/// # Panics
///
/// `stream` panics if no round is queued.
pub struct MockUpstream {
    scripts: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<ChatRequest>>,
    released: Arc<AtomicUsize>,
}

impl fmt::Debug for MockUpstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockUpstream")
            .field("queued_streams", &self.scripts.lock().unwrap().len())
            .field("recorded_calls", &self.calls.lock().unwrap().len())
            .finish_non_exhaustive()
    }
}

impl Default for MockUpstream {
    fn default() -> Self {
        Self::new()
    }
}

impl MockUpstream {
    /// Creates a mock with an empty queue.
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn push(&self, script: Script) -> &Self {
        self.scripts.lock().unwrap().push_back(script);
        self
    }

    /// Enqueues a round that yields `deltas` and then ends.
    pub fn queue_stream(&self, deltas: Vec<Delta>) -> &Self {
        self.push(Script::Deltas(deltas))
    }

    /// Enqueues a round that fails to open, like an HTTP error status.
    pub fn queue_stream_error(&self, error: MockError) -> &Self {
        self.push(Script::OpenError(error))
    }

    /// Enqueues a round that yields `deltas` and then breaks with `error`.
    pub fn queue_stream_failing(&self, deltas: Vec<Delta>, error: MockError) -> &Self {
        self.push(Script::FailAfter(deltas, error))
    }

    /// Enqueues a round that yields `deltas` and then never produces
    /// another item.
    pub fn queue_stream_hanging(&self, deltas: Vec<Delta>) -> &Self {
        self.push(Script::Hanging(deltas))
    }

    /// Every request passed to `stream`, in call order.
    pub fn recorded_calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of rounds still queued.
    pub fn remaining(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }

    /// How many opened streams have since been dropped.
    pub fn released_streams(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn track(&self, stream: DeltaStream) -> DeltaStream {
        let guard = ReleaseGuard(Arc::clone(&self.released));
        Box::pin(stream.map(move |item| {
            let _guard = &guard;
            item
        }))
    }
}

struct ReleaseGuard(Arc<AtomicUsize>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl Upstream for MockUpstream {
    async fn stream(&self, request: &ChatRequest) -> Result<DeltaStream, EngineError> {
        self.calls.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("MockUpstream: no queued streams remaining");

        let ok = |deltas: Vec<Delta>| futures::stream::iter(deltas.into_iter().map(Ok));
        let stream: DeltaStream = match script {
            Script::OpenError(e) => return Err(e.into_engine_error()),
            Script::Deltas(deltas) => Box::pin(ok(deltas)),
            Script::FailAfter(deltas, e) => Box::pin(
                ok(deltas).chain(futures::stream::once(async move { Err(e.into_engine_error()) })),
            ),
            Script::Hanging(deltas) => Box::pin(ok(deltas).chain(futures::stream::pending())),
        };
        Ok(self.track(stream))
    }
}
