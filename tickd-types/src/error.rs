use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the tickd workspace.
///
/// This wraps capability mismatches, argument validation errors,
/// provider-tagged failures, resilience rejections, and an aggregate for
/// multi-provider attempts.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TickdError {
    /// The requested capability is not implemented by the target connector.
    #[error("unsupported capability: {capability}")]
    Unsupported {
        /// A capability string describing what was requested (e.g.
        /// "stream-depth").
        capability: String,
    },

    /// Issues with the returned or expected data (missing fields, invalid
    /// bars, etc.).
    #[error("data issue: {0}")]
    Data(String),

    /// Invalid input argument.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// An individual provider returned an error.
    #[error("{provider} failed: {msg}")]
    Provider {
        /// Provider id that failed.
        provider: String,
        /// Human-readable error message.
        msg: String,
    },

    /// A resource or symbol could not be found.
    #[error("not found: {what}")]
    NotFound {
        /// Description of missing resource, e.g. "daily bars for ZZZZ".
        what: String,
    },

    /// An HTTP request failed with a status code.
    #[error("http {status}: {msg}")]
    Http {
        /// Response status code.
        status: u16,
        /// Human-readable error message.
        msg: String,
    },

    /// All selected providers failed; contains the individual failures.
    #[error("all providers failed: {0:?}")]
    AllProvidersFailed(Vec<TickdError>),

    /// An individual provider call exceeded the configured timeout.
    #[error("provider timed out: {capability} via {provider}")]
    ProviderTimeout {
        /// Provider id that timed out.
        provider: String,
        /// Capability label (e.g. "daily-bars").
        capability: String,
    },

    /// The request rate exceeds the configured limit.
    #[error("rate limit exceeded: limit={limit} window_ms={window_ms}")]
    RateLimited {
        /// Allowed number of requests in the window.
        limit: u64,
        /// Window length in milliseconds.
        window_ms: u64,
        /// Provider-supplied Retry-After hint, when present.
        retry_after_ms: Option<u64>,
    },

    /// The circuit breaker for a provider is open; retry after `reset_in_ms`.
    #[error("circuit open for {provider}: reset_in_ms={reset_in_ms}")]
    CircuitOpen {
        /// Provider id being gated.
        provider: String,
        /// Milliseconds remaining until a probe is admitted.
        reset_in_ms: u64,
    },

    /// A required credential field was not found in the environment.
    #[error("missing credential {field} for {provider}")]
    Credential {
        /// Provider id the credential belongs to.
        provider: String,
        /// Environment variable name that was expected.
        field: String,
    },

    /// Configuration is structurally invalid; aborts startup.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An exclusive operation was already in flight.
    #[error("already running: {what}")]
    AlreadyRunning {
        /// Description of the operation holding the gate.
        what: String,
    },

    /// The sink surfaced a terminal, non-retryable error.
    #[error("sink terminal error: {0}")]
    SinkTerminal(String),

    /// The operation was cancelled by its caller or by shutdown.
    #[error("cancelled")]
    Cancelled,

    /// An I/O error outside the sink path.
    #[error("io error: {0}")]
    Io(String),

    /// Middleware stack configuration is invalid (missing dependencies,
    /// wrong order, etc.).
    #[error("invalid middleware stack: {message}")]
    InvalidMiddlewareStack {
        /// Human-readable description of the validation failure.
        message: String,
    },

    /// Unknown/opaque error.
    #[error("unknown error: {0}")]
    Other(String),
}

impl TickdError {
    /// Helper: build an `Unsupported` error for a capability string.
    #[must_use]
    pub fn unsupported(cap: impl Into<String>) -> Self {
        Self::Unsupported {
            capability: cap.into(),
        }
    }

    /// Helper: build a `Provider` error with the provider id and message.
    pub fn provider(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `NotFound` error for a description of the missing
    /// resource.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Helper: build a `ProviderTimeout` error.
    pub fn provider_timeout(provider: impl Into<String>, capability: impl Into<String>) -> Self {
        Self::ProviderTimeout {
            provider: provider.into(),
            capability: capability.into(),
        }
    }

    /// Returns `true` when retrying the same call locally is worthwhile:
    /// network failures, server errors, throttling, timeouts.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::ProviderTimeout { .. } | Self::RateLimited { .. } | Self::Io(_) => true,
            _ => false,
        }
    }

    /// Returns `true` if this error should be surfaced to users as
    /// actionable.
    ///
    /// Non-actionable errors are those indicating capability absence or a
    /// benign not-found condition. Aggregates are classified based on their
    /// contents.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        match self {
            Self::Unsupported { .. } | Self::NotFound { .. } => false,
            Self::AllProvidersFailed(inner) => inner.iter().any(Self::is_actionable),
            _ => true,
        }
    }

    /// Flatten nested `AllProvidersFailed` structures into a plain vector.
    ///
    /// This preserves other error variants as-is and unwraps recursively.
    #[must_use]
    pub fn flatten(self) -> Vec<Self> {
        match self {
            Self::AllProvidersFailed(list) => list.into_iter().flat_map(Self::flatten).collect(),
            other => vec![other],
        }
    }
}
