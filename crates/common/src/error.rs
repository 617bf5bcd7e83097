use thiserror::Error;

use crate::types::provider::ProviderId;

/// Top-level error type for gateway operations.
///
/// Each variant maps to one row of the dispatch treatment table: whether the
/// retry loop may re-attempt it, whether the circuit breaker counts it, and
/// whether the dispatcher may fall back to the secondary provider.
#[derive(Debug, Error)]
pub enum GatewayError {
    // --- Upstream transport failures ---
    #[error("transport error: {0}")]
    Transport(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("upstream server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    // --- Dispatch-level failures ---
    #[error("circuit breaker open for {0}")]
    CircuitOpen(ProviderId),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("tool schema rejected by upstream: {0}")]
    ToolIncompatible(String),

    /// Upstream returned a body the translator cannot use (empty choices,
    /// unparseable JSON, missing message).
    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    // --- Operational errors ---
    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("memory store error: {0}")]
    Store(String),

    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    /// Whether the retry loop may re-attempt this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Timeout(_)
                | Self::RateLimited { .. }
                | Self::ServerError { .. }
        )
    }

    /// Whether the circuit breaker counts this failure against the provider.
    pub fn counts_toward_breaker(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Timeout(_)
                | Self::RateLimited { .. }
                | Self::ServerError { .. }
                | Self::ToolIncompatible(_)
                | Self::MalformedResponse(_)
        )
    }

    /// Whether the dispatcher may attempt the fallback provider after this.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Timeout(_)
                | Self::RateLimited { .. }
                | Self::ServerError { .. }
                | Self::CircuitOpen(_)
                | Self::ToolIncompatible(_)
        )
    }

    /// Stable kind string used in error bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Timeout(_) => "timeout",
            Self::RateLimited { .. } => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::CircuitOpen(_) => "circuit_breaker_open",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ToolIncompatible(_) => "tool_incompatible",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::Store(_) => "store",
            Self::Internal(_) => "internal",
        }
    }

    /// HTTP status the front door surfaces for this error.
    /// Mirrors the upstream where one exists, otherwise 502/503/504.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ServerError { status, .. } => *status,
            Self::RateLimited { .. } => 429,
            Self::Timeout(_) => 504,
            Self::CircuitOpen(_) | Self::Config(_) => 503,
            Self::InvalidRequest(_) => 400,
            _ => 502,
        }
    }
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
