use thiserror::Error;

pub type Result<T> = std::result::Result<T, StakeError>;

#[derive(Debug, Error)]
pub enum StakeError {
    #[error("network error: {0}")]
    Net(#[from] RpcError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("refresh error: {0}")]
    Refresh(#[from] RefreshError),
    #[error("invalid address `{0}`: expected a 0x-prefixed 20-byte hex address")]
    InvalidAddress(String),
    #[error("snapshot not ready: {0}")]
    NotReady(String),
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("transport failure on {endpoint}: {message}")]
    Transport { endpoint: String, message: String },
    #[error("{method} on {endpoint} timed out after {timeout_ms}ms")]
    Timeout {
        endpoint: String,
        method: String,
        timeout_ms: u64,
    },
    #[error("malformed {method} response: {reason}")]
    Decode { method: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("chain head unavailable: {0}")]
    HeadUnavailable(String),
    #[error("scan produced {found} validators, below the sanity minimum of {minimum}")]
    SanityCheck { found: usize, minimum: usize },
    #[error("snapshot generation {generation} superseded by {current}")]
    Superseded { generation: u64, current: u64 },
    #[error("refresh failed ({reason}); still serving generation {serving}")]
    Degraded { reason: String, serving: u64 },
}

impl StakeError {
    /// Cold-start and degraded-without-fallback conditions map here so HTTP
    /// layers can answer "not ready" instead of a server error.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady(_))
    }
}
