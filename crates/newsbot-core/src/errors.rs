use crate::rate_limit::Route;

/// Core error type for the relay.
///
/// Adapter crates map their transport errors into this type so the update
/// loop can tell the one recoverable condition (rate limiting) apart from
/// everything that should end the current cycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited: {0}")]
    RateLimited(Route),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("external error: {0}")]
    External(String),

    #[error("invalid state: {0}")]
    State(String),
}

impl Error {
    /// True for the errors that are recovered by waiting (deferred drain,
    /// blocking poll before channel creation) instead of ending the cycle.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
