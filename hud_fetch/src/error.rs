use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which leg of a fetch produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Direct,
    Relay,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Relay => f.write_str("relay"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request to {url} failed: {reason}")]
    Unreachable { url: String, reason: String },
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("request to {url} timed out after {}ms", .timeout.as_millis())]
    Timeout { url: String, timeout: Duration },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("JSON parse failed ({attempt}): {preview}")]
    Parse { attempt: Attempt, preview: String },
    #[error("fetch failed direct: {direct} relay: {relay}")]
    Relay {
        direct: Box<FetchError>,
        relay: Box<FetchError>,
    },
    #[error("request cancelled")]
    Cancelled,
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl FetchError {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
