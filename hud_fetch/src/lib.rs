//! Network access shared by every widget.
//!
//! [`HttpFetcher`] tries the target URL directly and, when that fails for
//! any reason other than cancellation, retries exactly once through a CORS
//! relay that echoes the target's body verbatim. [`CachingFetcher`] wraps
//! any [`Fetch`] implementation with a TTL cache without changing call
//! sites.
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod cache;
mod error;
mod http;
mod transport;

pub use cache::CachingFetcher;
pub use error::{Attempt, FetchError, TransportError};
pub use http::{
    DEFAULT_RELAY_ENDPOINT, DEFAULT_TIMEOUT, HttpFetcher, MIN_TIMEOUT,
    parse_json,
};
pub use transport::{ReqwestTransport, Transport, TransportResponse};

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
    pub direct_only: bool,
    pub allow_stale: bool,
}

impl FetchOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Skip the relay fallback. Used for same-site requests.
    #[must_use]
    pub const fn direct_only(mut self) -> Self {
        self.direct_only = true;
        self
    }

    /// Let a [`CachingFetcher`] answer a failed request with its last good
    /// entry. Callers that report freshness leave this off.
    #[must_use]
    pub const fn allow_stale(mut self) -> Self {
        self.allow_stale = true;
        self
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetch `url` and parse the body as JSON.
    ///
    /// # Errors
    /// [`FetchError::Cancelled`] if the options' token fires, otherwise the
    /// error left after every recovery path has been tried.
    async fn fetch_json(
        &self,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<Value, FetchError>;

    /// Fetch `url` and return the body as text.
    ///
    /// # Errors
    /// Same as [`Fetch::fetch_json`], minus parse failures.
    async fn fetch_text(
        &self,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<String, FetchError>;
}

#[async_trait]
impl<F: Fetch + ?Sized> Fetch for Arc<F> {
    async fn fetch_json(
        &self,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<Value, FetchError> {
        (**self).fetch_json(url, opts).await
    }

    async fn fetch_text(
        &self,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<String, FetchError> {
        (**self).fetch_text(url, opts).await
    }
}
