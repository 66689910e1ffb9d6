use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::{
    Attempt, Fetch, FetchError, FetchOptions, Transport, TransportError,
};

/// Public relay that returns the body of the `url` query parameter as-is.
pub const DEFAULT_RELAY_ENDPOINT: &str = "https://api.allorigins.win/raw";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(12);

/// Lower bound applied to caller-supplied timeouts.
pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);

const PREVIEW_CHARS: usize = 180;

/// Direct-then-relay fetcher.
///
/// Every attempt is bounded by a timeout and raced against the caller's
/// cancellation token. The relay is tried exactly once, and only when the
/// direct attempt failed for a reason other than cancellation.
#[derive(Debug, Clone)]
pub struct HttpFetcher<T> {
    transport: T,
    relay_endpoint: Url,
    timeout: Duration,
}

impl<T: Transport> HttpFetcher<T> {
    /// # Panics
    /// Only if [`DEFAULT_RELAY_ENDPOINT`] stops being a valid URL.
    #[must_use]
    pub fn new(transport: T) -> Self {
        let relay_endpoint = Url::parse(DEFAULT_RELAY_ENDPOINT)
            .expect("default relay endpoint is a valid URL");

        Self {
            transport,
            relay_endpoint,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Use a different relay endpoint.
    ///
    /// # Errors
    /// [`FetchError::InvalidUrl`] if `endpoint` does not parse.
    pub fn with_relay_endpoint(
        mut self,
        endpoint: &str,
    ) -> Result<Self, FetchError> {
        self.relay_endpoint =
            Url::parse(endpoint).map_err(|e| FetchError::InvalidUrl {
                url: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        Ok(self)
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.max(MIN_TIMEOUT);
        self
    }

    /// Relay URL for `target`: the target is percent-encoded into the
    /// `url` query parameter of the relay endpoint.
    #[must_use]
    pub fn relay_url(&self, target: &str) -> String {
        let mut url = self.relay_endpoint.clone();
        url.query_pairs_mut().append_pair("url", target);
        url.into()
    }

    fn effective_timeout(&self, opts: &FetchOptions) -> Duration {
        opts.timeout.map_or(self.timeout, |t| t.max(MIN_TIMEOUT))
    }

    async fn attempt(
        &self,
        target: &str,
        attempt: Attempt,
        opts: &FetchOptions,
    ) -> Result<String, FetchError> {
        let request_url = match attempt {
            Attempt::Direct => target.to_string(),
            Attempt::Relay => self.relay_url(target),
        };
        let timeout = self.effective_timeout(opts);

        let request = tokio::time::timeout(
            timeout,
            self.transport.get(&request_url, timeout),
        );

        let outcome = match &opts.cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => return Err(FetchError::Cancelled),
                outcome = request => outcome,
            },
            None => request.await,
        };

        let response = outcome.map_err(|_| TransportError::Timeout {
            url: target.to_string(),
            timeout,
        })??;

        if !response.is_success() {
            return Err(TransportError::Status {
                status: response.status,
                url: target.to_string(),
            }
            .into());
        }

        Ok(response.body)
    }

    async fn run<V>(
        &self,
        url: &str,
        opts: &FetchOptions,
        decode: impl Fn(String, Attempt) -> Result<V, FetchError> + Send + Sync,
    ) -> Result<V, FetchError> {
        if opts.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let direct = match self
            .attempt(url, Attempt::Direct, opts)
            .await
            .and_then(|body| decode(body, Attempt::Direct))
        {
            Ok(value) => return Ok(value),
            Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
            Err(e) => e,
        };

        if opts.direct_only {
            return Err(direct);
        }

        if opts.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        tracing::warn!(
            url,
            error = %direct,
            "direct fetch failed, retrying through relay"
        );

        match self
            .attempt(url, Attempt::Relay, opts)
            .await
            .and_then(|body| decode(body, Attempt::Relay))
        {
            Ok(value) => Ok(value),
            Err(FetchError::Cancelled) => Err(FetchError::Cancelled),
            Err(relay) => Err(FetchError::Relay {
                direct: Box::new(direct),
                relay: Box::new(relay),
            }),
        }
    }
}

/// Parse a body that is expected to hold JSON. Surrounding whitespace is
/// ignored; failures carry a short single-line preview of the body.
///
/// # Errors
/// [`FetchError::Parse`] if the body is empty or not valid JSON.
pub fn parse_json(body: &str, attempt: Attempt) -> Result<Value, FetchError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(FetchError::Parse {
            attempt,
            preview: "empty response".to_string(),
        });
    }

    serde_json::from_str(trimmed).map_err(|_| FetchError::Parse {
        attempt,
        preview: preview(trimmed),
    })
}

fn preview(body: &str) -> String {
    let head: String = body.chars().take(PREVIEW_CHARS).collect();
    let collapsed = head.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        "no preview".to_string()
    } else {
        collapsed
    }
}

#[async_trait]
impl<T: Transport> Fetch for HttpFetcher<T> {
    #[tracing::instrument(skip(self, opts))]
    async fn fetch_json(
        &self,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<Value, FetchError> {
        self.run(url, opts, |body, attempt| parse_json(&body, attempt))
            .await
    }

    #[tracing::instrument(skip(self, opts))]
    async fn fetch_text(
        &self,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<String, FetchError> {
        self.run(url, opts, |body, _| Ok(body)).await
    }
}
