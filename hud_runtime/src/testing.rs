use async_trait::async_trait;
use hud_fetch::{Fetch, FetchError, FetchOptions, TransportError};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::SharedContext;

/// Fetch double that replays queued responses after an optional delay and
/// records call counts and peak concurrency.
#[derive(Debug, Default)]
pub struct ScriptedFetch {
    responses: Mutex<VecDeque<Result<Value, FetchError>>>,
    delay: Duration,
    ignore_cancel: bool,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct Pending<'a>(&'a AtomicUsize);

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Keep sleeping through a cancelled token, like a transport that
    /// cannot abort a request.
    pub fn ignoring_cancel(mut self) -> Self {
        self.ignore_cancel = true;
        self
    }

    pub fn push(self, response: Result<Value, FetchError>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn unreachable(url: &str) -> FetchError {
        FetchError::Transport(TransportError::Unreachable {
            url: url.to_string(),
            reason: "connection refused".to_string(),
        })
    }

    async fn next(
        &self,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<Value, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _pending = Pending(&self.in_flight);

        match (&opts.cancel, self.ignore_cancel) {
            (Some(token), false) => {
                tokio::select! {
                    () = token.cancelled() => return Err(FetchError::Cancelled),
                    () = tokio::time::sleep(self.delay) => {}
                }
            }
            _ => tokio::time::sleep(self.delay).await,
        }

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Self::unreachable(url)))
    }
}

#[async_trait]
impl Fetch for ScriptedFetch {
    async fn fetch_json(
        &self,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<Value, FetchError> {
        self.next(url, opts).await
    }

    async fn fetch_text(
        &self,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<String, FetchError> {
        self.next(url, opts).await.map(|value| match value {
            Value::String(text) => text,
            other => other.to_string(),
        })
    }
}

pub fn shared(fetch: &Arc<ScriptedFetch>) -> SharedContext {
    SharedContext::new(
        [
            ("SPOT", "https://api.example/spot"),
            ("MEMPOOL", "https://mempool.example/api/"),
        ],
        Arc::clone(fetch) as Arc<dyn Fetch>,
    )
}
