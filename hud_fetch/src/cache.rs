use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::{Fetch, FetchError, FetchOptions};

#[derive(Debug, Clone)]
struct Entry<V> {
    stored_at: Instant,
    value: V,
}

type Table<V> = Mutex<HashMap<String, Entry<V>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// TTL cache in front of another [`Fetch`].
///
/// Entries younger than the TTL are served without I/O. When the inner
/// fetch fails and the request allows stale data
/// ([`FetchOptions::allow_stale`]), the last good entry is served instead
/// as long as it is not older than `max_stale`. Without the opt-in the
/// failure propagates, so a stale body is never mistaken for a fresh one.
/// Cancellation always propagates.
#[derive(Debug)]
pub struct CachingFetcher<F> {
    inner: F,
    ttl: Duration,
    max_stale: Option<Duration>,
    json: Table<Value>,
    text: Table<String>,
}

impl<F: Fetch> CachingFetcher<F> {
    #[must_use]
    pub fn new(inner: F, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            max_stale: None,
            json: Mutex::default(),
            text: Mutex::default(),
        }
    }

    /// Refuse to serve entries older than `max_stale` after a failure.
    #[must_use]
    pub const fn with_max_stale(mut self, max_stale: Duration) -> Self {
        self.max_stale = Some(max_stale);
        self
    }

    pub fn clear(&self) {
        lock(&self.json).clear();
        lock(&self.text).clear();
    }

    async fn through<V, Fut>(
        &self,
        table: &Table<V>,
        url: &str,
        allow_stale: bool,
        load: Fut,
    ) -> Result<V, FetchError>
    where
        V: Clone + Send,
        Fut: Future<Output = Result<V, FetchError>> + Send,
    {
        let cached = lock(table)
            .get(url)
            .map(|entry| (entry.stored_at.elapsed(), entry.value.clone()));

        if let Some((age, value)) = &cached {
            if *age < self.ttl {
                tracing::debug!(url, "serving fresh cache entry");
                return Ok(value.clone());
            }
        }

        match load.await {
            Ok(value) => {
                lock(table).insert(
                    url.to_string(),
                    Entry {
                        stored_at: Instant::now(),
                        value: value.clone(),
                    },
                );
                Ok(value)
            }
            Err(FetchError::Cancelled) => Err(FetchError::Cancelled),
            Err(e) => match cached {
                Some((age, value))
                    if allow_stale
                        && self.max_stale.is_none_or(|max| age <= max) =>
                {
                    tracing::warn!(
                        url,
                        error = %e,
                        age_secs = age.as_secs(),
                        "fetch failed, serving stale cache entry"
                    );
                    Ok(value)
                }
                _ => Err(e),
            },
        }
    }
}

#[async_trait]
impl<F: Fetch> Fetch for CachingFetcher<F> {
    async fn fetch_json(
        &self,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<Value, FetchError> {
        let load = self.inner.fetch_json(url, opts);
        self.through(&self.json, url, opts.allow_stale, load).await
    }

    async fn fetch_text(
        &self,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<String, FetchError> {
        let load = self.inner.fetch_text(url, opts);
        self.through(&self.text, url, opts.allow_stale, load).await
    }
}
