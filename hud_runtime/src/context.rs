use hud_fetch::{Fetch, FetchError, FetchOptions};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::WidgetError;

/// Read-only state handed to every widget: the logical API endpoints and
/// the shared fetch layer. Built once, then shared behind an `Arc`.
pub struct SharedContext {
    api: BTreeMap<String, String>,
    fetcher: Arc<dyn Fetch>,
}

impl std::fmt::Debug for SharedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedContext")
            .field("api", &self.api)
            .finish_non_exhaustive()
    }
}

impl SharedContext {
    pub fn new<I, K, V>(api: I, fetcher: Arc<dyn Fetch>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            api: api
                .into_iter()
                .map(|(name, url)| (name.into(), url.into()))
                .collect(),
            fetcher,
        }
    }

    #[must_use]
    pub const fn api(&self) -> &BTreeMap<String, String> {
        &self.api
    }

    #[must_use]
    pub fn endpoint(&self, name: &str) -> Option<&str> {
        self.api.get(name).map(String::as_str)
    }

    /// # Errors
    /// See [`Fetch::fetch_json`].
    pub async fn fetch_json(
        &self,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<Value, FetchError> {
        self.fetcher.fetch_json(url, opts).await
    }

    /// # Errors
    /// See [`Fetch::fetch_text`].
    pub async fn fetch_text(
        &self,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<String, FetchError> {
        self.fetcher.fetch_text(url, opts).await
    }
}

/// Timers and cancellation owned by one running instance.
#[derive(Debug, Clone)]
pub(crate) struct TaskScope {
    widget_id: Arc<str>,
    token: CancellationToken,
    timers: Arc<AtomicUsize>,
}

impl TaskScope {
    pub(crate) fn new(widget_id: &str) -> Self {
        Self {
            widget_id: Arc::from(widget_id),
            token: CancellationToken::new(),
            timers: Arc::default(),
        }
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    pub(crate) fn active_timers(&self) -> usize {
        self.timers.load(Ordering::SeqCst)
    }
}

/// Counts a timer as live until its loop exits.
struct LiveTimer(Arc<AtomicUsize>);

impl LiveTimer {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for LiveTimer {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Clears the in-flight flag when a tick finishes, is cancelled, or
/// panics.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// What a widget receives in `start`: the shared context plus the
/// instance's own task scope. Cheap to clone into tick closures.
#[derive(Debug, Clone)]
pub struct WidgetContext {
    shared: Arc<SharedContext>,
    scope: TaskScope,
}

impl WidgetContext {
    pub(crate) const fn new(
        shared: Arc<SharedContext>,
        scope: TaskScope,
    ) -> Self {
        Self { shared, scope }
    }

    #[must_use]
    pub fn widget_id(&self) -> &str {
        &self.scope.widget_id
    }

    #[must_use]
    pub fn shared(&self) -> &SharedContext {
        &self.shared
    }

    /// Base URL registered under `name`, joined with `path`.
    ///
    /// # Errors
    /// [`WidgetError::MissingEndpoint`] if `name` is not configured.
    pub fn endpoint(
        &self,
        name: &str,
        path: &str,
    ) -> Result<String, WidgetError> {
        let base = self
            .shared
            .endpoint(name)
            .ok_or_else(|| WidgetError::MissingEndpoint(name.to_string()))?;

        if path.is_empty() {
            return Ok(base.to_string());
        }

        Ok(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        ))
    }

    /// Token cancelled when the instance stops.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.scope.token.clone()
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.scope.token.is_cancelled()
    }

    /// Options carrying the instance's cancellation token, so a stop
    /// abandons requests still in flight.
    #[must_use]
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::new().cancel_on(self.cancellation_token())
    }

    /// # Errors
    /// See [`Fetch::fetch_json`].
    pub async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        self.shared.fetch_json(url, &self.fetch_options()).await
    }

    /// # Errors
    /// See [`Fetch::fetch_text`].
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        self.shared.fetch_text(url, &self.fetch_options()).await
    }

    /// Run `tick` now and then every `period` until the instance stops.
    ///
    /// Ticks never overlap: if the previous tick is still in flight when
    /// the timer fires, that firing is dropped rather than queued. Errors
    /// returned by a tick are logged and do not stop the timer.
    ///
    /// # Errors
    /// [`WidgetError::NoRuntime`] when called outside a tokio runtime.
    pub fn every<F, Fut>(
        &self,
        period: Duration,
        mut tick: F,
    ) -> Result<(), WidgetError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), WidgetError>> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| WidgetError::NoRuntime)?;

        if self.is_stopped() {
            return Ok(());
        }

        let live = LiveTimer::new(&self.scope.timers);
        let token = self.scope.token.clone();
        let widget_id = Arc::clone(&self.scope.widget_id);

        runtime.spawn(async move {
            let _live = live;
            let in_flight = Arc::new(AtomicBool::new(false));
            let mut interval = tokio::time::interval(period.max(MIN_PERIOD));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                if in_flight.swap(true, Ordering::AcqRel) {
                    tracing::trace!(
                        widget = %widget_id,
                        "previous tick still in flight, skipping"
                    );
                    continue;
                }

                let flag = InFlight(Arc::clone(&in_flight));
                let body = tick();
                let token = token.clone();
                let widget_id = Arc::clone(&widget_id);

                tokio::spawn(async move {
                    let _flag = flag;
                    tokio::select! {
                        biased;
                        () = token.cancelled() => {}
                        result = body => {
                            if let Err(e) = result {
                                tracing::warn!(
                                    widget = %widget_id,
                                    error = %e,
                                    "widget tick failed"
                                );
                            }
                        }
                    }
                });
            }

            tracing::debug!(widget = %widget_id, "timer released");
        });

        Ok(())
    }
}
