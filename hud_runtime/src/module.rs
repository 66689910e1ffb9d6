use hud_fetch::FetchError;
use thiserror::Error;

use crate::{RenderTarget, WidgetContext};

#[derive(Error, Debug)]
pub enum WidgetError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("response is missing {0}")]
    MissingField(String),
    #[error("no API endpoint named {0}")]
    MissingEndpoint(String),
    #[error("widget timers need a running tokio runtime")]
    NoRuntime,
    #[error("{0}")]
    Other(String),
}

/// Lifecycle hooks of a widget.
///
/// Every hook has a no-op default, so a widget only implements what it
/// needs.
///
/// - `mount` receives the widget's render target. It must not do network
///   I/O.
/// - `start` begins polling, usually through [`WidgetContext::every`].
///   Timers scheduled there belong to the instance and are cancelled by
///   the runtime on stop; the widget does not need to track them.
/// - `stop` releases anything the widget holds beyond its timers. What
///   was last rendered stays on the page.
pub trait WidgetModule: Send {
    fn mount(&mut self, target: RenderTarget) {
        let _ = target;
    }

    /// # Errors
    /// A failed start is logged by the registry and parks the instance;
    /// other widgets are unaffected.
    fn start(&mut self, ctx: WidgetContext) -> Result<(), WidgetError> {
        let _ = ctx;
        Ok(())
    }

    fn stop(&mut self) {}
}
