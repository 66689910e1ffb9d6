//! Built-in widgets.
//!
//! Every built-in widget has the same shape: on an interval, try a short
//! list of upstream endpoints in order and render the first response that
//! yields something. Only the endpoint list and the rendering differ, so
//! each widget is a [`Feed`] and [`Polling`] does the rest.
pub mod fees;
pub mod hashrate;
pub mod lightning;
pub mod nodes;
pub mod price;
pub mod tip;

use chrono::{SecondsFormat, Utc};
use hud_loader::ScriptCatalog;
use hud_runtime::{
    Registry, RenderTarget, WidgetContext, WidgetError, WidgetModule,
};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Shown until the first successful update.
pub const PLACEHOLDER: &str = "—";

pub type Fields = Vec<(&'static str, String)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Body {
    Json,
    /// Plain text, handed to [`Feed::render`] as a JSON string.
    Text,
}

/// Widget-specific half of a polling widget.
pub trait Feed: Send + 'static {
    const ID: &'static str;
    const PERIOD: Duration;
    const BODY: Body = Body::Json;
    /// `(api name, path)` pairs, tried in order.
    const SOURCES: &'static [(&'static str, &'static str)];
    /// Fields set to [`PLACEHOLDER`] on mount.
    const FIELDS: &'static [&'static str];

    /// Pick the displayed fields out of a response. `None` when the
    /// response does not carry what the widget shows.
    fn render(body: &Value) -> Option<Fields>;
}

pub struct Polling<F> {
    target: Option<RenderTarget>,
    feed: PhantomData<fn() -> F>,
}

impl<F> Default for Polling<F> {
    fn default() -> Self {
        Self {
            target: None,
            feed: PhantomData,
        }
    }
}

impl<F: Feed> WidgetModule for Polling<F> {
    fn mount(&mut self, target: RenderTarget) {
        target.set_many(
            F::FIELDS
                .iter()
                .map(|field| (*field, PLACEHOLDER.to_string())),
        );
        self.target = Some(target);
    }

    fn start(&mut self, ctx: WidgetContext) -> Result<(), WidgetError> {
        let target = self.target.clone().ok_or_else(|| {
            WidgetError::Other(format!("{} started before mount", F::ID))
        })?;

        let urls: Arc<[String]> = F::SOURCES
            .iter()
            .map(|(api, path)| ctx.endpoint(api, path))
            .collect::<Result<Vec<_>, _>>()?
            .into();

        let tick_ctx = ctx.clone();
        ctx.every(F::PERIOD, move || {
            poll::<F>(tick_ctx.clone(), target.clone(), Arc::clone(&urls))
        })
    }
}

async fn poll<F: Feed>(
    ctx: WidgetContext,
    target: RenderTarget,
    urls: Arc<[String]>,
) -> Result<(), WidgetError> {
    let mut last_error = None;

    for url in urls.iter() {
        let body = match F::BODY {
            Body::Json => ctx.fetch_json(url).await,
            Body::Text => ctx.fetch_text(url).await.map(Value::String),
        };

        match body {
            Ok(body) => {
                if let Some(mut fields) = F::render(&body) {
                    fields.push((
                        "updated",
                        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                    ));
                    target.set_many(fields);
                    return Ok(());
                }
                tracing::debug!(
                    widget = F::ID,
                    url = %url,
                    "response had nothing to show"
                );
                last_error = Some(WidgetError::MissingField(format!(
                    "{} data in {url}",
                    F::ID
                )));
            }
            Err(e) if e.is_cancelled() => return Err(e.into()),
            Err(e) => last_error = Some(e.into()),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        WidgetError::Other(format!("{} has no sources", F::ID))
    }))
}

fn register<F: Feed>(registry: &mut Registry) {
    registry.register(F::ID, Polling::<F>::default());
}

/// Registration for every built-in widget, keyed by widget id.
#[must_use]
pub fn catalog() -> ScriptCatalog {
    ScriptCatalog::new()
        .with(price::Price::ID, register::<price::Price>)
        .with(fees::Fees::ID, register::<fees::Fees>)
        .with(tip::Tip::ID, register::<tip::Tip>)
        .with(hashrate::Hashrate::ID, register::<hashrate::Hashrate>)
        .with(nodes::Nodes::ID, register::<nodes::Nodes>)
        .with(lightning::Lightning::ID, register::<lightning::Lightning>)
}

/// Abbreviate large counts: `12345678` becomes `12.35M`.
#[must_use]
pub fn compact(n: f64) -> String {
    const UNITS: [(f64, &str); 4] =
        [(1e12, "T"), (1e9, "B"), (1e6, "M"), (1e3, "K")];

    UNITS
        .iter()
        .find(|(scale, _)| n.abs() >= *scale)
        .map_or_else(
            || format!("{n:.0}"),
            |(scale, suffix)| format!("{:.2}{suffix}", n / scale),
        )
}

/// Whole numbers without decimals, anything else with one.
#[must_use]
pub fn rate(n: f64) -> String {
    if n.fract().abs() < f64::EPSILON {
        format!("{n:.0}")
    } else {
        format!("{n:.1}")
    }
}
