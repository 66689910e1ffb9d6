use hud_app::ContextProvider;
use hud_fetch::{CachingFetcher, Fetch, HttpFetcher, ReqwestTransport};
use hud_loader::{
    DEFAULT_FRAGMENT_PATH, DEFAULT_MANIFEST_PATH, Loader, LoaderConfig,
};
use hud_runtime::{Page, Registry, SharedContext};
use hud_state::{FileStore, HudState};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use types::VisibilityState;

mod widgets;

pub const DEFAULT_COINBASE_SPOT: &str =
    "https://api.coinbase.com/v2/prices/BTC-USD/spot";
pub const DEFAULT_MEMPOOL_API: &str = "https://mempool.space/api";
pub const DEFAULT_BITNODES_API: &str = "https://bitnodes.io/api/v1";

fn default_fragment_path() -> String {
    DEFAULT_FRAGMENT_PATH.to_string()
}

fn default_manifest_path() -> String {
    DEFAULT_MANIFEST_PATH.to_string()
}

fn default_state_file() -> PathBuf {
    PathBuf::from("hud-state.json")
}

const fn default_fetch_timeout_secs() -> u64 {
    12
}

const fn default_max_stale_secs() -> u64 {
    6 * 60 * 60
}

const fn default_snapshot_interval_secs() -> u64 {
    30
}

fn default_coinbase_spot_url() -> String {
    DEFAULT_COINBASE_SPOT.to_string()
}

fn default_mempool_api_url() -> String {
    DEFAULT_MEMPOOL_API.to_string()
}

fn default_bitnodes_api_url() -> String {
    DEFAULT_BITNODES_API.to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct Config {
    /// Prefix for root-relative site paths.
    site_url: String,
    #[serde(default = "default_fragment_path")]
    fragment_path: String,
    /// Empty disables the manifest.
    #[serde(default = "default_manifest_path")]
    manifest_path: String,
    #[serde(default = "default_state_file")]
    state_file: PathBuf,
    #[serde(default)]
    relay_endpoint: Option<String>,
    #[serde(default = "default_fetch_timeout_secs")]
    fetch_timeout_secs: u64,
    /// How long a response is served without refetching. Zero keeps the
    /// cache only as a fallback for failed fetches.
    #[serde(default)]
    cache_ttl_secs: u64,
    /// Oldest cached fragment or manifest served when the site is down.
    /// Widgets never get stale bodies; they keep their last rendered value.
    #[serde(default = "default_max_stale_secs")]
    max_stale_secs: u64,
    #[serde(default = "default_snapshot_interval_secs")]
    snapshot_interval_secs: u64,
    #[serde(default = "default_coinbase_spot_url")]
    coinbase_spot_url: String,
    #[serde(default = "default_mempool_api_url")]
    mempool_api_url: String,
    #[serde(default = "default_bitnodes_api_url")]
    bitnodes_api_url: String,
}

impl Config {
    fn loader_config(&self) -> LoaderConfig {
        let manifest_path = self.manifest_path.trim();
        LoaderConfig {
            prefix: self.site_url.clone(),
            fragment_path: self.fragment_path.clone(),
            manifest_path: (!manifest_path.is_empty())
                .then(|| manifest_path.to_string()),
        }
    }

    fn api(&self) -> [(&'static str, String); 3] {
        [
            ("COINBASE_SPOT", self.coinbase_spot_url.clone()),
            ("MEMPOOL", self.mempool_api_url.clone()),
            ("BITNODES", self.bitnodes_api_url.clone()),
        ]
    }

    fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs.max(1))
    }
}

struct AppContext {
    config: Config,
    fetcher: Arc<dyn Fetch>,
    hud: HudState<FileStore>,
}

fn build_fetcher(config: &Config) -> Arc<dyn Fetch> {
    let http = HttpFetcher::new(ReqwestTransport::new(reqwest::Client::new()))
        .with_timeout(Duration::from_secs(config.fetch_timeout_secs));

    let http = match &config.relay_endpoint {
        Some(endpoint) => match http.clone().with_relay_endpoint(endpoint) {
            Ok(http) => http,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "ignoring relay endpoint, using the default"
                );
                http
            }
        },
        None => http,
    };

    Arc::new(
        CachingFetcher::new(http, Duration::from_secs(config.cache_ttl_secs))
            .with_max_stale(Duration::from_secs(config.max_stale_secs)),
    )
}

impl ContextProvider<Config> for AppContext {
    async fn new(config: Config) -> Self {
        Self {
            fetcher: build_fetcher(&config),
            hud: HudState::new(FileStore::new(config.state_file.clone())),
            config,
        }
    }
}

impl AppContext {
    fn shared_context(&self) -> SharedContext {
        SharedContext::new(self.config.api(), Arc::clone(&self.fetcher))
    }
}

fn log_snapshot(page: &Page, mode: VisibilityState) {
    for slot in page.slots() {
        let fields = serde_json::json!(slot.fields());
        if mode == VisibilityState::Hidden {
            tracing::debug!(widget = slot.id(), %mode, %fields, "widget snapshot");
        } else {
            tracing::info!(widget = slot.id(), %mode, %fields, "widget snapshot");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let context = hud_app::create_app_context::<AppContext, Config>().await?;

    let mut registry = Registry::new(context.shared_context());
    let mut page = Page::new();
    let mut loader = Loader::new(
        context.config.loader_config(),
        Arc::clone(&context.fetcher),
        widgets::catalog(),
    );

    let report = loader.boot(&mut registry, &mut page, &context.hud).await?;
    tracing::info!(
        slots = ?report.slots,
        started = ?report.start.started,
        failed = ?report.start.failed,
        mode = %context.hud.current(),
        "widget host running"
    );

    let mut recovery = context.hud.subscribe();
    let mut snapshots = tokio::time::interval(context.config.snapshot_interval());
    snapshots.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = snapshots.tick() => log_snapshot(&page, context.hud.current()),
            Some(mode) = recovery.changed() => {
                tracing::info!(
                    %mode,
                    recovery_handle = mode == VisibilityState::Hidden,
                    "HUD mode changed"
                );
            }
        }
    }

    let stopped = registry.stop(None);
    tracing::info!(stopped, "widget host shutting down");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SITE_URL", "https://zzx.example");

            let config: Config = hud_app::load_config()?;

            assert_eq!(config.fragment_path, DEFAULT_FRAGMENT_PATH);
            assert_eq!(config.fetch_timeout_secs, 12);
            assert_eq!(config.cache_ttl_secs, 0);
            assert_eq!(config.relay_endpoint, None);
            assert_eq!(
                config.loader_config().manifest_path.as_deref(),
                Some(DEFAULT_MANIFEST_PATH)
            );
            assert_eq!(
                config.api().map(|(name, _)| name),
                ["COINBASE_SPOT", "MEMPOOL", "BITNODES"]
            );
            assert_eq!(config.api()[1].1, DEFAULT_MEMPOOL_API);
            Ok(())
        });
    }

    #[test]
    fn test_config_overrides() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SITE_URL", "/");
            jail.set_env("MANIFEST_PATH", "");
            jail.set_env("MEMPOOL_API_URL", "https://mempool.example/api");
            jail.set_env("RELAY_ENDPOINT", "https://relay.example/raw");
            jail.set_env("SNAPSHOT_INTERVAL_SECS", "0");

            let config: Config = hud_app::load_config()?;

            assert_eq!(config.loader_config().manifest_path, None);
            assert_eq!(config.loader_config().prefix, "/");
            assert_eq!(config.api()[1].1, "https://mempool.example/api");
            assert_eq!(
                config.relay_endpoint.as_deref(),
                Some("https://relay.example/raw")
            );
            assert_eq!(config.snapshot_interval(), Duration::from_secs(1));
            Ok(())
        });
    }

    #[test]
    fn test_config_requires_site_url() {
        figment::Jail::expect_with(|_jail| {
            assert!(hud_app::load_config::<Config>().is_err());
            Ok(())
        });
    }
}
