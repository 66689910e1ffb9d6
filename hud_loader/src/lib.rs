//! Loads the widget fragment and boots the runtime against it.
//!
//! Booting mirrors what a page does on load: fetch the fragment holding the
//! widget slots, pull in its stylesheets and scripts once, read the widget
//! manifest for ordering, enablement and the default HUD mode, run the
//! registration of every widget that has a slot, then start the registry.
use hud_fetch::{Fetch, FetchOptions};
use hud_runtime::{Page, Registry, StartSummary};
use hud_state::{HudState, KeyValueStore};
use std::collections::BTreeSet;
use std::sync::Arc;
use types::{Manifest, VisibilityState};

mod catalog;
mod error;
mod fragment;
mod paths;

pub use catalog::{Registration, ScriptCatalog};
pub use error::LoaderError;
pub use fragment::{Fragment, parse_fragment};
pub use paths::{DEFAULT_PREFIX, join, prefix_or_default};

pub const DEFAULT_FRAGMENT_PATH: &str = "/__partials/widgets/widgets.html";
pub const DEFAULT_MANIFEST_PATH: &str = "/__partials/widgets/manifest.json";

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub prefix: String,
    pub fragment_path: String,
    /// `None` boots without a manifest: every slot, in fragment order.
    pub manifest_path: Option<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            fragment_path: DEFAULT_FRAGMENT_PATH.to_string(),
            manifest_path: Some(DEFAULT_MANIFEST_PATH.to_string()),
        }
    }
}

/// Result of one [`Loader::boot`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootReport {
    /// Slot ids on the page after boot, in page order.
    pub slots: Vec<String>,
    /// Slots left empty: disabled by the manifest or not listed in it.
    pub disabled: Vec<String>,
    /// Mode applied from the manifest, if it declares one.
    pub mode: Option<VisibilityState>,
    pub start: StartSummary,
}

pub struct Loader {
    config: LoaderConfig,
    fetcher: Arc<dyn Fetch>,
    catalog: ScriptCatalog,
    stylesheets: BTreeSet<String>,
    scripts: BTreeSet<String>,
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("config", &self.config)
            .field("stylesheets", &self.stylesheets)
            .field("scripts", &self.scripts)
            .finish_non_exhaustive()
    }
}

impl Loader {
    pub fn new(
        config: LoaderConfig,
        fetcher: Arc<dyn Fetch>,
        catalog: ScriptCatalog,
    ) -> Self {
        Self {
            config,
            fetcher,
            catalog,
            stylesheets: BTreeSet::new(),
            scripts: BTreeSet::new(),
        }
    }

    /// Resolve a site path against the configured prefix.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        join(prefix_or_default(&self.config.prefix), path)
    }

    /// Same-site requests never go through the relay. A cached copy of the
    /// fragment or manifest is good enough when the site is briefly down.
    fn options() -> FetchOptions {
        FetchOptions::new().direct_only().allow_stale()
    }

    /// Fetch and parse the widget fragment.
    ///
    /// # Errors
    /// [`LoaderError::Fetch`] when the fragment cannot be fetched.
    pub async fn load_fragment(&self) -> Result<Fragment, LoaderError> {
        let path = self.url(&self.config.fragment_path);
        let html = self
            .fetcher
            .fetch_text(&path, &Self::options())
            .await
            .map_err(|source| LoaderError::Fetch {
                path: path.clone(),
                source,
            })?;

        parse_fragment(&html)
    }

    /// Fetch the widget manifest. `Ok(None)` when no manifest is
    /// configured.
    ///
    /// # Errors
    /// [`LoaderError::Fetch`] or [`LoaderError::Manifest`].
    pub async fn load_manifest(&self) -> Result<Option<Manifest>, LoaderError> {
        let Some(manifest_path) = &self.config.manifest_path else {
            return Ok(None);
        };

        let path = self.url(manifest_path);
        let value = self
            .fetcher
            .fetch_json(&path, &Self::options())
            .await
            .map_err(|source| LoaderError::Fetch {
                path: path.clone(),
                source,
            })?;

        serde_json::from_value(value).map(Some).map_err(|e| {
            LoaderError::Manifest {
                path,
                reason: e.to_string(),
            }
        })
    }

    /// Record a stylesheet. Returns `false` if it was already present.
    pub fn ensure_stylesheet(&mut self, href: &str) -> bool {
        let href = self.url(href);
        if !self.stylesheets.insert(href.clone()) {
            return false;
        }
        tracing::debug!(href = %href, "stylesheet injected");
        true
    }

    /// Run the script registered under `key`, once per loader. Returns
    /// `false` if it already ran. Keys without a catalog entry are only
    /// recorded.
    pub fn ensure_script(&mut self, key: &str, registry: &mut Registry) -> bool {
        if !self.scripts.insert(key.to_string()) {
            return false;
        }

        match self.catalog.get(key) {
            Some(registration) => {
                registration(registry);
                tracing::debug!(script = key, "script loaded");
            }
            None => tracing::debug!(script = key, "no registration for script"),
        }
        true
    }

    #[must_use]
    pub fn stylesheets(&self) -> Vec<&str> {
        self.stylesheets.iter().map(String::as_str).collect()
    }

    #[must_use]
    pub fn is_script_loaded(&self, key: &str) -> bool {
        self.scripts.contains(key)
    }

    /// Load everything and start the registry against `page`.
    ///
    /// A missing or invalid manifest is logged and treated as absent. A
    /// second boot leaves live widgets alone.
    ///
    /// # Errors
    /// [`LoaderError`] if the fragment cannot be loaded. Nothing has been
    /// changed in that case.
    pub async fn boot<S: KeyValueStore>(
        &mut self,
        registry: &mut Registry,
        page: &mut Page,
        hud: &HudState<S>,
    ) -> Result<BootReport, LoaderError> {
        let fragment = self.load_fragment().await?;

        let manifest = match self.load_manifest().await {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!(error = %e, "booting without a manifest");
                None
            }
        };

        let mut report = BootReport::default();

        let (ordered, enabled) = layout(&fragment, manifest.as_ref());
        page.replace_slots(&ordered);
        report.slots = ordered;

        if let Some(manifest) = &manifest
            && manifest.default_mode.is_some()
        {
            report.mode = Some(hud.set_state(manifest.default_mode()));
        }

        for href in &fragment.stylesheets {
            self.ensure_stylesheet(href);
        }
        for src in &fragment.scripts {
            self.ensure_script(src, registry);
        }

        for id in &report.slots {
            if enabled.contains(id) {
                self.ensure_script(id, registry);
            } else if let Some(slot) = page.slot(id) {
                registry.stop(Some(id));
                slot.clear();
                report.disabled.push(id.clone());
            }
        }

        let pruned = registry.prune(page);
        if pruned > 0 {
            tracing::debug!(pruned, "dropped widgets whose slot went away");
        }

        let mountable = page.filtered(|slot| enabled.contains(slot.id()));
        report.start = registry.start(&mountable);

        tracing::info!(
            slots = report.slots.len(),
            disabled = report.disabled.len(),
            started = report.start.started.len(),
            "widgets booted"
        );

        Ok(report)
    }

    /// Boot again. With `force`, every widget is stopped and every slot
    /// emptied first, so everything remounts.
    ///
    /// # Errors
    /// See [`Loader::boot`].
    pub async fn rebind<S: KeyValueStore>(
        &mut self,
        registry: &mut Registry,
        page: &mut Page,
        hud: &HudState<S>,
        force: bool,
    ) -> Result<BootReport, LoaderError> {
        if force {
            let stopped = registry.stop(None);
            page.clear_all();
            tracing::info!(stopped, "forced rebind");
        }
        self.boot(registry, page, hud).await
    }
}

/// Page order and the set of slots to mount.
///
/// Without a manifest every fragment slot is kept and mounted in fragment
/// order. With one, slots follow manifest priority; fragment slots the
/// manifest does not list go last and stay unmounted, as do entries the
/// manifest disables.
fn layout(
    fragment: &Fragment,
    manifest: Option<&Manifest>,
) -> (Vec<String>, BTreeSet<String>) {
    let Some(manifest) = manifest else {
        return (
            fragment.slots.clone(),
            fragment.slots.iter().cloned().collect(),
        );
    };

    let mut ordered = Vec::with_capacity(fragment.slots.len());
    let mut enabled = BTreeSet::new();

    for entry in manifest.ordered() {
        if !fragment.slots.contains(&entry.id) || ordered.contains(&entry.id) {
            continue;
        }
        if entry.is_enabled() {
            enabled.insert(entry.id.clone());
        }
        ordered.push(entry.id.clone());
    }

    for id in &fragment.slots {
        if !ordered.contains(id) {
            ordered.push(id.clone());
        }
    }

    (ordered, enabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hud_fetch::{Attempt, FetchError, TransportError, parse_json};
    use hud_runtime::{
        LifecycleState, RenderTarget, SharedContext, WidgetModule,
    };
    use hud_state::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    const SITE: &str = "https://zzx.example";

    const FRAGMENT: &str = r#"
        <link rel="stylesheet" href="/__partials/widgets/_core/widget-core.css">
        <div class="btc-slot" data-widget="bitcoin-ticker"></div>
        <div class="btc-slot" data-widget="fees"></div>
        <div class="btc-slot" data-widget="tip"></div>
        <div class="btc-slot" data-widget="nodes"></div>
        <script src="/__partials/widgets/runtime.js"></script>
    "#;

    const MANIFEST: &str = r#"{
        "defaultMode": "ticker-only",
        "widgets": [
            { "id": "tip", "priority": 3 },
            { "id": "bitcoin-ticker", "title": "BTC", "priority": 1 },
            { "id": "fees", "enabled": false, "priority": 2 },
            { "id": "lightning", "priority": 4 }
        ]
    }"#;

    #[derive(Default)]
    struct Site {
        pages: BTreeMap<String, String>,
        requests: Mutex<Vec<(String, bool)>>,
    }

    impl Site {
        fn with(mut self, path: &str, body: &str) -> Self {
            self.pages.insert(format!("{SITE}{path}"), body.to_string());
            self
        }

        fn requests(&self) -> Vec<(String, bool)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetch for Site {
        async fn fetch_json(
            &self,
            url: &str,
            opts: &FetchOptions,
        ) -> Result<Value, FetchError> {
            parse_json(&self.fetch_text(url, opts).await?, Attempt::Direct)
        }

        async fn fetch_text(
            &self,
            url: &str,
            opts: &FetchOptions,
        ) -> Result<String, FetchError> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), opts.direct_only));
            self.pages.get(url).cloned().ok_or_else(|| {
                TransportError::Status {
                    status: 404,
                    url: url.to_string(),
                }
                .into()
            })
        }
    }

    struct Marker;

    impl WidgetModule for Marker {
        fn mount(&mut self, target: RenderTarget) {
            target.set("mounted", "yes");
        }
    }

    fn register_ticker(registry: &mut Registry) {
        registry.register("bitcoin-ticker", Marker);
    }

    fn register_fees(registry: &mut Registry) {
        registry.register("fees", Marker);
    }

    fn register_tip(registry: &mut Registry) {
        registry.register("tip", Marker);
    }

    fn register_nodes(registry: &mut Registry) {
        registry.register("nodes", Marker);
    }

    fn catalog() -> ScriptCatalog {
        ScriptCatalog::new()
            .with("bitcoin-ticker", register_ticker)
            .with("fees", register_fees)
            .with("tip", register_tip)
            .with("nodes", register_nodes)
    }

    struct Harness {
        site: Arc<Site>,
        loader: Loader,
        registry: Registry,
        page: Page,
        hud: HudState<MemoryStore>,
    }

    fn harness(site: Site, manifest: bool) -> Harness {
        let site = Arc::new(site);
        let config = LoaderConfig {
            prefix: SITE.to_string(),
            manifest_path: manifest.then(|| DEFAULT_MANIFEST_PATH.to_string()),
            ..LoaderConfig::default()
        };
        let fetcher: Arc<dyn Fetch> = site.clone();

        Harness {
            loader: Loader::new(config, Arc::clone(&fetcher), catalog()),
            registry: Registry::new(SharedContext::new(
                [("MEMPOOL", "https://mempool.space/api")],
                fetcher,
            )),
            page: Page::new(),
            hud: HudState::new(MemoryStore::new()),
            site,
        }
    }

    impl Harness {
        async fn boot(&mut self) -> Result<BootReport, LoaderError> {
            self.loader
                .boot(&mut self.registry, &mut self.page, &self.hud)
                .await
        }

        fn mounted(&self, id: &str) -> Option<String> {
            self.page.slot(id).and_then(|slot| slot.text("mounted"))
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_boot_without_manifest_mounts_every_slot() {
        let site = Site::default().with(DEFAULT_FRAGMENT_PATH, FRAGMENT);
        let mut h = harness(site, false);

        let report = h.boot().await.unwrap();

        let all = strings(&["bitcoin-ticker", "fees", "tip", "nodes"]);
        assert_eq!(report.slots, all);
        assert_eq!(report.start.started, all);
        assert_eq!(report.mode, None);
        assert_eq!(h.registry.live_count(), 4);
        assert_eq!(
            h.loader.stylesheets(),
            vec![
                "https://zzx.example/__partials/widgets/_core/widget-core.css"
            ]
        );
        assert!(h.loader.is_script_loaded("/__partials/widgets/runtime.js"));
        assert!(
            h.site
                .requests()
                .iter()
                .all(|(_, direct_only)| *direct_only)
        );
    }

    #[tokio::test]
    async fn test_boot_follows_manifest() {
        let site = Site::default()
            .with(DEFAULT_FRAGMENT_PATH, FRAGMENT)
            .with(DEFAULT_MANIFEST_PATH, MANIFEST);
        let mut h = harness(site, true);

        let report = h.boot().await.unwrap();

        assert_eq!(
            report.slots,
            strings(&["bitcoin-ticker", "fees", "tip", "nodes"])
        );
        assert_eq!(report.start.started, strings(&["bitcoin-ticker", "tip"]));
        assert_eq!(report.disabled, strings(&["fees", "nodes"]));
        assert_eq!(report.mode, Some(VisibilityState::TickerOnly));
        assert_eq!(h.hud.current(), VisibilityState::TickerOnly);
        assert_eq!(h.mounted("tip"), Some("yes".to_string()));
        assert_eq!(h.mounted("fees"), None);
        assert!(!h.loader.is_script_loaded("fees"));
        assert_eq!(h.registry.state("fees"), None);
    }

    #[tokio::test]
    async fn test_second_boot_does_not_remount() {
        let site = Site::default().with(DEFAULT_FRAGMENT_PATH, FRAGMENT);
        let mut h = harness(site, false);
        h.boot().await.unwrap();
        let tip = h.page.slot("tip").unwrap().clone();

        let report = h.boot().await.unwrap();

        assert!(report.start.started.is_empty());
        assert_eq!(report.start.already_live.len(), 4);
        assert_eq!(h.registry.live_count(), 4);
        assert!(h.page.slot("tip").unwrap().same_as(&tip));
        assert!(!h.loader.ensure_script("tip", &mut h.registry));
        assert!(!h.loader.ensure_stylesheet(
            "/__partials/widgets/_core/widget-core.css"
        ));
    }

    #[tokio::test]
    async fn test_invalid_manifest_is_ignored() {
        let site = Site::default()
            .with(DEFAULT_FRAGMENT_PATH, FRAGMENT)
            .with(DEFAULT_MANIFEST_PATH, r#"{"widgets": "nope"}"#);
        let mut h = harness(site, true);

        let report = h.boot().await.unwrap();

        assert_eq!(report.start.started.len(), 4);
        assert_eq!(report.mode, None);
        assert_eq!(h.hud.current(), VisibilityState::Full);
    }

    #[tokio::test]
    async fn test_missing_fragment_fails_boot() {
        let mut h = harness(Site::default(), false);

        let err = h.boot().await.unwrap_err();

        assert!(matches!(err, LoaderError::Fetch { .. }));
        assert!(h.page.slots().is_empty());
        assert_eq!(h.registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_forced_rebind_remounts_everything() {
        let site = Site::default().with(DEFAULT_FRAGMENT_PATH, FRAGMENT);
        let mut h = harness(site, false);
        h.boot().await.unwrap();
        h.page.slot("fees").unwrap().clear();

        let report = h
            .loader
            .rebind(&mut h.registry, &mut h.page, &h.hud, true)
            .await
            .unwrap();

        assert_eq!(report.start.started.len(), 4);
        assert_eq!(h.mounted("fees"), Some("yes".to_string()));
        assert_eq!(h.registry.state("fees"), Some(LifecycleState::Running));
    }

    #[tokio::test]
    async fn test_unforced_rebind_is_a_plain_boot() {
        let site = Site::default().with(DEFAULT_FRAGMENT_PATH, FRAGMENT);
        let mut h = harness(site, false);
        h.boot().await.unwrap();

        let report = h
            .loader
            .rebind(&mut h.registry, &mut h.page, &h.hud, false)
            .await
            .unwrap();

        assert!(report.start.started.is_empty());
    }
}
