use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod utils;

pub use utils::{pick_f64, pick_i64, pick_str, pick_value};

/// HUD display mode.
///
/// Persisted as one of `full`, `ticker-only` or `hidden`. Anything else
/// read back from storage is treated as [`VisibilityState::Full`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum VisibilityState {
    #[default]
    Full,

    TickerOnly,

    Hidden,
}

impl VisibilityState {
    pub const ALL: [Self; 3] = [Self::Full, Self::TickerOnly, Self::Hidden];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::TickerOnly => "ticker-only",
            Self::Hidden => "hidden",
        }
    }

    /// Lenient parse used for stored and manifest values.
    #[must_use]
    pub fn parse_or_default(value: &str) -> Self {
        value.trim().parse().unwrap_or_default()
    }
}

impl fmt::Display for VisibilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVisibilityState(pub String);

impl fmt::Display for UnknownVisibilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown visibility state: {:?}", self.0)
    }
}

impl std::error::Error for UnknownVisibilityState {}

impl FromStr for VisibilityState {
    type Err = UnknownVisibilityState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownVisibilityState(s.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_mode: Option<String>,

    #[serde(default)]
    pub widgets: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

/// Priority given to manifest entries that do not declare one.
pub const DEFAULT_PRIORITY: i64 = 9999;

impl ManifestEntry {
    /// Entries are enabled unless explicitly disabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled != Some(false)
    }

    #[must_use]
    pub fn priority(&self) -> i64 {
        self.priority.unwrap_or(DEFAULT_PRIORITY)
    }
}

impl Manifest {
    #[must_use]
    pub fn default_mode(&self) -> VisibilityState {
        self.default_mode
            .as_deref()
            .map(VisibilityState::parse_or_default)
            .unwrap_or_default()
    }

    /// Entries with an id, sorted by ascending priority. The sort is
    /// stable, so entries sharing a priority keep manifest order.
    #[must_use]
    pub fn ordered(&self) -> Vec<&ManifestEntry> {
        let mut entries: Vec<&ManifestEntry> = self
            .widgets
            .iter()
            .filter(|entry| !entry.id.trim().is_empty())
            .collect();
        entries.sort_by_key(|entry| entry.priority());
        entries
    }

    #[must_use]
    pub fn entry(&self, id: &str) -> Option<&ManifestEntry> {
        self.widgets.iter().find(|entry| entry.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_visibility_round_trips_through_strings() {
        for state in VisibilityState::ALL {
            assert_eq!(state.as_str().parse::<VisibilityState>(), Ok(state));
        }
        assert_eq!(
            serde_json::to_string(&VisibilityState::TickerOnly).unwrap(),
            "\"ticker-only\""
        );
    }

    #[test]
    fn test_unknown_visibility_defaults_to_full() {
        assert!("sideways".parse::<VisibilityState>().is_err());
        assert_eq!(
            VisibilityState::parse_or_default("sideways"),
            VisibilityState::Full
        );
        assert_eq!(
            VisibilityState::parse_or_default(" hidden "),
            VisibilityState::Hidden
        );
    }

    #[test]
    fn test_manifest_orders_by_priority() {
        let manifest: Manifest = serde_json::from_str(
            r#"{
                "defaultMode": "ticker-only",
                "widgets": [
                    {"id": "nodes"},
                    {"id": "fees", "priority": 20},
                    {"id": "", "priority": 1},
                    {"id": "bitcoin-ticker", "priority": 10, "enabled": true},
                    {"id": "tip", "priority": 20, "enabled": false}
                ]
            }"#,
        )
        .unwrap();

        let ids: Vec<&str> =
            manifest.ordered().iter().map(|e| e.id.as_str()).collect();

        assert_eq!(ids, vec!["bitcoin-ticker", "fees", "tip", "nodes"]);
        assert_eq!(manifest.default_mode(), VisibilityState::TickerOnly);
        assert!(!manifest.entry("tip").unwrap().is_enabled());
        assert!(manifest.entry("nodes").unwrap().is_enabled());
    }

    #[test]
    fn test_manifest_without_mode_is_full() {
        let manifest: Manifest = serde_json::from_str("{}").unwrap();
        assert_eq!(manifest.default_mode(), VisibilityState::Full);
        assert!(manifest.ordered().is_empty());
    }
}
