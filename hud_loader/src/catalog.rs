use hud_runtime::Registry;
use std::collections::BTreeMap;

/// Registers one or more widget modules. Plays the part a widget script
/// plays in the browser: running it is the module's self-registration.
pub type Registration = fn(&mut Registry);

/// Registration functions keyed by script key (a widget id, or a script
/// path from the fragment).
#[derive(Debug, Clone, Default)]
pub struct ScriptCatalog {
    scripts: BTreeMap<String, Registration>,
}

impl ScriptCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: &str, registration: Registration) -> Self {
        self.add(key, registration);
        self
    }

    pub fn add(&mut self, key: &str, registration: Registration) {
        self.scripts.insert(key.to_string(), registration);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Registration> {
        self.scripts.get(key).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.scripts.keys().map(String::as_str)
    }
}
