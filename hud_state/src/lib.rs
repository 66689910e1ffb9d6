use tokio::sync::watch;
use types::VisibilityState;

mod store;

pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};

/// Storage key holding the HUD mode.
pub const MODE_KEY: &str = "zzx.hud.mode.v1";

/// Owner of the persisted HUD mode.
///
/// Widgets and the runtime only ever read the mode. Changing it goes
/// through [`HudState::set_state`] or [`HudState::reset`], which persist
/// the new value and notify the recovery handle: the single control that
/// brings a hidden HUD back and which is shown only while the mode is
/// [`VisibilityState::Hidden`].
#[derive(Debug)]
pub struct HudState<S> {
    store: S,
    handle: watch::Sender<VisibilityState>,
}

/// Observer for the recovery handle.
#[derive(Debug, Clone)]
pub struct RecoveryHandle {
    receiver: watch::Receiver<VisibilityState>,
}

impl RecoveryHandle {
    #[must_use]
    pub fn mode(&self) -> VisibilityState {
        *self.receiver.borrow()
    }

    /// The handle is only shown while the HUD is hidden.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.mode() == VisibilityState::Hidden
    }

    /// Wait for the next mode change. Returns `None` once the owning
    /// [`HudState`] is gone.
    pub async fn changed(&mut self) -> Option<VisibilityState> {
        self.receiver.changed().await.ok()?;
        Some(*self.receiver.borrow_and_update())
    }
}

impl<S: KeyValueStore> HudState<S> {
    /// Create the controller and apply the stored mode.
    pub fn new(store: S) -> Self {
        let initial = read_mode(&store);
        let (handle, _) = watch::channel(initial);
        Self { store, handle }
    }

    /// Read the persisted mode.
    ///
    /// # Returns
    ///
    /// * `VisibilityState` - The stored mode, or `Full` when the key is
    ///   missing, unreadable, or holds a value outside the known set.
    pub fn get_state(&self) -> VisibilityState {
        read_mode(&self.store)
    }

    /// Persist a new mode and notify the recovery handle.
    ///
    /// Storage failures are logged and otherwise ignored: the mode still
    /// applies for the rest of the process.
    ///
    /// # Arguments
    ///
    /// * `mode` - The mode to switch to.
    ///
    /// # Returns
    ///
    /// * `VisibilityState` - The mode now in effect.
    pub fn set_state(&self, mode: VisibilityState) -> VisibilityState {
        if let Err(e) = self.store.set(MODE_KEY, mode.as_str()) {
            tracing::warn!("failed to persist HUD mode {}: {}", mode, e);
        }
        self.apply(mode)
    }

    /// Lenient variant of [`HudState::set_state`] for raw input such as a
    /// button's `data-mode` attribute. Unknown values select `Full`.
    pub fn set_state_str(&self, mode: &str) -> VisibilityState {
        self.set_state(VisibilityState::parse_or_default(mode))
    }

    /// Forget the stored mode and go back to `Full`.
    pub fn reset(&self) -> VisibilityState {
        if let Err(e) = self.store.remove(MODE_KEY) {
            tracing::warn!("failed to clear HUD mode: {}", e);
        }
        self.apply(VisibilityState::Full)
    }

    /// Re-read the stored mode and apply it.
    pub fn read(&self) -> VisibilityState {
        self.apply(self.get_state())
    }

    /// The mode currently applied in this process.
    pub fn current(&self) -> VisibilityState {
        *self.handle.borrow()
    }

    pub fn subscribe(&self) -> RecoveryHandle {
        RecoveryHandle {
            receiver: self.handle.subscribe(),
        }
    }

    fn apply(&self, mode: VisibilityState) -> VisibilityState {
        let previous = self.handle.send_replace(mode);
        if previous != mode {
            tracing::info!("HUD mode changed from {} to {}", previous, mode);
        }
        mode
    }
}

fn read_mode<S: KeyValueStore>(store: &S) -> VisibilityState {
    match store.get(MODE_KEY) {
        Ok(Some(value)) => VisibilityState::parse_or_default(&value),
        Ok(None) => VisibilityState::Full,
        Err(e) => {
            tracing::warn!("failed to read HUD mode: {}", e);
            VisibilityState::Full
        }
    }
}
