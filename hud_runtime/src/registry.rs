use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::context::TaskScope;
use crate::{
    Page, RenderTarget, SharedContext, Slot, WidgetContext, WidgetModule,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unmounted,
    Mounted,
    Running,
    Stopped,
}

impl LifecycleState {
    /// Mounted and Running instances own their slot.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Mounted | Self::Running)
    }
}

pub struct WidgetDescriptor {
    pub id: String,
    pub module: Box<dyn WidgetModule>,
}

impl WidgetDescriptor {
    pub fn new(
        id: impl Into<String>,
        module: impl WidgetModule + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            module: Box::new(module),
        }
    }
}

impl std::fmt::Debug for WidgetDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetDescriptor")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

struct WidgetInstance {
    id: String,
    slot: Slot,
    state: LifecycleState,
    module: Box<dyn WidgetModule>,
    lease: CancellationToken,
    scope: Option<TaskScope>,
}

impl WidgetInstance {
    fn new(id: &str, slot: Slot, module: Box<dyn WidgetModule>) -> Self {
        Self {
            id: id.to_string(),
            slot,
            state: LifecycleState::Unmounted,
            module,
            lease: CancellationToken::new(),
            scope: None,
        }
    }

    fn mount(&mut self) -> bool {
        let target = RenderTarget::new(self.slot.clone(), self.lease.clone());
        let module = &mut self.module;

        match catch_unwind(AssertUnwindSafe(|| module.mount(target))) {
            Ok(()) => {
                self.state = LifecycleState::Mounted;
                true
            }
            Err(panic) => {
                tracing::error!(
                    widget = %self.id,
                    panic = %panic_message(&*panic),
                    "widget panicked while mounting"
                );
                self.release();
                false
            }
        }
    }

    fn start(&mut self, shared: &Arc<SharedContext>) -> bool {
        let scope = TaskScope::new(&self.id);
        let ctx = WidgetContext::new(Arc::clone(shared), scope.clone());
        self.scope = Some(scope.clone());
        let module = &mut self.module;

        match catch_unwind(AssertUnwindSafe(|| module.start(ctx))) {
            Ok(Ok(())) => {
                self.state = LifecycleState::Running;
                tracing::info!(widget = %self.id, "widget started");
                true
            }
            Ok(Err(e)) => {
                tracing::error!(
                    widget = %self.id,
                    error = %e,
                    "widget failed to start"
                );
                scope.cancel();
                self.slot.revoke(&self.lease);
                false
            }
            Err(panic) => {
                tracing::error!(
                    widget = %self.id,
                    panic = %panic_message(&*panic),
                    "widget panicked while starting"
                );
                scope.cancel();
                self.slot.revoke(&self.lease);
                false
            }
        }
    }

    /// Stop a live instance. Returns `false` if there was nothing to stop.
    fn stop(&mut self) -> bool {
        if !self.state.is_live() {
            return false;
        }

        let module = &mut self.module;
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| module.stop())) {
            tracing::error!(
                widget = %self.id,
                panic = %panic_message(&*panic),
                "widget panicked while stopping"
            );
        }

        self.release();
        tracing::info!(widget = %self.id, "widget stopped");
        true
    }

    fn release(&mut self) {
        if let Some(scope) = &self.scope {
            scope.cancel();
        }
        self.slot.revoke(&self.lease);
        self.state = LifecycleState::Stopped;
    }

    fn active_timers(&self) -> usize {
        self.scope.as_ref().map_or(0, TaskScope::active_timers)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Outcome of one [`Registry::start`] pass, by widget id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartSummary {
    pub started: Vec<String>,
    pub failed: Vec<String>,
    pub already_live: Vec<String>,
    pub unregistered: Vec<String>,
}

/// Widget id → module table plus the live instances.
///
/// Registering hands the module to the registry. The next [`start`] that
/// finds a slot for the id claims the module into an instance; a later
/// registration for the same id replaces whatever is waiting to be
/// claimed and is picked up the next time the instance is (re)started.
///
/// [`start`]: Registry::start
pub struct Registry {
    shared: Arc<SharedContext>,
    descriptors: HashMap<String, WidgetDescriptor>,
    instances: BTreeMap<String, WidgetInstance>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("shared", &self.shared)
            .field("pending", &self.descriptors.keys().collect::<Vec<_>>())
            .field("instances", &self.instances.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    #[must_use]
    pub fn new(shared: SharedContext) -> Self {
        Self {
            shared: Arc::new(shared),
            descriptors: HashMap::new(),
            instances: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn shared(&self) -> &Arc<SharedContext> {
        &self.shared
    }

    /// Store `module` under `id`, replacing any earlier registration.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        module: impl WidgetModule + 'static,
    ) {
        self.register_descriptor(WidgetDescriptor::new(id, module));
    }

    pub fn register_descriptor(&mut self, descriptor: WidgetDescriptor) {
        tracing::debug!(widget = %descriptor.id, "widget registered");
        self.descriptors.insert(descriptor.id.clone(), descriptor);
    }

    #[must_use]
    pub fn is_registered(&self, id: &str) -> bool {
        self.descriptors.contains_key(id) || self.instances.contains_key(id)
    }

    /// Mount and start every registered widget that has a slot on `page`
    /// and no live instance. Calling it again is a no-op for widgets that
    /// are already live.
    pub fn start(&mut self, page: &Page) -> StartSummary {
        let mut summary = StartSummary::default();

        for slot in page.slots() {
            let id = slot.id();

            let mut previous_module = None;
            if let Some(mut existing) = self.instances.remove(id) {
                if existing.state.is_live() {
                    if existing.slot.same_as(slot) {
                        self.instances.insert(id.to_string(), existing);
                        summary.already_live.push(id.to_string());
                        continue;
                    }
                    tracing::info!(widget = id, "slot replaced, remounting");
                    existing.stop();
                }
                previous_module = Some(existing.module);
            }

            let Some(module) = self
                .descriptors
                .remove(id)
                .map(|descriptor| descriptor.module)
                .or(previous_module)
            else {
                tracing::trace!(widget = id, "no module registered for slot");
                summary.unregistered.push(id.to_string());
                continue;
            };

            let mut instance = WidgetInstance::new(id, slot.clone(), module);
            if instance.mount() && instance.start(&self.shared) {
                summary.started.push(id.to_string());
            } else {
                summary.failed.push(id.to_string());
            }
            self.instances.insert(id.to_string(), instance);
        }

        if !summary.started.is_empty() || !summary.failed.is_empty() {
            tracing::info!(
                started = summary.started.len(),
                failed = summary.failed.len(),
                already_live = summary.already_live.len(),
                "widget start pass complete"
            );
        }

        summary
    }

    /// Stop one widget, or all of them when `id` is `None`. Stopping an
    /// unknown or already stopped widget does nothing. Returns how many
    /// instances were stopped.
    pub fn stop(&mut self, id: Option<&str>) -> usize {
        match id {
            Some(id) => self
                .instances
                .get_mut(id)
                .map_or(0, |instance| usize::from(instance.stop())),
            None => self
                .instances
                .values_mut()
                .map(|instance| usize::from(instance.stop()))
                .sum(),
        }
    }

    /// Drop instances whose slot is no longer part of `page`.
    pub fn prune(&mut self, page: &Page) -> usize {
        let gone: Vec<String> = self
            .instances
            .iter()
            .filter(|(_, instance)| !page.contains(&instance.slot))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &gone {
            if let Some(mut instance) = self.instances.remove(id) {
                instance.stop();
                tracing::debug!(widget = %id, "instance dropped with its slot");
            }
        }

        gone.len()
    }

    #[must_use]
    pub fn state(&self, id: &str) -> Option<LifecycleState> {
        self.instances.get(id).map(|instance| instance.state)
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.instances
            .values()
            .filter(|instance| instance.state.is_live())
            .count()
    }

    /// Number of timers of `id` that have not yet shut down.
    #[must_use]
    pub fn active_timers(&self, id: &str) -> usize {
        self.instances
            .get(id)
            .map_or(0, WidgetInstance::active_timers)
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.stop(None);
    }
}
