//! Widget registry and lifecycle runtime.
//!
//! A [`Registry`] owns the id → module table. [`Registry::start`] walks the
//! slots of a [`Page`], mounts every registered module against its slot and
//! starts it with a [`WidgetContext`]; the context hands out the shared
//! fetch layer and schedules the instance's periodic tasks. Stopping an
//! instance cancels its tasks and revokes its write access to the slot.
mod context;
mod module;
mod page;
mod registry;

#[cfg(test)]
mod testing;

pub use context::{SharedContext, WidgetContext};
pub use module::{WidgetError, WidgetModule};
pub use page::{Page, RenderTarget, Slot};
pub use registry::{LifecycleState, Registry, StartSummary, WidgetDescriptor};
