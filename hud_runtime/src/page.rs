use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

type Fields = BTreeMap<String, String>;

fn lock(fields: &Mutex<Fields>) -> MutexGuard<'_, Fields> {
    fields.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A widget mount point: the element carrying `data-widget="<id>"` in the
/// page fragment. What a widget renders is kept as named text fields.
#[derive(Debug, Clone)]
pub struct Slot {
    id: Arc<str>,
    fields: Arc<Mutex<Fields>>,
}

impl Slot {
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            id: Arc::from(id),
            fields: Arc::default(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn text(&self, field: &str) -> Option<String> {
        lock(&self.fields).get(field).cloned()
    }

    /// Snapshot of every rendered field.
    #[must_use]
    pub fn fields(&self) -> Fields {
        lock(&self.fields).clone()
    }

    /// Empty the slot. Used by the page owner, never by widgets.
    pub fn clear(&self) {
        lock(&self.fields).clear();
    }

    /// Whether both handles refer to the same element.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.fields, &other.fields)
    }

    fn write_leased<'a>(
        &self,
        lease: &CancellationToken,
        values: impl IntoIterator<Item = (&'a str, String)>,
    ) -> bool {
        let mut fields = lock(&self.fields);
        if lease.is_cancelled() {
            return false;
        }
        for (field, value) in values {
            fields.insert(field.to_string(), value);
        }
        true
    }

    /// Revoke `lease` while holding the slot lock, so no write through it
    /// can land after this returns.
    pub(crate) fn revoke(&self, lease: &CancellationToken) {
        let _fields = lock(&self.fields);
        lease.cancel();
    }
}

/// The widget's handle on its slot.
///
/// Writes succeed only while the owning instance holds the lease; once the
/// instance is stopped every write is silently discarded, which is what
/// keeps a late response from repainting a stopped widget.
#[derive(Debug, Clone)]
pub struct RenderTarget {
    slot: Slot,
    lease: CancellationToken,
}

impl RenderTarget {
    pub(crate) const fn new(slot: Slot, lease: CancellationToken) -> Self {
        Self { slot, lease }
    }

    #[must_use]
    pub fn widget_id(&self) -> &str {
        self.slot.id()
    }

    /// Write one field. Returns `false` if the write was discarded.
    pub fn set(&self, field: &str, value: impl Into<String>) -> bool {
        self.set_many([(field, value.into())])
    }

    /// Write several fields at once; either all land or none do.
    pub fn set_many<'a>(
        &self,
        values: impl IntoIterator<Item = (&'a str, String)>,
    ) -> bool {
        let written = self.slot.write_leased(&self.lease, values);
        if !written {
            tracing::trace!(
                widget = self.widget_id(),
                "discarding write to a released slot"
            );
        }
        written
    }

    #[must_use]
    pub fn text(&self, field: &str) -> Option<String> {
        self.slot.text(field)
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.lease.is_cancelled()
    }
}

/// The document: slots in page order, ids unique.
#[derive(Debug, Clone, Default)]
pub struct Page {
    slots: Vec<Slot>,
}

impl Page {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a page from slot ids. Repeated ids keep their first position.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut page = Self::new();
        for id in ids {
            page.insert(id.as_ref());
        }
        page
    }

    /// Add a slot, or return the existing one with the same id.
    pub fn insert(&mut self, id: &str) -> Slot {
        if let Some(slot) = self.slot(id) {
            return slot.clone();
        }
        let slot = Slot::new(id);
        self.slots.push(slot.clone());
        slot
    }

    pub fn remove(&mut self, id: &str) -> Option<Slot> {
        let index = self.slots.iter().position(|slot| slot.id() == id)?;
        Some(self.slots.remove(index))
    }

    /// Replace the set of slots with `ids`, in that order. Slots whose id
    /// survives keep their identity, so running widgets stay attached.
    pub fn replace_slots<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut previous = std::mem::take(&mut self.slots);
        for id in ids {
            let id = id.as_ref();
            if self.slot(id).is_some() {
                continue;
            }
            let slot = previous
                .iter()
                .position(|slot| slot.id() == id)
                .map_or_else(|| Slot::new(id), |i| previous.swap_remove(i));
            self.slots.push(slot);
        }
    }

    #[must_use]
    pub fn slot(&self, id: &str) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.id() == id)
    }

    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.slots.iter().map(Slot::id).collect()
    }

    #[must_use]
    pub fn contains(&self, slot: &Slot) -> bool {
        self.slots.iter().any(|s| s.same_as(slot))
    }

    /// A view holding only the slots `keep` accepts. The view shares the
    /// slots themselves, so widgets mounted through it render into this
    /// page.
    #[must_use]
    pub fn filtered(&self, keep: impl Fn(&Slot) -> bool) -> Self {
        Self {
            slots: self.slots.iter().filter(|s| keep(s)).cloned().collect(),
        }
    }

    pub fn clear_all(&self) {
        for slot in &self.slots {
            slot.clear();
        }
    }
}
