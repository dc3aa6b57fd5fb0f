use super::{Rid, Store};
use crate::error::Result;
use facetdb_value::{Record, Value};
use std::sync::Arc;

/// The interior of a [`RecordView`], shared by every handle to the same
/// rid. Dropping the last handle ejects the store's identity-map entry.
pub(crate) struct ViewShared {
    store: Store,
    rid: Rid,
}

impl ViewShared {
    pub(crate) fn new(store: Store, rid: Rid) -> Self {
        Self { store, rid }
    }
}

impl Drop for ViewShared {
    fn drop(&mut self) {
        self.store.evict_view_if_dead(self.rid);
    }
}

/// A live view of one record.
///
/// Every read consults the store's current state and every write routes
/// through the store's update path, so the relevant indexes stay in step
/// with the record. Views preserve identity: while any handle for a rid is
/// held, `Store::get` returns the same handle (see
/// [`same_view`](RecordView::same_view)).
///
/// After the record is deleted, every operation fails with `NotFound`.
#[derive(Clone)]
pub struct RecordView {
    shared: Arc<ViewShared>,
}

impl RecordView {
    pub(crate) fn from_shared(shared: Arc<ViewShared>) -> Self {
        Self { shared }
    }

    pub fn rid(&self) -> Rid {
        self.shared.rid
    }

    fn store(&self) -> &Store {
        &self.shared.store
    }

    /// The current value of `key`. Fails with `KeyMissing` when absent.
    pub fn get(&self, key: &str) -> Result<Value> {
        self.store().read_value(self.rid(), key)
    }

    pub fn contains_key(&self, key: &str) -> Result<bool> {
        Ok(self.snapshot()?.contains_key(key))
    }

    /// Write one attribute, reindexing it.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let mut patch = Record::new();
        patch.insert(key.into(), value.into());
        self.store().update(self.rid(), patch)
    }

    /// Remove one attribute and its index entry. Removing an attribute
    /// the record does not carry is a no-op.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.store().delete_attrs(self.rid(), [key])
    }

    /// Write every entry of `patch`, reindexing exactly those keys.
    pub fn update(&self, patch: Record) -> Result<()> {
        self.store().update(self.rid(), patch)
    }

    /// The current value of `key`, or `default` after writing it there.
    pub fn set_default(&self, key: &str, default: impl Into<Value>) -> Result<Value> {
        self.store().set_default(self.rid(), key, default.into())
    }

    /// Destroy the underlying record; this and every other handle to the
    /// rid turn invalid.
    pub fn delete(&self) -> Result<()> {
        self.store().delete(self.rid())
    }

    /// Attribute names in insertion order.
    pub fn keys(&self) -> Result<Vec<String>> {
        self.store().read_keys(self.rid())
    }

    /// The record's current attributes as an owned map.
    pub fn snapshot(&self) -> Result<Record> {
        self.store().read_record(self.rid())
    }

    /// Whether two handles are the same live view.
    pub fn same_view(&self, other: &RecordView) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl std::fmt::Debug for RecordView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordView").field("rid", &self.rid()).finish()
    }
}
