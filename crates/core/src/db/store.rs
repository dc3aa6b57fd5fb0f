use super::committed_state::CommittedState;
use super::view::{RecordView, ViewShared};
use super::{Rid, Transaction};
use crate::error::{RecordError, Result};
use crate::map::IntMap;
use crate::query::{matching_rids, Expr, Query};
use facetdb_value::{Record, Value};
use indexmap::IndexMap;
use itertools::Itertools;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

/// The shared interior of a [`Store`]. Each piece of state carries its own
/// lock; to avoid deadlocks the locks are always acquired in a consistent
/// order throughout the crate.
///
/// Lock acquisition order:
/// 1. a transaction's overlay (when one is involved)
/// 2. `committed_state`
/// 3. `identity_map`
pub(crate) struct StoreInner {
    /// The state of the store up to the last committed change.
    pub(crate) committed_state: RwLock<CommittedState>,
    /// One weak live-view handle per rid, so repeated `get`s observe the
    /// same object for as long as any caller holds it.
    pub(crate) identity_map: Mutex<IntMap<Rid, Weak<ViewShared>>>,
    /// Source of fresh rids. Lock-free so transactions can mint rids
    /// without touching the base store.
    next_rid: AtomicI64,
}

/// An in-memory, schemaless record store.
///
/// Cloning is cheap and shares the underlying state. Direct reads take the
/// read side of the store lock, direct writes the write side; transactions
/// buffer writes and take the write side only while committing.
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                committed_state: RwLock::default(),
                identity_map: Mutex::default(),
                next_rid: AtomicI64::new(1),
            }),
        }
    }

    /// Insert a record and return its rid.
    ///
    /// An integer `id` attribute selects the rid; otherwise a fresh
    /// monotonic rid is assigned and materialized as the record's `id`.
    /// Fails with [`RecordError::Duplicate`] when the chosen rid is taken.
    pub fn create(&self, record: Record) -> Result<Rid> {
        let mut state = self.inner.committed_state.write();
        self.create_locked(&mut state, record)
    }

    /// Insert several records atomically: if any insert fails, those
    /// already inserted by this call are removed before the error
    /// surfaces.
    pub fn create_many(&self, records: impl IntoIterator<Item = Record>) -> Result<Vec<Rid>> {
        let mut state = self.inner.committed_state.write();
        let mut created = Vec::new();
        for record in records {
            match self.create_locked(&mut state, record) {
                Ok(rid) => created.push(rid),
                Err(err) => {
                    log::trace!("create_many failed, undoing {} prior inserts", created.len());
                    for rid in created {
                        state.remove_record(rid);
                    }
                    return Err(err);
                }
            }
        }
        Ok(created)
    }

    fn create_locked(&self, state: &mut CommittedState, mut record: Record) -> Result<Rid> {
        let rid = match record.get("id").and_then(Value::as_int) {
            Some(id) => {
                let rid = Rid(id);
                if state.contains(rid) {
                    return Err(RecordError::Duplicate(rid).into());
                }
                self.reserve_rid(id);
                rid
            }
            None => self.mint_rid(),
        };
        if !record.contains_key("id") {
            record.insert("id".to_owned(), Value::Int(rid.0));
        }
        state.insert_record(rid, record);
        Ok(rid)
    }

    pub(crate) fn mint_rid(&self) -> Rid {
        Rid(self.inner.next_rid.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Keep generated rids ahead of a caller-chosen one.
    pub(crate) fn reserve_rid(&self, id: i64) {
        self.inner
            .next_rid
            .fetch_max(id.saturating_add(1), AtomicOrdering::Relaxed);
    }

    /// The live view of a record. Repeated calls return the same handle
    /// for as long as any caller still holds it.
    pub fn get(&self, rid: Rid) -> Result<RecordView> {
        let state = self.inner.committed_state.read();
        if !state.contains(rid) {
            return Err(RecordError::NotFound(rid).into());
        }
        Ok(self.view_of(rid))
    }

    /// Live views for every rid that exists; missing rids are omitted.
    pub fn get_many(&self, rids: impl IntoIterator<Item = Rid>) -> IndexMap<Rid, RecordView> {
        let state = self.inner.committed_state.read();
        rids.into_iter()
            .filter(|&rid| state.contains(rid))
            .map(|rid| (rid, self.view_of(rid)))
            .collect()
    }

    /// Overwrite the attributes named by `patch` and reindex exactly
    /// those.
    pub fn update(&self, rid: Rid, patch: Record) -> Result<()> {
        let mut state = self.inner.committed_state.write();
        if !state.update_attrs(rid, patch) {
            return Err(RecordError::NotFound(rid).into());
        }
        Ok(())
    }

    /// Remove the given attributes from the record and its indexes.
    /// Attributes the record does not carry are skipped.
    pub fn delete_attrs<K: AsRef<str>>(
        &self,
        rid: Rid,
        keys: impl IntoIterator<Item = K>,
    ) -> Result<()> {
        let mut state = self.inner.committed_state.write();
        let keys: Vec<K> = keys.into_iter().collect();
        if !state.remove_attrs(rid, keys.iter().map(AsRef::as_ref)) {
            return Err(RecordError::NotFound(rid).into());
        }
        Ok(())
    }

    /// Destroy a record: drop it from every index and invalidate its live
    /// views.
    pub fn delete(&self, rid: Rid) -> Result<()> {
        let mut state = self.inner.committed_state.write();
        if state.remove_record(rid).is_none() {
            return Err(RecordError::NotFound(rid).into());
        }
        drop(state);
        self.evict_view(rid);
        Ok(())
    }

    /// Begin building a query over the current committed state.
    pub fn select(&self) -> Query<'static> {
        Query::of_store(self.clone())
    }

    /// Open a write-buffering transaction over this store.
    pub fn transaction(&self) -> Transaction {
        Transaction::open(self.clone())
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`
    /// before the error propagates.
    pub fn with_transaction<T>(&self, f: impl FnOnce(&Transaction) -> Result<T>) -> Result<T> {
        let tx = self.transaction();
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                let _ = tx.rollback();
                Err(err)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.committed_state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, rid: Rid) -> bool {
        self.inner.committed_state.read().contains(rid)
    }

    /// Every live rid, ascending.
    pub fn rids(&self) -> Vec<Rid> {
        let state = self.inner.committed_state.read();
        state.rids().sorted_unstable().collect()
    }

    // ---- live-view plumbing -------------------------------------------

    /// The one live view per rid: upgrade the identity-map entry or
    /// fabricate a fresh handle bound to the same rid.
    pub(crate) fn view_of(&self, rid: Rid) -> RecordView {
        let mut identity_map = self.inner.identity_map.lock();
        if let Some(shared) = identity_map.get(&rid).and_then(Weak::upgrade) {
            return RecordView::from_shared(shared);
        }
        let shared = Arc::new(ViewShared::new(self.clone(), rid));
        identity_map.insert(rid, Arc::downgrade(&shared));
        RecordView::from_shared(shared)
    }

    pub(crate) fn evict_view(&self, rid: Rid) {
        self.inner.identity_map.lock().remove(&rid);
    }

    /// Drop a dead identity-map entry, called when the last strong handle
    /// for `rid` goes away. A concurrently fabricated replacement is left
    /// alone.
    pub(crate) fn evict_view_if_dead(&self, rid: Rid) {
        let mut identity_map = self.inner.identity_map.lock();
        if let Some(weak) = identity_map.get(&rid) {
            if weak.strong_count() == 0 {
                identity_map.remove(&rid);
            }
        }
    }

    // ---- view-facing reads and writes ---------------------------------

    pub(crate) fn read_value(&self, rid: Rid, key: &str) -> Result<Value> {
        let state = self.inner.committed_state.read();
        let record = state.get(rid).ok_or(RecordError::NotFound(rid))?;
        record
            .get(key)
            .cloned()
            .ok_or_else(|| RecordError::KeyMissing(key.to_owned()).into())
    }

    pub(crate) fn read_record(&self, rid: Rid) -> Result<Record> {
        let state = self.inner.committed_state.read();
        state
            .get(rid)
            .cloned()
            .ok_or_else(|| RecordError::NotFound(rid).into())
    }

    pub(crate) fn read_keys(&self, rid: Rid) -> Result<Vec<String>> {
        let state = self.inner.committed_state.read();
        let record = state.get(rid).ok_or(RecordError::NotFound(rid))?;
        Ok(record.keys().cloned().collect())
    }

    /// Return the current value at `key`, or write `default` there and
    /// return it.
    pub(crate) fn set_default(&self, rid: Rid, key: &str, default: Value) -> Result<Value> {
        let mut state = self.inner.committed_state.write();
        let record = state.get(rid).ok_or(RecordError::NotFound(rid))?;
        if let Some(current) = record.get(key) {
            return Ok(current.clone());
        }
        let mut patch = Record::new();
        patch.insert(key.to_owned(), default.clone());
        state.update_attrs(rid, patch);
        Ok(default)
    }

    // ---- mutative query support ---------------------------------------

    pub(crate) fn delete_matching(&self, filter: &Expr) -> Result<usize> {
        let mut state = self.inner.committed_state.write();
        let rids = matching_rids(filter, &state, None);
        for &rid in &rids {
            state.remove_record(rid);
        }
        drop(state);
        for &rid in &rids {
            self.evict_view(rid);
        }
        Ok(rids.len())
    }

    pub(crate) fn update_matching(&self, filter: &Expr, patch: Record) -> Result<usize> {
        let mut state = self.inner.committed_state.write();
        let rids = matching_rids(filter, &state, None);
        for &rid in &rids {
            state.update_attrs(rid, patch.clone());
        }
        Ok(rids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facetdb_value::record;
    use pretty_assertions::assert_eq;

    #[test]
    fn create_assigns_monotonic_rids_and_materializes_id() {
        let store = Store::new();
        let a = store.create(record! { "x" => 1 }).unwrap();
        let b = store.create(record! { "x" => 2 }).unwrap();
        assert!(b > a);
        assert_eq!(
            store.get(a).unwrap().get("id").unwrap(),
            Value::Int(a.0)
        );
    }

    #[test]
    fn explicit_integer_id_selects_the_rid() {
        let store = Store::new();
        let rid = store.create(record! { "id" => 42, "x" => 1 }).unwrap();
        assert_eq!(rid, Rid(42));
        let err = store.create(record! { "id" => 42 }).unwrap_err();
        assert!(err.is_duplicate());
        // Fresh rids jump past caller-chosen ones.
        let next = store.create(record! {}).unwrap();
        assert!(next > Rid(42));
    }

    #[test]
    fn non_integer_id_is_kept_as_data_but_does_not_pick_the_rid() {
        let store = Store::new();
        let rid = store.create(record! { "id" => "alpha" }).unwrap();
        assert_eq!(
            store.get(rid).unwrap().get("id").unwrap(),
            Value::from("alpha")
        );
    }

    #[test]
    fn create_many_rolls_back_prior_inserts_on_failure() {
        let store = Store::new();
        store.create(record! { "id" => 7 }).unwrap();
        let err = store
            .create_many(vec![
                record! { "id" => 1 },
                record! { "id" => 2 },
                record! { "id" => 7 },
            ])
            .unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(store.len(), 1);
        assert!(!store.contains(Rid(1)));
        assert!(!store.contains(Rid(2)));
    }

    #[test]
    fn get_many_omits_missing_rids() {
        let store = Store::new();
        let rid = store.create(record! { "x" => 1 }).unwrap();
        let views = store.get_many([rid, Rid(999)]);
        assert_eq!(views.len(), 1);
        assert!(views.contains_key(&rid));
    }

    #[test]
    fn identity_map_returns_the_same_handle_while_held() {
        let store = Store::new();
        let rid = store.create(record! { "x" => 1 }).unwrap();
        let a = store.get(rid).unwrap();
        let b = store.get(rid).unwrap();
        assert!(a.same_view(&b));
        drop(a);
        drop(b);
        // The last handle dropped; a later get fabricates a fresh one
        // bound to the same rid.
        let c = store.get(rid).unwrap();
        assert_eq!(c.rid(), rid);
    }

    #[test]
    fn delete_invalidates_live_views() {
        let store = Store::new();
        let rid = store.create(record! { "x" => 1 }).unwrap();
        let view = store.get(rid).unwrap();
        store.delete(rid).unwrap();
        assert!(view.get("x").unwrap_err().is_not_found());
        assert!(store.get(rid).unwrap_err().is_not_found());
        assert!(store.delete(rid).unwrap_err().is_not_found());
    }
}
