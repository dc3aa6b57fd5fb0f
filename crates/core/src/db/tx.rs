use super::committed_state::CommittedState;
use super::{Rid, Store};
use crate::error::{RecordError, Result, TxError};
use crate::map::{IntMap, IntSet};
use crate::query::{matching_rids, Expr, Query};
use facetdb_value::{Record, Value};
use parking_lot::{Mutex, MutexGuard};

/// The modifications buffered by an open transaction.
///
/// A record whose cumulative effect is an insert or an update sits in
/// `pending` as its full merged state; a previously committed record whose
/// cumulative effect is a delete sits in `tombstones`. Because several
/// operations may touch the same record, membership reflects the *net*
/// effect: deleting a record created earlier in the same transaction simply
/// removes it from `pending` again. A rid is never in both tables.
#[derive(Default)]
pub(crate) struct TxState {
    open: bool,
    pub(crate) pending: IntMap<Rid, Record>,
    pub(crate) tombstones: IntSet<Rid>,
}

/// A write-buffering session over a [`Store`].
///
/// Reads observe the overlay first and fall back to the committed base
/// state. Opening, overlay writes, and rollback never lock the base store;
/// [`commit`](Transaction::commit) takes the store's write lock for exactly
/// the duration of applying the overlay, so other readers see the whole
/// transaction or none of it.
///
/// Isolation is read-committed: reads may observe other transactions'
/// commits made after this one opened, and overlapping writers resolve as
/// last-committer-wins. After `commit` or `rollback`, every operation fails
/// with [`TxError::Closed`]. Dropping an open transaction rolls it back.
pub struct Transaction {
    store: Store,
    state: Mutex<TxState>,
}

impl Transaction {
    pub(crate) fn open(store: Store) -> Self {
        Self {
            store,
            state: Mutex::new(TxState {
                open: true,
                ..TxState::default()
            }),
        }
    }

    pub(crate) fn store_handle(&self) -> &Store {
        &self.store
    }

    /// The overlay, or `TxError::Closed` after commit/rollback.
    pub(crate) fn lock_open(&self) -> Result<MutexGuard<'_, TxState>> {
        let state = self.state.lock();
        if !state.open {
            return Err(TxError::Closed.into());
        }
        Ok(state)
    }

    /// Buffer a record insert. Rid selection follows [`Store::create`];
    /// fresh rids come from the store's lock-free counter.
    pub fn create(&self, record: Record) -> Result<Rid> {
        let mut overlay = self.lock_open()?;
        let base = self.store.inner.committed_state.read();
        create_in(&mut overlay, &base, &self.store, record)
    }

    /// Buffer several inserts; on failure the records this call already
    /// buffered are un-buffered before the error surfaces.
    pub fn create_many(&self, records: impl IntoIterator<Item = Record>) -> Result<Vec<Rid>> {
        let mut overlay = self.lock_open()?;
        let base = self.store.inner.committed_state.read();
        let mut created = Vec::new();
        for record in records {
            match create_in(&mut overlay, &base, &self.store, record) {
                Ok(rid) => created.push(rid),
                Err(err) => {
                    for rid in created {
                        overlay.pending.remove(&rid);
                        // Buffering an explicit id over a base record can
                        // only have succeeded by clearing its tombstone;
                        // put the tombstone back.
                        if base.contains(rid) {
                            overlay.tombstones.insert(rid);
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(created)
    }

    /// The record state this transaction observes for `rid`: overlay
    /// first, base second.
    pub fn get(&self, rid: Rid) -> Result<Record> {
        let overlay = self.lock_open()?;
        if overlay.tombstones.contains(&rid) {
            return Err(RecordError::NotFound(rid).into());
        }
        if let Some(record) = overlay.pending.get(&rid) {
            return Ok(record.clone());
        }
        drop(overlay);
        self.store.read_record(rid)
    }

    /// Buffer an attribute patch for `rid`.
    pub fn update(&self, rid: Rid, patch: Record) -> Result<()> {
        let mut overlay = self.lock_open()?;
        let base = self.store.inner.committed_state.read();
        update_in(&mut overlay, &base, rid, patch)
    }

    /// Buffer removal of the given attributes from `rid`.
    pub fn delete_attrs<K: AsRef<str>>(
        &self,
        rid: Rid,
        keys: impl IntoIterator<Item = K>,
    ) -> Result<()> {
        let mut overlay = self.lock_open()?;
        let base = self.store.inner.committed_state.read();
        let merged = merged_mut(&mut overlay, &base, rid)?;
        for key in keys {
            merged.shift_remove(key.as_ref());
        }
        Ok(())
    }

    /// Buffer deletion of `rid`.
    pub fn delete(&self, rid: Rid) -> Result<()> {
        let mut overlay = self.lock_open()?;
        let base = self.store.inner.committed_state.read();
        delete_in(&mut overlay, &base, rid)
    }

    /// Begin building a query over this transaction's visible state.
    pub fn select(&self) -> Query<'_> {
        Query::of_tx(self)
    }

    /// Atomically apply the overlay to the store under its write lock,
    /// then close the transaction.
    pub fn commit(&self) -> Result<()> {
        let mut overlay = self.lock_open()?;
        overlay.open = false;
        let pending = std::mem::take(&mut overlay.pending);
        let tombstones = std::mem::take(&mut overlay.tombstones);
        drop(overlay);

        let mut state = self.store.inner.committed_state.write();
        for &rid in &tombstones {
            // A record another transaction already deleted is simply gone.
            state.remove_record(rid);
        }
        for (rid, record) in &pending {
            // Upserts: last committer wins, whole record at a time.
            if state.contains(*rid) {
                state.replace_record(*rid, record.clone());
            } else {
                state.insert_record(*rid, record.clone());
            }
        }
        drop(state);

        for &rid in &tombstones {
            self.store.evict_view(rid);
        }
        log::trace!(
            "committed transaction: {} upserts, {} deletes",
            pending.len(),
            tombstones.len()
        );
        Ok(())
    }

    /// Discard the overlay and close the transaction. The base store was
    /// never touched.
    pub fn rollback(&self) -> Result<()> {
        let mut overlay = self.lock_open()?;
        overlay.open = false;
        overlay.pending.clear();
        overlay.tombstones.clear();
        log::trace!("rolled back transaction");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    // ---- mutative query support ---------------------------------------

    pub(crate) fn delete_matching(&self, filter: &Expr) -> Result<usize> {
        let mut overlay = self.lock_open()?;
        let base = self.store.inner.committed_state.read();
        let rids = matching_rids(filter, &base, Some(&*overlay));
        for &rid in &rids {
            delete_in(&mut overlay, &base, rid)?;
        }
        Ok(rids.len())
    }

    pub(crate) fn update_matching(&self, filter: &Expr, patch: Record) -> Result<usize> {
        let mut overlay = self.lock_open()?;
        let base = self.store.inner.committed_state.read();
        let rids = matching_rids(filter, &base, Some(&*overlay));
        for &rid in &rids {
            update_in(&mut overlay, &base, rid, patch.clone())?;
        }
        Ok(rids.len())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.open {
            state.open = false;
            log::trace!("rolled back transaction on drop");
        }
    }
}

fn create_in(
    overlay: &mut TxState,
    base: &CommittedState,
    store: &Store,
    mut record: Record,
) -> Result<Rid> {
    let rid = match record.get("id").and_then(Value::as_int) {
        Some(id) => {
            let rid = Rid(id);
            if overlay.pending.contains_key(&rid) {
                return Err(RecordError::Duplicate(rid).into());
            }
            if base.contains(rid) && !overlay.tombstones.contains(&rid) {
                return Err(RecordError::Duplicate(rid).into());
            }
            // Deleting then recreating nets out to a replace at commit.
            overlay.tombstones.remove(&rid);
            store.reserve_rid(id);
            rid
        }
        None => store.mint_rid(),
    };
    if !record.contains_key("id") {
        record.insert("id".to_owned(), Value::Int(rid.0));
    }
    overlay.pending.insert(rid, record);
    Ok(rid)
}

fn update_in(overlay: &mut TxState, base: &CommittedState, rid: Rid, patch: Record) -> Result<()> {
    let merged = merged_mut(overlay, base, rid)?;
    for (key, value) in patch {
        merged.insert(key, value);
    }
    Ok(())
}

fn delete_in(overlay: &mut TxState, base: &CommittedState, rid: Rid) -> Result<()> {
    if overlay.tombstones.contains(&rid) {
        return Err(RecordError::NotFound(rid).into());
    }
    let was_pending = overlay.pending.remove(&rid).is_some();
    if base.contains(rid) {
        overlay.tombstones.insert(rid);
        Ok(())
    } else if was_pending {
        // Created in this transaction; the net effect is nothing.
        Ok(())
    } else {
        Err(RecordError::NotFound(rid).into())
    }
}

/// The overlay's mutable merged record for `rid`, copied up from the base
/// state on first touch.
fn merged_mut<'o>(
    overlay: &'o mut TxState,
    base: &CommittedState,
    rid: Rid,
) -> Result<&'o mut Record> {
    if overlay.tombstones.contains(&rid) {
        return Err(RecordError::NotFound(rid).into());
    }
    if !overlay.pending.contains_key(&rid) {
        let Some(record) = base.get(rid) else {
            return Err(RecordError::NotFound(rid).into());
        };
        overlay.pending.insert(rid, record.clone());
    }
    Ok(overlay.pending.get_mut(&rid).expect("just inserted"))
}
