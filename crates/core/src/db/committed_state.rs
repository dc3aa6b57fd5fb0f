use super::index::AttrIndex;
use super::Rid;
use crate::map::{IntMap, IntSet};
use facetdb_value::{Record, Value};
use std::collections::HashMap;

/// The state of the store up to the last committed change: the record table
/// plus one ordered index per attribute name in use.
///
/// Index consistency is maintained here and only here. For every attribute
/// `a` appearing on any live record, `indexes[a]` holds exactly the
/// `(value, rid)` pairs of the records that carry `a`; an attribute that no
/// record carries any longer has no index at all.
#[derive(Default)]
pub(crate) struct CommittedState {
    records: IntMap<Rid, Record>,
    indexes: HashMap<String, AttrIndex>,
}

impl CommittedState {
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn contains(&self, rid: Rid) -> bool {
        self.records.contains_key(&rid)
    }

    pub(crate) fn get(&self, rid: Rid) -> Option<&Record> {
        self.records.get(&rid)
    }

    pub(crate) fn rids(&self) -> impl Iterator<Item = Rid> + '_ {
        self.records.keys().copied()
    }

    /// Insert a record that is not yet present and index every attribute.
    pub(crate) fn insert_record(&mut self, rid: Rid, record: Record) {
        debug_assert!(!self.records.contains_key(&rid));
        for (attr, value) in &record {
            self.index_insert(attr, value, rid);
        }
        self.records.insert(rid, record);
    }

    /// Remove a record and every index entry it contributed.
    pub(crate) fn remove_record(&mut self, rid: Rid) -> Option<Record> {
        let record = self.records.remove(&rid)?;
        for (attr, value) in &record {
            self.index_remove(attr, value, rid);
        }
        Some(record)
    }

    /// Overwrite the attributes named by `patch` and reindex exactly those.
    ///
    /// Returns `false` when `rid` is not present.
    pub(crate) fn update_attrs(&mut self, rid: Rid, patch: Record) -> bool {
        let Some(record) = self.records.get_mut(&rid) else {
            return false;
        };
        for (attr, value) in patch {
            let old = record.insert(attr.clone(), value.clone());
            if let Some(old) = old {
                index_remove_in(&mut self.indexes, &attr, &old, rid);
            }
            index_insert_in(&mut self.indexes, &attr, &value, rid);
        }
        true
    }

    /// Drop the attributes named by `keys` from the record and its indexes.
    /// Absent keys are skipped.
    pub(crate) fn remove_attrs<'k>(&mut self, rid: Rid, keys: impl IntoIterator<Item = &'k str>) -> bool {
        let Some(record) = self.records.get_mut(&rid) else {
            return false;
        };
        for key in keys {
            if let Some(old) = record.shift_remove(key) {
                index_remove_in(&mut self.indexes, key, &old, rid);
            }
        }
        true
    }

    /// Replace the whole stored record, reindexing every attribute whose
    /// value actually changes.
    pub(crate) fn replace_record(&mut self, rid: Rid, record: Record) {
        self.remove_record(rid);
        self.insert_record(rid, record);
    }

    fn index_insert(&mut self, attr: &str, value: &Value, rid: Rid) {
        index_insert_in(&mut self.indexes, attr, value, rid);
    }

    fn index_remove(&mut self, attr: &str, value: &Value, rid: Rid) {
        index_remove_in(&mut self.indexes, attr, value, rid);
    }

    /// The index for `attr`, when any live record carries that attribute.
    /// A missing index means no record carries the attribute.
    pub(crate) fn index(&self, attr: &str) -> Option<&AttrIndex> {
        self.indexes.get(attr)
    }

    /// The union of index buckets for each value in `values`.
    pub(crate) fn index_membership<'v>(
        &self,
        attr: &str,
        values: impl IntoIterator<Item = &'v Value>,
    ) -> IntSet<Rid> {
        let mut out = IntSet::default();
        if let Some(ix) = self.index(attr) {
            for value in values {
                out.extend(ix.point(value));
            }
        }
        out
    }
}

fn index_insert_in(indexes: &mut HashMap<String, AttrIndex>, attr: &str, value: &Value, rid: Rid) {
    indexes
        .entry(attr.to_owned())
        .or_insert_with(AttrIndex::new)
        .insert(value, rid);
}

fn index_remove_in(indexes: &mut HashMap<String, AttrIndex>, attr: &str, value: &Value, rid: Rid) {
    if let Some(ix) = indexes.get_mut(attr) {
        debug_assert!(ix.contains(value, rid));
        ix.remove(value, rid);
        if ix.is_empty() {
            indexes.remove(attr);
        }
    }
}
