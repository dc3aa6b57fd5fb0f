//! Predicate AST, query builder, and execution.
//!
//! A [`Query`] binds a predicate to a [`Store`] or a [`Transaction`].
//! Execution compiles the predicate into index operations ([`plan`]),
//! re-evaluates it per candidate ([`eval`]), then sorts, paginates, and
//! projects.

pub(crate) mod eval;
pub(crate) mod plan;
mod symbol;

pub use symbol::attr;

use crate::db::committed_state::CommittedState;
use crate::db::tx::TxState;
use crate::db::{RecordView, Rid, Store, Transaction};
use crate::error::{QueryError, Result};
use crate::map::IntSet;
use facetdb_value::{Record, Value};
use indexmap::IndexMap;
use itertools::Itertools;
use smallvec::{smallvec, SmallVec};
use std::cmp::Ordering;
use std::fmt;

/// A chain of attribute names applied from the record root.
///
/// Only single-segment paths are answerable from an index; deeper paths are
/// evaluated in the residual pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FieldPath(SmallVec<[String; 2]>);

impl FieldPath {
    pub fn new(root: impl Into<String>) -> Self {
        Self(smallvec![root.into()])
    }

    pub(crate) fn push(&mut self, segment: String) {
        self.0.push(segment);
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The attribute name when the path is exactly one segment deep.
    pub(crate) fn single(&self) -> Option<&str> {
        match self.segments() {
            [root] => Some(root),
            _ => None,
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl From<&str> for FieldPath {
    fn from(name: &str) -> Self {
        FieldPath::new(name)
    }
}

impl From<String> for FieldPath {
    fn from(name: String) -> Self {
        FieldPath::new(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    /// Whether a comparison outcome satisfies this operator.
    pub(crate) fn matches(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
        }
    }

    /// The operator satisfied exactly when `self` is not.
    pub(crate) fn negated(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Ne,
            CmpOp::Ne => CmpOp::Eq,
            CmpOp::Lt => CmpOp::Ge,
            CmpOp::Le => CmpOp::Gt,
            CmpOp::Gt => CmpOp::Le,
            CmpOp::Ge => CmpOp::Lt,
        }
    }
}

/// A boolean test over a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    True,
    False,
    Cmp {
        path: FieldPath,
        op: CmpOp,
        value: Value,
    },
    OneOf {
        path: FieldPath,
        values: Vec<Value>,
    },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn and(self, other: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(other))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One step of an ordering specification. Ties across all terms break by
/// rid, ascending.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderTerm {
    pub path: FieldPath,
    pub direction: Direction,
}

/// One query result: a live view for unprojected store-bound queries, a
/// materialized record for projections and transaction-bound queries.
#[derive(Clone, Debug)]
pub enum Row {
    View(RecordView),
    Record(Record),
}

impl Row {
    pub fn as_view(&self) -> Option<&RecordView> {
        match self {
            Row::View(view) => Some(view),
            Row::Record(_) => None,
        }
    }

    /// The row's current attributes as an owned record.
    pub fn snapshot(&self) -> Result<Record> {
        match self {
            Row::View(view) => view.snapshot(),
            Row::Record(record) => Ok(record.clone()),
        }
    }
}

enum Binding<'a> {
    Store(Store),
    Tx(&'a Transaction),
}

/// A composable query over a store or a transaction.
///
/// Builder calls chain; nothing executes until [`fetch`](Query::fetch),
/// [`fetch_list`](Query::fetch_list), [`count`](Query::count),
/// [`delete`](Query::delete) or [`update`](Query::update) runs.
pub struct Query<'a> {
    binding: Binding<'a>,
    filter: Expr,
    order: Vec<OrderTerm>,
    limit: Option<i64>,
    offset: Option<i64>,
    fields: Vec<FieldPath>,
}

impl<'a> Query<'a> {
    fn new(binding: Binding<'a>) -> Self {
        Self {
            binding,
            filter: Expr::True,
            order: Vec::new(),
            limit: None,
            offset: None,
            fields: Vec::new(),
        }
    }

    pub(crate) fn of_store(store: Store) -> Query<'static> {
        Query::new(Binding::Store(store))
    }

    pub(crate) fn of_tx(tx: &'a Transaction) -> Query<'a> {
        Query::new(Binding::Tx(tx))
    }

    /// Add a predicate; repeated calls are conjoined.
    pub fn r#where(mut self, predicate: Expr) -> Self {
        self.filter = match self.filter {
            Expr::True => predicate,
            filter => filter.and(predicate),
        };
        self
    }

    /// Append an ordering term; earlier terms take precedence.
    pub fn order_by(mut self, term: OrderTerm) -> Self {
        self.order.push(term);
        self
    }

    /// Keep at most `n` rows after ordering and offset.
    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Skip the first `n` rows after ordering.
    pub fn offset(mut self, n: i64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Restrict results to the given paths; an empty projection yields
    /// whole records.
    pub fn fields<P: Into<FieldPath>>(mut self, paths: impl IntoIterator<Item = P>) -> Self {
        self.fields.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Execute and return `rid → row` in result order.
    pub fn fetch(&self) -> Result<IndexMap<Rid, Row>> {
        Ok(self.run()?.into_iter().collect())
    }

    /// Execute and return rows as an ordered sequence.
    pub fn fetch_list(&self) -> Result<Vec<Row>> {
        Ok(self.run()?.into_iter().map(|(_, row)| row).collect())
    }

    /// The number of rows a fetch would return, pagination included.
    pub fn count(&self) -> Result<usize> {
        Ok(self.run()?.len())
    }

    /// Delete every record matching the predicate, ignoring ordering and
    /// pagination. Returns how many were deleted.
    pub fn delete(&self) -> Result<usize> {
        eval::validate(&self.filter)?;
        match &self.binding {
            Binding::Store(store) => store.delete_matching(&self.filter),
            Binding::Tx(tx) => tx.delete_matching(&self.filter),
        }
    }

    /// Apply `patch` to every record matching the predicate. Returns how
    /// many were patched.
    pub fn update(&self, patch: Record) -> Result<usize> {
        eval::validate(&self.filter)?;
        match &self.binding {
            Binding::Store(store) => store.update_matching(&self.filter, patch),
            Binding::Tx(tx) => tx.update_matching(&self.filter, patch),
        }
    }

    fn run(&self) -> Result<Vec<(Rid, Row)>> {
        self.validate()?;
        let (offset, limit) = self.bounds()?;
        match &self.binding {
            Binding::Store(store) => {
                let state = store.inner.committed_state.read();
                Ok(self.execute(&state, None, Some(store), offset, limit))
            }
            Binding::Tx(tx) => {
                // Overlay before base: the one lock order used everywhere.
                let overlay = tx.lock_open()?;
                let state = tx.store_handle().inner.committed_state.read();
                Ok(self.execute(&state, Some(&*overlay), None, offset, limit))
            }
        }
    }

    fn validate(&self) -> Result<()> {
        eval::validate(&self.filter)?;
        for term in &self.order {
            eval::validate_path(&term.path)?;
        }
        for path in &self.fields {
            eval::validate_path(path)?;
        }
        Ok(())
    }

    fn bounds(&self) -> Result<(usize, Option<usize>)> {
        let offset = match self.offset {
            Some(n) if n < 0 => return Err(QueryError::BadOrdering(n).into()),
            Some(n) => n as usize,
            None => 0,
        };
        let limit = match self.limit {
            Some(n) if n < 0 => return Err(QueryError::BadOrdering(n).into()),
            Some(n) => Some(n as usize),
            None => None,
        };
        Ok((offset, limit))
    }

    fn execute(
        &self,
        state: &CommittedState,
        overlay: Option<&TxState>,
        views_from: Option<&Store>,
        offset: usize,
        limit: Option<usize>,
    ) -> Vec<(Rid, Row)> {
        let mut rids = matching_rids(&self.filter, state, overlay);

        if !self.order.is_empty() {
            rids = self
                .index_ordered(state, overlay, &rids)
                .unwrap_or_else(|| self.sort_by_terms(rids, state, overlay));
        }

        let page: Vec<Rid> = rids
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();

        page.into_iter()
            .map(|rid| {
                let row = match views_from {
                    Some(store) if self.fields.is_empty() => Row::View(store.view_of(rid)),
                    _ => {
                        let record = record_of(rid, state, overlay).expect("candidate rid is live");
                        if self.fields.is_empty() {
                            Row::Record(record.clone())
                        } else {
                            Row::Record(eval::project(record, &self.fields))
                        }
                    }
                };
                (rid, row)
            })
            .collect()
    }

    /// Order the survivors by walking the one relevant index in sort
    /// order instead of sorting. `None` means the walk cannot stand in
    /// for the general sort.
    fn index_ordered(
        &self,
        state: &CommittedState,
        overlay: Option<&TxState>,
        rids: &[Rid],
    ) -> Option<Vec<Rid>> {
        // Overlay values may disagree with the base index, and only a
        // single root-attribute term maps onto one index's sort order.
        if overlay.is_some() || self.order.len() != 1 {
            return None;
        }
        let term = &self.order[0];
        let ix = state.index(term.path.single()?)?;
        let survivors: IntSet<Rid> = rids.iter().copied().collect();
        let mut ordered = Vec::with_capacity(rids.len());
        match term.direction {
            Direction::Asc => {
                ordered.extend(
                    ix.iter_ordered(true)
                        .map(|(_, rid)| rid)
                        .filter(|rid| survivors.contains(rid)),
                );
            }
            Direction::Desc => {
                // The reverse walk leaves equal-value runs with their rids
                // descending; flip each run so ties still break by rid
                // ascending.
                let mut run: Vec<Rid> = Vec::new();
                let mut run_value: Option<&Value> = None;
                for (value, rid) in ix.iter_ordered(false) {
                    if !survivors.contains(&rid) {
                        continue;
                    }
                    if run_value != Some(value) {
                        run.reverse();
                        ordered.append(&mut run);
                        run_value = Some(value);
                    }
                    run.push(rid);
                }
                run.reverse();
                ordered.append(&mut run);
            }
        }
        // A survivor the walk never visited reads the attribute as null
        // with no index entry; only the general sort places those.
        (ordered.len() == rids.len()).then_some(ordered)
    }

    fn sort_by_terms(
        &self,
        rids: Vec<Rid>,
        state: &CommittedState,
        overlay: Option<&TxState>,
    ) -> Vec<Rid> {
        let mut keyed: Vec<(Rid, Vec<Value>)> = rids
            .into_iter()
            .map(|rid| {
                let record = record_of(rid, state, overlay).expect("candidate rid is live");
                let keys = self
                    .order
                    .iter()
                    .map(|term| eval::resolve(record, &term.path).clone())
                    .collect();
                (rid, keys)
            })
            .collect();
        keyed.sort_by(|(a_rid, a_keys), (b_rid, b_keys)| {
            for (term, (a, b)) in self.order.iter().zip(a_keys.iter().zip(b_keys)) {
                let ord = match term.direction {
                    Direction::Asc => a.compare(b),
                    Direction::Desc => b.compare(a),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a_rid.cmp(b_rid)
        });
        keyed.into_iter().map(|(rid, _)| rid).collect()
    }
}

/// The merged record state a transaction observes: overlay first, base
/// store second.
fn record_of<'a>(
    rid: Rid,
    state: &'a CommittedState,
    overlay: Option<&'a TxState>,
) -> Option<&'a Record> {
    overlay
        .and_then(|ov| ov.pending.get(&rid))
        .or_else(|| state.get(rid))
}

/// Rids matching `filter` against the merged state, ascending.
pub(crate) fn matching_rids(
    filter: &Expr,
    state: &CommittedState,
    overlay: Option<&TxState>,
) -> Vec<Rid> {
    let mut set: IntSet<Rid> = match plan::candidates(filter, state, false) {
        plan::Candidates::All => state.rids().collect(),
        plan::Candidates::Set(set) => set,
    };
    if let Some(ov) = overlay {
        // Overlay-created and overlay-updated rids join the candidates;
        // tombstoned rids leave. The residual pass below reads merged
        // state, so index false positives drop out here.
        set.extend(ov.pending.keys().copied());
        for rid in &ov.tombstones {
            set.remove(rid);
        }
    }
    let mut rids: Vec<Rid> = set.into_iter().sorted_unstable().collect();
    rids.retain(|&rid| match record_of(rid, state, overlay) {
        Some(record) => eval::matches(filter, record),
        None => false,
    });
    rids
}
