//! Compilation of a predicate into index operations.
//!
//! The tree is walked with a negation flag instead of materializing a
//! negation-normal form: `Not` flips the flag, a negated `And` distributes
//! into a union, a negated comparison inverts its operator, and a negated
//! membership test is residual-only. Each leaf on a root-level attribute is
//! answered from that attribute's index; everything else falls back to the
//! full candidate set. The result is always a *superset* of the matching
//! rids — the residual pass in [`super::eval`] settles the truth.

use super::{CmpOp, Expr};
use crate::db::committed_state::CommittedState;
use crate::db::Rid;
use crate::map::IntSet;
use facetdb_value::Value;
use std::ops::Bound;

/// The candidate rid-set an index plan produced.
pub(crate) enum Candidates {
    /// Every live rid; produced by leaves the indexes cannot answer.
    All,
    Set(IntSet<Rid>),
}

impl Candidates {
    fn empty() -> Self {
        Candidates::Set(IntSet::default())
    }

    pub(crate) fn and(self, other: Candidates) -> Candidates {
        match (self, other) {
            (Candidates::All, other) => other,
            (this, Candidates::All) => this,
            (Candidates::Set(a), Candidates::Set(b)) => {
                let (mut small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
                small.retain(|rid| large.contains(rid));
                Candidates::Set(small)
            }
        }
    }

    pub(crate) fn or(self, other: Candidates) -> Candidates {
        match (self, other) {
            (Candidates::All, _) | (_, Candidates::All) => Candidates::All,
            (Candidates::Set(mut a), Candidates::Set(b)) => {
                a.extend(b);
                Candidates::Set(a)
            }
        }
    }
}

pub(crate) fn candidates(expr: &Expr, state: &CommittedState, negated: bool) -> Candidates {
    match expr {
        Expr::True => {
            if negated {
                Candidates::empty()
            } else {
                Candidates::All
            }
        }
        Expr::False => {
            if negated {
                Candidates::All
            } else {
                Candidates::empty()
            }
        }
        Expr::Not(inner) => candidates(inner, state, !negated),
        Expr::And(lhs, rhs) => {
            let l = candidates(lhs, state, negated);
            let r = candidates(rhs, state, negated);
            if negated {
                l.or(r)
            } else {
                l.and(r)
            }
        }
        Expr::Or(lhs, rhs) => {
            let l = candidates(lhs, state, negated);
            let r = candidates(rhs, state, negated);
            if negated {
                l.and(r)
            } else {
                l.or(r)
            }
        }
        Expr::Cmp { path, op, value } => {
            let op = if negated { op.negated() } else { *op };
            match path.single() {
                Some(attr) => cmp_leaf(state, attr, op, value),
                None => Candidates::All,
            }
        }
        Expr::OneOf { path, values } => {
            if negated {
                // A negated membership test is residual-only.
                return Candidates::All;
            }
            match path.single() {
                Some(attr) if !values.iter().any(|v| v.is_null()) => {
                    Candidates::Set(state.index_membership(attr, values))
                }
                // Null membership also matches records without the
                // attribute, which no index entry covers.
                _ => Candidates::All,
            }
        }
    }
}

fn cmp_leaf(state: &CommittedState, attr: &str, op: CmpOp, value: &Value) -> Candidates {
    // Records without the attribute evaluate it as null. If null satisfies
    // the comparison, such records match while appearing in no index
    // bucket, so the index cannot answer this leaf.
    if op.matches(Value::Null.compare(value)) {
        return Candidates::All;
    }
    let Some(ix) = state.index(attr) else {
        // No record carries the attribute at all.
        return Candidates::empty();
    };
    let set: IntSet<Rid> = match op {
        CmpOp::Eq => ix.point(value).collect(),
        CmpOp::Ne => {
            // Only reachable for `!= null`: everything in the index except
            // the null bucket.
            let excluded: IntSet<Rid> = ix.point(value).collect();
            ix.scan().filter(|rid| !excluded.contains(rid)).collect()
        }
        CmpOp::Lt => collect_scanned(ix.seek(&(..value))),
        CmpOp::Le => collect_scanned(ix.seek(&(..=value))),
        CmpOp::Gt => collect_scanned(ix.seek(&(Bound::Excluded(value), Bound::Unbounded))),
        CmpOp::Ge => collect_scanned(ix.seek(&(value..))),
    };
    Candidates::Set(set)
}

fn collect_scanned(mut iter: crate::db::index::AttrIndexRangeIter<'_>) -> IntSet<Rid> {
    let set: IntSet<Rid> = iter.by_ref().collect();
    log::trace!("index seek scanned {} keys", iter.keys_scanned());
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::attr;
    use facetdb_value::record;

    fn state() -> CommittedState {
        let mut s = CommittedState::default();
        s.insert_record(Rid(1), record! { "s" => "smelly", "i" => 10_000 });
        s.insert_record(Rid(2), record! { "s" => "sweet", "i" => 500 });
        s.insert_record(Rid(3), record! { "s" => "smelly", "i" => 50_000 });
        s.insert_record(Rid(4), record! { "other" => 1 });
        s
    }

    fn as_sorted(c: Candidates) -> Option<Vec<i64>> {
        match c {
            Candidates::All => None,
            Candidates::Set(s) => {
                let mut v: Vec<i64> = s.into_iter().map(|rid| rid.0).collect();
                v.sort_unstable();
                Some(v)
            }
        }
    }

    #[test]
    fn equality_and_ranges_come_from_the_index() {
        let st = state();
        let c = candidates(&attr("s").eq("smelly"), &st, false);
        assert_eq!(as_sorted(c), Some(vec![1, 3]));
        let c = candidates(&attr("i").gt(1_000), &st, false);
        assert_eq!(as_sorted(c), Some(vec![1, 3]));
        let c = candidates(&attr("i").ge(50_000), &st, false);
        assert_eq!(as_sorted(c), Some(vec![3]));
    }

    #[test]
    fn conjunction_intersects_and_disjunction_unions() {
        let st = state();
        let c = candidates(&(attr("s").eq("smelly") & attr("i").ge(20_000)), &st, false);
        assert_eq!(as_sorted(c), Some(vec![3]));
        let c = candidates(&(attr("s").eq("sweet") | attr("i").ge(20_000)), &st, false);
        assert_eq!(as_sorted(c), Some(vec![2, 3]));
    }

    #[test]
    fn negation_inverts_comparisons_through_the_index() {
        let st = state();
        // !(i >= 20_000) becomes i < 20_000, answerable from the index.
        let c = candidates(&!attr("i").ge(20_000), &st, false);
        assert_eq!(as_sorted(c), Some(vec![1, 2]));
    }

    #[test]
    fn null_satisfying_leaves_fall_back_to_all_candidates() {
        let st = state();
        // Records without `i` would match these; the index cannot see them.
        assert!(matches!(
            candidates(&attr("i").le(1_000_000), &st, false),
            Candidates::All
        ));
        assert!(matches!(
            candidates(&attr("i").ne(5), &st, false),
            Candidates::All
        ));
        assert!(matches!(
            candidates(&attr("i").eq(Value::Null), &st, false),
            Candidates::All
        ));
        // `!= null` is exactly the attribute-bearing records.
        let c = candidates(&attr("i").ne(Value::Null), &st, false);
        assert_eq!(as_sorted(c), Some(vec![1, 2, 3]));
    }

    #[test]
    fn deep_paths_and_unknown_attributes() {
        let st = state();
        assert!(matches!(
            candidates(&attr("dog").then("age").eq(6), &st, false),
            Candidates::All
        ));
        // Unknown attribute, null-proof op: provably empty.
        let c = candidates(&attr("zzz").gt(0), &st, false);
        assert_eq!(as_sorted(c), Some(vec![]));
    }

    #[test]
    fn membership_unions_buckets() {
        let st = state();
        let c = candidates(&attr("s").one_of(["sweet", "sour"]), &st, false);
        assert_eq!(as_sorted(c), Some(vec![2]));
        assert!(matches!(
            candidates(&!attr("s").one_of(["sweet"]), &st, false),
            Candidates::All
        ));
    }
}
