//! Residual predicate evaluation against a full record.
//!
//! The index planner only ever produces a superset of the matching rids;
//! this pass is the source of truth. A missing attribute reads as [`Value::
//! Null`], so `attr > x` is false on records without `attr`, while
//! `attr == null` is true on them.

use super::{Expr, FieldPath};
use crate::error::QueryError;
use facetdb_value::{Record, Value};

static NULL: Value = Value::Null;

/// Walk `path` through nested maps, reading absent steps as null.
pub(crate) fn resolve<'a>(record: &'a Record, path: &FieldPath) -> &'a Value {
    let mut segments = path.segments().iter();
    let Some(first) = segments.next() else {
        return &NULL;
    };
    let mut current = match record.get(first.as_str()) {
        Some(v) => v,
        None => return &NULL,
    };
    for segment in segments {
        current = match current.as_map().and_then(|m| m.get(segment.as_str())) {
            Some(v) => v,
            None => return &NULL,
        };
    }
    current
}

pub(crate) fn matches(expr: &Expr, record: &Record) -> bool {
    match expr {
        Expr::True => true,
        Expr::False => false,
        Expr::Cmp { path, op, value } => op.matches(resolve(record, path).compare(value)),
        Expr::OneOf { path, values } => {
            let actual = resolve(record, path);
            values.iter().any(|v| actual == v)
        }
        Expr::Not(inner) => !matches(inner, record),
        Expr::And(lhs, rhs) => matches(lhs, record) && matches(rhs, record),
        Expr::Or(lhs, rhs) => matches(lhs, record) || matches(rhs, record),
    }
}

/// Reject predicates with an empty field path before any execution work.
pub(crate) fn validate(expr: &Expr) -> Result<(), QueryError> {
    match expr {
        Expr::True | Expr::False => Ok(()),
        Expr::Cmp { path, .. } | Expr::OneOf { path, .. } => validate_path(path),
        Expr::Not(inner) => validate(inner),
        Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) => {
            validate(lhs)?;
            validate(rhs)
        }
    }
}

pub(crate) fn validate_path(path: &FieldPath) -> Result<(), QueryError> {
    if path.segments().is_empty() {
        return Err(QueryError::BadPredicate(
            "field path references no attribute".into(),
        ));
    }
    Ok(())
}

/// Restrict `record` to the given paths, preserving its nesting shape.
/// Missing paths yield a null leaf.
pub(crate) fn project(record: &Record, fields: &[FieldPath]) -> Record {
    let mut out = Record::new();
    for path in fields {
        insert_at(&mut out, path.segments(), resolve(record, path).clone());
    }
    out
}

fn insert_at(out: &mut Record, segments: &[String], value: Value) {
    match segments {
        [] => {}
        [leaf] => {
            out.insert(leaf.clone(), value);
        }
        [head, rest @ ..] => {
            let slot = out
                .entry(head.clone())
                .or_insert_with(|| Value::Map(Record::new()));
            if !matches!(slot, Value::Map(_)) {
                *slot = Value::Map(Record::new());
            }
            if let Value::Map(inner) = slot {
                insert_at(inner, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::attr;
    use facetdb_value::{record, Record};
    use pretty_assertions::assert_eq;

    fn dog_record() -> Record {
        record! { "owner" => "kang", "dog" => Value::Map(record! { "age" => 6 }) }
    }

    #[test]
    fn deep_paths_resolve_through_nested_maps() {
        let rec = dog_record();
        assert_eq!(resolve(&rec, &attr("dog").then("age")), &Value::Int(6));
        assert_eq!(resolve(&rec, &attr("dog").then("name")), &Value::Null);
        assert_eq!(resolve(&rec, &attr("cat").then("age")), &Value::Null);
        assert_eq!(resolve(&rec, &attr("owner").then("age")), &Value::Null);
    }

    #[test]
    fn missing_attributes_read_as_null() {
        let rec = dog_record();
        assert!(!matches(&attr("age").gt(0), &rec));
        assert!(matches(&attr("age").eq(Value::Null), &rec));
        assert!(matches(&attr("age").ne("anything"), &rec));
    }

    #[test]
    fn compound_predicates_follow_boolean_structure() {
        let rec = record! { "s" => "smelly", "i" => 10_000 };
        let p = attr("s").eq("smelly") & attr("i").le(20_000);
        assert!(matches(&p, &rec));
        let q = attr("s").eq("sweet") | !attr("i").gt(20_000);
        assert!(matches(&q, &rec));
        assert!(!matches(&attr("s").one_of(["sour", "sweet"]), &rec));
        assert!(matches(&attr("s").one_of(["sour", "smelly"]), &rec));
    }

    #[test]
    fn projection_preserves_nesting_and_nulls_missing_leaves() {
        let rec = dog_record();
        let projected = project(&rec, &[attr("dog").then("age"), attr("dog").then("name")]);
        let expected: Record =
            record! { "dog" => Value::Map(record! { "age" => 6, "name" => Value::Null }) };
        assert_eq!(projected, expected);
    }
}
