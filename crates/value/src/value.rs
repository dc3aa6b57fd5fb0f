use crate::ValueMap;
use itertools::Itertools;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// The kinds a [`Value`] can take, in ascending order position.
///
/// Mixed-kind comparisons order by kind alone: nulls sort below booleans,
/// booleans below numbers, and so on through maps. Within a kind, values
/// order by content. Note that ints and floats share the `Number` kind and
/// compare by numeric value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    Str,
    Seq,
    Set,
    Map,
}

/// A single attribute value: a scalar, a sequence, a set, or a nested map.
///
/// `Value` implements [`Ord`] with a total, deterministic order over all
/// kinds, which makes it usable directly as the key of an ordered index.
/// Equality is structural under the same normalization: `Int(1)` equals
/// `Float(1.0)`, `-0.0` equals `0.0`, map insertion order is ignored, and
/// every NaN is the one canonical NaN, which sorts above all other numbers.
/// [`Hash`] agrees with [`Eq`].
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<Value>),
    Set(BTreeSet<Value>),
    Map(ValueMap),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) | Value::Float(_) => ValueKind::Number,
            Value::Str(_) => ValueKind::Str,
            Value::Seq(_) => ValueKind::Seq,
            Value::Set(_) => ValueKind::Set,
            Value::Map(_) => ValueKind::Map,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Totally order `self` against `other`.
    ///
    /// This is the canonical comparison the whole store is built on; the
    /// `Ord` impl simply delegates here.
    pub fn compare(&self, other: &Value) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => cmp_floats(*a, *b),
            (Int(a), Float(b)) => cmp_int_float(*a, *b),
            (Float(a), Int(b)) => cmp_int_float(*b, *a).reverse(),
            (Str(a), Str(b)) => a.cmp(b),
            (Seq(a), Seq(b)) => cmp_elementwise(a.iter(), b.iter()),
            // `BTreeSet` already iterates in our sort order, so a set
            // compares as the sorted sequence of its elements.
            (Set(a), Set(b)) => cmp_elementwise(a.iter(), b.iter()),
            (Map(a), Map(b)) => cmp_maps(a, b),
            _ => self.kind().cmp(&other.kind()),
        }
    }
}

/// Floats with every NaN collapsed to one canonical value above all other
/// numbers; `-0.0` and `0.0` are equal.
fn cmp_floats(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Compare an `i64` against an `f64` by numeric value, without the precision
/// loss of casting the int to a float.
fn cmp_int_float(i: i64, f: f64) -> Ordering {
    if f.is_nan() {
        // NaN sorts above every other number.
        return Ordering::Less;
    }
    if f == f64::INFINITY {
        return Ordering::Less;
    }
    if f == f64::NEG_INFINITY {
        return Ordering::Greater;
    }
    // Any finite float at or above 2^63 exceeds every i64; symmetrically
    // below -2^63. Inside that window `trunc` is exactly representable.
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    if f >= TWO_POW_63 {
        return Ordering::Less;
    }
    if f < -TWO_POW_63 {
        return Ordering::Greater;
    }
    let trunc = f.trunc() as i64;
    match i.cmp(&trunc) {
        Ordering::Equal => {
            // Exact: floats of magnitude >= 2^52 are integral, smaller
            // truncations round-trip through i64 losslessly.
            let frac = f - trunc as f64;
            if frac > 0.0 {
                Ordering::Less
            } else if frac < 0.0 {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        }
        ord => ord,
    }
}

fn cmp_elementwise<'a>(
    mut a: impl Iterator<Item = &'a Value>,
    mut b: impl Iterator<Item = &'a Value>,
) -> Ordering {
    loop {
        match (a.next(), b.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match x.compare(y) {
                Ordering::Equal => continue,
                ord => return ord,
            },
        }
    }
}

/// Maps compare as key-sorted sequences of `(key, value)` pairs, so
/// insertion order never leaks into the order or into equality.
fn cmp_maps(a: &ValueMap, b: &ValueMap) -> Ordering {
    let mut a_sorted = a.iter().sorted_by(|(j, _), (k, _)| j.cmp(k));
    let mut b_sorted = b.iter().sorted_by(|(j, _), (k, _)| j.cmp(k));
    loop {
        match (a_sorted.next(), b_sorted.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some((ka, va)), Some((kb, vb))) => match ka.cmp(kb).then_with(|| va.compare(vb)) {
                Ordering::Equal => continue,
                ord => return ord,
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

// Kind tags fed to the hasher. Numbers share one tag so that `Int(1)` and
// `Float(1.0)`, which are equal, hash identically.
const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_NUMBER: u8 = 2;
const TAG_STR: u8 = 3;
const TAG_SEQ: u8 = 4;
const TAG_SET: u8 = 5;
const TAG_MAP: u8 = 6;

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => state.write_u8(TAG_NULL),
            Value::Bool(b) => {
                state.write_u8(TAG_BOOL);
                b.hash(state);
            }
            Value::Int(i) => {
                state.write_u8(TAG_NUMBER);
                state.write_u8(0);
                i.hash(state);
            }
            Value::Float(f) => {
                state.write_u8(TAG_NUMBER);
                hash_float(*f, state);
            }
            Value::Str(s) => {
                state.write_u8(TAG_STR);
                s.hash(state);
            }
            Value::Seq(vs) => {
                state.write_u8(TAG_SEQ);
                state.write_usize(vs.len());
                for v in vs {
                    v.hash(state);
                }
            }
            Value::Set(vs) => {
                state.write_u8(TAG_SET);
                state.write_usize(vs.len());
                for v in vs {
                    v.hash(state);
                }
            }
            Value::Map(m) => {
                state.write_u8(TAG_MAP);
                state.write_usize(m.len());
                for (k, v) in m.iter().sorted_by(|(j, _), (k, _)| j.cmp(k)) {
                    k.hash(state);
                    v.hash(state);
                }
            }
        }
    }
}

fn hash_float<H: Hasher>(f: f64, state: &mut H) {
    if f.is_nan() {
        // One canonical NaN.
        state.write_u8(2);
        return;
    }
    // An integral float equals the corresponding int, so it must hash like
    // one. `-0.0` truncates to 0 and lands here too.
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    if f.fract() == 0.0 && (-TWO_POW_63..TWO_POW_63).contains(&f) {
        state.write_u8(0);
        (f as i64).hash(state);
    } else {
        state.write_u8(1);
        f.to_bits().hash(state);
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Seq(vs) => {
                write!(f, "[{}]", vs.iter().map(|v| v.to_string()).join(", "))
            }
            Value::Set(vs) => {
                write!(f, "{{{}}}", vs.iter().map(|v| v.to_string()).join(", "))
            }
            Value::Map(m) => {
                let body = m.iter().map(|(k, v)| format!("{k:?}: {v}")).join(", ");
                write!(f, "{{{body}}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(vs: Vec<Value>) -> Self {
        Value::Seq(vs)
    }
}

impl From<BTreeSet<Value>> for Value {
    fn from(vs: BTreeSet<Value>) -> Self {
        Value::Set(vs)
    }
}

impl From<ValueMap> for Value {
    fn from(m: ValueMap) -> Self {
        Value::Map(m)
    }
}

impl From<&Value> for Value {
    fn from(v: &Value) -> Self {
        v.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{record, seq, set};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(v: &Value) -> u64 {
        let mut h = DefaultHasher::new();
        v.hash(&mut h);
        h.finish()
    }

    /// One representative per kind, in ascending kind order.
    fn kind_ladder() -> Vec<Value> {
        vec![
            Value::Null,
            Value::Bool(true),
            Value::Int(i64::MAX),
            Value::from("a"),
            seq![1],
            set![1],
            Value::Map(record! { "k" => 1 }),
        ]
    }

    #[test]
    fn kinds_order_nulls_bools_numbers_strings_seqs_sets_maps() {
        let ladder = kind_ladder();
        for (i, lo) in ladder.iter().enumerate() {
            for hi in &ladder[i + 1..] {
                assert_eq!(lo.compare(hi), Ordering::Less, "{lo} !< {hi}");
                assert_eq!(hi.compare(lo), Ordering::Greater, "{hi} !> {lo}");
            }
        }
    }

    #[test]
    fn numbers_compare_by_numeric_value_across_reprs() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Float(-0.0), Value::Float(0.0));
        assert_eq!(Value::Float(-0.0), Value::Int(0));
        assert!(Value::Int(1) < Value::Float(1.5));
        assert!(Value::Float(1.5) < Value::Int(2));
        assert!(Value::Int(-1) > Value::Float(-1.5));
        assert!(Value::Float(1e300) > Value::Int(i64::MAX));
        assert!(Value::Float(-1e300) < Value::Int(i64::MIN));
        // 2^53 + 1 is not representable as f64; casting would lose it.
        let big = (1i64 << 53) + 1;
        assert!(Value::Int(big) > Value::Float((1i64 << 53) as f64));
    }

    #[test]
    fn nan_is_one_canonical_value_above_all_numbers() {
        let nan = Value::Float(f64::NAN);
        assert_eq!(nan, Value::Float(-f64::NAN));
        assert!(nan > Value::Float(f64::INFINITY));
        assert!(nan > Value::Int(i64::MAX));
        // ...but still a number: below every string.
        assert!(nan < Value::from(""));
    }

    #[test]
    fn sequences_compare_lexicographically() {
        assert!(seq![1, 2] < seq![1, 3]);
        assert!(seq![1, 2] < seq![1, 2, 0]);
        assert_eq!(seq![1, 2], seq![1, 2]);
        assert!(seq![] < seq![Value::Null]);
    }

    #[test]
    fn sets_compare_as_sorted_sequences() {
        assert_eq!(set![3, 1, 2], set![1, 2, 3]);
        assert!(set![1, 5] > set![1, 4, 100]);
    }

    #[test]
    fn maps_ignore_insertion_order() {
        let ab = Value::Map(record! { "a" => 1, "b" => 2 });
        let ba = Value::Map(record! { "b" => 2, "a" => 1 });
        assert_eq!(ab, ba);
        assert_eq!(hash_of(&ab), hash_of(&ba));
        let ab3 = Value::Map(record! { "a" => 1, "b" => 3 });
        assert!(ab < ab3);
        // Key order decides before values do.
        let ac = Value::Map(record! { "a" => 1, "c" => 0 });
        assert!(ab < ac);
    }

    #[test]
    fn equal_numbers_hash_identically() {
        assert_eq!(hash_of(&Value::Int(7)), hash_of(&Value::Float(7.0)));
        assert_eq!(hash_of(&Value::Float(-0.0)), hash_of(&Value::Int(0)));
        assert_eq!(
            hash_of(&Value::Float(f64::NAN)),
            hash_of(&Value::Float(-f64::NAN))
        );
    }

    #[test]
    fn nested_values_order_structurally() {
        let young = Value::Map(record! { "dog" => Value::Map(record! { "age" => 6 }) });
        let old = Value::Map(record! { "dog" => Value::Map(record! { "age" => 10 }) });
        assert!(young < old);
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            any::<f64>().prop_map(Value::Float),
            "[a-z]{0,6}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Seq),
                prop::collection::vec(inner.clone(), 0..4)
                    .prop_map(|vs| Value::Set(vs.into_iter().collect())),
                prop::collection::vec(("[a-z]{0,3}", inner), 0..4)
                    .prop_map(|kvs| Value::Map(kvs.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn compare_is_antisymmetric(a in arb_value(), b in arb_value()) {
            prop_assert_eq!(a.compare(&b), b.compare(&a).reverse());
        }

        #[test]
        fn compare_is_reflexive(a in arb_value()) {
            prop_assert_eq!(a.compare(&a), Ordering::Equal);
        }

        #[test]
        fn compare_is_transitive(a in arb_value(), b in arb_value(), c in arb_value()) {
            let mut sorted = [a, b, c];
            sorted.sort();
            prop_assert!(sorted[0] <= sorted[1] && sorted[1] <= sorted[2]);
            prop_assert!(sorted[0] <= sorted[2]);
        }

        #[test]
        fn equal_values_hash_equal(a in arb_value(), b in arb_value()) {
            if a == b {
                prop_assert_eq!(hash_of(&a), hash_of(&b));
            }
        }

        #[test]
        fn int_float_comparison_is_exact(i in any::<i64>(), f in any::<f64>()) {
            // Agreement with the reference comparison on the i128-exact path.
            if f.is_finite() && f.fract() == 0.0 && f.abs() < 9_223_372_036_854_775_808.0 {
                let expected = i128::from(i).cmp(&(f as i64).into());
                prop_assert_eq!(cmp_int_float(i, f), expected);
            }
        }
    }
}
