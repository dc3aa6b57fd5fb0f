//! Heterogeneous, schemaless record values.
//!
//! A [`Value`] is the unit of data stored in a record attribute: a scalar,
//! a sequence, a set, or a nested map of further values. The type carries a
//! *total* order over all kinds (see [`Value::compare`]), which is what lets
//! the store use values directly as keys of ordered indexes, and a hash that
//! agrees with structural equality.

pub mod value;

pub use value::{Value, ValueKind};

use indexmap::IndexMap;

/// A mapping from attribute names to values, preserving insertion order.
pub type ValueMap = IndexMap<String, Value>;

/// A record is a value map at the root of a stored entity.
pub type Record = ValueMap;

/// Construct a [`Record`] / [`ValueMap`] from `key => value` pairs.
///
/// ```
/// use facetdb_value::{record, Value};
///
/// let r = record! { "name" => "frank", "age" => 7 };
/// assert_eq!(r["age"], Value::Int(7));
/// ```
#[macro_export]
macro_rules! record {
    () => { $crate::ValueMap::new() };
    ($($k:expr => $v:expr),+ $(,)?) => {{
        let mut map = $crate::ValueMap::new();
        $(map.insert(::std::string::String::from($k), $crate::Value::from($v));)+
        map
    }};
}

/// Construct a [`Value::Seq`] from a list of convertible elements.
#[macro_export]
macro_rules! seq {
    ($($v:expr),* $(,)?) => {
        $crate::Value::Seq(::std::vec![$($crate::Value::from($v)),*])
    };
}

/// Construct a [`Value::Set`] from a list of convertible elements.
#[macro_export]
macro_rules! set {
    ($($v:expr),* $(,)?) => {{
        let mut set = ::std::collections::BTreeSet::new();
        $(set.insert($crate::Value::from($v));)*
        $crate::Value::Set(set)
    }};
}
