//! An in-memory, schemaless record store.
//!
//! Records are maps from attribute names to heterogeneous [`Value`]s. Every
//! top-level attribute is kept in an ordered secondary index, so queries
//! built from symbolic predicates compile down to index range scans plus a
//! residual filter. Mutations can be buffered in a [`Transaction`] and
//! committed atomically under concurrent access.
//!
//! ```
//! use facetdb::{attr, record, Store};
//!
//! let store = Store::new();
//! store.create(record! { "name" => "frank", "age" => 7 }).unwrap();
//! store.create(record! { "name" => "kang", "age" => 12 }).unwrap();
//!
//! let grown = store
//!     .select()
//!     .r#where(attr("age").ge(10))
//!     .fetch_list()
//!     .unwrap();
//! assert_eq!(grown.len(), 1);
//! ```

pub mod db;
pub mod error;
pub mod map;
pub mod query;

pub use db::{RecordView, Rid, Store, Transaction};
pub use error::{DBError, QueryError, RecordError, Result, TxError};
pub use query::{attr, CmpOp, Direction, Expr, FieldPath, OrderTerm, Query, Row};

pub use facetdb_value::{record, seq, set, Record, Value, ValueKind, ValueMap};
