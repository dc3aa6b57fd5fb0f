pub(crate) mod committed_state;
pub(crate) mod index;
mod store;
pub(crate) mod tx;
mod view;

pub use store::Store;
pub use tx::Transaction;
pub use view::RecordView;

use derive_more::{Display, From};

/// The stable identifier of a record within a store.
///
/// Rids are opaque to callers, but a record created with an integer `id`
/// attribute adopts that integer as its rid; otherwise the store assigns a
/// fresh monotonic one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From)]
pub struct Rid(pub i64);

impl Rid {
    /// Sentinels for synthesizing index range endpoints: every real rid
    /// sorts between them.
    pub(crate) const MIN: Rid = Rid(i64::MIN);
    pub(crate) const MAX: Rid = Rid(i64::MAX);
}

impl nohash_hasher::IsEnabled for Rid {}
