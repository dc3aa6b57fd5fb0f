//! Hash maps and sets keyed by integer-like ids.
//!
//! Rids already are well-distributed keys, so these aliases skip the default
//! SipHash round entirely.

pub type IntMap<K, V> = nohash_hasher::IntMap<K, V>;
pub type IntSet<K> = nohash_hasher::IntSet<K>;
