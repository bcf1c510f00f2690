use std::fmt::Debug;
use std::hash::Hash;

/// An opaque key identifying a destination (e.g. scheme + host + port).
///
/// The pool never inspects a key's contents; it only stores it, hashes it,
/// and compares it for equality. Any value that is cheap to clone and
/// carries a stable identity for "same destination" is a valid key.
pub trait RequestKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> RequestKey for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}
