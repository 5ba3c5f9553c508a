use crate::entry::QueryEntry;

use core::fmt;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use parking_lot::RwLock;

type Shard = RwLock<HashMap<String, Arc<QueryEntry>, ahash::RandomState>>;

/// A helper function to hash a key using a `BuildHasher`.
#[inline]
pub(crate) fn hash_key<K: Hash + ?Sized, H: BuildHasher>(hasher: &H, key: &K) -> u64 {
  let mut state = hasher.build_hasher();
  key.hash(&mut state);
  state.finish()
}

/// The mapping from canonical key to cached entry, partitioned into
/// independently locked shards.
///
/// Locks are held only for the duration of a single map operation and never
/// across an `.await`. Writes replace whole entries; nothing is merged.
///
/// Every transition of a key is stamped with a generation drawn from one
/// counter. Writes and removals draw theirs under the shard lock, so for any
/// one key the generations increase in the order the store changed.
pub(crate) struct QueryStore {
  shards: Box<[CachePadded<Shard>]>,
  hasher: ahash::RandomState,
  generation: AtomicU64,
}

impl fmt::Debug for QueryStore {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueryStore")
      .field("num_shards", &self.shards.len())
      .field("len", &self.len())
      .field("generation", &self.generation.load(Ordering::Relaxed))
      .finish()
  }
}

impl QueryStore {
  /// `num_shards` must be a non-zero power of two; the builder guarantees it.
  pub(crate) fn new(num_shards: usize, hasher: ahash::RandomState) -> Self {
    let shards = (0..num_shards)
      .map(|_| CachePadded::new(RwLock::new(HashMap::with_hasher(hasher.clone()))))
      .collect::<Vec<_>>();

    Self {
      shards: shards.into_boxed_slice(),
      hasher,
      generation: AtomicU64::new(0),
    }
  }

  /// Draws the next generation. Never returns 0.
  #[inline]
  pub(crate) fn next_generation(&self) -> u64 {
    self.generation.fetch_add(1, Ordering::SeqCst) + 1
  }

  #[inline]
  pub(crate) fn shard_index(&self, canonical: &str) -> usize {
    hash_key(&self.hasher, canonical) as usize & (self.shards.len() - 1)
  }

  #[inline]
  fn shard(&self, canonical: &str) -> &Shard {
    &self.shards[self.shard_index(canonical)]
  }

  pub(crate) fn get(&self, canonical: &str) -> Option<Arc<QueryEntry>> {
    self.shard(canonical).read().get(canonical).cloned()
  }

  /// Stores the entry built by `build`, unconditionally replacing any
  /// previous one, and returns the generation it was written at.
  ///
  /// `build` sees the previous entry and runs under the shard lock.
  pub(crate) fn set<F>(&self, canonical: String, build: F) -> u64
  where
    F: FnOnce(Option<&QueryEntry>, u64) -> QueryEntry,
  {
    let mut shard = self.shard(&canonical).write();
    let generation = self.next_generation();
    let entry = build(shard.get(&canonical).map(|e| &**e), generation);
    shard.insert(canonical, Arc::new(entry));
    generation
  }

  pub(crate) fn has(&self, canonical: &str) -> bool {
    self.shard(canonical).read().contains_key(canonical)
  }

  /// Removes the entry, returning the generation of the removal if there
  /// was one.
  pub(crate) fn remove(&self, canonical: &str) -> Option<u64> {
    let mut shard = self.shard(canonical).write();
    shard.remove(canonical)?;
    Some(self.next_generation())
  }

  /// Removes every entry, returning how many there were.
  pub(crate) fn clear(&self) -> usize {
    // Take every shard lock first so no writer observes a half-cleared store.
    let mut guards = self.shards.iter().map(|s| s.write()).collect::<Vec<_>>();
    let mut removed = 0;
    for guard in guards.iter_mut() {
      removed += guard.len();
      guard.clear();
    }
    removed
  }

  pub(crate) fn len(&self) -> usize {
    self.shards.iter().map(|s| s.read().len()).sum()
  }
}
