use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the client.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub(crate) struct Metrics {
  // --- Lookups ---
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,

  // --- Fetching ---
  pub(crate) fetches: CachePadded<AtomicU64>,
  pub(crate) fetch_failures: CachePadded<AtomicU64>,
  pub(crate) joined_fetches: CachePadded<AtomicU64>,

  // --- Manual control ---
  pub(crate) invalidations: CachePadded<AtomicU64>,
  pub(crate) direct_writes: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      fetches: CachePadded::new(AtomicU64::new(0)),
      fetch_failures: CachePadded::new(AtomicU64::new(0)),
      joined_fetches: CachePadded::new(AtomicU64::new(0)),
      invalidations: CachePadded::new(AtomicU64::new(0)),
      direct_writes: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn incr(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let total_lookups = hits + misses;

    MetricsSnapshot {
      hits,
      misses,
      hit_ratio: if total_lookups == 0 {
        0.0
      } else {
        hits as f64 / total_lookups as f64
      },
      fetches: self.fetches.load(Ordering::Relaxed),
      fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
      joined_fetches: self.joined_fetches.load(Ordering::Relaxed),
      invalidations: self.invalidations.load(Ordering::Relaxed),
      direct_writes: self.direct_writes.load(Ordering::Relaxed),
      uptime: self.created_at.elapsed(),
    }
  }
}

/// A point-in-time view of a client's counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
  /// Resolutions answered from a fresh entry.
  pub hits: u64,
  /// Resolutions that found no entry or a stale one.
  pub misses: u64,
  pub hit_ratio: f64,
  /// Fetch functions actually invoked.
  pub fetches: u64,
  pub fetch_failures: u64,
  /// Resolutions that attached to a fetch already in flight.
  pub joined_fetches: u64,
  pub invalidations: u64,
  /// Entries written with `set_query_data`.
  pub direct_writes: u64,
  pub uptime: Duration,
}

impl fmt::Display for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "Query Metrics (uptime: {:?}):", self.uptime)?;
    writeln!(
      f,
      "  - Hit Ratio: {:.2}% ({} hits / {} misses)",
      self.hit_ratio * 100.0,
      self.hits,
      self.misses
    )?;
    writeln!(
      f,
      "  - Fetches: {} started, {} failed, {} joined in flight",
      self.fetches, self.fetch_failures, self.joined_fetches
    )?;
    write!(
      f,
      "  - Manual: {} invalidations, {} direct writes",
      self.invalidations, self.direct_writes
    )
  }
}
