//! The fresh/stale decision and single-flight fetching.
//!
//! All decisions are made under short synchronous locks; the only suspension
//! point is the fetch function itself, which runs on a spawned task.

use crate::entry::{FetchOutcome, Fetcher, QueryEntry};
use crate::error::FetchError;
use crate::inflight::InflightFetch;
use crate::key::QueryKey;
use crate::metrics::Metrics;
use crate::shared::ClientShared;
use crate::state::RawState;
use crate::time::StaleTime;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace, warn};

/// How a request for a key is going to be answered.
pub(crate) enum Resolution {
  /// The cached entry is fresh; no fetch happens.
  Fresh(Arc<QueryEntry>),
  /// A fetch is running (possibly started by someone else); await it.
  Fetch(Arc<InflightFetch>),
}

impl ClientShared {
  fn fresh_entry(&self, canonical: &str, stale_time: StaleTime) -> Option<Arc<QueryEntry>> {
    let entry = self.store.get(canonical)?;
    if entry.is_stale(stale_time, self.clock.now()) {
      None
    } else {
      Some(entry)
    }
  }

  /// Serves the key from cache if fresh, otherwise joins or starts a fetch.
  ///
  /// `fetcher` is only called when this request ends up starting the fetch.
  pub(crate) fn begin_resolve<F>(self: &Arc<Self>, key: &QueryKey, stale_time: StaleTime, fetcher: F) -> Resolution
  where
    F: FnOnce() -> Fetcher,
  {
    if let Some(entry) = self.fresh_entry(key.canonical(), stale_time) {
      Metrics::incr(&self.metrics.hits);
      trace!(key = %key, "serving fresh entry");
      return Resolution::Fresh(entry);
    }

    Metrics::incr(&self.metrics.misses);
    self.join_or_start(key, fetcher, Some(stale_time))
  }

  /// Refetches the key with the fetcher stored alongside its data.
  ///
  /// Returns `None` when there is nothing to refetch: no entry, or an entry
  /// written directly without a fetcher.
  pub(crate) fn begin_invalidate(self: &Arc<Self>, key: &QueryKey) -> Option<Arc<InflightFetch>> {
    let fetcher = self.store.get(key.canonical())?.fetcher.clone()?;

    Metrics::incr(&self.metrics.invalidations);
    debug!(key = %key, "invalidating");
    match self.join_or_start(key, move || fetcher, None) {
      Resolution::Fetch(fetch) => Some(fetch),
      Resolution::Fresh(_) => None,
    }
  }

  /// The single-flight core.
  ///
  /// With `recheck` set, the cache is consulted again under the in-flight
  /// lock: a fetch that settled between the first lookup and now has already
  /// removed itself from the table, so its data is visible here.
  fn join_or_start<F>(self: &Arc<Self>, key: &QueryKey, fetcher: F, recheck: Option<StaleTime>) -> Resolution
  where
    F: FnOnce() -> Fetcher,
  {
    let canonical = key.canonical();
    let index = self.store.shard_index(canonical);

    let (fetch, generation) = {
      let mut inflight = self.inflight.lock(index);

      if let Some(existing) = inflight.get(canonical) {
        Metrics::incr(&self.metrics.joined_fetches);
        trace!(key = %key, "joining fetch already in flight");
        return Resolution::Fetch(existing.clone());
      }

      if let Some(stale_time) = recheck {
        if let Some(entry) = self.fresh_entry(canonical, stale_time) {
          return Resolution::Fresh(entry);
        }
      }

      let fetch = Arc::new(InflightFetch::new());
      inflight.insert(canonical.to_string(), fetch.clone());
      (fetch, self.store.next_generation())
    };

    Metrics::incr(&self.metrics.fetches);
    debug!(key = %key, generation, "fetch started");

    // Announce before spawning so that "pending" always precedes the outcome.
    let previous = self.store.get(canonical).map(|entry| entry.data.clone());
    self
      .listeners
      .notify(canonical, generation, &RawState::pending(previous));

    self.spawn_fetch(key.clone(), fetcher(), fetch.clone());
    Resolution::Fetch(fetch)
  }

  fn spawn_fetch(self: &Arc<Self>, key: QueryKey, fetcher: Fetcher, fetch: Arc<InflightFetch>) {
    let mut guard = SettleGuard {
      shared: Arc::clone(self),
      key,
      fetcher,
      fetch,
      settled: false,
    };

    let task = async move {
      let started = Instant::now();
      let outcome = (guard.fetcher)().await;
      debug!(
        key = %guard.key,
        elapsed = ?started.elapsed(),
        ok = outcome.is_ok(),
        "fetch settled"
      );
      guard.settle(outcome);
    };
    self.spawner.spawn(Box::pin(task));
  }

  /// Publishes a fetch outcome: cache, in-flight table, listeners, waiters,
  /// in that order.
  ///
  /// The outcome's generation is drawn while the fetch is still in flight, so
  /// any later fetch of the key announces a newer one and listeners that see
  /// it drop this outcome if it arrives late.
  fn settle(&self, key: &QueryKey, fetcher: &Fetcher, fetch: &Arc<InflightFetch>, outcome: FetchOutcome) {
    let canonical = key.canonical();

    let (generation, state) = match &outcome {
      Ok(data) => {
        let now = self.clock.now();
        let generation = self.store.set(canonical.to_string(), |_, generation| {
          QueryEntry::new(data.clone(), Some(fetcher.clone()), now, generation)
        });
        (generation, RawState::success(data.clone()))
      }
      Err(error) => {
        // The entry is left as it was; a failure never erases good data.
        Metrics::incr(&self.metrics.fetch_failures);
        warn!(key = %key, %error, "fetch failed");
        let generation = self.store.next_generation();
        let previous = self.store.get(canonical).map(|entry| entry.data.clone());
        (generation, RawState::error(error.clone(), previous))
      }
    };

    self.inflight.remove(self.store.shard_index(canonical), canonical, fetch);
    self.listeners.notify(canonical, generation, &state);
    fetch.complete(outcome);
  }
}

/// Owns a running fetch. If the task is dropped before the fetch settles
/// (runtime shutdown, a panicking fetch function), waiters still get an
/// error instead of hanging and the key can be fetched again.
struct SettleGuard {
  shared: Arc<ClientShared>,
  key: QueryKey,
  fetcher: Fetcher,
  fetch: Arc<InflightFetch>,
  settled: bool,
}

impl SettleGuard {
  fn settle(&mut self, outcome: FetchOutcome) {
    self.settled = true;
    self
      .shared
      .settle(&self.key, &self.fetcher, &self.fetch, outcome);
  }
}

impl Drop for SettleGuard {
  fn drop(&mut self) {
    if !self.settled {
      self.settle(Err(FetchError::new("fetch task was dropped before it settled")));
    }
  }
}
