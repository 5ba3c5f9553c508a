use crate::entry::FetchOutcome;

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::{Mutex, MutexGuard};

/// The internal state of a fetch that has been started.
enum State {
  Fetching,
  Settled(FetchOutcome),
}

struct Inner {
  state: State,
  waiters: VecDeque<Waker>,
}

/// A fetch in progress for one key.
///
/// Every caller that resolves the key while the fetch runs awaits the same
/// `InflightFetch`, so they all observe one outcome.
pub(crate) struct InflightFetch {
  inner: Mutex<Inner>,
}

impl InflightFetch {
  /// Creates a new `InflightFetch` in the "Fetching" state.
  pub(crate) fn new() -> Self {
    Self {
      inner: Mutex::new(Inner {
        state: State::Fetching,
        waiters: VecDeque::new(),
      }),
    }
  }

  /// Settles the fetch, waking all waiters. Only the first call has effect.
  pub(crate) fn complete(&self, outcome: FetchOutcome) {
    let waiters = {
      let mut inner = self.inner.lock();
      if matches!(inner.state, State::Settled(_)) {
        return;
      }
      inner.state = State::Settled(outcome);
      inner.waiters.drain(..).collect::<Vec<_>>()
    };
    for waker in waiters {
      waker.wake();
    }
  }

  #[cfg(test)]
  pub(crate) fn is_settled(&self) -> bool {
    matches!(self.inner.lock().state, State::Settled(_))
  }
}

impl Future for &InflightFetch {
  type Output = FetchOutcome;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let mut inner = self.inner.lock();
    match &inner.state {
      State::Settled(outcome) => Poll::Ready(outcome.clone()),
      State::Fetching => {
        if !inner.waiters.iter().any(|w| w.will_wake(cx.waker())) {
          inner.waiters.push_back(cx.waker().clone());
        }
        Poll::Pending
      }
    }
  }
}

type InflightShard = Mutex<HashMap<String, Arc<InflightFetch>>>;

/// The set of fetches currently running, keyed by canonical key.
///
/// Sharded the same way as the store, so a key's in-flight slot and its
/// entry live at the same index.
pub(crate) struct InflightTable {
  shards: Box<[InflightShard]>,
}

impl InflightTable {
  pub(crate) fn new(num_shards: usize) -> Self {
    Self {
      shards: (0..num_shards)
        .map(|_| Mutex::new(HashMap::new()))
        .collect::<Vec<_>>()
        .into_boxed_slice(),
    }
  }

  /// Locks the shard at `index`. Callers hold the guard while deciding
  /// whether to join an existing fetch or register a new one.
  #[inline]
  pub(crate) fn lock(&self, index: usize) -> MutexGuard<'_, HashMap<String, Arc<InflightFetch>>> {
    self.shards[index].lock()
  }

  /// Removes `fetch` from the table if it is still the one registered for
  /// `canonical`.
  pub(crate) fn remove(&self, index: usize, canonical: &str, fetch: &Arc<InflightFetch>) {
    let mut shard = self.shards[index].lock();
    if shard
      .get(canonical)
      .is_some_and(|current| Arc::ptr_eq(current, fetch))
    {
      shard.remove(canonical);
    }
  }

  pub(crate) fn len(&self) -> usize {
    self.shards.iter().map(|s| s.lock().len()).sum()
  }
}
