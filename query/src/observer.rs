use crate::client::QueryClient;
use crate::error::QueryError;
use crate::key::QueryKey;
use crate::listener::Subscription;
use crate::state::{QueryState, RawState};
use crate::time::StaleTime;

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

/// One caller's view of a key.
///
/// The state starts out pending with no data, is updated in place by every
/// transition of the key (including fetches started by other callers and
/// invalidations), and goes away with the observer. Nothing about it is
/// stored in the cache.
///
/// Every update is tagged with the generation of the transition it came
/// from, and an update older than the current one is ignored.
pub struct QueryObserver<T> {
  client: QueryClient,
  key: QueryKey,
  state: Arc<Mutex<Tracked<T>>>,
  _subscription: Subscription,
}

struct Tracked<T> {
  generation: u64,
  state: QueryState<T>,
}

impl<T> Tracked<T> {
  /// Applies `state` unless a newer generation is already shown.
  fn apply(&mut self, generation: u64, state: QueryState<T>) -> bool {
    if generation <= self.generation {
      return false;
    }
    self.generation = generation;
    self.state = state;
    true
  }
}

impl<T: Send + Sync + 'static> QueryObserver<T> {
  pub(crate) fn new(client: QueryClient, key: QueryKey) -> Self {
    let state = Arc::new(Mutex::new(Tracked {
      generation: 0,
      state: QueryState::pending(),
    }));
    let subscription = client.subscribe_raw(
      &key,
      Arc::new({
        let state = Arc::clone(&state);
        move |generation: u64, next: &RawState| {
          if let Some(typed) = next.typed::<T>() {
            state.lock().apply(generation, typed);
          }
        }
      }),
    );

    Self {
      client,
      key,
      state,
      _subscription: subscription,
    }
  }

  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  /// A snapshot of the current state.
  pub fn state(&self) -> QueryState<T> {
    self.state.lock().state.clone()
  }

  /// Resolves the observed key and returns the state it settled in.
  ///
  /// Fetch transitions reach this observer through its subscription; a
  /// fresh cache hit is applied directly since it is not broadcast, unless
  /// the observer already shows a newer transition.
  pub async fn resolve<F, Fut, E>(&self, fetch: F, stale_time: impl Into<StaleTime>) -> Result<QueryState<T>, QueryError>
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<Box<dyn StdError + Send + Sync + 'static>>,
  {
    let (state, hit) = self
      .client
      .resolve_key(&self.key, fetch, stale_time.into())
      .await?;
    if let Some(generation) = hit {
      self.state.lock().apply(generation, state.clone());
    }
    Ok(state)
  }

  /// Invalidates the observed key. See `QueryClient::invalidate`.
  pub async fn refetch(&self) -> bool {
    self.client.invalidate_key(&self.key).await
  }
}

impl<T: fmt::Debug> fmt::Debug for QueryObserver<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueryObserver")
      .field("key", &self.key)
      .field("state", &self.state.lock().state)
      .finish_non_exhaustive()
  }
}
