use crate::builder::QueryClientBuilder;
use crate::coordinator::Resolution;
use crate::entry::{AnyData, Fetcher, QueryEntry};
use crate::error::{FetchError, QueryError};
use crate::key::QueryKey;
use crate::listener::{QueryListener, RawListener, Subscription};
use crate::metrics::Metrics;
use crate::observer::QueryObserver;
use crate::shared::ClientShared;
use crate::state::{QueryState, RawState};
use crate::time::StaleTime;
use crate::MetricsSnapshot;

use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use serde::Serialize;
use tracing::debug;

/// A handle to a query cache.
///
/// Cloning is cheap and every clone shares the same cache, in-flight fetches
/// and subscribers. Keys are anything that serializes to a JSON array, e.g.
/// `&("todos", 1)` or `&json!(["user", {"id": 7}])`.
#[derive(Debug, Clone)]
pub struct QueryClient {
  pub(crate) shared: Arc<ClientShared>,
}

/// Turns a caller's fetch function into the type-erased form the cache stores.
fn erase_fetcher<T, F, Fut, E>(fetch: F) -> Fetcher
where
  T: Send + Sync + 'static,
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<T, E>> + Send + 'static,
  E: Into<Box<dyn StdError + Send + Sync + 'static>>,
{
  Arc::new(move || {
    let fut = fetch();
    async move {
      fut
        .await
        .map(|data| Arc::new(data) as AnyData)
        .map_err(FetchError::new)
    }
    .boxed()
  })
}

fn type_mismatch<T>(key: &QueryKey) -> QueryError {
  QueryError::TypeMismatch {
    key: key.canonical().to_string(),
    expected: std::any::type_name::<T>(),
  }
}

impl QueryClient {
  /// Starts building a client with custom configuration.
  pub fn builder() -> QueryClientBuilder {
    QueryClientBuilder::new()
  }

  /// Creates a client with default settings, spawning fetches on Tokio.
  #[cfg(feature = "tokio")]
  pub fn new() -> Self {
    QueryClientBuilder::new().assemble(Arc::new(crate::runtime::TokioSpawner::ambient()))
  }

  /// Resolves `key`: serves cached data while it is fresh for `stale_time`,
  /// otherwise runs `fetch` (or joins a fetch already running for the key)
  /// and waits for it to settle.
  ///
  /// A failing fetch is not an `Err`: it comes back as a state with
  /// `status == Error`, the failure in `error`, and `data` holding whatever
  /// was cached before. The cache entry itself is left untouched.
  ///
  /// The fetch runs on a spawned task. Dropping the returned future does not
  /// cancel it; its result is still cached.
  pub async fn resolve<K, T, F, Fut, E>(
    &self,
    key: &K,
    fetch: F,
    stale_time: impl Into<StaleTime>,
  ) -> Result<QueryState<T>, QueryError>
  where
    K: Serialize + ?Sized,
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<Box<dyn StdError + Send + Sync + 'static>>,
  {
    let key = QueryKey::new(key)?;
    let (state, _) = self
      .resolve_key(&key, fetch, stale_time.into())
      .await?;
    Ok(state)
  }

  /// Like `resolve`, using the client's default stale time.
  pub async fn resolve_default<K, T, F, Fut, E>(&self, key: &K, fetch: F) -> Result<QueryState<T>, QueryError>
  where
    K: Serialize + ?Sized,
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<Box<dyn StdError + Send + Sync + 'static>>,
  {
    self
      .resolve(key, fetch, self.shared.default_stale_time)
      .await
  }

  /// Like `resolve`, but hands back the data itself and turns a failed
  /// fetch into `QueryError::Fetch`.
  pub async fn fetch_query<K, T, F, Fut, E>(
    &self,
    key: &K,
    fetch: F,
    stale_time: impl Into<StaleTime>,
  ) -> Result<Arc<T>, QueryError>
  where
    K: Serialize + ?Sized,
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<Box<dyn StdError + Send + Sync + 'static>>,
  {
    let state = self.resolve(key, fetch, stale_time).await?;
    match (state.data, state.error) {
      (_, Some(error)) => Err(QueryError::Fetch(error)),
      (Some(data), None) => Ok(data),
      (None, None) => Err(QueryError::Fetch(FetchError::new(
        "fetch settled without data",
      ))),
    }
  }

  /// The typed resolve. When the state came from a fresh cache hit rather
  /// than a fetch, also returns the generation the hit entry was written at.
  pub(crate) async fn resolve_key<T, F, Fut, E>(
    &self,
    key: &QueryKey,
    fetch: F,
    stale_time: StaleTime,
  ) -> Result<(QueryState<T>, Option<u64>), QueryError>
  where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<Box<dyn StdError + Send + Sync + 'static>>,
  {
    let fetch = match self
      .shared
      .begin_resolve(key, stale_time, move || erase_fetcher::<T, F, Fut, E>(fetch))
    {
      Resolution::Fresh(entry) => {
        let data = entry.data_as::<T>().ok_or_else(|| type_mismatch::<T>(key))?;
        return Ok((QueryState::success(data), Some(entry.generation)));
      }
      Resolution::Fetch(fetch) => fetch,
    };

    let state = match (&*fetch).await {
      Ok(data) => {
        let data = data.downcast::<T>().map_err(|_| type_mismatch::<T>(key))?;
        QueryState::success(data)
      }
      Err(error) => {
        let previous = self
          .shared
          .store
          .get(key.canonical())
          .and_then(|entry| entry.data_as::<T>());
        QueryState::error(error, previous)
      }
    };
    Ok((state, None))
  }

  /// Forces a refetch of `key` with the fetch function that produced its
  /// cached data, regardless of staleness, and waits for it to settle.
  ///
  /// Returns `Ok(false)` without fetching when nothing is cached for the key
  /// (or the data was written with `set_query_data` and has no fetcher). If a
  /// fetch for the key is already running, this waits for that one instead.
  pub async fn invalidate<K>(&self, key: &K) -> Result<bool, QueryError>
  where
    K: Serialize + ?Sized,
  {
    let key = QueryKey::new(key)?;
    Ok(self.invalidate_key(&key).await)
  }

  pub(crate) async fn invalidate_key(&self, key: &QueryKey) -> bool {
    match self.shared.begin_invalidate(key) {
      Some(fetch) => {
        // The outcome has already been published to the cache and listeners.
        let _ = (&*fetch).await;
        true
      }
      None => false,
    }
  }

  /// Reads the cached data for `key` without fetching and regardless of
  /// staleness.
  pub fn peek<K, T>(&self, key: &K) -> Result<Option<Arc<T>>, QueryError>
  where
    K: Serialize + ?Sized,
    T: Send + Sync + 'static,
  {
    let key = QueryKey::new(key)?;
    match self.shared.store.get(key.canonical()) {
      Some(entry) => entry
        .data_as::<T>()
        .map(Some)
        .ok_or_else(|| type_mismatch::<T>(&key)),
      None => Ok(None),
    }
  }

  /// Whether anything is cached for `key`.
  pub fn contains<K>(&self, key: &K) -> Result<bool, QueryError>
  where
    K: Serialize + ?Sized,
  {
    let key = QueryKey::new(key)?;
    Ok(self.shared.store.has(key.canonical()))
  }

  /// When the cached data for `key` was last written.
  pub fn data_updated_at<K>(&self, key: &K) -> Result<Option<Instant>, QueryError>
  where
    K: Serialize + ?Sized,
  {
    let key = QueryKey::new(key)?;
    Ok(
      self
        .shared
        .store
        .get(key.canonical())
        .map(|entry| entry.updated_at),
    )
  }

  /// Writes data for `key` directly, as if a fetch had just returned it.
  ///
  /// A fetcher already stored for the key is kept, so the key can still be
  /// invalidated. Subscribers receive a success transition.
  pub fn set_query_data<K, T>(&self, key: &K, data: T) -> Result<(), QueryError>
  where
    K: Serialize + ?Sized,
    T: Send + Sync + 'static,
  {
    let key = QueryKey::new(key)?;
    let canonical = key.canonical();
    let data: AnyData = Arc::new(data);
    let now = self.shared.clock.now();

    let generation = self.shared.store.set(canonical.to_string(), |previous, generation| {
      let fetcher = previous.and_then(|entry| entry.fetcher.clone());
      QueryEntry::new(data.clone(), fetcher, now, generation)
    });
    Metrics::incr(&self.shared.metrics.direct_writes);
    debug!(key = %key, generation, "query data set directly");

    self
      .shared
      .listeners
      .notify(canonical, generation, &RawState::success(data));
    Ok(())
  }

  /// Drops the cached entry for `key`; the next resolve fetches. Subscribers
  /// receive a pending transition. Returns whether an entry existed.
  pub fn reset<K>(&self, key: &K) -> Result<bool, QueryError>
  where
    K: Serialize + ?Sized,
  {
    let key = QueryKey::new(key)?;
    match self.shared.store.remove(key.canonical()) {
      Some(generation) => {
        debug!(key = %key, generation, "query reset");
        self
          .shared
          .listeners
          .notify(key.canonical(), generation, &RawState::pending(None));
        Ok(true)
      }
      None => Ok(false),
    }
  }

  /// Removes every cached entry. Fetches already running still complete and
  /// repopulate their keys. Subscribers are not notified.
  pub fn clear(&self) {
    let removed = self.shared.store.clear();
    debug!(removed, "query cache cleared");
  }

  /// Number of cached entries.
  pub fn len(&self) -> usize {
    self.shared.store.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Subscribes `listener` to the state transitions of `key`.
  ///
  /// Transitions whose data is not a `T` are skipped. The listener stays
  /// attached until the returned `Subscription` is dropped or unsubscribed.
  pub fn subscribe<K, T, L>(&self, key: &K, listener: L) -> Result<Subscription, QueryError>
  where
    K: Serialize + ?Sized,
    T: Send + Sync + 'static,
    L: QueryListener<T> + 'static,
  {
    let key = QueryKey::new(key)?;
    Ok(self.subscribe_key(&key, listener))
  }

  pub(crate) fn subscribe_key<T, L>(&self, key: &QueryKey, listener: L) -> Subscription
  where
    T: Send + Sync + 'static,
    L: QueryListener<T> + 'static,
  {
    self.subscribe_raw(
      key,
      Arc::new(move |_: u64, state: &RawState| {
        if let Some(typed) = state.typed::<T>() {
          listener.on_change(&typed);
        }
      }),
    )
  }

  pub(crate) fn subscribe_raw(&self, key: &QueryKey, listener: RawListener) -> Subscription {
    let (canonical, index) = self
      .shared
      .listeners
      .register(key.canonical().to_string(), listener);
    Subscription::new(&self.shared.listeners, canonical, index)
  }

  /// Number of listeners currently subscribed to `key`, observers included.
  pub fn subscriber_count<K>(&self, key: &K) -> Result<usize, QueryError>
  where
    K: Serialize + ?Sized,
  {
    let key = QueryKey::new(key)?;
    Ok(self.shared.listeners.count(key.canonical()))
  }

  /// Creates an observer for `key`: a per-caller `QueryState` that starts out
  /// pending and follows every transition of the key until dropped.
  pub fn observer<K, T>(&self, key: &K) -> Result<QueryObserver<T>, QueryError>
  where
    K: Serialize + ?Sized,
    T: Send + Sync + 'static,
  {
    let key = QueryKey::new(key)?;
    Ok(QueryObserver::new(self.clone(), key))
  }

  /// The stale time used by `resolve_default`.
  pub fn default_stale_time(&self) -> StaleTime {
    self.shared.default_stale_time
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.metrics.snapshot()
  }
}

#[cfg(feature = "tokio")]
impl Default for QueryClient {
  fn default() -> Self {
    Self::new()
  }
}
