use crate::error::FetchError;
use crate::time::StaleTime;

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::BoxFuture;

/// Type-erased cached data.
pub(crate) type AnyData = Arc<dyn Any + Send + Sync>;

/// What a settled fetch produced.
pub(crate) type FetchOutcome = Result<AnyData, FetchError>;

/// A type-erased fetch function, as captured when its result was cached.
pub(crate) type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, FetchOutcome> + Send + Sync>;

/// A container for a cached result and the function that produced it.
pub(crate) struct QueryEntry {
  pub(crate) data: AnyData,
  /// `None` when the data was written directly with `set_query_data` and no
  /// fetch ever populated the key.
  pub(crate) fetcher: Option<Fetcher>,
  pub(crate) updated_at: Instant,
  /// Position of the write in the key's transition order.
  pub(crate) generation: u64,
}

impl QueryEntry {
  pub(crate) fn new(data: AnyData, fetcher: Option<Fetcher>, updated_at: Instant, generation: u64) -> Self {
    Self {
      data,
      fetcher,
      updated_at,
      generation,
    }
  }

  /// Checks the entry's age against `stale_time`.
  #[inline]
  pub(crate) fn is_stale(&self, stale_time: StaleTime, now: Instant) -> bool {
    stale_time.is_stale(now.saturating_duration_since(self.updated_at))
  }

  /// Returns the data as `T`, or `None` if it was cached as another type.
  #[inline]
  pub(crate) fn data_as<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
    self.data.clone().downcast::<T>().ok()
  }
}

impl fmt::Debug for QueryEntry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueryEntry")
      .field("updated_at", &self.updated_at)
      .field("generation", &self.generation)
      .field("has_fetcher", &self.fetcher.is_some())
      .finish_non_exhaustive()
  }
}
