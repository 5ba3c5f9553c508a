use crate::client::QueryClient;
use crate::error::BuildError;
use crate::inflight::InflightTable;
use crate::listener::ListenerRegistry;
use crate::metrics::Metrics;
use crate::shared::ClientShared;
use crate::store::QueryStore;
use crate::time::{Clock, StaleTime, SystemClock};
use crate::TaskSpawner;

use core::fmt;
use std::sync::Arc;

/// A builder for creating `QueryClient` instances.
pub struct QueryClientBuilder {
  pub(crate) shards: usize,
  pub(crate) default_stale_time: StaleTime,
  spawner: Option<Arc<dyn TaskSpawner>>,
  clock: Option<Arc<dyn Clock>>,
}

impl fmt::Debug for QueryClientBuilder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueryClientBuilder")
      .field("shards", &self.shards)
      .field("default_stale_time", &self.default_stale_time)
      .field("has_spawner", &self.spawner.is_some())
      .field("has_clock", &self.clock.is_some())
      .finish()
  }
}

impl QueryClientBuilder {
  /// Creates a new `QueryClientBuilder` with default settings.
  pub fn new() -> Self {
    Self {
      shards: (num_cpus::get() * 4).max(1).next_power_of_two(),
      default_stale_time: StaleTime::DEFAULT,
      spawner: None,
      clock: None,
    }
  }

  /// Sets the number of concurrent shards for the cache and the in-flight
  /// table. Rounded up to a power of two.
  pub fn shards(mut self, shards: usize) -> Self {
    self.shards = shards.max(1).next_power_of_two();
    self
  }

  /// Sets the stale time used by `resolve_default`. Defaults to one second.
  pub fn default_stale_time(mut self, stale_time: impl Into<StaleTime>) -> Self {
    self.default_stale_time = stale_time.into();
    self
  }

  /// Sets where fetch tasks are spawned.
  ///
  /// Defaults to the current Tokio runtime at spawn time when the `tokio`
  /// feature is enabled.
  pub fn spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
    self.spawner = Some(spawner);
    self
  }

  /// Sets the clock used for staleness and `updated_at` stamps.
  pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = Some(clock);
    self
  }

  /// Builds the client.
  pub fn build(mut self) -> Result<QueryClient, BuildError> {
    self.validate()?;

    let spawner: Arc<dyn TaskSpawner> = match self.spawner.take() {
      Some(spawner) => spawner,
      #[cfg(feature = "tokio")]
      None => Arc::new(crate::runtime::TokioSpawner::ambient()),
      #[cfg(not(feature = "tokio"))]
      None => return Err(BuildError::SpawnerRequired),
    };

    Ok(self.assemble(spawner))
  }

  /// Constructs the shared core once the configuration is known to be valid.
  pub(crate) fn assemble(self, spawner: Arc<dyn TaskSpawner>) -> QueryClient {
    let shared = ClientShared {
      store: QueryStore::new(self.shards, ahash::RandomState::new()),
      inflight: InflightTable::new(self.shards),
      listeners: Arc::new(ListenerRegistry::default()),
      metrics: Metrics::new(),
      spawner,
      clock: self
        .clock
        .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>),
      default_stale_time: self.default_stale_time,
    };

    QueryClient {
      shared: Arc::new(shared),
    }
  }

  /// Validates the builder configuration.
  pub(crate) fn validate(&self) -> Result<(), BuildError> {
    if self.shards == 0 {
      return Err(BuildError::ZeroShards);
    }
    Ok(())
  }
}

impl Default for QueryClientBuilder {
  fn default() -> Self {
    Self::new()
  }
}
