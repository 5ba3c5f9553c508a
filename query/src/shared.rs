use crate::inflight::InflightTable;
use crate::listener::ListenerRegistry;
use crate::metrics::Metrics;
use crate::store::QueryStore;
use crate::time::{Clock, StaleTime};
use crate::TaskSpawner;

use std::fmt;
use std::sync::Arc;

/// The internal, thread-safe core shared by every clone of a `QueryClient`.
pub(crate) struct ClientShared {
  pub(crate) store: QueryStore,
  pub(crate) inflight: InflightTable,
  pub(crate) listeners: Arc<ListenerRegistry>,
  pub(crate) metrics: Metrics,
  pub(crate) spawner: Arc<dyn TaskSpawner>,
  pub(crate) clock: Arc<dyn Clock>,
  pub(crate) default_stale_time: StaleTime,
}

impl fmt::Debug for ClientShared {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ClientShared")
      .field("store", &self.store)
      .field("in_flight", &self.inflight.len())
      .field("default_stale_time", &self.default_stale_time)
      .field("metrics", &self.metrics.snapshot())
      .finish_non_exhaustive()
  }
}
