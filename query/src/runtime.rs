use std::{future::Future, pin::Pin};

/// A trait for spawning a future onto an asynchronous runtime.
///
/// Fetches run on spawned tasks so that they finish and populate the cache
/// even when every caller awaiting them has gone away.
pub trait TaskSpawner: Send + Sync + 'static {
  /// Spawns a type-erased future.
  fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>);
}

/// Spawns onto Tokio.
#[cfg(feature = "tokio")]
#[derive(Debug, Clone, Default)]
pub struct TokioSpawner(Option<tokio::runtime::Handle>);

#[cfg(feature = "tokio")]
impl TokioSpawner {
  /// Creates a spawner pinned to the current Tokio runtime.
  /// Panics if called outside of a Tokio runtime.
  pub fn new() -> Self {
    Self(Some(tokio::runtime::Handle::current()))
  }

  /// Creates a spawner pinned to the given runtime.
  pub fn with_handle(handle: tokio::runtime::Handle) -> Self {
    Self(Some(handle))
  }

  /// Creates a spawner that uses whichever runtime is current at the time a
  /// fetch is spawned. This is the default, and the only safe choice for a
  /// client that outlives any single runtime.
  pub fn ambient() -> Self {
    Self(None)
  }
}

#[cfg(feature = "tokio")]
impl TaskSpawner for TokioSpawner {
  fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>) {
    match &self.0 {
      Some(handle) => {
        handle.spawn(future);
      }
      None => {
        tokio::spawn(future);
      }
    }
  }
}
