use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Errors that can occur when building a `QueryClient`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
  /// The client was configured with zero shards, which is not allowed.
  #[error("shard count cannot be zero")]
  ZeroShards,
  /// No `TaskSpawner` was configured and the default `tokio` feature is not
  /// enabled, so fetches would have nowhere to run.
  #[error("fetching requires a task spawner or the 'tokio' feature")]
  SpawnerRequired,
}

/// Errors reported synchronously by the `QueryClient` API.
///
/// A failing fetch function is *not* one of these when going through
/// `resolve`; it is surfaced in `QueryState::error` instead. Only
/// `fetch_query` turns a fetch failure into `QueryError::Fetch`.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
  /// A key part could not be turned into JSON (for example a map whose keys
  /// are not strings).
  #[error("query key could not be serialized: {0}")]
  InvalidKey(#[source] serde_json::Error),
  /// The key serialized to something other than a sequence of parts.
  #[error("query key must serialize to a sequence of parts, got {found}")]
  NotASequence { found: &'static str },
  /// The data cached under the key was produced by a fetch of another type.
  #[error("data cached under {key} is not a `{expected}`")]
  TypeMismatch { key: String, expected: &'static str },
  /// The fetch function failed.
  #[error(transparent)]
  Fetch(FetchError),
}

/// The failure produced by a fetch or mutation function, kept verbatim.
///
/// Cloning is cheap; every observer of a failed fetch shares the same error.
#[derive(Clone)]
pub struct FetchError {
  inner: Arc<dyn StdError + Send + Sync + 'static>,
}

impl FetchError {
  /// Wraps any error (or anything convertible into a boxed error, such as a
  /// `String` or `&str`).
  pub fn new<E>(error: E) -> Self
  where
    E: Into<Box<dyn StdError + Send + Sync + 'static>>,
  {
    Self {
      inner: Arc::from(error.into()),
    }
  }

  /// The error message of the original failure.
  pub fn message(&self) -> String {
    self.inner.to_string()
  }

  /// Returns a reference to the original error.
  pub fn get_ref(&self) -> &(dyn StdError + Send + Sync + 'static) {
    &*self.inner
  }

  /// Attempts to downcast the original error to a concrete type.
  pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
    self.inner.downcast_ref::<E>()
  }
}

impl fmt::Debug for FetchError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(&*self.inner, f)
  }
}

impl fmt::Display for FetchError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&*self.inner, f)
  }
}

impl StdError for FetchError {
  fn source(&self) -> Option<&(dyn StdError + 'static)> {
    self.inner.source()
  }
}
