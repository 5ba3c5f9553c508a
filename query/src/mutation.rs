//! Side-effecting requests (create, update, delete) with lifecycle hooks.
//!
//! Mutations are never cached and never deduplicated. Each `mutate` call runs
//! the function once and reports through the hooks in a fixed order:
//! `on_mutate`, then `on_success` or `on_error`, then `on_settled` with the
//! outcome either way. The outcome is also returned, so `?` works on it.

use crate::error::FetchError;

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tracing::debug;

type MutationFn<P, R> = Arc<dyn Fn(P) -> BoxFuture<'static, Result<R, FetchError>> + Send + Sync>;

/// The observable state of a mutation.
pub struct MutationState<R> {
  pub is_loading: bool,
  pub data: Option<Arc<R>>,
  pub error: Option<FetchError>,
}

impl<R> MutationState<R> {
  pub fn idle() -> Self {
    Self {
      is_loading: false,
      data: None,
      error: None,
    }
  }

  #[inline]
  pub fn is_success(&self) -> bool {
    !self.is_loading && self.data.is_some()
  }

  #[inline]
  pub fn is_error(&self) -> bool {
    !self.is_loading && self.error.is_some()
  }
}

impl<R> Clone for MutationState<R> {
  fn clone(&self) -> Self {
    Self {
      is_loading: self.is_loading,
      data: self.data.clone(),
      error: self.error.clone(),
    }
  }
}

impl<R> Default for MutationState<R> {
  fn default() -> Self {
    Self::idle()
  }
}

impl<R: fmt::Debug> fmt::Debug for MutationState<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MutationState")
      .field("is_loading", &self.is_loading)
      .field("data", &self.data)
      .field("error", &self.error)
      .finish()
  }
}

/// A mutation function together with its hooks and its latest state.
pub struct Mutation<P, R> {
  mutation_fn: MutationFn<P, R>,
  on_mutate: Option<Box<dyn Fn(&P) + Send + Sync>>,
  on_success: Option<Box<dyn Fn(&R) + Send + Sync>>,
  on_error: Option<Box<dyn Fn(&FetchError) + Send + Sync>>,
  on_settled: Option<Box<dyn Fn(Option<&R>, Option<&FetchError>) + Send + Sync>>,
  state: Mutex<MutationState<R>>,
}

impl<P, R> Mutation<P, R>
where
  P: Send + 'static,
  R: Send + Sync + 'static,
{
  pub fn new<F, Fut, E>(mutation_fn: F) -> Self
  where
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    E: Into<Box<dyn StdError + Send + Sync + 'static>>,
  {
    let mutation_fn: MutationFn<P, R> = Arc::new(move |params| {
      let fut = mutation_fn(params);
      async move { fut.await.map_err(FetchError::new) }.boxed()
    });

    Self {
      mutation_fn,
      on_mutate: None,
      on_success: None,
      on_error: None,
      on_settled: None,
      state: Mutex::new(MutationState::idle()),
    }
  }

  /// Called with the parameters right before the mutation function runs.
  pub fn on_mutate(mut self, hook: impl Fn(&P) + Send + Sync + 'static) -> Self {
    self.on_mutate = Some(Box::new(hook));
    self
  }

  pub fn on_success(mut self, hook: impl Fn(&R) + Send + Sync + 'static) -> Self {
    self.on_success = Some(Box::new(hook));
    self
  }

  pub fn on_error(mut self, hook: impl Fn(&FetchError) + Send + Sync + 'static) -> Self {
    self.on_error = Some(Box::new(hook));
    self
  }

  /// Called after `on_success` or `on_error`, whatever the outcome, with the
  /// data on success or the error on failure.
  pub fn on_settled(mut self, hook: impl Fn(Option<&R>, Option<&FetchError>) + Send + Sync + 'static) -> Self {
    self.on_settled = Some(Box::new(hook));
    self
  }

  /// A snapshot of the latest state.
  pub fn state(&self) -> MutationState<R> {
    self.state.lock().clone()
  }

  /// Runs the mutation once and returns its data or its error. The settled
  /// state stays readable through `state()`.
  ///
  /// Failures are not retried.
  pub async fn mutate(&self, params: P) -> Result<Arc<R>, FetchError> {
    *self.state.lock() = MutationState {
      is_loading: true,
      data: None,
      error: None,
    };

    if let Some(hook) = &self.on_mutate {
      hook(&params);
    }

    let outcome = (self.mutation_fn)(params).await;

    let result = match outcome {
      Ok(data) => {
        debug!("mutation succeeded");
        let data = Arc::new(data);
        if let Some(hook) = &self.on_success {
          hook(&*data);
        }
        Ok(data)
      }
      Err(error) => {
        debug!(%error, "mutation failed");
        if let Some(hook) = &self.on_error {
          hook(&error);
        }
        Err(error)
      }
    };

    if let Some(hook) = &self.on_settled {
      hook(result.as_deref().ok(), result.as_ref().err());
    }

    *self.state.lock() = MutationState {
      is_loading: false,
      data: result.as_ref().ok().cloned(),
      error: result.as_ref().err().cloned(),
    };
    result
  }
}

impl<P, R: fmt::Debug> fmt::Debug for Mutation<P, R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Mutation")
      .field("state", &*self.state.lock())
      .finish_non_exhaustive()
  }
}
