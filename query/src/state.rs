use crate::entry::AnyData;
use crate::error::FetchError;

use std::fmt;
use std::sync::Arc;

/// Where a resolution currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStatus {
  /// A fetch is running, or nothing has been resolved yet.
  Pending,
  /// The data is available.
  Success,
  /// The last fetch failed.
  Error,
}

impl fmt::Display for QueryStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      QueryStatus::Pending => write!(f, "pending"),
      QueryStatus::Success => write!(f, "success"),
      QueryStatus::Error => write!(f, "error"),
    }
  }
}

/// The observable state of a query for one caller.
///
/// `data` is shared with the cache, so cloning a state never clones `T`.
/// When a fetch fails, `data` still holds whatever value was cached before
/// the failure (if any).
pub struct QueryState<T> {
  pub status: QueryStatus,
  pub data: Option<Arc<T>>,
  pub error: Option<FetchError>,
}

impl<T> QueryState<T> {
  /// The initial state: pending, with neither data nor error.
  pub fn pending() -> Self {
    Self {
      status: QueryStatus::Pending,
      data: None,
      error: None,
    }
  }

  pub fn success(data: Arc<T>) -> Self {
    Self {
      status: QueryStatus::Success,
      data: Some(data),
      error: None,
    }
  }

  pub fn error(error: FetchError, data: Option<Arc<T>>) -> Self {
    Self {
      status: QueryStatus::Error,
      data,
      error: Some(error),
    }
  }

  #[inline]
  pub fn is_loading(&self) -> bool {
    self.status == QueryStatus::Pending
  }

  #[inline]
  pub fn is_success(&self) -> bool {
    self.status == QueryStatus::Success
  }

  #[inline]
  pub fn is_error(&self) -> bool {
    self.status == QueryStatus::Error
  }

  /// Borrows the data, if any.
  pub fn data(&self) -> Option<&T> {
    self.data.as_deref()
  }
}

impl<T> Clone for QueryState<T> {
  fn clone(&self) -> Self {
    Self {
      status: self.status,
      data: self.data.clone(),
      error: self.error.clone(),
    }
  }
}

impl<T> Default for QueryState<T> {
  fn default() -> Self {
    Self::pending()
  }
}

impl<T: fmt::Debug> fmt::Debug for QueryState<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueryState")
      .field("status", &self.status)
      .field("data", &self.data)
      .field("error", &self.error)
      .finish()
  }
}

/// A state transition as broadcast to subscribers, before it is narrowed to
/// the subscriber's data type.
#[derive(Clone)]
pub(crate) struct RawState {
  pub(crate) status: QueryStatus,
  pub(crate) data: Option<AnyData>,
  pub(crate) error: Option<FetchError>,
}

impl RawState {
  pub(crate) fn pending(data: Option<AnyData>) -> Self {
    Self {
      status: QueryStatus::Pending,
      data,
      error: None,
    }
  }

  pub(crate) fn success(data: AnyData) -> Self {
    Self {
      status: QueryStatus::Success,
      data: Some(data),
      error: None,
    }
  }

  pub(crate) fn error(error: FetchError, data: Option<AnyData>) -> Self {
    Self {
      status: QueryStatus::Error,
      data,
      error: Some(error),
    }
  }

  /// Narrows the state to `T`. Returns `None` if the data is of another type.
  pub(crate) fn typed<T: Send + Sync + 'static>(&self) -> Option<QueryState<T>> {
    let data = match &self.data {
      Some(any) => Some(any.clone().downcast::<T>().ok()?),
      None => None,
    };
    Some(QueryState {
      status: self.status,
      data,
      error: self.error.clone(),
    })
  }
}
