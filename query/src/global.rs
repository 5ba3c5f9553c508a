//! The process-wide default client.

use crate::client::QueryClient;
use crate::runtime::TokioSpawner;

use std::sync::Arc;

use once_cell::sync::Lazy;

// Created on first access. The ambient spawner binds fetches to whichever
// Tokio runtime is current when they start, not to the one that happened to
// be current when the client was created.
static GLOBAL_CLIENT: Lazy<QueryClient> =
  Lazy::new(|| QueryClient::builder().assemble(Arc::new(TokioSpawner::ambient())));

/// Provides a reference to the process-wide client.
///
/// Code that wants isolation (tests in particular) should build its own
/// `QueryClient` instead.
///
/// # Examples
///
/// ```no_run
/// use fibre_query::{global, StaleTime};
///
/// # async fn run() -> Result<(), fibre_query::QueryError> {
/// let state = global()
///   .resolve(&("greeting",), || async { Ok::<_, std::io::Error>("hello") }, StaleTime::Never)
///   .await?;
/// assert_eq!(state.data(), Some(&"hello"));
/// # Ok(())
/// # }
/// ```
pub fn global() -> &'static QueryClient {
  &GLOBAL_CLIENT
}
