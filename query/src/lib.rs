//! A small, concurrent, async data-fetching cache.
//!
//! Results of async fetch functions are memoized under structured keys,
//! served while fresh, and refetched once stale.
//!
//! # Features
//! - **Structured keys**: any value that serializes to a JSON array. Object
//!   properties are compared independently of their order.
//! - **Staleness**: per-call `StaleTime`, from "always refetch" to "never".
//! - **Single-flight**: concurrent requests for one key share one fetch.
//! - **Observable state**: `QueryState` (pending, success, error), per-key
//!   subscriptions and per-caller observers.
//! - **Invalidation**: refetch a key on demand with the fetch function that
//!   produced its data.
//! - **Mutations**: side-effecting calls with lifecycle hooks.
//!
//! # Example
//!
//! ```no_run
//! use fibre_query::{QueryClient, StaleTime};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), fibre_query::QueryError> {
//! let client = QueryClient::new();
//! let state = client
//!   .resolve(
//!     &("todos", 1),
//!     || async { Ok::<_, std::io::Error>(vec!["write docs"]) },
//!     Duration::from_secs(30),
//!   )
//!   .await?;
//! assert!(state.is_success());
//!
//! // Forces a refetch with the function above.
//! client.invalidate(&("todos", 1)).await?;
//! # Ok(())
//! # }
//! ```

// Public modules that form the API
pub mod builder;
pub mod error;
pub mod key;
pub mod listener;
pub mod metrics;
pub mod mutation;
pub mod observer;
pub mod runtime;
pub mod state;
pub mod time;

// Internal, crate-only modules
mod client;
mod coordinator;
mod entry;
mod inflight;
mod shared;
mod store;

#[cfg(feature = "tokio")]
mod global;

// Re-export the primary user-facing types for convenience
pub use builder::QueryClientBuilder;
pub use client::QueryClient;
pub use error::{BuildError, FetchError, QueryError};
pub use key::{canonicalize, QueryKey};
pub use listener::{QueryListener, Subscription};
pub use metrics::MetricsSnapshot;
pub use mutation::{Mutation, MutationState};
pub use observer::QueryObserver;
pub use runtime::TaskSpawner;
pub use state::{QueryState, QueryStatus};
pub use time::{Clock, ManualClock, StaleTime, SystemClock};

#[cfg(feature = "tokio")]
pub use global::global;
#[cfg(feature = "tokio")]
pub use runtime::TokioSpawner;
