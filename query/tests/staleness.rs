mod common;

use common::{build_test_client, calls, counting_fetch};
use fibre_query::{QueryStatus, StaleTime};

use std::sync::{atomic::AtomicUsize, Arc};
use std::time::Duration;

#[tokio::test]
async fn test_first_resolve_fetches_and_caches() {
  let (client, _clock) = build_test_client();
  let count = Arc::new(AtomicUsize::new(0));

  let state = client
    .resolve(&("todos",), counting_fetch(&count, "data".to_string()), StaleTime::from_millis(100))
    .await
    .unwrap();

  assert_eq!(state.status, QueryStatus::Success);
  assert!(state.is_success() && !state.is_loading() && !state.is_error());
  assert_eq!(state.data().map(String::as_str), Some("data"));
  assert!(state.error.is_none());
  assert_eq!(calls(&count), 1);

  let cached: Option<Arc<String>> = client.peek(&("todos",)).unwrap();
  assert_eq!(cached.as_deref().map(String::as_str), Some("data"));
}

#[tokio::test]
async fn test_fresh_entry_short_circuits_and_stale_entry_refetches() {
  let (client, clock) = build_test_client();
  let count = Arc::new(AtomicUsize::new(0));
  let key = ("todos", 1);
  let stale_time = StaleTime::from_millis(100);

  client
    .resolve(&key, counting_fetch(&count, "data"), stale_time)
    .await
    .unwrap();
  assert_eq!(calls(&count), 1);

  // 10ms later the entry is fresh.
  clock.advance(Duration::from_millis(10));
  let state = client
    .resolve(&key, counting_fetch(&count, "data"), stale_time)
    .await
    .unwrap();
  assert_eq!(state.data(), Some(&"data"));
  assert_eq!(calls(&count), 1, "fresh entry must not invoke the fetch function");

  // 110ms after caching it is stale.
  clock.advance(Duration::from_millis(100));
  let state = client
    .resolve(&key, counting_fetch(&count, "data"), stale_time)
    .await
    .unwrap();
  assert!(state.is_success());
  assert_eq!(calls(&count), 2, "stale entry must be refetched exactly once");

  let metrics = client.metrics();
  assert_eq!(metrics.hits, 1);
  assert_eq!(metrics.misses, 2);
  assert_eq!(metrics.fetches, 2);
}

#[tokio::test]
async fn test_age_equal_to_stale_time_is_fresh() {
  let (client, clock) = build_test_client();
  let count = Arc::new(AtomicUsize::new(0));

  client
    .resolve(&["k"], counting_fetch(&count, 1u32), StaleTime::from_millis(100))
    .await
    .unwrap();
  clock.advance(Duration::from_millis(100));
  client
    .resolve(&["k"], counting_fetch(&count, 1u32), StaleTime::from_millis(100))
    .await
    .unwrap();
  assert_eq!(calls(&count), 1);

  clock.advance(Duration::from_millis(1));
  client
    .resolve(&["k"], counting_fetch(&count, 1u32), StaleTime::from_millis(100))
    .await
    .unwrap();
  assert_eq!(calls(&count), 2);
}

#[tokio::test]
async fn test_zero_stale_time_always_refetches() {
  let (client, _clock) = build_test_client();
  let count = Arc::new(AtomicUsize::new(0));

  for expected in 1..=3 {
    let state = client
      .resolve(&["always"], counting_fetch(&count, expected), StaleTime::ZERO)
      .await
      .unwrap();
    assert_eq!(state.data(), Some(&expected));
    assert_eq!(calls(&count), expected);
  }
}

#[tokio::test]
async fn test_never_stale_time_keeps_data_resident() {
  let (client, clock) = build_test_client();
  let count = Arc::new(AtomicUsize::new(0));

  client
    .resolve(&["forever"], counting_fetch(&count, "v1"), StaleTime::Never)
    .await
    .unwrap();

  clock.advance(Duration::from_secs(60 * 60 * 24 * 365));
  let state = client
    .resolve(&["forever"], counting_fetch(&count, "v2"), StaleTime::Never)
    .await
    .unwrap();

  assert_eq!(state.data(), Some(&"v1"));
  assert_eq!(calls(&count), 1);
}

#[tokio::test]
async fn test_stale_time_is_per_call() {
  let (client, clock) = build_test_client();
  let count = Arc::new(AtomicUsize::new(0));

  client
    .resolve(&["mixed"], counting_fetch(&count, 0u8), StaleTime::from_millis(100))
    .await
    .unwrap();
  clock.advance(Duration::from_millis(50));

  // Fresh for a 100ms caller, stale for a 10ms caller.
  client
    .resolve(&["mixed"], counting_fetch(&count, 0u8), Duration::from_millis(100))
    .await
    .unwrap();
  assert_eq!(calls(&count), 1);
  client
    .resolve(&["mixed"], counting_fetch(&count, 0u8), Duration::from_millis(10))
    .await
    .unwrap();
  assert_eq!(calls(&count), 2);
}

#[tokio::test]
async fn test_resolve_default_uses_configured_stale_time() {
  let client = fibre_query::QueryClient::builder()
    .default_stale_time(StaleTime::ZERO)
    .build()
    .unwrap();
  let count = Arc::new(AtomicUsize::new(0));

  client.resolve_default(&["d"], counting_fetch(&count, 1)).await.unwrap();
  client.resolve_default(&["d"], counting_fetch(&count, 1)).await.unwrap();
  assert_eq!(calls(&count), 2);
}

#[tokio::test]
async fn test_fetch_query_returns_cached_data() {
  let (client, _clock) = build_test_client();
  let count = Arc::new(AtomicUsize::new(0));

  let first = client
    .fetch_query(&["fq"], counting_fetch(&count, "data".to_string()), StaleTime::Never)
    .await
    .unwrap();
  let second = client
    .fetch_query(&["fq"], counting_fetch(&count, "other".to_string()), StaleTime::Never)
    .await
    .unwrap();

  assert!(Arc::ptr_eq(&first, &second));
  assert_eq!(calls(&count), 1);
}
