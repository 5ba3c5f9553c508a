mod common;

use common::{build_test_client, calls, counting_fetch};
use fibre_query::{QueryError, QueryState, QueryStatus, StaleTime};

use std::sync::{atomic::AtomicUsize, Arc};
use std::time::Duration;

use parking_lot::Mutex;

#[tokio::test]
async fn test_set_query_data_is_served_as_fresh_data() {
  let (client, _clock) = build_test_client();
  let count = Arc::new(AtomicUsize::new(0));

  client.set_query_data(&("user", 7), "alice".to_string()).unwrap();
  assert!(client.contains(&("user", 7)).unwrap());

  let state = client
    .resolve(&("user", 7), counting_fetch(&count, "bob".to_string()), StaleTime::from_millis(100))
    .await
    .unwrap();
  assert_eq!(state.data().map(String::as_str), Some("alice"));
  assert_eq!(calls(&count), 0);
  assert_eq!(client.metrics().direct_writes, 1);
}

#[tokio::test]
async fn test_set_query_data_stamps_update_time() {
  let (client, clock) = build_test_client();
  let count = Arc::new(AtomicUsize::new(0));

  client.set_query_data(&["t"], 1u8).unwrap();
  clock.advance(Duration::from_millis(150));

  // Old enough to be stale now.
  client
    .resolve(&["t"], counting_fetch(&count, 2u8), StaleTime::from_millis(100))
    .await
    .unwrap();
  assert_eq!(calls(&count), 1);
  assert_eq!(client.peek::<_, u8>(&["t"]).unwrap().as_deref(), Some(&2));
}

#[tokio::test]
async fn test_set_query_data_notifies_subscribers() {
  let (client, _clock) = build_test_client();
  let seen = Arc::new(Mutex::new(Vec::new()));

  let _subscription = client
    .subscribe(&["s"], {
      let seen = seen.clone();
      move |state: &QueryState<u32>| seen.lock().push((state.status, state.data().copied()))
    })
    .unwrap();
  client.set_query_data(&["s"], 3u32).unwrap();

  assert_eq!(*seen.lock(), vec![(QueryStatus::Success, Some(3))]);
}

#[tokio::test]
async fn test_peek_does_not_fetch_or_count() {
  let (client, _clock) = build_test_client();

  assert_eq!(client.peek::<_, u32>(&["nothing"]).unwrap(), None);
  assert_eq!(client.data_updated_at(&["nothing"]).unwrap(), None);
  let metrics = client.metrics();
  assert_eq!(metrics.hits + metrics.misses + metrics.fetches, 0);
}

#[tokio::test]
async fn test_reset_removes_entry_and_notifies_pending() {
  let (client, _clock) = build_test_client();
  let count = Arc::new(AtomicUsize::new(0));
  let seen = Arc::new(Mutex::new(Vec::new()));

  client
    .resolve(&["r"], counting_fetch(&count, 1u32), StaleTime::Never)
    .await
    .unwrap();
  let _subscription = client
    .subscribe(&["r"], {
      let seen = seen.clone();
      move |state: &QueryState<u32>| seen.lock().push((state.status, state.data().copied()))
    })
    .unwrap();

  assert!(client.reset(&["r"]).unwrap());
  assert!(!client.reset(&["r"]).unwrap());
  assert!(!client.contains(&["r"]).unwrap());
  assert_eq!(*seen.lock(), vec![(QueryStatus::Pending, None)]);

  client
    .resolve(&["r"], counting_fetch(&count, 1u32), StaleTime::Never)
    .await
    .unwrap();
  assert_eq!(calls(&count), 2);
}

#[tokio::test]
async fn test_clear_empties_the_cache() {
  let (client, _clock) = build_test_client();
  let count = Arc::new(AtomicUsize::new(0));

  for i in 0..10u32 {
    client
      .resolve(&("item", i), counting_fetch(&count, i), StaleTime::Never)
      .await
      .unwrap();
  }
  assert_eq!(client.len(), 10);

  client.clear();
  assert!(client.is_empty());
  assert!(!client.invalidate(&("item", 3)).await.unwrap());

  client
    .resolve(&("item", 3), counting_fetch(&count, 3u32), StaleTime::Never)
    .await
    .unwrap();
  assert_eq!(calls(&count), 11);
}

#[tokio::test]
async fn test_reading_with_another_type_is_a_type_mismatch() {
  let (client, _clock) = build_test_client();
  let count = Arc::new(AtomicUsize::new(0));

  client.set_query_data(&["num"], 1u32).unwrap();

  match client.peek::<_, String>(&["num"]) {
    Err(QueryError::TypeMismatch { key, expected }) => {
      assert_eq!(key, r#"["num"]"#);
      assert!(expected.contains("String"));
    }
    other => panic!("expected a type mismatch, got {:?}", other),
  }

  let result = client
    .resolve(&["num"], counting_fetch(&count, "one".to_string()), StaleTime::Never)
    .await;
  assert!(matches!(result, Err(QueryError::TypeMismatch { .. })));
  assert_eq!(calls(&count), 0);
}

#[tokio::test]
async fn test_clients_are_isolated_but_clones_share() {
  let (a, _clock) = build_test_client();
  let (b, _clock) = build_test_client();
  let a2 = a.clone();

  a.set_query_data(&["k"], 1u8).unwrap();

  assert!(a2.contains(&["k"]).unwrap());
  assert!(!b.contains(&["k"]).unwrap());
}
