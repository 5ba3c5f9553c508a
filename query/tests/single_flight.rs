mod common;

use common::{build_test_client, calls, counting_fetch, slow_counting_fetch};
use fibre_query::{QueryState, QueryStatus, StaleTime};

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Barrier, Notify};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_thundering_herd_runs_one_fetch() {
  let (client, _clock) = build_test_client();
  let count = Arc::new(AtomicUsize::new(0));
  let num_tasks = 20;
  let barrier = Arc::new(Barrier::new(num_tasks));

  let mut handles = Vec::new();
  for _ in 0..num_tasks {
    let client = client.clone();
    let count = count.clone();
    let barrier = barrier.clone();
    handles.push(tokio::spawn(async move {
      barrier.wait().await;
      client
        .resolve(
          &("herd", 1),
          slow_counting_fetch(&count, 42u64, Duration::from_millis(100)),
          StaleTime::ZERO,
        )
        .await
        .unwrap()
    }));
  }

  for handle in handles {
    let state = handle.await.unwrap();
    assert_eq!(state.status, QueryStatus::Success);
    assert_eq!(state.data(), Some(&42));
  }

  assert_eq!(calls(&count), 1, "concurrent callers must share one fetch");
  let metrics = client.metrics();
  assert_eq!(metrics.fetches, 1);
  assert_eq!(metrics.joined_fetches, (num_tasks - 1) as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_the_same_data() {
  let (client, _clock) = build_test_client();
  let count = Arc::new(AtomicUsize::new(0));

  let a = client.resolve(
    &["shared"],
    slow_counting_fetch(&count, "first".to_string(), Duration::from_millis(50)),
    StaleTime::ZERO,
  );
  let b = client.resolve(
    &["shared"],
    slow_counting_fetch(&count, "second".to_string(), Duration::from_millis(50)),
    StaleTime::ZERO,
  );
  let (a, b) = tokio::join!(a, b);
  let (a, b) = (a.unwrap(), b.unwrap());

  // The joiner's fetch function is never called.
  assert_eq!(calls(&count), 1);
  assert!(Arc::ptr_eq(a.data.as_ref().unwrap(), b.data.as_ref().unwrap()));
  assert_eq!(a.data().map(String::as_str), Some("first"));
}

#[tokio::test]
async fn test_distinct_keys_fetch_independently() {
  let (client, _clock) = build_test_client();
  let count = Arc::new(AtomicUsize::new(0));

  let a = client.resolve(&["a"], counting_fetch(&count, 1), StaleTime::Never);
  let b = client.resolve(&["b"], counting_fetch(&count, 2), StaleTime::Never);
  let (a, b) = tokio::join!(a, b);

  assert_eq!(a.unwrap().data(), Some(&1));
  assert_eq!(b.unwrap().data(), Some(&2));
  assert_eq!(calls(&count), 2);
  assert_eq!(client.len(), 2);
}

#[tokio::test]
async fn test_sequential_stale_fetches_do_not_join() {
  let (client, _clock) = build_test_client();
  let count = Arc::new(AtomicUsize::new(0));

  for _ in 0..3 {
    client
      .resolve(&["seq"], counting_fetch(&count, ()), StaleTime::ZERO)
      .await
      .unwrap();
  }

  assert_eq!(calls(&count), 3);
  assert_eq!(client.metrics().joined_fetches, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_caller_does_not_cancel_fetch() {
  let (client, _clock) = build_test_client();
  let started = Arc::new(Notify::new());
  let gate = Arc::new(Notify::new());
  let count = Arc::new(AtomicUsize::new(0));

  let fetch = {
    let started = started.clone();
    let gate = gate.clone();
    let count = count.clone();
    move || {
      let started = started.clone();
      let gate = gate.clone();
      count.fetch_add(1, Ordering::SeqCst);
      async move {
        started.notify_one();
        gate.notified().await;
        Ok::<_, io::Error>("late".to_string())
      }
    }
  };

  let (tx, mut rx) = mpsc::unbounded_channel();
  let _subscription = client
    .subscribe(&["orphan"], move |state: &QueryState<String>| {
      let _ = tx.send(state.status);
    })
    .unwrap();

  let caller = tokio::spawn({
    let client = client.clone();
    async move { client.resolve(&["orphan"], fetch, StaleTime::ZERO).await }
  });

  started.notified().await;
  caller.abort();
  assert!(caller.await.unwrap_err().is_cancelled());

  gate.notify_one();
  assert_eq!(rx.recv().await, Some(QueryStatus::Pending));
  assert_eq!(rx.recv().await, Some(QueryStatus::Success));

  let cached: Option<Arc<String>> = client.peek(&["orphan"]).unwrap();
  assert_eq!(cached.as_deref().map(String::as_str), Some("late"));
  assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_late_caller_joins_orphaned_fetch() {
  let (client, _clock) = build_test_client();
  let gate = Arc::new(Notify::new());
  let count = Arc::new(AtomicUsize::new(0));

  let gated = |gate: Arc<Notify>, count: Arc<AtomicUsize>, value: u32| {
    move || {
      let gate = gate.clone();
      count.fetch_add(1, Ordering::SeqCst);
      async move {
        gate.notified().await;
        Ok::<_, io::Error>(value)
      }
    }
  };

  let first = tokio::spawn({
    let client = client.clone();
    let fetch = gated(gate.clone(), count.clone(), 1);
    async move { client.resolve(&["join"], fetch, StaleTime::ZERO).await }
  });

  // Wait until the first fetch is in flight, then give up on its caller.
  while client.metrics().fetches == 0 {
    tokio::task::yield_now().await;
  }
  first.abort();

  let second = tokio::spawn({
    let client = client.clone();
    let fetch = gated(gate.clone(), count.clone(), 2);
    async move { client.resolve(&["join"], fetch, StaleTime::ZERO).await }
  });
  while client.metrics().joined_fetches == 0 {
    tokio::task::yield_now().await;
  }
  gate.notify_one();

  let state = second.await.unwrap().unwrap();
  assert_eq!(state.data(), Some(&1));
  assert_eq!(count.load(Ordering::SeqCst), 1);
}
