#![allow(dead_code)]

use fibre_query::{ManualClock, QueryClient};

use std::future::Future;
use std::io;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration;

/// Builds an isolated client driven by a manual clock.
pub fn build_test_client() -> (QueryClient, Arc<ManualClock>) {
  let clock = Arc::new(ManualClock::new());
  let client = QueryClient::builder()
    .shards(4)
    .clock(clock.clone())
    .build()
    .unwrap();
  (client, clock)
}

/// A fetch function that counts its invocations and returns `value`.
pub fn counting_fetch<T>(
  calls: &Arc<AtomicUsize>,
  value: T,
) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = Result<T, io::Error>> + Send>> + Send + Sync + 'static
where
  T: Clone + Send + Sync + 'static,
{
  let calls = calls.clone();
  move || {
    calls.fetch_add(1, Ordering::SeqCst);
    let value = value.clone();
    Box::pin(async move { Ok(value) })
  }
}

/// Like `counting_fetch`, but each call takes `delay` to complete.
pub fn slow_counting_fetch<T>(
  calls: &Arc<AtomicUsize>,
  value: T,
  delay: Duration,
) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = Result<T, io::Error>> + Send>> + Send + Sync + 'static
where
  T: Clone + Send + Sync + 'static,
{
  let calls = calls.clone();
  move || {
    calls.fetch_add(1, Ordering::SeqCst);
    let value = value.clone();
    Box::pin(async move {
      tokio::time::sleep(delay).await;
      Ok(value)
    })
  }
}

/// A fetch function that always fails with `message`.
pub fn failing_fetch<T>(
  calls: &Arc<AtomicUsize>,
  message: &'static str,
) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = Result<T, io::Error>> + Send>> + Send + Sync + 'static
where
  T: Send + 'static,
{
  let calls = calls.clone();
  move || {
    calls.fetch_add(1, Ordering::SeqCst);
    Box::pin(async move { Err(io::Error::new(io::ErrorKind::Other, message)) })
  }
}

pub fn calls(counter: &Arc<AtomicUsize>) -> usize {
  counter.load(Ordering::SeqCst)
}
