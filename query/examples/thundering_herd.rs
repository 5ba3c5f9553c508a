use fibre_query::{QueryClient, StaleTime};
use std::io;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use tokio::time::{sleep, Duration};

// A simulated slow backend.
async fn fetch_todos(fetch_count: Arc<AtomicUsize>) -> Result<Vec<String>, io::Error> {
  println!("--- Backend: Received request for todos. Simulating slow query...");
  fetch_count.fetch_add(1, Ordering::SeqCst);
  sleep(Duration::from_millis(500)).await;
  Ok(vec!["write docs".to_string(), "ship it".to_string()])
}

#[tokio::main]
async fn main() {
  let fetch_count = Arc::new(AtomicUsize::new(0));
  let client = QueryClient::new();

  println!("--- Thundering Herd Demonstration ---");
  println!("Spawning 10 tasks to resolve [\"todos\"] at once.\n");

  let mut tasks = Vec::new();
  for i in 0..10 {
    let client = client.clone();
    let counter = fetch_count.clone();
    tasks.push(tokio::spawn(async move {
      println!("[Task {}] Resolving todos...", i);
      let state = client
        .resolve(&["todos"], move || fetch_todos(counter.clone()), StaleTime::from_millis(1000))
        .await
        .expect("valid key");
      println!("[Task {}] Received {} todos", i, state.data().map_or(0, |d| d.len()));
    }));
  }

  for task in tasks {
    task.await.unwrap();
  }

  println!("\n--- Verification ---");
  println!(
    "Fetch function was called {} time(s).",
    fetch_count.load(Ordering::SeqCst)
  );
  assert_eq!(fetch_count.load(Ordering::SeqCst), 1);
  println!("{}", client.metrics());
}
