use fibre_query::{Mutation, QueryClient, QueryState, StaleTime};
use std::io;
use std::sync::Arc;
use parking_lot::Mutex;

#[tokio::main]
async fn main() {
  let client = QueryClient::new();
  let server = Arc::new(Mutex::new(vec!["buy milk".to_string()]));

  // Print every transition of the todo list.
  let _subscription = client
    .subscribe(&["todos"], |state: &QueryState<Vec<String>>| {
      println!("[Listener] {} -> {:?}", state.status, state.data());
    })
    .expect("valid key");

  let fetch = {
    let server = server.clone();
    move || {
      let todos = server.lock().clone();
      async move { Ok::<_, io::Error>(todos) }
    }
  };
  client
    .resolve(&["todos"], fetch, StaleTime::Never)
    .await
    .expect("valid key");

  // Add a todo on the "server", then refresh the cached list.
  let add_todo = Mutation::new({
    let server = server.clone();
    move |title: String| {
      server.lock().push(title.clone());
      async move { Ok::<_, io::Error>(title) }
    }
  })
  .on_mutate(|title| println!("[Mutation] adding {:?}", title))
  .on_settled(|data, error| println!("[Mutation] settled: {:?} {:?}", data, error));

  let added = add_todo
    .mutate("walk the dog".to_string())
    .await
    .expect("the in-memory server never fails");
  println!("Added {:?}", added);

  let refreshed = client.invalidate(&["todos"]).await.expect("valid key");
  println!("Invalidated: {}", refreshed);

  let todos: Option<Arc<Vec<String>>> = client.peek(&["todos"]).expect("valid key");
  println!("Cached todos: {:?}", todos);
}
