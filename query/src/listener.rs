use crate::state::{QueryState, RawState};

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use generational_arena::{Arena, Index};
use parking_lot::{Mutex, ReentrantMutex};

/// A listener that can be subscribed to a key to observe its state
/// transitions: pending when a fetch starts, then success or error.
///
/// Cache hits served to other callers are not transitions and are not
/// reported. Listeners run on whichever task caused the transition, outside
/// of any cache lock, so they may call back into the client.
///
/// Calls to one listener never overlap, and a listener never sees a
/// transition older than one it has already seen: when two transitions of a
/// key race, the older one is dropped for listeners that got the newer one.
pub trait QueryListener<T>: Send + Sync {
  fn on_change(&self, state: &QueryState<T>);
}

impl<T, F> QueryListener<T> for F
where
  F: Fn(&QueryState<T>) + Send + Sync,
{
  fn on_change(&self, state: &QueryState<T>) {
    self(state)
  }
}

/// A listener as stored in the registry, fed the generation of each
/// transition along with the untyped state.
pub(crate) type RawListener = Arc<dyn Fn(u64, &RawState) + Send + Sync>;

struct Slot {
  listener: RawListener,
  // Newest generation handed to the listener. Held for the duration of the
  // call; reentrant so a listener may trigger transitions of its own key.
  delivered: ReentrantMutex<Cell<u64>>,
}

impl Slot {
  fn deliver(&self, generation: u64, state: &RawState) {
    let delivered = self.delivered.lock();
    if generation <= delivered.get() {
      return;
    }
    delivered.set(generation);
    (self.listener)(generation, state);
  }
}

/// Listeners grouped by canonical key.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
  by_key: Mutex<HashMap<String, Arena<Arc<Slot>>>>,
}

impl ListenerRegistry {
  pub(crate) fn register(&self, canonical: String, listener: RawListener) -> (String, Index) {
    let slot = Arc::new(Slot {
      listener,
      delivered: ReentrantMutex::new(Cell::new(0)),
    });
    let mut by_key = self.by_key.lock();
    let index = by_key.entry(canonical.clone()).or_default().insert(slot);
    (canonical, index)
  }

  pub(crate) fn unregister(&self, canonical: &str, index: Index) {
    let mut by_key = self.by_key.lock();
    if let Some(arena) = by_key.get_mut(canonical) {
      arena.remove(index);
      if arena.is_empty() {
        by_key.remove(canonical);
      }
    }
  }

  /// Delivers `state`, stamped with `generation`, to every listener of
  /// `canonical` that has not yet seen a newer transition.
  pub(crate) fn notify(&self, canonical: &str, generation: u64, state: &RawState) {
    // Snapshot under the lock, call outside of it.
    let slots: Vec<Arc<Slot>> = match self.by_key.lock().get(canonical) {
      Some(arena) => arena.iter().map(|(_, slot)| slot.clone()).collect(),
      None => return,
    };
    for slot in slots {
      slot.deliver(generation, state);
    }
  }

  pub(crate) fn count(&self, canonical: &str) -> usize {
    self.by_key.lock().get(canonical).map_or(0, |a| a.len())
  }
}

impl fmt::Debug for ListenerRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ListenerRegistry")
      .field("keys", &self.by_key.lock().len())
      .finish()
  }
}

/// Keeps a listener attached to its key. Dropping it unsubscribes.
#[must_use = "dropping a Subscription immediately unsubscribes the listener"]
pub struct Subscription {
  registry: Weak<ListenerRegistry>,
  canonical: String,
  index: Option<Index>,
}

impl Subscription {
  pub(crate) fn new(registry: &Arc<ListenerRegistry>, canonical: String, index: Index) -> Self {
    Self {
      registry: Arc::downgrade(registry),
      canonical,
      index: Some(index),
    }
  }

  /// The canonical key this subscription listens to.
  pub fn key(&self) -> &str {
    &self.canonical
  }

  /// Detaches the listener. Equivalent to dropping the subscription.
  pub fn unsubscribe(mut self) {
    self.detach();
  }

  fn detach(&mut self) {
    if let Some(index) = self.index.take() {
      if let Some(registry) = self.registry.upgrade() {
        registry.unregister(&self.canonical, index);
      }
    }
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.detach();
  }
}

impl fmt::Debug for Subscription {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Subscription")
      .field("key", &self.canonical)
      .field("active", &self.index.is_some())
      .finish()
  }
}
