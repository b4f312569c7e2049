//! Registry of mounted consumers, keyed by signature.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::cache::{CacheEvent, Signature};

/// Callback invoked with every event for a subscribed signature.
pub type Callback = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

#[derive(Default)]
struct RegistryState {
  next_id: u64,
  by_signature: HashMap<Signature, BTreeMap<u64, Callback>>,
}

/// Tracks which signatures are mounted and who listens to them.
///
/// Callbacks are invoked outside the registry lock, so a callback may
/// subscribe, unsubscribe or query again without deadlocking.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
  state: Arc<Mutex<RegistryState>>,
}

impl SubscriptionRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `callback` for `signature`. Dropping the returned handle (or
  /// calling [`Subscription::unsubscribe`]) removes it.
  pub fn subscribe(&self, signature: Signature, callback: Callback) -> Subscription {
    let mut state = self.lock();
    let id = state.next_id;
    state.next_id += 1;
    state
      .by_signature
      .entry(signature.clone())
      .or_default()
      .insert(id, callback);

    tracing::debug!(signature = %signature, id, "subscribed");

    Subscription {
      registry: Arc::downgrade(&self.state),
      signature,
      id,
    }
  }

  /// Deliver `event` to every subscriber of its signature.
  pub fn notify(&self, event: &CacheEvent) {
    let callbacks: Vec<Callback> = {
      let state = self.lock();
      match state.by_signature.get(event.signature()) {
        Some(subscribers) => subscribers.values().cloned().collect(),
        None => return,
      }
    };

    for callback in callbacks {
      callback(event);
    }
  }

  pub fn subscriber_count(&self, signature: &Signature) -> usize {
    self
      .lock()
      .by_signature
      .get(signature)
      .map(BTreeMap::len)
      .unwrap_or(0)
  }

  /// Signatures with at least one live subscriber. Each one's
  /// [`describe`](Signature::describe) is the mounted request with its
  /// last-known parameters.
  pub fn mounted(&self) -> Vec<Signature> {
    let mut mounted: Vec<Signature> = self.lock().by_signature.keys().cloned().collect();
    mounted.sort();
    mounted
  }

  fn lock(&self) -> MutexGuard<'_, RegistryState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Handle of one subscription.
pub struct Subscription {
  registry: Weak<Mutex<RegistryState>>,
  signature: Signature,
  id: u64,
}

impl Subscription {
  pub fn signature(&self) -> &Signature {
    &self.signature
  }

  /// Remove this subscription. Safe to call any number of times.
  pub fn unsubscribe(&self) {
    let Some(registry) = self.registry.upgrade() else {
      return;
    };
    let mut state = registry.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(subscribers) = state.by_signature.get_mut(&self.signature) {
      if subscribers.remove(&self.id).is_some() {
        tracing::debug!(signature = %self.signature, id = self.id, "unsubscribed");
      }
      if subscribers.is_empty() {
        state.by_signature.remove(&self.signature);
      }
    }
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.unsubscribe();
  }
}

impl std::fmt::Debug for Subscription {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("signature", &self.signature)
      .field("id", &self.id)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fetcher::Request;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn counter() -> (Arc<AtomicUsize>, Callback) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    let callback: Callback = Arc::new(move |_| {
      c.fetch_add(1, Ordering::SeqCst);
    });
    (count, callback)
  }

  #[test]
  fn test_notify_reaches_every_subscriber_of_signature() {
    let registry = SubscriptionRegistry::new();
    let cart = Signature::of(&Request::get("/api/cart"));
    let orders = Signature::of(&Request::get("/api/orders"));

    let (badge, badge_cb) = counter();
    let (page, page_cb) = counter();
    let (other, other_cb) = counter();
    let _a = registry.subscribe(cart.clone(), badge_cb);
    let _b = registry.subscribe(cart.clone(), page_cb);
    let _c = registry.subscribe(orders, other_cb);

    registry.notify(&CacheEvent::Cleared(cart.clone()));

    assert_eq!(badge.load(Ordering::SeqCst), 1);
    assert_eq!(page.load(Ordering::SeqCst), 1);
    assert_eq!(other.load(Ordering::SeqCst), 0);
    assert_eq!(registry.subscriber_count(&cart), 2);
  }

  #[test]
  fn test_unsubscribe_is_idempotent() {
    let registry = SubscriptionRegistry::new();
    let cart = Signature::of(&Request::get("/api/cart"));
    let (count, cb) = counter();
    let (_, keep_cb) = counter();

    let sub = registry.subscribe(cart.clone(), cb);
    let _keep = registry.subscribe(cart.clone(), keep_cb);
    sub.unsubscribe();
    sub.unsubscribe();
    drop(sub);

    registry.notify(&CacheEvent::Cleared(cart.clone()));
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(registry.subscriber_count(&cart), 1);
  }

  #[test]
  fn test_drop_unmounts_signature() {
    let registry = SubscriptionRegistry::new();
    let cart = Signature::of(&Request::get("/api/cart"));
    let (_, cb) = counter();

    let sub = registry.subscribe(cart.clone(), cb);
    assert_eq!(registry.mounted(), vec![cart.clone()]);
    drop(sub);
    assert!(registry.mounted().is_empty());
  }

  #[test]
  fn test_mounted_lists_last_known_parameters() {
    let registry = SubscriptionRegistry::new();
    let request = Request::get("/api/products")
      .with_param("skip", 20)
      .with_param("brand", "acme");
    let page = Signature::of(&request);
    let (_, cb) = counter();

    let _sub = registry.subscribe(page, cb);
    let mounted = registry.mounted();
    assert_eq!(mounted.len(), 1);
    assert_eq!(mounted[0].describe(), "GET /api/products?brand=acme&skip=20");
  }

  #[test]
  fn test_callback_may_reenter_registry() {
    let registry = SubscriptionRegistry::new();
    let cart = Signature::of(&Request::get("/api/cart"));
    let inner = registry.clone();
    let cart_for_cb = cart.clone();
    let cb: Callback = Arc::new(move |_| {
      // Would deadlock if notify held the lock
      assert_eq!(inner.subscriber_count(&cart_for_cb), 1);
    });
    let _sub = registry.subscribe(cart.clone(), cb);
    registry.notify(&CacheEvent::Cleared(cart));
  }
}
