//! Async driver binding a pagination controller to the query engine.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::controller::{Applied, PageRequest, PageTicket, PaginationController, Phase};
use crate::cache::{CacheEvent, Signature};
use crate::engine::{QueryDescriptor, Subscription, SyncEngine};
use crate::error::SyncError;
use crate::fetcher::Params;

/// Describes how a paginated list is requested and unpacked.
pub trait PageSource: Send + Sync + 'static {
  type Item: Send + 'static;

  /// Query for `limit` items starting at `offset` under `filters`.
  fn descriptor(&self, filters: &Params, offset: usize, limit: usize) -> QueryDescriptor;

  /// Extract the page's items from a response payload.
  fn items(&self, payload: &Value) -> Result<Vec<Self::Item>, SyncError>;
}

enum FeedMessage<T> {
  Page {
    ticket: PageTicket,
    result: Result<Vec<T>, SyncError>,
  },
  Invalidated {
    generation: u64,
  },
}

/// Infinite-scroll list: `{items, phase, load_more(), on_filters_changed()}`.
///
/// Pages are fetched through the engine, so they are cached, deduplicated and
/// tagged like any other query. Every requested page is subscribed from the
/// moment it is issued; when a mutation invalidates one of them, even while
/// it is still loading, the list reloads from page 0 under the current
/// filters.
pub struct InfiniteFeed<S: PageSource> {
  engine: SyncEngine,
  source: Arc<S>,
  controller: PaginationController<S::Item>,
  tx: mpsc::UnboundedSender<FeedMessage<S::Item>>,
  rx: mpsc::UnboundedReceiver<FeedMessage<S::Item>>,
  pages: HashMap<Signature, Subscription>,
}

impl<S: PageSource> InfiniteFeed<S> {
  /// Create an idle feed. Nothing is fetched until the first
  /// [`on_filters_changed`](Self::on_filters_changed).
  pub fn new(engine: SyncEngine, source: S, page_size: usize) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      engine,
      source: Arc::new(source),
      controller: PaginationController::new(page_size),
      tx,
      rx,
      pages: HashMap::new(),
    }
  }

  pub fn items(&self) -> &[S::Item] {
    self.controller.items()
  }

  pub fn phase(&self) -> Phase {
    self.controller.phase()
  }

  pub fn error(&self) -> Option<&SyncError> {
    self.controller.error()
  }

  pub fn filters(&self) -> &Params {
    self.controller.filters()
  }

  pub fn generation(&self) -> u64 {
    self.controller.generation()
  }

  /// Reset to page 0 under `filters`. Responses for earlier filters are
  /// discarded when they arrive.
  pub fn on_filters_changed(&mut self, filters: Params) {
    // Old pages no longer drive reloads
    self.pages.clear();
    let request = self.controller.filters_changed(filters);
    tracing::debug!(
      generation = request.ticket.generation,
      filters = ?request.filters,
      "feed filters changed"
    );
    self.issue(request);
  }

  /// Scroll threshold reached. Returns whether a page was requested.
  pub fn load_more(&mut self) -> bool {
    match self.controller.scroll_threshold_reached() {
      Some(request) => {
        self.issue(request);
        true
      }
      None => false,
    }
  }

  /// Reload from page 0 with the current filters.
  pub fn refresh(&mut self) {
    let filters = self.controller.filters().clone();
    self.on_filters_changed(filters);
  }

  /// Apply every queued response without blocking. Returns `true` if the
  /// visible state changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    let mut reload = false;
    while let Ok(message) = self.rx.try_recv() {
      let (c, r) = self.apply(message);
      changed |= c;
      reload |= r;
    }
    if reload {
      self.refresh();
      changed = true;
    }
    changed
  }

  /// Wait for the next message, then apply it and anything else queued.
  pub async fn next_change(&mut self) -> bool {
    let Some(message) = self.rx.recv().await else {
      return false;
    };
    let (changed, reload) = self.apply(message);
    if reload {
      self.refresh();
    }
    self.poll() || changed || reload
  }

  /// Wait until no page is loading.
  pub async fn settle(&mut self) {
    while self.controller.phase().is_loading() {
      self.next_change().await;
    }
  }

  fn issue(&mut self, request: PageRequest) {
    let PageRequest {
      ticket,
      limit,
      filters,
    } = request;
    let descriptor = self.source.descriptor(&filters, ticket.offset, limit);
    self.watch(descriptor.signature(), ticket.generation);

    let engine = self.engine.clone();
    let source = Arc::clone(&self.source);
    let tx = self.tx.clone();
    tokio::spawn(async move {
      let result = match engine.query(&descriptor).await {
        Ok(Some(page)) => source.items(&page.data),
        // Anonymous session: nothing to list
        Ok(None) => Ok(Vec::new()),
        Err(error) => Err(error),
      };
      // Ignore send errors - the feed may have been dropped
      let _ = tx.send(FeedMessage::Page { ticket, result });
    });
  }

  /// Returns (state changed, reload needed).
  fn apply(&mut self, message: FeedMessage<S::Item>) -> (bool, bool) {
    match message {
      FeedMessage::Page { ticket, result } => {
        let applied = match result {
          Ok(items) => self.controller.fetch_succeeded(ticket, items),
          // The cache was reset under the page still being waited on
          Err(error) if error.is_stale() => {
            if self.controller.awaiting() == Some(ticket) {
              tracing::debug!(offset = ticket.offset, "page discarded by cache reset, reloading");
              return (false, true);
            }
            Applied::Discarded
          }
          Err(error) => {
            tracing::warn!(offset = ticket.offset, error = %error, "page fetch failed");
            self.controller.fetch_failed(ticket, error)
          }
        };
        (applied == Applied::Applied, false)
      }
      FeedMessage::Invalidated { generation } => (false, generation == self.controller.generation()),
    }
  }

  /// Subscribe to a page so invalidation of its tags reloads the feed.
  fn watch(&mut self, signature: Signature, generation: u64) {
    if self.pages.contains_key(&signature) {
      return;
    }
    let tx = self.tx.clone();
    let subscription = self.engine.subscribe(
      signature.clone(),
      Arc::new(move |event: &CacheEvent| {
        if matches!(event, CacheEvent::Invalidated(_) | CacheEvent::Cleared(_)) {
          let _ = tx.send(FeedMessage::Invalidated { generation });
        }
      }),
    );
    self.pages.insert(signature, subscription);
  }
}

impl<S: PageSource> std::fmt::Debug for InfiniteFeed<S> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("InfiniteFeed")
      .field("phase", &self.controller.phase())
      .field("generation", &self.controller.generation())
      .field("items", &self.controller.items().len())
      .field("pages", &self.pages.len())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::Tag;
  use crate::engine::MutationDescriptor;
  use crate::fetcher::{FetchFuture, Method, Request};
  use futures::FutureExt;
  use serde_json::json;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;
  use tokio::sync::oneshot;

  const NUMBERS: Tag = Tag::new("Numbers");

  struct Numbers;

  impl PageSource for Numbers {
    type Item = u64;

    fn descriptor(&self, filters: &Params, offset: usize, limit: usize) -> QueryDescriptor {
      let params = filters.merged(&Params::new().with("skip", offset).with("limit", limit));
      QueryDescriptor::new(Request::get("/api/numbers").with_params(params)).provides([NUMBERS])
    }

    fn items(&self, payload: &Value) -> Result<Vec<u64>, SyncError> {
      Ok(serde_json::from_value(payload["items"].clone())?)
    }
  }

  /// Serves `total` numbers; `search=slow` waits for its gate and answers
  /// from 1000 upward so stale data is recognizable.
  struct Backend {
    total: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
    gates: Arc<Mutex<HashMap<String, oneshot::Receiver<()>>>>,
  }

  fn backend(total: usize) -> (Backend, SyncEngine) {
    let backend = Backend {
      total: Arc::new(AtomicUsize::new(total)),
      reads: Arc::new(AtomicUsize::new(0)),
      gates: Arc::new(Mutex::new(HashMap::new())),
    };
    let (t, r, g) = (
      Arc::clone(&backend.total),
      Arc::clone(&backend.reads),
      Arc::clone(&backend.gates),
    );
    let engine = SyncEngine::new(move |req: Request| -> FetchFuture {
      if req.method != Method::Get {
        t.fetch_add(1, Ordering::SeqCst);
        return async { Ok(json!({})) }.boxed();
      }
      r.fetch_add(1, Ordering::SeqCst);
      let param = |k: &str| req.params.get(k).and_then(|v| v.parse::<usize>().ok()).unwrap_or(0);
      let (skip, limit) = (param("skip"), param("limit"));
      let search = req.params.get("search").unwrap_or_default().to_string();
      let base = if search == "slow" { 1000 } else { 0 };
      let end = (skip + limit).min(t.load(Ordering::SeqCst));
      let items: Vec<usize> = (skip..end.max(skip)).map(|i| base + i).collect();
      let gate = g.lock().unwrap().remove(&search);
      async move {
        if let Some(gate) = gate {
          let _ = gate.await;
        }
        Ok(json!({ "items": items }))
      }
      .boxed()
    });
    (backend, engine)
  }

  #[tokio::test]
  async fn test_full_then_short_page_exhausts() {
    let (backend, engine) = backend(25);
    let mut feed = InfiniteFeed::new(engine, Numbers, 20);

    feed.on_filters_changed(Params::new());
    feed.settle().await;
    assert_eq!(feed.phase(), Phase::Ready);
    assert_eq!(feed.items().len(), 20);

    assert!(feed.load_more());
    assert!(!feed.load_more());
    assert!(!feed.load_more());
    feed.settle().await;

    assert_eq!(feed.items().len(), 25);
    assert_eq!(feed.phase(), Phase::Exhausted);
    assert!(!feed.load_more());
    assert_eq!(backend.reads.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_slow_response_from_old_filters_never_lands() {
    let (backend, engine) = backend(100);
    let (release, gate) = oneshot::channel();
    backend.gates.lock().unwrap().insert("slow".into(), gate);
    let mut feed = InfiniteFeed::new(engine, Numbers, 20);

    feed.on_filters_changed(Params::new().with("search", "slow"));
    feed.on_filters_changed(Params::new().with("search", "fast"));
    feed.settle().await;
    assert_eq!(feed.items().len(), 20);

    release.send(()).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    assert!(!feed.poll());

    assert!(feed.items().iter().all(|n| *n < 1000));
    assert_eq!(feed.generation(), 2);
  }

  #[tokio::test]
  async fn test_invalidation_reloads_from_first_page() {
    let (backend, engine) = backend(3);
    let mut feed = InfiniteFeed::new(engine.clone(), Numbers, 20);
    feed.on_filters_changed(Params::new());
    feed.settle().await;
    assert_eq!(feed.items().len(), 3);

    // Admin creates a product-like record; the list is tagged, so it reloads
    let create = MutationDescriptor::new(Request::post("/api/numbers")).invalidates([NUMBERS]);
    engine.mutate(&create).await.unwrap();
    feed.next_change().await;
    feed.settle().await;

    assert_eq!(feed.items().len(), 4);
    assert_eq!(feed.phase(), Phase::Exhausted);
    assert_eq!(backend.reads.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_remount_with_same_filters_hits_cache() {
    let (backend, engine) = backend(5);
    let mut first = InfiniteFeed::new(engine.clone(), Numbers, 20);
    first.on_filters_changed(Params::new().with("brand", "acme"));
    first.settle().await;
    drop(first);

    let mut again = InfiniteFeed::new(engine, Numbers, 20);
    again.on_filters_changed(Params::new().with("brand", "acme"));
    again.settle().await;

    assert_eq!(again.items().len(), 5);
    assert_eq!(backend.reads.load(Ordering::SeqCst), 1);
  }

  async fn wait_for_reads(backend: &Backend, reads: usize) {
    while backend.reads.load(Ordering::SeqCst) < reads {
      tokio::task::yield_now().await;
    }
  }

  #[tokio::test]
  async fn test_invalidation_while_page_loads_reloads() {
    let (backend, engine) = backend(5);
    let (release, gate) = oneshot::channel();
    backend.gates.lock().unwrap().insert("held".into(), gate);
    let mut feed = InfiniteFeed::new(engine.clone(), Numbers, 20);

    feed.on_filters_changed(Params::new().with("search", "held"));
    wait_for_reads(&backend, 1).await;

    // The page was read before the write; its response must not stick
    let create = MutationDescriptor::new(Request::post("/api/numbers")).invalidates([NUMBERS]);
    engine.mutate(&create).await.unwrap();
    release.send(()).unwrap();
    feed.settle().await;

    assert_eq!(feed.items().len(), 6);
    assert_eq!(feed.phase(), Phase::Exhausted);
    assert_eq!(backend.reads.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_cache_reset_during_first_page_reloads() {
    let (backend, engine) = backend(5);
    let (release, gate) = oneshot::channel();
    backend.gates.lock().unwrap().insert("held".into(), gate);
    let mut feed = InfiniteFeed::new(engine.clone(), Numbers, 20);

    feed.on_filters_changed(Params::new().with("search", "held"));
    wait_for_reads(&backend, 1).await;
    engine.clear();
    release.send(()).unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(2), feed.settle())
      .await
      .unwrap();
    assert_eq!(feed.phase(), Phase::Exhausted);
    assert_eq!(feed.items().len(), 5);
    assert_eq!(backend.reads.load(Ordering::SeqCst), 2);
  }
}
