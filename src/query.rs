//! Mounted queries: a pollable view of one cache signature.
//!
//! Inspired by TanStack Query, `LiveQuery<T>` subscribes to its signature on
//! mount, fetches through the engine, and refetches when a mutation
//! invalidates it. Dropping it unsubscribes.
//!
//! # Example
//!
//! ```ignore
//! let mut cart = LiveQuery::<Cart>::mount(engine.clone(), endpoints::cart());
//!
//! // In event loop tick
//! if cart.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! match cart.state() {
//!     QueryState::Loading => render_spinner(cart.data()),
//!     QueryState::Success(cart) => render_cart(cart),
//!     QueryState::Error(e) => render_error(e, cart.data()),
//!     QueryState::Idle | QueryState::Skipped => {}
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::cache::{CacheEvent, CacheSource};
use crate::engine::{QueryDescriptor, QueryOutput, Subscription, SyncEngine};
use crate::error::SyncError;

/// The state of a query
#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Query has not been started, or the cache was reset
  Idle,
  /// Query requires a session and there is none
  Skipped,
  /// Query is currently fetching data
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed with an error
  Error(SyncError),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&SyncError> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

enum Message {
  Result { seq: u64, output: QueryOutput },
  Cache(CacheEvent),
}

/// A query mounted by one view.
pub struct LiveQuery<T> {
  engine: SyncEngine,
  descriptor: QueryDescriptor,
  state: QueryState<T>,
  /// Data from the last success, kept while reloading or after a failure
  previous: Option<T>,
  source: Option<CacheSource>,
  fetched_at: Option<DateTime<Utc>>,
  seq: u64,
  tx: mpsc::UnboundedSender<Message>,
  rx: mpsc::UnboundedReceiver<Message>,
  _subscription: Subscription,
}

impl<T: DeserializeOwned + Send + 'static> LiveQuery<T> {
  /// Subscribe to the descriptor's signature and start fetching.
  ///
  /// Must be called within a tokio runtime.
  pub fn mount(engine: SyncEngine, descriptor: QueryDescriptor) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    let events = tx.clone();
    let subscription = engine.subscribe(
      descriptor.signature(),
      Arc::new(move |event: &CacheEvent| {
        // Ignore send errors - the query may be unmounting
        let _ = events.send(Message::Cache(event.clone()));
      }),
    );

    let mut query = Self {
      engine,
      descriptor,
      state: QueryState::Idle,
      previous: None,
      source: None,
      fetched_at: None,
      seq: 0,
      tx,
      rx,
      _subscription: subscription,
    };
    query.fetch();
    query
  }

  /// Get the current state of the query.
  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  /// Current data, or the last successful data while reloading or failed.
  pub fn data(&self) -> Option<&T> {
    self.state.data().or(self.previous.as_ref())
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  pub fn error(&self) -> Option<&SyncError> {
    self.state.error()
  }

  /// Where the current data came from.
  pub fn source(&self) -> Option<CacheSource> {
    self.source
  }

  pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
    self.fetched_at
  }

  pub fn descriptor(&self) -> &QueryDescriptor {
    &self.descriptor
  }

  /// Start fetching data if not already loading.
  pub fn fetch(&mut self) {
    if self.state.is_loading() {
      return;
    }
    self.start_fetch(false);
  }

  /// Explicit user retry: go to the network even if the cache is fresh.
  pub fn refetch(&mut self) {
    self.start_fetch(true);
  }

  /// Apply every pending result and cache event without blocking.
  ///
  /// Returns `true` if the state changed. Call this in your event loop tick.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    let mut invalidated = false;
    while let Ok(message) = self.rx.try_recv() {
      let (c, i) = self.apply(message);
      changed |= c;
      invalidated |= i;
    }
    if invalidated {
      self.start_fetch(false);
      changed = true;
    }
    changed
  }

  /// Wait for the next message, then apply it and anything else queued.
  pub async fn next_change(&mut self) -> bool {
    let Some(message) = self.rx.recv().await else {
      return false;
    };
    let (changed, invalidated) = self.apply(message);
    if invalidated {
      self.start_fetch(false);
    }
    self.poll() || changed || invalidated
  }

  fn start_fetch(&mut self, force: bool) {
    self.seq += 1;
    let seq = self.seq;
    if let QueryState::Success(data) = std::mem::replace(&mut self.state, QueryState::Loading) {
      self.previous = Some(data);
    }

    let engine = self.engine.clone();
    let descriptor = self.descriptor.clone();
    let tx = self.tx.clone();
    tokio::spawn(async move {
      let output = if force {
        engine.refetch(&descriptor).await
      } else {
        engine.query(&descriptor).await
      };
      // Ignore send errors - receiver may have been dropped
      let _ = tx.send(Message::Result { seq, output });
    });
  }

  /// Returns (state changed, refetch needed).
  fn apply(&mut self, message: Message) -> (bool, bool) {
    match message {
      Message::Result { seq, .. } if seq != self.seq => (false, false),
      Message::Result { output, .. } => match output {
        Ok(Some(result)) => {
          self.source = Some(result.source);
          self.fetched_at = result.fetched_at;
          match T::deserialize(result.data.as_ref()) {
            Ok(data) => self.succeed(data),
            Err(e) => self.fail(SyncError::from(e)),
          }
          (true, false)
        }
        Ok(None) => {
          self.state = QueryState::Skipped;
          (true, false)
        }
        // The cache was reset under us; the Cleared event handles it
        Err(error) if error.is_stale() => (false, false),
        Err(error) => {
          self.fail(error);
          (true, false)
        }
      },
      Message::Cache(CacheEvent::Fulfilled(entry)) => {
        if self.state.is_loading() {
          // Our own result message follows
          return (false, false);
        }
        match entry.decode::<T>() {
          Ok(Some(data)) => {
            self.source = Some(CacheSource::Network);
            self.fetched_at = entry.fetched_at;
            self.succeed(data);
            (true, false)
          }
          Ok(None) => (false, false),
          Err(error) => {
            self.fail(error);
            (true, false)
          }
        }
      }
      Message::Cache(CacheEvent::Failed(entry)) => {
        if self.state.is_loading() {
          return (false, false);
        }
        match entry.error.clone() {
          Some(error) => {
            self.fail(error);
            (true, false)
          }
          None => (false, false),
        }
      }
      Message::Cache(CacheEvent::Invalidated(_)) => {
        tracing::debug!(signature = %self.descriptor.signature(), "mounted query invalidated");
        (false, true)
      }
      Message::Cache(CacheEvent::Cleared(_)) => {
        self.seq += 1;
        self.state = QueryState::Idle;
        self.previous = None;
        self.source = None;
        self.fetched_at = None;
        (true, false)
      }
    }
  }

  fn succeed(&mut self, data: T) {
    self.previous = None;
    self.state = QueryState::Success(data);
  }

  fn fail(&mut self, error: SyncError) {
    if let QueryState::Success(data) = std::mem::replace(&mut self.state, QueryState::Error(error)) {
      self.previous = Some(data);
    }
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for LiveQuery<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LiveQuery")
      .field("signature", &self.descriptor.signature())
      .field("state", &self.state)
      .field("fetched_at", &self.fetched_at)
      .finish_non_exhaustive()
  }
}
