//! Scripted in-memory storefront backend for integration tests.
#![allow(dead_code)]

use futures::FutureExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use storefront_sync::auth::{AuthState, SessionFlag};
use storefront_sync::cache::Signature;
use storefront_sync::fetcher::{FetchFuture, Method, Request};
use storefront_sync::{SyncEngine, SyncError};

#[derive(Default)]
struct ShopState {
  catalog: usize,
  cart: Vec<u64>,
  calls: Vec<String>,
  fail_writes: bool,
  gates: HashMap<String, oneshot::Receiver<()>>,
}

/// Backend with a numbered catalog and one cart. Every request is logged by
/// its readable signature; gated requests wait until their sender fires.
#[derive(Clone)]
pub struct Shop {
  state: Arc<Mutex<ShopState>>,
}

impl Shop {
  pub fn new(catalog: usize, cart: &[u64]) -> Self {
    Self {
      state: Arc::new(Mutex::new(ShopState {
        catalog,
        cart: cart.to_vec(),
        ..Default::default()
      })),
    }
  }

  pub fn engine(&self) -> SyncEngine {
    self.engine_with(Arc::new(SessionFlag::new(true)))
  }

  pub fn engine_with(&self, auth: Arc<dyn AuthState>) -> SyncEngine {
    let shop = self.clone();
    SyncEngine::builder(move |req: Request| -> FetchFuture { shop.clone().serve(req).boxed() })
      .auth(auth)
      .build()
  }

  /// Hold the next request whose readable signature contains `pattern`.
  pub fn gate(&self, pattern: &str) -> oneshot::Sender<()> {
    let (tx, rx) = oneshot::channel();
    self.state.lock().unwrap().gates.insert(pattern.to_string(), rx);
    tx
  }

  /// Make every write fail with a validation error.
  pub fn reject_writes(&self) {
    self.state.lock().unwrap().fail_writes = true;
  }

  /// Requests received so far whose readable signature contains `pattern`.
  pub fn calls(&self, pattern: &str) -> usize {
    let state = self.state.lock().unwrap();
    state.calls.iter().filter(|c| c.contains(pattern)).count()
  }

  pub fn total_calls(&self) -> usize {
    self.state.lock().unwrap().calls.len()
  }

  async fn serve(self, req: Request) -> Result<Value, SyncError> {
    let described = Signature::of(&req).describe().to_string();
    let gate = {
      let mut state = self.state.lock().unwrap();
      state.calls.push(described.clone());
      let key = state.gates.keys().find(|p| described.contains(p.as_str())).cloned();
      key.and_then(|k| state.gates.remove(&k))
    };
    if let Some(gate) = gate {
      let _ = gate.await;
    }

    let mut state = self.state.lock().unwrap();
    if req.method != Method::Get && state.fail_writes {
      return Err(SyncError::Validation {
        status: 400,
        message: "Not enough stock".into(),
      });
    }

    match (req.method, req.endpoint.as_str()) {
      (Method::Get, "/api/products") => {
        let skip: usize = param(&req, "skip").unwrap_or(0);
        let limit: usize = param(&req, "limit").unwrap_or(20);
        let search = req.params.get("search").map(str::to_string);
        // Filtered results are numbered from 1000 so they are recognizable
        let base = if search.is_some() { 1000 } else { 0 };
        let total = state.catalog;
        let products: Vec<Value> = (skip..total.min(skip + limit))
          .map(|i| product(base + i as u64))
          .collect();
        Ok(json!({ "products": products, "total": total }))
      }
      (Method::Get, "/api/cart") => Ok(cart_json(&state.cart)),
      (Method::Post, "/api/cart/items") => {
        let product_id = req
          .body
          .as_ref()
          .and_then(|b| b["product_id"].as_u64())
          .unwrap_or_default();
        state.cart.push(product_id);
        Ok(cart_json(&state.cart))
      }
      (Method::Post, "/api/orders") => {
        state.cart.clear();
        Ok(json!({
          "id": 1, "order_number": "ORD-1", "status": "pending", "total_amount": 10.0
        }))
      }
      (Method::Delete, path) if path.starts_with("/api/products/") => {
        state.catalog = state.catalog.saturating_sub(1);
        Ok(Value::Null)
      }
      (Method::Get, "/api/orders") => Ok(json!([])),
      (Method::Get, "/api/categories") => Ok(json!([{"id": 1, "name": "Kitchen", "slug": "kitchen"}])),
      _ => Err(SyncError::Validation {
        status: 404,
        message: "Not Found".into(),
      }),
    }
  }
}

fn param(req: &Request, key: &str) -> Option<usize> {
  req.params.get(key).and_then(|v| v.parse().ok())
}

pub fn product(id: u64) -> Value {
  json!({ "id": id, "name": format!("Product {}", id), "price": 9.5 })
}

fn cart_json(lines: &[u64]) -> Value {
  let items: Vec<Value> = lines
    .iter()
    .enumerate()
    .map(|(i, product_id)| json!({ "id": i, "product_id": product_id, "quantity": 1 }))
    .collect();
  json!({ "id": 1, "items": items })
}
