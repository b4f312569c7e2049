//! Request signatures: the normalized identity of a request used as cache key.

use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

use crate::fetcher::Request;

/// Normalized, order-independent identity of a request.
///
/// Two requests with the same method, endpoint and parameter set produce the
/// same signature no matter how their parameters were inserted.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature {
  hash: Arc<str>,
  canonical: Arc<str>,
}

impl Signature {
  pub fn of(request: &Request) -> Self {
    let canonical = canonical_form(request);

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Self {
      hash: hash.into(),
      canonical: canonical.into(),
    }
  }

  /// Fixed-length hex key.
  pub fn hash(&self) -> &str {
    &self.hash
  }

  /// Human-readable canonical form, e.g. `GET /api/products?limit=20&skip=0`.
  pub fn describe(&self) -> &str {
    &self.canonical
  }
}

impl fmt::Debug for Signature {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Signature({})", self.canonical)
  }
}

impl fmt::Display for Signature {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.canonical)
  }
}

fn canonical_form(request: &Request) -> String {
  let mut out = format!(
    "{} {}",
    request.method.as_str(),
    normalize_endpoint(&request.endpoint)
  );

  // Params iterate in key order
  let query: Vec<String> = request
    .params
    .iter()
    .map(|(k, v)| format!("{}={}", k, v))
    .collect();
  if !query.is_empty() {
    out.push('?');
    out.push_str(&query.join("&"));
  }

  // serde_json objects are key-sorted, so the body is canonical too
  if let Some(body) = &request.body {
    out.push(' ');
    out.push_str(&body.to_string());
  }

  out
}

/// Trim whitespace and trailing slashes so `/api/cart/` and `/api/cart` share a key.
fn normalize_endpoint(endpoint: &str) -> &str {
  let trimmed = endpoint.trim();
  let stripped = trimmed.trim_end_matches('/');
  if stripped.is_empty() && trimmed.starts_with('/') {
    "/"
  } else {
    stripped
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fetcher::Params;

  #[test]
  fn test_signature_ignores_insertion_order() {
    let a = Request::get("/api/products").with_params(
      Params::new()
        .with("search", "lamp")
        .with("skip", 0)
        .with("limit", 20),
    );
    let b = Request::get("/api/products").with_params(
      Params::new()
        .with("limit", 20)
        .with("search", "lamp")
        .with("skip", 0),
    );

    assert_eq!(Signature::of(&a), Signature::of(&b));
    assert_eq!(Signature::of(&a).hash(), Signature::of(&b).hash());
  }

  #[test]
  fn test_signature_distinguishes_params_and_method() {
    let page0 = Request::get("/api/products").with_param("skip", 0);
    let page1 = Request::get("/api/products").with_param("skip", 20);
    let post = Request::post("/api/products").with_param("skip", 0);

    assert_ne!(Signature::of(&page0), Signature::of(&page1));
    assert_ne!(Signature::of(&page0), Signature::of(&post));
  }

  #[test]
  fn test_signature_normalizes_endpoint() {
    let a = Signature::of(&Request::get("/api/cart/"));
    let b = Signature::of(&Request::get(" /api/cart"));
    assert_eq!(a, b);
    assert_eq!(a.describe(), "GET /api/cart");
    assert_eq!(Signature::of(&Request::get("/")).describe(), "GET /");
  }

  #[test]
  fn test_signature_describes_sorted_query() {
    let sig = Signature::of(
      &Request::get("/api/products")
        .with_param("skip", 0)
        .with_param("limit", 20),
    );
    assert_eq!(sig.describe(), "GET /api/products?limit=20&skip=0");
    assert_eq!(sig.hash().len(), 64);
  }

  #[test]
  fn test_signature_body_key_order_is_irrelevant() {
    let a = Request::post("/api/cart/items")
      .with_body(serde_json::json!({"product_id": 1, "quantity": 2}));
    let b = Request::post("/api/cart/items")
      .with_body(serde_json::json!({"quantity": 2, "product_id": 1}));
    assert_eq!(Signature::of(&a), Signature::of(&b));
  }
}
