//! The network seam: a resource descriptor and the capability that executes it.

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::SyncError;

/// HTTP-style method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
  Get,
  Post,
  Put,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Delete => "DELETE",
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Query-string parameters.
///
/// Backed by a sorted map, so two parameter sets with the same pairs compare
/// equal regardless of the order they were inserted in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Params(BTreeMap<String, String>);

impl Params {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builder-style insert.
  pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
    self.insert(key, value);
    self
  }

  pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
    self.0.insert(key.into(), value.to_string());
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.0.get(key).map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// Copy of these params without blank values.
  ///
  /// Filter forms leave unset fields as empty strings; those must not reach
  /// the server or the cache signature.
  pub fn without_blank(&self) -> Self {
    Self(
      self
        .0
        .iter()
        .filter(|(_, v)| !v.trim().is_empty())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect(),
    )
  }

  /// Merge `other` on top of these params.
  pub fn merged(&self, other: &Params) -> Self {
    let mut merged = self.clone();
    for (k, v) in other.iter() {
      merged.insert(k, v);
    }
    merged
  }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Params {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    let mut params = Params::new();
    for (k, v) in iter {
      params.insert(k, v);
    }
    params
  }
}

/// One network call: endpoint path, parameters, method and optional body.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
  pub method: Method,
  pub endpoint: String,
  pub params: Params,
  pub body: Option<Value>,
}

impl Request {
  pub fn get(endpoint: impl Into<String>) -> Self {
    Self::new(Method::Get, endpoint)
  }

  pub fn post(endpoint: impl Into<String>) -> Self {
    Self::new(Method::Post, endpoint)
  }

  pub fn put(endpoint: impl Into<String>) -> Self {
    Self::new(Method::Put, endpoint)
  }

  pub fn delete(endpoint: impl Into<String>) -> Self {
    Self::new(Method::Delete, endpoint)
  }

  fn new(method: Method, endpoint: impl Into<String>) -> Self {
    Self {
      method,
      endpoint: endpoint.into(),
      params: Params::new(),
      body: None,
    }
  }

  pub fn with_params(mut self, params: Params) -> Self {
    self.params = params;
    self
  }

  pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
    self.params.insert(key, value);
    self
  }

  pub fn with_body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }
}

/// Future returned by a fetcher.
pub type FetchFuture = BoxFuture<'static, Result<Value, SyncError>>;

/// Capability that performs the actual network transport.
///
/// The engine never looks at credentials or connections; it only hands a
/// request to the fetcher and waits for the payload or the error.
pub trait Fetcher: Send + Sync + 'static {
  fn execute(&self, request: Request) -> FetchFuture;
}

impl<F> Fetcher for F
where
  F: Fn(Request) -> FetchFuture + Send + Sync + 'static,
{
  fn execute(&self, request: Request) -> FetchFuture {
    self(request)
  }
}
