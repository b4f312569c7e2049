//! HTTP transport for the storefront API.

use futures::FutureExt;
use reqwest::{header, Client, Response, StatusCode, Url};
use serde_json::Value;
use std::time::Duration;

use crate::error::SyncError;
use crate::fetcher::{FetchFuture, Fetcher, Method, Request};

/// [`Fetcher`] that talks JSON over HTTP to the storefront API.
#[derive(Clone)]
pub struct HttpFetcher {
  client: Client,
  base: Url,
  token: Option<String>,
}

impl HttpFetcher {
  /// `base` may carry a path prefix (`https://host/shop`); endpoints are
  /// resolved beneath it.
  pub fn new(mut base: Url, timeout: Duration, token: Option<String>) -> Result<Self, SyncError> {
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }
    let client = Client::builder()
      .user_agent(concat!("storefront-sync/", env!("CARGO_PKG_VERSION")))
      .timeout(timeout)
      .build()
      .map_err(|e| SyncError::Network(format!("failed to build http client: {}", e)))?;
    Ok(Self {
      client,
      base,
      token,
    })
  }

  pub fn is_authenticated(&self) -> bool {
    self.token.is_some()
  }

  fn url(&self, request: &Request) -> Result<Url, SyncError> {
    let mut url = self
      .base
      .join(request.endpoint.trim_start_matches('/'))
      .map_err(|e| SyncError::Network(format!("invalid endpoint {}: {}", request.endpoint, e)))?;
    if !request.params.is_empty() {
      let mut pairs = url.query_pairs_mut();
      for (k, v) in request.params.iter() {
        pairs.append_pair(k, v);
      }
    }
    Ok(url)
  }

  async fn send(self, request: Request) -> Result<Value, SyncError> {
    let url = self.url(&request)?;
    let method = match request.method {
      Method::Get => reqwest::Method::GET,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Delete => reqwest::Method::DELETE,
    };

    let mut builder = self.client.request(method, url);
    if let Some(token) = &self.token {
      builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| SyncError::Network(e.to_string()))?;
    Self::handle(response).await
  }

  async fn handle(response: Response) -> Result<Value, SyncError> {
    let status = response.status();
    let bytes = response
      .bytes()
      .await
      .map_err(|e| SyncError::Network(e.to_string()))?;

    if status.is_success() {
      if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
      }
      return Ok(serde_json::from_slice(&bytes)?);
    }

    let message = error_message(&bytes, status);
    if status.is_client_error() {
      Err(SyncError::Validation {
        status: status.as_u16(),
        message,
      })
    } else {
      Err(SyncError::Server {
        status: status.as_u16(),
        message,
      })
    }
  }
}

impl Fetcher for HttpFetcher {
  fn execute(&self, request: Request) -> FetchFuture {
    self.clone().send(request).boxed()
  }
}

/// The server's explanation of a failed request.
///
/// Errors arrive as `{"detail": "..."}`, or a list of field errors for
/// rejected payloads; anything else is passed through as text.
fn error_message(body: &[u8], status: StatusCode) -> String {
  let text = String::from_utf8_lossy(body).trim().to_string();
  match serde_json::from_slice::<Value>(body) {
    Ok(Value::Object(map)) => match map.get("detail") {
      Some(Value::String(detail)) => detail.clone(),
      Some(Value::Array(items)) => items
        .iter()
        .map(|item| match item.get("msg").and_then(Value::as_str) {
          Some(msg) => msg.to_string(),
          None => item.to_string(),
        })
        .collect::<Vec<_>>()
        .join("; "),
      Some(other) => other.to_string(),
      None => text,
    },
    _ if text.is_empty() => status
      .canonical_reason()
      .unwrap_or("request failed")
      .to_string(),
    _ => text,
  }
}
