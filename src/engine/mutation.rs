//! Write path: run the request, then invalidate its declared tags.

use serde_json::Value;
use std::sync::Arc;

use super::{MutationDescriptor, SyncEngine};
use crate::error::SyncError;

impl SyncEngine {
  /// Execute a write and, only if it succeeds, invalidate every cache entry
  /// carrying one of the descriptor's tags.
  ///
  /// Invalidated entries are marked stale rather than refetched here; their
  /// subscribers receive `Invalidated` and query again, so an entry touched
  /// by several tags is refetched once. Mutations are neither cached nor
  /// deduplicated.
  pub async fn mutate(&self, descriptor: &MutationDescriptor) -> Result<Arc<Value>, SyncError> {
    let request = &descriptor.request;
    tracing::debug!(method = %request.method, endpoint = %request.endpoint, "mutation");

    let payload = match self.inner.fetcher.execute(request.clone()).await {
      Ok(payload) => payload,
      Err(error) => {
        tracing::warn!(
          method = %request.method,
          endpoint = %request.endpoint,
          error = %error,
          "mutation failed, nothing invalidated"
        );
        return Err(error);
      }
    };

    self.invalidate_tags(&descriptor.invalidates);
    Ok(Arc::new(payload))
  }
}
