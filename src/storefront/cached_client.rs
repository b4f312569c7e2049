//! Typed storefront operations over the sync engine.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cache::CacheResult;
use crate::engine::{MutationDescriptor, QueryDescriptor, SyncEngine};
use crate::error::SyncError;
use crate::fetcher::Params;
use crate::pagination::InfiniteFeed;

use super::endpoints::{self, ProductListing};
use super::types::{
  Banner, Cart, Category, NewOrder, NewReview, Order, Product, ProductPage, Review, WishlistEntry,
};

/// Storefront client with transparent caching.
///
/// Reads go through the shared cache and are deduplicated; writes invalidate
/// the views they affect, so every mounted consumer refreshes.
#[derive(Clone)]
pub struct StorefrontClient {
  engine: SyncEngine,
}

impl StorefrontClient {
  pub fn new(engine: SyncEngine) -> Self {
    Self { engine }
  }

  pub fn engine(&self) -> &SyncEngine {
    &self.engine
  }

  /// Drop every cached response; used when the session ends.
  pub fn sign_out(&self) {
    self.engine.clear();
  }

  /// Product catalog as an infinite feed.
  pub fn product_feed(&self, page_size: usize) -> InfiniteFeed<ProductListing> {
    InfiniteFeed::new(self.engine.clone(), ProductListing, page_size)
  }

  pub async fn products(&self, filters: &Params) -> Result<CacheResult<ProductPage>, SyncError> {
    self.public(&endpoints::products(filters)).await
  }

  pub async fn product(&self, id: u64) -> Result<CacheResult<Product>, SyncError> {
    self.public(&endpoints::product(id)).await
  }

  pub async fn categories(&self) -> Result<CacheResult<Vec<Category>>, SyncError> {
    self.public(&endpoints::categories()).await
  }

  pub async fn banners(&self) -> Result<CacheResult<Vec<Banner>>, SyncError> {
    self.public(&endpoints::banners()).await
  }

  pub async fn reviews(&self, product_id: u64) -> Result<CacheResult<Vec<Review>>, SyncError> {
    self.public(&endpoints::reviews(product_id)).await
  }

  /// The signed-in user's cart; `None` for an anonymous session.
  pub async fn cart(&self) -> Result<Option<CacheResult<Cart>>, SyncError> {
    self.read(&endpoints::cart()).await
  }

  pub async fn orders(&self) -> Result<Option<CacheResult<Vec<Order>>>, SyncError> {
    self.read(&endpoints::orders()).await
  }

  pub async fn wishlist(&self) -> Result<Option<CacheResult<Vec<WishlistEntry>>>, SyncError> {
    self.read(&endpoints::wishlist()).await
  }

  pub async fn add_to_cart(&self, product_id: u64, quantity: u32) -> Result<Value, SyncError> {
    self.write(&endpoints::add_to_cart(product_id, quantity)).await
  }

  pub async fn update_cart_item(&self, item_id: u64, quantity: u32) -> Result<Value, SyncError> {
    self.write(&endpoints::update_cart_item(item_id, quantity)).await
  }

  pub async fn remove_from_cart(&self, item_id: u64) -> Result<Value, SyncError> {
    self.write(&endpoints::remove_from_cart(item_id)).await
  }

  pub async fn create_order(&self, order: &NewOrder) -> Result<Order, SyncError> {
    let payload = self.write(&endpoints::create_order(order)?).await?;
    Ok(serde_json::from_value(payload)?)
  }

  pub async fn add_to_wishlist(&self, product_id: u64) -> Result<Value, SyncError> {
    self.write(&endpoints::add_to_wishlist(product_id)).await
  }

  pub async fn remove_from_wishlist(&self, product_id: u64) -> Result<Value, SyncError> {
    self.write(&endpoints::remove_from_wishlist(product_id)).await
  }

  pub async fn create_review(&self, review: &NewReview) -> Result<Review, SyncError> {
    let payload = self.write(&endpoints::create_review(review)?).await?;
    Ok(serde_json::from_value(payload)?)
  }

  /// Admin: create a product.
  pub async fn create_product(&self, product: Value) -> Result<Value, SyncError> {
    self.write(&endpoints::create_product(product)).await
  }

  /// Admin: update a product.
  pub async fn update_product(&self, id: u64, changes: Value) -> Result<Value, SyncError> {
    self.write(&endpoints::update_product(id, changes)).await
  }

  /// Admin: delete a product.
  pub async fn delete_product(&self, id: u64) -> Result<Value, SyncError> {
    self.write(&endpoints::delete_product(id)).await
  }

  async fn read<T: DeserializeOwned>(
    &self,
    descriptor: &QueryDescriptor,
  ) -> Result<Option<CacheResult<T>>, SyncError> {
    match self.engine.query(descriptor).await? {
      Some(result) => Ok(Some(result.decode()?)),
      None => Ok(None),
    }
  }

  /// Queries that never need a session are never skipped.
  async fn public<T: DeserializeOwned>(
    &self,
    descriptor: &QueryDescriptor,
  ) -> Result<CacheResult<T>, SyncError> {
    self.read(descriptor).await?.ok_or_else(|| SyncError::Validation {
      status: 401,
      message: format!("{} requires a signed-in session", descriptor.signature()),
    })
  }

  async fn write(&self, descriptor: &MutationDescriptor) -> Result<Value, SyncError> {
    let payload = self.engine.mutate(descriptor).await?;
    Ok(payload.as_ref().clone())
  }
}
