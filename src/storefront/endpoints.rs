//! Endpoint table: what each storefront request provides or invalidates.

use serde_json::{json, Value};

use crate::cache::Tag;
use crate::engine::{MutationDescriptor, QueryDescriptor};
use crate::error::SyncError;
use crate::fetcher::{Params, Request};
use crate::pagination::PageSource;

use super::types::{NewOrder, NewReview, Product, ProductPage};

pub const PRODUCTS: Tag = Tag::new("Products");
pub const CART: Tag = Tag::new("Cart");
pub const ORDERS: Tag = Tag::new("Orders");
pub const WISHLIST: Tag = Tag::new("Wishlist");
pub const REVIEWS: Tag = Tag::new("Reviews");
pub const CATEGORIES: Tag = Tag::new("Categories");
pub const BANNERS: Tag = Tag::new("Banners");

/// Products per listing page.
pub const PAGE_SIZE: usize = 20;

/// Filter keys the product listing understands.
pub const PRODUCT_FILTERS: [&str; 5] = ["category_id", "search", "min_price", "max_price", "brand"];

// ============================================================================
// Queries
// ============================================================================

pub fn products(filters: &Params) -> QueryDescriptor {
  QueryDescriptor::new(Request::get("/api/products").with_params(filters.without_blank()))
    .provides([PRODUCTS])
}

pub fn product(id: u64) -> QueryDescriptor {
  QueryDescriptor::new(Request::get(format!("/api/products/{}", id))).provides([PRODUCTS])
}

pub fn categories() -> QueryDescriptor {
  QueryDescriptor::new(Request::get("/api/categories")).provides([CATEGORIES])
}

pub fn banners() -> QueryDescriptor {
  QueryDescriptor::new(Request::get("/api/banners")).provides([BANNERS])
}

pub fn reviews(product_id: u64) -> QueryDescriptor {
  QueryDescriptor::new(Request::get(format!("/api/products/{}/reviews", product_id)))
    .provides([REVIEWS])
}

pub fn cart() -> QueryDescriptor {
  QueryDescriptor::new(Request::get("/api/cart"))
    .provides([CART])
    .authenticated()
}

pub fn orders() -> QueryDescriptor {
  QueryDescriptor::new(Request::get("/api/orders"))
    .provides([ORDERS])
    .authenticated()
}

pub fn wishlist() -> QueryDescriptor {
  QueryDescriptor::new(Request::get("/api/wishlist"))
    .provides([WISHLIST])
    .authenticated()
}

// ============================================================================
// Mutations
// ============================================================================

pub fn add_to_cart(product_id: u64, quantity: u32) -> MutationDescriptor {
  MutationDescriptor::new(
    Request::post("/api/cart/items")
      .with_body(json!({ "product_id": product_id, "quantity": quantity })),
  )
  .invalidates([CART])
}

pub fn update_cart_item(item_id: u64, quantity: u32) -> MutationDescriptor {
  MutationDescriptor::new(
    Request::put(format!("/api/cart/items/{}", item_id)).with_body(json!({ "quantity": quantity })),
  )
  .invalidates([CART])
}

pub fn remove_from_cart(item_id: u64) -> MutationDescriptor {
  MutationDescriptor::new(Request::delete(format!("/api/cart/items/{}", item_id)))
    .invalidates([CART])
}

/// Checkout empties the cart server-side, so both views go stale.
pub fn create_order(order: &NewOrder) -> Result<MutationDescriptor, SyncError> {
  let body = serde_json::to_value(order)?;
  Ok(
    MutationDescriptor::new(Request::post("/api/orders").with_body(body))
      .invalidates([ORDERS, CART]),
  )
}

pub fn add_to_wishlist(product_id: u64) -> MutationDescriptor {
  MutationDescriptor::new(Request::post(format!("/api/wishlist/{}", product_id)))
    .invalidates([WISHLIST])
}

pub fn remove_from_wishlist(product_id: u64) -> MutationDescriptor {
  MutationDescriptor::new(Request::delete(format!("/api/wishlist/{}", product_id)))
    .invalidates([WISHLIST])
}

/// A review changes the product's rating, so product entries go stale too.
pub fn create_review(review: &NewReview) -> Result<MutationDescriptor, SyncError> {
  let body = serde_json::to_value(review)?;
  Ok(
    MutationDescriptor::new(Request::post("/api/reviews").with_body(body))
      .invalidates([REVIEWS, PRODUCTS]),
  )
}

pub fn create_product(product: Value) -> MutationDescriptor {
  MutationDescriptor::new(Request::post("/api/products").with_body(product)).invalidates([PRODUCTS])
}

pub fn update_product(id: u64, changes: Value) -> MutationDescriptor {
  MutationDescriptor::new(Request::put(format!("/api/products/{}", id)).with_body(changes))
    .invalidates([PRODUCTS])
}

pub fn delete_product(id: u64) -> MutationDescriptor {
  MutationDescriptor::new(Request::delete(format!("/api/products/{}", id)))
    .invalidates([PRODUCTS])
}

// ============================================================================
// Paged listing
// ============================================================================

/// The product catalog as an infinite feed, paged with `skip`/`limit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductListing;

impl PageSource for ProductListing {
  type Item = Product;

  fn descriptor(&self, filters: &Params, offset: usize, limit: usize) -> QueryDescriptor {
    let known: Params = filters
      .iter()
      .filter(|(key, _)| PRODUCT_FILTERS.contains(key))
      .collect();
    let paging = Params::new().with("skip", offset).with("limit", limit);
    products(&known.merged(&paging))
  }

  fn items(&self, payload: &Value) -> Result<Vec<Product>, SyncError> {
    let page: ProductPage = serde_json::from_value(payload.clone())?;
    Ok(page.products)
  }
}
