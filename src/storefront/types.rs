//! Serde types matching the storefront API responses.
//!
//! Only the client's view of server state: prices, stock and order status are
//! carried as the server reports them and never computed here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
  pub id: u64,
  pub name: String,
  pub slug: String,
  pub description: Option<String>,
  pub image: Option<String>,
  #[serde(default)]
  pub is_active: bool,
  #[serde(default)]
  pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
  pub id: u64,
  pub name: String,
  #[serde(default)]
  pub slug: String,
  pub description: Option<String>,
  pub price: f64,
  pub discount_price: Option<f64>,
  pub brand: Option<String>,
  pub sku: Option<String>,
  #[serde(default)]
  pub stock: i64,
  #[serde(default)]
  pub images: Vec<String>,
  #[serde(default)]
  pub category_id: u64,
  pub category: Option<Category>,
  #[serde(default)]
  pub is_featured: bool,
  #[serde(default)]
  pub is_active: bool,
  #[serde(default)]
  pub rating: f64,
  #[serde(default)]
  pub review_count: u64,
  #[serde(default)]
  pub created_at: String,
}

/// One page of the product listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductPage {
  #[serde(default)]
  pub products: Vec<Product>,
  #[serde(default)]
  pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Banner {
  pub id: u64,
  pub title: String,
  pub subtitle: Option<String>,
  pub image: String,
  pub link: Option<String>,
  #[serde(default)]
  pub position: i64,
  #[serde(default)]
  pub is_active: bool,
  #[serde(default)]
  pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
  pub id: u64,
  pub email: String,
  pub username: String,
  pub full_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
  pub id: u64,
  pub user_id: u64,
  pub product_id: u64,
  pub rating: u8,
  pub title: Option<String>,
  pub comment: Option<String>,
  #[serde(default)]
  pub created_at: String,
  pub user: Option<User>,
}

// ============================================================================
// Cart, wishlist, orders
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
  pub id: u64,
  pub product_id: u64,
  pub quantity: u32,
  pub product: Option<Product>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
  pub id: u64,
  #[serde(default)]
  pub items: Vec<CartItem>,
}

impl Cart {
  /// Total units across lines, as shown on the cart badge.
  pub fn item_count(&self) -> u32 {
    self.items.iter().map(|item| item.quantity).sum()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WishlistEntry {
  pub id: u64,
  pub product_id: u64,
  #[serde(default)]
  pub created_at: String,
  pub product: Option<Product>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
  pub id: u64,
  pub product_id: u64,
  pub quantity: u32,
  pub price: f64,
  pub product: Option<Product>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
  pub id: u64,
  pub order_number: String,
  pub status: String,
  pub total_amount: f64,
  #[serde(default)]
  pub shipping_address: BTreeMap<String, serde_json::Value>,
  #[serde(default)]
  pub payment_method: String,
  #[serde(default)]
  pub payment_status: String,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub items: Vec<OrderItem>,
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct NewOrder {
  pub shipping_address: BTreeMap<String, String>,
  pub payment_method: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewReview {
  pub product_id: u64,
  pub rating: u8,
  pub title: Option<String>,
  pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_cart_item_count_sums_quantities() {
    let cart: Cart = serde_json::from_value(json!({
      "id": 1,
      "items": [
        {"id": 1, "product_id": 10, "quantity": 2},
        {"id": 2, "product_id": 11, "quantity": 3}
      ]
    }))
    .unwrap();
    assert_eq!(cart.item_count(), 5);
  }

  #[test]
  fn test_product_page_tolerates_sparse_products() {
    let page: ProductPage = serde_json::from_value(json!({
      "products": [{"id": 7, "name": "Lamp", "price": 19.5}],
      "total": 1
    }))
    .unwrap();
    assert_eq!(page.products[0].name, "Lamp");
    assert!(page.products[0].images.is_empty());
  }
}
