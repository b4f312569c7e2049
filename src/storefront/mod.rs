//! The storefront API: response types, the endpoint table, the HTTP
//! transport and a typed client over the sync engine.

pub mod cached_client;
pub mod client;
pub mod endpoints;
pub mod types;

pub use cached_client::StorefrontClient;
pub use client::HttpFetcher;
pub use endpoints::ProductListing;
