//! Client-side data sync for a storefront REST API.
//!
//! A tag-addressed response cache with invalidation, deduplicated queries,
//! mutations that invalidate what they touch, a subscription registry for
//! mounted views, and an infinite-scroll pagination controller that never
//! shows stale or duplicate pages.

pub mod auth;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod pagination;
pub mod query;
pub mod storefront;
pub mod telemetry;

pub use engine::{MutationDescriptor, QueryDescriptor, SyncEngine};
pub use error::SyncError;
pub use fetcher::{Fetcher, Params, Request};
