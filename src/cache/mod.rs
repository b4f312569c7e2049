//! Tag-addressed response cache.
//!
//! - Entries are keyed by a normalized request [`Signature`]
//! - Each entry carries invalidation [`Tag`]s, indexed in reverse by [`TagIndex`]
//! - Entries are replaced wholesale, never patched in place
//! - Invalidation marks entries stale but keeps their last-known-good payload

mod signature;
mod storage;
mod tags;
mod traits;

pub use signature::Signature;
pub use storage::CacheStore;
pub use tags::TagIndex;
pub use traits::{CacheEntry, CacheEvent, CacheResult, CacheSource, EntryStatus, Tag};
