//! In-memory result caching.
//!
//! Content-addressed store used by the synthesis queue, keyed by an xxHash of
//! the request text and options.

pub mod store;

pub use store::{CacheConfig, CacheMetrics, CacheStore, XxHasher};
