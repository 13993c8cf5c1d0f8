//! Cache tiers backing the fetch strategies.
//!
//! A worker version owns exactly two tiers, `static` and `dynamic`. Tiers
//! live in a `CacheStorage`, either in memory or on disk as one JSON file
//! per entry.

pub mod disk;
pub mod entry;
pub mod storage;
pub mod tier;

pub use disk::DiskCacheStorage;
pub use entry::CacheEntry;
pub use storage::{CacheStorage, MemoryCacheStorage};
pub use tier::{CacheTier, TierKind, TierSet};
