//! Versioned response caches for offline support.
//!
//! This module provides:
//! - Two named buckets (static, dynamic) per cache generation
//! - Whole-entry overwrite on put, lookup across live generations
//! - Eviction of every generation that no longer matches the configured version

mod key;
mod manager;
mod storage;
mod types;

pub use key::CacheKey;
pub use manager::CacheManager;
pub use storage::{CacheStorage, SqliteStorage};
pub use types::{Bucket, CachedEntry, GenerationInfo};
