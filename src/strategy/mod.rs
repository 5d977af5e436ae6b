//! Request routing between network and cache.
//!
//! - Static assets: cache first
//! - HTML and everything unmatched: network first
//! - Images: stale while revalidate
//! - POST: straight to the network, deferred into the queue on failure

mod classify;
mod engine;

pub use engine::{FetchEngine, ResponseSource, Served};
