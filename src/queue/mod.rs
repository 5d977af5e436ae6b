//! Durable queue of outbound requests awaiting delivery.
//!
//! Records survive restarts and are never reordered. The `delivered` flag only
//! moves from false to true; delivered records stay as an audit trail until
//! [`QueueStore::purge_delivered`] is called explicitly.

mod store;

pub use store::{QueueStore, QueuedRequest};
