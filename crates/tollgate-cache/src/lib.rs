//! In-memory TTL store for the gateway's cacheable paths.
//!
//! Entries are immutable and replaced whole. Freshness is decided against a
//! caller-supplied [`Clock`], never the store itself.

pub mod clock;
pub mod entry;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{is_fresh, CacheEntry};
pub use store::CacheStore;
