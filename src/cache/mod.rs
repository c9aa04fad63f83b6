//! Offline-first caching over the local article store.
//!
//! - Staleness is a property of a whole set: the oldest `cached_at` against a TTL
//! - Reads prefer the store; the origin is an optional enhancement
//! - Search never touches the network

mod freshness;
mod policy;
mod result;
mod search;

pub use freshness::{age_display, is_stale_at, last_updated_time};
pub use policy::CachePolicy;
pub use result::{CacheResult, CacheSource};
pub use search::{SearchGuard, SearchTicket};
