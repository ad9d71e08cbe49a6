//! Caching CORS gateway in front of a single origin.
//!
//! A fixed set of paths is served from an in-memory TTL cache; every other
//! request is streamed through to the origin. All responses carry
//! `Access-Control-Allow-Origin: *`.

pub mod cache_layer;
pub mod config;
pub mod error;
pub mod headers;
pub mod metrics;
pub mod proxy;
pub mod server;
pub mod tls;
pub mod upstream;

pub use cache_layer::{CacheLayer, CacheableSet};
pub use config::Config;
pub use proxy::AppState;
