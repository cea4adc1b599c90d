//! Cache facade, tagged values and the in-process TTL store.
//!
//! ## Engines
//!
//! - **InMemoryCache**: [`ItemStore`] with lazy expiry and a periodic sweep
//! - **Redis**: provided by `keystone-redis`, with endpoint failover
//! - **Memcached**: provided by `keystone-memcached`
//!
//! All engines implement [`Cache`] and [`StructureOps`], so callers can hold
//! an `Arc<dyn Cache>` without knowing which engine serves it.
//!
//! ## Example
//!
//! ```
//! use keystone_cache::{Cache, CacheValue, InMemoryCache};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let cache = InMemoryCache::new();
//!
//! cache.set("greeting", CacheValue::from("hello"), 300).await.unwrap();
//! assert_eq!(cache.get_string("greeting").await.unwrap(), "hello");
//!
//! cache.delete("greeting").await.unwrap();
//! assert!(!cache.exists("greeting").await.unwrap());
//! # }
//! ```

pub mod cache_trait;
pub mod config;
mod entry;
pub mod error;
pub mod in_memory;
pub mod statistics;
pub mod store;
pub mod value;

pub use cache_trait::{Cache, CacheExt, ListPosition, Message, StructureOps};
pub use config::{EndpointConfig, StoreConfig};
pub use error::{CacheError, CacheResult};
pub use in_memory::InMemoryCache;
pub use statistics::{CacheEntryInfo, CacheStatistics};
pub use store::ItemStore;
pub use value::CacheValue;
