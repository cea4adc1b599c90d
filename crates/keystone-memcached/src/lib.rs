//! Memcached engine for Keystone
//!
//! ```rust,no_run
//! use keystone_cache::{Cache, CacheValue};
//! use keystone_memcached::MemcachedCache;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = MemcachedCache::from_url("127.0.0.1:11211").await?;
//! cache.set("key", CacheValue::from("value"), 60).await?;
//! assert_eq!(cache.get_string("key").await?, "value");
//! # Ok(())
//! # }
//! ```

pub mod memcached;

pub use memcached::{MemcachedCache, MemcachedConfig};
