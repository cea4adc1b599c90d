//! # Keystone
//!
//! A uniform key-value cache over interchangeable storage engines.
//!
//! ## Engines
//!
//! - **memory**: in-process store with per-key ttl and a periodic sweep
//! - **redis** (`redis-backend`, default): primary, read-only and backup
//!   endpoints with a circuit breaker that moves reads to the backup
//! - **memcached** (`memcached-backend`): hashed over several servers
//!
//! Every engine implements [`Cache`]. Structure operations (hashes, lists,
//! sets, sorted sets, pub/sub, scripts) live on [`StructureOps`] and fail with
//! [`CacheError::Unsupported`] on engines that lack them.
//!
//! ## Feature Flags
//!
//! - `redis-backend` (default) - Redis engine
//! - `memcached-backend` - Memcached engine
//! - `all-backends` / `full` - every engine
//!
//! ## Quick Example
//!
//! ```
//! use keystone::{CacheRegistry, CacheValue};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = CacheRegistry::new();
//! let cache = registry.in_memory().await?;
//!
//! cache.set("session:42", CacheValue::from("alice"), 1800).await?;
//! assert_eq!(cache.get_string("session:42").await?, "alice");
//! assert_eq!(cache.incr("visits").await?, 1);
//! # Ok(())
//! # }
//! ```

pub mod registry;
pub mod settings;

pub use registry::{CacheRegistry, EngineType};
pub use settings::{CacheSettings, SettingsError};

pub use keystone_cache::{
	Cache, CacheEntryInfo, CacheError, CacheExt, CacheResult, CacheStatistics, CacheValue,
	EndpointConfig, InMemoryCache, ItemStore, ListPosition, Message, StoreConfig, StructureOps,
};

#[cfg(feature = "redis-backend")]
pub use keystone_redis::{
	BreakerConfig, BreakerState, EndpointRole, HealthMonitor, RedisCache, RedisCacheConfig,
};

#[cfg(feature = "memcached-backend")]
pub use keystone_memcached::{MemcachedCache, MemcachedConfig};

/// Engine crates, for items not re-exported at the top level.
pub mod engines {
	pub use keystone_cache as cache;
	#[cfg(feature = "memcached-backend")]
	pub use keystone_memcached as memcached;
	#[cfg(feature = "redis-backend")]
	pub use keystone_redis as redis;
}
