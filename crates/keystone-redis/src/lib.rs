//! Redis engine for Keystone
//!
//! A logical cache spans up to three endpoints:
//!
//! - **primary**: receives every write, and reads when nothing else is set
//! - **read-only**: preferred for reads while the breaker is closed
//! - **backup**: serves reads while the breaker is open
//!
//! A [`HealthMonitor`] pings the read-only endpoint (or the primary) on a
//! fixed interval and counts failures together with the connectivity errors
//! seen by reads. Once the count reaches the threshold, reads move to the
//! backup. A read that hits an unreachable endpoint while the breaker is
//! still closed is retried once on the backup.
//!
//! ## Example
//!
//! ```no_run
//! use keystone_cache::{Cache, CacheValue, EndpointConfig};
//! use keystone_redis::{RedisCache, RedisCacheConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RedisCacheConfig::new("redis://10.0.1.11:6379/0")
//!     .with_read_only(EndpointConfig::new("redis://10.0.1.12:6379/0"))
//!     .with_backup(EndpointConfig::new("redis://10.0.2.11:6379/0"));
//! let cache = RedisCache::connect(config)?;
//!
//! cache.set("visits", CacheValue::Int(0), 0).await?;
//! cache.incr("visits").await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod client;
pub mod config;
pub mod health;
pub mod router;
mod structures;

pub use backend::RedisCache;
pub use client::{ClientFactory, PooledClient, PooledClientFactory, RemoteClient, remote_error};
pub use config::{BreakerConfig, RedisCacheConfig};
pub use health::{BreakerState, HealthMonitor, PingProbe, Probe};
pub use router::{EndpointRole, EndpointRouter, is_connectivity_error};
