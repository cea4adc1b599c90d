//! Registry of constructed caches
//!
//! [`CacheRegistry`] hands out one shared cache per engine and endpoint. It is
//! created by the application at startup and passed to whoever needs a cache.
//! Entries are never evicted; when two tasks race to create the same entry,
//! the first one to take the write lock wins and both receive its instance.

use keystone_cache::{Cache, CacheError, CacheResult, EndpointConfig, InMemoryCache, StoreConfig};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

#[cfg(feature = "memcached-backend")]
use keystone_memcached::{MemcachedCache, MemcachedConfig};
#[cfg(feature = "redis-backend")]
use keystone_redis::{RedisCache, RedisCacheConfig};

/// Storage engine behind a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineType {
	Memory,
	Redis,
	Memcached,
}

impl EngineType {
	pub fn as_str(&self) -> &'static str {
		match self {
			EngineType::Memory => "memory",
			EngineType::Redis => "redis",
			EngineType::Memcached => "memcached",
		}
	}
}

impl fmt::Display for EngineType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for EngineType {
	type Err = CacheError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"memory" | "runtime" => Ok(EngineType::Memory),
			"redis" => Ok(EngineType::Redis),
			"memcached" | "memcache" => Ok(EngineType::Memcached),
			other => Err(CacheError::Configuration(format!(
				"unknown cache engine {:?}",
				other
			))),
		}
	}
}

struct Registered {
	cache: Arc<dyn Cache>,
	pool: Option<EndpointConfig>,
}

/// Shared caches keyed by engine and endpoint.
///
/// # Examples
///
/// ```
/// use keystone::CacheRegistry;
/// use keystone_cache::CacheValue;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = CacheRegistry::new();
///
/// let cache = registry.in_memory().await?;
/// cache.set("greeting", CacheValue::from("hello"), 0).await?;
///
/// let again = registry.in_memory().await?;
/// assert_eq!(again.get_string("greeting").await?, "hello");
/// # Ok(())
/// # }
/// ```
pub struct CacheRegistry {
	entries: RwLock<HashMap<(EngineType, String), Registered>>,
	store_config: StoreConfig,
}

impl CacheRegistry {
	pub fn new() -> Self {
		Self::with_store_config(StoreConfig::default())
	}

	/// Registry whose in-memory caches use `store_config`.
	pub fn with_store_config(store_config: StoreConfig) -> Self {
		Self {
			entries: RwLock::new(HashMap::new()),
			store_config,
		}
	}

	/// The shared in-memory cache.
	pub async fn in_memory(&self) -> CacheResult<Arc<dyn Cache>> {
		self.get_or_create(EngineType::Memory, &EndpointConfig::default())
			.await
	}

	/// A fresh in-memory cache that is not registered.
	pub fn new_in_memory(&self) -> InMemoryCache {
		InMemoryCache::with_config(&self.store_config)
	}

	/// Get the cache for `engine` at `endpoint`, creating it on first use.
	///
	/// Pool settings only apply when the cache is created; a later call with
	/// different settings receives the existing instance.
	pub async fn get_or_create(
		&self,
		engine: EngineType,
		endpoint: &EndpointConfig,
	) -> CacheResult<Arc<dyn Cache>> {
		let store_config = self.store_config.clone();
		let pool = (engine != EngineType::Memory).then(|| endpoint.clone());

		self.get_or_insert_with(engine, endpoint_key(engine, &endpoint.url), pool, || async move {
			match engine {
				EngineType::Memory => {
					Ok(Arc::new(InMemoryCache::with_config(&store_config)) as Arc<dyn Cache>)
				}
				EngineType::Redis => build_redis(endpoint),
				EngineType::Memcached => build_memcached(endpoint).await,
			}
		})
		.await
	}

	/// Get or create a Redis cache with read-only and backup endpoints.
	///
	/// The cache is registered under its primary address.
	#[cfg(feature = "redis-backend")]
	pub async fn get_or_create_redis(&self, config: RedisCacheConfig) -> CacheResult<Arc<dyn Cache>> {
		let key = endpoint_key(EngineType::Redis, config.endpoint_key());
		let pool = Some(config.primary.clone());

		self.get_or_insert_with(EngineType::Redis, key, pool, move || async move {
			Ok(Arc::new(RedisCache::connect(config)?) as Arc<dyn Cache>)
		})
		.await
	}

	/// Get or create a Memcached cache over `config.servers`.
	#[cfg(feature = "memcached-backend")]
	pub async fn get_or_create_memcached(
		&self,
		config: MemcachedConfig,
	) -> CacheResult<Arc<dyn Cache>> {
		let key = endpoint_key(EngineType::Memcached, &config.endpoint_key());

		self.get_or_insert_with(EngineType::Memcached, key, None, move || async move {
			Ok(Arc::new(MemcachedCache::connect(config).await?) as Arc<dyn Cache>)
		})
		.await
	}

	/// Whether a cache is registered for `engine` at `endpoint`.
	pub async fn contains(&self, engine: EngineType, endpoint: &str) -> bool {
		let key = (engine, endpoint_key(engine, endpoint));
		self.entries.read().await.contains_key(&key)
	}

	pub async fn len(&self) -> usize {
		self.entries.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.entries.read().await.is_empty()
	}

	async fn get_or_insert_with<F, Fut>(
		&self,
		engine: EngineType,
		key: String,
		pool: Option<EndpointConfig>,
		build: F,
	) -> CacheResult<Arc<dyn Cache>>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = CacheResult<Arc<dyn Cache>>>,
	{
		{
			let entries = self.entries.read().await;
			if let Some(existing) = entries.get(&(engine, key.clone())) {
				warn_if_pool_differs(engine, &key, existing, pool.as_ref());
				return Ok(existing.cache.clone());
			}
		}

		let mut entries = self.entries.write().await;
		// Another task may have registered it while we waited for the lock
		if let Some(existing) = entries.get(&(engine, key.clone())) {
			warn_if_pool_differs(engine, &key, existing, pool.as_ref());
			return Ok(existing.cache.clone());
		}

		let cache = build().await?;
		tracing::debug!(engine = %engine, endpoint = %key, "Registered cache");
		entries.insert(
			(engine, key),
			Registered {
				cache: cache.clone(),
				pool,
			},
		);
		Ok(cache)
	}
}

impl Default for CacheRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for CacheRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CacheRegistry")
			.field("store_config", &self.store_config)
			.finish_non_exhaustive()
	}
}

fn endpoint_key(engine: EngineType, endpoint: &str) -> String {
	match engine {
		EngineType::Memory => String::new(),
		_ => endpoint.trim().to_string(),
	}
}

fn warn_if_pool_differs(
	engine: EngineType,
	key: &str,
	existing: &Registered,
	requested: Option<&EndpointConfig>,
) {
	if let (Some(current), Some(requested)) = (existing.pool.as_ref(), requested)
		&& !current.same_pool(requested)
	{
		tracing::warn!(
			engine = %engine,
			endpoint = %key,
			max_idle = requested.max_idle,
			max_active = requested.max_active,
			"Cache already registered, ignoring new pool settings"
		);
	}
}

#[cfg(feature = "redis-backend")]
fn build_redis(endpoint: &EndpointConfig) -> CacheResult<Arc<dyn Cache>> {
	let config = RedisCacheConfig::default().with_primary(endpoint.clone());
	Ok(Arc::new(RedisCache::connect(config)?))
}

#[cfg(not(feature = "redis-backend"))]
fn build_redis(_endpoint: &EndpointConfig) -> CacheResult<Arc<dyn Cache>> {
	Err(CacheError::Configuration(
		"the redis engine is not enabled, build with the `redis-backend` feature".to_string(),
	))
}

#[cfg(feature = "memcached-backend")]
async fn build_memcached(endpoint: &EndpointConfig) -> CacheResult<Arc<dyn Cache>> {
	let config = MemcachedConfig::new(endpoint.url.split(',').map(str::trim));
	Ok(Arc::new(MemcachedCache::connect(config).await?))
}

#[cfg(not(feature = "memcached-backend"))]
async fn build_memcached(_endpoint: &EndpointConfig) -> CacheResult<Arc<dyn Cache>> {
	Err(CacheError::Configuration(
		"the memcached engine is not enabled, build with the `memcached-backend` feature"
			.to_string(),
	))
}
