//! Redis cache engine
//!
//! Reads go through the [`EndpointRouter`], so they prefer the read-only
//! replica and fall back to the backup endpoint while the breaker is open.
//! Writes always target the primary.

use crate::client::{ClientFactory, PooledClientFactory, RemoteClient, remote_error};
use crate::config::RedisCacheConfig;
use crate::health::{HealthMonitor, PingProbe, Probe};
use crate::router::EndpointRouter;
use async_trait::async_trait;
use keystone_cache::{Cache, CacheError, CacheResult, CacheValue};
use redis::{Cmd, FromRedisValue};
use std::sync::Arc;
use std::time::Duration;

/// Redis-backed cache with replica reads and backup failover
#[derive(Debug)]
pub struct RedisCache {
	config: RedisCacheConfig,
	router: EndpointRouter,
}

impl RedisCache {
	/// Connect to the configured endpoints and start the health monitor.
	///
	/// # Examples
	///
	/// ```no_run
	/// use keystone_cache::{Cache, CacheValue};
	/// use keystone_redis::{RedisCache, RedisCacheConfig};
	///
	/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
	/// let cache = RedisCache::connect(RedisCacheConfig::new("redis://localhost:6379"))?;
	/// cache.set("user:1", CacheValue::from("ada"), 300).await?;
	/// # Ok(())
	/// # }
	/// ```
	pub fn connect(config: RedisCacheConfig) -> CacheResult<Self> {
		Self::with_factory(config, &PooledClientFactory)
	}

	/// Build the endpoint clients through `factory`.
	///
	/// The probe pings the read-only endpoint when one is configured, the
	/// primary otherwise.
	pub fn with_factory(config: RedisCacheConfig, factory: &dyn ClientFactory) -> CacheResult<Self> {
		config.validate()?;

		let primary = factory.create(&config.primary)?;
		let read_only = config
			.read_only
			.as_ref()
			.map(|endpoint| factory.create(endpoint))
			.transpose()?;
		let backup = config
			.backup
			.as_ref()
			.map(|endpoint| factory.create(endpoint))
			.transpose()?;

		let probe_target = read_only.clone().unwrap_or_else(|| primary.clone());
		let probe = Arc::new(PingProbe::new(probe_target, config.breaker.probe_attempts));

		let cache = Self::from_parts(config, primary, read_only, backup, probe);
		if tokio::runtime::Handle::try_current().is_ok() {
			cache.router.monitor().start();
		} else {
			tracing::warn!(
				endpoint = %cache.config.primary.url,
				"No Tokio runtime available, health probe loop not started"
			);
		}
		Ok(cache)
	}

	/// Assemble a cache from existing clients. The probe loop is not
	/// started; call [`HealthMonitor::start`] through [`RedisCache::monitor`].
	pub fn from_parts(
		config: RedisCacheConfig,
		primary: Arc<dyn RemoteClient>,
		read_only: Option<Arc<dyn RemoteClient>>,
		backup: Option<Arc<dyn RemoteClient>>,
		probe: Arc<dyn Probe>,
	) -> Self {
		let monitor = HealthMonitor::new(config.primary.url.clone(), config.breaker.clone(), probe);
		let router = EndpointRouter::new(primary, read_only, backup, monitor);
		Self { config, router }
	}

	pub fn config(&self) -> &RedisCacheConfig {
		&self.config
	}

	pub fn router(&self) -> &EndpointRouter {
		&self.router
	}

	pub fn monitor(&self) -> &Arc<HealthMonitor> {
		self.router.monitor()
	}

	/// Stop the health monitor.
	pub fn shutdown(&self) {
		self.router.monitor().shutdown();
	}

	/// Run a read command through the router and convert the reply.
	pub(crate) async fn read_as<T: FromRedisValue>(&self, cmd: &Cmd) -> CacheResult<T> {
		let reply = self.router.read(cmd).await?;
		redis::from_redis_value(&reply).map_err(remote_error)
	}

	/// Run a write command on the primary and convert the reply.
	pub(crate) async fn write_as<T: FromRedisValue>(&self, cmd: &Cmd) -> CacheResult<T> {
		let reply = self.router.write(cmd).await?;
		redis::from_redis_value(&reply).map_err(remote_error)
	}

	/// Run a blocking command on the primary, allowing it `wait_secs` on the server.
	pub(crate) async fn write_blocking_as<T: FromRedisValue>(
		&self,
		cmd: &Cmd,
		wait_secs: f64,
	) -> CacheResult<T> {
		let reply = self.router.write_blocking(cmd, blocking_wait(wait_secs)).await?;
		redis::from_redis_value(&reply).map_err(remote_error)
	}

	async fn adjust(&self, command: &str, key: &str) -> CacheResult<i64> {
		let mut cmd = redis::cmd(command);
		cmd.arg(key);
		self.write_as(&cmd).await.map_err(counter_error)
	}
}

/// Server-side wait of a blocking command. Zero means no server-side limit.
fn blocking_wait(wait_secs: f64) -> Duration {
	if wait_secs > 0.0 {
		Duration::try_from_secs_f64(wait_secs).unwrap_or(Duration::MAX)
	} else {
		Duration::MAX
	}
}

/// Server-side counter failures, reported with the in-process error kinds.
fn counter_error(err: CacheError) -> CacheError {
	match err {
		CacheError::Backend(message) if message.contains("not an integer") => {
			CacheError::Type(message)
		}
		CacheError::Backend(message) if message.contains("overflow") => {
			CacheError::Overflow(message)
		}
		other => other,
	}
}

#[async_trait]
impl Cache for RedisCache {
	async fn exists(&self, key: &str) -> CacheResult<bool> {
		let mut cmd = redis::cmd("EXISTS");
		cmd.arg(key);
		self.read_as(&cmd).await
	}

	async fn get(&self, key: &str) -> CacheResult<Option<CacheValue>> {
		let mut cmd = redis::cmd("GET");
		cmd.arg(key);
		let value: Option<Vec<u8>> = self.read_as(&cmd).await?;
		Ok(value.map(CacheValue::from_bytes))
	}

	async fn set(&self, key: &str, value: CacheValue, ttl_secs: i64) -> CacheResult<()> {
		let mut cmd = redis::cmd("SET");
		cmd.arg(key).arg(value.to_bytes());
		if ttl_secs > 0 {
			cmd.arg("EX").arg(ttl_secs);
		}
		self.write_as(&cmd).await
	}

	async fn incr(&self, key: &str) -> CacheResult<i64> {
		self.adjust("INCR", key).await
	}

	async fn decr(&self, key: &str) -> CacheResult<i64> {
		self.adjust("DECR", key).await
	}

	async fn delete(&self, key: &str) -> CacheResult<()> {
		let mut cmd = redis::cmd("DEL");
		cmd.arg(key);
		let _: i64 = self.write_as(&cmd).await?;
		Ok(())
	}

	async fn expire(&self, key: &str, ttl_secs: i64) -> CacheResult<bool> {
		if ttl_secs > 0 {
			let mut cmd = redis::cmd("EXPIRE");
			cmd.arg(key).arg(ttl_secs);
			return self.write_as(&cmd).await;
		}

		// PERSIST answers 0 for keys without a ttl, which still exist
		let mut cmd = redis::cmd("PERSIST");
		cmd.arg(key);
		let persisted: bool = self.write_as(&cmd).await?;
		if persisted {
			return Ok(true);
		}
		let mut cmd = redis::cmd("EXISTS");
		cmd.arg(key);
		self.write_as(&cmd).await
	}

	async fn clear_all(&self) -> CacheResult<()> {
		self.write_as(&redis::cmd("FLUSHDB")).await
	}
}
