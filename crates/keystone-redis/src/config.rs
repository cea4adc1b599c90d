//! Redis engine configuration

use keystone_cache::{CacheError, CacheResult, EndpointConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Failures after which the breaker opens.
pub const DEFAULT_FAILURE_THRESHOLD: u64 = 50;

/// Default delay between two probe ticks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Consecutive successful ticks that close an open breaker.
pub const DEFAULT_RECOVERY_SUCCESSES: u64 = 3;

/// PING round-trips per probe tick.
pub const DEFAULT_PROBE_ATTEMPTS: usize = 5;

/// Time allowed for one whole probe tick before it counts as failed.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Circuit breaker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
	/// Number of recorded failures at which reads move to the backup
	pub threshold: u64,
	/// Seconds between probe ticks
	pub check_interval_secs: u64,
	/// Consecutive healthy ticks that reset the failure counter.
	/// Zero keeps the breaker open once tripped.
	pub recovery_successes: u64,
	/// PING round-trips per tick; every one must answer `PONG`
	pub probe_attempts: usize,
	/// Milliseconds a tick may take before it is recorded as a failure
	pub probe_timeout_ms: u64,
}

impl BreakerConfig {
	pub fn check_interval(&self) -> Duration {
		Duration::from_secs(self.check_interval_secs.max(1))
	}

	pub fn probe_timeout(&self) -> Duration {
		Duration::from_millis(self.probe_timeout_ms.max(1))
	}

	pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
		self.probe_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
		self
	}

	/// A zero threshold would open the breaker before any failure.
	pub fn validate(&self) -> CacheResult<()> {
		if self.threshold == 0 {
			return Err(CacheError::Configuration(
				"breaker threshold must be at least 1".to_string(),
			));
		}
		Ok(())
	}

	pub fn with_threshold(mut self, threshold: u64) -> Self {
		self.threshold = threshold;
		self
	}

	pub fn with_check_interval(mut self, interval: Duration) -> Self {
		self.check_interval_secs = interval.as_secs();
		self
	}

	pub fn with_recovery_successes(mut self, successes: u64) -> Self {
		self.recovery_successes = successes;
		self
	}
}

impl Default for BreakerConfig {
	fn default() -> Self {
		Self {
			threshold: DEFAULT_FAILURE_THRESHOLD,
			check_interval_secs: DEFAULT_CHECK_INTERVAL.as_secs(),
			recovery_successes: DEFAULT_RECOVERY_SUCCESSES,
			probe_attempts: DEFAULT_PROBE_ATTEMPTS,
			probe_timeout_ms: DEFAULT_PROBE_TIMEOUT.as_millis() as u64,
		}
	}
}

/// Endpoints and breaker settings of one logical Redis cache.
///
/// # Examples
///
/// ```
/// use keystone_cache::EndpointConfig;
/// use keystone_redis::RedisCacheConfig;
///
/// let config = RedisCacheConfig::new("redis://10.0.1.11:6379/0")
///     .with_read_only(EndpointConfig::new("redis://10.0.1.12:6379/0"))
///     .with_backup(EndpointConfig::new("redis://10.0.2.11:6379/0"));
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.endpoint_key(), "redis://10.0.1.11:6379/0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisCacheConfig {
	/// Serves every write, and reads when no read-only endpoint is set
	pub primary: EndpointConfig,
	/// Preferred for reads while the breaker is closed
	pub read_only: Option<EndpointConfig>,
	/// Serves reads while the breaker is open
	pub backup: Option<EndpointConfig>,
	pub breaker: BreakerConfig,
}

impl RedisCacheConfig {
	pub fn new(primary_url: impl Into<String>) -> Self {
		Self {
			primary: EndpointConfig::new(primary_url),
			..Default::default()
		}
	}

	pub fn with_primary(mut self, primary: EndpointConfig) -> Self {
		self.primary = primary;
		self
	}

	pub fn with_read_only(mut self, endpoint: EndpointConfig) -> Self {
		self.read_only = Some(endpoint);
		self
	}

	pub fn with_backup(mut self, endpoint: EndpointConfig) -> Self {
		self.backup = Some(endpoint);
		self
	}

	pub fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
		self.breaker = breaker;
		self
	}

	/// Key under which the cache is registered.
	pub fn endpoint_key(&self) -> &str {
		&self.primary.url
	}

	/// Check every configured endpoint.
	pub fn validate(&self) -> CacheResult<()> {
		self.breaker.validate()?;
		self.primary.validate()?;
		if let Some(read_only) = &self.read_only {
			read_only.validate()?;
		}
		if let Some(backup) = &self.backup {
			backup.validate()?;
		}
		Ok(())
	}
}
