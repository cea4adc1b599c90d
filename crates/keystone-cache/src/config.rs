//! Configuration shared by the cache engines.

use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default interval between sweep passes of the in-process store.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of idle connections kept per endpoint.
pub const DEFAULT_MAX_IDLE: usize = 10;

/// Default upper bound of connections per endpoint.
pub const DEFAULT_MAX_ACTIVE: usize = 16;

/// Default limit for connecting to an endpoint and for each command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// One physical backend endpoint.
///
/// # Examples
///
/// ```
/// use keystone_cache::EndpointConfig;
///
/// use std::time::Duration;
///
/// let endpoint = EndpointConfig::new("redis://10.0.1.11:6379/0")
///     .with_pool(5, 20)
///     .with_timeout(Duration::from_millis(250));
/// assert_eq!(endpoint.max_idle, 5);
/// assert_eq!(endpoint.max_active, 20);
/// assert_eq!(endpoint.timeout(), Duration::from_millis(250));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
	/// Connection string, like `redis://:password@10.0.1.11:6379/0`
	pub url: String,
	/// Maximum number of idle connections in the pool
	pub max_idle: usize,
	/// Maximum number of connections allocated by the pool at a given time
	pub max_active: usize,
	/// Milliseconds allowed for a connection handshake or a single command
	pub timeout_ms: u64,
}

impl EndpointConfig {
	/// Endpoint with default pool sizing.
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			..Default::default()
		}
	}

	/// Override the pool sizing.
	pub fn with_pool(mut self, max_idle: usize, max_active: usize) -> Self {
		self.max_idle = max_idle;
		self.max_active = max_active;
		self
	}

	/// Override the connect and command timeout.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
		self
	}

	/// Connect and command timeout, at least one millisecond.
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms.max(1))
	}

	/// Reject endpoints that cannot be connected to.
	pub fn validate(&self) -> CacheResult<()> {
		if self.url.trim().is_empty() {
			return Err(CacheError::Configuration(
				"endpoint address must not be empty".to_string(),
			));
		}
		if self.max_active == 0 {
			return Err(CacheError::Configuration(format!(
				"max_active for {} must be greater than zero",
				self.url
			)));
		}
		Ok(())
	}

	/// Whether two configurations differ only in pool sizing.
	pub fn same_pool(&self, other: &EndpointConfig) -> bool {
		self.max_idle == other.max_idle && self.max_active == other.max_active
	}
}

impl Default for EndpointConfig {
	fn default() -> Self {
		Self {
			url: String::new(),
			max_idle: DEFAULT_MAX_IDLE,
			max_active: DEFAULT_MAX_ACTIVE,
			timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
		}
	}
}

/// Settings of the in-process store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
	/// Seconds between sweep passes. Zero disables the background sweep.
	pub sweep_interval_secs: u64,
}

impl StoreConfig {
	/// Configuration with the given sweep interval.
	pub fn with_sweep_interval(interval: Duration) -> Self {
		Self {
			sweep_interval_secs: interval.as_secs(),
		}
	}

	/// Interval between sweeps, `None` when sweeping is disabled.
	pub fn sweep_interval(&self) -> Option<Duration> {
		(self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
	}
}

impl Default for StoreConfig {
	fn default() -> Self {
		Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
	}
}
