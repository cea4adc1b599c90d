//! Cache settings loaded from TOML and environment variables
//!
//! ```toml
//! [store]
//! sweep_interval_secs = 60
//!
//! [redis.primary]
//! url = "redis://10.0.1.11:6379/0"
//! max_active = 32
//!
//! [redis.read_only]
//! url = "redis://10.0.1.12:6379/0"
//!
//! [redis.breaker]
//! threshold = 50
//!
//! [memcached]
//! servers = ["10.0.3.1:11211", "10.0.3.2:11211"]
//! ```
//!
//! Variables prefixed with `KEYSTONE_` override file values; see
//! [`CacheSettings::apply_overrides`] for the recognized names.

use crate::registry::CacheRegistry;
use keystone_cache::{CacheError, StoreConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

#[cfg(feature = "redis-backend")]
use keystone_cache::EndpointConfig;
#[cfg(feature = "memcached-backend")]
use keystone_memcached::MemcachedConfig;
#[cfg(feature = "redis-backend")]
use keystone_redis::RedisCacheConfig;

/// Prefix of the environment variables read by [`CacheSettings::apply_env`].
pub const ENV_PREFIX: &str = "KEYSTONE_";

/// Errors raised while loading settings
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("TOML error: {0}")]
	Toml(#[from] toml::de::Error),

	#[error("Invalid value for {key}: {value:?}")]
	InvalidValue { key: String, value: String },

	#[error("Invalid cache settings: {0}")]
	Cache(#[from] CacheError),
}

/// Top-level cache settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
	pub store: StoreConfig,
	#[cfg(feature = "redis-backend")]
	pub redis: Option<RedisCacheConfig>,
	#[cfg(feature = "memcached-backend")]
	pub memcached: Option<MemcachedConfig>,
}

impl CacheSettings {
	pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
		let settings: Self = toml::from_str(content)?;
		settings.validate()?;
		Ok(settings)
	}

	/// Read a TOML file, then apply `KEYSTONE_*` overrides from the environment.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path)?;
		let mut settings: Self = toml::from_str(&content)?;
		settings.apply_env()?;
		settings.validate()?;
		tracing::debug!(path = %path.display(), "Loaded cache settings");
		Ok(settings)
	}

	/// Apply overrides from the process environment.
	pub fn apply_env(&mut self) -> Result<(), SettingsError> {
		self.apply_overrides(std::env::vars())
	}

	/// Apply `KEYSTONE_*` overrides.
	///
	/// Recognized names, without the prefix:
	///
	/// - `SWEEP_INTERVAL_SECS`
	/// - `REDIS_URL`, `REDIS_READ_ONLY_URL`, `REDIS_BACKUP_URL`
	/// - `REDIS_MAX_IDLE`, `REDIS_MAX_ACTIVE`, `REDIS_TIMEOUT_MS` (primary pool)
	/// - `REDIS_BREAKER_THRESHOLD`, `REDIS_CHECK_INTERVAL_SECS`, `REDIS_RECOVERY_SUCCESSES`
	/// - `REDIS_PROBE_TIMEOUT_MS`
	/// - `MEMCACHED_SERVERS` (comma separated), `MEMCACHED_TIMEOUT_MS`
	///
	/// Other names with the prefix are ignored.
	pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<(), SettingsError>
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: AsRef<str>,
	{
		for (key, value) in vars {
			let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
				continue;
			};
			let name = name.to_ascii_uppercase();
			let value = value.as_ref().trim();

			match name.as_str() {
				"SWEEP_INTERVAL_SECS" => {
					self.store.sweep_interval_secs = parse(key.as_ref(), value)?;
				}
				#[cfg(feature = "redis-backend")]
				redis_key if redis_key.starts_with("REDIS_") => {
					self.apply_redis(key.as_ref(), &redis_key["REDIS_".len()..], value)?;
				}
				#[cfg(feature = "memcached-backend")]
				"MEMCACHED_SERVERS" => {
					let servers = value
						.split(',')
						.map(str::trim)
						.filter(|s| !s.is_empty())
						.map(String::from)
						.collect();
					self.memcached.get_or_insert_with(Default::default).servers = servers;
				}
				#[cfg(feature = "memcached-backend")]
				"MEMCACHED_TIMEOUT_MS" => {
					self.memcached
						.get_or_insert_with(Default::default)
						.timeout_ms = parse(key.as_ref(), value)?;
				}
				other => {
					tracing::trace!(name = other, "Ignoring unrecognized cache variable");
				}
			}
		}
		Ok(())
	}

	#[cfg(feature = "redis-backend")]
	fn apply_redis(&mut self, key: &str, name: &str, value: &str) -> Result<(), SettingsError> {
		let redis = self.redis.get_or_insert_with(Default::default);
		match name {
			"URL" => redis.primary.url = value.to_string(),
			"READ_ONLY_URL" => {
				redis.read_only.get_or_insert_with(EndpointConfig::default).url = value.to_string()
			}
			"BACKUP_URL" => {
				redis.backup.get_or_insert_with(EndpointConfig::default).url = value.to_string()
			}
			"MAX_IDLE" => redis.primary.max_idle = parse(key, value)?,
			"MAX_ACTIVE" => redis.primary.max_active = parse(key, value)?,
			"TIMEOUT_MS" => redis.primary.timeout_ms = parse(key, value)?,
			"BREAKER_THRESHOLD" => redis.breaker.threshold = parse(key, value)?,
			"CHECK_INTERVAL_SECS" => redis.breaker.check_interval_secs = parse(key, value)?,
			"RECOVERY_SUCCESSES" => redis.breaker.recovery_successes = parse(key, value)?,
			"PROBE_TIMEOUT_MS" => redis.breaker.probe_timeout_ms = parse(key, value)?,
			other => tracing::trace!(name = other, "Ignoring unrecognized redis variable"),
		}
		Ok(())
	}

	/// Check every configured engine.
	pub fn validate(&self) -> Result<(), SettingsError> {
		#[cfg(feature = "redis-backend")]
		if let Some(redis) = &self.redis {
			redis.validate()?;
		}
		#[cfg(feature = "memcached-backend")]
		if let Some(memcached) = &self.memcached
			&& memcached.servers.iter().all(|s| s.trim().is_empty())
		{
			return Err(CacheError::Configuration(
				"No Memcached servers specified".to_string(),
			)
			.into());
		}
		Ok(())
	}

	/// Registry whose in-memory caches use these store settings.
	pub fn registry(&self) -> CacheRegistry {
		CacheRegistry::with_store_config(self.store.clone())
	}
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, SettingsError> {
	value.parse().map_err(|_| SettingsError::InvalidValue {
		key: key.to_string(),
		value: value.to_string(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use std::io::Write;
	use tempfile::NamedTempFile;

	#[rstest]
	fn test_empty_document_uses_defaults() {
		let settings = CacheSettings::from_toml_str("").unwrap();
		assert_eq!(settings, CacheSettings::default());
		assert_eq!(settings.store.sweep_interval_secs, 60);
	}

	#[rstest]
	fn test_store_section() {
		let settings = CacheSettings::from_toml_str("[store]\nsweep_interval_secs = 5\n").unwrap();
		assert_eq!(settings.store.sweep_interval_secs, 5);
	}

	#[rstest]
	fn test_malformed_toml_is_rejected() {
		let result = CacheSettings::from_toml_str("[store\n");
		assert!(matches!(result, Err(SettingsError::Toml(_))));
	}

	#[rstest]
	fn test_missing_file_is_io_error() {
		let result = CacheSettings::from_file("/nonexistent/keystone.toml");
		assert!(matches!(result, Err(SettingsError::Io(_))));
	}

	#[rstest]
	fn test_from_file() {
		// Arrange
		let mut file = NamedTempFile::new().unwrap();
		writeln!(file, "[store]\nsweep_interval_secs = 0").unwrap();

		// Act
		let settings = CacheSettings::from_file(file.path()).unwrap();

		// Assert
		assert_eq!(settings.store.sweep_interval(), None);
	}

	#[rstest]
	fn test_overrides_ignore_foreign_variables() {
		let mut settings = CacheSettings::default();

		settings
			.apply_overrides([("PATH", "/usr/bin"), ("KEYSTONE_UNKNOWN", "x")])
			.unwrap();

		assert_eq!(settings, CacheSettings::default());
	}

	#[rstest]
	#[case("KEYSTONE_SWEEP_INTERVAL_SECS", "soon")]
	#[case("KEYSTONE_SWEEP_INTERVAL_SECS", "-1")]
	fn test_invalid_override_is_rejected(#[case] key: &str, #[case] value: &str) {
		let mut settings = CacheSettings::default();

		let result = settings.apply_overrides([(key, value)]);

		assert!(matches!(
			result,
			Err(SettingsError::InvalidValue { key: ref k, .. }) if k == key
		));
	}

	#[cfg(feature = "redis-backend")]
	#[rstest]
	fn test_redis_section() {
		// Arrange
		let content = r#"
			[redis.primary]
			url = "redis://10.0.1.11:6379/0"
			max_active = 32

			[redis.backup]
			url = "redis://10.0.2.11:6379/0"

			[redis.breaker]
			threshold = 20
		"#;

		// Act
		let settings = CacheSettings::from_toml_str(content).unwrap();

		// Assert
		let redis = settings.redis.unwrap();
		assert_eq!(redis.primary.max_active, 32);
		assert_eq!(redis.primary.max_idle, keystone_cache::config::DEFAULT_MAX_IDLE);
		assert!(redis.read_only.is_none());
		assert_eq!(redis.backup.unwrap().url, "redis://10.0.2.11:6379/0");
		assert_eq!(redis.breaker.threshold, 20);
		assert_eq!(redis.breaker.recovery_successes, 3);
	}

	#[cfg(feature = "redis-backend")]
	#[rstest]
	fn test_redis_without_primary_is_rejected() {
		let result = CacheSettings::from_toml_str("[redis.breaker]\nthreshold = 1\n");
		assert!(matches!(
			result,
			Err(SettingsError::Cache(CacheError::Configuration(_)))
		));
	}

	#[cfg(feature = "redis-backend")]
	#[rstest]
	fn test_zero_breaker_threshold_is_rejected() {
		let content = r#"
			[redis.primary]
			url = "redis://127.0.0.1:6379/0"

			[redis.breaker]
			threshold = 0
		"#;

		let result = CacheSettings::from_toml_str(content);

		assert!(matches!(
			result,
			Err(SettingsError::Cache(CacheError::Configuration(_)))
		));
	}

	#[cfg(feature = "redis-backend")]
	#[rstest]
	fn test_redis_overrides() {
		// Arrange
		let mut settings = CacheSettings::default();

		// Act
		settings
			.apply_overrides([
				("KEYSTONE_REDIS_URL", "redis://127.0.0.1:6379/1"),
				("KEYSTONE_REDIS_READ_ONLY_URL", "redis://127.0.0.1:6380/1"),
				("KEYSTONE_REDIS_BREAKER_THRESHOLD", "7"),
				("KEYSTONE_REDIS_CHECK_INTERVAL_SECS", "2"),
				("KEYSTONE_REDIS_TIMEOUT_MS", "250"),
			])
			.unwrap();

		// Assert
		let redis = settings.redis.as_ref().unwrap();
		assert_eq!(redis.primary.url, "redis://127.0.0.1:6379/1");
		assert_eq!(
			redis.read_only.as_ref().unwrap().url,
			"redis://127.0.0.1:6380/1"
		);
		assert_eq!(redis.breaker.threshold, 7);
		assert_eq!(redis.breaker.check_interval_secs, 2);
		assert_eq!(redis.primary.timeout(), std::time::Duration::from_millis(250));
		assert!(settings.validate().is_ok());
	}

	#[cfg(feature = "memcached-backend")]
	#[rstest]
	fn test_memcached_overrides() {
		let mut settings = CacheSettings::default();

		settings
			.apply_overrides([("KEYSTONE_MEMCACHED_SERVERS", "10.0.3.1:11211, 10.0.3.2:11211")])
			.unwrap();

		assert_eq!(
			settings.memcached.unwrap().servers,
			vec!["10.0.3.1:11211".to_string(), "10.0.3.2:11211".to_string()]
		);
	}
}
