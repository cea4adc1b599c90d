//! Integration tests for the cache registry
//!
//! ## Test Coverage
//!
//! - One shared instance per engine and endpoint under concurrent creation
//! - Existing instances returned when pool settings differ
//! - Store settings propagated to registered in-memory caches
//! - Failed construction leaves no entry behind

use keystone::{Cache, CacheRegistry, CacheSettings, CacheValue, EndpointConfig, EngineType};
use rstest::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

fn same_instance(a: &Arc<dyn Cache>, b: &Arc<dyn Cache>) -> bool {
	Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

#[fixture]
fn registry() -> Arc<CacheRegistry> {
	Arc::new(CacheRegistry::new())
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creation_yields_one_instance(registry: Arc<CacheRegistry>) {
	// Arrange
	let tasks = 16;
	let barrier = Arc::new(Barrier::new(tasks));

	// Act
	let handles: Vec<_> = (0..tasks)
		.map(|_| {
			let registry = registry.clone();
			let barrier = barrier.clone();
			tokio::spawn(async move {
				barrier.wait().await;
				registry.in_memory().await.unwrap()
			})
		})
		.collect();
	let mut caches = Vec::new();
	for handle in handles {
		caches.push(handle.await.unwrap());
	}

	// Assert
	assert_eq!(registry.len().await, 1);
	assert!(caches.iter().all(|cache| same_instance(cache, &caches[0])));
}

#[rstest]
#[tokio::test]
async fn test_writes_are_visible_through_every_handle(registry: Arc<CacheRegistry>) {
	let writer = registry.in_memory().await.unwrap();
	let reader = registry
		.get_or_create(EngineType::Memory, &EndpointConfig::new("ignored"))
		.await
		.unwrap();

	writer.set("k", CacheValue::from("v"), 0).await.unwrap();

	assert_eq!(reader.get_string("k").await.unwrap(), "v");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_settings_reach_the_shared_store() {
	// Arrange
	let settings = CacheSettings::from_toml_str("[store]\nsweep_interval_secs = 1\n").unwrap();
	let registry = settings.registry();
	let cache = registry.in_memory().await.unwrap();

	// Act
	cache.set("short", CacheValue::Int(1), 1).await.unwrap();
	tokio::time::sleep(Duration::from_millis(2500)).await;

	// Assert
	assert!(!cache.exists("short").await.unwrap());
}

#[cfg(feature = "redis-backend")]
mod redis {
	use super::*;
	use keystone::{RedisCacheConfig, StructureOps};

	// Pools connect lazily, so nothing needs to listen on these addresses
	const PRIMARY: &str = "redis://127.0.0.1:6390/0";

	#[rstest]
	#[tokio::test]
	async fn test_same_endpoint_is_shared(registry: Arc<CacheRegistry>) {
		// Arrange
		let endpoint = EndpointConfig::new(PRIMARY);

		// Act
		let first = registry
			.get_or_create(EngineType::Redis, &endpoint)
			.await
			.unwrap();
		let second = registry
			.get_or_create(EngineType::Redis, &endpoint.clone().with_pool(1, 2))
			.await
			.unwrap();

		// Assert
		assert!(same_instance(&first, &second));
		assert_eq!(registry.len().await, 1);
		assert!(registry.contains(EngineType::Redis, PRIMARY).await);
	}

	#[rstest]
	#[tokio::test]
	async fn test_full_config_registers_under_primary(registry: Arc<CacheRegistry>) {
		let config = RedisCacheConfig::new(PRIMARY)
			.with_read_only(EndpointConfig::new("redis://127.0.0.1:6391/0"))
			.with_backup(EndpointConfig::new("redis://127.0.0.1:6392/0"));

		let full = registry.get_or_create_redis(config).await.unwrap();
		let plain = registry
			.get_or_create(EngineType::Redis, &EndpointConfig::new(PRIMARY))
			.await
			.unwrap();

		assert!(same_instance(&full, &plain));
		assert_eq!(full.engine(), "redis");
	}

	#[rstest]
	#[tokio::test]
	async fn test_engines_do_not_collide(registry: Arc<CacheRegistry>) {
		let endpoint = EndpointConfig::new(PRIMARY);

		let remote = registry
			.get_or_create(EngineType::Redis, &endpoint)
			.await
			.unwrap();
		let local = registry.in_memory().await.unwrap();

		assert!(!same_instance(&remote, &local));
		assert_eq!(registry.len().await, 2);
	}

	#[rstest]
	#[tokio::test]
	async fn test_invalid_endpoint_registers_nothing(registry: Arc<CacheRegistry>) {
		let result = registry
			.get_or_create(
				EngineType::Redis,
				&EndpointConfig::new(PRIMARY).with_pool(1, 0),
			)
			.await;

		assert!(result.is_err());
		assert!(registry.is_empty().await);
	}
}

#[cfg(feature = "memcached-backend")]
mod memcached {
	use super::*;
	use keystone::{CacheError, MemcachedConfig};

	#[rstest]
	#[tokio::test]
	async fn test_unreachable_servers_register_nothing(registry: Arc<CacheRegistry>) {
		let config = MemcachedConfig {
			servers: vec!["127.0.0.1:1".to_string()],
			timeout_ms: 200,
		};

		let result = registry.get_or_create_memcached(config).await;

		assert!(matches!(result, Err(CacheError::Connection(_))));
		assert!(registry.is_empty().await);
	}
}
