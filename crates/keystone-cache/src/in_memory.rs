//! In-memory cache engine

use crate::cache_trait::{Cache, StructureOps};
use crate::config::StoreConfig;
use crate::error::CacheResult;
use crate::statistics::{CacheEntryInfo, CacheStatistics};
use crate::store::ItemStore;
use crate::value::CacheValue;
use async_trait::async_trait;
use std::sync::Arc;

/// Cache engine backed by an [`ItemStore`] in this process.
///
/// Clones share the same store.
#[derive(Debug, Clone)]
pub struct InMemoryCache {
	store: Arc<ItemStore>,
}

impl InMemoryCache {
	/// Create a cache that sweeps expired entries every 60 seconds.
	///
	/// # Examples
	///
	/// ```
	/// use keystone_cache::{Cache, CacheValue, InMemoryCache};
	///
	/// # #[tokio::main]
	/// # async fn main() {
	/// let cache = InMemoryCache::new();
	/// cache.set("visits", CacheValue::Int(10), 0).await.unwrap();
	/// assert_eq!(cache.incr("visits").await.unwrap(), 11);
	/// # }
	/// ```
	pub fn new() -> Self {
		Self::with_config(&StoreConfig::default())
	}

	/// Create a cache with explicit store settings.
	pub fn with_config(config: &StoreConfig) -> Self {
		Self {
			store: ItemStore::with_config(config),
		}
	}

	/// Wrap an existing store.
	pub fn from_store(store: Arc<ItemStore>) -> Self {
		Self { store }
	}

	/// The underlying store.
	pub fn store(&self) -> &Arc<ItemStore> {
		&self.store
	}

	/// Remove expired entries now instead of waiting for the sweep.
	pub async fn cleanup_expired(&self) -> usize {
		self.store.purge_expired().await
	}

	/// Stop the background sweep.
	pub fn shutdown(&self) {
		self.store.shutdown();
	}

	pub async fn statistics(&self) -> CacheStatistics {
		self.store.statistics().await
	}

	pub async fn inspect_entry(&self, key: &str) -> Option<CacheEntryInfo> {
		self.store.inspect(key).await
	}

	pub async fn list_keys(&self) -> Vec<String> {
		self.store.keys().await
	}
}

impl Default for InMemoryCache {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Cache for InMemoryCache {
	async fn exists(&self, key: &str) -> CacheResult<bool> {
		Ok(self.store.exists(key).await)
	}

	async fn get(&self, key: &str) -> CacheResult<Option<CacheValue>> {
		Ok(self.store.get(key).await)
	}

	async fn set(&self, key: &str, value: CacheValue, ttl_secs: i64) -> CacheResult<()> {
		self.store.set(key, value, ttl_secs).await;
		Ok(())
	}

	async fn incr(&self, key: &str) -> CacheResult<i64> {
		self.store.incr(key).await
	}

	async fn decr(&self, key: &str) -> CacheResult<i64> {
		self.store.decr(key).await
	}

	async fn delete(&self, key: &str) -> CacheResult<()> {
		self.store.delete(key).await;
		Ok(())
	}

	async fn expire(&self, key: &str, ttl_secs: i64) -> CacheResult<bool> {
		Ok(self.store.expire(key, ttl_secs).await)
	}

	async fn clear_all(&self) -> CacheResult<()> {
		self.store.clear_all().await;
		Ok(())
	}
}

#[async_trait]
impl StructureOps for InMemoryCache {
	fn engine(&self) -> &'static str {
		"memory"
	}

	async fn ping(&self) -> CacheResult<String> {
		Ok("PONG".to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cache_trait::CacheExt;
	use crate::error::CacheError;
	use rstest::rstest;
	use serde::{Deserialize, Serialize};
	use std::time::Duration;

	fn unswept() -> InMemoryCache {
		InMemoryCache::with_config(&StoreConfig::with_sweep_interval(Duration::ZERO))
	}

	#[rstest]
	#[tokio::test]
	async fn test_typed_reads_on_missing_key() {
		let cache = unswept();

		assert_eq!(cache.get_string("missing").await.unwrap(), "");
		assert_eq!(cache.get_int("missing").await.unwrap(), 0);
		assert_eq!(cache.get_int64("missing").await.unwrap(), 0);
		assert_eq!(cache.get("missing").await.unwrap(), None);
	}

	#[rstest]
	#[tokio::test]
	async fn test_typed_reads_coerce_stored_values() {
		// Arrange
		let cache = unswept();
		cache.set("n", CacheValue::from("123"), 0).await.unwrap();
		cache.set("big", CacheValue::Int(i64::from(i32::MAX) + 1), 0).await.unwrap();
		cache.set("word", CacheValue::from("abc"), 0).await.unwrap();

		// Act & Assert
		assert_eq!(cache.get_int("n").await.unwrap(), 123);
		assert_eq!(cache.get_int64("big").await.unwrap(), i64::from(i32::MAX) + 1);
		assert!(matches!(cache.get_int("big").await, Err(CacheError::Type(_))));
		assert!(matches!(cache.get_int64("word").await, Err(CacheError::Type(_))));
		assert_eq!(cache.get_string("n").await.unwrap(), "123");
	}

	#[rstest]
	#[tokio::test]
	async fn test_json_helpers() {
		#[derive(Debug, PartialEq, Serialize, Deserialize)]
		struct Session {
			user: String,
			roles: Vec<String>,
		}

		let cache = unswept();
		let session = Session {
			user: "ada".to_string(),
			roles: vec!["admin".to_string()],
		};

		cache.set_json("session", &session, 0).await.unwrap();
		let loaded: Option<Session> = cache.get_json("session").await.unwrap();
		let missing: Option<Session> = cache.get_json("other").await.unwrap();

		assert_eq!(loaded, Some(session));
		assert_eq!(missing, None);
	}

	#[rstest]
	#[tokio::test]
	async fn test_structure_ops_are_unsupported() {
		let cache = unswept();

		assert!(matches!(
			cache.lpush("list", &["a"]).await,
			Err(CacheError::Unsupported(_))
		));
		assert_eq!(cache.ping().await.unwrap(), "PONG");
	}

	#[rstest]
	#[tokio::test]
	async fn test_clones_share_store() {
		let cache = unswept();
		let other = cache.clone();

		cache.set("shared", CacheValue::Int(1), 0).await.unwrap();

		assert!(other.exists("shared").await.unwrap());
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_cleanup_expired() {
		let cache = unswept();
		cache.set("short", CacheValue::Int(1), 1).await.unwrap();
		tokio::time::advance(Duration::from_secs(2)).await;

		assert_eq!(cache.cleanup_expired().await, 1);
		assert!(cache.list_keys().await.is_empty());
		assert_eq!(cache.inspect_entry("short").await, None);
	}
}
