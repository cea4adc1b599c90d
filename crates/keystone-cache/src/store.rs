//! TTL item store
//!
//! A concurrency-safe map from key to [`CacheValue`] with two expiry layers:
//!
//! - **Lazy expiry**: every read checks the entry's ttl and treats expired
//!   entries as absent. This check is authoritative.
//! - **Active expiry**: an optional background sweep removes expired entries
//!   on a fixed interval to reclaim memory.
//!
//! One `RwLock` guards the map. Readers share it; every mutation takes the
//! writer lock for a single O(1) map operation, except [`ItemStore::clear_all`]
//! which swaps the whole map. The sweep collects candidates under the reader
//! lock and removes them in small batches so foreground writers are never
//! held off for a full-map pass.

use crate::config::StoreConfig;
use crate::entry::{CacheEntry, ttl_from_secs};
use crate::error::CacheResult;
use crate::statistics::{CacheEntryInfo, CacheStatistics};
use crate::value::CacheValue;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Number of expired keys removed per writer-lock acquisition during a sweep
const SWEEP_BATCH_SIZE: usize = 64;

/// In-process TTL store.
#[derive(Debug)]
pub struct ItemStore {
	items: RwLock<HashMap<String, CacheEntry>>,
	hits: AtomicU64,
	misses: AtomicU64,
	evicted: AtomicU64,
	shutdown_tx: broadcast::Sender<()>,
	sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ItemStore {
	/// Create an empty store without a background sweep.
	///
	/// # Examples
	///
	/// ```
	/// use keystone_cache::ItemStore;
	///
	/// # #[tokio::main]
	/// # async fn main() {
	/// let store = ItemStore::new();
	/// store.set("greeting", "hello", 0).await;
	/// assert_eq!(store.get("greeting").await.unwrap().to_string(), "hello");
	/// # }
	/// ```
	pub fn new() -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);
		Self {
			items: RwLock::new(HashMap::new()),
			hits: AtomicU64::new(0),
			misses: AtomicU64::new(0),
			evicted: AtomicU64::new(0),
			shutdown_tx,
			sweeper: Mutex::new(None),
		}
	}

	/// Create a shared store and start its sweep according to `config`.
	///
	/// When called outside a Tokio runtime the sweep cannot be scheduled; the
	/// store still works and relies on lazy expiry alone.
	pub fn with_config(config: &StoreConfig) -> Arc<Self> {
		let store = Arc::new(Self::new());
		if let Some(interval) = config.sweep_interval() {
			if tokio::runtime::Handle::try_current().is_ok() {
				store.start_sweeper(interval);
			} else {
				tracing::warn!(
					interval_secs = interval.as_secs(),
					"No Tokio runtime available, expired entries are only removed lazily"
				);
			}
		}
		store
	}

	/// Spawn the periodic sweep.
	///
	/// The task holds a weak reference, so it ends on its own once the last
	/// strong reference to the store is dropped. Calling this again replaces
	/// the previous sweep.
	pub fn start_sweeper(self: &Arc<Self>, interval: Duration) {
		let store = Arc::downgrade(self);
		let mut shutdown_rx = self.shutdown_tx.subscribe();

		let handle = tokio::spawn(async move {
			let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

			loop {
				tokio::select! {
					_ = ticker.tick() => {
						let Some(store) = store.upgrade() else {
							break;
						};
						let evicted = store.purge_expired().await;
						if evicted > 0 {
							tracing::debug!(evicted, "Swept expired cache entries");
						}
					}
					_ = shutdown_rx.recv() => {
						break;
					}
				}
			}
		});

		if let Some(previous) = self.sweeper.lock().replace(handle) {
			previous.abort();
		}
	}

	/// Stop the background sweep. Stored entries are kept.
	pub fn shutdown(&self) {
		let _ = self.shutdown_tx.send(());
		if let Some(handle) = self.sweeper.lock().take() {
			handle.abort();
		}
	}

	/// Whether a sweep task is currently running.
	pub fn is_sweeping(&self) -> bool {
		self.sweeper
			.lock()
			.as_ref()
			.is_some_and(|handle| !handle.is_finished())
	}

	/// Check whether a live entry exists for `key`.
	pub async fn exists(&self, key: &str) -> bool {
		let items = self.items.read().await;
		items.get(key).is_some_and(|entry| !entry.is_expired())
	}

	/// Get the value for `key`. Missing and expired keys yield `None`.
	pub async fn get(&self, key: &str) -> Option<CacheValue> {
		let items = self.items.read().await;

		match items.get(key) {
			Some(entry) if !entry.is_expired() => {
				self.hits.fetch_add(1, Ordering::Relaxed);
				Some(entry.value.clone())
			}
			_ => {
				self.misses.fetch_add(1, Ordering::Relaxed);
				None
			}
		}
	}

	/// Insert or overwrite `key`. A non-positive `ttl_secs` keeps it forever.
	pub async fn set(&self, key: impl Into<String>, value: impl Into<CacheValue>, ttl_secs: i64) {
		let entry = CacheEntry::new(value.into(), ttl_from_secs(ttl_secs));
		let mut items = self.items.write().await;
		items.insert(key.into(), entry);
	}

	/// Remove `key`. Removing a missing key is not an error.
	pub async fn delete(&self, key: &str) {
		let mut items = self.items.write().await;
		items.remove(key);
	}

	/// Change the ttl of a live entry, counted from its creation time.
	///
	/// Returns `false` when the key is missing or already expired.
	pub async fn expire(&self, key: &str, ttl_secs: i64) -> bool {
		let mut items = self.items.write().await;
		match items.get_mut(key) {
			Some(entry) if !entry.is_expired() => {
				entry.ttl = ttl_from_secs(ttl_secs);
				true
			}
			_ => false,
		}
	}

	/// Increment the counter at `key`, creating it at zero if needed.
	pub async fn incr(&self, key: &str) -> CacheResult<i64> {
		self.adjust(key, 1).await
	}

	/// Decrement the counter at `key`, creating it at zero if needed.
	pub async fn decr(&self, key: &str) -> CacheResult<i64> {
		self.adjust(key, -1).await
	}

	async fn adjust(&self, key: &str, delta: i64) -> CacheResult<i64> {
		let mut items = self.items.write().await;

		let entry = items
			.entry(key.to_string())
			.and_modify(|entry| {
				if entry.is_expired() {
					*entry = CacheEntry::new(CacheValue::Int(0), Duration::ZERO);
				}
			})
			.or_insert_with(|| CacheEntry::new(CacheValue::Int(0), Duration::ZERO));

		entry.value.add_delta(key, delta)
	}

	/// Drop every entry.
	pub async fn clear_all(&self) {
		let mut items = self.items.write().await;
		*items = HashMap::new();
	}

	/// Run one sweep pass and return how many entries were removed.
	pub async fn purge_expired(&self) -> usize {
		let candidates: Vec<String> = {
			let items = self.items.read().await;
			let now = Instant::now();
			items
				.iter()
				.filter(|(_, entry)| entry.is_expired_at(now))
				.map(|(key, _)| key.clone())
				.collect()
		};

		let mut evicted = 0;
		for batch in candidates.chunks(SWEEP_BATCH_SIZE) {
			let mut items = self.items.write().await;
			let now = Instant::now();
			for key in batch {
				// The key may have been rewritten since it was collected
				if items.get(key).is_some_and(|entry| entry.is_expired_at(now)) {
					items.remove(key);
					evicted += 1;
				}
			}
			drop(items);
			tokio::task::yield_now().await;
		}

		self.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
		evicted
	}

	/// Number of stored entries, including expired ones not yet swept.
	pub async fn len(&self) -> usize {
		self.items.read().await.len()
	}

	/// Whether the store holds no entries at all.
	pub async fn is_empty(&self) -> bool {
		self.items.read().await.is_empty()
	}

	/// All stored keys, including expired ones not yet swept.
	pub async fn keys(&self) -> Vec<String> {
		self.items.read().await.keys().cloned().collect()
	}

	/// Describe the entry stored at `key`.
	pub async fn inspect(&self, key: &str) -> Option<CacheEntryInfo> {
		let items = self.items.read().await;
		items.get(key).map(|entry| CacheEntryInfo {
			key: key.to_string(),
			kind: entry.value.kind(),
			has_expiry: !entry.ttl.is_zero(),
			ttl_seconds: entry.remaining().map(|left| left.as_secs()),
			expired: entry.is_expired(),
		})
	}

	/// Hit, miss and eviction counters.
	pub async fn statistics(&self) -> CacheStatistics {
		let entry_count = self.items.read().await.len() as u64;
		let hits = self.hits.load(Ordering::Relaxed);
		let misses = self.misses.load(Ordering::Relaxed);

		CacheStatistics {
			hits,
			misses,
			total_requests: hits + misses,
			entry_count,
			evicted: self.evicted.load(Ordering::Relaxed),
		}
	}
}

impl Default for ItemStore {
	fn default() -> Self {
		Self::new()
	}
}

impl Drop for ItemStore {
	fn drop(&mut self) {
		if let Some(handle) = self.sweeper.get_mut().take() {
			handle.abort();
		}
	}
}
