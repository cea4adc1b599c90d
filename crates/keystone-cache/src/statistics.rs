//! Cache statistics and entry information

/// Cache entry information for inspection
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntryInfo {
	/// The key of the entry
	pub key: String,
	/// Variant name of the stored value
	pub kind: &'static str,
	/// Whether the entry has an expiration time
	pub has_expiry: bool,
	/// Seconds until expiration (if applicable)
	pub ttl_seconds: Option<u64>,
	/// Whether the entry is expired but not yet swept
	pub expired: bool,
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStatistics {
	/// Number of reads that found a live entry
	pub hits: u64,
	/// Number of reads that found nothing or an expired entry
	pub misses: u64,
	/// Total number of reads
	pub total_requests: u64,
	/// Current number of entries, including expired ones awaiting the sweep
	pub entry_count: u64,
	/// Entries removed by sweep passes since the store was created
	pub evicted: u64,
}

impl CacheStatistics {
	/// Calculate hit rate (0.0 to 1.0)
	///
	/// # Examples
	///
	/// ```
	/// use keystone_cache::CacheStatistics;
	///
	/// let mut stats = CacheStatistics::default();
	/// stats.hits = 75;
	/// stats.misses = 25;
	/// stats.total_requests = 100;
	///
	/// assert_eq!(stats.hit_rate(), 0.75);
	/// ```
	pub fn hit_rate(&self) -> f64 {
		if self.total_requests == 0 {
			0.0
		} else {
			self.hits as f64 / self.total_requests as f64
		}
	}

	/// Calculate miss rate (0.0 to 1.0)
	pub fn miss_rate(&self) -> f64 {
		if self.total_requests == 0 {
			0.0
		} else {
			self.misses as f64 / self.total_requests as f64
		}
	}
}
