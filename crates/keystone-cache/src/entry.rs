//! Internal cache entry structure

use crate::value::CacheValue;
use std::time::Duration;
use tokio::time::Instant;

/// Cache entry with expiration.
///
/// A zero `ttl` means the entry never expires.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
	pub(crate) value: CacheValue,
	pub(crate) created_at: Instant,
	pub(crate) ttl: Duration,
}

impl CacheEntry {
	pub(crate) fn new(value: CacheValue, ttl: Duration) -> Self {
		Self {
			value,
			created_at: Instant::now(),
			ttl,
		}
	}

	pub(crate) fn is_expired(&self) -> bool {
		self.is_expired_at(Instant::now())
	}

	pub(crate) fn is_expired_at(&self, now: Instant) -> bool {
		if self.ttl.is_zero() {
			return false;
		}
		now.saturating_duration_since(self.created_at) > self.ttl
	}

	/// Time left before expiry, `None` for entries that never expire.
	pub(crate) fn remaining(&self) -> Option<Duration> {
		if self.ttl.is_zero() {
			return None;
		}
		Some(self.ttl.saturating_sub(self.created_at.elapsed()))
	}
}

/// Convert a caller supplied ttl in seconds. Non-positive values mean forever.
pub(crate) fn ttl_from_secs(ttl_secs: i64) -> Duration {
	if ttl_secs <= 0 {
		Duration::ZERO
	} else {
		Duration::from_secs(ttl_secs.unsigned_abs())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case::negative(-5, Duration::ZERO)]
	#[case::zero(0, Duration::ZERO)]
	#[case::positive(30, Duration::from_secs(30))]
	fn test_ttl_from_secs(#[case] secs: i64, #[case] expected: Duration) {
		assert_eq!(ttl_from_secs(secs), expected);
	}

	#[tokio::test(start_paused = true)]
	async fn test_zero_ttl_never_expires() {
		let entry = CacheEntry::new(CacheValue::Int(1), Duration::ZERO);
		tokio::time::advance(Duration::from_secs(365 * 24 * 3600)).await;
		assert!(!entry.is_expired());
		assert_eq!(entry.remaining(), None);
	}

	#[tokio::test(start_paused = true)]
	async fn test_expiry_is_strictly_after_ttl() {
		let entry = CacheEntry::new(CacheValue::Int(1), Duration::from_secs(5));

		tokio::time::advance(Duration::from_secs(5)).await;
		assert!(!entry.is_expired());

		tokio::time::advance(Duration::from_millis(1)).await;
		assert!(entry.is_expired());
		assert_eq!(entry.remaining(), Some(Duration::ZERO));
	}
}
