//! Engine-independent cache facade
//!
//! [`Cache`] is the surface every engine implements. Hash, list, set,
//! sorted-set, pub/sub and scripting commands live in [`StructureOps`]; its
//! default methods fail with [`CacheError::Unsupported`] so engines only
//! override what they can serve.

use crate::error::{CacheError, CacheResult};
use crate::value::CacheValue;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tokio::sync::mpsc;

/// Core key-value operations.
///
/// Absence is never an error: `get` yields `None`, `get_string` yields an
/// empty string and the integer reads yield zero for missing or expired keys.
#[async_trait]
pub trait Cache: StructureOps {
	/// Check whether `key` holds a live value.
	async fn exists(&self, key: &str) -> CacheResult<bool>;

	/// Fetch the value stored at `key`.
	async fn get(&self, key: &str) -> CacheResult<Option<CacheValue>>;

	/// Fetch `key` in its textual form, empty when missing.
	async fn get_string(&self, key: &str) -> CacheResult<String> {
		Ok(self
			.get(key)
			.await?
			.map(|value| value.to_string())
			.unwrap_or_default())
	}

	/// Fetch `key` as a 32-bit integer, zero when missing.
	async fn get_int(&self, key: &str) -> CacheResult<i32> {
		let value = self.get_int64(key).await?;
		i32::try_from(value).map_err(|_| {
			CacheError::Type(format!("{key}: {value} does not fit in a 32-bit integer"))
		})
	}

	/// Fetch `key` as a 64-bit integer, zero when missing.
	async fn get_int64(&self, key: &str) -> CacheResult<i64> {
		match self.get(key).await? {
			Some(value) => value.as_i64(),
			None => Ok(0),
		}
	}

	/// Store `value` at `key`. A non-positive `ttl_secs` never expires.
	async fn set(&self, key: &str, value: CacheValue, ttl_secs: i64) -> CacheResult<()>;

	/// Increment the counter at `key` and return the new value.
	async fn incr(&self, key: &str) -> CacheResult<i64>;

	/// Decrement the counter at `key` and return the new value.
	async fn decr(&self, key: &str) -> CacheResult<i64>;

	/// Remove `key`. Removing a missing key succeeds.
	async fn delete(&self, key: &str) -> CacheResult<()>;

	/// Change the ttl of `key`. Returns `false` when the key does not exist.
	async fn expire(&self, key: &str, ttl_secs: i64) -> CacheResult<bool>;

	/// Remove every key held by this engine instance.
	async fn clear_all(&self) -> CacheResult<()>;
}

/// JSON helpers available on every [`Cache`].
#[async_trait]
pub trait CacheExt: Cache {
	/// Serialize `value` as JSON and store it.
	async fn set_json<T>(&self, key: &str, value: &T, ttl_secs: i64) -> CacheResult<()>
	where
		T: Serialize + Sync + ?Sized,
	{
		let encoded = CacheValue::from_json(value)?;
		self.set(key, encoded, ttl_secs).await
	}

	/// Fetch and deserialize a JSON document, `None` when missing.
	async fn get_json<T>(&self, key: &str) -> CacheResult<Option<T>>
	where
		T: DeserializeOwned + Send,
	{
		match self.get(key).await? {
			Some(value) => value.into_json().map(Some),
			None => Ok(None),
		}
	}
}

impl<C: Cache + ?Sized> CacheExt for C {}

/// Where `LINSERT` places the new element relative to the pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListPosition {
	Before,
	After,
}

impl ListPosition {
	pub fn as_str(&self) -> &'static str {
		match self {
			ListPosition::Before => "BEFORE",
			ListPosition::After => "AFTER",
		}
	}
}

impl fmt::Display for ListPosition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ListPosition {
	type Err = CacheError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_uppercase().as_str() {
			"BEFORE" => Ok(ListPosition::Before),
			"AFTER" => Ok(ListPosition::After),
			_ => Err(CacheError::InvalidArgument(format!(
				"list position must be BEFORE or AFTER, got {s:?}"
			))),
		}
	}
}

/// A message delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
	pub channel: String,
	pub payload: Vec<u8>,
}

impl Message {
	/// Payload as text, lossily decoded.
	pub fn payload_str(&self) -> String {
		String::from_utf8_lossy(&self.payload).into_owned()
	}
}

/// Data-structure, messaging and scripting commands.
///
/// Read commands are served by whichever endpoint the engine selects for
/// reads; commands that mutate state, including the `*STORE` variants, go to
/// the primary.
#[async_trait]
#[allow(unused_variables)]
pub trait StructureOps: Send + Sync {
	/// Engine name, like `"redis"`.
	fn engine(&self) -> &'static str;

	// Hashes

	async fn hget(&self, key: &str, field: &str) -> CacheResult<Option<String>> {
		Err(CacheError::unsupported(self.engine(), "HGET"))
	}

	async fn hmget(&self, key: &str, fields: &[&str]) -> CacheResult<Vec<Option<String>>> {
		Err(CacheError::unsupported(self.engine(), "HMGET"))
	}

	async fn hgetall(&self, key: &str) -> CacheResult<HashMap<String, String>> {
		Err(CacheError::unsupported(self.engine(), "HGETALL"))
	}

	async fn hset(&self, key: &str, field: &str, value: &str) -> CacheResult<()> {
		Err(CacheError::unsupported(self.engine(), "HSET"))
	}

	/// Set `field` only if it does not exist yet.
	async fn hsetnx(&self, key: &str, field: &str, value: &str) -> CacheResult<bool> {
		Err(CacheError::unsupported(self.engine(), "HSETNX"))
	}

	async fn hdel(&self, key: &str, fields: &[&str]) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "HDEL"))
	}

	async fn hexists(&self, key: &str, field: &str) -> CacheResult<bool> {
		Err(CacheError::unsupported(self.engine(), "HEXISTS"))
	}

	async fn hincrby(&self, key: &str, field: &str, increment: i64) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "HINCRBY"))
	}

	async fn hincrbyfloat(&self, key: &str, field: &str, increment: f64) -> CacheResult<f64> {
		Err(CacheError::unsupported(self.engine(), "HINCRBYFLOAT"))
	}

	async fn hkeys(&self, key: &str) -> CacheResult<Vec<String>> {
		Err(CacheError::unsupported(self.engine(), "HKEYS"))
	}

	async fn hlen(&self, key: &str) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "HLEN"))
	}

	async fn hvals(&self, key: &str) -> CacheResult<Vec<String>> {
		Err(CacheError::unsupported(self.engine(), "HVALS"))
	}

	// Lists

	/// Blocking left pop over `keys`. Returns the key and the popped element,
	/// `None` once `timeout_secs` elapses.
	async fn blpop(&self, keys: &[&str], timeout_secs: f64) -> CacheResult<Option<(String, String)>> {
		Err(CacheError::unsupported(self.engine(), "BLPOP"))
	}

	async fn brpop(&self, keys: &[&str], timeout_secs: f64) -> CacheResult<Option<(String, String)>> {
		Err(CacheError::unsupported(self.engine(), "BRPOP"))
	}

	async fn brpoplpush(
		&self,
		source: &str,
		destination: &str,
		timeout_secs: f64,
	) -> CacheResult<Option<String>> {
		Err(CacheError::unsupported(self.engine(), "BRPOPLPUSH"))
	}

	async fn lindex(&self, key: &str, index: i64) -> CacheResult<Option<String>> {
		Err(CacheError::unsupported(self.engine(), "LINDEX"))
	}

	/// Insert `value` next to `pivot`. Returns the new length, or -1 when the
	/// pivot was not found.
	async fn linsert(
		&self,
		key: &str,
		position: ListPosition,
		pivot: &str,
		value: &str,
	) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "LINSERT"))
	}

	async fn llen(&self, key: &str) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "LLEN"))
	}

	async fn lpop(&self, key: &str) -> CacheResult<Option<String>> {
		Err(CacheError::unsupported(self.engine(), "LPOP"))
	}

	async fn lpush(&self, key: &str, values: &[&str]) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "LPUSH"))
	}

	async fn lpushx(&self, key: &str, value: &str) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "LPUSHX"))
	}

	async fn lrange(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<String>> {
		Err(CacheError::unsupported(self.engine(), "LRANGE"))
	}

	async fn lrem(&self, key: &str, count: i64, value: &str) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "LREM"))
	}

	async fn lset(&self, key: &str, index: i64, value: &str) -> CacheResult<()> {
		Err(CacheError::unsupported(self.engine(), "LSET"))
	}

	async fn ltrim(&self, key: &str, start: i64, stop: i64) -> CacheResult<()> {
		Err(CacheError::unsupported(self.engine(), "LTRIM"))
	}

	async fn rpop(&self, key: &str) -> CacheResult<Option<String>> {
		Err(CacheError::unsupported(self.engine(), "RPOP"))
	}

	async fn rpoplpush(&self, source: &str, destination: &str) -> CacheResult<Option<String>> {
		Err(CacheError::unsupported(self.engine(), "RPOPLPUSH"))
	}

	async fn rpush(&self, key: &str, values: &[&str]) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "RPUSH"))
	}

	async fn rpushx(&self, key: &str, values: &[&str]) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "RPUSHX"))
	}

	// Sets

	async fn sadd(&self, key: &str, members: &[&str]) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "SADD"))
	}

	async fn scard(&self, key: &str) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "SCARD"))
	}

	async fn sdiff(&self, keys: &[&str]) -> CacheResult<Vec<String>> {
		Err(CacheError::unsupported(self.engine(), "SDIFF"))
	}

	async fn sdiffstore(&self, destination: &str, keys: &[&str]) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "SDIFFSTORE"))
	}

	async fn sinter(&self, keys: &[&str]) -> CacheResult<Vec<String>> {
		Err(CacheError::unsupported(self.engine(), "SINTER"))
	}

	async fn sinterstore(&self, destination: &str, keys: &[&str]) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "SINTERSTORE"))
	}

	async fn sismember(&self, key: &str, member: &str) -> CacheResult<bool> {
		Err(CacheError::unsupported(self.engine(), "SISMEMBER"))
	}

	async fn smembers(&self, key: &str) -> CacheResult<Vec<String>> {
		Err(CacheError::unsupported(self.engine(), "SMEMBERS"))
	}

	async fn smove(&self, source: &str, destination: &str, member: &str) -> CacheResult<bool> {
		Err(CacheError::unsupported(self.engine(), "SMOVE"))
	}

	async fn spop(&self, key: &str) -> CacheResult<Option<String>> {
		Err(CacheError::unsupported(self.engine(), "SPOP"))
	}

	async fn srandmember(&self, key: &str, count: i64) -> CacheResult<Vec<String>> {
		Err(CacheError::unsupported(self.engine(), "SRANDMEMBER"))
	}

	async fn srem(&self, key: &str, members: &[&str]) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "SREM"))
	}

	async fn sunion(&self, keys: &[&str]) -> CacheResult<Vec<String>> {
		Err(CacheError::unsupported(self.engine(), "SUNION"))
	}

	async fn sunionstore(&self, destination: &str, keys: &[&str]) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "SUNIONSTORE"))
	}

	// Sorted sets

	async fn zadd(&self, key: &str, score: f64, member: &str) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "ZADD"))
	}

	async fn zcard(&self, key: &str) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "ZCARD"))
	}

	async fn zcount(&self, key: &str, min: f64, max: f64) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "ZCOUNT"))
	}

	async fn zrange(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<String>> {
		Err(CacheError::unsupported(self.engine(), "ZRANGE"))
	}

	/// Members with scores between `min` and `max`. Bounds accept the usual
	/// `-inf`, `+inf` and `(` exclusive forms. With `with_scores` every
	/// member is followed by its score.
	async fn zrangebyscore(
		&self,
		key: &str,
		min: &str,
		max: &str,
		with_scores: bool,
	) -> CacheResult<Vec<String>> {
		Err(CacheError::unsupported(self.engine(), "ZRANGEBYSCORE"))
	}

	async fn zrank(&self, key: &str, member: &str) -> CacheResult<Option<i64>> {
		Err(CacheError::unsupported(self.engine(), "ZRANK"))
	}

	async fn zrem(&self, key: &str, members: &[&str]) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "ZREM"))
	}

	async fn zrevrange(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<String>> {
		Err(CacheError::unsupported(self.engine(), "ZREVRANGE"))
	}

	async fn zrevrangebyscore(
		&self,
		key: &str,
		max: &str,
		min: &str,
		with_scores: bool,
	) -> CacheResult<Vec<String>> {
		Err(CacheError::unsupported(self.engine(), "ZREVRANGEBYSCORE"))
	}

	// Messaging and scripting

	/// Publish `message` and return the number of receiving subscribers.
	async fn publish(&self, channel: &str, message: &[u8]) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "PUBLISH"))
	}

	/// Subscribe to `channels`. The stream ends when the receiver is dropped
	/// or the connection closes.
	async fn subscribe(&self, channels: &[&str]) -> CacheResult<mpsc::Receiver<Message>> {
		Err(CacheError::unsupported(self.engine(), "SUBSCRIBE"))
	}

	/// Run a server-side script. `None` for a nil reply.
	async fn eval(
		&self,
		script: &str,
		keys: &[&str],
		args: &[&str],
	) -> CacheResult<Option<CacheValue>> {
		Err(CacheError::unsupported(self.engine(), "EVAL"))
	}

	/// Round-trip to the serving endpoint.
	async fn ping(&self) -> CacheResult<String> {
		Err(CacheError::unsupported(self.engine(), "PING"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	struct Bare;

	impl StructureOps for Bare {
		fn engine(&self) -> &'static str {
			"bare"
		}
	}

	#[rstest]
	#[case("before", ListPosition::Before)]
	#[case("AFTER", ListPosition::After)]
	fn test_list_position_parses(#[case] input: &str, #[case] expected: ListPosition) {
		assert_eq!(input.parse::<ListPosition>().unwrap(), expected);
	}

	#[rstest]
	fn test_list_position_rejects_other_values() {
		let err = "MIDDLE".parse::<ListPosition>().unwrap_err();
		assert!(matches!(err, CacheError::InvalidArgument(_)));
	}

	#[rstest]
	#[tokio::test]
	async fn test_structure_defaults_are_unsupported() {
		let bare = Bare;

		let err = bare.hget("h", "f").await.unwrap_err();

		assert_eq!(
			err,
			CacheError::Unsupported("HGET is not supported by the bare engine".to_string())
		);
		assert!(matches!(
			bare.subscribe(&["news"]).await,
			Err(CacheError::Unsupported(_))
		));
	}
}
