//! Hash, list, set, sorted set, pub/sub and scripting commands
//!
//! Pass-through calls. Commands that only read are routed like `GET`; every
//! other command, including blocking pops and the `*STORE` variants, is sent
//! to the primary.

use crate::backend::RedisCache;
use crate::router::EndpointRole;
use async_trait::async_trait;
use keystone_cache::{CacheResult, CacheValue, ListPosition, Message, StructureOps};
use redis::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;

#[async_trait]
impl StructureOps for RedisCache {
	fn engine(&self) -> &'static str {
		"redis"
	}

	// Hashes

	async fn hget(&self, key: &str, field: &str) -> CacheResult<Option<String>> {
		self.read_as(redis::cmd("HGET").arg(key).arg(field)).await
	}

	async fn hmget(&self, key: &str, fields: &[&str]) -> CacheResult<Vec<Option<String>>> {
		self.read_as(redis::cmd("HMGET").arg(key).arg(fields)).await
	}

	async fn hgetall(&self, key: &str) -> CacheResult<HashMap<String, String>> {
		self.read_as(redis::cmd("HGETALL").arg(key)).await
	}

	async fn hset(&self, key: &str, field: &str, value: &str) -> CacheResult<()> {
		self.write_as(redis::cmd("HSET").arg(key).arg(field).arg(value))
			.await
	}

	async fn hsetnx(&self, key: &str, field: &str, value: &str) -> CacheResult<bool> {
		self.write_as(redis::cmd("HSETNX").arg(key).arg(field).arg(value))
			.await
	}

	async fn hdel(&self, key: &str, fields: &[&str]) -> CacheResult<i64> {
		self.write_as(redis::cmd("HDEL").arg(key).arg(fields)).await
	}

	async fn hexists(&self, key: &str, field: &str) -> CacheResult<bool> {
		self.read_as(redis::cmd("HEXISTS").arg(key).arg(field)).await
	}

	async fn hincrby(&self, key: &str, field: &str, increment: i64) -> CacheResult<i64> {
		self.write_as(redis::cmd("HINCRBY").arg(key).arg(field).arg(increment))
			.await
	}

	async fn hincrbyfloat(&self, key: &str, field: &str, increment: f64) -> CacheResult<f64> {
		self.write_as(
			redis::cmd("HINCRBYFLOAT")
				.arg(key)
				.arg(field)
				.arg(increment),
		)
		.await
	}

	async fn hkeys(&self, key: &str) -> CacheResult<Vec<String>> {
		self.read_as(redis::cmd("HKEYS").arg(key)).await
	}

	async fn hlen(&self, key: &str) -> CacheResult<i64> {
		self.read_as(redis::cmd("HLEN").arg(key)).await
	}

	async fn hvals(&self, key: &str) -> CacheResult<Vec<String>> {
		self.read_as(redis::cmd("HVALS").arg(key)).await
	}

	// Lists

	async fn blpop(&self, keys: &[&str], timeout_secs: f64) -> CacheResult<Option<(String, String)>> {
		self.write_blocking_as(redis::cmd("BLPOP").arg(keys).arg(timeout_secs), timeout_secs)
			.await
	}

	async fn brpop(&self, keys: &[&str], timeout_secs: f64) -> CacheResult<Option<(String, String)>> {
		self.write_blocking_as(redis::cmd("BRPOP").arg(keys).arg(timeout_secs), timeout_secs)
			.await
	}

	async fn brpoplpush(
		&self,
		source: &str,
		destination: &str,
		timeout_secs: f64,
	) -> CacheResult<Option<String>> {
		self.write_blocking_as(
			redis::cmd("BRPOPLPUSH")
				.arg(source)
				.arg(destination)
				.arg(timeout_secs),
			timeout_secs,
		)
		.await
	}

	async fn lindex(&self, key: &str, index: i64) -> CacheResult<Option<String>> {
		self.read_as(redis::cmd("LINDEX").arg(key).arg(index)).await
	}

	async fn linsert(
		&self,
		key: &str,
		position: ListPosition,
		pivot: &str,
		value: &str,
	) -> CacheResult<i64> {
		self.write_as(
			redis::cmd("LINSERT")
				.arg(key)
				.arg(position.as_str())
				.arg(pivot)
				.arg(value),
		)
		.await
	}

	async fn llen(&self, key: &str) -> CacheResult<i64> {
		self.read_as(redis::cmd("LLEN").arg(key)).await
	}

	async fn lpop(&self, key: &str) -> CacheResult<Option<String>> {
		self.write_as(redis::cmd("LPOP").arg(key)).await
	}

	async fn lpush(&self, key: &str, values: &[&str]) -> CacheResult<i64> {
		self.write_as(redis::cmd("LPUSH").arg(key).arg(values)).await
	}

	async fn lpushx(&self, key: &str, value: &str) -> CacheResult<i64> {
		self.write_as(redis::cmd("LPUSHX").arg(key).arg(value)).await
	}

	async fn lrange(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<String>> {
		self.read_as(redis::cmd("LRANGE").arg(key).arg(start).arg(stop))
			.await
	}

	async fn lrem(&self, key: &str, count: i64, value: &str) -> CacheResult<i64> {
		self.write_as(redis::cmd("LREM").arg(key).arg(count).arg(value))
			.await
	}

	async fn lset(&self, key: &str, index: i64, value: &str) -> CacheResult<()> {
		self.write_as(redis::cmd("LSET").arg(key).arg(index).arg(value))
			.await
	}

	async fn ltrim(&self, key: &str, start: i64, stop: i64) -> CacheResult<()> {
		self.write_as(redis::cmd("LTRIM").arg(key).arg(start).arg(stop))
			.await
	}

	async fn rpop(&self, key: &str) -> CacheResult<Option<String>> {
		self.write_as(redis::cmd("RPOP").arg(key)).await
	}

	async fn rpoplpush(&self, source: &str, destination: &str) -> CacheResult<Option<String>> {
		self.write_as(redis::cmd("RPOPLPUSH").arg(source).arg(destination))
			.await
	}

	async fn rpush(&self, key: &str, values: &[&str]) -> CacheResult<i64> {
		self.write_as(redis::cmd("RPUSH").arg(key).arg(values)).await
	}

	async fn rpushx(&self, key: &str, values: &[&str]) -> CacheResult<i64> {
		self.write_as(redis::cmd("RPUSHX").arg(key).arg(values)).await
	}

	// Sets

	async fn sadd(&self, key: &str, members: &[&str]) -> CacheResult<i64> {
		self.write_as(redis::cmd("SADD").arg(key).arg(members)).await
	}

	async fn scard(&self, key: &str) -> CacheResult<i64> {
		self.read_as(redis::cmd("SCARD").arg(key)).await
	}

	async fn sdiff(&self, keys: &[&str]) -> CacheResult<Vec<String>> {
		self.read_as(redis::cmd("SDIFF").arg(keys)).await
	}

	async fn sdiffstore(&self, destination: &str, keys: &[&str]) -> CacheResult<i64> {
		self.write_as(redis::cmd("SDIFFSTORE").arg(destination).arg(keys))
			.await
	}

	async fn sinter(&self, keys: &[&str]) -> CacheResult<Vec<String>> {
		self.read_as(redis::cmd("SINTER").arg(keys)).await
	}

	async fn sinterstore(&self, destination: &str, keys: &[&str]) -> CacheResult<i64> {
		self.write_as(redis::cmd("SINTERSTORE").arg(destination).arg(keys))
			.await
	}

	async fn sismember(&self, key: &str, member: &str) -> CacheResult<bool> {
		self.read_as(redis::cmd("SISMEMBER").arg(key).arg(member)).await
	}

	async fn smembers(&self, key: &str) -> CacheResult<Vec<String>> {
		self.read_as(redis::cmd("SMEMBERS").arg(key)).await
	}

	async fn smove(&self, source: &str, destination: &str, member: &str) -> CacheResult<bool> {
		self.write_as(
			redis::cmd("SMOVE")
				.arg(source)
				.arg(destination)
				.arg(member),
		)
		.await
	}

	async fn spop(&self, key: &str) -> CacheResult<Option<String>> {
		self.write_as(redis::cmd("SPOP").arg(key)).await
	}

	async fn srandmember(&self, key: &str, count: i64) -> CacheResult<Vec<String>> {
		self.read_as(redis::cmd("SRANDMEMBER").arg(key).arg(count))
			.await
	}

	async fn srem(&self, key: &str, members: &[&str]) -> CacheResult<i64> {
		self.write_as(redis::cmd("SREM").arg(key).arg(members)).await
	}

	async fn sunion(&self, keys: &[&str]) -> CacheResult<Vec<String>> {
		self.read_as(redis::cmd("SUNION").arg(keys)).await
	}

	async fn sunionstore(&self, destination: &str, keys: &[&str]) -> CacheResult<i64> {
		self.write_as(redis::cmd("SUNIONSTORE").arg(destination).arg(keys))
			.await
	}

	// Sorted sets

	async fn zadd(&self, key: &str, score: f64, member: &str) -> CacheResult<i64> {
		self.write_as(redis::cmd("ZADD").arg(key).arg(score).arg(member))
			.await
	}

	async fn zcard(&self, key: &str) -> CacheResult<i64> {
		self.read_as(redis::cmd("ZCARD").arg(key)).await
	}

	async fn zcount(&self, key: &str, min: f64, max: f64) -> CacheResult<i64> {
		self.read_as(redis::cmd("ZCOUNT").arg(key).arg(min).arg(max))
			.await
	}

	async fn zrange(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<String>> {
		self.read_as(redis::cmd("ZRANGE").arg(key).arg(start).arg(stop))
			.await
	}

	async fn zrangebyscore(
		&self,
		key: &str,
		min: &str,
		max: &str,
		with_scores: bool,
	) -> CacheResult<Vec<String>> {
		let mut cmd = redis::cmd("ZRANGEBYSCORE");
		cmd.arg(key).arg(min).arg(max);
		if with_scores {
			cmd.arg("WITHSCORES");
		}
		self.read_as(&cmd).await
	}

	async fn zrank(&self, key: &str, member: &str) -> CacheResult<Option<i64>> {
		self.read_as(redis::cmd("ZRANK").arg(key).arg(member)).await
	}

	async fn zrem(&self, key: &str, members: &[&str]) -> CacheResult<i64> {
		self.write_as(redis::cmd("ZREM").arg(key).arg(members)).await
	}

	async fn zrevrange(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<String>> {
		self.read_as(redis::cmd("ZREVRANGE").arg(key).arg(start).arg(stop))
			.await
	}

	async fn zrevrangebyscore(
		&self,
		key: &str,
		max: &str,
		min: &str,
		with_scores: bool,
	) -> CacheResult<Vec<String>> {
		let mut cmd = redis::cmd("ZREVRANGEBYSCORE");
		cmd.arg(key).arg(max).arg(min);
		if with_scores {
			cmd.arg("WITHSCORES");
		}
		self.read_as(&cmd).await
	}

	// Messaging and scripting

	async fn publish(&self, channel: &str, message: &[u8]) -> CacheResult<i64> {
		self.write_as(redis::cmd("PUBLISH").arg(channel).arg(message))
			.await
	}

	async fn subscribe(&self, channels: &[&str]) -> CacheResult<mpsc::Receiver<Message>> {
		let channels: Vec<String> = channels.iter().map(|c| c.to_string()).collect();
		self.router()
			.client(EndpointRole::Primary)
			.subscribe(&channels)
			.await
	}

	async fn eval(
		&self,
		script: &str,
		keys: &[&str],
		args: &[&str],
	) -> CacheResult<Option<CacheValue>> {
		let reply: Value = self
			.write_as(
				redis::cmd("EVAL")
					.arg(script)
					.arg(keys.len())
					.arg(keys)
					.arg(args),
			)
			.await?;
		Ok(reply_to_value(reply))
	}

	async fn ping(&self) -> CacheResult<String> {
		self.read_as(&redis::cmd("PING")).await
	}
}

/// Convert a script reply. Nested replies become JSON documents.
fn reply_to_value(reply: Value) -> Option<CacheValue> {
	match reply {
		Value::Nil => None,
		Value::Int(v) => Some(CacheValue::Int(v)),
		Value::Double(v) => Some(CacheValue::Float(v)),
		Value::BulkString(bytes) => Some(CacheValue::from_bytes(bytes)),
		Value::SimpleString(text) => Some(CacheValue::Str(text)),
		Value::Okay => Some(CacheValue::from("OK")),
		other => Some(CacheValue::Json(reply_to_json(other))),
	}
}

fn reply_to_json(reply: Value) -> serde_json::Value {
	match reply {
		Value::Nil => serde_json::Value::Null,
		Value::Int(v) => v.into(),
		Value::Double(v) => v.into(),
		Value::Boolean(v) => v.into(),
		Value::BulkString(bytes) => String::from_utf8_lossy(&bytes).into_owned().into(),
		Value::SimpleString(text) => text.into(),
		Value::Okay => "OK".into(),
		Value::Array(items) | Value::Set(items) => {
			serde_json::Value::Array(items.into_iter().map(reply_to_json).collect())
		}
		Value::Map(pairs) => serde_json::Value::Object(
			pairs
				.into_iter()
				.map(|(field, value)| (json_key(field), reply_to_json(value)))
				.collect(),
		),
		other => format!("{:?}", other).into(),
	}
}

fn json_key(field: Value) -> String {
	match reply_to_json(field) {
		serde_json::Value::String(text) => text,
		other => other.to_string(),
	}
}
