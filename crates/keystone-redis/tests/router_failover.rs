//! Routing and failover tests for the Redis engine
//!
//! Endpoints are replaced by in-process fakes that answer every command with
//! their own name, so each test can tell which endpoint served a request.
//!
//! ## Test Coverage
//!
//! - Read endpoint selection order
//! - Breaker tripping after `threshold` connectivity failures
//! - Single reroute to the backup while the breaker is closed
//! - No reroute for non-connectivity errors or an already open breaker
//! - Writes pinned to the primary
//! - Recovery after consecutive healthy probes

use async_trait::async_trait;
use keystone_cache::{Cache, CacheError, CacheResult, CacheValue, EndpointConfig, Message};
use keystone_redis::{
	BreakerConfig, ClientFactory, EndpointRole, Probe, RedisCache, RedisCacheConfig, RemoteClient,
};
use redis::{Cmd, Value};
use rstest::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ========================================
// Fakes
// ========================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
	Healthy,
	Unreachable,
	WrongType,
	Missing,
}

struct FakeEndpoint {
	name: String,
	mode: Mutex<Mode>,
	calls: AtomicUsize,
}

impl FakeEndpoint {
	fn new(name: &str) -> Arc<Self> {
		Arc::new(Self {
			name: name.to_string(),
			mode: Mutex::new(Mode::Healthy),
			calls: AtomicUsize::new(0),
		})
	}

	fn set_mode(&self, mode: Mode) {
		*self.mode.lock().unwrap() = mode;
	}

	fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl RemoteClient for FakeEndpoint {
	fn address(&self) -> &str {
		&self.name
	}

	async fn query(&self, _cmd: &Cmd) -> CacheResult<Value> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		let mode = *self.mode.lock().unwrap();
		match mode {
			Mode::Healthy => Ok(Value::BulkString(self.name.as_bytes().to_vec())),
			Mode::Missing => Ok(Value::Nil),
			Mode::Unreachable => Err(CacheError::Connection(format!(
				"{}: connection refused",
				self.name
			))),
			Mode::WrongType => Err(CacheError::Type(format!(
				"{}: response was of incompatible type",
				self.name
			))),
		}
	}

	async fn subscribe(&self, _channels: &[String]) -> CacheResult<mpsc::Receiver<Message>> {
		let (_tx, rx) = mpsc::channel(1);
		Ok(rx)
	}
}

struct SwitchProbe {
	alive: AtomicBool,
}

#[async_trait]
impl Probe for SwitchProbe {
	async fn is_alive(&self) -> bool {
		self.alive.load(Ordering::SeqCst)
	}
}

struct FakeFactory {
	endpoints: HashMap<String, Arc<FakeEndpoint>>,
}

impl ClientFactory for FakeFactory {
	fn create(&self, endpoint: &EndpointConfig) -> CacheResult<Arc<dyn RemoteClient>> {
		self.endpoints
			.get(&endpoint.url)
			.map(|fake| fake.clone() as Arc<dyn RemoteClient>)
			.ok_or_else(|| CacheError::Configuration(format!("unknown endpoint {}", endpoint.url)))
	}
}

// ========================================
// Fixtures
// ========================================

const THRESHOLD: u64 = 5;

struct Topology {
	primary: Arc<FakeEndpoint>,
	read_only: Arc<FakeEndpoint>,
	backup: Arc<FakeEndpoint>,
	probe: Arc<SwitchProbe>,
	cache: RedisCache,
}

fn breaker() -> BreakerConfig {
	BreakerConfig::default()
		.with_threshold(THRESHOLD)
		.with_recovery_successes(2)
		.with_check_interval(Duration::from_secs(1))
}

fn build(read_only: bool, backup: bool) -> Topology {
	let primary = FakeEndpoint::new("primary");
	let read_only_fake = FakeEndpoint::new("read_only");
	let backup_fake = FakeEndpoint::new("backup");
	let probe = Arc::new(SwitchProbe {
		alive: AtomicBool::new(true),
	});

	let cache = RedisCache::from_parts(
		RedisCacheConfig::new("redis://primary").with_breaker(breaker()),
		primary.clone(),
		read_only.then(|| read_only_fake.clone() as Arc<dyn RemoteClient>),
		backup.then(|| backup_fake.clone() as Arc<dyn RemoteClient>),
		probe.clone(),
	);

	Topology {
		primary,
		read_only: read_only_fake,
		backup: backup_fake,
		probe,
		cache,
	}
}

#[fixture]
fn full() -> Topology {
	build(true, true)
}

// ========================================
// Endpoint selection
// ========================================

#[rstest]
#[case::all(true, true, EndpointRole::ReadOnly)]
#[case::read_only_only(true, false, EndpointRole::ReadOnly)]
#[case::backup_only(false, true, EndpointRole::Primary)]
#[case::primary_only(false, false, EndpointRole::Primary)]
fn test_closed_breaker_selection(
	#[case] read_only: bool,
	#[case] backup: bool,
	#[case] expected: EndpointRole,
) {
	let topology = build(read_only, backup);
	assert_eq!(topology.cache.router().select_read_endpoint(), expected);
}

#[rstest]
#[tokio::test]
async fn test_threshold_failures_trip_to_backup(full: Topology) {
	// Arrange
	full.read_only.set_mode(Mode::Unreachable);

	// Act
	let mut served_by = Vec::new();
	for _ in 0..THRESHOLD {
		served_by.push(full.cache.get_string("k").await.unwrap());
	}

	// Assert
	assert!(served_by.iter().all(|name| name == "backup"));
	assert!(full.cache.monitor().is_tripped());
	assert_eq!(
		full.cache.router().select_read_endpoint(),
		EndpointRole::Backup
	);

	// Once open, reads skip the read-only endpoint entirely
	assert_eq!(full.cache.get_string("k").await.unwrap(), "backup");
	assert_eq!(full.read_only.calls(), THRESHOLD as usize);
	assert_eq!(full.primary.calls(), 0);
}

#[rstest]
#[tokio::test]
async fn test_read_reroutes_once_while_closed(full: Topology) {
	// Arrange
	full.read_only.set_mode(Mode::Unreachable);
	full.backup.set_mode(Mode::Unreachable);

	// Act
	let result = full.cache.get("k").await;

	// Assert
	assert!(matches!(result, Err(CacheError::Connection(ref msg)) if msg.starts_with("backup")));
	assert_eq!(full.read_only.calls(), 1);
	assert_eq!(full.backup.calls(), 1);
	assert_eq!(full.cache.monitor().failure_count(), 1);
}

#[rstest]
#[tokio::test]
async fn test_no_reroute_when_breaker_already_open(full: Topology) {
	// Arrange
	for _ in 0..THRESHOLD {
		full.cache.monitor().record_failure();
	}
	full.backup.set_mode(Mode::Unreachable);

	// Act
	let result = full.cache.get("k").await;

	// Assert
	assert!(matches!(result, Err(CacheError::Connection(_))));
	assert_eq!(full.backup.calls(), 1);
	assert_eq!(full.read_only.calls(), 0);
	assert_eq!(full.primary.calls(), 0);
}

#[rstest]
#[tokio::test]
async fn test_type_errors_are_not_rerouted(full: Topology) {
	full.read_only.set_mode(Mode::WrongType);

	let result = full.cache.get("k").await;

	assert!(matches!(result, Err(CacheError::Type(_))));
	assert_eq!(full.backup.calls(), 0);
	assert_eq!(full.cache.monitor().failure_count(), 0);
}

#[rstest]
#[tokio::test]
async fn test_without_backup_error_is_returned() {
	let topology = build(true, false);
	topology.read_only.set_mode(Mode::Unreachable);

	let result = topology.cache.exists("k").await;

	assert!(matches!(result, Err(CacheError::Connection(_))));
	assert_eq!(topology.cache.monitor().failure_count(), 1);
	assert_eq!(topology.primary.calls(), 0);
}

// ========================================
// Writes
// ========================================

#[rstest]
#[tokio::test]
async fn test_writes_always_target_primary(full: Topology) {
	// Arrange
	for _ in 0..THRESHOLD {
		full.cache.monitor().record_failure();
	}

	// Act
	full.cache.set("k", CacheValue::from("v"), 10).await.unwrap();
	full.cache.delete("k").await.unwrap();

	// Assert
	assert_eq!(full.primary.calls(), 2);
	assert_eq!(full.backup.calls(), 0);
	assert_eq!(full.read_only.calls(), 0);
}

#[rstest]
#[tokio::test]
async fn test_write_failures_are_not_retried(full: Topology) {
	full.primary.set_mode(Mode::Unreachable);

	let result = full.cache.set("k", CacheValue::Int(1), 0).await;

	assert!(matches!(result, Err(CacheError::Connection(_))));
	assert_eq!(full.primary.calls(), 1);
	assert_eq!(full.backup.calls(), 0);
	// The probe watches the read-only endpoint, so primary failures are not counted
	assert_eq!(full.cache.monitor().failure_count(), 0);
}

#[rstest]
#[tokio::test]
async fn test_write_failures_count_when_primary_is_probed() {
	let topology = build(false, true);
	topology.primary.set_mode(Mode::Unreachable);

	let _ = topology.cache.incr("c").await;

	assert_eq!(topology.cache.monitor().failure_count(), 1);
}

// ========================================
// Typed reads and recovery
// ========================================

#[rstest]
#[tokio::test]
async fn test_missing_key_reads(full: Topology) {
	full.read_only.set_mode(Mode::Missing);

	assert_eq!(full.cache.get("absent").await.unwrap(), None);
	assert_eq!(full.cache.get_int("absent").await.unwrap(), 0);
	assert_eq!(full.cache.get_string("absent").await.unwrap(), "");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_probe_recovery_restores_read_only(full: Topology) {
	// Arrange
	full.probe.alive.store(false, Ordering::SeqCst);
	full.cache.monitor().start();
	tokio::time::sleep(Duration::from_millis(THRESHOLD * 1000 + 500)).await;
	assert_eq!(
		full.cache.router().select_read_endpoint(),
		EndpointRole::Backup
	);

	// Act
	full.probe.alive.store(true, Ordering::SeqCst);
	tokio::time::sleep(Duration::from_secs(2)).await;

	// Assert
	assert_eq!(
		full.cache.router().select_read_endpoint(),
		EndpointRole::ReadOnly
	);
	full.cache.shutdown();
}

#[rstest]
#[tokio::test]
async fn test_factory_builds_every_endpoint() {
	// Arrange
	let primary = FakeEndpoint::new("primary");
	let read_only = FakeEndpoint::new("read_only");
	let factory = FakeFactory {
		endpoints: HashMap::from([
			("redis://primary".to_string(), primary.clone()),
			("redis://read-only".to_string(), read_only.clone()),
		]),
	};
	let config = RedisCacheConfig::new("redis://primary")
		.with_read_only(EndpointConfig::new("redis://read-only"));

	// Act
	let cache = RedisCache::with_factory(config, &factory).unwrap();
	let value = cache.get_string("k").await.unwrap();
	cache.shutdown();

	// Assert
	assert_eq!(value, "read_only");
	assert!(cache.router().has_read_only());
	assert!(!cache.router().has_backup());
}

#[rstest]
#[tokio::test]
async fn test_factory_errors_abort_construction() {
	let factory = FakeFactory {
		endpoints: HashMap::new(),
	};

	let result = RedisCache::with_factory(RedisCacheConfig::new("redis://nowhere"), &factory);

	assert!(matches!(result, Err(CacheError::Configuration(_))));
}
