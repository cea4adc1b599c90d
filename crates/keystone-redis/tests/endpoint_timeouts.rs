//! Timeout tests for Redis endpoints that accept connections and never reply
//!
//! ## Test Coverage
//!
//! - Commands fail with a connection error once the endpoint timeout elapses
//! - The PING probe reports a silent endpoint as dead
//! - A probe tick against a silent endpoint is recorded as a failure

use keystone_cache::{CacheError, EndpointConfig};
use keystone_redis::{BreakerConfig, HealthMonitor, PingProbe, PooledClient, Probe, RemoteClient};
use rstest::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

const LIMIT: Duration = Duration::from_millis(200);

/// Listener that accepts connections, holds them open and never answers
async fn spawn_silent_endpoint() -> String {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let address = listener.local_addr().unwrap();

	tokio::spawn(async move {
		let mut held = Vec::new();
		while let Ok((socket, _)) = listener.accept().await {
			held.push(socket);
		}
	});

	format!("redis://{}/0", address)
}

#[fixture]
async fn silent_client() -> Arc<PooledClient> {
	let url = spawn_silent_endpoint().await;
	let endpoint = EndpointConfig::new(url).with_timeout(LIMIT);
	Arc::new(PooledClient::connect(&endpoint).unwrap())
}

#[rstest]
#[tokio::test]
async fn test_query_times_out(#[future] silent_client: Arc<PooledClient>) {
	// Arrange
	let client = silent_client.await;
	let started = Instant::now();

	// Act
	let result = client.query(&redis::cmd("PING")).await;

	// Assert
	assert!(matches!(result, Err(CacheError::Connection(_))));
	assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
}

#[rstest]
#[tokio::test]
async fn test_ping_probe_reports_silent_endpoint_dead(
	#[future] silent_client: Arc<PooledClient>,
) {
	// Arrange
	let probe = PingProbe::new(silent_client.await, 5);

	// Act
	let alive = tokio::time::timeout(Duration::from_secs(5), probe.is_alive()).await;

	// Assert
	assert_eq!(alive, Ok(false));
}

#[rstest]
#[tokio::test]
async fn test_probe_tick_records_failure(#[future] silent_client: Arc<PooledClient>) {
	// Arrange
	let probe = Arc::new(PingProbe::new(silent_client.await, 5));
	let config = BreakerConfig::default()
		.with_threshold(1)
		.with_probe_timeout(Duration::from_secs(1));
	let monitor = HealthMonitor::new("silent", config, probe);

	// Act
	tokio::time::timeout(Duration::from_secs(5), monitor.check())
		.await
		.unwrap();

	// Assert
	assert_eq!(monitor.failure_count(), 1);
	assert!(monitor.is_tripped());
}
