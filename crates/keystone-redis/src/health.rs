//! Endpoint health monitor
//!
//! A circuit breaker with two states. It counts failures reported by the
//! router and by its own probe loop, and opens once the count reaches the
//! configured threshold. While open, reads are served by the backup endpoint.
//!
//! The counter is reset after `recovery_successes` consecutive healthy probe
//! ticks, which closes the breaker again.

use crate::client::RemoteClient;
use crate::config::BreakerConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Liveness check run on every tick.
#[async_trait]
pub trait Probe: Send + Sync {
	async fn is_alive(&self) -> bool;
}

/// Probe that sends `PING` several times and expects `PONG` every time.
pub struct PingProbe {
	client: Arc<dyn RemoteClient>,
	attempts: usize,
}

impl PingProbe {
	pub fn new(client: Arc<dyn RemoteClient>, attempts: usize) -> Self {
		Self {
			client,
			attempts: attempts.max(1),
		}
	}
}

#[async_trait]
impl Probe for PingProbe {
	async fn is_alive(&self) -> bool {
		let ping = redis::cmd("PING");
		for attempt in 1..=self.attempts {
			match self.client.query(&ping).await {
				Ok(reply) => match redis::from_redis_value::<String>(&reply) {
					Ok(text) if text == "PONG" => continue,
					_ => {
						tracing::debug!(
							endpoint = self.client.address(),
							attempt,
							"Unexpected PING reply"
						);
						return false;
					}
				},
				Err(err) => {
					tracing::debug!(
						endpoint = self.client.address(),
						attempt,
						error = %err,
						"PING failed"
					);
					return false;
				}
			}
		}
		true
	}
}

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
	/// Reads use the read-only endpoint, or the primary
	Closed,
	/// Reads use the backup endpoint
	Open,
}

/// Circuit breaker fed by a probe loop and by operation failures.
pub struct HealthMonitor {
	name: String,
	config: BreakerConfig,
	probe: Arc<dyn Probe>,
	failure_count: AtomicU64,
	consecutive_successes: AtomicU64,
	shutdown_tx: broadcast::Sender<()>,
	task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
	/// Create a monitor. The probe loop is not started.
	pub fn new(name: impl Into<String>, config: BreakerConfig, probe: Arc<dyn Probe>) -> Arc<Self> {
		let (shutdown_tx, _) = broadcast::channel(1);
		Arc::new(Self {
			name: name.into(),
			config,
			probe,
			failure_count: AtomicU64::new(0),
			consecutive_successes: AtomicU64::new(0),
			shutdown_tx,
			task: Mutex::new(None),
		})
	}

	/// Spawn the probe loop. It runs until [`HealthMonitor::shutdown`] is
	/// called or the monitor is dropped.
	pub fn start(self: &Arc<Self>) {
		let monitor = Arc::downgrade(self);
		let mut shutdown_rx = self.shutdown_tx.subscribe();
		let interval = self.config.check_interval();

		let handle = tokio::spawn(async move {
			let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

			loop {
				tokio::select! {
					_ = ticker.tick() => {
						let Some(monitor) = monitor.upgrade() else {
							break;
						};
						monitor.check().await;
					}
					_ = shutdown_rx.recv() => {
						break;
					}
				}
			}
		});

		tracing::debug!(
			monitor = %self.name,
			interval_secs = interval.as_secs(),
			"Started health probe loop"
		);

		if let Some(previous) = self.task.lock().replace(handle) {
			previous.abort();
		}
	}

	/// Stop the probe loop. The current state is kept.
	pub fn shutdown(&self) {
		let _ = self.shutdown_tx.send(());
		if let Some(handle) = self.task.lock().take() {
			handle.abort();
		}
	}

	pub fn is_running(&self) -> bool {
		self.task
			.lock()
			.as_ref()
			.is_some_and(|handle| !handle.is_finished())
	}

	/// Run one probe tick. A probe that outlives `probe_timeout` fails the tick.
	pub async fn check(&self) {
		let limit = self.config.probe_timeout();
		match tokio::time::timeout(limit, self.probe.is_alive()).await {
			Ok(true) => self.record_success(),
			Ok(false) => {
				tracing::warn!(monitor = %self.name, "Health probe failed");
				self.record_failure();
			}
			Err(_) => {
				tracing::warn!(
					monitor = %self.name,
					timeout_ms = limit.as_millis() as u64,
					"Health probe timed out"
				);
				self.record_failure();
			}
		}
	}

	/// Count a connectivity failure.
	pub fn record_failure(&self) {
		self.consecutive_successes.store(0, Ordering::SeqCst);
		let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
		if failures == self.config.threshold {
			tracing::warn!(
				monitor = %self.name,
				failures,
				threshold = self.config.threshold,
				"Circuit breaker opened, reads move to the backup endpoint"
			);
		}
	}

	fn record_success(&self) {
		if self.failure_count.load(Ordering::SeqCst) == 0 || self.config.recovery_successes == 0 {
			return;
		}

		let successes = self.consecutive_successes.fetch_add(1, Ordering::SeqCst) + 1;
		if successes >= self.config.recovery_successes {
			self.consecutive_successes.store(0, Ordering::SeqCst);
			let previous = self.failure_count.swap(0, Ordering::SeqCst);
			if previous >= self.config.threshold {
				tracing::info!(
					monitor = %self.name,
					successes,
					"Circuit breaker closed"
				);
			}
		}
	}

	pub fn is_tripped(&self) -> bool {
		self.failure_count.load(Ordering::SeqCst) >= self.config.threshold
	}

	pub fn state(&self) -> BreakerState {
		if self.is_tripped() {
			BreakerState::Open
		} else {
			BreakerState::Closed
		}
	}

	pub fn failure_count(&self) -> u64 {
		self.failure_count.load(Ordering::SeqCst)
	}

	pub fn config(&self) -> &BreakerConfig {
		&self.config
	}
}

impl std::fmt::Debug for HealthMonitor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HealthMonitor")
			.field("name", &self.name)
			.field("state", &self.state())
			.field("failure_count", &self.failure_count())
			.finish()
	}
}

impl Drop for HealthMonitor {
	fn drop(&mut self) {
		if let Some(handle) = self.task.get_mut().take() {
			handle.abort();
		}
	}
}
