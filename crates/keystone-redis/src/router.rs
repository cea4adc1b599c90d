//! Read and write routing across the primary, read-only and backup endpoints

use crate::client::RemoteClient;
use crate::health::HealthMonitor;
use keystone_cache::{CacheError, CacheResult};
use redis::{Cmd, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Role of an endpoint within one logical cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointRole {
	Primary,
	ReadOnly,
	Backup,
}

impl fmt::Display for EndpointRole {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			EndpointRole::Primary => f.write_str("primary"),
			EndpointRole::ReadOnly => f.write_str("read_only"),
			EndpointRole::Backup => f.write_str("backup"),
		}
	}
}

/// Message fragments of errors raised when an endpoint cannot be reached.
const CONNECTIVITY_PATTERNS: &[&str] = &[
	"no such host",
	"failed to lookup address",
	"name or service not known",
	"connection refused",
	"actively refused",
	"timed out",
	"did not properly respond",
];

/// Whether `err` means the endpoint was unreachable.
///
/// Only these errors count toward the breaker and trigger the backup reroute.
pub fn is_connectivity_error(err: &CacheError) -> bool {
	match err {
		CacheError::Connection(_) => true,
		CacheError::Backend(message) => {
			let message = message.to_ascii_lowercase();
			CONNECTIVITY_PATTERNS
				.iter()
				.any(|pattern| message.contains(pattern))
		}
		_ => false,
	}
}

/// Picks the endpoint for every command of a Redis cache.
pub struct EndpointRouter {
	primary: Arc<dyn RemoteClient>,
	read_only: Option<Arc<dyn RemoteClient>>,
	backup: Option<Arc<dyn RemoteClient>>,
	monitor: Arc<HealthMonitor>,
}

impl EndpointRouter {
	pub fn new(
		primary: Arc<dyn RemoteClient>,
		read_only: Option<Arc<dyn RemoteClient>>,
		backup: Option<Arc<dyn RemoteClient>>,
		monitor: Arc<HealthMonitor>,
	) -> Self {
		Self {
			primary,
			read_only,
			backup,
			monitor,
		}
	}

	/// Endpoint the next read goes to.
	///
	/// The backup while the breaker is open, otherwise the read-only
	/// endpoint, otherwise the primary. Roles that are not configured are
	/// skipped.
	pub fn select_read_endpoint(&self) -> EndpointRole {
		if self.monitor.is_tripped() && self.backup.is_some() {
			EndpointRole::Backup
		} else if self.read_only.is_some() {
			EndpointRole::ReadOnly
		} else {
			EndpointRole::Primary
		}
	}

	/// Client serving `role`, falling back to the primary when the role is
	/// not configured.
	pub fn client(&self, role: EndpointRole) -> &Arc<dyn RemoteClient> {
		let configured = match role {
			EndpointRole::Primary => None,
			EndpointRole::ReadOnly => self.read_only.as_ref(),
			EndpointRole::Backup => self.backup.as_ref(),
		};
		configured.unwrap_or(&self.primary)
	}

	/// Client used by the probe loop: the read-only endpoint when set.
	pub fn probe_target(&self) -> &Arc<dyn RemoteClient> {
		self.read_only.as_ref().unwrap_or(&self.primary)
	}

	pub fn monitor(&self) -> &Arc<HealthMonitor> {
		&self.monitor
	}

	pub fn has_backup(&self) -> bool {
		self.backup.is_some()
	}

	pub fn has_read_only(&self) -> bool {
		self.read_only.is_some()
	}

	/// Run a read command.
	///
	/// A connectivity failure is recorded with the breaker. If the breaker
	/// was still closed and a backup exists, the command is retried once on
	/// the backup and that result is returned.
	pub async fn read(&self, cmd: &Cmd) -> CacheResult<Value> {
		let role = self.select_read_endpoint();
		let client = self.client(role);

		let err = match client.query(cmd).await {
			Ok(reply) => return Ok(reply),
			Err(err) if is_connectivity_error(&err) => err,
			Err(err) => return Err(err),
		};

		let was_open = self.monitor.is_tripped();
		self.monitor.record_failure();

		match &self.backup {
			Some(backup) if !was_open && role != EndpointRole::Backup => {
				tracing::warn!(
					endpoint = client.address(),
					role = %role,
					backup = backup.address(),
					error = %err,
					"Read failed on unreachable endpoint, retrying on backup"
				);
				backup.query(cmd).await
			}
			_ => {
				tracing::warn!(
					endpoint = client.address(),
					role = %role,
					error = %err,
					"Read failed on unreachable endpoint"
				);
				Err(err)
			}
		}
	}

	/// Run a write command on the primary. Writes are never retried.
	pub async fn write(&self, cmd: &Cmd) -> CacheResult<Value> {
		let result = self.primary.query(cmd).await;
		self.observe_write(result)
	}

	/// Like [`write`](Self::write), for commands that block server-side for up to `wait`.
	pub async fn write_blocking(&self, cmd: &Cmd, wait: Duration) -> CacheResult<Value> {
		let result = self.primary.query_blocking(cmd, wait).await;
		self.observe_write(result)
	}

	fn observe_write(&self, result: CacheResult<Value>) -> CacheResult<Value> {
		match result {
			Err(err) if is_connectivity_error(&err) => {
				// The breaker tracks the primary only when it is also the probe target
				if self.read_only.is_none() {
					self.monitor.record_failure();
				}
				tracing::warn!(
					endpoint = self.primary.address(),
					error = %err,
					"Write failed on unreachable primary"
				);
				Err(err)
			}
			result => result,
		}
	}
}

impl fmt::Debug for EndpointRouter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EndpointRouter")
			.field("primary", &self.primary.address())
			.field("read_only", &self.read_only.as_ref().map(|c| c.address().to_string()))
			.field("backup", &self.backup.as_ref().map(|c| c.address().to_string()))
			.field("monitor", &self.monitor)
			.finish()
	}
}
