//! Connections to a single Redis endpoint
//!
//! [`RemoteClient`] is the seam between the router and the wire. The
//! production implementation, [`PooledClient`], draws connections from a
//! `deadpool-redis` pool and opens dedicated connections for pub/sub.

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, PoolError, Runtime, Timeouts};
use futures::StreamExt;
use keystone_cache::{CacheError, CacheResult, EndpointConfig, Message};
use redis::{Cmd, ErrorKind, RedisError, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Buffered messages per subscription before the reader waits.
const SUBSCRIPTION_BUFFER: usize = 64;

/// Executes commands against one endpoint.
#[async_trait]
pub trait RemoteClient: Send + Sync {
	/// Address used in logs.
	fn address(&self) -> &str;

	/// Run `cmd` and return the raw reply.
	async fn query(&self, cmd: &Cmd) -> CacheResult<Value>;

	/// Run a command that may block server-side for up to `wait`.
	async fn query_blocking(&self, cmd: &Cmd, _wait: Duration) -> CacheResult<Value> {
		self.query(cmd).await
	}

	/// Open a subscription on `channels`.
	async fn subscribe(&self, channels: &[String]) -> CacheResult<mpsc::Receiver<Message>>;
}

/// Builds a client for an endpoint.
pub trait ClientFactory: Send + Sync {
	fn create(&self, endpoint: &EndpointConfig) -> CacheResult<Arc<dyn RemoteClient>>;
}

/// Factory producing [`PooledClient`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct PooledClientFactory;

impl ClientFactory for PooledClientFactory {
	fn create(&self, endpoint: &EndpointConfig) -> CacheResult<Arc<dyn RemoteClient>> {
		Ok(Arc::new(PooledClient::connect(endpoint)?))
	}
}

/// Pooled connection to a Redis endpoint
///
/// The pool is sized by `max_active`. deadpool keeps every returned
/// connection until the pool is full, so `max_idle` has no separate effect.
///
/// Waiting for a pooled connection, opening one and running a command are
/// each bounded by the endpoint timeout. A command that runs out of time
/// fails with [`CacheError::Connection`].
#[derive(Clone)]
pub struct PooledClient {
	address: String,
	pool: Pool,
	client: redis::Client,
	timeout: Duration,
}

impl PooledClient {
	/// Create the pool. Connections are opened lazily on first use.
	///
	/// # Examples
	///
	/// ```no_run
	/// use keystone_cache::EndpointConfig;
	/// use keystone_redis::PooledClient;
	///
	/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
	/// let client = PooledClient::connect(&EndpointConfig::new("redis://localhost:6379"))?;
	/// # Ok(())
	/// # }
	/// ```
	pub fn connect(endpoint: &EndpointConfig) -> CacheResult<Self> {
		endpoint.validate()?;

		let timeout = endpoint.timeout();
		let mut pool_config = deadpool_redis::PoolConfig::new(endpoint.max_active);
		pool_config.timeouts = Timeouts {
			wait: Some(timeout),
			create: Some(timeout),
			recycle: Some(timeout),
		};

		let mut config = PoolConfig::from_url(endpoint.url.clone());
		config.pool = Some(pool_config);
		let pool = config.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
			CacheError::Configuration(format!("Failed to create Redis pool: {}", e))
		})?;

		let client = redis::Client::open(endpoint.url.as_str()).map_err(|e| {
			CacheError::Configuration(format!("Invalid Redis address {}: {}", endpoint.url, e))
		})?;

		Ok(Self {
			address: endpoint.url.clone(),
			pool,
			client,
			timeout,
		})
	}

	/// Get the connection pool
	pub fn pool(&self) -> &Pool {
		&self.pool
	}

	async fn run(&self, cmd: &Cmd, limit: Duration) -> CacheResult<Value> {
		let command = async {
			let mut conn = self.pool.get().await.map_err(pool_error)?;
			cmd.query_async::<Value>(&mut *conn)
				.await
				.map_err(remote_error)
		};
		tokio::time::timeout(limit, command).await.map_err(|_| {
			CacheError::Connection(format!(
				"{}: no reply within {:?}",
				self.address, limit
			))
		})?
	}
}

impl fmt::Debug for PooledClient {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PooledClient")
			.field("address", &self.address)
			.field("timeout", &self.timeout)
			.field("status", &self.pool.status())
			.finish()
	}
}

#[async_trait]
impl RemoteClient for PooledClient {
	fn address(&self) -> &str {
		&self.address
	}

	async fn query(&self, cmd: &Cmd) -> CacheResult<Value> {
		self.run(cmd, self.timeout).await
	}

	async fn query_blocking(&self, cmd: &Cmd, wait: Duration) -> CacheResult<Value> {
		self.run(cmd, self.timeout.saturating_add(wait)).await
	}

	async fn subscribe(&self, channels: &[String]) -> CacheResult<mpsc::Receiver<Message>> {
		let open = async {
			let mut pubsub = self.client.get_async_pubsub().await.map_err(remote_error)?;
			pubsub.subscribe(channels.to_vec()).await.map_err(remote_error)?;
			Ok::<_, CacheError>(pubsub)
		};
		let pubsub = tokio::time::timeout(self.timeout, open).await.map_err(|_| {
			CacheError::Connection(format!(
				"{}: subscription not confirmed within {:?}",
				self.address, self.timeout
			))
		})??;

		let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
		let address = self.address.clone();
		tokio::spawn(async move {
			let mut messages = pubsub.into_on_message();
			while let Some(msg) = messages.next().await {
				let message = Message {
					channel: msg.get_channel_name().to_string(),
					payload: msg.get_payload_bytes().to_vec(),
				};
				if tx.send(message).await.is_err() {
					break;
				}
			}
			tracing::debug!(endpoint = %address, "Subscription closed");
		});

		Ok(rx)
	}
}

/// Translate a client error into a [`CacheError`].
///
/// Anything that means the endpoint could not be reached becomes
/// [`CacheError::Connection`] so the router can fail over.
pub fn remote_error(err: RedisError) -> CacheError {
	if err.is_connection_refusal()
		|| err.is_timeout()
		|| err.is_connection_dropped()
		|| err.is_io_error()
	{
		return CacheError::Connection(err.to_string());
	}
	match err.kind() {
		ErrorKind::TypeError => CacheError::Type(err.to_string()),
		_ => CacheError::Backend(err.to_string()),
	}
}

fn pool_error(err: PoolError) -> CacheError {
	match err {
		PoolError::Backend(err) => remote_error(err),
		timeout @ PoolError::Timeout(_) => {
			CacheError::Connection(format!("Timed out waiting for a connection: {}", timeout))
		}
		other => CacheError::Backend(format!("Failed to get connection from pool: {}", other)),
	}
}
