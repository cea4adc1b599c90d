//! Memcached cache engine with multi-server support.
//!
//! Keys are spread over the configured servers by hash. When the owning
//! server fails, the operation moves on to the next server in the list.
//! Every connect and every command is bounded by `timeout_ms`; a server that
//! fails or stalls has its connection dropped and re-established on next use.
//!
//! Only plain values are supported. Counters, ttl updates and every
//! structure operation fail with [`CacheError::Unsupported`].

use async_trait::async_trait;
use keystone_cache::{Cache, CacheError, CacheResult, CacheValue, StructureOps};
use memcache_async::ascii::Protocol;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

// Memcached protocol over a tokio TcpStream
type Connection = Protocol<Compat<TcpStream>>;

/// Memcached configuration.
///
/// ```rust
/// use keystone_memcached::MemcachedConfig;
///
/// let config = MemcachedConfig {
///     servers: vec![
///         "127.0.0.1:11211".to_string(),
///         "127.0.0.1:11212".to_string(),
///     ],
///     timeout_ms: 1000,
/// };
/// assert_eq!(config.endpoint_key(), "127.0.0.1:11211,127.0.0.1:11212");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemcachedConfig {
	/// Server addresses, like `127.0.0.1:11211`
	pub servers: Vec<String>,
	/// Connect and per-command timeout in milliseconds
	pub timeout_ms: u64,
}

impl MemcachedConfig {
	pub fn new<I, S>(servers: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			servers: servers.into_iter().map(Into::into).collect(),
			..Default::default()
		}
	}

	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms.max(1))
	}

	/// Key under which the cache is registered.
	pub fn endpoint_key(&self) -> String {
		self.servers.join(",")
	}
}

impl Default for MemcachedConfig {
	fn default() -> Self {
		Self {
			servers: vec!["127.0.0.1:11211".to_string()],
			timeout_ms: 1000,
		}
	}
}

struct Server {
	address: String,
	// None after a failed command until the next reconnect
	connection: Mutex<Option<Connection>>,
}

/// Memcached-based cache engine.
pub struct MemcachedCache {
	servers: Vec<Server>,
	config: MemcachedConfig,
}

impl MemcachedCache {
	/// Connect to every configured server.
	///
	/// Servers that cannot be reached are skipped with a warning; at least
	/// one must accept the connection.
	///
	/// ```rust,no_run
	/// use keystone_cache::{Cache, CacheValue};
	/// use keystone_memcached::{MemcachedCache, MemcachedConfig};
	///
	/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
	/// let config = MemcachedConfig::new(["10.0.3.1:11211", "10.0.3.2:11211"]);
	/// let cache = MemcachedCache::connect(config).await?;
	///
	/// cache.set("page:/", CacheValue::from("<html></html>"), 300).await?;
	/// # Ok(())
	/// # }
	/// ```
	pub async fn connect(config: MemcachedConfig) -> CacheResult<Self> {
		if config.servers.iter().all(|server| server.trim().is_empty()) {
			return Err(CacheError::Configuration(
				"No Memcached servers specified".to_string(),
			));
		}

		let mut servers = Vec::new();
		let mut last_error = None;

		for address in config.servers.iter().filter(|s| !s.trim().is_empty()) {
			match connect_to_server(address, config.timeout()).await {
				Ok(connection) => servers.push(Server {
					address: address.clone(),
					connection: Mutex::new(Some(connection)),
				}),
				Err(e) => {
					tracing::warn!(server = %address, error = %e, "Failed to connect to Memcached server");
					last_error = Some(e);
				}
			}
		}

		if servers.is_empty() {
			return Err(last_error.unwrap_or_else(|| {
				CacheError::Connection("Failed to connect to any Memcached server".to_string())
			}));
		}

		Ok(Self { servers, config })
	}

	/// Connect to a single server.
	pub async fn from_url(url: &str) -> CacheResult<Self> {
		Self::connect(MemcachedConfig::new([url])).await
	}

	pub fn config(&self) -> &MemcachedConfig {
		&self.config
	}

	/// Addresses of the servers that accepted a connection.
	pub fn connected_servers(&self) -> Vec<&str> {
		self.servers.iter().map(|s| s.address.as_str()).collect()
	}

	/// Servers to try for `key`: the owner first, then the rest in order.
	fn servers_for(&self, key: &str) -> impl Iterator<Item = &Server> {
		let count = self.servers.len();
		let start = owner_index(key, count);
		(0..count).map(move |attempt| &self.servers[(start + attempt) % count])
	}

	/// Lock the server's connection, reconnecting when the last one was dropped.
	async fn checkout<'a>(
		&self,
		server: &'a Server,
	) -> CacheResult<MutexGuard<'a, Option<Connection>>> {
		let mut guard = server.connection.lock().await;
		if guard.is_none() {
			*guard = Some(connect_to_server(&server.address, self.config.timeout()).await?);
			tracing::debug!(server = %server.address, "Reconnected to Memcached server");
		}
		Ok(guard)
	}

	async fn fetch(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
		let mut last_error = None;

		for server in self.servers_for(key) {
			let mut guard = match self.checkout(server).await {
				Ok(guard) => guard,
				Err(e) => {
					last_error = Some(e);
					continue;
				}
			};
			let Some(connection) = guard.as_mut() else {
				continue;
			};

			let error = match timeout(self.config.timeout(), connection.get(key)).await {
				Ok(Ok(bytes)) => return Ok(Some(bytes)),
				Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
				Ok(Err(e)) => io_error(e, "get"),
				Err(_) => timed_out(&server.address, "get"),
			};
			tracing::warn!(
				server = %server.address,
				error = %error,
				"Memcached get failed, trying next server"
			);
			*guard = None;
			last_error = Some(error);
		}

		Err(last_error.unwrap_or_else(|| {
			CacheError::Connection("All Memcached servers failed".to_string())
		}))
	}

	async fn store(&self, key: &str, payload: &[u8], expiration: u32) -> CacheResult<()> {
		let mut last_error = None;

		for server in self.servers_for(key) {
			let mut guard = match self.checkout(server).await {
				Ok(guard) => guard,
				Err(e) => {
					last_error = Some(e);
					continue;
				}
			};
			let Some(connection) = guard.as_mut() else {
				continue;
			};

			let write = connection.set(key, payload, expiration);
			let error = match timeout(self.config.timeout(), write).await {
				Ok(Ok(())) => return Ok(()),
				Ok(Err(e)) => io_error(e, "set"),
				Err(_) => timed_out(&server.address, "set"),
			};
			tracing::warn!(
				server = %server.address,
				error = %error,
				"Memcached set failed, trying next server"
			);
			*guard = None;
			last_error = Some(error);
		}

		Err(last_error.unwrap_or_else(|| {
			CacheError::Connection("All Memcached servers failed".to_string())
		}))
	}

	async fn remove(&self, key: &str) -> CacheResult<()> {
		let mut last_error = None;

		for server in self.servers_for(key) {
			let mut guard = match self.checkout(server).await {
				Ok(guard) => guard,
				Err(e) => {
					last_error = Some(e);
					continue;
				}
			};
			let Some(connection) = guard.as_mut() else {
				continue;
			};

			let error = match timeout(self.config.timeout(), connection.delete(key)).await {
				Ok(Ok(())) => return Ok(()),
				Ok(Err(e)) => io_error(e, "delete"),
				Err(_) => timed_out(&server.address, "delete"),
			};
			tracing::warn!(
				server = %server.address,
				error = %error,
				"Memcached delete failed, trying next server"
			);
			*guard = None;
			last_error = Some(error);
		}

		Err(last_error.unwrap_or_else(|| {
			CacheError::Connection("All Memcached servers failed".to_string())
		}))
	}
}

async fn connect_to_server(address: &str, limit: Duration) -> CacheResult<Connection> {
	let stream = match timeout(limit, TcpStream::connect(address)).await {
		Ok(Ok(stream)) => stream,
		Ok(Err(e)) if e.kind() == io::ErrorKind::InvalidInput => {
			return Err(CacheError::Configuration(format!(
				"Invalid Memcached address {}: {}",
				address, e
			)));
		}
		Ok(Err(e)) => {
			return Err(CacheError::Connection(format!(
				"Failed to connect to Memcached at {}: {}",
				address, e
			)));
		}
		Err(_) => return Err(timed_out(address, "connect")),
	};
	stream
		.set_nodelay(true)
		.map_err(|e| CacheError::Connection(format!("Failed to configure socket: {}", e)))?;

	Ok(Protocol::new(stream.compat()))
}

fn owner_index(key: &str, servers: usize) -> usize {
	let mut hasher = DefaultHasher::new();
	key.hash(&mut hasher);
	(hasher.finish() % servers.max(1) as u64) as usize
}

fn io_error(err: io::Error, operation: &str) -> CacheError {
	match err.kind() {
		io::ErrorKind::ConnectionRefused
		| io::ErrorKind::ConnectionReset
		| io::ErrorKind::ConnectionAborted
		| io::ErrorKind::NotConnected
		| io::ErrorKind::BrokenPipe
		| io::ErrorKind::TimedOut
		| io::ErrorKind::UnexpectedEof => {
			CacheError::Connection(format!("Memcached {} error: {}", operation, err))
		}
		_ => CacheError::Backend(format!("Memcached {} error: {}", operation, err)),
	}
}

fn timed_out(address: &str, operation: &str) -> CacheError {
	CacheError::Connection(format!("Memcached {} on {} timed out", operation, address))
}

fn expiration(ttl_secs: i64) -> u32 {
	u32::try_from(ttl_secs.max(0)).unwrap_or(u32::MAX)
}

#[async_trait]
impl Cache for MemcachedCache {
	async fn exists(&self, key: &str) -> CacheResult<bool> {
		Ok(self.fetch(key).await?.is_some())
	}

	async fn get(&self, key: &str) -> CacheResult<Option<CacheValue>> {
		Ok(self.fetch(key).await?.map(CacheValue::from_bytes))
	}

	async fn set(&self, key: &str, value: CacheValue, ttl_secs: i64) -> CacheResult<()> {
		self.store(key, &value.to_bytes(), expiration(ttl_secs)).await
	}

	async fn incr(&self, _key: &str) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "INCR"))
	}

	async fn decr(&self, _key: &str) -> CacheResult<i64> {
		Err(CacheError::unsupported(self.engine(), "DECR"))
	}

	async fn delete(&self, key: &str) -> CacheResult<()> {
		self.remove(key).await
	}

	async fn expire(&self, _key: &str, _ttl_secs: i64) -> CacheResult<bool> {
		Err(CacheError::unsupported(self.engine(), "EXPIRE"))
	}

	async fn clear_all(&self) -> CacheResult<()> {
		let mut last_error = None;
		let mut cleared = 0;

		for server in &self.servers {
			let mut guard = match self.checkout(server).await {
				Ok(guard) => guard,
				Err(e) => {
					last_error = Some(e);
					continue;
				}
			};
			let Some(connection) = guard.as_mut() else {
				continue;
			};

			match timeout(self.config.timeout(), connection.flush()).await {
				Ok(Ok(())) => cleared += 1,
				Ok(Err(e)) => {
					tracing::warn!(server = %server.address, error = %e, "Failed to flush Memcached server");
					*guard = None;
					last_error = Some(io_error(e, "flush"));
				}
				Err(_) => {
					tracing::warn!(server = %server.address, "Memcached flush timed out");
					*guard = None;
					last_error = Some(timed_out(&server.address, "flush"));
				}
			}
		}

		if cleared > 0 {
			Ok(())
		} else {
			Err(last_error.unwrap_or_else(|| {
				CacheError::Connection("Failed to clear cache on all servers".to_string())
			}))
		}
	}
}

impl StructureOps for MemcachedCache {
	fn engine(&self) -> &'static str {
		"memcached"
	}
}
