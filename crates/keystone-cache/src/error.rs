//! Error types shared by every cache engine.

use thiserror::Error;

/// Errors that can occur during cache operations.
///
/// A missing or expired key is never an error; operations report absence
/// through `Option`, `false` or a neutral value instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
	/// The stored value cannot be coerced to the requested type.
	#[error("Type error: {0}")]
	Type(String),

	/// A counter would drop below zero.
	#[error("Counter underflow: {0}")]
	Underflow(String),

	/// A counter would exceed its numeric range.
	#[error("Counter overflow: {0}")]
	Overflow(String),

	/// The remote endpoint could not be reached.
	#[error("Connection error: {0}")]
	Connection(String),

	/// The remote endpoint answered with an error.
	#[error("Backend error: {0}")]
	Backend(String),

	/// The cache could not be constructed from the supplied configuration.
	#[error("Configuration error: {0}")]
	Configuration(String),

	/// A value could not be encoded or decoded.
	#[error("Serialization error: {0}")]
	Serialization(String),

	/// A malformed argument was passed to an operation.
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	/// The engine does not implement the requested operation.
	#[error("Unsupported operation: {0}")]
	Unsupported(String),
}

impl CacheError {
	/// Returns `true` for errors raised because an endpoint was unreachable.
	pub fn is_connection(&self) -> bool {
		matches!(self, CacheError::Connection(_))
	}

	/// Builds a [`CacheError::Unsupported`] naming the engine and operation.
	pub fn unsupported(engine: &str, operation: &str) -> Self {
		CacheError::Unsupported(format!("{operation} is not supported by the {engine} engine"))
	}
}

impl From<serde_json::Error> for CacheError {
	fn from(err: serde_json::Error) -> Self {
		CacheError::Serialization(err.to_string())
	}
}

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
