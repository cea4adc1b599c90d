//! Tagged values stored by the cache engines.
//!
//! Every engine accepts the same closed set of variants. Coercions used by the
//! counter and typed-read operations are defined here once so that the
//! in-process store and the remote engines agree on them:
//!
//! - `Int` and `UInt` are native counters.
//! - `Str` holding a base-10 integer is accepted by counters and becomes `Int`.
//! - `Float`, `Bytes` and `Json` are rejected by counters with a type error.
//! - Typed reads (`as_i64`) parse the textual form of any variant.

use crate::error::{CacheError, CacheResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A value held by a cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CacheValue {
	/// UTF-8 text.
	Str(String),
	/// Signed counter or number.
	Int(i64),
	/// Unsigned counter or number. Decrementing below zero fails.
	UInt(u64),
	/// Floating point number.
	Float(f64),
	/// Raw binary payload.
	Bytes(Vec<u8>),
	/// Structured document.
	Json(serde_json::Value),
}

impl CacheValue {
	/// Short name of the variant, used in error messages.
	pub fn kind(&self) -> &'static str {
		match self {
			CacheValue::Str(_) => "string",
			CacheValue::Int(_) => "int",
			CacheValue::UInt(_) => "uint",
			CacheValue::Float(_) => "float",
			CacheValue::Bytes(_) => "bytes",
			CacheValue::Json(_) => "json",
		}
	}

	/// Encode a serializable value as a `Json` variant.
	///
	/// # Examples
	///
	/// ```
	/// use keystone_cache::CacheValue;
	///
	/// let value = CacheValue::from_json(&vec![1, 2, 3]).unwrap();
	/// assert_eq!(value.to_string(), "[1,2,3]");
	/// ```
	pub fn from_json<T: Serialize + ?Sized>(value: &T) -> CacheResult<Self> {
		Ok(CacheValue::Json(serde_json::to_value(value)?))
	}

	/// Decode the value into a deserializable type.
	///
	/// Text and binary payloads are parsed as JSON documents, which is how the
	/// remote engines hand back values written with `set_json`.
	pub fn into_json<T: DeserializeOwned>(self) -> CacheResult<T> {
		let decoded = match self {
			CacheValue::Json(value) => serde_json::from_value(value)?,
			CacheValue::Str(text) => serde_json::from_str(&text)?,
			CacheValue::Bytes(bytes) => serde_json::from_slice(&bytes)?,
			CacheValue::Int(v) => serde_json::from_value(v.into())?,
			CacheValue::UInt(v) => serde_json::from_value(v.into())?,
			CacheValue::Float(v) => serde_json::from_value(v.into())?,
		};
		Ok(decoded)
	}

	/// Read the value as a signed 64-bit integer.
	///
	/// # Examples
	///
	/// ```
	/// use keystone_cache::CacheValue;
	///
	/// assert_eq!(CacheValue::from("42").as_i64().unwrap(), 42);
	/// assert!(CacheValue::from("forty-two").as_i64().is_err());
	/// ```
	pub fn as_i64(&self) -> CacheResult<i64> {
		match self {
			CacheValue::Int(v) => Ok(*v),
			CacheValue::UInt(v) => i64::try_from(*v)
				.map_err(|_| CacheError::Type(format!("{v} does not fit in a signed 64-bit integer"))),
			other => {
				let text = other.to_string();
				text.trim()
					.parse::<i64>()
					.map_err(|_| CacheError::Type(format!("{:?} is not an integer", text)))
			}
		}
	}

	/// Wire form used by the remote engines.
	pub fn to_bytes(&self) -> Vec<u8> {
		match self {
			CacheValue::Bytes(bytes) => bytes.clone(),
			other => other.to_string().into_bytes(),
		}
	}

	/// Rebuild a value from its wire form. Valid UTF-8 becomes `Str`.
	pub fn from_bytes(bytes: Vec<u8>) -> Self {
		match String::from_utf8(bytes) {
			Ok(text) => CacheValue::Str(text),
			Err(err) => CacheValue::Bytes(err.into_bytes()),
		}
	}

	/// Adjust a counter in place and return its new value.
	///
	/// The value is left untouched when the adjustment fails.
	pub(crate) fn add_delta(&mut self, key: &str, delta: i64) -> CacheResult<i64> {
		match self {
			CacheValue::Int(current) => {
				let next = current.checked_add(delta).ok_or_else(|| {
					CacheError::Overflow(format!("{key}: {current} {delta:+} is out of range"))
				})?;
				*current = next;
				Ok(next)
			}
			CacheValue::UInt(current) => {
				let next = if delta >= 0 {
					current.checked_add(delta.unsigned_abs()).ok_or_else(|| {
						CacheError::Overflow(format!("{key}: {current} {delta:+} is out of range"))
					})?
				} else {
					current.checked_sub(delta.unsigned_abs()).ok_or_else(|| {
						CacheError::Underflow(format!("{key}: item val is less than 0"))
					})?
				};
				let reported = i64::try_from(next).map_err(|_| {
					CacheError::Overflow(format!("{key}: {next} does not fit in a signed 64-bit integer"))
				})?;
				*current = next;
				Ok(reported)
			}
			CacheValue::Str(text) => {
				let parsed = text.trim().parse::<i64>().map_err(|_| {
					CacheError::Type(format!("{key}: item val {:?} is not an integer", text))
				})?;
				let next = parsed.checked_add(delta).ok_or_else(|| {
					CacheError::Overflow(format!("{key}: {parsed} {delta:+} is out of range"))
				})?;
				*self = CacheValue::Int(next);
				Ok(next)
			}
			other => Err(CacheError::Type(format!(
				"{key}: item val is a {}, not an integer",
				other.kind()
			))),
		}
	}
}

impl fmt::Display for CacheValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CacheValue::Str(text) => f.write_str(text),
			CacheValue::Int(v) => write!(f, "{v}"),
			CacheValue::UInt(v) => write!(f, "{v}"),
			CacheValue::Float(v) => write!(f, "{v}"),
			CacheValue::Bytes(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
			CacheValue::Json(value) => write!(f, "{value}"),
		}
	}
}

impl From<String> for CacheValue {
	fn from(value: String) -> Self {
		CacheValue::Str(value)
	}
}

impl From<&str> for CacheValue {
	fn from(value: &str) -> Self {
		CacheValue::Str(value.to_string())
	}
}

impl From<i64> for CacheValue {
	fn from(value: i64) -> Self {
		CacheValue::Int(value)
	}
}

impl From<i32> for CacheValue {
	fn from(value: i32) -> Self {
		CacheValue::Int(i64::from(value))
	}
}

impl From<u64> for CacheValue {
	fn from(value: u64) -> Self {
		CacheValue::UInt(value)
	}
}

impl From<u32> for CacheValue {
	fn from(value: u32) -> Self {
		CacheValue::UInt(u64::from(value))
	}
}

impl From<f64> for CacheValue {
	fn from(value: f64) -> Self {
		CacheValue::Float(value)
	}
}

impl From<Vec<u8>> for CacheValue {
	fn from(value: Vec<u8>) -> Self {
		CacheValue::Bytes(value)
	}
}

impl From<&[u8]> for CacheValue {
	fn from(value: &[u8]) -> Self {
		CacheValue::Bytes(value.to_vec())
	}
}

impl From<serde_json::Value> for CacheValue {
	fn from(value: serde_json::Value) -> Self {
		CacheValue::Json(value)
	}
}
