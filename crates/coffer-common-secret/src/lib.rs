// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Plaintext wrapper for secure values.
//!
//! Every plaintext secret that enters or leaves the store travels inside a
//! [`Secret<T>`]. The wrapper:
//!
//! - prints `[REDACTED]` for `Debug` and `Display`
//! - serializes as `"[REDACTED]"`, so a response object can never echo it
//! - deserializes normally, so callers can still submit values on write
//! - zeroizes its memory on drop
//! - only hands out the inner value through an explicit `.expose()`
//!
//! ```
//! use coffer_common_secret::SecretString;
//!
//! let value = SecretString::from("s3cr3t");
//! assert_eq!(format!("{value:?}"), "Secret(\"[REDACTED]\")");
//! assert_eq!(format!("{value}"), "[REDACTED]");
//! assert_eq!(value.expose(), "s3cr3t");
//! ```

use std::fmt;
use zeroize::Zeroize;

/// The redaction placeholder used in all output.
pub const REDACTED: &str = "[REDACTED]";

/// A wrapper for sensitive values that prevents accidental exposure.
///
/// There is no `Deref`; call sites must use [`Secret::expose`], which keeps
/// every plaintext access visible in review.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct Secret<T>
where
	T: Zeroize,
{
	inner: T,
}

/// Convenience alias for secret strings, the only shape the store handles.
pub type SecretString = Secret<String>;

impl<T> Secret<T>
where
	T: Zeroize,
{
	pub fn new(inner: T) -> Self {
		Self { inner }
	}

	/// Explicitly access the inner value.
	pub fn expose(&self) -> &T {
		&self.inner
	}

	/// Consume the wrapper and return a copy of the inner value.
	///
	/// The original memory is still zeroized when `self` drops.
	pub fn into_inner(self) -> T
	where
		T: Clone,
	{
		self.inner.clone()
	}
}

impl Secret<String> {
	/// An empty secret. On write paths this means "leave the value unchanged".
	pub fn empty() -> Self {
		Self::new(String::new())
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	pub fn len(&self) -> usize {
		self.inner.len()
	}

	/// Returns true when this (non-empty) secret occurs verbatim inside `haystack`.
	///
	/// Empty secrets never match; an empty needle is trivially a substring of
	/// everything and would flag every serialized field.
	pub fn occurs_in(&self, haystack: &str) -> bool {
		!self.inner.is_empty() && haystack.contains(self.inner.as_str())
	}
}

impl Default for Secret<String> {
	fn default() -> Self {
		Self::empty()
	}
}

impl From<String> for Secret<String> {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}

impl From<&str> for Secret<String> {
	fn from(value: &str) -> Self {
		Self::new(value.to_string())
	}
}

impl<T> Clone for Secret<T>
where
	T: Zeroize + Clone,
{
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<T> fmt::Debug for Secret<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Secret").field(&REDACTED).finish()
	}
}

impl<T> fmt::Display for Secret<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl<T> PartialEq for Secret<T>
where
	T: Zeroize + PartialEq,
{
	fn eq(&self, other: &Self) -> bool {
		self.inner == other.inner
	}
}

impl<T> Eq for Secret<T> where T: Zeroize + Eq {}

#[cfg(feature = "serde")]
mod serde_impl {
	use super::{Secret, REDACTED};
	use serde::{Deserialize, Deserializer, Serialize, Serializer};
	use zeroize::Zeroize;

	impl<T> Serialize for Secret<T>
	where
		T: Serialize + Zeroize,
	{
		fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
		where
			S: Serializer,
		{
			serializer.serialize_str(REDACTED)
		}
	}

	impl<'de, T> Deserialize<'de> for Secret<T>
	where
		T: Deserialize<'de> + Zeroize,
	{
		fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
		where
			D: Deserializer<'de>,
		{
			let inner = T::deserialize(deserializer)?;
			Ok(Secret::new(inner))
		}
	}
}
