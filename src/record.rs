use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::MessageId;

/// A point in time, in whole seconds since the Unix epoch.
#[derive(
	Clone, Copy, Debug, Default, PartialEq, PartialOrd, Eq, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
	pub const fn from_secs(secs: u64) -> Self {
		Self(secs)
	}

	pub const fn as_secs(&self) -> u64 {
		self.0
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_fmt(format_args!("{}", self.0))
	}
}

impl From<u64> for Timestamp {
	fn from(t: u64) -> Self {
		Self(t)
	}
}

impl std::ops::Add<Duration> for Timestamp {
	type Output = Timestamp;

	fn add(self, t: Duration) -> Self {
		Self(self.0.saturating_add(t.as_secs()))
	}
}

impl std::ops::Sub<Duration> for Timestamp {
	type Output = Timestamp;

	fn sub(self, t: Duration) -> Self {
		Self(self.0.saturating_sub(t.as_secs()))
	}
}

/// How much abuse a message will put up with before it destroys itself.
///
/// Zero means "no limit" for either field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
	pub max_attempts: u32,
	pub max_decrypts: u32,
}

impl Limits {
	pub const UNLIMITED: Limits = Limits {
		max_attempts: 0,
		max_decrypts: 0,
	};

	pub fn new(max_attempts: u32, max_decrypts: u32) -> Self {
		Self {
			max_attempts,
			max_decrypts,
		}
	}
}

/// The persisted form of a sealed message.
///
/// This is what a [`Repository`](super::Repository) stores.  It never contains the key, and is
/// never handed back to callers of the engine; the lifecycle counters stay in here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedMessage {
	pub id: MessageId,
	/// `IV ‖ AES-CBC(plaintext)`
	pub cipher_text: Vec<u8>,
	/// `IV ‖ AES-CBC(verification_plain)`, same key, independent IV
	pub verification_cipher: Vec<u8>,
	pub verification_plain: Vec<u8>,
	/// Failed key checks since the last successful read.
	pub attempts: u32,
	/// Successful reads, ever.
	pub decrypts: u32,
	pub limits: Limits,
	pub expiration: Option<Timestamp>,
}

impl SealedMessage {
	pub fn is_expired(&self, now: Timestamp) -> bool {
		self.expiration.is_some_and(|exp| exp < now)
	}
}
