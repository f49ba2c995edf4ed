use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{Error, RandomSource, Repository};

/// How many candidate IDs [`IdAllocator`] tries, unless told otherwise.
pub const DEFAULT_ID_ATTEMPTS: usize = 10;

/// Number of characters in a [`MessageId`].
pub const ID_LEN: usize = 15;

const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

// Largest multiple of the alphabet size that fits in a byte; anything at or above this gets
// rejected so every symbol is equally likely.
const ACCEPT_BELOW: u8 = (256 / ALPHABET.len() * ALPHABET.len()) as u8;

/// The public handle of a sealed message: 15 characters of `[A-Za-z0-9]`.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageId(String);

impl MessageId {
	/// Validate a string as a message ID.
	///
	/// # Errors
	///
	/// Returns the offending string back if it isn't exactly [`ID_LEN`] alphanumeric ASCII
	/// characters.
	pub fn parse(s: impl Into<String>) -> Result<Self, String> {
		let s = s.into();

		if s.len() == ID_LEN && s.bytes().all(|b| ALPHABET.contains(&b)) {
			Ok(Self(s))
		} else {
			Err(s)
		}
	}

	/// Generate a random ID.  No uniqueness is implied; that's [`IdAllocator`]'s job.
	pub fn random(rng: &dyn RandomSource) -> Self {
		let mut id = String::with_capacity(ID_LEN);
		let mut buf = [0u8; ID_LEN * 2];

		while id.len() < ID_LEN {
			rng.fill_bytes(&mut buf);

			for b in buf.iter().filter(|b| **b < ACCEPT_BELOW).take(ID_LEN - id.len()) {
				id.push(ALPHABET[*b as usize % ALPHABET.len()] as char);
			}
		}

		Self(id)
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl std::fmt::Display for MessageId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

impl TryFrom<String> for MessageId {
	type Error = String;

	fn try_from(s: String) -> Result<Self, String> {
		Self::parse(s).map_err(|s| format!("invalid message id {s:?}"))
	}
}

impl From<MessageId> for String {
	fn from(id: MessageId) -> Self {
		id.0
	}
}

/// Hands out message IDs that aren't already in use.
///
/// Randomness alone isn't trusted to avoid collisions: every candidate is looked up in the
/// repository first, and after a bounded number of collisions we give up rather than risk
/// handing out a duplicate.
#[derive(Clone, Debug)]
pub struct IdAllocator {
	rng: Arc<dyn RandomSource>,
	repository: Arc<dyn Repository>,
	attempts: usize,
}

impl IdAllocator {
	/// An allocator that tries up to `attempts` candidates; zero means [`DEFAULT_ID_ATTEMPTS`].
	pub fn new(rng: Arc<dyn RandomSource>, repository: Arc<dyn Repository>, attempts: usize) -> Self {
		Self {
			rng,
			repository,
			attempts: if attempts == 0 {
				DEFAULT_ID_ATTEMPTS
			} else {
				attempts
			},
		}
	}

	/// Allocate a fresh, currently-unused ID.
	///
	/// # Errors
	///
	/// * [`Error::IdAllocationExhausted`] if every candidate collided.
	/// * [`Error::Storage`] if the repository couldn't be asked.
	#[tracing::instrument(level = "debug", skip(self))]
	pub async fn next(&self) -> Result<MessageId, Error> {
		for attempt in 1..=self.attempts {
			let candidate = MessageId::random(self.rng.as_ref());

			if self.repository.get(&candidate).await?.is_none() {
				tracing::debug!(id=%candidate, attempt, "Allocated message id");
				return Ok(candidate);
			}

			tracing::debug!(id=%candidate, attempt, "Message id already taken");
		}

		tracing::error!(attempts = self.attempts, "Gave up allocating a message id");
		Err(Error::id_allocation_exhausted(self.attempts))
	}
}
