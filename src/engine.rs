use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt as _};

use super::{
	CipherCodec, Config, Error, IdAllocator, Key, KeyVerifier, Lifecycle, LifecycleOutcome,
	Limits, MessageId, RandomSource, Repository, SealedMessage, StorageError, Timestamp,
};

/// How far past the size limit [`MessageEngine::seal_reader`] will keep reading, to find out
/// how oversized a payload is.
pub const OVERSIZE_DRAIN_LIMIT: u64 = 8 * 1024 * 1024;

/// What the sealer gets back: where the message is, and the only copy of the key that opens it.
#[derive(Clone, Debug)]
pub struct Sealed {
	pub id: MessageId,
	pub key: Key,
	pub expiration: Option<Timestamp>,
}

/// The result of trying to open a message.
///
/// A caller can't tell *why* an open was rejected; a message that doesn't exist, and a message
/// that exists but was asked for with the wrong key, look exactly the same from out here.
#[derive(Debug)]
#[must_use]
pub enum Opened {
	Revealed(Revealed),
	Rejected,
}

impl Opened {
	pub fn is_rejected(&self) -> bool {
		matches!(self, Opened::Rejected)
	}

	/// The plaintext, if the open succeeded.
	pub fn into_plaintext(self) -> Option<Vec<u8>> {
		match self {
			Opened::Revealed(r) => Some(r.plaintext),
			Opened::Rejected => None,
		}
	}
}

/// A successfully opened message.
pub struct Revealed {
	pub plaintext: Vec<u8>,
	/// Set if the read could not be recorded against the message.  The plaintext is still good,
	/// but the message may now allow one more read (or wrong key) than it should.
	pub bookkeeping_error: Option<StorageError>,
}

impl std::fmt::Debug for Revealed {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Revealed")
			.field("plaintext", &format_args!("[{} bytes REDACTED]", self.plaintext.len()))
			.field("bookkeeping_error", &self.bookkeeping_error)
			.finish()
	}
}

// Why an open got rejected.  Only ever logged.
#[derive(Clone, Copy, Debug)]
enum Rejection {
	NotFound,
	WrongKey,
	Undecryptable,
}

impl std::fmt::Display for Rejection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			Rejection::NotFound => "not found",
			Rejection::WrongKey => "wrong key",
			Rejection::Undecryptable => "undecryptable",
		})
	}
}

/// Seals and opens self-destructing messages.
///
/// Each message is encrypted under its own freshly generated key, which is handed back from
/// [`seal`](MessageEngine::seal) and then forgotten.  To read the message, present that key to
/// [`open`](MessageEngine::open).  Messages destroy themselves after too many wrong keys, too
/// many successful reads, or (with the help of an [`ExpirySweep`](super::ExpirySweep)) once
/// they expire.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use burn_box::{Config, Limits, MemoryRepository, MessageEngine, OsRandom};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), burn_box::Error> {
///
/// let engine = MessageEngine::new(
///     Arc::new(MemoryRepository::new()),
///     Arc::new(OsRandom),
///     Config::default(),
/// );
///
/// // Burn after reading
/// let sealed = engine.seal(b"Hello, World!", Limits::new(3, 1), None).await?;
///
/// // Some other key isn't going to get you anywhere
/// let wrong = burn_box::Key::generate(&OsRandom);
/// assert!(engine.open(sealed.id.as_str(), &wrong).await?.is_rejected());
///
/// // The right key reveals the message...
/// let opened = engine.open(sealed.id.as_str(), &sealed.key).await?;
/// assert_eq!(Some(b"Hello, World!".to_vec()), opened.into_plaintext());
///
/// // ... exactly once
/// assert!(engine.open(sealed.id.as_str(), &sealed.key).await?.is_rejected());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct MessageEngine {
	repository: Arc<dyn Repository>,
	rng: Arc<dyn RandomSource>,
	codec: CipherCodec,
	verifier: KeyVerifier,
	allocator: IdAllocator,
	lifecycle: Lifecycle,
	config: Config,
}

impl MessageEngine {
	pub fn new(repository: Arc<dyn Repository>, rng: Arc<dyn RandomSource>, config: Config) -> Self {
		let codec = CipherCodec::new(rng.clone());

		Self {
			verifier: KeyVerifier::new(codec.clone(), rng.clone()),
			allocator: IdAllocator::new(rng.clone(), repository.clone(), config.id_attempts()),
			lifecycle: Lifecycle::new(repository.clone()),
			codec,
			repository,
			rng,
			config,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Encrypt and store a message.
	///
	/// # Errors
	///
	/// * [`Error::PayloadTooLarge`] if `plaintext` is over the configured size limit.
	/// * [`Error::IdAllocationExhausted`] if no unused ID could be found.
	/// * [`Error::Storage`] if the repository failed; no record is left behind.
	#[tracing::instrument(level = "debug", skip(self, plaintext), fields(len = plaintext.as_ref().len()))]
	pub async fn seal(
		&self,
		plaintext: impl AsRef<[u8]>,
		limits: Limits,
		expiration: Option<Timestamp>,
	) -> Result<Sealed, Error> {
		let plaintext = plaintext.as_ref();

		if let Some(allowed) = self.config.payload_limit() {
			if plaintext.len() > allowed {
				tracing::debug!(allowed, actual = plaintext.len(), "Payload too large");
				return Err(Error::payload_too_large(allowed, plaintext.len()));
			}
		}

		let id = self.allocator.next().await?;

		let key = Key::generate(self.rng.as_ref());
		let cipher_text = self.codec.encrypt(&key, plaintext)?;
		let verification = self.verifier.seal(&key)?;

		self.repository
			.put(SealedMessage {
				id: id.clone(),
				cipher_text,
				verification_cipher: verification.cipher,
				verification_plain: verification.plain,
				attempts: 0,
				decrypts: 0,
				limits,
				expiration,
			})
			.await?;

		tracing::debug!(%id, ?expiration, "Message sealed");

		Ok(Sealed {
			id,
			key,
			expiration,
		})
	}

	/// Seal whatever `reader` produces.
	///
	/// The size limit is enforced as the data arrives.  An oversized payload is read on (and
	/// thrown away) so the error can report how big it was, but only for up to
	/// [`OVERSIZE_DRAIN_LIMIT`] more bytes; past that, `actual` is a lower bound and the rest of
	/// the stream is left unread.
	///
	/// # Errors
	///
	/// As for [`seal`](MessageEngine::seal), plus [`Error::Io`] if reading fails.
	#[tracing::instrument(level = "debug", skip(self, reader))]
	pub async fn seal_reader<R>(
		&self,
		mut reader: R,
		limits: Limits,
		expiration: Option<Timestamp>,
	) -> Result<Sealed, Error>
	where
		R: AsyncRead + Unpin + Send,
	{
		let mut plaintext = Vec::new();

		match self.config.payload_limit() {
			Some(allowed) => {
				(&mut reader)
					.take((allowed as u64).saturating_add(1))
					.read_to_end(&mut plaintext)
					.await?;

				if plaintext.len() > allowed {
					let rest = tokio::io::copy(
						&mut (&mut reader).take(OVERSIZE_DRAIN_LIMIT),
						&mut tokio::io::sink(),
					)
					.await?;
					let actual = plaintext.len() + rest as usize;
					tracing::debug!(allowed, actual, "Streamed payload too large");
					return Err(Error::payload_too_large(allowed, actual));
				}
			}
			None => {
				reader.read_to_end(&mut plaintext).await?;
			}
		}

		self.seal(plaintext, limits, expiration).await
	}

	/// Try to open a message with a candidate key.
	///
	/// Wrong keys count against the message's attempt limit; a successful open resets that count
	/// and counts against the decrypt limit.  Either may destroy the message.
	///
	/// # Errors
	///
	/// Only storage failures are errors.  A missing message, a malformed ID, a wrong or malformed
	/// key, and a ciphertext that won't decrypt all produce [`Opened::Rejected`].
	#[tracing::instrument(level = "debug", skip(self, key))]
	pub async fn open(&self, id: &str, key: impl AsRef<[u8]>) -> Result<Opened, Error> {
		let key = key.as_ref();

		let Ok(id) = MessageId::parse(id) else {
			return Ok(self.reject(Rejection::NotFound));
		};

		let record = match self.repository.get(&id).await {
			Ok(Some(record)) => record,
			Ok(None) | Err(StorageError::NotFound { .. }) => {
				return Ok(self.reject(Rejection::NotFound));
			}
			Err(e) => return Err(e.into()),
		};

		if !self.verifier.check(key, &record) {
			self.account_failure(record).await?;
			return Ok(self.reject(Rejection::WrongKey));
		}

		let plaintext = match self.codec.decrypt(key, &record.cipher_text) {
			Ok(plaintext) => plaintext,
			Err(e) => {
				tracing::error!(%id, error=%e, "Verified key failed to decrypt message");
				self.account_failure(record).await?;
				return Ok(self.reject(Rejection::Undecryptable));
			}
		};

		let bookkeeping_error = match self.lifecycle.on_successful_read(record).await {
			Ok(outcome) => {
				tracing::debug!(%id, ?outcome, "Message opened");
				None
			}
			Err(e) => {
				tracing::error!(%id, error=%e, "Failed to record successful read");
				Some(e)
			}
		};

		Ok(Opened::Revealed(Revealed {
			plaintext,
			bookkeeping_error,
		}))
	}

	// A record that disappears between the fetch and the counter write (swept, or destroyed by a
	// racing open) is just as absent as one that was never there.
	async fn account_failure(&self, record: SealedMessage) -> Result<Option<LifecycleOutcome>, Error> {
		match self.lifecycle.on_failed_attempt(record).await {
			Ok(outcome) => {
				tracing::debug!(?outcome, "Failed attempt recorded");
				Ok(Some(outcome))
			}
			Err(StorageError::NotFound { id }) => {
				tracing::debug!(%id, "Message vanished before the failed attempt was recorded");
				Ok(None)
			}
			Err(e) => Err(e.into()),
		}
	}

	fn reject(&self, why: Rejection) -> Opened {
		tracing::debug!(reason=%why, "Open rejected");
		Opened::Rejected
	}
}
