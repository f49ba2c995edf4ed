use std::sync::Arc;

use super::{CipherCodec, Error, Key, RandomSource, SealedMessage};

/// Length of the random verification plaintext.
pub const VERIFICATION_LEN: usize = 16;

/// The pair stored alongside a message so a candidate key can be checked before the message
/// body is trusted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationBlock {
	pub plain: Vec<u8>,
	pub cipher: Vec<u8>,
}

/// Checks whether a key is "the" key for a message, without storing the key or anything derived
/// from it.
///
/// At seal time, some random bytes are encrypted under the message key and both the plain and
/// encrypted forms are kept.  A candidate key is accepted if it decrypts the one back into the
/// other.  This says nothing about whether the message ciphertext itself is intact.
#[derive(Clone, Debug)]
pub struct KeyVerifier {
	codec: CipherCodec,
	rng: Arc<dyn RandomSource>,
}

impl KeyVerifier {
	pub fn new(codec: CipherCodec, rng: Arc<dyn RandomSource>) -> Self {
		Self { codec, rng }
	}

	/// Create the verification block for a freshly generated message key.
	///
	/// # Errors
	///
	/// Only if encryption itself fails, which it shouldn't.
	#[tracing::instrument(level = "trace", skip_all)]
	pub fn seal(&self, key: &Key) -> Result<VerificationBlock, Error> {
		let mut plain = vec![0u8; VERIFICATION_LEN];
		self.rng.fill_bytes(&mut plain);

		let cipher = self.codec.encrypt(key, &plain)?;

		Ok(VerificationBlock { plain, cipher })
	}

	/// Does `key` open `record`?
	///
	/// A key that can't even decrypt the verification block (wrong length, bad padding) is just as
	/// wrong as one that decrypts it to the wrong bytes; both give `false`.
	#[tracing::instrument(level = "trace", skip_all, fields(id = %record.id))]
	pub fn check(&self, key: impl AsRef<[u8]>, record: &SealedMessage) -> bool {
		match self.codec.decrypt(key, &record.verification_cipher) {
			Ok(plain) => constant_time_eq::constant_time_eq(&plain, &record.verification_plain),
			Err(e) => {
				tracing::trace!(error=%e, "Verification block did not decrypt");
				false
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{Limits, MessageId, OsRandom};

	fn verifier() -> KeyVerifier {
		let rng: Arc<dyn RandomSource> = Arc::new(OsRandom);
		KeyVerifier::new(CipherCodec::new(rng.clone()), rng)
	}

	fn record_for(block: VerificationBlock) -> SealedMessage {
		SealedMessage {
			id: MessageId::parse("AAAAAAAAAAAAAAA").unwrap(),
			cipher_text: vec![],
			verification_cipher: block.cipher,
			verification_plain: block.plain,
			attempts: 0,
			decrypts: 0,
			limits: Limits::UNLIMITED,
			expiration: None,
		}
	}

	#[test]
	fn right_key_accepted() {
		let v = verifier();
		let key = Key::generate(&OsRandom);

		let record = record_for(v.seal(&key).unwrap());

		assert!(v.check(&key, &record));
	}

	#[test]
	fn block_shape() {
		let v = verifier();
		let key = Key::generate(&OsRandom);

		let block = v.seal(&key).unwrap();

		assert_eq!(VERIFICATION_LEN, block.plain.len());
		// 16 bytes of IV, then 16 bytes of plaintext padded out to two blocks
		assert_eq!(48, block.cipher.len());
	}

	#[test]
	fn wrong_key_rejected() {
		let v = verifier();
		let key = Key::generate(&OsRandom);
		let record = record_for(v.seal(&key).unwrap());

		for _ in 0..32 {
			assert!(!v.check(Key::generate(&OsRandom), &record));
		}
	}

	#[test]
	fn malformed_keys_rejected() {
		let v = verifier();
		let key = Key::generate(&OsRandom);
		let record = record_for(v.seal(&key).unwrap());

		assert!(!v.check(b"wrong", &record));
		assert!(!v.check(b"", &record));
		assert!(!v.check([0u8; 64], &record));
	}

	#[test]
	fn tampered_plain_rejected() {
		let v = verifier();
		let key = Key::generate(&OsRandom);
		let mut record = record_for(v.seal(&key).unwrap());

		record.verification_plain[0] ^= 0x01;

		assert!(!v.check(&key, &record));
	}

	#[test]
	fn each_seal_is_independent() {
		let v = verifier();
		let key = Key::generate(&OsRandom);

		let a = v.seal(&key).unwrap();
		let b = v.seal(&key).unwrap();

		assert_ne!(a.plain, b.plain);
		assert_ne!(a.cipher, b.cipher);
	}
}
