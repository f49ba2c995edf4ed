use cbc::cipher::{BlockDecryptMut as _, BlockEncryptMut as _, KeyIvInit as _, block_padding::Pkcs7};
use std::sync::Arc;

use super::{Error, Key, RandomSource};

type Encryptor = cbc::Encryptor<aes::Aes256>;
type Decryptor = cbc::Decryptor<aes::Aes256>;

/// Length of the IV prefixed to every blob, regardless of key size.
pub const IV_LEN: usize = 16;

const BLOCK_LEN: usize = 16;

/// AES-256-CBC with PKCS#7 padding, producing blobs of the form `IV ‖ ciphertext`.
///
/// Every call to [`encrypt`](CipherCodec::encrypt) draws a fresh IV.  There is no authentication
/// tag; a blob that has been fiddled with will decrypt to garbage (or fail on padding) rather than
/// being rejected outright.
#[derive(Clone, Debug)]
pub struct CipherCodec {
	rng: Arc<dyn RandomSource>,
}

impl CipherCodec {
	pub fn new(rng: Arc<dyn RandomSource>) -> Self {
		Self { rng }
	}

	/// Encrypt `plaintext` under `key`.
	///
	/// # Errors
	///
	/// Returns [`Error::Crypto`] in the (extremely unlikely) event the cipher refuses the key.
	#[tracing::instrument(level = "trace", skip_all, fields(len = plaintext.as_ref().len()))]
	pub fn encrypt(&self, key: &Key, plaintext: impl AsRef<[u8]>) -> Result<Vec<u8>, Error> {
		let mut iv = [0u8; IV_LEN];
		self.rng.fill_bytes(&mut iv);

		let ciphertext = Encryptor::new_from_slices(key.expose_secret(), &iv)
			.map_err(|e| Error::crypto(format!("cipher setup: {e}")))?
			.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_ref());

		let mut blob = Vec::with_capacity(IV_LEN + ciphertext.len());
		blob.extend_from_slice(&iv);
		blob.extend_from_slice(&ciphertext);

		Ok(blob)
	}

	/// Decrypt an `IV ‖ ciphertext` blob with a candidate key.
	///
	/// # Errors
	///
	/// Returns [`Error::Crypto`] if the key isn't 256 bits, the blob is truncated or not a whole
	/// number of blocks, or the padding is malformed (which is what a wrong key usually looks
	/// like).
	#[tracing::instrument(level = "trace", skip_all, fields(len = blob.as_ref().len()))]
	pub fn decrypt(&self, key: impl AsRef<[u8]>, blob: impl AsRef<[u8]>) -> Result<Vec<u8>, Error> {
		let blob = blob.as_ref();

		if blob.len() < IV_LEN + BLOCK_LEN {
			return Err(Error::crypto("ciphertext too short"));
		}

		let (iv, ciphertext) = blob.split_at(IV_LEN);

		if ciphertext.len() % BLOCK_LEN != 0 {
			return Err(Error::crypto("ciphertext is not a whole number of blocks"));
		}

		Decryptor::new_from_slices(key.as_ref(), iv)
			.map_err(|_| Error::crypto(format!("unsupported key length {}", key.as_ref().len())))?
			.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
			.map_err(|_| Error::crypto("bad padding"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{OsRandom, SeededRandom};

	fn codec() -> CipherCodec {
		CipherCodec::new(Arc::new(OsRandom))
	}

	#[test]
	fn simple_round_trip() {
		let codec = codec();
		let key = Key::generate(&OsRandom);

		let blob = codec.encrypt(&key, b"hello, world!").unwrap();

		assert_eq!(b"hello, world!".to_vec(), codec.decrypt(&key, &blob).unwrap());
	}

	#[test]
	fn blob_layout() {
		let codec = codec();
		let key = Key::generate(&OsRandom);

		// 13 bytes of plaintext pads out to a single block
		let blob = codec.encrypt(&key, b"hello, world!").unwrap();
		assert_eq!(IV_LEN + 16, blob.len());

		// A full block of plaintext gets a whole block of padding
		let blob = codec.encrypt(&key, [0u8; 16]).unwrap();
		assert_eq!(IV_LEN + 32, blob.len());

		let blob = codec.encrypt(&key, b"").unwrap();
		assert_eq!(IV_LEN + 16, blob.len());
		assert!(codec.decrypt(&key, &blob).unwrap().is_empty());
	}

	#[test]
	fn fresh_iv_every_time() {
		let codec = codec();
		let key = Key::generate(&OsRandom);

		let a = codec.encrypt(&key, b"same").unwrap();
		let b = codec.encrypt(&key, b"same").unwrap();

		assert_ne!(a[..IV_LEN], b[..IV_LEN]);
		assert_ne!(a, b);
	}

	#[test]
	fn iv_comes_from_the_random_source() {
		let codec = CipherCodec::new(Arc::new(SeededRandom::new(7)));
		let key = Key::from(Box::new([1u8; 32]));

		let blob = codec.encrypt(&key, b"x").unwrap();

		let mut expected_iv = [0u8; IV_LEN];
		SeededRandom::new(7).fill_bytes(&mut expected_iv);
		assert_eq!(expected_iv[..], blob[..IV_LEN]);
	}

	#[test]
	fn wrong_key_length() {
		let codec = codec();
		let key = Key::generate(&OsRandom);
		let blob = codec.encrypt(&key, b"hello").unwrap();

		let result = codec.decrypt(b"wrong", &blob);
		assert!(matches!(result, Err(Error::Crypto(_))));

		let result = codec.decrypt([0u8; 16], &blob);
		assert!(matches!(result, Err(Error::Crypto(_))));
	}

	#[test]
	fn truncated_blob() {
		let codec = codec();
		let key = Key::generate(&OsRandom);
		let blob = codec.encrypt(&key, b"hello").unwrap();

		let result = codec.decrypt(&key, &blob[..IV_LEN]);
		assert!(matches!(result, Err(Error::Crypto(_))));

		let result = codec.decrypt(&key, &blob[..blob.len() - 1]);
		assert!(matches!(result, Err(Error::Crypto(_))));

		let result = codec.decrypt(&key, b"");
		assert!(matches!(result, Err(Error::Crypto(_))));
	}

	#[test]
	fn wrong_key_does_not_reveal_plaintext() {
		let codec = codec();
		let key = Key::generate(&OsRandom);
		let other = Key::generate(&OsRandom);
		let blob = codec.encrypt(&key, b"top secret stuff").unwrap();

		// Most of the time this is a padding failure, but every so often a wrong key produces
		// valid-looking padding, and then it's just garbage.
		match codec.decrypt(&other, &blob) {
			Ok(pt) => assert_ne!(b"top secret stuff".to_vec(), pt),
			Err(e) => assert!(matches!(e, Error::Crypto(_))),
		}
	}
}
