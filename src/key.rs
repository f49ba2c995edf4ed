use base64::{Engine as _, engine::general_purpose::STANDARD};
use secrecy::ExposeSecret as _;

use super::{Error, RandomSource};

/// Length of a message key, in bytes.
pub const KEY_LEN: usize = 32;

/// The one-time key that opens a sealed message.
///
/// A fresh key is generated for every message, handed back to whoever sealed it, and then
/// forgotten.  Nothing in this crate ever persists one.
#[derive(Debug)]
pub struct Key(secrecy::SecretBox<[u8; KEY_LEN]>);

impl Key {
	/// Generate a new random key.
	#[tracing::instrument(level = "trace", skip(rng))]
	pub fn generate(rng: &dyn RandomSource) -> Self {
		let mut k = [0u8; KEY_LEN];

		rng.fill_bytes(&mut k);

		Box::new(k).into()
	}

	pub fn expose_secret(&self) -> &[u8; KEY_LEN] {
		self.0.expose_secret()
	}

	/// Standard base64 rendering of the key, for callers that need to move it around as text.
	pub fn to_base64(&self) -> String {
		STANDARD.encode(self.expose_secret())
	}

	/// Parse a key previously produced by [`Key::to_base64`].
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidKey`] if `s` isn't base64, or doesn't decode to exactly
	/// [`KEY_LEN`] bytes.
	pub fn from_base64(s: impl AsRef<[u8]>) -> Result<Self, Error> {
		let bytes = STANDARD
			.decode(s.as_ref())
			.map_err(|e| Error::invalid_key(e.to_string()))?;
		let k: [u8; KEY_LEN] = bytes
			.try_into()
			.map_err(|b: Vec<u8>| Error::invalid_key(format!("expected {KEY_LEN} bytes, got {}", b.len())))?;

		Ok(Box::new(k).into())
	}
}

impl AsRef<[u8]> for Key {
	fn as_ref(&self) -> &[u8] {
		self.expose_secret()
	}
}

impl Clone for Key {
	fn clone(&self) -> Self {
		Self(Box::new(*self.expose_secret()).into())
	}
}

impl From<Box<[u8; KEY_LEN]>> for Key {
	fn from(k: Box<[u8; KEY_LEN]>) -> Self {
		Key(k.into())
	}
}
