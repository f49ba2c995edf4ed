use parking_lot::Mutex;
use rand::{RngCore as _, SeedableRng as _, rngs::StdRng};
use std::fmt::Debug;

/// Where every key, IV, verification block and message ID gets its entropy from.
///
/// An engine is handed one of these when it is built, and shares it (by `Arc`) between all its
/// components, rather than each of them reaching for a process-wide generator.
pub trait RandomSource: Debug + Send + Sync {
	/// Fill `dest` entirely with random bytes.
	fn fill_bytes(&self, dest: &mut [u8]);
}

/// The [`RandomSource`] you want in production: a CSPRNG seeded from the operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
	fn fill_bytes(&self, dest: &mut [u8]) {
		rand::rng().fill_bytes(dest);
	}
}

/// A deterministic [`RandomSource`], for tests that need to know what's coming next.
///
/// Two `SeededRandom`s created with the same seed produce identical byte streams.  Never, *ever*,
/// use one of these to protect real data.
#[derive(Debug)]
pub struct SeededRandom(Mutex<StdRng>);

impl SeededRandom {
	pub fn new(seed: u64) -> Self {
		Self(Mutex::new(StdRng::seed_from_u64(seed)))
	}
}

impl RandomSource for SeededRandom {
	fn fill_bytes(&self, dest: &mut [u8]) {
		self.0.lock().fill_bytes(dest);
	}
}
