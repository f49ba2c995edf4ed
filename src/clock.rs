use std::{
	fmt::Debug,
	sync::{
		Arc,
		atomic::{AtomicU64, Ordering},
	},
	time::{SystemTime, UNIX_EPOCH},
};

use super::Timestamp;

/// Source of "now", for deciding what has expired.
pub trait Clock: Debug + Send + Sync {
	fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	#[tracing::instrument(level = "trace")]
	fn now(&self) -> Timestamp {
		// A clock set before 1970 is somebody else's problem; call it the epoch
		Timestamp::from_secs(
			SystemTime::now()
				.duration_since(UNIX_EPOCH)
				.map(|d| d.as_secs())
				.unwrap_or_default(),
		)
	}
}

/// A clock that only moves when you tell it to.
///
/// Clones share the same time, so you can hand one to an engine or sweep and keep another to
/// warp with.
#[derive(Clone, Debug, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
	pub fn new(start: Timestamp) -> Self {
		Self(Arc::new(AtomicU64::new(start.as_secs())))
	}

	/// Start at the current wall-clock time, then freeze.
	pub fn frozen() -> Self {
		Self::new(SystemClock.now())
	}

	pub fn set(&self, t: Timestamp) {
		self.0.store(t.as_secs(), Ordering::SeqCst);
	}

	#[tracing::instrument(level = "trace")]
	pub fn timewarp(&self, secs: i64) {
		let _ = self
			.0
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
				Some(t.saturating_add_signed(secs))
			});
	}
}

impl Clock for ManualClock {
	fn now(&self) -> Timestamp {
		Timestamp::from_secs(self.0.load(Ordering::SeqCst))
	}
}
