use serde::Deserialize;
use std::time::Duration;

use super::id::DEFAULT_ID_ATTEMPTS;

/// The shortest interval the expiry sweep will run at.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Tunables for a [`MessageEngine`](super::MessageEngine) and its sweep.
///
/// Deserializable (with every field optional) so it can be dropped straight into whatever
/// configuration file the embedding application already has.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Largest plaintext, in bytes, that will be sealed.  Zero means no limit.
	pub max_payload_size: usize,
	/// How often the expiry sweep runs.  Zero is treated as one second.
	pub sweep_interval_secs: u64,
	/// How many random IDs to try before giving up on allocation.  Zero means the default.
	pub id_attempts: usize,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			max_payload_size: 0,
			sweep_interval_secs: 3600,
			id_attempts: DEFAULT_ID_ATTEMPTS,
		}
	}
}

impl Config {
	pub fn with_max_payload_size(mut self, bytes: usize) -> Self {
		self.max_payload_size = bytes;
		self
	}

	/// Set the sweep interval, rounded up to whole seconds.
	pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
		let secs = interval.as_secs();
		self.sweep_interval_secs = if interval.subsec_nanos() > 0 {
			secs.saturating_add(1)
		} else {
			secs
		};
		self
	}

	pub fn with_id_attempts(mut self, attempts: usize) -> Self {
		self.id_attempts = attempts;
		self
	}

	pub fn sweep_interval(&self) -> Duration {
		Duration::from_secs(self.sweep_interval_secs).max(MIN_SWEEP_INTERVAL)
	}

	pub fn id_attempts(&self) -> usize {
		if self.id_attempts == 0 {
			DEFAULT_ID_ATTEMPTS
		} else {
			self.id_attempts
		}
	}

	/// The payload size limit, if there is one.
	pub fn payload_limit(&self) -> Option<usize> {
		(self.max_payload_size > 0).then_some(self.max_payload_size)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults() {
		let config = Config::default();

		assert_eq!(None, config.payload_limit());
		assert_eq!(Duration::from_secs(3600), config.sweep_interval());
		assert_eq!(10, config.id_attempts());
	}

	#[test]
	fn sub_second_intervals_round_up() {
		let config = Config::default().with_sweep_interval(Duration::from_millis(500));
		assert_eq!(Duration::from_secs(1), config.sweep_interval());

		let config = Config::default().with_sweep_interval(Duration::from_millis(1500));
		assert_eq!(Duration::from_secs(2), config.sweep_interval());

		let config = Config::default().with_sweep_interval(Duration::ZERO);
		assert_eq!(MIN_SWEEP_INTERVAL, config.sweep_interval());
	}

	#[test]
	fn zeroes_fall_back_to_something_usable() {
		let config: Config =
			serde_json::from_str(r#"{"sweep_interval_secs": 0, "id_attempts": 0}"#).unwrap();

		assert_eq!(MIN_SWEEP_INTERVAL, config.sweep_interval());
		assert_eq!(DEFAULT_ID_ATTEMPTS, config.id_attempts());
	}

	#[test]
	fn partial_deserialization() {
		let config: Config = serde_json::from_str(r#"{"max_payload_size": 1024}"#).unwrap();

		assert_eq!(Some(1024), config.payload_limit());
		assert_eq!(Config::default().sweep_interval(), config.sweep_interval());
	}

	#[test]
	fn builders() {
		let config = Config::default()
			.with_max_payload_size(10)
			.with_sweep_interval(Duration::from_secs(60))
			.with_id_attempts(3);

		assert_eq!(
			Config {
				max_payload_size: 10,
				sweep_interval_secs: 60,
				id_attempts: 3,
			},
			config
		);
	}
}
