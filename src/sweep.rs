use futures::TryStreamExt as _;
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

use super::{Clock, Config, Error, Repository, Timestamp, config::MIN_SWEEP_INTERVAL};

/// Deletes messages whose expiration has passed.
///
/// This knows nothing about keys or ciphertexts; it only asks the repository what has expired,
/// and deletes it.  Running two sweeps at once is harmless.
#[derive(Clone, Debug)]
pub struct ExpirySweep {
	repository: Arc<dyn Repository>,
	clock: Arc<dyn Clock>,
}

impl ExpirySweep {
	pub fn new(repository: Arc<dyn Repository>, clock: Arc<dyn Clock>) -> Self {
		Self { repository, clock }
	}

	/// Sweep everything that has expired as of the clock's "now".
	pub async fn sweep(&self) -> Result<usize, Error> {
		self.sweep_at(self.clock.now()).await
	}

	/// Delete every message that expired before `now`, returning how many were deleted.
	///
	/// # Errors
	///
	/// Stops at, and returns, the first storage failure; anything deleted before that stays
	/// deleted.
	#[tracing::instrument(level = "debug", skip(self))]
	pub async fn sweep_at(&self, now: Timestamp) -> Result<usize, Error> {
		let mut expired = self.repository.query_expired(now);
		let mut count = 0usize;

		while let Some(record) = expired.try_next().await? {
			tracing::debug!(id=%record.id, expiration=?record.expiration, "Deleting expired message");
			self.repository.delete(&record.id).await?;
			count += 1;
		}

		tracing::info!(count, %now, "Expiry sweep complete");

		Ok(count)
	}
}

/// Runs an [`ExpirySweep`] on a fixed interval, in the background, until told to stop.
#[derive(Debug)]
pub struct SweepTask;

impl SweepTask {
	/// Start sweeping, once immediately and then every `interval`.
	///
	/// Must be called from within a tokio runtime.  A failed sweep is logged, and the next one
	/// goes ahead as scheduled.  Intervals shorter than [`MIN_SWEEP_INTERVAL`] are raised to it.
	pub fn spawn(sweep: ExpirySweep, interval: Duration) -> SweepHandle {
		let interval = if interval < MIN_SWEEP_INTERVAL {
			tracing::warn!(requested=?interval, using=?MIN_SWEEP_INTERVAL, "Sweep interval too short");
			MIN_SWEEP_INTERVAL
		} else {
			interval
		};

		let (shutdown, mut stop) = watch::channel(false);

		let task = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

			loop {
				tokio::select! {
					_ = stop.changed() => {
						tracing::debug!("Sweep task shutting down");
						return;
					}
					_ = ticker.tick() => {
						if let Err(e) = sweep.sweep().await {
							tracing::error!(error=%e, "Expiry sweep failed");
						}
					}
				}
			}
		});

		SweepHandle { shutdown, task }
	}

	/// Start sweeping at the interval given in `config`.
	pub fn spawn_with_config(sweep: ExpirySweep, config: &Config) -> SweepHandle {
		Self::spawn(sweep, config.sweep_interval())
	}
}

/// Control over a running [`SweepTask`].
#[derive(Debug)]
pub struct SweepHandle {
	shutdown: watch::Sender<bool>,
	task: JoinHandle<()>,
}

impl SweepHandle {
	/// Stop sweeping, and wait for any in-progress sweep to finish.
	pub async fn shutdown(self) {
		let _ = self.shutdown.send(true);

		if let Err(e) = self.task.await {
			tracing::error!(error=%e, "Sweep task did not shut down cleanly");
		}
	}

	pub fn is_finished(&self) -> bool {
		self.task.is_finished()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		Config, Limits, ManualClock, MemoryRepository, MessageEngine, OsRandom, testing::init,
	};

	const HOUR: Duration = Duration::from_secs(3600);

	fn setup() -> (MessageEngine, MemoryRepository, ManualClock, ExpirySweep) {
		init();
		let repo = MemoryRepository::new();
		let clock = ManualClock::new(Timestamp::from_secs(1_700_000_000));
		let engine = MessageEngine::new(Arc::new(repo.clone()), Arc::new(OsRandom), Config::default());
		let sweep = ExpirySweep::new(Arc::new(repo.clone()), Arc::new(clock.clone()));

		(engine, repo, clock, sweep)
	}

	#[tokio::test]
	async fn sweeps_only_the_expired() {
		let (engine, repo, clock, sweep) = setup();
		let now = clock.now();

		let past = engine
			.seal(b"old news", Limits::new(100, 100), Some(now - HOUR))
			.await
			.unwrap();
		let future = engine
			.seal(b"not yet", Limits::UNLIMITED, Some(now + HOUR))
			.await
			.unwrap();
		let forever = engine.seal(b"forever", Limits::UNLIMITED, None).await.unwrap();

		assert_eq!(1, sweep.sweep().await.unwrap());

		assert!(!repo.contains(&past.id));
		assert!(repo.contains(&future.id));
		assert!(repo.contains(&forever.id));

		// The expired message is gone for good, even with the right key
		assert!(engine.open(past.id.as_str(), &past.key).await.unwrap().is_rejected());
	}

	#[tokio::test]
	async fn expiry_ignores_counters() {
		let (engine, repo, clock, sweep) = setup();

		let sealed = engine
			.seal(b"short-lived", Limits::UNLIMITED, Some(clock.now() + HOUR))
			.await
			.unwrap();

		assert_eq!(0, sweep.sweep().await.unwrap());

		clock.timewarp(2 * 3600);
		assert_eq!(1, sweep.sweep().await.unwrap());
		assert!(!repo.contains(&sealed.id));
	}

	#[tokio::test]
	async fn repeated_sweeps_are_harmless() {
		let (engine, _repo, clock, sweep) = setup();
		engine
			.seal(b"old", Limits::UNLIMITED, Some(clock.now() - HOUR))
			.await
			.unwrap();

		let (a, b) = tokio::join!(sweep.sweep(), sweep.sweep());
		assert_eq!(1, a.unwrap() + b.unwrap());

		assert_eq!(0, sweep.sweep().await.unwrap());
	}

	#[tokio::test]
	async fn sweep_at_uses_the_given_time() {
		let (engine, repo, clock, sweep) = setup();
		let sealed = engine
			.seal(b"x", Limits::UNLIMITED, Some(clock.now() + HOUR))
			.await
			.unwrap();

		assert_eq!(1, sweep.sweep_at(clock.now() + 2 * HOUR).await.unwrap());
		assert!(!repo.contains(&sealed.id));
	}

	#[tokio::test(start_paused = true)]
	async fn background_sweeping() {
		let (engine, repo, clock, sweep) = setup();
		let interval = Duration::from_secs(60);

		let sealed = engine
			.seal(b"tick tock", Limits::UNLIMITED, Some(clock.now() + HOUR))
			.await
			.unwrap();

		let handle = SweepTask::spawn(sweep, interval);

		tokio::time::sleep(interval * 3).await;
		assert!(repo.contains(&sealed.id));

		clock.timewarp(2 * 3600);
		tokio::time::sleep(interval + Duration::from_secs(1)).await;
		assert!(!repo.contains(&sealed.id));

		handle.shutdown().await;
	}

	#[tokio::test(start_paused = true)]
	async fn zero_interval_is_raised_not_fatal() {
		let (engine, repo, clock, sweep) = setup();

		let sealed = engine
			.seal(b"soon", Limits::UNLIMITED, Some(clock.now() + HOUR))
			.await
			.unwrap();

		let handle = SweepTask::spawn(sweep, Duration::ZERO);

		tokio::time::sleep(Duration::from_millis(10)).await;
		assert!(!handle.is_finished());
		assert!(repo.contains(&sealed.id));

		clock.timewarp(2 * 3600);
		tokio::time::sleep(MIN_SWEEP_INTERVAL * 2).await;
		assert!(!repo.contains(&sealed.id));
		assert!(!handle.is_finished());

		handle.shutdown().await;
	}

	#[tokio::test(start_paused = true)]
	async fn interval_comes_from_config() {
		let (engine, repo, clock, sweep) = setup();
		let config: Config = serde_json::from_str(r#"{"sweep_interval_secs": 0}"#).unwrap();

		let sealed = engine
			.seal(b"configured", Limits::UNLIMITED, Some(clock.now() + HOUR))
			.await
			.unwrap();

		let handle = SweepTask::spawn_with_config(sweep, &config);
		tokio::time::sleep(Duration::from_millis(10)).await;
		assert!(!handle.is_finished());

		clock.timewarp(2 * 3600);
		tokio::time::sleep(config.sweep_interval() * 2).await;
		assert!(!repo.contains(&sealed.id));

		handle.shutdown().await;
	}

	#[tokio::test(start_paused = true)]
	async fn shutdown_stops_the_task() {
		let (_engine, _repo, _clock, sweep) = setup();

		let handle = SweepTask::spawn(sweep, Duration::from_secs(60));
		assert!(!handle.is_finished());

		handle.shutdown().await;
	}
}
