use std::sync::Arc;

use super::{Repository, SealedMessage, StorageError};

/// What became of a record after [`Lifecycle`] accounted for an `open`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleOutcome {
	/// The record lives on, with these counters.
	Retained { attempts: u32, decrypts: u32 },
	/// Too many wrong keys; the record has been deleted.
	DestroyedByAttempts,
	/// Read as many times as it was allowed to be; the record has been deleted.
	DestroyedByReads,
}

/// Owns the attempt and decrypt counters, and decides when a record self-destructs.
///
/// Every call ends in exactly one repository write: either the updated counters, or a delete.
#[derive(Clone, Debug)]
pub struct Lifecycle {
	repository: Arc<dyn Repository>,
}

impl Lifecycle {
	pub fn new(repository: Arc<dyn Repository>) -> Self {
		Self { repository }
	}

	/// Count a wrong key against `record`.
	#[tracing::instrument(level = "debug", skip_all, fields(id = %record.id))]
	pub async fn on_failed_attempt(
		&self,
		mut record: SealedMessage,
	) -> Result<LifecycleOutcome, StorageError> {
		record.attempts = record.attempts.saturating_add(1);
		let max = record.limits.max_attempts;

		if max > 0 && record.attempts >= max {
			tracing::warn!(
				id=%record.id,
				max_attempts = max,
				"Attempt limit reached, destroying message"
			);
			self.repository.delete(&record.id).await?;
			Ok(LifecycleOutcome::DestroyedByAttempts)
		} else {
			self.persist(&record).await
		}
	}

	/// Count a successful read of `record`, which also forgives any previous wrong keys.
	#[tracing::instrument(level = "debug", skip_all, fields(id = %record.id))]
	pub async fn on_successful_read(
		&self,
		mut record: SealedMessage,
	) -> Result<LifecycleOutcome, StorageError> {
		record.attempts = 0;
		record.decrypts = record.decrypts.saturating_add(1);
		let max = record.limits.max_decrypts;

		if max > 0 && record.decrypts >= max {
			tracing::info!(
				id=%record.id,
				max_decrypts = max,
				"Decrypt limit reached, destroying message"
			);
			self.repository.delete(&record.id).await?;
			Ok(LifecycleOutcome::DestroyedByReads)
		} else {
			self.persist(&record).await
		}
	}

	async fn persist(&self, record: &SealedMessage) -> Result<LifecycleOutcome, StorageError> {
		self.repository
			.update_counters(&record.id, record.attempts, record.decrypts)
			.await?;

		tracing::debug!(
			id=%record.id,
			attempts = record.attempts,
			decrypts = record.decrypts,
			"Counters updated"
		);

		Ok(LifecycleOutcome::Retained {
			attempts: record.attempts,
			decrypts: record.decrypts,
		})
	}
}
