//! Where sealed messages live between being sealed and being destroyed.
//!
//! The engine only ever talks to storage through the [`Repository`] trait.  Each method is a
//! single, individually-atomic operation on one record (or, for [`Repository::query_expired`], a
//! read-only scan); the engine never relies on two calls happening together.
//!
//! # Counter races
//!
//! [`Repository::update_counters`] is a blind write.  Two `open` calls racing on the same
//! message can both read the same counters and both write back "one more than that", losing an
//! update.  Backends wanting strict attempt limits under concurrency need a conditional write,
//! which this contract does not (yet) offer.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt as _};
use parking_lot::RwLock;
use std::{collections::HashMap, fmt::Debug, sync::Arc};
use thiserror::Error;

use super::{MessageId, SealedMessage, Timestamp};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StorageError {
	#[error("message not found: {id}")]
	NotFound { id: MessageId },

	#[error("message already exists: {id}")]
	AlreadyExists { id: MessageId },

	/// Anything the backend itself went wrong with (timeouts, I/O, bad data, ...)
	#[error("storage backend error: {0}")]
	Backend(String),
}

/// Storage for [`SealedMessage`]s, keyed by [`MessageId`].
///
/// Implementations are expected to bring their own timeout and retry policies; the engine calls
/// each method once and treats any error as final.
#[async_trait]
pub trait Repository: Debug + Send + Sync {
	/// Store a brand new record.
	///
	/// # Errors
	///
	/// Returns [`StorageError::AlreadyExists`] if a record with the same ID is already present.
	async fn put(&self, record: SealedMessage) -> Result<(), StorageError>;

	/// Fetch a record, or `None` if there's no such message.
	async fn get(&self, id: &MessageId) -> Result<Option<SealedMessage>, StorageError>;

	/// Overwrite the lifecycle counters of an existing record.
	///
	/// # Errors
	///
	/// Returns [`StorageError::NotFound`] if the record has gone away.
	async fn update_counters(
		&self,
		id: &MessageId,
		attempts: u32,
		decrypts: u32,
	) -> Result<(), StorageError>;

	/// Remove a record.  Removing a record that doesn't exist is not an error.
	async fn delete(&self, id: &MessageId) -> Result<(), StorageError>;

	/// Every record with an expiration strictly before `before`.
	///
	/// The stream is finite and can only be consumed once.
	fn query_expired(&self, before: Timestamp) -> BoxStream<'_, Result<SealedMessage, StorageError>>;
}

/// A [`Repository`] that keeps everything in memory.
///
/// Clones share the same underlying records.  Handy for tests, and for anywhere it's acceptable
/// for every message to vanish on restart.
#[derive(Clone, Debug, Default)]
pub struct MemoryRepository {
	records: Arc<RwLock<HashMap<MessageId, SealedMessage>>>,
}

impl MemoryRepository {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.records.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.read().is_empty()
	}

	pub fn contains(&self, id: &MessageId) -> bool {
		self.records.read().contains_key(id)
	}
}

#[async_trait]
impl Repository for MemoryRepository {
	#[tracing::instrument(level = "trace", skip(self, record), fields(id = %record.id))]
	async fn put(&self, record: SealedMessage) -> Result<(), StorageError> {
		let mut records = self.records.write();

		if records.contains_key(&record.id) {
			return Err(StorageError::AlreadyExists { id: record.id });
		}

		records.insert(record.id.clone(), record);
		Ok(())
	}

	#[tracing::instrument(level = "trace", skip(self))]
	async fn get(&self, id: &MessageId) -> Result<Option<SealedMessage>, StorageError> {
		Ok(self.records.read().get(id).cloned())
	}

	#[tracing::instrument(level = "trace", skip(self))]
	async fn update_counters(
		&self,
		id: &MessageId,
		attempts: u32,
		decrypts: u32,
	) -> Result<(), StorageError> {
		let mut records = self.records.write();

		let record = records
			.get_mut(id)
			.ok_or_else(|| StorageError::NotFound { id: id.clone() })?;
		record.attempts = attempts;
		record.decrypts = decrypts;

		Ok(())
	}

	#[tracing::instrument(level = "trace", skip(self))]
	async fn delete(&self, id: &MessageId) -> Result<(), StorageError> {
		self.records.write().remove(id);
		Ok(())
	}

	fn query_expired(&self, before: Timestamp) -> BoxStream<'_, Result<SealedMessage, StorageError>> {
		// Only the IDs are snapshotted up front; each record is re-read as the stream is polled,
		// so anything deleted in the meantime is skipped rather than handed out stale.
		let ids: Vec<MessageId> = self
			.records
			.read()
			.values()
			.filter(|r| r.expiration.is_some_and(|exp| exp < before))
			.map(|r| r.id.clone())
			.collect();

		stream::iter(ids)
			.filter_map(move |id| {
				let record = self.records.read().get(&id).cloned();
				async move { record.map(Ok) }
			})
			.boxed()
	}
}
