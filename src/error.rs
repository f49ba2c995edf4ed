use super::StorageError;

#[derive(Debug, thiserror::Error, thiserror_ext::Construct)]
#[non_exhaustive]
pub enum Error {
	#[error("payload too large: allowed {allowed} bytes, got {actual}")]
	PayloadTooLarge { allowed: usize, actual: usize },

	#[error("no free message id after {attempts} attempts")]
	IdAllocationExhausted { attempts: usize },

	#[error("cryptographic failure: {0}")]
	Crypto(String),

	#[error("storage failure: {0}")]
	Storage(#[from] StorageError),

	#[error("failed to read payload: {0}")]
	Io(#[from] std::io::Error),

	#[error("invalid key: {0}")]
	InvalidKey(String),
}
