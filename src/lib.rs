//! Encrypted messages that destroy themselves.
//!
//! Give a [`MessageEngine`] some plaintext and it will encrypt it under a brand new key, store
//! the result, and hand you back an ID and the key.  The key is not kept anywhere; whoever you
//! give the ID and key to can [`open`](MessageEngine::open) the message, and nobody else can.
//!
//! Messages don't stick around.  Each one can be given:
//!
//! * a limit on the number of wrong keys it will tolerate (counted since the last successful
//!   read), after which it is deleted;
//! * a limit on the number of times it can be read, after which it is deleted; and
//! * an expiration time, after which an [`ExpirySweep`] will delete it.
//!
//! Whichever happens first wins.  Once a message is gone it is gone; there's no way to tell it
//! apart from a message that never existed, or from a message you have the wrong key for.
//!
//! # Storage
//!
//! Messages live in a [`Repository`].  [`MemoryRepository`] is provided for tests and for
//! applications happy to lose everything on restart; anything more durable is up to you.
//!
//! # Security properties (and the lack thereof)
//!
//! Messages are encrypted with AES-256 in CBC mode.  Before a message is decrypted, the candidate
//! key is checked against a separately-encrypted random verification block, so a wrong key is
//! reliably detected.  There is, however, no MAC over the message ciphertext: someone who can
//! write to your repository can corrupt ciphertexts without detection, and someone who can
//! watch many `open` calls against a corrupted message may learn things they shouldn't.  Keep
//! your repository out of hostile hands.
mod cipher;
mod clock;
mod config;
mod engine;
mod error;
mod id;
mod key;
mod lifecycle;
mod random;
mod record;
mod repository;
mod sweep;
mod verification;

pub use cipher::{CipherCodec, IV_LEN};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, MIN_SWEEP_INTERVAL};
pub use engine::{MessageEngine, OVERSIZE_DRAIN_LIMIT, Opened, Revealed, Sealed};
pub use error::Error;
pub use id::{DEFAULT_ID_ATTEMPTS, ID_LEN, IdAllocator, MessageId};
pub use key::{KEY_LEN, Key};
pub use lifecycle::{Lifecycle, LifecycleOutcome};
pub use random::{OsRandom, RandomSource, SeededRandom};
pub use record::{Limits, SealedMessage, Timestamp};
pub use repository::{MemoryRepository, Repository, StorageError};
pub use sweep::{ExpirySweep, SweepHandle, SweepTask};
pub use verification::{KeyVerifier, VERIFICATION_LEN, VerificationBlock};
