//! Cache contracts and built-in cache tiers for per-user token records.

pub mod file;
pub mod hybrid;
pub mod memory;

pub use file::FileCache;
pub use hybrid::HybridCache;
pub use memory::MemoryCache;

// self
use crate::{_prelude::*, auth::TokenRecord};

/// Boxed future returned by every [`TokenCache`] operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Shared, possibly multi-process cache of token records.
///
/// Writes are last-writer-wins; no version check guards concurrent writers.
pub trait TokenCache
where
	Self: Send + Sync,
{
	/// Fetches the record stored under `key`, ignoring expired entries.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<TokenRecord>>;

	/// Persists or replaces the record stored under `key`.
	fn set(&self, key: String, record: TokenRecord, options: EntryOptions) -> StoreFuture<'_, ()>;

	/// Removes the record stored under `key`; absent keys are a no-op.
	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}

/// Residency limits attached to a cache write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryOptions {
	/// How long the entry may live in the backing store.
	pub expiration: Duration,
	/// How long the entry may live in an in-process hot tier, if any.
	pub local_expiration: Option<Duration>,
}
impl EntryOptions {
	/// Creates options with only a backing-store expiration.
	pub fn expiring_in(expiration: Duration) -> Self {
		Self { expiration, local_expiration: None }
	}

	/// Adds a hot-tier expiration.
	pub fn with_local_expiration(mut self, local: Duration) -> Self {
		self.local_expiration = Some(local);

		self
	}

	/// Effective hot-tier lifetime: the shorter of both limits.
	pub fn effective_local_expiration(&self) -> Duration {
		match self.local_expiration {
			Some(local) if local < self.expiration => local,
			_ => self.expiration,
		}
	}
}

/// Error type produced by [`TokenCache`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Cache entry with an absolute deadline, shared by the in-process tiers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct CacheEntry {
	pub(crate) record: TokenRecord,
	#[serde(with = "time::serde::rfc3339")]
	pub(crate) expires_at: OffsetDateTime,
}
impl CacheEntry {
	pub(crate) fn new(record: TokenRecord, now: OffsetDateTime, ttl: Duration) -> Self {
		Self { record, expires_at: now + ttl }
	}

	pub(crate) fn is_live_at(&self, now: OffsetDateTime) -> bool {
		now < self.expires_at
	}
}
