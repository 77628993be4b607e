//! Thread-safe in-process [`TokenCache`] implementation.

// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	cache::{CacheEntry, EntryOptions, StoreFuture, TokenCache},
	clock::{Clock, SystemClock},
};

type EntryMap = Arc<RwLock<HashMap<String, CacheEntry>>>;

/// In-process cache that honors entry expirations lazily on read.
#[derive(Clone)]
pub struct MemoryCache {
	entries: EntryMap,
	clock: Arc<dyn Clock>,
}
impl MemoryCache {
	/// Creates an empty cache whose expirations follow `clock`.
	pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
		Self { entries: Default::default(), clock }
	}

	/// Number of stored entries, expired ones included until they are purged.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns `true` when no entries are stored.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}

	/// Drops every expired entry and returns how many were removed.
	pub fn purge_expired(&self) -> usize {
		let now = self.clock.now();
		let mut guard = self.entries.write();
		let before = guard.len();

		guard.retain(|_, entry| entry.is_live_at(now));

		before - guard.len()
	}

	pub(crate) fn get_now(&self, key: &str) -> Option<TokenRecord> {
		let now = self.clock.now();

		{
			let guard = self.entries.read();

			match guard.get(key) {
				Some(entry) if entry.is_live_at(now) => return Some(entry.record.clone()),
				Some(_) => {},
				None => return None,
			}
		}

		let mut guard = self.entries.write();

		// Re-check under the write lock; a writer may have replaced the entry.
		if guard.get(key).is_some_and(|entry| !entry.is_live_at(now)) {
			guard.remove(key);
		}

		guard.get(key).map(|entry| entry.record.clone())
	}

	pub(crate) fn set_now(&self, key: String, record: TokenRecord, ttl: Duration) {
		let entry = CacheEntry::new(record, self.clock.now(), ttl);

		self.entries.write().insert(key, entry);
	}

	pub(crate) fn remove_now(&self, key: &str) {
		self.entries.write().remove(key);
	}
}
impl Default for MemoryCache {
	fn default() -> Self {
		Self::with_clock(Arc::new(SystemClock))
	}
}
impl Debug for MemoryCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryCache").field("entries", &self.len()).finish()
	}
}
impl TokenCache for MemoryCache {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<TokenRecord>> {
		Box::pin(async move { Ok(self.get_now(key)) })
	}

	fn set(&self, key: String, record: TokenRecord, options: EntryOptions) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.set_now(key, record, options.expiration);

			Ok(())
		})
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.remove_now(key);

			Ok(())
		})
	}
}
