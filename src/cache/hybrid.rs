//! Two-tier cache: a short-lived in-process tier in front of a shared backing cache.

// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	cache::{EntryOptions, MemoryCache, StoreFuture, TokenCache},
	clock::{Clock, SystemClock},
};

/// Hot in-process tier layered over any [`TokenCache`].
///
/// Hot entries live for [`EntryOptions::effective_local_expiration`]. Reads that miss the
/// hot tier fall through to the backing cache and repopulate the hot tier, bounded by
/// `default_local_expiration` and the record's refresh-token expiry.
#[derive(Clone)]
pub struct HybridCache {
	local: MemoryCache,
	backing: Arc<dyn TokenCache>,
	clock: Arc<dyn Clock>,
	default_local_expiration: Duration,
}
impl HybridCache {
	const DEFAULT_LOCAL_EXPIRATION: Duration = Duration::minutes(5);

	/// Wraps `backing` with a hot tier driven by the system clock.
	pub fn new(backing: Arc<dyn TokenCache>) -> Self {
		Self::with_clock(backing, Arc::new(SystemClock))
	}

	/// Wraps `backing` with a hot tier driven by `clock`.
	pub fn with_clock(backing: Arc<dyn TokenCache>, clock: Arc<dyn Clock>) -> Self {
		Self {
			local: MemoryCache::with_clock(clock.clone()),
			backing,
			clock,
			default_local_expiration: Self::DEFAULT_LOCAL_EXPIRATION,
		}
	}

	/// Overrides the hot-tier lifetime used when repopulating after a backing read.
	pub fn with_default_local_expiration(mut self, expiration: Duration) -> Self {
		self.default_local_expiration =
			if expiration.is_negative() { Duration::ZERO } else { expiration };

		self
	}

	/// Number of entries currently held in the hot tier.
	pub fn local_len(&self) -> usize {
		self.local.len()
	}
}
impl Debug for HybridCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HybridCache")
			.field("local", &self.local)
			.field("default_local_expiration", &self.default_local_expiration)
			.finish()
	}
}
impl TokenCache for HybridCache {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<TokenRecord>> {
		Box::pin(async move {
			if let Some(record) = self.local.get_now(key) {
				return Ok(Some(record));
			}

			let Some(record) = self.backing.get(key).await? else {
				return Ok(None);
			};
			let ttl = record.refresh_ttl_at(self.clock.now()).min(self.default_local_expiration);

			if ttl.is_positive() {
				self.local.set_now(key.to_owned(), record.clone(), ttl);
			}

			Ok(Some(record))
		})
	}

	fn set(&self, key: String, record: TokenRecord, options: EntryOptions) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			// Drop the stale hot copy first so a failed backing write cannot leave it visible.
			self.local.remove_now(&key);
			self.backing.set(key.clone(), record.clone(), options).await?;
			self.local.set_now(key, record, options.effective_local_expiration());

			Ok(())
		})
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.local.remove_now(key);
			self.backing.remove(key).await
		})
	}
}
