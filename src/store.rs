//! Per-user token store with singleflight refresh.
//!
//! [`UserTokenStore::get_token`] hands out a cached access token while it is still fresh.
//! Once the token enters the configured expiration buffer, callers for the same user
//! serialize on a [`RefreshLocks`] entry, re-read the cache, and only the first one through
//! calls the [`TokenRefresher`]. Later waiters find the refreshed record and reuse it.
//! Every refresh that yields no new token purges the cached record so the user is sent
//! back through login.

pub mod lock;

mod metrics;

pub use lock::{RefreshLockGuard, RefreshLocks};
pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{Principal, TokenRecord, TokenSecret, UserId},
	cache::{EntryOptions, TokenCache},
	clock::{Clock, SystemClock},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	refresh::{RefreshOutcome, TokenRefresher},
};

/// Tuning knobs for [`UserTokenStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenStoreConfig {
	/// Access tokens expiring within this window are refreshed before use.
	pub expiration_buffer: Duration,
	/// Residency limit for hot in-process cache tiers.
	pub local_cache_expiration: Duration,
	/// Prefix prepended to the user id to form the cache key.
	pub key_prefix: String,
}
impl TokenStoreConfig {
	/// Default refresh window ahead of access-token expiry.
	pub const DEFAULT_EXPIRATION_BUFFER: Duration = Duration::minutes(1);
	/// Default hot-tier residency.
	pub const DEFAULT_LOCAL_CACHE_EXPIRATION: Duration = Duration::minutes(5);
	/// Default cache key prefix.
	pub const DEFAULT_KEY_PREFIX: &'static str = "auth:token:";

	/// Overrides the refresh window; negative values clamp to zero.
	pub fn with_expiration_buffer(mut self, buffer: Duration) -> Self {
		self.expiration_buffer = clamp_non_negative(buffer);

		self
	}

	/// Overrides the hot-tier residency; negative values clamp to zero.
	pub fn with_local_cache_expiration(mut self, expiration: Duration) -> Self {
		self.local_cache_expiration = clamp_non_negative(expiration);

		self
	}

	/// Overrides the cache key prefix.
	pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.key_prefix = prefix.into();

		self
	}

	/// Cache key under which `user_id`'s record lives.
	pub fn cache_key(&self, user_id: &UserId) -> String {
		format!("{}{user_id}", self.key_prefix)
	}
}
impl Default for TokenStoreConfig {
	fn default() -> Self {
		Self {
			expiration_buffer: Self::DEFAULT_EXPIRATION_BUFFER,
			local_cache_expiration: Self::DEFAULT_LOCAL_CACHE_EXPIRATION,
			key_prefix: Self::DEFAULT_KEY_PREFIX.into(),
		}
	}
}

/// Hands out per-user access tokens, refreshing them at most once per expiry window.
///
/// The store is cheap to share behind an [`Arc`]; its lock registry is owned by the
/// instance, so two stores never coordinate with each other.
pub struct UserTokenStore {
	cache: Arc<dyn TokenCache>,
	refresher: Arc<dyn TokenRefresher>,
	clock: Arc<dyn Clock>,
	config: TokenStoreConfig,
	locks: RefreshLocks,
	metrics: Arc<RefreshMetrics>,
}
impl UserTokenStore {
	/// Creates a store over `cache` that renews tokens through `refresher`.
	pub fn new(cache: Arc<dyn TokenCache>, refresher: Arc<dyn TokenRefresher>) -> Self {
		Self {
			cache,
			refresher,
			clock: Arc::new(SystemClock),
			config: TokenStoreConfig::default(),
			locks: RefreshLocks::default(),
			metrics: Default::default(),
		}
	}

	/// Replaces the time source used for freshness and TTL decisions.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Replaces the store configuration.
	pub fn with_config(mut self, config: TokenStoreConfig) -> Self {
		self.config = config;

		self
	}

	/// Active configuration.
	pub fn config(&self) -> &TokenStoreConfig {
		&self.config
	}

	/// Refresh counters for this store instance.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Per-user lock registry; empty whenever no refresh is in flight.
	pub fn locks(&self) -> &RefreshLocks {
		&self.locks
	}

	/// Returns a usable access token for the principal's user, refreshing it if needed.
	///
	/// Principals without a user id resolve to `Ok(None)`.
	pub async fn get_token(&self, principal: &Principal) -> Result<Option<TokenSecret>> {
		match principal.user_id() {
			Some(user_id) => self.get_token_for(&user_id).await,
			None => Ok(None),
		}
	}

	/// Returns a usable access token for `user_id`, refreshing it if needed.
	///
	/// `Ok(None)` means the user has no usable token and must log in again. Only cache
	/// backend failures surface as `Err`.
	pub async fn get_token_for(&self, user_id: &UserId) -> Result<Option<TokenSecret>> {
		const KIND: FlowKind = FlowKind::Lookup;

		let span = FlowSpan::for_user(KIND, "get_token", user_id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.lookup(user_id)).await;

		match &result {
			Ok(Some(_)) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Ok(None) => obs::record_flow_outcome(KIND, FlowOutcome::Miss),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Writes `record`, replacing whatever is cached for its user.
	///
	/// The entry lives until the refresh token expires. A record whose refresh token has
	/// already expired is not written; any existing entry for the user is removed instead.
	pub async fn store_token(&self, record: TokenRecord) -> Result<()> {
		const KIND: FlowKind = FlowKind::Store;

		let span = FlowSpan::for_user(KIND, "store_token", &record.user_id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.write(record)).await;

		match &result {
			Ok(()) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Removes the principal's cached record; a no-op for anonymous principals.
	pub async fn clear_token(&self, principal: &Principal) -> Result<()> {
		match principal.user_id() {
			Some(user_id) => self.clear_token_for(&user_id).await,
			None => Ok(()),
		}
	}

	/// Removes `user_id`'s cached record; absent records are a no-op.
	pub async fn clear_token_for(&self, user_id: &UserId) -> Result<()> {
		const KIND: FlowKind = FlowKind::Clear;

		let span = FlowSpan::for_user(KIND, "clear_token", user_id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.remove(user_id)).await;

		match &result {
			Ok(()) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn lookup(&self, user_id: &UserId) -> Result<Option<TokenSecret>> {
		let key = self.config.cache_key(user_id);
		let Some(current) = self.cache.get(&key).await? else {
			tracing::debug!("No cached token record.");

			return Ok(None);
		};

		if current.is_fresh_at(self.clock.now(), self.config.expiration_buffer) {
			return Ok(Some(current.access_token));
		}

		let _guard = self.locks.acquire(user_id).await;
		// Another caller may have refreshed while this one waited.
		let reread = self.cache.get(&key).await?;
		let buffer = self.config.expiration_buffer;

		if let Some(record) = reread.as_ref().filter(|r| r.is_fresh_at(self.clock.now(), buffer)) {
			self.metrics.record_coalesced();
			tracing::debug!("Reusing token refreshed by a concurrent caller.");

			return Ok(Some(record.access_token.clone()));
		}

		let refresh_token = reread.map_or(current.refresh_token, |record| record.refresh_token);

		self.refresh_locked(user_id, &key, &refresh_token).await
	}

	// Must only run while the caller holds `user_id`'s refresh lock.
	async fn refresh_locked(
		&self,
		user_id: &UserId,
		key: &str,
		refresh_token: &TokenSecret,
	) -> Result<Option<TokenSecret>> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh_locked");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_attempt();

		let outcome = span.instrument(self.refresher.refresh(user_id, refresh_token)).await;

		match outcome {
			RefreshOutcome::Refreshed(record) if record.user_id != *user_id => {
				tracing::warn!("Refresh returned a record for a different user; discarding it.");

				self.discard(KIND, key, "foreign_user").await
			},
			RefreshOutcome::Refreshed(record)
				if !record.refresh_ttl_at(self.clock.now()).is_positive() =>
				self.discard(KIND, key, "refresh_expired").await,
			RefreshOutcome::Refreshed(record) => {
				let access_token = record.access_token.clone();

				if let Err(e) = self.write(record).await {
					self.metrics.record_failure();
					obs::record_flow_outcome(KIND, FlowOutcome::Failure);

					return Err(e);
				}

				self.metrics.record_success();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);

				Ok(Some(access_token))
			},
			outcome => self.discard(KIND, key, outcome.label()).await,
		}
	}

	async fn discard(
		&self,
		kind: FlowKind,
		key: &str,
		reason: &'static str,
	) -> Result<Option<TokenSecret>> {
		self.metrics.record_failure();
		obs::record_flow_outcome(kind, FlowOutcome::Miss);
		tracing::info!(reason, "Refresh produced no usable token; purging cached record.");

		self.cache.remove(key).await?;

		Ok(None)
	}

	async fn remove(&self, user_id: &UserId) -> Result<()> {
		self.cache.remove(&self.config.cache_key(user_id)).await?;

		tracing::debug!("Cleared cached token record.");

		Ok(())
	}

	async fn write(&self, record: TokenRecord) -> Result<()> {
		let key = self.config.cache_key(&record.user_id);
		let ttl = record.refresh_ttl_at(self.clock.now());

		if !ttl.is_positive() {
			tracing::warn!("Refusing to cache a record whose refresh token has expired.");

			self.cache.remove(&key).await?;

			return Ok(());
		}

		let options =
			EntryOptions::expiring_in(ttl).with_local_expiration(self.config.local_cache_expiration);

		self.cache.set(key, record, options).await?;

		Ok(())
	}
}
impl Debug for UserTokenStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("UserTokenStore")
			.field("config", &self.config)
			.field("pending_locks", &self.locks.len())
			.field("metrics", &self.metrics)
			.finish()
	}
}

fn clamp_non_negative(value: Duration) -> Duration {
	if value.is_negative() { Duration::ZERO } else { value }
}
