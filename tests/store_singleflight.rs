// std
use std::sync::atomic::{AtomicUsize, Ordering};
// self
use bff_token_relay::{
	_preludet::*,
	auth::{Principal, TokenRecord, TokenSecret, UserId},
	cache::{FileCache, HybridCache, TokenCache},
	clock::{Clock, ManualClock},
	refresh::{RefreshFailure, RefreshFuture, RefreshOutcome, TokenRefresher},
	store::{TokenStoreConfig, UserTokenStore},
};

/// Counts calls and answers each with a rotated pair after an optional delay.
struct RotatingRefresher {
	calls: AtomicUsize,
	delay: std::time::Duration,
	issued_at: Mutex<OffsetDateTime>,
}
impl RotatingRefresher {
	fn new(delay: std::time::Duration) -> Arc<Self> {
		Arc::new(Self { calls: AtomicUsize::new(0), delay, issued_at: Mutex::new(TEST_EPOCH) })
	}

	fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl TokenRefresher for RotatingRefresher {
	fn refresh<'a>(
		&'a self,
		user_id: &'a UserId,
		_refresh_token: &'a TokenSecret,
	) -> RefreshFuture<'a> {
		Box::pin(async move {
			let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

			tokio::time::sleep(self.delay).await;

			RefreshOutcome::Refreshed(test_record(
				user_id,
				&format!("access-{}", n + 1),
				&format!("refresh-{}", n + 1),
				*self.issued_at.lock(),
				Duration::minutes(5),
				Duration::days(7),
			))
		})
	}
}

/// First call never completes; later calls fail softly.
struct StallingRefresher {
	calls: AtomicUsize,
}
impl TokenRefresher for StallingRefresher {
	fn refresh<'a>(&'a self, _: &'a UserId, _: &'a TokenSecret) -> RefreshFuture<'a> {
		let first = self.calls.fetch_add(1, Ordering::SeqCst) == 0;

		Box::pin(async move {
			if first {
				std::future::pending::<()>().await;
			}

			RefreshOutcome::NoNewToken(RefreshFailure::EmptyResponse)
		})
	}
}

fn login_record(access: &str, refresh: &str) -> TokenRecord {
	test_record("42", access, refresh, TEST_EPOCH, Duration::minutes(5), Duration::days(7))
}

fn access(token: Option<TokenSecret>) -> Option<String> {
	token.map(|token| token.expose().to_owned())
}

#[tokio::test]
async fn scenario_refreshes_once_after_entering_the_buffer() {
	let refresher = RotatingRefresher::new(std::time::Duration::ZERO);
	let (store, _, clock) =
		build_memory_token_store(refresher.clone(), TokenStoreConfig::default());
	let user = test_user("42");

	store
		.store_token(login_record("access-1", "refresh-1"))
		.await
		.expect("Login store should succeed.");

	clock.advance(Duration::seconds(100));

	let token = store.get_token_for(&user).await.expect("Lookup at T+100s should succeed.");

	assert_eq!(access(token).as_deref(), Some("access-1"));
	assert_eq!(refresher.calls(), 0);

	clock.advance(Duration::seconds(150));
	*refresher.issued_at.lock() = clock.now();

	let token = store.get_token_for(&user).await.expect("Lookup at T+250s should succeed.");

	assert_eq!(access(token).as_deref(), Some("access-2"));
	assert_eq!(refresher.calls(), 1);

	// The rotated record is fresh again.
	let token = store.get_token_for(&user).await.expect("Follow-up lookup should succeed.");

	assert_eq!(access(token).as_deref(), Some("access-2"));
	assert_eq!(refresher.calls(), 1);
}

#[tokio::test]
async fn concurrent_lookups_share_a_single_refresh() {
	let refresher = RotatingRefresher::new(std::time::Duration::from_millis(50));
	let (store, _, clock) =
		build_memory_token_store(refresher.clone(), TokenStoreConfig::default());
	let store = Arc::new(store);

	store
		.store_token(login_record("access-1", "refresh-1"))
		.await
		.expect("Login store should succeed.");
	clock.advance(Duration::seconds(250));
	*refresher.issued_at.lock() = clock.now();

	let mut tasks = tokio::task::JoinSet::new();

	for _ in 0..16 {
		let store = store.clone();

		tasks.spawn(async move {
			store.get_token(&Principal::authenticated(&test_user("42"))).await
		});
	}

	let mut tokens = Vec::new();

	while let Some(joined) = tasks.join_next().await {
		let token = joined.expect("Lookup task should not panic.").expect("Lookup should succeed.");

		tokens.push(access(token));
	}

	assert_eq!(refresher.calls(), 1);
	assert!(tokens.iter().all(|token| token.as_deref() == Some("access-2")), "{tokens:?}");
	assert_eq!(store.metrics().attempts(), 1);
	assert!(store.locks().is_empty());
}

#[tokio::test]
async fn distinct_users_refresh_independently() {
	let refresher = RotatingRefresher::new(std::time::Duration::from_millis(20));
	let (store, _, clock) =
		build_memory_token_store(refresher.clone(), TokenStoreConfig::default());

	for user in ["alice", "bob"] {
		store
			.store_token(test_record(
				user,
				"access-1",
				"refresh-1",
				TEST_EPOCH,
				Duration::minutes(5),
				Duration::days(7),
			))
			.await
			.expect("Login store should succeed.");
	}

	clock.advance(Duration::minutes(5));
	*refresher.issued_at.lock() = clock.now();

	let alice = test_user("alice");
	let bob = test_user("bob");
	let (a, b) = tokio::join!(store.get_token_for(&alice), store.get_token_for(&bob));

	assert!(a.expect("Alice lookup should succeed.").is_some());
	assert!(b.expect("Bob lookup should succeed.").is_some());
	assert_eq!(refresher.calls(), 2);
}

#[tokio::test]
async fn cancelled_refresh_releases_the_lock() {
	let refresher = Arc::new(StallingRefresher { calls: AtomicUsize::new(0) });
	let (store, cache, clock) =
		build_memory_token_store(refresher.clone(), TokenStoreConfig::default());
	let user = test_user("42");

	store
		.store_token(login_record("access-1", "refresh-1"))
		.await
		.expect("Login store should succeed.");
	clock.advance(Duration::minutes(5));

	let stalled =
		tokio::time::timeout(std::time::Duration::from_millis(50), store.get_token_for(&user)).await;

	assert!(stalled.is_err(), "The first refresh should still be pending.");
	assert!(store.locks().is_empty(), "Dropping the lookup must release and evict its lock.");
	assert_eq!(cache.len(), 1, "A cancelled refresh leaves the record untouched.");

	// The next caller is not blocked by the abandoned one.
	let token = tokio::time::timeout(std::time::Duration::from_secs(1), store.get_token_for(&user))
		.await
		.expect("Second lookup must not deadlock.")
		.expect("Second lookup should succeed.");

	assert!(token.is_none());
	assert!(cache.is_empty());
	assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stores_sharing_a_file_cache_see_each_others_writes() {
	let path = std::env::temp_dir()
		.join(format!("bff-token-relay-it-{}-{}.json", std::process::id(), "shared"));
	let clock = Arc::new(ManualClock::new(TEST_EPOCH));
	let shared_clock: Arc<dyn Clock> = clock.clone();
	let open = || -> UserTokenStore {
		let file = FileCache::open(&path)
			.expect("File cache should open.")
			.with_clock(shared_clock.clone());
		let hybrid: Arc<dyn TokenCache> =
			Arc::new(HybridCache::with_clock(Arc::new(file), shared_clock.clone()));

		UserTokenStore::new(hybrid, RotatingRefresher::new(std::time::Duration::ZERO))
			.with_clock(shared_clock.clone())
	};
	let first = open();
	let second = open();
	let user = test_user("42");

	first.store_token(login_record("access-1", "refresh-1")).await.expect("Store should succeed.");

	let token = second.get_token_for(&user).await.expect("Lookup should succeed.");

	assert_eq!(access(token).as_deref(), Some("access-1"));

	second.clear_token_for(&user).await.expect("Clear should succeed.");

	// Past the hot-tier lifetime, the first store observes the removal.
	clock.advance(Duration::minutes(6));

	let token = first.get_token_for(&user).await.expect("Lookup should succeed.");

	assert!(token.is_none());

	let lock_path = FileCache::open(&path).expect("File cache should reopen.").lock_path().to_owned();

	for path in [&path, &lock_path] {
		if let Err(e) = std::fs::remove_file(path) {
			panic!("Failed to remove temporary cache file {}: {e}", path.display());
		}
	}
}
