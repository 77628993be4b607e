// self
use bff_token_relay::{
	_preludet::*,
	auth::{TokenSecret, UserId},
	bff::{BffSession, LoginRequest, SessionValidation},
	intercept::{
		ClientUnauthorizedHandler, InterceptAction, ServerUnauthorizedHandler, TokenCleanup,
	},
	refresh::{RefreshAbort, RefreshFuture, RefreshOutcome, TokenRefresher},
	store::TokenStoreConfig,
};

struct RefusingRefresher;
impl TokenRefresher for RefusingRefresher {
	fn refresh<'a>(&'a self, _: &'a UserId, _: &'a TokenSecret) -> RefreshFuture<'a> {
		Box::pin(async { RefreshOutcome::Abort(RefreshAbort::MissingRefreshToken) })
	}
}

fn login_request() -> LoginRequest {
	serde_json::from_str(
		r#"{
			"accessToken": "access-1",
			"refreshToken": "refresh-1",
			"accessTokenExpiry": "2025-06-01T08:05:00Z",
			"refreshTokenExpiry": "2025-06-08T08:00:00Z",
			"userId": "42"
		}"#,
	)
	.expect("Login body should deserialize.")
}

#[tokio::test]
async fn downstream_401_forces_reauthentication() {
	let (store, cache, _) =
		build_memory_token_store(Arc::new(RefusingRefresher), TokenStoreConfig::default());
	let store = Arc::new(store);
	let session = BffSession::new(store.clone());
	let principal = session.login(login_request()).await.expect("Login should succeed.");

	assert_eq!(
		session.validate_principal("/orders", &principal).await.expect("Validation should run."),
		SessionValidation::Accept(TokenSecret::new("access-1"))
	);

	let action = ServerUnauthorizedHandler::new(store.clone())
		.handle(401, &principal, "/orders?page=2")
		.await
		.expect("Handler should succeed.");

	match action {
		InterceptAction::Redirect(redirect) => {
			assert_eq!(redirect.location, "/login?returnUrl=%2Forders%3Fpage%3D2");
			assert!(redirect.force_load);
		},
		other => panic!("Expected a login redirect, got {other:?}."),
	}

	assert!(cache.is_empty());
	assert_eq!(
		session.validate_principal("/orders", &principal).await.expect("Validation should run."),
		SessionValidation::Reject
	);
}

#[tokio::test]
async fn cleanup_and_logout_are_idempotent() {
	let (store, cache, _) =
		build_memory_token_store(Arc::new(RefusingRefresher), TokenStoreConfig::default());
	let store = Arc::new(store);
	let session = BffSession::new(store.clone());
	let principal = session.login(login_request()).await.expect("Login should succeed.");
	let cleanup = TokenCleanup::new(store);

	assert_eq!(
		cleanup.after_response(401, &principal).await.expect("Cleanup should succeed."),
		InterceptAction::SignOut
	);
	assert!(cache.is_empty());

	session.logout(&principal).await.expect("Logout after cleanup should still succeed.");

	assert!(matches!(
		ClientUnauthorizedHandler::default().handle(401, "/"),
		InterceptAction::Redirect(_)
	));
}

#[tokio::test]
async fn aborted_refresh_rejects_the_session() {
	let (store, cache, clock) =
		build_memory_token_store(Arc::new(RefusingRefresher), TokenStoreConfig::default());
	let session = BffSession::new(Arc::new(store));
	let principal = session.login(login_request()).await.expect("Login should succeed.");

	clock.advance(Duration::minutes(4) + Duration::seconds(30));

	assert_eq!(
		session.validate_principal("/", &principal).await.expect("Validation should run."),
		SessionValidation::Reject
	);
	assert!(cache.is_empty());
	assert_eq!(
		session.validate_principal("/site.css", &principal).await.expect("Validation should run."),
		SessionValidation::Skip
	);
}
