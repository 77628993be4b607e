//! Reactions to `401 Unauthorized` answers from downstream APIs.
//!
//! A 401 means the cached record no longer matches what the API accepts. The server-side
//! handlers drop the record so the next lookup cannot hand out the same token again, then
//! tell the host how to get the user back through login. Hosts translate the returned
//! [`InterceptAction`] into a navigation or cookie sign-out in their own framework.

// crates.io
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
// self
use crate::{
	_prelude::*,
	auth::Principal,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::UserTokenStore,
};

const UNAUTHORIZED: u16 = 401;
// RFC 3986 unreserved characters stay literal; everything else is escaped.
const RETURN_URL_ESCAPES: &AsciiSet =
	&NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Path of the login page users are sent back to.
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// What the host should do after a downstream response was inspected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InterceptAction {
	/// The response is not a 401; hand it on unchanged.
	PassThrough,
	/// Force a full navigation to the login page.
	Redirect(LoginRedirect),
	/// Sign the session out, expiring the auth cookie.
	SignOut,
}

/// Forced-navigation directive to the login page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginRedirect {
	/// Relative location, e.g. `/login?returnUrl=%2Forders`.
	pub location: String,
	/// Bypass client-side routing and reload the page from the server.
	pub force_load: bool,
}
impl LoginRedirect {
	/// Builds a redirect to `login_path` that returns to `return_url` afterwards.
	///
	/// The return URL is percent-encoded as a single data component (space becomes `%20`).
	pub fn to_login(login_path: &str, return_url: &str) -> Self {
		let escaped = utf8_percent_encode(return_url, RETURN_URL_ESCAPES);

		Self { location: format!("{login_path}?returnUrl={escaped}"), force_load: true }
	}
}

/// Server-rendered handler: clears the token and forces a login navigation on 401.
#[derive(Clone, Debug)]
pub struct ServerUnauthorizedHandler {
	store: Arc<UserTokenStore>,
	login_path: String,
}
impl ServerUnauthorizedHandler {
	/// Creates a handler clearing records from `store`.
	pub fn new(store: Arc<UserTokenStore>) -> Self {
		Self { store, login_path: DEFAULT_LOGIN_PATH.into() }
	}

	/// Overrides the login page path (defaults to [`DEFAULT_LOGIN_PATH`]).
	pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
		self.login_path = path.into();

		self
	}

	/// Inspects a downstream `status` observed while rendering `current_uri`.
	///
	/// Anonymous principals are redirected without touching the store.
	pub async fn handle(
		&self,
		status: u16,
		principal: &Principal,
		current_uri: &str,
	) -> Result<InterceptAction> {
		if status != UNAUTHORIZED {
			return Ok(InterceptAction::PassThrough);
		}

		let span = FlowSpan::new(FlowKind::Intercept, "server_unauthorized");

		span.instrument(async {
			tracing::warn!(uri = current_uri, "Downstream API rejected the access token.");

			clear_if_authenticated(&self.store, principal).await.map(|()| {
				InterceptAction::Redirect(LoginRedirect::to_login(&self.login_path, current_uri))
			})
		})
		.await
	}
}

/// Browser-side handler: forces a login navigation on 401 and never touches the store.
#[derive(Clone, Debug)]
pub struct ClientUnauthorizedHandler {
	login_path: String,
}
impl ClientUnauthorizedHandler {
	/// Overrides the login page path (defaults to [`DEFAULT_LOGIN_PATH`]).
	pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
		self.login_path = path.into();

		self
	}

	/// Inspects a downstream `status` observed while rendering `current_uri`.
	pub fn handle(&self, status: u16, current_uri: &str) -> InterceptAction {
		if status != UNAUTHORIZED {
			return InterceptAction::PassThrough;
		}

		obs::record_flow_outcome(FlowKind::Intercept, FlowOutcome::Miss);

		InterceptAction::Redirect(LoginRedirect::to_login(&self.login_path, current_uri))
	}
}
impl Default for ClientUnauthorizedHandler {
	fn default() -> Self {
		Self { login_path: DEFAULT_LOGIN_PATH.into() }
	}
}

/// Response-pipeline handler: on 401 clears the token and signs the session out.
#[derive(Clone, Debug)]
pub struct TokenCleanup {
	store: Arc<UserTokenStore>,
}
impl TokenCleanup {
	/// Creates a cleanup step clearing records from `store`.
	pub fn new(store: Arc<UserTokenStore>) -> Self {
		Self { store }
	}

	/// Inspects the final response `status` for the request made by `principal`.
	///
	/// Only authenticated principals are signed out; anonymous 401s pass through.
	pub async fn after_response(
		&self,
		status: u16,
		principal: &Principal,
	) -> Result<InterceptAction> {
		if status != UNAUTHORIZED || !principal.is_authenticated() {
			return Ok(InterceptAction::PassThrough);
		}

		let span = FlowSpan::new(FlowKind::Intercept, "token_cleanup");

		span.instrument(async {
			tracing::info!("Unauthorized response for an authenticated session; signing out.");

			clear_if_authenticated(&self.store, principal).await.map(|()| InterceptAction::SignOut)
		})
		.await
	}
}

async fn clear_if_authenticated(store: &UserTokenStore, principal: &Principal) -> Result<()> {
	let result =
		if principal.is_authenticated() { store.clear_token(principal).await } else { Ok(()) };

	match &result {
		Ok(()) => obs::record_flow_outcome(FlowKind::Intercept, FlowOutcome::Success),
		Err(_) => obs::record_flow_outcome(FlowKind::Intercept, FlowOutcome::Failure),
	}

	result
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::*,
		auth::{TokenSecret, UserId},
		refresh::{RefreshFuture, TokenRefresher},
	};

	struct NeverRefresher;
	impl TokenRefresher for NeverRefresher {
		fn refresh<'a>(&'a self, _: &'a UserId, _: &'a TokenSecret) -> RefreshFuture<'a> {
			panic!("Interceptors must not trigger refreshes.")
		}
	}

	fn seeded_store() -> (Arc<UserTokenStore>, Arc<crate::cache::MemoryCache>) {
		let (store, cache, _) =
			build_memory_token_store(Arc::new(NeverRefresher), Default::default());

		(Arc::new(store), cache)
	}

	async fn seed(store: &UserTokenStore) {
		store
			.store_token(test_record(
				"42",
				"access-1",
				"refresh-1",
				TEST_EPOCH,
				Duration::minutes(5),
				Duration::days(7),
			))
			.await
			.expect("Seeding should succeed.");
	}

	#[test]
	fn redirect_escapes_return_url() {
		let redirect = LoginRedirect::to_login("/login", "/orders?id=7&tab=items");

		assert_eq!(redirect.location, "/login?returnUrl=%2Forders%3Fid%3D7%26tab%3Ditems");
		assert!(redirect.force_load);
	}

	#[tokio::test]
	async fn server_handler_clears_and_redirects_on_401() {
		let (store, cache) = seeded_store();

		seed(&store).await;

		let action = ServerUnauthorizedHandler::new(store)
			.handle(401, &Principal::authenticated(&test_user("42")), "/dashboard")
			.await
			.expect("Handler should succeed.");

		assert_eq!(
			action,
			InterceptAction::Redirect(LoginRedirect {
				location: "/login?returnUrl=%2Fdashboard".into(),
				force_load: true,
			})
		);
		assert!(cache.is_empty());
	}

	#[tokio::test]
	async fn non_401_passes_through_untouched() {
		let (store, cache) = seeded_store();

		seed(&store).await;

		let principal = Principal::authenticated(&test_user("42"));
		let server = ServerUnauthorizedHandler::new(store.clone())
			.handle(403, &principal, "/")
			.await
			.expect("Handler should succeed.");
		let cleanup = TokenCleanup::new(store)
			.after_response(200, &principal)
			.await
			.expect("Cleanup should succeed.");

		assert_eq!(server, InterceptAction::PassThrough);
		assert_eq!(cleanup, InterceptAction::PassThrough);
		assert_eq!(cache.len(), 1);
		assert_eq!(ClientUnauthorizedHandler::default().handle(500, "/"), InterceptAction::PassThrough);
	}

	#[tokio::test]
	async fn cleanup_signs_out_authenticated_sessions_only() {
		let (store, cache) = seeded_store();

		seed(&store).await;

		let cleanup = TokenCleanup::new(store);
		let anonymous = cleanup
			.after_response(401, &Principal::anonymous())
			.await
			.expect("Cleanup should succeed.");

		assert_eq!(anonymous, InterceptAction::PassThrough);
		assert_eq!(cache.len(), 1);

		let signed_in = cleanup
			.after_response(401, &Principal::authenticated(&test_user("42")))
			.await
			.expect("Cleanup should succeed.");

		assert_eq!(signed_in, InterceptAction::SignOut);
		assert!(cache.is_empty());
	}

	#[test]
	fn client_handler_uses_custom_login_path() {
		let action =
			ClientUnauthorizedHandler::default().with_login_path("/account/login").handle(401, "/a b");

		assert_eq!(
			action,
			InterceptAction::Redirect(LoginRedirect {
				location: "/account/login?returnUrl=%2Fa%20b".into(),
				force_load: true,
			})
		);
	}

	#[test]
	fn return_url_escapes_everything_but_unreserved_characters() {
		let redirect = LoginRedirect::to_login("/login", "/docs/a b~c-d_e.f?q=é&x=+");

		assert_eq!(
			redirect.location,
			"/login?returnUrl=%2Fdocs%2Fa%20b~c-d_e.f%3Fq%3D%C3%A9%26x%3D%2B"
		);
	}
}
