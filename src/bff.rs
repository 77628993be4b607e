//! Backend-for-frontend surface: login, logout, cookie validation, and bearer injection.
//!
//! The browser only ever holds an opaque auth cookie carrying a [`Principal`]. Tokens stay
//! in the [`UserTokenStore`] and are attached to proxied API calls from there.

// crates.io
#[cfg(feature = "reqwest")]
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
// self
use crate::{
	_prelude::*,
	auth::{Principal, TokenRecord, TokenSecret, UserId},
	store::UserTokenStore,
};
#[cfg(feature = "reqwest")] use crate::error::ConfigError;

/// Path prefix of the upstream auth endpoints, which never receive a bearer token.
pub const DEFAULT_AUTH_PATH_PREFIX: &str = "/api/auth";

const STATIC_PREFIXES: [&str; 2] = ["/_framework", "/_content"];
const STATIC_SUFFIXES: [&str; 2] = [".css", ".js"];

/// Credentials handed to the BFF after the browser authenticated upstream.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
	/// Access token issued upstream.
	#[serde(default)]
	pub access_token: Option<String>,
	/// Refresh token issued upstream.
	#[serde(default)]
	pub refresh_token: Option<String>,
	/// Absolute access-token expiry.
	#[serde(with = "time::serde::rfc3339")]
	pub access_token_expiry: OffsetDateTime,
	/// Absolute refresh-token expiry.
	#[serde(with = "time::serde::rfc3339")]
	pub refresh_token_expiry: OffsetDateTime,
	/// Stable user identifier.
	#[serde(default)]
	pub user_id: Option<String>,
}
impl Debug for LoginRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginRequest")
			.field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("access_token_expiry", &self.access_token_expiry)
			.field("refresh_token_expiry", &self.refresh_token_expiry)
			.field("user_id", &self.user_id)
			.finish()
	}
}

/// Verdict of [`BffSession::validate_principal`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionValidation {
	/// Static resource or anonymous caller; nothing to check.
	Skip,
	/// The session has no usable token; the host must reject the cookie.
	Reject,
	/// The session is valid; the token is attached to the request.
	Accept(TokenSecret),
}

/// Cookie-session hooks bound to a [`UserTokenStore`].
#[derive(Clone, Debug)]
pub struct BffSession {
	store: Arc<UserTokenStore>,
	auth_path_prefix: String,
}
impl BffSession {
	/// Creates the session hooks over `store`.
	pub fn new(store: Arc<UserTokenStore>) -> Self {
		Self { store, auth_path_prefix: DEFAULT_AUTH_PATH_PREFIX.into() }
	}

	/// Overrides the auth endpoint prefix (defaults to [`DEFAULT_AUTH_PATH_PREFIX`]).
	pub fn with_auth_path_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.auth_path_prefix = prefix.into();

		self
	}

	/// Returns `true` when `path` targets an auth endpoint; matching ignores ASCII case.
	pub fn is_auth_endpoint(&self, path: &str) -> bool {
		path.get(..self.auth_path_prefix.len())
			.is_some_and(|head| head.eq_ignore_ascii_case(&self.auth_path_prefix))
	}

	/// Underlying token store.
	pub fn store(&self) -> &Arc<UserTokenStore> {
		&self.store
	}

	/// Accepts upstream credentials and returns the principal to write into the cookie.
	///
	/// Missing access tokens and user ids are rejected before anything is stored.
	pub async fn login(&self, request: LoginRequest) -> Result<Principal> {
		let access_token = request
			.access_token
			.filter(|token| !token.trim().is_empty())
			.ok_or_else(|| Error::InvalidLogin { reason: "access token is required".into() })?;
		let user_id = request
			.user_id
			.filter(|id| !id.trim().is_empty())
			.ok_or_else(|| Error::InvalidLogin { reason: "user id is required".into() })?;
		let user_id = UserId::new(user_id)
			.map_err(|e| Error::InvalidLogin { reason: format!("user id is malformed ({e})") })?;
		let record = TokenRecord::builder(user_id.clone())
			.access_token(access_token)
			.refresh_token(request.refresh_token.unwrap_or_default())
			.access_token_expires_at(request.access_token_expiry)
			.refresh_token_expires_at(request.refresh_token_expiry)
			.build()
			.map_err(|e| Error::InvalidLogin {
				reason: e.to_string().trim_end_matches('.').to_lowercase(),
			})?;

		self.store.store_token(record).await?;

		tracing::info!(user_id = %user_id, "User signed in.");

		Ok(Principal::authenticated(&user_id))
	}

	/// Clears the principal's token; the host expires the cookie afterwards.
	pub async fn logout(&self, principal: &Principal) -> Result<()> {
		self.store.clear_token(principal).await?;

		tracing::info!("User signed out.");

		Ok(())
	}

	/// Cookie sign-out hook; clears whatever token the principal still owns.
	pub async fn signing_out(&self, principal: &Principal) -> Result<()> {
		self.store.clear_token(principal).await
	}

	/// Cookie validation hook run for every request carrying the auth cookie.
	pub async fn validate_principal(
		&self,
		path: &str,
		principal: &Principal,
	) -> Result<SessionValidation> {
		if is_static_resource(path) || !principal.is_authenticated() {
			return Ok(SessionValidation::Skip);
		}

		match self.store.get_token(principal).await? {
			Some(token) => Ok(SessionValidation::Accept(token)),
			None => {
				tracing::info!(path, "Rejecting session without a usable token.");

				Ok(SessionValidation::Reject)
			},
		}
	}

	/// Returns the `Authorization` header value for the principal, if it has a token.
	pub async fn bearer_value(&self, principal: &Principal) -> Result<Option<String>> {
		Ok(self
			.store
			.get_token(principal)
			.await?
			.map(|token| token.bearer()))
	}

	/// Sets `Authorization` on a proxied request to `path` from the store, never from browser
	/// input.
	///
	/// Returns `false` when `path` is an auth endpoint or the principal has no usable token;
	/// the header is then removed.
	#[cfg(feature = "reqwest")]
	pub async fn apply_bearer(
		&self,
		principal: &Principal,
		path: &str,
		headers: &mut HeaderMap,
	) -> Result<bool> {
		if self.is_auth_endpoint(path) {
			headers.remove(AUTHORIZATION);

			return Ok(false);
		}

		let Some(value) = self.bearer_value(principal).await? else {
			headers.remove(AUTHORIZATION);

			return Ok(false);
		};
		let mut value =
			HeaderValue::from_str(&value).map_err(|source| ConfigError::InvalidBearer { source })?;

		value.set_sensitive(true);
		headers.insert(AUTHORIZATION, value);

		Ok(true)
	}
}

/// Returns `true` for framework bundles and stylesheet/script assets.
pub fn is_static_resource(path: &str) -> bool {
	let lower = path.to_ascii_lowercase();

	STATIC_PREFIXES.iter().any(|prefix| {
		lower.strip_prefix(prefix).is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
	}) || STATIC_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}
