// self
use crate::{
	_prelude::*,
	auth::{TokenRecord, TokenSecret, UserId},
	http::TokenHttpClient,
	refresh::{
		RefreshAbort, RefreshFailure, RefreshFuture, RefreshOutcome, RefreshTokenRequest,
		RefreshTokenResponse, TokenRefresher,
	},
};
#[cfg(feature = "reqwest")] use crate::{error::ConfigError, http::ReqwestHttpClient};

/// [`TokenRefresher`] that POSTs `{ userId, refreshToken }` to an upstream JSON endpoint.
pub struct HttpTokenRefresher<C>
where
	C: ?Sized + TokenHttpClient,
{
	endpoint: Url,
	http_client: Arc<C>,
}
impl<C> HttpTokenRefresher<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Creates a refresher that reuses the caller-provided transport.
	pub fn with_http_client(endpoint: Url, http_client: impl Into<Arc<C>>) -> Self {
		Self { endpoint, http_client: http_client.into() }
	}

	/// Upstream endpoint receiving refresh calls.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	async fn exchange(
		&self,
		user_id: &UserId,
		refresh_token: &TokenSecret,
	) -> Result<TokenRecord, RefreshFailure> {
		let request =
			RefreshTokenRequest { user_id: user_id.as_ref(), refresh_token: refresh_token.expose() };
		let body = serde_json::to_vec(&request).map_err(RefreshFailure::Encode)?;
		let response = self.http_client.post_json(&self.endpoint, body).await?;

		if !response.is_success() {
			return Err(RefreshFailure::Status { status: response.status });
		}

		let envelope = parse_envelope(&response.body)?.ok_or(RefreshFailure::EmptyResponse)?;

		if envelope.success == Some(false) {
			return Err(RefreshFailure::Rejected { message: envelope.message });
		}

		envelope.data.ok_or(RefreshFailure::MissingPayload)?.into_record()
	}
}
#[cfg(feature = "reqwest")]
impl HttpTokenRefresher<ReqwestHttpClient> {
	/// Creates a refresher backed by a redirect-refusing reqwest client.
	pub fn new(endpoint: &str) -> Result<Self> {
		let endpoint =
			Url::parse(endpoint).map_err(|source| ConfigError::InvalidEndpoint { source })?;
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.map_err(ConfigError::from)?;

		Ok(Self::with_http_client(endpoint, ReqwestHttpClient::with_client(client)))
	}

	/// Overrides the per-request timeout applied to upstream calls.
	pub fn with_timeout(self, timeout: std::time::Duration) -> Self {
		let http_client = (*self.http_client).clone().with_timeout(timeout);

		Self { endpoint: self.endpoint, http_client: Arc::new(http_client) }
	}
}
impl<C> TokenRefresher for HttpTokenRefresher<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn refresh<'a>(
		&'a self,
		user_id: &'a UserId,
		refresh_token: &'a TokenSecret,
	) -> RefreshFuture<'a> {
		Box::pin(async move {
			if refresh_token.is_blank() {
				tracing::error!(user_id = %user_id, "Refusing to refresh without a refresh token.");

				return RefreshOutcome::Abort(RefreshAbort::MissingRefreshToken);
			}

			tracing::debug!(user_id = %user_id, "Refreshing access token.");

			match self.exchange(user_id, refresh_token).await {
				Ok(record) => {
					tracing::info!(user_id = %user_id, "Access token refreshed.");

					RefreshOutcome::Refreshed(record)
				},
				Err(failure) => {
					log_failure(user_id, &failure);

					RefreshOutcome::NoNewToken(failure)
				},
			}
		})
	}
}
impl<C> Debug for HttpTokenRefresher<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpTokenRefresher").field("endpoint", &self.endpoint.as_str()).finish()
	}
}

fn parse_envelope(body: &[u8]) -> Result<Option<RefreshTokenResponse>, RefreshFailure> {
	if body.iter().all(u8::is_ascii_whitespace) {
		return Ok(None);
	}

	let mut de = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut de).map_err(RefreshFailure::Malformed)
}

fn log_failure(user_id: &UserId, failure: &RefreshFailure) {
	let reason = failure.label();

	match failure {
		RefreshFailure::Cancelled(_) =>
			tracing::info!(user_id = %user_id, reason, "Token refresh was cancelled."),
		RefreshFailure::Network(e) => tracing::warn!(
			user_id = %user_id,
			reason,
			error = %e,
			"Token refresh failed in transport."
		),
		RefreshFailure::Encode(_) | RefreshFailure::Malformed(_) => tracing::error!(
			user_id = %user_id,
			reason,
			error = %failure,
			"Token refresh hit an unexpected payload error."
		),
		_ => tracing::warn!(
			user_id = %user_id,
			reason,
			error = %failure,
			"Token refresh yielded no new token."
		),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		error::TransportError,
		http::{HttpFuture, HttpResponse},
	};

	struct CannedHttpClient(Mutex<Option<Result<HttpResponse, TransportError>>>);
	impl CannedHttpClient {
		fn responding(status: u16, body: &str) -> Self {
			Self(Mutex::new(Some(Ok(HttpResponse { status, body: body.as_bytes().to_vec() }))))
		}

		fn failing(err: TransportError) -> Self {
			Self(Mutex::new(Some(Err(err))))
		}
	}
	impl TokenHttpClient for CannedHttpClient {
		fn post_json<'a>(&'a self, _url: &'a Url, _body: Vec<u8>) -> HttpFuture<'a> {
			let canned = self.0.lock().take().expect("Canned client should be called once.");

			Box::pin(async move { canned })
		}
	}

	async fn run(client: CannedHttpClient, refresh_token: &str) -> RefreshOutcome {
		let endpoint =
			Url::parse("https://auth.example.com/api/auth/refresh-token").expect("Valid URL.");
		let refresher = HttpTokenRefresher::<CannedHttpClient>::with_http_client(endpoint, client);
		let user = UserId::new("42").expect("User fixture should be valid.");

		refresher.refresh(&user, &TokenSecret::new(refresh_token)).await
	}

	#[tokio::test]
	async fn blank_refresh_token_aborts_without_calling_upstream() {
		// An empty slot panics if the transport is reached.
		let client = CannedHttpClient(Mutex::new(None));
		let outcome = run(client, "  ").await;

		assert!(matches!(outcome, RefreshOutcome::Abort(RefreshAbort::MissingRefreshToken)));
	}

	#[tokio::test]
	async fn soft_failures_are_classified() {
		let cases = [
			(CannedHttpClient::responding(200, ""), "empty_response"),
			(CannedHttpClient::responding(200, "null"), "empty_response"),
			(
				CannedHttpClient::responding(200, r#"{"success":false,"message":"expired"}"#),
				"rejected",
			),
			(CannedHttpClient::responding(200, r#"{"success":true,"data":null}"#), "missing_payload"),
			(
				CannedHttpClient::responding(200, r#"{"success":true,"data":{"userId":"42"}}"#),
				"incomplete_payload",
			),
			(CannedHttpClient::responding(500, "oops"), "http_status"),
			(CannedHttpClient::responding(200, r#"{"success":"yes"}"#), "malformed"),
		];

		for (client, label) in cases {
			let outcome = run(client, "refresh-1").await;

			assert!(matches!(outcome, RefreshOutcome::NoNewToken(_)), "{label}: {outcome:?}");
			assert_eq!(outcome.label(), label);
		}
	}

	#[tokio::test]
	async fn transport_failures_do_not_escape() {
		let timeout = std::io::Error::new(std::io::ErrorKind::TimedOut, "elapsed");
		let outcome = run(CannedHttpClient::failing(TransportError::timed_out(timeout)), "r").await;

		assert_eq!(outcome.label(), "cancelled");

		let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
		let outcome = run(CannedHttpClient::failing(TransportError::network(refused)), "r").await;

		assert_eq!(outcome.label(), "network");
	}

	#[tokio::test]
	async fn success_maps_payload() {
		let body = r#"{
			"success": true,
			"message": null,
			"data": {
				"userId": "42",
				"accessToken": "access-2",
				"refreshToken": "refresh-2",
				"accessTokenExpiry": "2025-06-01T08:05:00Z",
				"refreshTokenExpiry": "2025-06-08T08:00:00Z"
			}
		}"#;
		let record = run(CannedHttpClient::responding(200, body), "refresh-1")
			.await
			.into_record()
			.expect("Complete payload should refresh.");

		assert_eq!(record.access_token.expose(), "access-2");
		assert_eq!(record.refresh_token.expose(), "refresh-2");
	}
}
