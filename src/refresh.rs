//! Refresh-token exchange against the upstream auth service.
//!
//! Every refresher reports through [`RefreshOutcome`]: a new record, a soft
//! [`RefreshFailure`] meaning "no new token", or a [`RefreshAbort`] raised before any
//! network traffic because the local state cannot be used. None of them is an `Err`; the
//! token store pattern-matches the outcome and never sees a panic or error from this path.

mod client;

pub use client::HttpTokenRefresher;

// self
use crate::{
	_prelude::*,
	auth::{TokenRecord, TokenRecordBuilderError, TokenSecret, UserId},
	error::TransportError,
};

/// Boxed future returned by [`TokenRefresher::refresh`].
pub type RefreshFuture<'a> = Pin<Box<dyn Future<Output = RefreshOutcome> + 'a + Send>>;

/// Exchanges a refresh token for a new access/refresh pair.
pub trait TokenRefresher
where
	Self: Send + Sync,
{
	/// Attempts the exchange for `user_id`.
	fn refresh<'a>(&'a self, user_id: &'a UserId, refresh_token: &'a TokenSecret)
	-> RefreshFuture<'a>;
}

/// Result of a single refresh attempt.
#[derive(Debug)]
pub enum RefreshOutcome {
	/// Upstream issued a new credential pair.
	Refreshed(TokenRecord),
	/// Upstream did not produce a usable token; the cached record is dead.
	NoNewToken(RefreshFailure),
	/// The attempt was refused locally before calling upstream.
	Abort(RefreshAbort),
}
impl RefreshOutcome {
	/// Returns the new record, if any.
	pub fn into_record(self) -> Option<TokenRecord> {
		match self {
			Self::Refreshed(record) => Some(record),
			Self::NoNewToken(_) | Self::Abort(_) => None,
		}
	}

	/// Stable label for logs and metrics.
	pub fn label(&self) -> &'static str {
		match self {
			Self::Refreshed(_) => "refreshed",
			Self::NoNewToken(failure) => failure.label(),
			Self::Abort(_) => "aborted",
		}
	}
}

/// Local precondition failures detected before any upstream call.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshAbort {
	/// The cached record carries an empty refresh token.
	#[error("Cached token record is missing a refresh token.")]
	MissingRefreshToken,
}

/// Reasons an upstream exchange yielded no new token.
#[derive(Debug, ThisError)]
pub enum RefreshFailure {
	/// Upstream answered with an empty body or a JSON `null`.
	#[error("Refresh endpoint returned an empty response.")]
	EmptyResponse,
	/// Upstream set `success: false`.
	#[error("Refresh endpoint rejected the request: {}.", .message.as_deref().unwrap_or("no message"))]
	Rejected {
		/// Upstream-supplied explanation, if any.
		message: Option<String>,
	},
	/// Upstream answered without a `data` payload.
	#[error("Refresh response carried no payload.")]
	MissingPayload,
	/// A required payload field was absent or blank.
	#[error("Refresh payload is missing `{field}`.")]
	IncompletePayload {
		/// Wire name of the missing field.
		field: &'static str,
	},
	/// The payload could not form a valid record (e.g. expiry ordering).
	#[error("Refresh payload does not describe a valid token record.")]
	InvalidRecord(#[source] TokenRecordBuilderError),
	/// Upstream answered with a non-success HTTP status.
	#[error("Refresh endpoint responded with HTTP {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
	},
	/// The request body could not be encoded.
	#[error("Refresh request could not be encoded.")]
	Encode(#[source] serde_json::Error),
	/// The response body was not the expected JSON shape.
	#[error("Refresh endpoint returned malformed JSON.")]
	Malformed(#[source] serde_path_to_error::Error<serde_json::Error>),
	/// The request was abandoned before upstream answered.
	#[error("Refresh request was cancelled.")]
	Cancelled(#[source] TransportError),
	/// The transport failed to deliver the request or read the response.
	#[error("Refresh request failed in transport.")]
	Network(#[source] TransportError),
}
impl RefreshFailure {
	/// Stable label for logs and metrics.
	pub fn label(&self) -> &'static str {
		match self {
			Self::EmptyResponse => "empty_response",
			Self::Rejected { .. } => "rejected",
			Self::MissingPayload => "missing_payload",
			Self::IncompletePayload { .. } => "incomplete_payload",
			Self::InvalidRecord(_) => "invalid_record",
			Self::Status { .. } => "http_status",
			Self::Encode(_) => "encode",
			Self::Malformed(_) => "malformed",
			Self::Cancelled(_) => "cancelled",
			Self::Network(_) => "network",
		}
	}
}
impl From<TransportError> for RefreshFailure {
	fn from(e: TransportError) -> Self {
		if e.is_cancellation() { Self::Cancelled(e) } else { Self::Network(e) }
	}
}

/// Body POSTed to the upstream refresh endpoint.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest<'a> {
	/// User whose pair is being renewed.
	pub user_id: &'a str,
	/// Refresh token being exchanged.
	pub refresh_token: &'a str,
}
impl Debug for RefreshTokenRequest<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshTokenRequest")
			.field("user_id", &self.user_id)
			.field("refresh_token", &"<redacted>")
			.finish()
	}
}

/// Envelope returned by the upstream refresh endpoint.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
	/// Explicit success flag; only `Some(false)` counts as a rejection.
	#[serde(default)]
	pub success: Option<bool>,
	/// Optional human-readable message.
	#[serde(default)]
	pub message: Option<String>,
	/// Token payload, absent on failure.
	#[serde(default)]
	pub data: Option<RefreshTokenPayload>,
}

/// Token payload inside [`RefreshTokenResponse`]; every field is required for success.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenPayload {
	/// Owner of the new pair.
	#[serde(default)]
	pub user_id: Option<String>,
	/// New access token.
	#[serde(default)]
	pub access_token: Option<String>,
	/// New (possibly rotated) refresh token.
	#[serde(default)]
	pub refresh_token: Option<String>,
	/// Absolute access-token expiry.
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub access_token_expiry: Option<OffsetDateTime>,
	/// Absolute refresh-token expiry.
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub refresh_token_expiry: Option<OffsetDateTime>,
}
impl RefreshTokenPayload {
	/// Maps the payload 1:1 into a validated [`TokenRecord`].
	pub fn into_record(self) -> Result<TokenRecord, RefreshFailure> {
		fn present(value: Option<String>, field: &'static str) -> Result<String, RefreshFailure> {
			value
				.filter(|v| !v.trim().is_empty())
				.ok_or(RefreshFailure::IncompletePayload { field })
		}

		let user_id = present(self.user_id, "userId")?;
		let access_token = present(self.access_token, "accessToken")?;
		let refresh_token = present(self.refresh_token, "refreshToken")?;
		let access_expiry = self
			.access_token_expiry
			.ok_or(RefreshFailure::IncompletePayload { field: "accessTokenExpiry" })?;
		let refresh_expiry = self
			.refresh_token_expiry
			.ok_or(RefreshFailure::IncompletePayload { field: "refreshTokenExpiry" })?;
		let user_id =
			UserId::new(user_id).map_err(|_| RefreshFailure::IncompletePayload { field: "userId" })?;

		TokenRecord::builder(user_id)
			.access_token(access_token)
			.refresh_token(refresh_token)
			.access_token_expires_at(access_expiry)
			.refresh_token_expires_at(refresh_expiry)
			.build()
			.map_err(RefreshFailure::InvalidRecord)
	}
}
impl Debug for RefreshTokenPayload {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshTokenPayload")
			.field("user_id", &self.user_id)
			.field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("access_token_expiry", &self.access_token_expiry)
			.field("refresh_token_expiry", &self.refresh_token_expiry)
			.finish()
	}
}
