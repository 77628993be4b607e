//! Per-user token record, freshness helpers, and its validating builder.

// self
use crate::{
	_prelude::*,
	auth::{UserId, token::secret::TokenSecret},
};

/// Errors produced by [`TokenRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenRecordBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when the access-token expiry was not configured.
	#[error("Access token expiry is required.")]
	MissingAccessExpiry,
	/// Issued when the refresh-token expiry was not configured.
	#[error("Refresh token expiry is required.")]
	MissingRefreshExpiry,
	/// Issued when the refresh token would expire before the access token it renews.
	#[error("Access token must not outlive its refresh token.")]
	ExpiryOrder,
}

/// One user's current credential pair.
///
/// Records are created on login or refresh, overwritten in place on every successful
/// refresh, and deleted on logout, refresh failure, or upstream invalidation.
/// `access_token_expires_at <= refresh_token_expires_at` always holds for records produced
/// by [`TokenRecordBuilder`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
	/// Owner of the credential pair.
	pub user_id: UserId,
	/// Short-lived bearer credential; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Longer-lived credential used solely to obtain a new access token.
	///
	/// May be empty when login supplied none; the next refresh then aborts locally.
	pub refresh_token: TokenSecret,
	/// Absolute expiry of the access token.
	#[serde(with = "time::serde::rfc3339")]
	pub access_token_expires_at: OffsetDateTime,
	/// Absolute expiry of the refresh token.
	#[serde(with = "time::serde::rfc3339")]
	pub refresh_token_expires_at: OffsetDateTime,
}
impl TokenRecord {
	/// Returns a builder for constructing validated records.
	pub fn builder(user_id: UserId) -> TokenRecordBuilder {
		TokenRecordBuilder::new(user_id)
	}

	/// Returns `true` if the access token stays valid for at least `buffer` after `now`.
	pub fn is_fresh_at(&self, now: OffsetDateTime, buffer: Duration) -> bool {
		now + buffer <= self.access_token_expires_at
	}

	/// Time left on the refresh token at `now`; negative once it has expired.
	pub fn refresh_ttl_at(&self, now: OffsetDateTime) -> Duration {
		self.refresh_token_expires_at - now
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("user_id", &self.user_id)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("access_token_expires_at", &self.access_token_expires_at)
			.field("refresh_token_expires_at", &self.refresh_token_expires_at)
			.finish()
	}
}

/// Builder for [`TokenRecord`].
#[derive(Clone, Debug)]
pub struct TokenRecordBuilder {
	user_id: UserId,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	access_token_expires_at: Option<OffsetDateTime>,
	refresh_token_expires_at: Option<OffsetDateTime>,
}
impl TokenRecordBuilder {
	fn new(user_id: UserId) -> Self {
		Self {
			user_id,
			access_token: None,
			refresh_token: None,
			access_token_expires_at: None,
			refresh_token_expires_at: None,
		}
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value; omitting it stores an empty token.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the absolute access-token expiry.
	pub fn access_token_expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.access_token_expires_at = Some(instant);

		self
	}

	/// Sets the absolute refresh-token expiry.
	pub fn refresh_token_expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.refresh_token_expires_at = Some(instant);

		self
	}

	/// Consumes the builder and produces a [`TokenRecord`].
	pub fn build(self) -> Result<TokenRecord, TokenRecordBuilderError> {
		let access_token = self
			.access_token
			.filter(|secret| !secret.is_blank())
			.ok_or(TokenRecordBuilderError::MissingAccessToken)?;
		let refresh_token = self.refresh_token.unwrap_or_else(|| TokenSecret::new(String::new()));
		let access_token_expires_at =
			self.access_token_expires_at.ok_or(TokenRecordBuilderError::MissingAccessExpiry)?;
		let refresh_token_expires_at =
			self.refresh_token_expires_at.ok_or(TokenRecordBuilderError::MissingRefreshExpiry)?;

		if access_token_expires_at > refresh_token_expires_at {
			return Err(TokenRecordBuilderError::ExpiryOrder);
		}

		Ok(TokenRecord {
			user_id: self.user_id,
			access_token,
			refresh_token,
			access_token_expires_at,
			refresh_token_expires_at,
		})
	}
}
