//! Caller identity carried by the BFF's authentication cookie.

// self
use crate::{_prelude::*, auth::UserId};

/// Claim type holding the stable user identifier.
pub const NAME_IDENTIFIER_CLAIM: &str = "nameidentifier";

/// Claims-based identity of the current caller.
///
/// A principal is authenticated once it carries at least one claim; the token store only
/// cares about [`NAME_IDENTIFIER_CLAIM`], which must parse as a [`UserId`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
	claims: BTreeMap<String, String>,
}
impl Principal {
	/// Unauthenticated caller without claims.
	pub fn anonymous() -> Self {
		Self::default()
	}

	/// Authenticated caller identified by `user_id`.
	pub fn authenticated(user_id: &UserId) -> Self {
		Self::anonymous().with_claim(NAME_IDENTIFIER_CLAIM, user_id.as_ref())
	}

	/// Adds or replaces a claim.
	pub fn with_claim(mut self, kind: impl Into<String>, value: impl Into<String>) -> Self {
		self.claims.insert(kind.into(), value.into());

		self
	}

	/// Returns the raw claim value, if present.
	pub fn claim(&self, kind: &str) -> Option<&str> {
		self.claims.get(kind).map(String::as_str)
	}

	/// Returns `true` when the caller went through an authentication handshake.
	pub fn is_authenticated(&self) -> bool {
		!self.claims.is_empty()
	}

	/// Resolves the stable user identifier; malformed values count as absent.
	pub fn user_id(&self) -> Option<UserId> {
		self.claim(NAME_IDENTIFIER_CLAIM).and_then(|value| UserId::new(value).ok())
	}
}
