//! Bearer and refresh token strings that never print themselves.

// self
use crate::_prelude::*;

/// Access or refresh token value; `Debug` and `Display` only ever show a placeholder.
///
/// Serializes as the bare string so cached records stay readable by other processes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a token value.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Raw token value; keep it out of logs and error messages.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Empty and whitespace-only values cannot authenticate anything.
	pub fn is_blank(&self) -> bool {
		self.0.trim().is_empty()
	}

	/// `Authorization` header value carrying this token.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.0)
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("TokenSecret(..)")
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn formatting_never_leaks_the_value() {
		let secret = TokenSecret::new("access-xyz");
		let rendered = format!("{secret:?} {secret} {:?}", Some(&secret));

		assert!(!rendered.contains("access-xyz"), "{rendered}");
		assert_eq!(secret.bearer(), "Bearer access-xyz");
	}

	#[test]
	fn whitespace_only_values_are_blank() {
		assert!(TokenSecret::new("").is_blank());
		assert!(TokenSecret::new(" \t").is_blank());
		assert!(!TokenSecret::new("r-1").is_blank());
	}

	#[test]
	fn serializes_as_a_bare_string() {
		let json = serde_json::to_string(&TokenSecret::new("r-1")).expect("Secret should serialize.");

		assert_eq!(json, "\"r-1\"");
	}
}
