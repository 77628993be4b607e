//! Transport primitives for upstream refresh calls.
//!
//! [`TokenHttpClient`] is the relay's only dependency on an HTTP stack. The default
//! [`ReqwestHttpClient`] is enabled by the `reqwest` feature; tests and custom deployments
//! can plug in any transport that can POST a JSON body and hand back the status and bytes.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
#[cfg(feature = "reqwest")] use reqwest::header::{ACCEPT, CONTENT_TYPE};
// self
use crate::{_prelude::*, error::TransportError};

/// Boxed future returned by [`TokenHttpClient::post_json`].
pub type HttpFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of executing upstream refresh calls.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// POSTs `body` as `application/json` to `url`.
	///
	/// Any HTTP status counts as a response; only failures to obtain one are errors.
	fn post_json<'a>(&'a self, url: &'a Url, body: Vec<u8>) -> HttpFuture<'a>;
}

/// Raw upstream response handed back to the refresher.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response body bytes.
	pub body: Vec<u8>,
}
impl HttpResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// Thin wrapper around [`ReqwestClient`] applying a per-request timeout.
///
/// Elapsed timeouts surface as [`TransportError::TimedOut`] so callers can tell an
/// abandoned request apart from a broken network path.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestHttpClient {
	client: ReqwestClient,
	timeout: std::time::Duration,
}
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self { client, timeout: Self::DEFAULT_TIMEOUT }
	}

	/// Overrides the per-request timeout (defaults to 10 seconds).
	pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
		self.timeout = timeout;

		self
	}
}
#[cfg(feature = "reqwest")]
impl Default for ReqwestHttpClient {
	fn default() -> Self {
		Self::with_client(ReqwestClient::default())
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.client
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.client
	}
}
#[cfg(feature = "reqwest")]
impl TokenHttpClient for ReqwestHttpClient {
	fn post_json<'a>(&'a self, url: &'a Url, body: Vec<u8>) -> HttpFuture<'a> {
		Box::pin(async move {
			let response = self
				.client
				.post(url.clone())
				.header(CONTENT_TYPE, "application/json")
				.header(ACCEPT, "application/json")
				.timeout(self.timeout)
				.body(body)
				.send()
				.await?;
			let status = response.status().as_u16();
			let body = response.bytes().await?.to_vec();

			Ok(HttpResponse { status, body })
		})
	}
}
