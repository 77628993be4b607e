//! Backend-for-frontend token relay: per-user token caching, singleflight refresh, and
//! 401-driven resynchronization for cookie-authenticated web tiers.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod bff;
pub mod cache;
pub mod clock;
pub mod error;
pub mod http;
pub mod intercept;
pub mod obs;
pub mod refresh;
pub mod sse;
pub mod store;
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and fixtures shared by unit and integration tests.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{TokenRecord, UserId},
		cache::{MemoryCache, TokenCache},
		clock::{Clock, ManualClock},
		refresh::TokenRefresher,
		store::{TokenStoreConfig, UserTokenStore},
	};

	/// Fixed instant every test clock starts from.
	pub const TEST_EPOCH: OffsetDateTime = time::macros::datetime!(2025-06-01 08:00 UTC);

	/// Parses a user identifier fixture.
	pub fn test_user(value: &str) -> UserId {
		UserId::new(value).expect("User identifier fixture should be valid.")
	}

	/// Builds a record for `user` whose tokens expire relative to `issued_at`.
	pub fn test_record(
		user: &str,
		access: &str,
		refresh: &str,
		issued_at: OffsetDateTime,
		access_ttl: Duration,
		refresh_ttl: Duration,
	) -> TokenRecord {
		TokenRecord::builder(test_user(user))
			.access_token(access)
			.refresh_token(refresh)
			.access_token_expires_at(issued_at + access_ttl)
			.refresh_token_expires_at(issued_at + refresh_ttl)
			.build()
			.expect("Token record fixture should build successfully.")
	}

	/// Constructs a [`UserTokenStore`] over a fresh [`MemoryCache`] driven by a manual clock.
	pub fn build_memory_token_store(
		refresher: Arc<dyn TokenRefresher>,
		config: TokenStoreConfig,
	) -> (UserTokenStore, Arc<MemoryCache>, Arc<ManualClock>) {
		let clock = Arc::new(ManualClock::new(TEST_EPOCH));
		let shared_clock: Arc<dyn Clock> = clock.clone();
		let cache_backend = Arc::new(MemoryCache::with_clock(shared_clock.clone()));
		let cache: Arc<dyn TokenCache> = cache_backend.clone();
		let store = UserTokenStore::new(cache, refresher).with_clock(shared_clock).with_config(config);

		(store, cache_backend, clock)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
