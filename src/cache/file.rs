//! File-backed [`TokenCache`] shared by every process that points at the same path.

// std
use std::{
	fs::{self, File, OpenOptions},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};
// crates.io
use fs2::FileExt;
use tempfile::NamedTempFile;
// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	cache::{CacheEntry, EntryOptions, StoreError, StoreFuture, TokenCache},
	clock::{Clock, SystemClock},
};

type Snapshot = HashMap<String, CacheEntry>;

/// Persists cache entries to a JSON snapshot.
///
/// The snapshot is re-read on every operation so several processes on one host observe
/// each other's writes. Every mutation holds an exclusive advisory lock on a sidecar
/// `<path>.lock` file for the whole load, apply, and persist sequence; reads hold it shared.
/// Writers touching different keys therefore never drop each other's entries, while two
/// writers on the same key resolve last-writer-wins.
#[derive(Clone)]
pub struct FileCache {
	path: PathBuf,
	lock_path: PathBuf,
	clock: Arc<dyn Clock>,
}
impl FileCache {
	/// Opens (or creates) a cache at the provided path.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();
		let mut lock_path = path.clone().into_os_string();

		lock_path.push(".lock");

		let cache = Self { path, lock_path: lock_path.into(), clock: Arc::new(SystemClock) };

		Self::ensure_parent_exists(&cache.path)?;

		{
			let _lock = cache.lock(false)?;

			Self::load_snapshot(&cache.path)?;
		}

		Ok(cache)
	}

	/// Replaces the clock used for expirations.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Location of the snapshot on disk.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Location of the sidecar lock file.
	pub fn lock_path(&self) -> &Path {
		&self.lock_path
	}

	// The returned handle releases the lock when dropped.
	fn lock(&self, exclusive: bool) -> Result<File, StoreError> {
		let file = OpenOptions::new()
			.create(true)
			.read(true)
			.write(true)
			.truncate(false)
			.open(&self.lock_path)
			.map_err(|e| StoreError::Backend {
				message: format!("Failed to open {}: {e}", self.lock_path.display()),
			})?;
		let locked = if exclusive { file.lock_exclusive() } else { file.lock_shared() };

		locked.map_err(|e| StoreError::Backend {
			message: format!("Failed to lock {}: {e}", self.lock_path.display()),
		})?;

		Ok(file)
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		let bytes = match fs::read(path) {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
			Err(e) =>
				return Err(StoreError::Backend {
					message: format!("Failed to read {}: {e}", path.display()),
				}),
		};

		if bytes.is_empty() {
			return Ok(HashMap::new());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create cache directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize cache snapshot: {e}"),
			})?;
		let dir = self
			.path
			.parent()
			.filter(|p| !p.as_os_str().is_empty())
			.unwrap_or_else(|| Path::new("."));
		let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::Backend {
			message: format!("Failed to create a temporary file in {}: {e}", dir.display()),
		})?;

		tmp.write_all(&serialized).map_err(|e| StoreError::Backend {
			message: format!("Failed to write {}: {e}", tmp.path().display()),
		})?;
		tmp.as_file().sync_all().map_err(|e| StoreError::Backend {
			message: format!("Failed to sync {}: {e}", tmp.path().display()),
		})?;
		tmp.persist(&self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {}", self.path.display(), e.error),
		})?;

		Ok(())
	}

	fn mutate(&self, apply: impl FnOnce(&mut Snapshot)) -> Result<(), StoreError> {
		let _lock = self.lock(true)?;
		let now = self.clock.now();
		let mut snapshot = Self::load_snapshot(&self.path)?;

		snapshot.retain(|_, entry| entry.is_live_at(now));
		apply(&mut snapshot);

		self.persist(&snapshot)
	}
}
impl Debug for FileCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FileCache").field("path", &self.path).finish()
	}
}
impl TokenCache for FileCache {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<TokenRecord>> {
		Box::pin(async move {
			let snapshot = {
				let _lock = self.lock(false)?;

				Self::load_snapshot(&self.path)?
			};
			let now = self.clock.now();

			Ok(snapshot.get(key).filter(|entry| entry.is_live_at(now)).map(|entry| entry.record.clone()))
		})
	}

	fn set(&self, key: String, record: TokenRecord, options: EntryOptions) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let entry = CacheEntry::new(record, self.clock.now(), options.expiration);

			self.mutate(|snapshot| {
				snapshot.insert(key, entry);
			})
		})
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.mutate(|snapshot| {
				snapshot.remove(key);
			})
		})
	}
}
