//! Per-user refresh locks owned by a token store instance.

// crates.io
use async_lock::MutexGuardArc;
// self
use crate::{_prelude::*, auth::UserId};

type LockTable = Arc<Mutex<HashMap<UserId, LockSlot>>>;

#[derive(Debug)]
struct LockSlot {
	lock: Arc<AsyncMutex<()>>,
	// Guards (holding or waiting) referencing this slot.
	interested: usize,
}

/// Keyed registry of async mutexes serializing refreshes per user.
///
/// Entries are created lazily and evicted as soon as the last holder or waiter for a user
/// releases its guard, so the table only ever holds users with a refresh in flight.
#[derive(Clone, Debug, Default)]
pub struct RefreshLocks {
	table: LockTable,
}
impl RefreshLocks {
	/// Waits until the caller owns `user_id`'s refresh lock.
	pub async fn acquire(&self, user_id: &UserId) -> RefreshLockGuard {
		let lock = {
			let mut table = self.table.lock();
			let slot = table
				.entry(user_id.clone())
				.or_insert_with(|| LockSlot { lock: Arc::new(AsyncMutex::new(())), interested: 0 });

			slot.interested += 1;
			slot.lock.clone()
		};
		// Registered before awaiting so a dropped future still runs eviction.
		let mut guard =
			RefreshLockGuard { table: self.table.clone(), user_id: user_id.clone(), held: None };

		guard.held = Some(lock.lock_arc().await);

		guard
	}

	/// Number of users with a live lock entry.
	pub fn len(&self) -> usize {
		self.table.lock().len()
	}

	/// Returns `true` when no user holds or waits on a lock.
	pub fn is_empty(&self) -> bool {
		self.table.lock().is_empty()
	}
}

/// RAII guard returned by [`RefreshLocks::acquire`]; releases and evicts on drop.
pub struct RefreshLockGuard {
	table: LockTable,
	user_id: UserId,
	held: Option<MutexGuardArc<()>>,
}
impl Drop for RefreshLockGuard {
	fn drop(&mut self) {
		self.held.take();

		let mut table = self.table.lock();
		let evict = match table.get_mut(&self.user_id) {
			Some(slot) => {
				slot.interested = slot.interested.saturating_sub(1);

				slot.interested == 0
			},
			None => false,
		};

		if evict {
			table.remove(&self.user_id);
		}
	}
}
impl Debug for RefreshLockGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshLockGuard")
			.field("user_id", &self.user_id)
			.field("held", &self.held.is_some())
			.finish()
	}
}
