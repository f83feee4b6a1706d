//! Single-slot TTL cache shared by the token manager and the session cookie client.
//!
//! The slot holds at most one `(key, value)` pair. Writing a new pair replaces the previous one
//! wholesale; reading a different key, or reading after expiry, is a miss. Expired entries are
//! cleared on read. Misses are normal return values, never errors.

// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
};

#[derive(Clone, Debug)]
struct Entry<K, V> {
	key: K,
	value: V,
	expires_at: OffsetDateTime,
}

/// Single-slot store with an explicit expiry instant.
pub struct TtlCache<K, V> {
	slot: Mutex<Option<Entry<K, V>>>,
	clock: Arc<dyn Clock>,
}
impl<K, V> TtlCache<K, V>
where
	K: PartialEq,
	V: Clone,
{
	/// Creates an empty cache driven by `clock`.
	pub fn new(clock: Arc<dyn Clock>) -> Self {
		Self { slot: Mutex::new(None), clock }
	}

	/// Returns the cached value for `key` unless it is absent or expired.
	///
	/// An expired entry is cleared as a side effect.
	pub fn get(&self, key: &K) -> Option<V> {
		let now = self.clock.now();
		let mut slot = self.slot.lock();
		let entry = slot.as_ref().filter(|entry| entry.key == *key)?;

		if now < entry.expires_at {
			return Some(entry.value.clone());
		}

		tracing::debug!(expired_at = %entry.expires_at, "Cache entry expired.");

		*slot = None;

		None
	}

	/// Stores `value` under `key` for `ttl`, replacing whatever the slot held.
	///
	/// Returns the computed expiry instant.
	pub fn set(&self, key: K, value: V, ttl: Duration) -> OffsetDateTime {
		let expires_at = expiry_after(self.clock.now(), ttl);

		self.set_until(key, value, expires_at);

		expires_at
	}

	/// Stores `value` under `key` until the absolute instant `expires_at`.
	pub fn set_until(&self, key: K, value: V, expires_at: OffsetDateTime) {
		*self.slot.lock() = Some(Entry { key, value, expires_at });
	}

	/// Clears the slot if it holds `key`.
	pub fn invalidate(&self, key: &K) {
		let mut slot = self.slot.lock();

		if slot.as_ref().is_some_and(|entry| entry.key == *key) {
			*slot = None;
		}
	}

	/// Clears the slot unconditionally.
	pub fn reset(&self) {
		*self.slot.lock() = None;
	}

	/// Expiry instant of the live entry for `key`.
	pub fn expires_at(&self, key: &K) -> Option<OffsetDateTime> {
		let now = self.clock.now();

		self.slot
			.lock()
			.as_ref()
			.filter(|entry| entry.key == *key && now < entry.expires_at)
			.map(|entry| entry.expires_at)
	}

	/// Time left before the entry for `key` expires.
	pub fn remaining(&self, key: &K) -> Option<Duration> {
		self.expires_at(key).map(|at| at - self.clock.now())
	}

	/// Returns the clock driving this cache.
	pub fn clock(&self) -> &Arc<dyn Clock> {
		&self.clock
	}
}
impl<K, V> Default for TtlCache<K, V>
where
	K: PartialEq,
	V: Clone,
{
	fn default() -> Self {
		Self::new(Arc::new(SystemClock))
	}
}
impl<K, V> Debug for TtlCache<K, V> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let expires_at = self.slot.lock().as_ref().map(|entry| entry.expires_at);

		f.debug_struct("TtlCache").field("expires_at", &expires_at).finish()
	}
}

/// Returns `start + ttl`, saturating at the latest representable instant.
pub fn expiry_after(start: OffsetDateTime, ttl: Duration) -> OffsetDateTime {
	start.checked_add(ttl).unwrap_or(FAR_FUTURE)
}

const FAR_FUTURE: OffsetDateTime = time::macros::datetime!(9999-12-31 23:59:59 UTC);
