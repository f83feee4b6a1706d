//! Registry of in-flight GET requests.

// crates.io
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
// self
use crate::{_prelude::*, dispatch::ApiResponse};

pub(crate) type SharedResponse = Shared<BoxFuture<'static, Result<ApiResponse>>>;

struct PendingEntry {
	id: u64,
	future: WeakShared<BoxFuture<'static, Result<ApiResponse>>>,
}

#[derive(Default)]
struct RegistryState {
	next_id: u64,
	entries: HashMap<String, PendingEntry>,
}

/// Tracks identical in-flight requests so concurrent callers share one upstream call.
///
/// An entry exists only while its request is running. It is removed when the request settles,
/// on success and on failure alike, or when every caller has given up on it, so a later identical
/// request always starts fresh. The registry only holds weak handles; callers own the request.
#[derive(Clone, Default)]
pub struct PendingRegistry {
	state: Arc<Mutex<RegistryState>>,
}
impl PendingRegistry {
	/// Number of requests currently in flight.
	pub fn len(&self) -> usize {
		self.state.lock().entries.len()
	}

	/// Returns `true` when nothing is in flight.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Returns `true` when a request with `key` is in flight.
	pub fn contains(&self, key: &str) -> bool {
		self.state.lock().entries.contains_key(key)
	}

	/// Joins the in-flight request for `key`, or registers the one produced by `start`.
	pub(crate) fn join_or_start<F>(&self, key: String, start: F) -> SharedResponse
	where
		F: FnOnce() -> BoxFuture<'static, Result<ApiResponse>>,
	{
		let mut state = self.state.lock();

		if let Some(future) = state.entries.get(&key).and_then(|entry| entry.future.upgrade()) {
			tracing::debug!(%key, "Joining in-flight request.");

			return future;
		}

		state.next_id += 1;

		let id = state.next_id;
		let guard = PendingGuard { registry: self.clone(), key: key.clone(), id };
		let request = start();
		let future = async move {
			let _guard = guard;

			request.await
		}
		.boxed()
		.shared();
		let Some(weak) = future.downgrade() else {
			return future;
		};

		state.entries.insert(key, PendingEntry { id, future: weak });

		future
	}
}
impl Debug for PendingRegistry {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PendingRegistry").field("in_flight", &self.len()).finish()
	}
}

/// Removes its registry entry when the request it belongs to settles or its last caller drops it.
struct PendingGuard {
	registry: PendingRegistry,
	key: String,
	id: u64,
}
impl Drop for PendingGuard {
	fn drop(&mut self) {
		let removed = {
			let mut state = self.registry.state.lock();

			// A newer request may already own the key.
			if state.entries.get(&self.key).is_some_and(|entry| entry.id == self.id) {
				state.entries.remove(&self.key)
			} else {
				None
			}
		};

		drop(removed);
	}
}
