//! Cooperative cancellation for the playback thread.

use std::sync::Arc;
use std::time::Duration;
use parking_lot::{Condvar, Mutex};

/// Multi-threaded cancellation flag using a condition variable.
///
/// Clones share the same flag. Once [`cancel`](CancellationToken::cancel) has been called, every
/// current and future [`wait_timeout`](CancellationToken::wait_timeout) returns immediately; the
/// token cannot be reset.
///
/// # Examples
/// ```ignore
/// let token = CancellationToken::new();
/// let worker = token.clone();
/// let handle = thread::spawn(move || {
/// 	while !worker.wait_timeout(Duration::from_millis(100)) {
/// 		// Do some work
/// 	}
/// });
///
/// token.cancel();
/// handle.join().unwrap();
/// ```
#[derive(Clone, Default)]
pub struct CancellationToken {
	inner: Arc<Inner>
}

#[derive(Default)]
struct Inner {
	/// `true` once cancelled.
	cancelled: Mutex<bool>,
	cond: Condvar
}

impl CancellationToken {
	/// Create a token that is not cancelled.
	pub fn new() -> CancellationToken {
		Default::default()
	}

	/// Request cancellation and wake every waiter.
	pub fn cancel(&self) {
		let mut cancelled = self.inner.cancelled.lock();
		*cancelled = true;
		self.inner.cond.notify_all();
	}

	/// Whether cancellation has been requested.
	pub fn is_cancelled(&self) -> bool {
		*self.inner.cancelled.lock()
	}

	/// Block for up to `timeout`, returning early if cancelled.
	///
	/// Returns `true` if the token is cancelled.
	pub fn wait_timeout(&self, timeout: Duration) -> bool {
		let mut cancelled = self.inner.cancelled.lock();
		if !*cancelled {
			self.inner.cond.wait_while_for(&mut cancelled, |c| !*c, timeout);
		}
		*cancelled
	}
}

#[cfg(test)]
mod tests {
	use std::thread;
	use std::time::Instant;
	use super::*;

	#[test]
	fn timeout_test() {
		let token = CancellationToken::new();
		let start = Instant::now();
		assert!(!token.wait_timeout(Duration::from_millis(20)));
		assert!(start.elapsed() >= Duration::from_millis(20));
		assert!(!token.is_cancelled());
	}

	#[test]
	fn cancel_test() {
		let token = CancellationToken::new();
		let worker = token.clone();
		let handle = thread::spawn(move || {
			let start = Instant::now();
			let cancelled = worker.wait_timeout(Duration::from_secs(10));
			(cancelled, start.elapsed())
		});

		thread::sleep(Duration::from_millis(20));
		token.cancel();
		let (cancelled, elapsed) = handle.join().unwrap();
		assert!(cancelled);
		assert!(elapsed < Duration::from_secs(5));

		// Stays cancelled
		assert!(token.is_cancelled());
		assert!(token.wait_timeout(Duration::from_secs(10)));
	}
}
