use tokio::sync::watch;

/// Tracks in-flight project refreshes so that analysis reads can wait for
/// them to settle.
///
/// This is a readers-wait-for-writers barrier, not a lock: refreshes never
/// wait for each other, only [`RefreshBarrier::settled`] waits.
#[derive(Debug)]
pub struct RefreshBarrier {
	in_flight: watch::Sender<usize>,
}

impl Default for RefreshBarrier {
	fn default() -> Self {
		Self::new()
	}
}

impl RefreshBarrier {
	pub fn new() -> Self {
		let (in_flight, _) = watch::channel(0);
		Self { in_flight }
	}

	/// Mark a refresh as started. The refresh ends when the guard is dropped.
	pub fn begin(&self) -> RefreshGuard {
		self.in_flight.send_modify(|count| *count += 1);
		RefreshGuard {
			in_flight: self.in_flight.clone(),
		}
	}

	/// Number of refreshes currently in flight.
	pub fn in_flight(&self) -> usize {
		*self.in_flight.borrow()
	}

	/// Resolve once no refresh is in flight.
	pub async fn settled(&self) {
		let mut receiver = self.in_flight.subscribe();
		// The sender lives in `self`, so the channel cannot close while waiting.
		let _ = receiver.wait_for(|count| *count == 0).await;
	}
}

/// Keeps a refresh marked as in flight until dropped.
#[derive(Debug)]
pub struct RefreshGuard {
	in_flight: watch::Sender<usize>,
}

impl Drop for RefreshGuard {
	fn drop(&mut self) {
		self.in_flight
			.send_modify(|count| *count = count.saturating_sub(1));
	}
}
