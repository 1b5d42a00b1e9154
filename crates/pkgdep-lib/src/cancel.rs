//! Run-wide cancellation signal.

use std::sync::Arc;

use tokio::sync::watch;

/// A clonable flag shared by everything taking part in a run.
///
/// Once cancelled it stays cancelled. Fetches and retry delays race against
/// [`cancelled()`](CancelToken::cancelled) so they stop promptly.
#[derive(Debug, Clone)]
pub struct CancelToken {
	sender: Arc<watch::Sender<bool>>,
	receiver: watch::Receiver<bool>,
}

impl Default for CancelToken {
	fn default() -> Self {
		Self::new()
	}
}

impl CancelToken {
	pub fn new() -> Self {
		let (sender, receiver) = watch::channel(false);
		Self { sender: Arc::new(sender), receiver }
	}

	pub fn cancel(&self) {
		if !self.sender.send_replace(true) {
			log::info!("Cancellation requested.");
		}
	}

	pub fn is_cancelled(&self) -> bool {
		*self.receiver.borrow()
	}

	/// Completes once [`cancel()`](CancelToken::cancel) has been called on any clone.
	pub async fn cancelled(&self) {
		let mut receiver = self.receiver.clone();
		loop {
			if *receiver.borrow_and_update() {
				return;
			}
			if receiver.changed().await.is_err() {
				/* Every clone holds the sender so this can't happen while `self` lives. */
				std::future::pending::<()>().await;
			}
		}
	}
}
