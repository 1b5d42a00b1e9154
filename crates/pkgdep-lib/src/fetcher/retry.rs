use std::time::Duration;

use rand::Rng;

/// How many times a request is attempted and how long to wait in between.
///
/// The delay before each retry is the fixed delay plus a uniformly random jitter
/// in `0..=jitter`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
	max_attempts: u32,
	delay_ms: u64,
	jitter_ms: u64,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 10,
			delay_ms: 1000,
			jitter_ms: 1000,
		}
	}
}

impl RetryPolicy {
	pub fn new(max_attempts: u32, delay: Duration, jitter: Duration) -> Self {
		Self {
			max_attempts,
			delay_ms: delay.as_millis() as u64,
			jitter_ms: jitter.as_millis() as u64,
		}
	}

	/// Single attempt, no waiting.
	pub fn no_retry() -> Self {
		Self::new(1, Duration::ZERO, Duration::ZERO)
	}

	/// Total attempts including the first. Never less than 1.
	pub fn max_attempts(&self) -> u32 {
		self.max_attempts.max(1)
	}

	pub fn delay(&self) -> Duration {
		Duration::from_millis(self.delay_ms)
	}

	pub fn jitter(&self) -> Duration {
		Duration::from_millis(self.jitter_ms)
	}

	/// Picks the wait before the next attempt.
	pub fn next_delay(&self) -> Duration {
		let jitter = if self.jitter_ms == 0 {
			0
		} else {
			rand::thread_rng().gen_range(0..=self.jitter_ms)
		};
		Duration::from_millis(self.delay_ms.saturating_add(jitter))
	}
}
