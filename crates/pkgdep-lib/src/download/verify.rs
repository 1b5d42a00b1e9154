//! Streams a candidate artifact through SHA-256 and compares it to the published digest.

use futures_util::TryStreamExt;
use sha2::{Digest, Sha256};

use crate::fetcher::{FetchError, HttpClient};
use crate::Fetcher;

/// Result of checking one URL against an expected digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
	Match,
	Mismatch { actual: String },
	/// The artifact could not be read completely.
	Unavailable(FetchError),
}

/// Compares hex digests ignoring case and surrounding whitespace.
pub fn digest_matches(actual: &str, expected: &str) -> bool {
	actual.trim().eq_ignore_ascii_case(expected.trim())
}

/// Incremental SHA-256 over a byte stream.
#[derive(Default)]
pub struct StreamHasher {
	hasher: Sha256,
	len: u64,
}

impl StreamHasher {
	pub fn update(&mut self, chunk: &[u8]) {
		self.hasher.update(chunk);
		self.len += chunk.len() as u64;
	}

	pub fn len(&self) -> u64 {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Lowercase hex digest.
	pub fn finish(self) -> String {
		hex::encode(self.hasher.finalize())
	}
}

pub struct Verifier<'a, C> {
	fetcher: &'a Fetcher<C>,
}

impl<'a, C: HttpClient> Verifier<'a, C> {
	pub fn new(fetcher: &'a Fetcher<C>) -> Self {
		Self { fetcher }
	}

	/// Whether the artifact at `url` hashes to `expected`. Never retried on mismatch.
	pub async fn verify(&self, url: &str, expected: &str) -> bool {
		matches!(self.check(url, expected).await, Verification::Match)
	}

	/// Hashes the artifact at `url` without holding it in memory.
	pub async fn check(&self, url: &str, expected: &str) -> Verification {
		let mut body = match self.fetcher.fetch_stream(url).await {
			Ok(body) => body,
			Err(e) => {
				log::warn!("Could not fetch {} for verification: {}", url, e);
				return Verification::Unavailable(e);
			},
		};

		let cancel = self.fetcher.cancel_token();
		let mut hasher = StreamHasher::default();
		loop {
			let chunk = tokio::select! {
				_ = cancel.cancelled() => return Verification::Unavailable(FetchError::Cancelled),
				chunk = body.try_next() => chunk,
			};
			match chunk {
				Ok(Some(chunk)) => hasher.update(&chunk),
				Ok(None) => break,
				Err(source) => {
					log::warn!("Stream of {} broke during verification: {}", url, source);
					return Verification::Unavailable(FetchError::Transport { url: url.to_string(), source });
				},
			}
		}

		let actual = hasher.finish();
		if digest_matches(&actual, expected) {
			log::info!("Hashes match for {}", url);
			Verification::Match
		} else {
			log::warn!("Hashes do not match for {}: expected {}, got {}", url, expected.trim(), actual);
			Verification::Mismatch { actual }
		}
	}
}
