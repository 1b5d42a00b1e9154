//! HTTP GET with bounded retries.
//!
//! The transport is behind the [`HttpClient`] trait so the resolver and download pipeline
//! can be driven by an in-memory index in tests. [`Fetcher`] adds the retry policy,
//! outcome classification and cancellation on top of any client.

use std::future::Future;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, TryStreamExt};
pub use reqwest::Url;

use crate::CancelToken;

mod retry;
pub use retry::RetryPolicy;

mod reqwest_client;
pub use reqwest_client::ReqwestClient;

/// Chunked response body.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Status and body of a single GET.
pub struct HttpResponse {
	pub status: u16,
	pub body: BodyStream,
}

impl std::fmt::Debug for HttpResponse {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HttpResponse").field("status", &self.status).finish_non_exhaustive()
	}
}

/// Minimal transport needed by [`Fetcher`].
///
/// Implementations return any response they receive, including error statuses.
/// Classifying statuses is left to the fetcher.
pub trait HttpClient: Send + Sync {
	fn get(&self, url: &Url) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
	/// Could not reach the host.
	Connect,
	Timeout,
	/// The connection dropped while reading the body.
	Body,
	/// Anything else about building or sending the request.
	Request,
}

/// A single request failed below the HTTP status level.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?} error: {message}")]
pub struct TransportError {
	kind: TransportErrorKind,
	message: String,
}

impl TransportError {
	pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
		Self { kind, message: message.into() }
	}

	/// Timeouts and dropped bodies are worth another attempt, refused connections and bad requests are not.
	pub fn is_retryable(&self) -> bool {
		matches!(self.kind, TransportErrorKind::Timeout | TransportErrorKind::Body)
	}
}

/// A fetch that could not produce a successful response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
	#[error("invalid URL \"{url}\": {reason}")]
	InvalidUrl { url: String, reason: String },
	/// Failed in a way retrying won't fix.
	#[error("request to {url} failed: {source}")]
	Transport { url: String, source: TransportError },
	/// Every attempt allowed by the retry policy failed.
	#[error("giving up on {url} after {attempts} attempts, last error: {last}")]
	Exhausted { url: String, attempts: u32, last: String },
	#[error("fetch cancelled")]
	Cancelled,
}

/// Whether a response body is read into memory before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
	Buffered,
	Streaming,
}

/// A successful (2xx) response.
pub enum ResponseHandle {
	Buffered(Bytes),
	Streaming(BodyStream),
}

impl ResponseHandle {
	/// Reads the whole body, draining the stream if needed.
	pub async fn bytes(self) -> Result<Bytes, TransportError> {
		match self {
			ResponseHandle::Buffered(bytes) => Ok(bytes),
			ResponseHandle::Streaming(body) => collect_body(body).await,
		}
	}

	pub fn into_stream(self) -> BodyStream {
		match self {
			ResponseHandle::Buffered(bytes) => Box::pin(futures_util::stream::once(async move { Ok(bytes) })),
			ResponseHandle::Streaming(body) => body,
		}
	}
}

async fn collect_body(mut body: BodyStream) -> Result<Bytes, TransportError> {
	let mut buffer = BytesMut::new();
	while let Some(chunk) = body.try_next().await? {
		buffer.extend_from_slice(&chunk);
	}
	Ok(buffer.freeze())
}

/// Why one attempt failed.
enum AttemptError {
	Status(u16),
	Transport(TransportError),
}

impl std::fmt::Display for AttemptError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			AttemptError::Status(status) => write!(f, "HTTP status {}", status),
			AttemptError::Transport(e) => write!(f, "{}", e),
		}
	}
}

/// Parses an absolute `http` or `https` URL.
pub fn parse_url(url: &str) -> Result<Url, FetchError> {
	let invalid = |reason: String| FetchError::InvalidUrl { url: url.to_string(), reason };
	let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
	match parsed.scheme() {
		"http" | "https" => Ok(parsed),
		other => Err(invalid(format!("unsupported scheme \"{}\"", other))),
	}
}

/// Performs GET requests, retrying according to a [`RetryPolicy`].
pub struct Fetcher<C> {
	client: C,
	policy: RetryPolicy,
	cancel: CancelToken,
}

impl<C: HttpClient> Fetcher<C> {
	pub fn new(client: C, policy: RetryPolicy, cancel: CancelToken) -> Self {
		Self { client, policy, cancel }
	}

	pub fn client(&self) -> &C {
		&self.client
	}

	pub fn cancel_token(&self) -> &CancelToken {
		&self.cancel
	}

	/// GETs `url`, retrying retryable failures with the configured delay.
	///
	/// # Errors
	/// - [`InvalidUrl`](FetchError::InvalidUrl) before any request is made.
	/// - [`Transport`](FetchError::Transport) for a failure that isn't retried.
	/// - [`Exhausted`](FetchError::Exhausted) once the retry policy runs out.
	/// - [`Cancelled`](FetchError::Cancelled) when the run's token fires during an attempt or delay.
	pub async fn fetch(&self, url: &str, mode: BodyMode) -> Result<ResponseHandle, FetchError> {
		let parsed = parse_url(url)?;
		let max_attempts = self.policy.max_attempts();

		let mut attempt = 1;
		loop {
			if self.cancel.is_cancelled() {
				return Err(FetchError::Cancelled);
			}

			log::debug!("GET {} (attempt {}/{})", url, attempt, max_attempts);
			let outcome = tokio::select! {
				_ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
				outcome = self.attempt(&parsed, mode) => outcome,
			};

			/* Every error status is retried, transport errors only when transient. */
			let error = match outcome {
				Ok(response) => {
					if attempt > 1 {
						log::info!("Fetched {} after {} attempts", url, attempt);
					}
					return Ok(response);
				},
				Err(AttemptError::Transport(source)) if !source.is_retryable() => {
					log::warn!("GET {} failed and will not be retried: {}", url, source);
					return Err(FetchError::Transport { url: url.to_string(), source });
				},
				Err(error) => error,
			};

			if attempt >= max_attempts {
				log::warn!("Giving up on {} after {} attempts: {}", url, attempt, error);
				return Err(FetchError::Exhausted { url: url.to_string(), attempts: attempt, last: error.to_string() });
			}

			let delay = self.policy.next_delay();
			log::warn!("Attempt {}/{} for {} failed: {}. Retrying in {:?}", attempt, max_attempts, url, error, delay);
			tokio::select! {
				_ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
				_ = tokio::time::sleep(delay) => {},
			}
			attempt += 1;
		}
	}

	/// Fetches a page and reads the whole body.
	pub async fn fetch_page(&self, url: &str) -> Result<Bytes, FetchError> {
		match self.fetch(url, BodyMode::Buffered).await? {
			ResponseHandle::Buffered(bytes) => Ok(bytes),
			streaming => streaming.bytes().await.map_err(|source| FetchError::Transport { url: url.to_string(), source }),
		}
	}

	/// Fetches a resource and hands back the body as it arrives.
	///
	/// Only establishing the response is retried; errors while reading the stream surface to the caller.
	pub async fn fetch_stream(&self, url: &str) -> Result<BodyStream, FetchError> {
		Ok(self.fetch(url, BodyMode::Streaming).await?.into_stream())
	}

	async fn attempt(&self, url: &Url, mode: BodyMode) -> Result<ResponseHandle, AttemptError> {
		let response = self.client.get(url).await.map_err(AttemptError::Transport)?;
		if !(200..300).contains(&response.status) {
			return Err(AttemptError::Status(response.status));
		}

		match mode {
			BodyMode::Streaming => Ok(ResponseHandle::Streaming(response.body)),
			BodyMode::Buffered => collect_body(response.body)
				.await
				.map(ResponseHandle::Buffered)
				.map_err(AttemptError::Transport),
		}
	}
}
