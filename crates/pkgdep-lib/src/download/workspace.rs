//! The per-root directory artifacts are saved into.

use std::path::{Path, PathBuf};

use futures_util::TryStreamExt;
use reqwest::Url;
use tokio::io::AsyncWriteExt;

use super::verify::{digest_matches, StreamHasher};
use crate::fetcher::{BodyStream, FetchError, TransportError};
use crate::CancelToken;

/// Errors that can occur while saving a single artifact.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
	#[error("fetch failed: {0}")]
	Fetch(FetchError),
	#[error("download interrupted: {0}")]
	Body(#[from] TransportError),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	/// The saved bytes don't hash to the digest the page published.
	#[error("saved content hash {actual} does not match expected {expected}")]
	HashMismatch { expected: String, actual: String },
	#[error("save cancelled")]
	Cancelled,
}

impl From<FetchError> for SaveError {
	fn from(e: FetchError) -> Self {
		match e {
			FetchError::Cancelled => SaveError::Cancelled,
			e => SaveError::Fetch(e),
		}
	}
}

/// An artifact fully written to its final name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
	pub path: PathBuf,
	pub sha256: String,
	pub size: u64,
}

/// Filename an artifact is saved under: the URL's last path segment, unmodified.
pub fn artifact_filename(url: &Url) -> Option<String> {
	let segment = url.path_segments()?.last()?;
	if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
		return None;
	}
	Some(segment.to_string())
}

/// Removes a partially written file unless it was committed.
struct PartialFile {
	path: PathBuf,
	committed: bool,
}

impl Drop for PartialFile {
	fn drop(&mut self) {
		if !self.committed {
			if let Err(e) = std::fs::remove_file(&self.path) {
				if e.kind() != std::io::ErrorKind::NotFound {
					log::warn!("Failed to remove partial download {}: {}", self.path.display(), e);
				}
			}
		}
	}
}

/// Directory owning every artifact downloaded for one root package.
///
/// Workers share it but each writes only its own filename. Files appear under their
/// final name only once complete, so an interrupted run never leaves truncated artifacts.
#[derive(Debug, Clone)]
pub struct Workspace {
	path: PathBuf,
}

impl Workspace {
	/// Creates an empty workspace at `path`, deleting anything a previous run left there.
	///
	/// # Errors
	/// - [`std::io::Error`] when the old contents can't be removed or the directory can't be created.
	pub fn create(path: impl Into<PathBuf>) -> std::io::Result<Self> {
		let path = path.into();
		if path.is_dir() {
			log::info!("Clearing previous workspace {}", path.display());
			std::fs::remove_dir_all(&path)?;
		}
		std::fs::create_dir_all(&path)?;
		log::debug!("Created workspace {}", path.display());
		Ok(Self { path })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn artifact_path(&self, filename: &str) -> PathBuf {
		self.path.join(filename)
	}

	/// Streams `body` into `filename`.
	///
	/// The body goes to a hidden `.part` file first and is renamed into place once complete.
	/// When `expected_sha256` is given the digest of the written bytes must match it,
	/// otherwise the file is discarded.
	pub async fn write_artifact(&self, filename: &str, mut body: BodyStream, expected_sha256: Option<&str>, cancel: &CancelToken) -> Result<StoredArtifact, SaveError> {
		let destination = self.artifact_path(filename);
		let mut partial = PartialFile {
			path: self.path.join(format!(".{}.part", filename)),
			committed: false,
		};

		let mut file = tokio::fs::File::create(&partial.path).await?;
		let mut hasher = StreamHasher::default();
		loop {
			let chunk = tokio::select! {
				_ = cancel.cancelled() => return Err(SaveError::Cancelled),
				chunk = body.try_next() => chunk?,
			};
			let Some(chunk) = chunk else { break };
			hasher.update(&chunk);
			file.write_all(&chunk).await?;
		}
		file.flush().await?;
		file.sync_all().await?;
		drop(file);

		let size = hasher.len();
		let sha256 = hasher.finish();
		if let Some(expected) = expected_sha256 {
			if !digest_matches(&sha256, expected) {
				return Err(SaveError::HashMismatch { expected: expected.trim().to_string(), actual: sha256 });
			}
		}

		tokio::fs::rename(&partial.path, &destination).await?;
		partial.committed = true;
		log::info!("Saved {} ({} bytes)", destination.display(), size);

		Ok(StoredArtifact { path: destination, sha256, size })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bytes::Bytes;
	use crate::fetcher::TransportErrorKind;

	fn body(chunks: Vec<Result<&'static str, TransportError>>) -> BodyStream {
		Box::pin(futures_util::stream::iter(chunks.into_iter().map(|c| c.map(|s| Bytes::from_static(s.as_bytes())))))
	}

	fn entries(dir: &Path) -> Vec<String> {
		let mut names: Vec<_> = std::fs::read_dir(dir)
			.unwrap()
			.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
			.collect();
		names.sort();
		names
	}

	#[test]
	fn filename_is_last_segment() {
		let url = Url::parse("http://mirror.test/pool/main/libstdc%2b%2b6_12_amd64.deb?x=1").unwrap();
		assert_eq!(artifact_filename(&url).as_deref(), Some("libstdc%2b%2b6_12_amd64.deb"));
		assert_eq!(artifact_filename(&Url::parse("http://mirror.test/pool/").unwrap()), None);
	}

	#[test]
	fn create_wipes_previous_contents() {
		let base = tempfile::tempdir().unwrap();
		let path = base.path().join("cpp");
		std::fs::create_dir_all(path.join("old")).unwrap();
		std::fs::write(path.join("stale.deb"), b"stale").unwrap();

		let workspace = Workspace::create(&path).unwrap();
		assert!(entries(workspace.path()).is_empty());
	}

	#[tokio::test]
	async fn writes_complete_artifact() {
		let base = tempfile::tempdir().unwrap();
		let workspace = Workspace::create(base.path().join("root")).unwrap();
		let stored = workspace
			.write_artifact("a.deb", body(vec![Ok("hello "), Ok("world")]), Some("B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9"), &CancelToken::new())
			.await
			.unwrap();
		assert_eq!(stored.size, 11);
		assert_eq!(std::fs::read(&stored.path).unwrap(), b"hello world");
		assert_eq!(entries(workspace.path()), vec!["a.deb"]);
	}

	#[tokio::test]
	async fn broken_stream_leaves_nothing_behind() {
		let base = tempfile::tempdir().unwrap();
		let workspace = Workspace::create(base.path().join("root")).unwrap();
		let err = workspace
			.write_artifact("a.deb", body(vec![Ok("partial"), Err(TransportError::new(TransportErrorKind::Body, "reset"))]), None, &CancelToken::new())
			.await
			.unwrap_err();
		assert!(matches!(err, SaveError::Body(_)));
		assert!(entries(workspace.path()).is_empty());
	}

	#[tokio::test]
	async fn digest_mismatch_discards_file() {
		let base = tempfile::tempdir().unwrap();
		let workspace = Workspace::create(base.path().join("root")).unwrap();
		let err = workspace
			.write_artifact("a.deb", body(vec![Ok("tampered")]), Some("00"), &CancelToken::new())
			.await
			.unwrap_err();
		assert!(matches!(err, SaveError::HashMismatch { .. }));
		assert!(entries(workspace.path()).is_empty());
	}

	#[tokio::test]
	async fn cancelled_write_leaves_nothing_behind() {
		let base = tempfile::tempdir().unwrap();
		let workspace = Workspace::create(base.path().join("root")).unwrap();
		let cancel = CancelToken::new();
		cancel.cancel();
		let pending: BodyStream = Box::pin(futures_util::stream::pending());
		let err = workspace.write_artifact("a.deb", pending, None, &cancel).await.unwrap_err();
		assert!(matches!(err, SaveError::Cancelled));
		assert!(entries(workspace.path()).is_empty());
	}
}
