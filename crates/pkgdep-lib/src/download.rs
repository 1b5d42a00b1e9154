//! Downloads a package's artifact from the first mirror that passes verification.
//!
//! For each package the download options page is fetched and its candidate links
//! are tried in page order. When the page publishes a SHA-256 digest a candidate is
//! verified before it is saved, and the saved bytes are checked again on their way to
//! disk. Without a digest the first candidate that can be fetched is saved unverified.
//!
//! Every candidate's outcome is kept in the [`DownloadReport`] so the reason a
//! package failed can be inspected afterwards.

use std::path::PathBuf;

use futures_util::StreamExt;

use crate::extractor::{DownloadMetadata, PageExtractor};
use crate::fetcher::{FetchError, HttpClient};
use crate::{Config, Fetcher, PackageName};

mod candidate;
pub use candidate::ArtifactCandidate;
pub use candidate::SkippedLink;
pub use candidate::has_extension;
pub use candidate::select_candidates;

mod verify;
pub use verify::Verifier;
pub use verify::Verification;
pub use verify::StreamHasher;
pub use verify::digest_matches;

mod workspace;
pub use workspace::Workspace;
pub use workspace::StoredArtifact;
pub use workspace::SaveError;
pub use workspace::artifact_filename;

/// What happened to one candidate link.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CandidateOutcome {
	/// `sha256` is the digest of the bytes written, whether or not one was published.
	Saved { path: PathBuf, verified: bool, sha256: String },
	/// The artifact was read but its digest wasn't the published one.
	HashMismatch { expected: String, actual: String },
	/// The artifact couldn't be read for verification.
	VerifyFailed { reason: String },
	SaveFailed { reason: String },
	/// Not a usable link, never requested.
	Skipped { reason: String },
	Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CandidateAttempt {
	pub url: String,
	#[serde(flatten)]
	pub outcome: CandidateOutcome,
}

/// Final result for one package.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DownloadResult {
	VerifiedSaved { path: PathBuf },
	/// Saved without verification because the page published no digest.
	UnverifiedSaved { path: PathBuf },
	/// Nothing was saved and at least one candidate failed its integrity check.
	VerificationFailed,
	/// Nothing was saved for any other reason.
	FetchFailed,
}

impl DownloadResult {
	pub fn is_success(&self) -> bool {
		matches!(self, DownloadResult::VerifiedSaved { .. } | DownloadResult::UnverifiedSaved { .. })
	}

	pub fn saved_path(&self) -> Option<&std::path::Path> {
		match self {
			DownloadResult::VerifiedSaved { path } | DownloadResult::UnverifiedSaved { path } => Some(path),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DownloadReport {
	pub package: PackageName,
	pub result: DownloadResult,
	pub expected_hash: Option<String>,
	/// Attempts in the order they were made, skipped links first.
	pub candidates: Vec<CandidateAttempt>,
	/// Why the download page yielded nothing, if it didn't.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub page_error: Option<String>,
}

impl DownloadReport {
	fn new(package: PackageName) -> Self {
		Self {
			package,
			result: DownloadResult::FetchFailed,
			expected_hash: None,
			candidates: Vec::new(),
			page_error: None,
		}
	}

	pub fn is_success(&self) -> bool {
		self.result.is_success()
	}
}

/// Picks the result from the candidate outcomes once no candidate was saved.
fn exhausted_result(candidates: &[CandidateAttempt]) -> DownloadResult {
	let mismatched = candidates.iter().any(|c| matches!(c.outcome, CandidateOutcome::HashMismatch { .. }));
	if mismatched {
		DownloadResult::VerificationFailed
	} else {
		DownloadResult::FetchFailed
	}
}

pub struct DownloadPipeline<'a, C, E> {
	fetcher: &'a Fetcher<C>,
	extractor: &'a E,
	config: &'a Config,
	workspace: &'a Workspace,
}

impl<'a, C: HttpClient, E: PageExtractor> DownloadPipeline<'a, C, E> {
	pub fn new(fetcher: &'a Fetcher<C>, extractor: &'a E, config: &'a Config, workspace: &'a Workspace) -> Self {
		Self { fetcher, extractor, config, workspace }
	}

	/// Downloads every package, at most [`Config::concurrency()`] at a time.
	///
	/// Reports are returned in the same order as `packages`.
	pub async fn download_all(&self, packages: &[PackageName]) -> Vec<DownloadReport> {
		futures_util::stream::iter(packages)
			.map(|package| self.download_package(package))
			.buffered(self.config.concurrency())
			.collect()
			.await
	}

	/// Downloads one package into the workspace.
	///
	/// Failures never escape, they are described by the returned report.
	pub async fn download_package(&self, package: &PackageName) -> DownloadReport {
		let mut report = DownloadReport::new(package.clone());

		let metadata = match self.download_metadata(package).await {
			Ok(metadata) => metadata,
			Err(reason) => {
				log::error!("No download information for {}: {}", package, reason);
				report.page_error = Some(reason);
				return report;
			},
		};

		report.expected_hash = metadata.expected_hash.as_deref().map(str::trim).filter(|h| !h.is_empty()).map(str::to_string);
		if report.expected_hash.is_none() {
			log::warn!("No SHA256 checksum published for {}, proceed at your own risk.", package);
		}

		let (candidates, skipped) = select_candidates(&metadata.links, self.config.artifact_extension(), report.expected_hash.as_deref());
		report.candidates.extend(skipped.into_iter().map(|s| CandidateAttempt {
			url: s.link,
			outcome: CandidateOutcome::Skipped { reason: s.reason },
		}));
		if candidates.is_empty() {
			log::warn!("Download page of {} lists no {} links", package, self.config.artifact_extension());
		}

		for candidate in candidates {
			let outcome = if self.fetcher.cancel_token().is_cancelled() {
				CandidateOutcome::Cancelled
			} else {
				self.try_candidate(&candidate).await
			};
			log::debug!("{} candidate {}: {:?}", package, candidate.url, outcome);

			let saved = match &outcome {
				CandidateOutcome::Saved { path, verified: true, .. } => Some(DownloadResult::VerifiedSaved { path: path.clone() }),
				CandidateOutcome::Saved { path, verified: false, .. } => Some(DownloadResult::UnverifiedSaved { path: path.clone() }),
				_ => None,
			};
			let cancelled = outcome == CandidateOutcome::Cancelled;
			report.candidates.push(CandidateAttempt { url: candidate.url, outcome });

			if let Some(result) = saved {
				report.result = result;
				return report;
			}
			if cancelled {
				break;
			}
		}

		report.result = exhausted_result(&report.candidates);
		log::error!("Failed to download {}: {:?}", package, report.result);
		report
	}

	async fn download_metadata(&self, package: &PackageName) -> Result<DownloadMetadata, String> {
		let url = self.config.download_page_url(package);
		let page = self.fetcher.fetch_page(&url).await.map_err(|e| e.to_string())?;
		self.extractor.download_metadata(&page).map_err(|e| {
			log::warn!("Could not read download page {}: {}", url, e);
			e.to_string()
		})
	}

	async fn try_candidate(&self, candidate: &ArtifactCandidate) -> CandidateOutcome {
		let expected = candidate.expected_hash.as_deref();

		if let Some(expected) = expected {
			match Verifier::new(self.fetcher).check(&candidate.url, expected).await {
				Verification::Match => {},
				Verification::Mismatch { actual } => {
					return CandidateOutcome::HashMismatch { expected: expected.to_string(), actual };
				},
				Verification::Unavailable(FetchError::Cancelled) => return CandidateOutcome::Cancelled,
				Verification::Unavailable(e) => return CandidateOutcome::VerifyFailed { reason: e.to_string() },
			}
		}

		let saved = match self.fetcher.fetch_stream(&candidate.url).await {
			Ok(body) => self.workspace.write_artifact(&candidate.filename, body, expected, self.fetcher.cancel_token()).await,
			Err(e) => Err(SaveError::from(e)),
		};

		match saved {
			Ok(stored) => CandidateOutcome::Saved { path: stored.path, verified: expected.is_some(), sha256: stored.sha256 },
			Err(SaveError::Cancelled) => CandidateOutcome::Cancelled,
			Err(SaveError::HashMismatch { expected, actual }) => {
				log::warn!("{} changed between verification and save, discarding", candidate.url);
				CandidateOutcome::HashMismatch { expected, actual }
			},
			Err(e) => {
				log::warn!("Could not save {}: {}", candidate.url, e);
				CandidateOutcome::SaveFailed { reason: e.to_string() }
			},
		}
	}
}
