use crate::fetcher::{parse_url, FetchError};

use super::workspace::artifact_filename;

/// A mirror link that may hold a package's artifact.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ArtifactCandidate {
	pub url: String,
	pub filename: String,
	/// Digest published for the package, shared by every mirror of it.
	pub expected_hash: Option<String>,
}

/// Link left out of the candidate list, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLink {
	pub link: String,
	pub reason: String,
}

/// Whether `link` names a file ending in `extension`, ignoring any query or fragment.
pub fn has_extension(link: &str, extension: &str) -> bool {
	let path = link.split(['?', '#']).next().unwrap_or(link);
	!extension.is_empty() && path.ends_with(extension)
}

/// Picks the links worth trying, in page order.
///
/// Links without the artifact extension aren't downloads and are ignored, as are repeats
/// of an earlier link. Links that look like downloads but can't be fetched are returned
/// in the second list.
pub fn select_candidates(links: &[String], extension: &str, expected_hash: Option<&str>) -> (Vec<ArtifactCandidate>, Vec<SkippedLink>) {
	let mut candidates: Vec<ArtifactCandidate> = Vec::new();
	let mut skipped = Vec::new();

	for link in links.iter().map(|l| l.trim()).filter(|l| has_extension(l, extension)) {
		let url = match parse_url(link) {
			Ok(url) => url,
			Err(e) => {
				log::debug!("Skipping candidate {}: {}", link, e);
				let reason = match e {
					FetchError::InvalidUrl { reason, .. } => reason,
					e => e.to_string(),
				};
				skipped.push(SkippedLink { link: link.to_string(), reason });
				continue;
			},
		};
		let Some(filename) = artifact_filename(&url) else {
			skipped.push(SkippedLink { link: link.to_string(), reason: "no usable file name".to_string() });
			continue;
		};
		if candidates.iter().any(|c| c.url == url.as_str()) {
			continue;
		}
		candidates.push(ArtifactCandidate {
			url: url.to_string(),
			filename,
			expected_hash: expected_hash.map(|h| h.trim().to_string()),
		});
	}

	(candidates, skipped)
}
