//! Turns fetched index pages into dependency names and download candidates.
//!
//! The resolver and download pipeline only see the [`PageExtractor`] trait,
//! [`IndexPageExtractor`] understands the HTML served by the package index.

mod index_page;
pub use index_page::IndexPageExtractor;
pub use index_page::SHA256_LABEL;

/// What a download options page offers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadMetadata {
	/// Hex SHA-256 digest of the artifact, when the page lists one.
	pub expected_hash: Option<String>,
	/// Every link on the page in page order. Not yet filtered to artifacts.
	pub links: Vec<String>,
}

/// The page could not be understood. Callers treat this as "nothing extracted".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
	#[error("page is not valid UTF-8: {0}")]
	Encoding(String),
	#[error("page is malformed: {0}")]
	Malformed(String),
}

/// Reads the structured data out of an index page.
pub trait PageExtractor: Send + Sync {
	/// Direct dependencies listed on a package's page, in page order.
	fn dependency_names(&self, page: &[u8]) -> Result<Vec<String>, ExtractError>;

	/// Checksum and links listed on a package's download page.
	fn download_metadata(&self, page: &[u8]) -> Result<DownloadMetadata, ExtractError>;
}

/// Interprets a page body as text.
pub fn page_text(page: &[u8]) -> Result<&str, ExtractError> {
	std::str::from_utf8(page).map_err(|e| ExtractError::Encoding(e.to_string()))
}
