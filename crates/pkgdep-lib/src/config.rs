//! Run configuration.
//!
//! Stored as JSON in the user's configuration directory. Every field has a default
//! so a partial file, or none at all, is valid.

use std::path::{Path, PathBuf};

use crate::fetcher::RetryPolicy;
use crate::PackageName;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
	index_url: String,
	distribution: String,
	architecture: String,
	download_dir: PathBuf,
	installed_list: Option<PathBuf>,
	artifact_extension: String,
	concurrency: usize,
	retry: RetryPolicy,
	request_timeout_secs: u64,
	https_only: bool,
	user_agent: String,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			index_url: "https://packages.ubuntu.com".to_string(),
			distribution: "jammy".to_string(),
			architecture: "amd64".to_string(),
			download_dir: PathBuf::from("packages"),
			installed_list: None,
			artifact_extension: ".deb".to_string(),
			concurrency: 4,
			retry: RetryPolicy::default(),
			request_timeout_secs: 60,
			https_only: false,
			user_agent: format!("pkgdep/{}", env!("CARGO_PKG_VERSION")),
		}
	}
}

/// Location of the configuration file for the current user.
///
/// Returns `None` when neither the XDG variables nor `HOME` (`APPDATA` on Windows) are set.
pub fn default_config_path() -> Option<PathBuf> {
	#[cfg(target_os = "windows")]
	let path = std::env::var_os("APPDATA").map(PathBuf::from);

	#[cfg(not(target_os = "windows"))]
	let path = if let Some(e) = std::env::var_os("XDG_CONFIG_HOME") {
		Some(PathBuf::from(e))
	} else {
		std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"))
	};

	path.map(|p| p.join("pkgdep").join("config.json"))
}

impl Config {
	/// Loads the config from [`default_config_path()`].
	///
	/// # Errors
	/// - [`IO`](crate::Error::IO) when the file can't be read, including when no config path could be determined.
	/// - [`SerdeJSON`](crate::Error::SerdeJSON) when the file isn't a valid config.
	pub fn load_from_disk() -> crate::Result<Self> {
		let path = default_config_path().ok_or_else(|| {
			std::io::Error::new(std::io::ErrorKind::NotFound, "no configuration directory available")
		})?;
		Self::load_from_file(path)
	}

	/// Loads the config from a JSON file at `path`.
	pub fn load_from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
		let file = std::fs::File::open(path)?;
		Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
	}

	/// Saves the config as JSON, creating parent directories as needed.
	pub fn save_to_file(&self, path: impl AsRef<Path>) -> crate::Result<()> {
		let path = path.as_ref();
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let file = std::fs::File::create(path)?;
		serde_json::to_writer_pretty(file, self)?;
		Ok(())
	}

	/* URLs */

	/// Listing page holding a package's direct dependencies.
	pub fn package_page_url(&self, name: &PackageName) -> String {
		format!("{}/{}/{}/{}", self.index_url.trim_end_matches('/'), self.distribution, self.architecture, name)
	}

	/// Page listing a package's download mirrors and checksums.
	pub fn download_page_url(&self, name: &PackageName) -> String {
		self.package_page_url(name) + "/download"
	}

	/// Directory owned by the session for `root`.
	pub fn workspace_dir(&self, root: &PackageName) -> PathBuf {
		self.download_dir.join(root.as_str())
	}

	/* Fields */

	pub fn index_url(&self) -> &str {
		&self.index_url
	}
	pub fn set_index_url(&mut self, index_url: impl Into<String>) {
		self.index_url = index_url.into();
	}

	pub fn distribution(&self) -> &str {
		&self.distribution
	}
	pub fn set_distribution(&mut self, distribution: impl Into<String>) {
		self.distribution = distribution.into();
	}

	pub fn architecture(&self) -> &str {
		&self.architecture
	}
	pub fn set_architecture(&mut self, architecture: impl Into<String>) {
		self.architecture = architecture.into();
	}

	pub fn download_dir(&self) -> &Path {
		&self.download_dir
	}
	pub fn set_download_dir(&mut self, download_dir: impl Into<PathBuf>) {
		self.download_dir = download_dir.into();
	}

	pub fn installed_list(&self) -> Option<&Path> {
		self.installed_list.as_deref()
	}
	pub fn set_installed_list(&mut self, installed_list: Option<PathBuf>) {
		self.installed_list = installed_list;
	}

	pub fn artifact_extension(&self) -> &str {
		&self.artifact_extension
	}
	pub fn set_artifact_extension(&mut self, artifact_extension: impl Into<String>) {
		self.artifact_extension = artifact_extension.into();
	}

	/// Maximum number of pages or artifacts fetched at once. Never less than 1.
	pub fn concurrency(&self) -> usize {
		self.concurrency.max(1)
	}
	pub fn set_concurrency(&mut self, concurrency: usize) {
		self.concurrency = concurrency;
	}

	pub fn retry(&self) -> &RetryPolicy {
		&self.retry
	}
	pub fn set_retry(&mut self, retry: RetryPolicy) {
		self.retry = retry;
	}

	pub fn request_timeout(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.request_timeout_secs)
	}
	pub fn set_request_timeout_secs(&mut self, secs: u64) {
		self.request_timeout_secs = secs;
	}

	pub fn https_only(&self) -> bool {
		self.https_only
	}
	pub fn set_https_only(&mut self, https_only: bool) {
		self.https_only = https_only;
	}

	pub fn user_agent(&self) -> &str {
		&self.user_agent
	}
}
