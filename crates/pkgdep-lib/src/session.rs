//! One resolve-and-download run per root package.

use std::path::PathBuf;

use crate::download::{DownloadPipeline, DownloadReport, Workspace};
use crate::extractor::PageExtractor;
use crate::fetcher::HttpClient;
use crate::resolver::{Resolution, Resolver};
use crate::{CancelToken, Config, Fetcher, InstalledSet, PackageName};

/// Everything that happened while processing one root package.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionReport {
	pub root: PackageName,
	pub workspace: PathBuf,
	pub resolution: Resolution,
	/// One report per resolved package, in discovery order.
	pub downloads: Vec<DownloadReport>,
}

impl SessionReport {
	pub fn succeeded(&self) -> impl Iterator<Item = &DownloadReport> {
		self.downloads.iter().filter(|d| d.is_success())
	}

	pub fn failed(&self) -> impl Iterator<Item = &DownloadReport> {
		self.downloads.iter().filter(|d| !d.is_success())
	}

	/// Every resolved package was downloaded.
	pub fn is_success(&self) -> bool {
		self.failed().next().is_none()
	}
}

/// Drives the resolver and download pipeline with one shared fetcher.
///
/// The same session can be run for several roots, each gets its own workspace.
pub struct Session<C, E> {
	fetcher: Fetcher<C>,
	extractor: E,
	config: Config,
}

impl<C: HttpClient, E: PageExtractor> Session<C, E> {
	pub fn new(client: C, extractor: E, config: Config, cancel: CancelToken) -> Self {
		let fetcher = Fetcher::new(client, config.retry().clone(), cancel);
		Self { fetcher, extractor, config }
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn fetcher(&self) -> &Fetcher<C> {
		&self.fetcher
	}

	/// Resolves `root` without downloading anything.
	///
	/// # Errors
	/// - [`Cancelled`](crate::Error::Cancelled) when the token fired.
	pub async fn resolve(&self, root: &PackageName) -> crate::Result<Resolution> {
		let installed = InstalledSet::load(self.config.installed_list());
		Resolver::new(&self.fetcher, &self.extractor, &self.config).resolve(root, &installed).await
	}

	/// Wipes the root's workspace, resolves its dependencies and downloads all of them.
	///
	/// # Errors
	/// - [`IO`](crate::Error::IO) when the workspace can't be created.
	/// - [`Cancelled`](crate::Error::Cancelled) when the token fired. Files already saved are complete.
	pub async fn run(&self, root: &PackageName) -> crate::Result<SessionReport> {
		let workspace = Workspace::create(self.config.workspace_dir(root))?;
		log::info!("Resolving dependencies of {}", root);
		let resolution = self.resolve(root).await?;

		log::info!("Downloading {} packages into {}", resolution.order.len(), workspace.path().display());
		let downloads = DownloadPipeline::new(&self.fetcher, &self.extractor, &self.config, &workspace)
			.download_all(&resolution.order)
			.await;
		if self.fetcher.cancel_token().is_cancelled() {
			return Err(crate::Error::Cancelled);
		}

		let report = SessionReport {
			root: root.clone(),
			workspace: workspace.path().to_path_buf(),
			resolution,
			downloads,
		};
		log::info!(
			"Finished {}: {} of {} packages downloaded",
			root,
			report.succeeded().count(),
			report.downloads.len()
		);
		Ok(report)
	}
}
