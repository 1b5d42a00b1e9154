//! Discovers the full dependency closure of a root package.
//!
//! The walk is breadth first over an explicit frontier rather than recursive, so
//! depth is bounded by memory and not the call stack. Each level's pages are fetched
//! concurrently, up to the configured limit. The [`VisitedSet`] guarantees every
//! package is expanded at most once, which is also what breaks cycles.
//!
//! A page that can't be fetched or understood only prunes that branch: the package
//! stays in the result and the failure is recorded in [`Resolution::failures`].

use futures_util::StreamExt;

use crate::extractor::{ExtractError, PageExtractor};
use crate::fetcher::{FetchError, HttpClient};
use crate::{Config, Fetcher, InstalledSet, PackageName};

mod visited;
pub use visited::VisitedSet;

/// Why a package's direct dependencies are unknown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpandFailure {
	#[error("listing page unavailable: {0}")]
	Fetch(#[from] FetchError),
	#[error("listing page not understood: {0}")]
	Extract(#[from] ExtractError),
}

impl serde::Serialize for ExpandFailure {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ResolveFailure {
	pub package: PackageName,
	pub cause: ExpandFailure,
}

/// Outcome of a resolve.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Resolution {
	pub root: PackageName,
	/// Every package found, root first, each exactly once.
	pub order: Vec<PackageName>,
	/// Packages that are in `order` but whose dependencies could not be read.
	pub failures: Vec<ResolveFailure>,
}

impl Resolution {
	pub fn is_complete(&self) -> bool {
		self.failures.is_empty()
	}
}

pub struct Resolver<'a, C, E> {
	fetcher: &'a Fetcher<C>,
	extractor: &'a E,
	config: &'a Config,
}

impl<'a, C: HttpClient, E: PageExtractor> Resolver<'a, C, E> {
	pub fn new(fetcher: &'a Fetcher<C>, extractor: &'a E, config: &'a Config) -> Self {
		Self { fetcher, extractor, config }
	}

	/// Resolves the dependency closure of `root`.
	///
	/// Dependencies contained in a non-empty `installed` set are neither listed nor expanded.
	///
	/// # Errors
	/// Only [`Cancelled`](crate::Error::Cancelled). Every other failure is recorded in the [`Resolution`].
	pub async fn resolve(&self, root: &PackageName, installed: &InstalledSet) -> crate::Result<Resolution> {
		let visited = VisitedSet::new();
		let failures = self.resolve_into(root, installed, &visited).await?;
		let order = visited.into_discovery_order();
		log::info!("Resolved {} packages for {} ({} could not be expanded)", order.len(), root, failures.len());
		Ok(Resolution { root: root.clone(), order, failures })
	}

	/// Expands `root` into a caller owned [`VisitedSet`].
	///
	/// Packages already claimed in `visited` are not expanded again, so several
	/// resolves sharing one set each see a package at most once between them.
	pub async fn resolve_into(&self, root: &PackageName, installed: &InstalledSet, visited: &VisitedSet) -> crate::Result<Vec<ResolveFailure>> {
		let mut failures = Vec::new();
		let mut frontier = Vec::new();
		if visited.claim(root) {
			frontier.push(root.clone());
		}

		let mut depth = 0;
		while !frontier.is_empty() {
			if self.fetcher.cancel_token().is_cancelled() {
				return Err(crate::Error::Cancelled);
			}

			log::debug!("Expanding {} packages at depth {}", frontier.len(), depth);
			let expansions: Vec<_> = futures_util::stream::iter(frontier.iter())
				.map(|name| async move { (name, self.expand(name).await) })
				.buffered(self.config.concurrency())
				.collect()
				.await;

			/* Claims happen in frontier order so the discovery order doesn't depend on response timing. */
			let mut next = Vec::new();
			for (name, expansion) in expansions {
				match expansion {
					Ok(dependencies) => {
						for dependency in dependencies {
							if !installed.should_expand(&dependency) {
								log::debug!("Skipping {} required by {}, already installed.", dependency, name);
								continue;
							}
							if visited.claim(&dependency) {
								log::trace!("Discovered {} via {}", dependency, name);
								next.push(dependency);
							}
						}
					},
					Err(ExpandFailure::Fetch(FetchError::Cancelled)) => return Err(crate::Error::Cancelled),
					Err(cause) => {
						log::warn!("Could not expand {}: {}. Continuing without its dependencies.", name, cause);
						failures.push(ResolveFailure { package: name.clone(), cause });
					},
				}
			}

			frontier = next;
			depth += 1;
		}

		Ok(failures)
	}

	/// Direct dependencies of one package.
	async fn expand(&self, name: &PackageName) -> Result<Vec<PackageName>, ExpandFailure> {
		let url = self.config.package_page_url(name);
		let page = self.fetcher.fetch_page(&url).await?;
		let raw_names = self.extractor.dependency_names(&page)?;

		Ok(raw_names
			.into_iter()
			.filter_map(|raw| match PackageName::new(&raw) {
				Ok(dependency) => Some(dependency),
				Err(e) => {
					log::debug!("Ignoring dependency of {}: {}", name, e);
					None
				},
			})
			.collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::*;

	fn page(package: &str) -> String {
		format!("{}/jammy/amd64/{}", INDEX, package)
	}

	async fn resolve(client: MapClient, root: &str, installed: &InstalledSet) -> (Resolution, Fetcher<MapClient>) {
		let config = config();
		let fetcher = fetcher(client, &config);
		let resolution = Resolver::new(&fetcher, &LineExtractor, &config)
			.resolve(&name(root), installed)
			.await
			.unwrap();
		(resolution, fetcher)
	}

	#[tokio::test]
	async fn cycle_terminates() {
		let client = MapClient::default()
			.route(page("a"), 200, "b")
			.route(page("b"), 200, "c")
			.route(page("c"), 200, "a\nb");
		let (resolution, fetcher) = resolve(client, "a", &InstalledSet::empty()).await;
		assert_eq!(resolution.order, names(&["a", "b", "c"]));
		assert!(resolution.is_complete());
		for package in ["a", "b", "c"] {
			assert_eq!(fetcher.client().hits(&page(package)), 1);
		}
	}

	#[tokio::test]
	async fn diamond_expands_shared_dependency_once() {
		let client = MapClient::default()
			.route(page("a"), 200, "b\nc")
			.route(page("b"), 200, "d")
			.route(page("c"), 200, "d")
			.route(page("d"), 200, "");
		let (resolution, fetcher) = resolve(client, "a", &InstalledSet::empty()).await;
		assert_eq!(resolution.order, names(&["a", "b", "c", "d"]));
		assert_eq!(fetcher.client().hits(&page("d")), 1);
	}

	#[tokio::test]
	async fn installed_dependencies_are_excluded() {
		let client = MapClient::default()
			.route(page("cpp"), 200, "libc6\ngcc-12-base")
			.route(page("libc6"), 200, "libgcc-s1")
			.route(page("gcc-12-base"), 200, "");
		let installed: InstalledSet = [name("libc6")].into_iter().collect();
		let (resolution, fetcher) = resolve(client, "cpp", &installed).await;
		assert_eq!(resolution.order, names(&["cpp", "gcc-12-base"]));
		assert_eq!(fetcher.client().hits(&page("libc6")), 0);
	}

	#[tokio::test]
	async fn empty_installed_set_keeps_everything() {
		let client = MapClient::default()
			.route(page("cpp"), 200, "libc6")
			.route(page("libc6"), 200, "");
		let (resolution, _) = resolve(client, "cpp", &InstalledSet::empty()).await;
		assert_eq!(resolution.order, names(&["cpp", "libc6"]));
	}

	#[tokio::test]
	async fn unreachable_page_prunes_only_its_branch() {
		let client = MapClient::default()
			.route(page("a"), 200, "b\nc\nd")
			.route(page("b"), 503, "")
			.route(page("c"), 200, "garbage")
			.route(page("d"), 200, "e")
			.route(page("e"), 200, "");
		let (resolution, _) = resolve(client, "a", &InstalledSet::empty()).await;
		assert_eq!(resolution.order, names(&["a", "b", "c", "d", "e"]));

		let failed: Vec<_> = resolution.failures.iter().map(|f| f.package.as_str()).collect();
		assert_eq!(failed, vec!["b", "c"]);
		assert!(matches!(resolution.failures[0].cause, ExpandFailure::Fetch(FetchError::Exhausted { attempts: 2, .. })));
		assert!(matches!(resolution.failures[1].cause, ExpandFailure::Extract(_)));
	}

	#[tokio::test]
	async fn unreachable_root_still_listed() {
		let (resolution, _) = resolve(MapClient::default(), "missing", &InstalledSet::empty()).await;
		assert_eq!(resolution.order, names(&["missing"]));
		assert_eq!(resolution.failures.len(), 1);
	}

	#[tokio::test]
	async fn names_are_normalized_before_dedup() {
		let client = MapClient::default()
			.route(page("a"), 200, "LibC6\n libc6 \n\n")
			.route(page("libc6"), 200, "");
		let (resolution, _) = resolve(client, "a", &InstalledSet::empty()).await;
		assert_eq!(resolution.order, names(&["a", "libc6"]));
	}

	#[tokio::test]
	async fn shared_visited_set_across_roots() {
		let client = MapClient::default()
			.route(page("x"), 200, "shared")
			.route(page("y"), 200, "shared")
			.route(page("shared"), 200, "");
		let config = config();
		let fetcher = fetcher(client, &config);
		let resolver = Resolver::new(&fetcher, &LineExtractor, &config);
		let visited = VisitedSet::new();
		let installed = InstalledSet::empty();
		let (x, y) = (name("x"), name("y"));

		let (first, second) = tokio::join!(
			resolver.resolve_into(&x, &installed, &visited),
			resolver.resolve_into(&y, &installed, &visited),
		);
		assert!(first.unwrap().is_empty() && second.unwrap().is_empty());
		assert_eq!(fetcher.client().hits(&page("shared")), 1);
		assert_eq!(visited.len(), 3);
	}

	#[tokio::test]
	async fn cancelled_resolve_errors() {
		let config = config();
		let fetcher = fetcher(MapClient::default().route(page("a"), 200, ""), &config);
		fetcher.cancel_token().cancel();
		let result = Resolver::new(&fetcher, &LineExtractor, &config)
			.resolve(&name("a"), &InstalledSet::empty())
			.await;
		assert!(matches!(result, Err(crate::Error::Cancelled)));
	}
}
