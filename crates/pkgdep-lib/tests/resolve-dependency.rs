use pkgdep::extractor::IndexPageExtractor;
use pkgdep::resolver::{Resolver, VisitedSet};
use pkgdep::{CancelToken, Fetcher, InstalledSet, PackageName};
use pkgdep_test_utils::*;

fn names(list: &[&str]) -> Vec<PackageName> {
	list.iter().map(|s| PackageName::new(s).unwrap()).collect()
}

#[tokio::test]
async fn diamond_through_sibling() {
	let dir = tempdir();
	let config = config(dir.path());
	let index = MockIndex::new()
		.package("x", &["y", "z"])
		.package("y", &[])
		.package("z", &["y"]);
	let fetcher = Fetcher::new(index, config.retry().clone(), CancelToken::new());
	let extractor = IndexPageExtractor::new();

	let resolution = Resolver::new(&fetcher, &extractor, &config)
		.resolve(&PackageName::new("x").unwrap(), &InstalledSet::empty())
		.await
		.unwrap();

	assert_eq!(resolution.order, names(&["x", "y", "z"]));
	assert!(resolution.is_complete());
	assert_eq!(fetcher.client().hits(&package_page_url("y")), 1);
}

#[tokio::test]
async fn concurrent_diamond_expands_shared_node_once() {
	let dir = tempdir();
	let mut config = config(dir.path());
	config.set_concurrency(8);
	let index = MockIndex::new()
		.package("a", &["b", "c"])
		.package("b", &["d"])
		.package("c", &["d"])
		.package("d", &[]);
	let fetcher = Fetcher::new(index, config.retry().clone(), CancelToken::new());
	let extractor = IndexPageExtractor::new();
	let resolver = Resolver::new(&fetcher, &extractor, &config);

	/* Two walks from different parents racing over one visited set. */
	let visited = VisitedSet::new();
	let installed = InstalledSet::empty();
	let (b, c) = (PackageName::new("b").unwrap(), PackageName::new("c").unwrap());
	let (from_b, from_c) = tokio::join!(
		resolver.resolve_into(&b, &installed, &visited),
		resolver.resolve_into(&c, &installed, &visited),
	);
	assert!(from_b.unwrap().is_empty());
	assert!(from_c.unwrap().is_empty());
	assert_eq!(fetcher.client().hits(&package_page_url("d")), 1);

	let resolution = resolver.resolve(&PackageName::new("a").unwrap(), &InstalledSet::empty()).await.unwrap();
	assert_eq!(resolution.order, names(&["a", "b", "c", "d"]));
}

#[tokio::test]
async fn installed_manifest_prunes_walk() {
	let dir = tempdir();
	let manifest = dir.path().join("installed.txt");
	std::fs::write(&manifest, "Listing... Done\nlibc6/jammy-updates,now 2.35-0ubuntu3.1 amd64 [installed]\n").unwrap();

	let config = config(dir.path());
	let index = MockIndex::new()
		.package("cpp", &["cpp-11", "libc6"])
		.package("cpp-11", &["gcc-11-base", "libc6"])
		.package("gcc-11-base", &[])
		.package("libc6", &["libgcc-s1"]);
	let fetcher = Fetcher::new(index, config.retry().clone(), CancelToken::new());
	let extractor = IndexPageExtractor::new();
	let installed = InstalledSet::load(Some(manifest.as_path()));

	let resolution = Resolver::new(&fetcher, &extractor, &config)
		.resolve(&PackageName::new("cpp").unwrap(), &installed)
		.await
		.unwrap();

	assert_eq!(resolution.order, names(&["cpp", "cpp-11", "gcc-11-base"]));
	assert_eq!(fetcher.client().hits(&package_page_url("libc6")), 0);
}

#[tokio::test]
async fn flaky_listing_page_is_retried() {
	let dir = tempdir();
	let config = config(dir.path());
	let index = MockIndex::new()
		.package("a", &["b"])
		.package("b", &[])
		.flaky(&package_page_url("b"), 2);
	let fetcher = Fetcher::new(index, config.retry().clone(), CancelToken::new());
	let extractor = IndexPageExtractor::new();

	let resolution = Resolver::new(&fetcher, &extractor, &config)
		.resolve(&PackageName::new("a").unwrap(), &InstalledSet::empty())
		.await
		.unwrap();

	assert!(resolution.is_complete());
	assert_eq!(fetcher.client().hits(&package_page_url("b")), 3);
}
