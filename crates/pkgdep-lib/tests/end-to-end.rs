use pkgdep::download::DownloadResult;
use pkgdep::extractor::IndexPageExtractor;
use pkgdep::{CancelToken, PackageName, Session};
use pkgdep_test_utils::*;

#[tokio::test]
async fn resolve_and_download_closure() {
	let _ = env_logger::builder().is_test(true).try_init();

	let x = b"x artifact".as_slice();
	let y = b"y artifact".as_slice();
	let z = b"z artifact".as_slice();
	let index = MockIndex::new()
		.package("x", &["y", "z"])
		.package("y", &[])
		.package("z", &["y"])
		.download_options("x", Some(&artifact_hash(x)), &["http://mirror.test/pool/x_1_amd64.deb"])
		.download_options("y", Some(&artifact_hash(y)), &["http://bad.test/pool/y_1_amd64.deb", "http://mirror.test/pool/y_1_amd64.deb"])
		.download_options("z", None, &["http://mirror.test/pool/z_1_amd64.deb"])
		.artifact("http://mirror.test/pool/x_1_amd64.deb", x)
		.artifact("http://bad.test/pool/y_1_amd64.deb", &b"corrupted"[..])
		.artifact("http://mirror.test/pool/y_1_amd64.deb", y)
		.artifact("http://mirror.test/pool/z_1_amd64.deb", z);

	let dir = tempdir();
	let session = Session::new(index, IndexPageExtractor::new(), config(dir.path()), CancelToken::new());
	let report = session.run(&PackageName::new("x").unwrap()).await.unwrap();

	let order: Vec<_> = report.resolution.order.iter().map(|p| p.as_str()).collect();
	assert_eq!(order, vec!["x", "y", "z"]);
	assert!(report.is_success());
	assert!(matches!(report.downloads[2].result, DownloadResult::UnverifiedSaved { .. }));

	let workspace = dir.path().join("x");
	assert_eq!(std::fs::read(workspace.join("y_1_amd64.deb")).unwrap(), y);
	let mut files: Vec<_> = std::fs::read_dir(&workspace)
		.unwrap()
		.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
		.collect();
	files.sort();
	assert_eq!(files, vec!["x_1_amd64.deb", "y_1_amd64.deb", "z_1_amd64.deb"]);

	assert_eq!(session.fetcher().client().hits(&package_page_url("y")), 1);

	let json = serde_json::to_value(&report).unwrap();
	assert_eq!(json["downloads"][1]["candidates"][0]["outcome"], "hash_mismatch");
}

#[tokio::test]
async fn unreachable_dependency_still_downloads_the_rest() {
	let artifact = b"root".as_slice();
	let index = MockIndex::new()
		.package("root", &["gone"])
		.download_options("root", Some(&artifact_hash(artifact)), &["http://mirror.test/root.deb"])
		.artifact("http://mirror.test/root.deb", artifact);

	let dir = tempdir();
	let session = Session::new(index, IndexPageExtractor::new(), config(dir.path()), CancelToken::new());
	let report = session.run(&PackageName::new("root").unwrap()).await.unwrap();

	assert_eq!(report.resolution.failures.len(), 1);
	assert_eq!(report.resolution.failures[0].package.as_str(), "gone");
	let failed: Vec<_> = report.failed().map(|d| d.package.as_str()).collect();
	assert_eq!(failed, vec!["gone"]);
	assert!(dir.path().join("root").join("root.deb").is_file());
}
