//! In-memory package index for integration tests.
//!
//! [`MockIndex`] serves HTML in the same layout as the real index, so tests can run
//! the whole pipeline, [`IndexPageExtractor`](pkgdep::extractor::IndexPageExtractor) included,
//! without a network.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use pkgdep::fetcher::{BodyStream, HttpClient, HttpResponse, RetryPolicy, TransportError, Url};

pub const INDEX_URL: &str = "http://index.test";

/// Hex SHA-256 of `body`, as an index page would publish it.
pub fn artifact_hash(body: &[u8]) -> String {
	sha256::digest(body)
}

/// Config pointing at [`INDEX_URL`], saving under `download_dir`, retrying quickly.
pub fn config(download_dir: &std::path::Path) -> pkgdep::Config {
	let mut config = pkgdep::Config::default();
	config.set_index_url(INDEX_URL);
	config.set_download_dir(download_dir);
	config.set_retry(RetryPolicy::new(3, Duration::from_millis(1), Duration::ZERO));
	config
}

pub fn tempdir() -> tempfile::TempDir {
	tempfile::tempdir().expect("failed to create temporary directory")
}

pub fn package_page_url(name: &str) -> String {
	format!("{}/jammy/amd64/{}", INDEX_URL, name)
}

pub fn download_page_url(name: &str) -> String {
	package_page_url(name) + "/download"
}

/// Package page listing `dependencies` the way the index does.
pub fn package_page(name: &str, dependencies: &[&str]) -> String {
	let items: String = dependencies
		.iter()
		.map(|dep| format!("<li><dl><dt><span class=\"nonvisual\">dep:</span> <a href=\"/jammy/{0}\">{0}</a> (&gt;= 1.0)</dt></dl></li>\n", dep))
		.collect();
	format!(
		"<html><head><title>Package: {0}</title></head><body>\n<div id=\"pdeps\">\n<ul class=\"uldep\">\n{1}</ul>\n</div>\n</body></html>",
		name, items
	)
}

/// Download options page with an optional digest row and one anchor per link.
pub fn download_page(name: &str, hash: Option<&str>, links: &[&str]) -> String {
	let hash_row = hash
		.map(|h| format!("<tr><th>SHA256 checksum</th><td><tt>{}</tt></td></tr>\n", h))
		.unwrap_or_default();
	let anchors: String = links.iter().map(|l| format!("<li><a href=\"{}\">mirror</a></li>\n", l)).collect();
	format!(
		"<html><body>\n<h2>Download Page for {0}</h2>\n<table id=\"pdownloadmeta\">\n<tr><th>Exact Size</th><td>1 Byte</td></tr>\n{1}</table>\n<ul>\n{2}</ul>\n<a href=\"https://www.debian.org/mirror/list\">mirrors</a>\n</body></html>",
		name, hash_row, anchors
	)
}

struct Route {
	status: u16,
	body: Bytes,
	/// Requests still to be answered with 503 before `status` is served.
	failures_left: u32,
}

/// Answers GETs from a fixed table of routes, 404 for anything else.
#[derive(Default)]
pub struct MockIndex {
	routes: Mutex<HashMap<String, Route>>,
	hits: Mutex<HashMap<String, u32>>,
}

impl MockIndex {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn route(self, url: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
		self.routes.lock().unwrap().insert(url.into(), Route { status, body: body.into(), failures_left: 0 });
		self
	}

	/// Serves a package page for `name` listing `dependencies`.
	pub fn package(self, name: &str, dependencies: &[&str]) -> Self {
		self.route(package_page_url(name), 200, package_page(name, dependencies))
	}

	pub fn download_options(self, name: &str, hash: Option<&str>, links: &[&str]) -> Self {
		self.route(download_page_url(name), 200, download_page(name, hash, links))
	}

	pub fn artifact(self, url: &str, body: impl Into<Bytes>) -> Self {
		self.route(url, 200, body)
	}

	/// Makes the next `failures` requests for `url` fail with 503.
	pub fn flaky(self, url: &str, failures: u32) -> Self {
		if let Some(route) = self.routes.lock().unwrap().get_mut(url) {
			route.failures_left = failures;
		}
		self
	}

	pub fn hits(&self, url: &str) -> u32 {
		self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
	}

	pub fn total_hits(&self) -> u32 {
		self.hits.lock().unwrap().values().sum()
	}
}

impl HttpClient for MockIndex {
	async fn get(&self, url: &Url) -> Result<HttpResponse, TransportError> {
		*self.hits.lock().unwrap().entry(url.to_string()).or_default() += 1;

		let (status, body) = match self.routes.lock().unwrap().get_mut(url.as_str()) {
			Some(route) if route.failures_left > 0 => {
				route.failures_left -= 1;
				(503, Bytes::from_static(b"Service Unavailable"))
			},
			Some(route) => (route.status, route.body.clone()),
			None => (404, Bytes::from_static(b"Not Found")),
		};

		/* Split the body so consumers see more than one chunk. */
		let middle = body.len() / 2;
		let chunks = vec![Ok(body.slice(..middle)), Ok(body.slice(middle..))];
		let body: BodyStream = Box::pin(futures_util::stream::iter(chunks));
		Ok(HttpResponse { status, body })
	}
}
