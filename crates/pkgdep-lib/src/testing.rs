//! In-memory index used by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;

use crate::extractor::{page_text, DownloadMetadata, ExtractError, PageExtractor};
use crate::fetcher::{BodyStream, HttpClient, HttpResponse, RetryPolicy, TransportError};
use crate::{CancelToken, Config, Fetcher, PackageName};

pub const INDEX: &str = "http://index.test";

/// Serves fixed bodies by URL, 404 for anything else, and counts requests.
#[derive(Default)]
pub struct MapClient {
	routes: Mutex<HashMap<String, (u16, Bytes)>>,
	hits: Mutex<HashMap<String, u32>>,
}

impl MapClient {
	pub fn route(self, url: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
		self.routes.lock().unwrap().insert(url.into(), (status, body.into()));
		self
	}

	pub fn hits(&self, url: &str) -> u32 {
		self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
	}
}

impl HttpClient for MapClient {
	async fn get(&self, url: &reqwest::Url) -> Result<HttpResponse, TransportError> {
		*self.hits.lock().unwrap().entry(url.to_string()).or_default() += 1;
		let (status, body) = self
			.routes
			.lock()
			.unwrap()
			.get(url.as_str())
			.cloned()
			.unwrap_or((404, Bytes::new()));
		let body: BodyStream = Box::pin(futures_util::stream::iter(vec![Ok(body)]));
		Ok(HttpResponse { status, body })
	}
}

/// Package pages are newline separated dependency names.
/// Download pages are `hash:<hex>` on the first line followed by one link per line.
pub struct LineExtractor;

impl PageExtractor for LineExtractor {
	fn dependency_names(&self, page: &[u8]) -> Result<Vec<String>, ExtractError> {
		let page = page_text(page)?;
		if page.starts_with("garbage") {
			return Err(ExtractError::Malformed("garbage page".to_string()));
		}
		Ok(page.lines().filter(|l| !l.trim().is_empty()).map(str::to_string).collect())
	}

	fn download_metadata(&self, page: &[u8]) -> Result<DownloadMetadata, ExtractError> {
		let page = page_text(page)?;
		let mut metadata = DownloadMetadata::default();
		for line in page.lines().filter(|l| !l.trim().is_empty()) {
			match line.strip_prefix("hash:") {
				Some(hash) => metadata.expected_hash = Some(hash.trim().to_string()),
				None => metadata.links.push(line.trim().to_string()),
			}
		}
		Ok(metadata)
	}
}

pub fn config() -> Config {
	let mut config = Config::default();
	config.set_index_url(INDEX);
	config.set_retry(RetryPolicy::new(2, Duration::ZERO, Duration::ZERO));
	config
}

pub fn fetcher(client: MapClient, config: &Config) -> Fetcher<MapClient> {
	Fetcher::new(client, config.retry().clone(), CancelToken::new())
}

pub fn name(s: &str) -> PackageName {
	PackageName::new(s).unwrap()
}

pub fn names(list: &[&str]) -> Vec<PackageName> {
	list.iter().map(|s| name(s)).collect()
}
