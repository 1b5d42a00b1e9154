use futures_util::TryStreamExt;

use super::{BodyStream, HttpClient, HttpResponse, TransportError, TransportErrorKind};

/// Production [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
	client: reqwest::Client,
}

impl ReqwestClient {
	pub fn new(config: &crate::Config) -> crate::Result<Self> {
		let client = reqwest::Client::builder()
			.https_only(config.https_only())
			.timeout(config.request_timeout())
			.user_agent(config.user_agent())
			.build()?;
		Ok(Self { client })
	}
}

impl From<reqwest::Error> for TransportError {
	fn from(e: reqwest::Error) -> Self {
		let kind = if e.is_timeout() {
			TransportErrorKind::Timeout
		} else if e.is_connect() {
			TransportErrorKind::Connect
		} else if e.is_body() || e.is_decode() {
			TransportErrorKind::Body
		} else {
			TransportErrorKind::Request
		};
		TransportError::new(kind, e.to_string())
	}
}

impl HttpClient for ReqwestClient {
	async fn get(&self, url: &reqwest::Url) -> Result<HttpResponse, TransportError> {
		let response = self.client.get(url.clone()).send().await?;
		let status = response.status().as_u16();
		let body: BodyStream = Box::pin(response.bytes_stream().map_err(TransportError::from));
		Ok(HttpResponse { status, body })
	}
}
