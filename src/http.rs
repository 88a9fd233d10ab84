//! Transport primitives for REST calls and token exchanges.
//!
//! [`RestTransport`] is the client's only dependency on an HTTP stack. The dispatcher
//! and the OAuth provider hand it fully built [`RestRequest`]s and classify the
//! returned [`RestResponse`] themselves, so implementations only move bytes and map
//! network failures into [`TransportError`]. A request that cannot complete within
//! the transport's timeout must resolve to [`TransportError::Timeout`] instead of
//! hanging.

// std
use std::borrow::Cow;
// crates.io
#[cfg(feature = "reqwest")] use reqwest::header::{HeaderMap, RETRY_AFTER};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::TransportError};

/// Boxed future returned by [`RestTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<RestResponse, TransportError>> + 'a + Send>>;

/// HTTP transport capable of executing one request.
///
/// Implementations must be `Send + Sync` so a single transport can be shared by the
/// dispatcher and the OAuth provider behind `Arc<dyn RestTransport>`.
pub trait RestTransport
where
	Self: Send + Sync,
{
	/// Sends `request` and resolves with the response, whatever its status.
	fn send(&self, request: RestRequest) -> TransportFuture<'_>;
}

/// HTTP methods used by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
	/// `GET`, used for token exchanges.
	Get,
	/// `POST`, used for REST calls.
	Post,
}
impl HttpMethod {
	/// Returns the method name.
	pub const fn as_str(self) -> &'static str {
		match self {
			HttpMethod::Get => "GET",
			HttpMethod::Post => "POST",
		}
	}
}
impl Display for HttpMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outbound request handed to a [`RestTransport`].
#[derive(Clone, PartialEq, Eq)]
pub struct RestRequest {
	/// HTTP method.
	pub method: HttpMethod,
	/// Absolute URL, possibly embedding a webhook secret or token query.
	pub url: Url,
	/// Extra headers.
	pub headers: Vec<(String, String)>,
	/// Request body.
	pub body: Option<Vec<u8>>,
}
impl RestRequest {
	/// Builds a body-less `GET` request.
	pub fn get(url: Url) -> Self {
		Self { method: HttpMethod::Get, url, headers: Vec::new(), body: None }
	}

	/// Builds a `POST` request carrying a JSON body.
	pub fn post_json(url: Url, body: Vec<u8>) -> Self {
		Self {
			method: HttpMethod::Post,
			url,
			headers: vec![("content-type".into(), "application/json".into())],
			body: Some(body),
		}
	}

	/// Adds a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Body parsed as JSON, if any.
	pub fn json_body(&self) -> Option<Value> {
		self.body.as_deref().and_then(|body| serde_json::from_slice(body).ok())
	}
}
impl Debug for RestRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		// Paths and queries may carry webhook secrets or tokens.
		f.debug_struct("RestRequest")
			.field("method", &self.method)
			.field("origin", &self.url.origin().ascii_serialization())
			.field("headers", &self.headers.len())
			.field("body_len", &self.body.as_ref().map(Vec::len))
			.finish()
	}
}

/// Response returned by a [`RestTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestResponse {
	/// HTTP status code.
	pub status: u16,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl RestResponse {
	/// Builds a response with a JSON body and no retry hint.
	pub fn json(status: u16, body: &Value) -> Self {
		Self { status, retry_after: None, body: body.to_string().into_bytes() }
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Body decoded lossily as UTF-8.
	pub fn body_text(&self) -> Cow<'_, str> {
		String::from_utf8_lossy(&self.body)
	}
}

/// Thin wrapper around [`ReqwestClient`] that applies a per-request timeout.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestHttpClient {
	client: ReqwestClient,
	timeout: StdDuration,
}
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Timeout applied when none is configured.
	pub const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(30);

	/// Builds a client that does not follow redirects.
	pub fn new() -> Result<Self, crate::error::ConfigError> {
		let client =
			ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

		Ok(Self::with_client(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self { client, timeout: Self::DEFAULT_TIMEOUT }
	}

	/// Overrides the per-request timeout.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.client
	}
}
#[cfg(feature = "reqwest")]
impl RestTransport for ReqwestHttpClient {
	fn send(&self, request: RestRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let method = match request.method {
				HttpMethod::Get => reqwest::Method::GET,
				HttpMethod::Post => reqwest::Method::POST,
			};
			let mut builder = self.client.request(method, request.url).timeout(self.timeout);

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if let Some(body) = request.body {
				builder = builder.body(body);
			}

			let response = builder.send().await?;
			let status = response.status().as_u16();
			let retry_after = parse_retry_after(response.headers());
			let body = response.bytes().await?.to_vec();

			Ok(RestResponse { status, retry_after, body })
		})
	}
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(secs as i64));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
