//! Scripted transport shared by the integration tests.

#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	sync::{Arc, Mutex},
	time::Duration,
};
// self
use b24_rest::{
	auth::{Credentials, OAuthParams, TokenSecret},
	error::TransportError,
	http::{RestRequest, RestResponse, RestTransport, TransportFuture},
	serde_json::{self, Value},
};

pub const WEBHOOK_URL: &str = "https://acme.bitrix24.com/rest/12/abcSECRETxyz";

/// Records every request and replays queued responses in order.
///
/// An empty queue answers with an I/O transport error.
#[derive(Debug, Default)]
pub struct MockTransport {
	responses: Mutex<VecDeque<RestResponse>>,
	requests: Mutex<Vec<RestRequest>>,
	latency: Option<Duration>,
}
impl MockTransport {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Every response is delayed by `latency` (use with a paused tokio clock).
	pub fn with_latency(latency: Duration) -> Arc<Self> {
		Arc::new(Self { latency: Some(latency), ..Default::default() })
	}

	pub fn push(&self, response: RestResponse) {
		self.responses
			.lock()
			.expect("Response queue lock should not be poisoned.")
			.push_back(response);
	}

	pub fn push_json(&self, status: u16, body: Value) {
		self.push(RestResponse::json(status, &body));
	}

	pub fn requests(&self) -> Vec<RestRequest> {
		self.requests.lock().expect("Request log lock should not be poisoned.").clone()
	}

	pub fn calls(&self) -> usize {
		self.requests.lock().expect("Request log lock should not be poisoned.").len()
	}
}
impl RestTransport for MockTransport {
	fn send(&self, request: RestRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			self.requests.lock().expect("Request log lock should not be poisoned.").push(request);

			if let Some(latency) = self.latency {
				tokio::time::sleep(latency).await;
			}

			let next = self
				.responses
				.lock()
				.expect("Response queue lock should not be poisoned.")
				.pop_front();

			next.ok_or_else(|| TransportError::Io(std::io::Error::other("mock queue is empty")))
		})
	}
}

pub fn oauth_params() -> OAuthParams {
	OAuthParams::with_default_server("local.app.123", "app-secret")
		.expect("Default authorization server should parse.")
}

pub fn live_credentials() -> Credentials {
	Credentials {
		access_token: TokenSecret::new("live-access"),
		refresh_token: TokenSecret::new("live-refresh"),
		expires_in: 3_600,
		domain: "acme.bitrix24.com".into(),
		member_id: "member-1".into(),
		issued_at: time::OffsetDateTime::now_utc(),
	}
}

pub fn token_body(access: &str, refresh: &str) -> Value {
	serde_json::json!({
		"access_token": access,
		"refresh_token": refresh,
		"expires_in": 3600,
		"domain": "oauth.bitrix.info",
		"member_id": "member-1",
		"client_endpoint": "https://acme.bitrix24.com/rest/",
		"status": "L"
	})
}

pub fn result_body(result: Value) -> Value {
	serde_json::json!({
		"result": result,
		"time": { "start": 1.0, "finish": 1.1, "duration": 0.1, "processing": 0.05 }
	})
}

pub fn expired_body() -> Value {
	serde_json::json!({
		"error": "expired_token",
		"error_description": "The access token provided has expired."
	})
}

/// Decodes the JSON body of a recorded request.
pub fn body_of(request: &RestRequest) -> Value {
	request.json_body().unwrap_or(Value::Null)
}
