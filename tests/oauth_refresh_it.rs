mod common;

// std
use std::{
	sync::{Arc, Mutex},
	time::Duration,
};
// self
use b24_rest::{
	Client, ErrorKind,
	auth::{AuthActions, Credentials, OAuthAuth},
	http::{RestRequest, RestResponse, RestTransport, TransportFuture},
	serde_json::{Value, json},
};
use common::*;

/// Answers by route: the token endpoint rotates to `rotated-access`, REST calls made with
/// `live-access` are rejected after a per-method delay, everything else succeeds.
#[derive(Default)]
struct StaggeredTransport {
	requests: Mutex<Vec<RestRequest>>,
}
impl StaggeredTransport {
	fn exchanges(&self) -> usize {
		self.requests
			.lock()
			.expect("Request log lock should not be poisoned.")
			.iter()
			.filter(|request| request.url.path() == "/oauth/token/")
			.count()
	}
}
impl RestTransport for StaggeredTransport {
	fn send(&self, request: RestRequest) -> TransportFuture<'_> {
		let path = request.url.path().to_owned();
		let token = body_of(&request)["auth"].as_str().map(ToOwned::to_owned);

		self.requests.lock().expect("Request log lock should not be poisoned.").push(request);

		Box::pin(async move {
			let (delay, status, body) = match (path.as_str(), token.as_deref()) {
				("/oauth/token/", _) => (10, 200, token_body("rotated-access", "rotated-refresh")),
				("/rest/user.current.json", Some("live-access")) => (10, 401, expired_body()),
				("/rest/crm.deal.list.json", Some("live-access")) => (200, 401, expired_body()),
				_ => (10, 200, result_body(json!({ "ID": "1" }))),
			};

			tokio::time::sleep(Duration::from_millis(delay)).await;

			Ok(RestResponse::json(status, &body))
		})
	}
}

#[tokio::test(start_paused = true)]
async fn concurrent_refreshes_share_one_exchange() {
	let transport = MockTransport::with_latency(Duration::from_millis(50));

	transport.push_json(200, token_body("shared-access", "shared-refresh"));

	let auth = OAuthAuth::from_refresh_token(
		oauth_params(),
		"seed-refresh",
		"acme.bitrix24.com",
		transport.clone(),
	);
	let (first, second) = tokio::join!(auth.refresh(), auth.refresh());
	let first = first.expect("Leading refresh should succeed.");
	let second = second.expect("Queued refresh should reuse the leading outcome.");

	assert_eq!(first, second);
	assert_eq!(first.access_token.expose(), "shared-access");
	assert_eq!(transport.calls(), 1);
	assert_eq!(auth.metrics().attempts(), 1);
	assert_eq!(auth.metrics().shared(), 1);
}

#[tokio::test(start_paused = true)]
async fn queued_refreshes_share_a_failure() {
	let transport = MockTransport::with_latency(Duration::from_millis(50));

	transport.push_json(400, json!({ "error": "invalid_grant" }));

	let auth = OAuthAuth::from_refresh_token(
		oauth_params(),
		"revoked-refresh",
		"acme.bitrix24.com",
		transport.clone(),
	);
	let (first, second) = tokio::join!(auth.refresh(), auth.refresh());

	assert_eq!(first.expect_err("Leading refresh should fail.").kind(), ErrorKind::AuthUnavailable);
	assert_eq!(second.expect_err("Queued refresh should fail.").kind(), ErrorKind::AuthUnavailable);
	assert_eq!(transport.calls(), 1);
	assert_eq!(auth.metrics().failures(), 1);
}

#[tokio::test]
async fn sequential_refreshes_rotate_the_refresh_token() {
	let transport = MockTransport::new();

	transport.push_json(200, token_body("access-1", "refresh-1"));
	transport.push_json(200, token_body("access-2", "refresh-2"));

	let auth = OAuthAuth::from_refresh_token(
		oauth_params(),
		"refresh-0",
		"acme.bitrix24.com",
		transport.clone(),
	);

	auth.refresh().await.expect("First refresh should succeed.");

	let latest = auth.refresh().await.expect("Second refresh should succeed.");

	assert_eq!(latest.access_token.expose(), "access-2");
	assert_eq!(transport.calls(), 2);

	let sent = transport
		.requests()
		.iter()
		.map(|request| {
			request
				.url
				.query_pairs()
				.find(|(key, _)| key == "refresh_token")
				.map(|(_, value)| value.into_owned())
				.expect("Exchange should carry a refresh token.")
		})
		.collect::<Vec<_>>();

	assert_eq!(sent, ["refresh-0", "refresh-1"]);
}

#[tokio::test(start_paused = true)]
async fn concurrent_calls_without_credentials_refresh_once() {
	let transport = MockTransport::with_latency(Duration::from_millis(50));

	transport.push_json(200, token_body("shared-access", "shared-refresh"));
	transport.push_json(200, result_body(json!({ "ID": "1" })));
	transport.push_json(200, result_body(json!({ "ID": "1" })));

	let client = Client::oauth_with_transport(
		oauth_params(),
		Credentials::pending_refresh("seed-refresh", "acme.bitrix24.com"),
		transport.clone(),
	);
	let (first, second) = tokio::join!(
		client.call_method("user.current", Value::Null),
		client.call_method("user.current", Value::Null),
	);

	first.expect("First concurrent call should succeed.");
	second.expect("Second concurrent call should succeed.");

	let exchanges = transport
		.requests()
		.iter()
		.filter(|request| request.url.path() == "/oauth/token/")
		.count();

	assert_eq!(exchanges, 1);
	assert_eq!(transport.calls(), 3);
	assert_eq!(
		client.target_origin_with_path().expect("OAuth client is initialized."),
		"https://acme.bitrix24.com/rest"
	);
}

#[tokio::test(start_paused = true)]
async fn late_rejection_reuses_the_rotated_token() {
	let transport = Arc::new(StaggeredTransport::default());
	let auth = Arc::new(OAuthAuth::new(oauth_params(), live_credentials(), transport.clone()));
	let client = Client::new(auth.clone() as Arc<dyn AuthActions>, transport.clone());
	let (fast, slow) = tokio::join!(
		client.call_method("user.current", Value::Null),
		client.call_method("crm.deal.list", Value::Null),
	);

	fast.expect("Fast call should succeed after its refresh.");
	slow.expect("Slow call should succeed with the rotated token.");

	assert_eq!(transport.exchanges(), 1);
	assert_eq!(auth.metrics().attempts(), 1);
	assert_eq!(auth.metrics().shared(), 1);

	let retried = transport
		.requests
		.lock()
		.expect("Request log lock should not be poisoned.")
		.iter()
		.filter(|request| body_of(request)["auth"] == "rotated-access")
		.count();

	assert_eq!(retried, 2);
}

#[tokio::test]
async fn expired_credentials_are_not_handed_out() {
	let transport = MockTransport::new();
	let mut credentials = live_credentials();

	credentials.issued_at -= time::Duration::hours(2);

	let auth: Arc<dyn AuthActions> =
		Arc::new(OAuthAuth::new(oauth_params(), credentials, transport));

	assert!(auth.credentials().is_none());
	assert_eq!(auth.target_origin(), "https://acme.bitrix24.com");
}
