//! Refreshable OAuth credentials with singleflight token exchanges.
//!
//! [`OAuthAuth`] holds one access/refresh token pair for an account. When the dispatcher
//! finds the access token missing or rejected it calls [`AuthActions::refresh`], which
//! performs a `grant_type=refresh_token` exchange against the authorization server.
//! Exchanges are serialized by an async mutex and tagged with a generation counter:
//! a caller that queued behind a running exchange receives that exchange's outcome
//! instead of sending a second one, so a rotated refresh token is never replayed.
//! A call whose token was rejected after a later exchange already replaced it receives
//! the replacement through [`AuthActions::refresh_rejected`].

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{AuthActions, AuthFuture, Credentials, TokenSecret},
	error::{MalformedError, RawResponse},
	http::{RestRequest, RestResponse, RestTransport},
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Authorization server used by Bitrix24 cloud accounts.
pub const DEFAULT_AUTH_SERVER: &str = "https://oauth.bitrix.info";

/// Application credentials and the token endpoint they are exchanged at.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthParams {
	client_id: String,
	client_secret: TokenSecret,
	token_url: Url,
}
impl OAuthParams {
	/// Builds params for the given authorization server origin.
	pub fn new(
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		auth_server: &str,
	) -> Result<Self, MalformedError> {
		let server = Url::parse(auth_server)?;

		if !matches!(server.scheme(), "http" | "https") {
			return Err(MalformedError::UnsupportedScheme { scheme: server.scheme().to_owned() });
		}
		if server.host_str().is_none_or(str::is_empty) {
			return Err(MalformedError::MissingHost);
		}

		let token_url = server.join("/oauth/token/")?;

		Ok(Self {
			client_id: client_id.into(),
			client_secret: TokenSecret::new(client_secret),
			token_url,
		})
	}

	/// Builds params for [`DEFAULT_AUTH_SERVER`].
	pub fn with_default_server(
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> Result<Self, MalformedError> {
		Self::new(client_id, client_secret, DEFAULT_AUTH_SERVER)
	}

	/// Application client identifier.
	pub fn client_id(&self) -> &str {
		&self.client_id
	}

	/// Token endpoint, e.g. `https://oauth.bitrix.info/oauth/token/`.
	pub fn token_url(&self) -> &Url {
		&self.token_url
	}

	fn refresh_url(&self, refresh_token: &TokenSecret) -> Url {
		let mut url = self.token_url.clone();

		url.query_pairs_mut()
			.append_pair("grant_type", "refresh_token")
			.append_pair("client_id", &self.client_id)
			.append_pair("client_secret", self.client_secret.expose())
			.append_pair("refresh_token", refresh_token.expose());

		url
	}
}
impl Debug for OAuthParams {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthParams")
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret)
			.field("token_url", &self.token_url.as_str())
			.finish()
	}
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
	access_token: String,
	refresh_token: String,
	expires_in: i64,
	#[serde(default)]
	member_id: String,
	#[serde(default)]
	client_endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
	error: String,
	#[serde(default)]
	error_description: Option<String>,
}

#[derive(Debug)]
struct OAuthState {
	credentials: Credentials,
	client_endpoint: Option<String>,
}

/// Credential provider for an OAuth application installed on one account.
pub struct OAuthAuth {
	params: OAuthParams,
	transport: Arc<dyn RestTransport>,
	state: RwLock<OAuthState>,
	refresh_guard: AsyncMutex<()>,
	generation: AtomicU64,
	last_outcome: Mutex<Option<Result<Credentials, String>>>,
	metrics: RefreshMetrics,
}
impl OAuthAuth {
	/// Creates a provider holding `credentials`.
	pub fn new(
		params: OAuthParams,
		credentials: Credentials,
		transport: Arc<dyn RestTransport>,
	) -> Self {
		Self {
			params,
			transport,
			state: RwLock::new(OAuthState { credentials, client_endpoint: None }),
			refresh_guard: AsyncMutex::new(()),
			generation: AtomicU64::new(0),
			last_outcome: Mutex::new(None),
			metrics: RefreshMetrics::default(),
		}
	}

	/// Creates a provider that only knows a refresh token; the first call refreshes.
	pub fn from_refresh_token(
		params: OAuthParams,
		refresh_token: impl Into<String>,
		domain: impl Into<String>,
		transport: Arc<dyn RestTransport>,
	) -> Self {
		Self::new(params, Credentials::pending_refresh(refresh_token, domain), transport)
	}

	/// Application params.
	pub fn params(&self) -> &OAuthParams {
		&self.params
	}

	/// Refresh counters.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Returns `true` when the held access token is missing or expires within `window`.
	pub fn needs_refresh(&self, window: Duration) -> bool {
		let state = self.state.read();

		!state.credentials.is_usable_at(OffsetDateTime::now_utc() + window)
	}

	async fn refresh_shared(&self, rejected: Option<TokenSecret>) -> Result<Credentials> {
		const KIND: OpKind = OpKind::Refresh;

		let observed = self.generation.load(Ordering::Acquire);
		let _singleflight = self.refresh_guard.lock().await;

		if self.generation.load(Ordering::Acquire) != observed {
			self.metrics.record_shared();

			return match self.last_outcome.lock().clone() {
				Some(Ok(credentials)) => Ok(credentials),
				Some(Err(reason)) => Err(Error::AuthUnavailable { reason }),
				None => Err(Error::AuthUnavailable {
					reason: "the concurrent refresh left no outcome".into(),
				}),
			};
		}

		// A rejection of an already replaced token is answered with the replacement.
		let replaced = rejected
			.and_then(|rejected| self.credentials().filter(|held| held.access_token != rejected));

		if let Some(held) = replaced {
			self.metrics.record_shared();

			return Ok(held);
		}

		let span = OpSpan::new(KIND, "oauth/token");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);
		self.metrics.record_attempt();

		let result = span.instrument(self.exchange()).await;

		match &result {
			Ok(_) => {
				self.metrics.record_success();
				obs::record_op_outcome(KIND, OpOutcome::Success);
			},
			Err(e) => {
				self.metrics.record_failure();
				obs::record_op_outcome(KIND, OpOutcome::Failure);
				obs::record_op_error(KIND, e.kind());
			},
		}

		*self.last_outcome.lock() = Some(result.as_ref().cloned().map_err(ToString::to_string));
		self.generation.fetch_add(1, Ordering::AcqRel);

		result
	}

	async fn exchange(&self) -> Result<Credentials> {
		let (refresh_token, domain) = {
			let state = self.state.read();

			(state.credentials.refresh_token.clone(), state.credentials.domain.clone())
		};

		if refresh_token.is_empty() {
			return Err(Error::AuthUnavailable { reason: "no refresh token is held".into() });
		}

		let response =
			self.transport.send(RestRequest::get(self.params.refresh_url(&refresh_token))).await?;
		let issued_at = OffsetDateTime::now_utc();
		let token = parse_token_response(&response)?;

		if token.expires_in <= 0 {
			return Err(MalformedError::NonPositiveExpiresIn.into());
		}

		let client_endpoint = token.client_endpoint.filter(|endpoint| !endpoint.is_empty());
		let domain = client_endpoint
			.as_deref()
			.and_then(|endpoint| Url::parse(endpoint).ok())
			.and_then(|url| url.host_str().map(ToOwned::to_owned))
			.unwrap_or(domain);
		let credentials = Credentials {
			access_token: TokenSecret::new(token.access_token),
			refresh_token: TokenSecret::new(token.refresh_token),
			expires_in: token.expires_in,
			domain,
			member_id: token.member_id,
			issued_at,
		};
		let mut state = self.state.write();

		state.credentials = credentials.clone();

		if client_endpoint.is_some() {
			state.client_endpoint = client_endpoint;
		}

		Ok(credentials)
	}
}
impl AuthActions for OAuthAuth {
	fn credentials(&self) -> Option<Credentials> {
		let state = self.state.read();

		state.credentials.is_usable_at(OffsetDateTime::now_utc()).then(|| state.credentials.clone())
	}

	fn refresh(&self) -> AuthFuture<'_, Credentials> {
		Box::pin(self.refresh_shared(None))
	}

	fn refresh_rejected(&self, rejected: &Credentials) -> AuthFuture<'_, Credentials> {
		Box::pin(self.refresh_shared(Some(rejected.access_token.clone())))
	}

	fn target_origin(&self) -> String {
		format!("https://{}", self.state.read().credentials.domain)
	}

	fn target_origin_with_path(&self) -> String {
		let state = self.state.read();

		match &state.client_endpoint {
			Some(endpoint) => endpoint.trim_end_matches('/').to_owned(),
			None => format!("https://{}/rest", state.credentials.domain),
		}
	}
}
impl Debug for OAuthAuth {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.read();

		f.debug_struct("OAuthAuth")
			.field("params", &self.params)
			.field("credentials", &state.credentials)
			.field("generation", &self.generation.load(Ordering::Relaxed))
			.finish()
	}
}

fn parse_token_response(response: &RestResponse) -> Result<TokenResponse> {
	if let Ok(body) = serde_json::from_slice::<TokenErrorBody>(&response.body) {
		let reason = match body.error_description {
			Some(description) if !description.is_empty() =>
				format!("{} ({description})", body.error),
			_ => body.error,
		};

		return Err(Error::AuthUnavailable { reason });
	}
	if !response.is_success() {
		return Err(Error::AuthUnavailable {
			reason: format!("token endpoint answered with status {}", response.status),
		});
	}

	let mut deserializer = serde_json::Deserializer::from_slice(&response.body);

	serde_path_to_error::deserialize(&mut deserializer).map_err(|source| {
		MalformedError::Response {
			source,
			raw: Box::new(RawResponse {
				status: response.status,
				retry_after: response.retry_after,
				body: response.body_text().into_owned(),
			}),
		}
		.into()
	})
}
