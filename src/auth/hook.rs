//! Static webhook credentials.
//!
//! A webhook URL has the shape `https://{domain}/rest/{user_id}/{secret}`. The secret
//! grants REST access to one account for as long as the webhook exists, so the
//! provider never performs network I/O and its refresh simply returns the same value.

// self
use crate::{
	_prelude::*,
	auth::{AuthActions, AuthFuture, Credentials, TokenSecret},
	error::MalformedError,
};

/// Connection parameters for a webhook; immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct HookParams {
	b24_url: String,
	user_id: u64,
	secret: TokenSecret,
}
impl HookParams {
	/// Validates an account URL (`https://acme.bitrix24.com`), user id, and secret.
	pub fn new(
		b24_url: impl AsRef<str>,
		user_id: u64,
		secret: impl Into<String>,
	) -> Result<Self, MalformedError> {
		let url = parse_http_url(b24_url.as_ref())?;

		if url.path() != "/" {
			return Err(MalformedError::UnexpectedBasePath);
		}

		Self::from_parts(&url, user_id, secret.into())
	}

	/// Parses a full webhook URL.
	///
	/// Every part of the path is load-bearing: the path must be exactly
	/// `/rest/{user_id}/{secret}` (a trailing slash is tolerated), the user id must be an
	/// unsigned integer, and the secret must be non-empty. Queries, fragments, and
	/// userinfo are rejected rather than dropped.
	pub fn from_webhook_url(webhook_url: &str) -> Result<Self, MalformedError> {
		let url = parse_http_url(webhook_url)?;
		let mut segments =
			url.path_segments().map(|segments| segments.collect::<Vec<_>>()).unwrap_or_default();

		if segments.last() == Some(&"") {
			segments.pop();
		}

		match segments.as_slice() {
			["rest", user_id, secret] => {
				let user_id = user_id
					.parse::<u64>()
					.map_err(|_| MalformedError::InvalidUserId { value: (*user_id).to_owned() })?;

				Self::from_parts(&url, user_id, (*secret).to_owned())
			},
			["rest", _] => Err(MalformedError::MissingSecret),
			_ => Err(MalformedError::UnexpectedPath { segments: segments.len() }),
		}
	}

	/// Account origin, e.g. `https://acme.bitrix24.com`.
	pub fn b24_url(&self) -> &str {
		&self.b24_url
	}

	/// Account domain without scheme, e.g. `acme.bitrix24.com`.
	pub fn domain(&self) -> &str {
		self.b24_url
			.strip_prefix("https://")
			.or_else(|| self.b24_url.strip_prefix("http://"))
			.unwrap_or(&self.b24_url)
	}

	/// User the webhook was issued for.
	pub fn user_id(&self) -> u64 {
		self.user_id
	}

	/// Webhook secret.
	pub fn secret(&self) -> &TokenSecret {
		&self.secret
	}

	fn from_parts(url: &Url, user_id: u64, secret: String) -> Result<Self, MalformedError> {
		if secret.is_empty() {
			return Err(MalformedError::MissingSecret);
		}

		Ok(Self {
			b24_url: url.origin().ascii_serialization(),
			user_id,
			secret: TokenSecret::new(secret),
		})
	}
}
impl FromStr for HookParams {
	type Err = MalformedError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::from_webhook_url(s)
	}
}
impl Debug for HookParams {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HookParams")
			.field("b24_url", &self.b24_url)
			.field("user_id", &self.user_id)
			.field("secret", &self.secret)
			.finish()
	}
}

/// Credential provider for a webhook.
pub struct HookAuth {
	params: HookParams,
	credentials: Credentials,
}
impl HookAuth {
	/// Freezes `params` into a provider.
	pub fn new(params: HookParams) -> Self {
		let credentials = Credentials::hook(params.secret.clone(), params.domain());

		Self { params, credentials }
	}

	/// Connection parameters the provider was built from.
	pub fn params(&self) -> &HookParams {
		&self.params
	}
}
impl AuthActions for HookAuth {
	fn credentials(&self) -> Option<Credentials> {
		Some(self.credentials.clone())
	}

	fn refresh(&self) -> AuthFuture<'_, Credentials> {
		Box::pin(std::future::ready(Ok(self.credentials.clone())))
	}

	fn target_origin(&self) -> String {
		self.params.b24_url.clone()
	}

	fn target_origin_with_path(&self) -> String {
		format!(
			"{}/rest/{}/{}",
			self.params.b24_url,
			self.params.user_id,
			self.params.secret.expose()
		)
	}
}
impl Debug for HookAuth {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HookAuth")
			.field("b24_url", &self.params.b24_url)
			.field("user_id", &self.params.user_id)
			.field("secret_fingerprint", &self.params.secret.fingerprint())
			.finish()
	}
}

fn parse_http_url(raw: &str) -> Result<Url, MalformedError> {
	let url = Url::parse(raw)?;

	if !matches!(url.scheme(), "http" | "https") {
		return Err(MalformedError::UnsupportedScheme { scheme: url.scheme().to_owned() });
	}
	if url.host_str().is_none_or(str::is_empty) {
		return Err(MalformedError::MissingHost);
	}
	if !url.username().is_empty() || url.password().is_some() {
		return Err(MalformedError::UnexpectedComponent { component: "userinfo" });
	}
	if url.query().is_some() {
		return Err(MalformedError::UnexpectedComponent { component: "query" });
	}
	if url.fragment().is_some() {
		return Err(MalformedError::UnexpectedComponent { component: "fragment" });
	}

	Ok(url)
}
