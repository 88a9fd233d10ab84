//! External-facing client that owns one credential provider and its dispatcher.
//!
//! A [`Client`] is either built ready to use ([`Client::from_webhook_url`],
//! [`Client::hook`], [`Client::oauth`], [`Client::new`]) or created empty with
//! [`Client::deferred`] and filled in once through [`Client::initialize`]. Until then
//! every accessor fails with [`Error::NotInitialized`], which callers can tell apart
//! from a remote [`Error::AuthExpired`] through [`Error::kind`].

// std
use std::sync::OnceLock;
// self
use crate::{
	_prelude::*,
	auth::{AuthActions, Credentials, HookAuth, HookParams, OAuthAuth, OAuthParams},
	dispatch::{CallOutcome, Dispatcher},
	error::ConfigError,
	http::RestTransport,
	obs::Logger,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

/// REST client for one account.
#[derive(Default)]
pub struct Client {
	dispatcher: OnceLock<Dispatcher>,
}
impl Client {
	/// Creates an initialized client around a provider and transport.
	pub fn new(auth: Arc<dyn AuthActions>, transport: Arc<dyn RestTransport>) -> Self {
		Self::with_dispatcher(Dispatcher::new(auth, transport))
	}

	/// Creates an initialized client around a preconfigured dispatcher.
	pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
		Self { dispatcher: OnceLock::from(dispatcher) }
	}

	/// Creates a client that must be initialized before use.
	pub fn deferred() -> Self {
		Self::default()
	}

	/// Installs the dispatcher of a deferred client. Fails if one is already installed.
	pub fn initialize(&self, dispatcher: Dispatcher) -> Result<()> {
		self.dispatcher.set(dispatcher).map_err(|_| ConfigError::AlreadyInitialized.into())
	}

	/// Creates a webhook client over `transport` with the client-side warning enabled.
	pub fn hook_with_transport(params: HookParams, transport: Arc<dyn RestTransport>) -> Self {
		let dispatcher = Dispatcher::new(Arc::new(HookAuth::new(params)), transport);

		dispatcher.set_client_side_warning(true, None);

		Self::with_dispatcher(dispatcher)
	}

	/// Parses a webhook URL and creates a client over `transport`.
	pub fn from_webhook_url_with_transport(
		webhook_url: &str,
		transport: Arc<dyn RestTransport>,
	) -> Result<Self> {
		Ok(Self::hook_with_transport(HookParams::from_webhook_url(webhook_url)?, transport))
	}

	/// Creates an OAuth client over `transport`.
	pub fn oauth_with_transport(
		params: OAuthParams,
		credentials: Credentials,
		transport: Arc<dyn RestTransport>,
	) -> Self {
		let auth = OAuthAuth::new(params, credentials, transport.clone());

		Self::new(Arc::new(auth), transport)
	}

	/// Creates a webhook client over the default reqwest transport.
	#[cfg(feature = "reqwest")]
	pub fn hook(params: HookParams) -> Result<Self> {
		Ok(Self::hook_with_transport(params, Arc::new(ReqwestHttpClient::new()?)))
	}

	/// Parses a webhook URL (`https://{domain}/rest/{user_id}/{secret}`) and creates a
	/// client over the default reqwest transport.
	#[cfg(feature = "reqwest")]
	pub fn from_webhook_url(webhook_url: &str) -> Result<Self> {
		Self::hook(HookParams::from_webhook_url(webhook_url)?)
	}

	/// Creates an OAuth client over the default reqwest transport.
	#[cfg(feature = "reqwest")]
	pub fn oauth(params: OAuthParams, credentials: Credentials) -> Result<Self> {
		Ok(Self::oauth_with_transport(params, credentials, Arc::new(ReqwestHttpClient::new()?)))
	}

	/// Returns `true` once a dispatcher is installed.
	pub fn is_initialized(&self) -> bool {
		self.dispatcher.get().is_some()
	}

	/// Dispatcher performing the calls.
	pub fn dispatcher(&self) -> Result<&Dispatcher> {
		self.dispatcher.get().ok_or(Error::NotInitialized)
	}

	/// Credential provider.
	pub fn auth(&self) -> Result<&Arc<dyn AuthActions>> {
		Ok(self.dispatcher()?.auth())
	}

	/// Scheme and host of the account.
	pub fn target_origin(&self) -> Result<String> {
		Ok(self.auth()?.target_origin())
	}

	/// Base address REST calls are sent to. Embeds the webhook secret; never log it.
	pub fn target_origin_with_path(&self) -> Result<String> {
		Ok(self.auth()?.target_origin_with_path())
	}

	/// Calls a REST method, e.g. `crm.deal.list`.
	pub async fn call_method(&self, method: &str, params: Value) -> CallOutcome {
		self.dispatcher()?.dispatch(method, params).await
	}

	/// Calls a REST method and converts its `result` into `T`.
	pub async fn call_method_as<T>(&self, method: &str, params: Value) -> CallOutcome<T>
	where
		T: DeserializeOwned,
	{
		self.dispatcher()?.dispatch_as(method, params).await
	}

	/// Attaches a logger to the dispatcher and throttle.
	pub fn set_logger(&self, logger: Arc<Logger>) -> Result<()> {
		self.dispatcher()?.set_logger(logger);

		Ok(())
	}

	/// Silences the client-side warning for webhook credentials.
	pub fn off_client_side_warning(&self) -> Result<()> {
		self.dispatcher()?.set_client_side_warning(false, None);

		Ok(())
	}
}
impl Debug for Client {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Client").field("dispatcher", &self.dispatcher.get()).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{ErrorKind, error::TransportError, http::TransportFuture};

	struct Offline;
	impl RestTransport for Offline {
		fn send(&self, _: crate::http::RestRequest) -> TransportFuture<'_> {
			Box::pin(async { Err(TransportError::Io(std::io::Error::other("offline"))) })
		}
	}

	const WEBHOOK: &str = "https://acme.bitrix24.com/rest/12/abcSECRETxyz";

	#[test]
	fn deferred_client_is_not_initialized() {
		let client = Client::deferred();

		assert!(!client.is_initialized());
		assert_eq!(
			client.target_origin().expect_err("Deferred client has no origin.").kind(),
			ErrorKind::NotInitialized
		);
		assert_eq!(
			client.target_origin_with_path().expect_err("Deferred client has no base.").kind(),
			ErrorKind::NotInitialized
		);
		assert!(client.off_client_side_warning().is_err());
	}

	#[test]
	fn initialize_installs_once() {
		let client = Client::deferred();
		let params = HookParams::from_webhook_url(WEBHOOK).expect("Webhook fixture should parse.");
		let dispatcher =
			Dispatcher::new(Arc::new(HookAuth::new(params.clone())), Arc::new(Offline));

		client.initialize(dispatcher).expect("First initialization should succeed.");

		assert_eq!(
			client.target_origin_with_path().expect("Initialized client has a base."),
			WEBHOOK
		);

		let again = Dispatcher::new(Arc::new(HookAuth::new(params)), Arc::new(Offline));

		assert!(matches!(
			client.initialize(again),
			Err(Error::Config(ConfigError::AlreadyInitialized))
		));
	}

	#[test]
	fn webhook_client_enables_then_silences_warning() {
		let client = Client::from_webhook_url_with_transport(WEBHOOK, Arc::new(Offline))
			.expect("Webhook client should build.");
		let dispatcher = client.dispatcher().expect("Webhook client is initialized.");

		assert!(dispatcher.client_side_warning().enabled);

		client.off_client_side_warning().expect("Initialized client accepts the toggle.");

		assert!(!dispatcher.client_side_warning().enabled);
		assert_eq!(
			client.target_origin().expect("Initialized client has an origin."),
			"https://acme.bitrix24.com"
		);
	}

	#[test]
	fn malformed_webhook_fails_at_construction() {
		let err = Client::from_webhook_url_with_transport(
			"https://acme.bitrix24.com/rest/abc/secret",
			Arc::new(Offline),
		)
		.expect_err("Non-numeric user id should be rejected.");

		assert_eq!(err.kind(), ErrorKind::Malformed);
	}
}
