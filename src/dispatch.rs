//! Throttled, authenticated REST call dispatch.
//!
//! [`Dispatcher::dispatch`] composes the pieces around one logical call:
//!
//! 1. Make sure the credential provider holds usable credentials, refreshing first if not.
//! 2. Resolve the base address and wait for [`Throttle`] admission.
//! 3. `POST {base}/{method}.json` with the JSON params; OAuth access tokens travel in the
//!    `auth` parameter while webhook secrets already live in the base address.
//! 4. On `expired_token`/`invalid_token`, refresh and repeat steps 2-3 exactly once. A
//!    second rejection surfaces as [`Error::AuthExpired`].
//! 5. Every other failure is mapped to a typed [`Error`] without retrying.

mod response;

pub use response::*;

// crates.io
use serde_json::Map;
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	auth::{AuthActions, Credentials},
	error::{ConfigError, MalformedError, RawResponse},
	http::{RestRequest, RestTransport},
	obs::{self, Logger, OpKind, OpOutcome, OpSpan},
	throttle::Throttle,
};

/// Message logged when webhook credentials are used with the client-side warning on.
pub const DEFAULT_CLIENT_SIDE_WARNING: &str =
	"It is not safe to use hook requests on the client side";

/// Advisory warning about shipping webhook secrets to untrusted environments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSideWarning {
	/// Whether the warning is logged.
	pub enabled: bool,
	/// Logged message.
	pub message: String,
}
impl Default for ClientSideWarning {
	fn default() -> Self {
		Self { enabled: false, message: DEFAULT_CLIENT_SIDE_WARNING.into() }
	}
}

enum Attempt {
	Done(CallSuccess),
	AuthExpired(RawResponse),
}

/// Performs REST calls for one credential provider.
pub struct Dispatcher {
	auth: Arc<dyn AuthActions>,
	transport: Arc<dyn RestTransport>,
	throttle: Throttle,
	admission_timeout: Option<StdDuration>,
	warning: RwLock<ClientSideWarning>,
	warned: AtomicBool,
	logger: RwLock<Option<Arc<Logger>>>,
}
impl Dispatcher {
	/// Creates a dispatcher with the default throttle settings.
	pub fn new(auth: Arc<dyn AuthActions>, transport: Arc<dyn RestTransport>) -> Self {
		Self {
			auth,
			transport,
			throttle: Throttle::default(),
			admission_timeout: None,
			warning: Default::default(),
			warned: AtomicBool::new(false),
			logger: Default::default(),
		}
	}

	/// Replaces the throttle.
	pub fn with_throttle(mut self, throttle: Throttle) -> Self {
		self.throttle = throttle;

		self
	}

	/// Bounds how long a call may wait for throttle admission.
	///
	/// Without it a call waits until admitted, however long that takes.
	pub fn with_admission_timeout(mut self, timeout: StdDuration) -> Self {
		self.admission_timeout = Some(timeout);

		self
	}

	/// Credential provider used for every call.
	pub fn auth(&self) -> &Arc<dyn AuthActions> {
		&self.auth
	}

	/// Throttle shared by every call.
	pub fn throttle(&self) -> &Throttle {
		&self.throttle
	}

	/// Attaches a logger to the dispatcher and its throttle.
	pub fn set_logger(&self, logger: Arc<Logger>) {
		self.throttle.set_logger(logger.clone());

		*self.logger.write() = Some(logger);
	}

	/// Turns the client-side warning on or off; `message` replaces the logged text.
	pub fn set_client_side_warning(&self, enabled: bool, message: Option<String>) {
		let mut warning = self.warning.write();

		warning.enabled = enabled;

		if let Some(message) = message {
			warning.message = message;
		}

		self.warned.store(false, Ordering::Relaxed);
	}

	/// Current client-side warning settings.
	pub fn client_side_warning(&self) -> ClientSideWarning {
		self.warning.read().clone()
	}

	/// Performs one REST call.
	///
	/// `params` must be a JSON object or `null`.
	pub async fn dispatch(&self, method: &str, params: Value) -> CallOutcome {
		const KIND: OpKind = OpKind::Dispatch;

		let span = OpSpan::new(KIND, method);

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span.instrument(self.dispatch_inner(method, params)).await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(e) => {
				obs::record_op_outcome(KIND, OpOutcome::Failure);
				obs::record_op_error(KIND, e.kind());
				self.log(|logger| {
					logger.error(format_args!("`{method}` failed ({}): {e}", e.kind()));
				});
			},
		}

		result
	}

	/// Performs one REST call and converts its `result` into `T`.
	pub async fn dispatch_as<T>(&self, method: &str, params: Value) -> CallOutcome<T>
	where
		T: DeserializeOwned,
	{
		self.dispatch(method, params).await?.deserialize_result()
	}

	async fn dispatch_inner(&self, method: &str, params: Value) -> CallOutcome {
		validate_method(method)?;

		let params = match params {
			Value::Null => Map::new(),
			Value::Object(map) => map,
			_ => return Err(ConfigError::InvalidParams.into()),
		};
		let credentials = match self.auth.credentials() {
			Some(credentials) => credentials,
			None => self.refresh(None).await?,
		};

		self.warn_client_side(&credentials);

		let raw = match self.attempt(method, &params, &credentials).await? {
			Attempt::Done(success) => return Ok(success),
			Attempt::AuthExpired(raw) => raw,
		};

		self.log(|logger| {
			logger.info(format_args!(
				"access token rejected for `{method}` with status {}, refreshing",
				raw.status
			));
		});

		let credentials = self.refresh(Some(&credentials)).await?;

		match self.attempt(method, &params, &credentials).await? {
			Attempt::Done(success) => Ok(success),
			Attempt::AuthExpired(raw) =>
				Err(Error::AuthExpired { method: method.to_owned(), raw: Box::new(raw) }),
		}
	}

	async fn attempt(
		&self,
		method: &str,
		params: &Map<String, Value>,
		credentials: &Credentials,
	) -> Result<Attempt> {
		let base = self.auth.target_origin_with_path();

		self.admit(method).await?;

		let url = Url::parse(&format!("{}/{method}.json", base.trim_end_matches('/')))
			.map_err(MalformedError::from)?;
		let mut body = params.clone();

		if !credentials.is_hook() {
			body.insert("auth".into(), Value::String(credentials.access_token.expose().to_owned()));
		}

		let body = serde_json::to_vec(&body).map_err(ConfigError::from)?;
		let response = self.transport.send(RestRequest::post_json(url, body)).await?;

		match response::classify(response) {
			Classified::Success(success) => Ok(Attempt::Done(success)),
			Classified::AuthExpired(raw) => Ok(Attempt::AuthExpired(raw)),
			Classified::Failure(e) => Err(e),
		}
	}

	async fn admit(&self, method: &str) -> Result<()> {
		match self.admission_timeout {
			Some(timeout) => self.throttle.admit_until(method, Instant::now() + timeout).await?,
			None => self.throttle.admit(method).await,
		}

		Ok(())
	}

	async fn refresh(&self, rejected: Option<&Credentials>) -> Result<Credentials> {
		let refreshed = match rejected {
			Some(rejected) => self.auth.refresh_rejected(rejected).await,
			None => self.auth.refresh().await,
		};

		refreshed.map_err(|e| match e {
			Error::AuthUnavailable { .. } => e,
			e => Error::AuthUnavailable { reason: e.to_string() },
		})
	}

	fn warn_client_side(&self, credentials: &Credentials) {
		if !credentials.is_hook() {
			return;
		}

		let warning = self.warning.read().clone();

		if !warning.enabled {
			return;
		}

		self.log(|logger| {
			if !self.warned.swap(true, Ordering::Relaxed) {
				logger.warn(&warning.message);
			}
		});
	}

	fn log(&self, f: impl FnOnce(&Logger)) {
		obs::with_logger(&self.logger, f);
	}
}
impl Debug for Dispatcher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Dispatcher")
			.field("target_origin", &self.auth.target_origin())
			.field("throttle", &self.throttle)
			.field("admission_timeout", &self.admission_timeout)
			.field("client_side_warning", &self.warning.read().enabled)
			.finish()
	}
}

fn validate_method(method: &str) -> Result<(), ConfigError> {
	let valid = !method.is_empty()
		&& !method.starts_with('.')
		&& method.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

	if valid { Ok(()) } else { Err(ConfigError::InvalidMethod { method: method.to_owned() }) }
}
