//! Client-level error types shared across the throttle, credential providers, and dispatcher.

// self
use crate::{_prelude::*, throttle::ThrottleTimeout};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Stable classification of an [`Error`], used by callers to pick a recovery path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// The client facade was used before initialization finished.
	NotInitialized,
	/// The access token was rejected twice in a row.
	AuthExpired,
	/// No credentials are available and none could be obtained.
	AuthUnavailable,
	/// The remote server rejected the call parameters.
	RemoteValidation,
	/// The call volume limit was hit, either remotely or by a local admission deadline.
	RateLimited,
	/// Network or timeout failure.
	Transport,
	/// Unparseable webhook URL or response.
	Malformed,
	/// Local configuration problem.
	Config,
}
impl ErrorKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ErrorKind::NotInitialized => "not_initialized",
			ErrorKind::AuthExpired => "auth_expired",
			ErrorKind::AuthUnavailable => "auth_unavailable",
			ErrorKind::RemoteValidation => "remote_validation",
			ErrorKind::RateLimited => "rate_limited",
			ErrorKind::Transport => "transport",
			ErrorKind::Malformed => "malformed",
			ErrorKind::Config => "config",
		}
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Raw HTTP response attached to remote failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
	/// HTTP status code.
	pub status: u16,
	/// Retry-After hint from upstream, if supplied.
	pub retry_after: Option<Duration>,
	/// Response body decoded lossily as UTF-8.
	pub body: String,
}

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// The client facade has not been initialized yet.
	#[error("Client is not initialized.")]
	NotInitialized,
	/// The remote server rejected the access token again after a refresh.
	#[error("Access token was rejected for `{method}` after a credential refresh.")]
	AuthExpired {
		/// REST method that was being called.
		method: String,
		/// Response carrying the second rejection.
		raw: Box<RawResponse>,
	},
	/// No usable credentials exist and a refresh could not produce them.
	#[error("Credentials are unavailable: {reason}.")]
	AuthUnavailable {
		/// Provider- or client-supplied reason string.
		reason: String,
	},
	/// The remote server rejected the call.
	#[error("Remote server rejected the call with `{code}`: {description}.")]
	RemoteValidation {
		/// Remote error code.
		code: String,
		/// Remote error description.
		description: String,
		/// Response carrying the rejection.
		raw: Box<RawResponse>,
	},
	/// The remote server reported that the request intensity limit was exceeded.
	#[error("Remote server reported a rate limit with `{code}`: {description}.")]
	RateLimited {
		/// Remote error code.
		code: String,
		/// Remote error description.
		description: String,
		/// Response carrying the rejection.
		raw: Box<RawResponse>,
	},
	/// Local admission deadline elapsed before the throttle admitted the call.
	#[error(transparent)]
	Throttled(#[from] ThrottleTimeout),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Unparseable input or response.
	#[error(transparent)]
	Malformed(#[from] MalformedError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
}
impl Error {
	/// Classifies the error.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::NotInitialized => ErrorKind::NotInitialized,
			Self::AuthExpired { .. } => ErrorKind::AuthExpired,
			Self::AuthUnavailable { .. } => ErrorKind::AuthUnavailable,
			Self::RemoteValidation { .. } => ErrorKind::RemoteValidation,
			Self::RateLimited { .. } | Self::Throttled(_) => ErrorKind::RateLimited,
			Self::Transport(_) => ErrorKind::Transport,
			Self::Malformed(_) => ErrorKind::Malformed,
			Self::Config(_) => ErrorKind::Config,
		}
	}

	/// Returns the raw response behind a remote failure, when one was received.
	pub fn raw_response(&self) -> Option<&RawResponse> {
		match self {
			Self::AuthExpired { raw, .. }
			| Self::RemoteValidation { raw, .. }
			| Self::RateLimited { raw, .. } => Some(raw.as_ref()),
			Self::Malformed(MalformedError::Response { raw, .. }) => Some(raw.as_ref()),
			_ => None,
		}
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Throttle configuration is out of range.
	#[error("Throttle configuration is invalid: {reason}.")]
	InvalidThrottle {
		/// Which constraint was violated.
		reason: &'static str,
	},
	/// REST method name cannot be placed in a request path.
	#[error("REST method `{method}` is invalid.")]
	InvalidMethod {
		/// Offending method name.
		method: String,
	},
	/// Call parameters must be a JSON object (or null) so the access token can be attached.
	#[error("Call parameters must be a JSON object.")]
	InvalidParams,
	/// Request body could not be encoded.
	#[error("Request body could not be encoded.")]
	Encode(#[from] serde_json::Error),
	/// The client facade was initialized twice.
	#[error("Client is already initialized.")]
	AlreadyInitialized,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}

/// Unparseable connection parameters or responses.
#[derive(Debug, ThisError)]
pub enum MalformedError {
	/// URL could not be parsed.
	#[error("URL is invalid.")]
	InvalidUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Only `http` and `https` are accepted.
	#[error("URL scheme `{scheme}` is not supported.")]
	UnsupportedScheme {
		/// Scheme found in the URL.
		scheme: String,
	},
	/// URL carries no host.
	#[error("URL has no host.")]
	MissingHost,
	/// URL carries a part webhook and account URLs never have.
	#[error("URL must not contain a {component}.")]
	UnexpectedComponent {
		/// Offending part: `query`, `fragment`, or `userinfo`.
		component: &'static str,
	},
	/// Account base URL must not carry a path.
	#[error("Account URL must not contain a path.")]
	UnexpectedBasePath,
	/// Webhook path is not `/rest/{user_id}/{secret}`.
	#[error("Webhook path must be /rest/{{user_id}}/{{secret}}, found {segments} segment(s).")]
	UnexpectedPath {
		/// Number of non-empty path segments found.
		segments: usize,
	},
	/// User id segment is not an unsigned integer.
	#[error("Webhook user id `{value}` is not a number.")]
	InvalidUserId {
		/// Offending segment.
		value: String,
	},
	/// Secret segment is missing or empty.
	#[error("Webhook secret is missing.")]
	MissingSecret,
	/// Response body is not the expected JSON shape.
	#[error("Response with status {} could not be parsed.", .raw.status)]
	Response {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// Response that failed to parse.
		raw: Box<RawResponse>,
	},
	/// Payload could not be converted into the requested type.
	#[error("Result payload does not match the requested type.")]
	Payload(#[from] serde_path_to_error::Error<serde_json::Error>),
	/// Token endpoint returned a non-positive lifetime.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl From<url::ParseError> for MalformedError {
	fn from(source: url::ParseError) -> Self {
		Self::InvalidUrl { source }
	}
}

/// Transport-level failures (network, IO, timeout).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the remote server.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The request did not complete within the transport timeout.
	#[error("Request timed out while calling the remote server.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the remote server.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a transport-specific timeout error.
	pub fn timeout(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Timeout { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		// Request URLs may embed webhook secrets.
		let e = e.without_url();

		if e.is_timeout() { Self::timeout(e) } else { Self::network(e) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn raw(status: u16) -> Box<RawResponse> {
		Box::new(RawResponse { status, retry_after: None, body: "{}".into() })
	}

	#[test]
	fn not_initialized_is_distinct_from_auth_expired() {
		let not_ready = Error::NotInitialized;
		let expired = Error::AuthExpired { method: "user.current".into(), raw: raw(401) };

		assert_eq!(not_ready.kind(), ErrorKind::NotInitialized);
		assert_eq!(expired.kind(), ErrorKind::AuthExpired);
		assert_ne!(not_ready.kind(), expired.kind());
		assert!(not_ready.raw_response().is_none());
		assert_eq!(expired.raw_response().map(|raw| raw.status), Some(401));
	}

	#[test]
	fn nested_errors_classify_by_layer() {
		let transport = Error::from(TransportError::Io(std::io::Error::other("reset")));
		let malformed = Error::from(MalformedError::MissingSecret);
		let config = Error::from(ConfigError::InvalidParams);

		assert_eq!(transport.kind(), ErrorKind::Transport);
		assert_eq!(malformed.kind(), ErrorKind::Malformed);
		assert_eq!(config.kind(), ErrorKind::Config);
		assert_eq!(ErrorKind::RemoteValidation.to_string(), "remote_validation");
	}
}
