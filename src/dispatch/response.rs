//! REST response envelopes and their classification.

// self
use crate::{
	_prelude::*,
	error::{MalformedError, RawResponse},
	http::RestResponse,
};

const AUTH_EXPIRED_CODES: [&str; 2] = ["expired_token", "invalid_token"];
const RATE_LIMIT_CODES: [&str; 2] = ["QUERY_LIMIT_EXCEEDED", "OPERATION_TIME_LIMIT"];

/// Result alias for one dispatched call.
pub type CallOutcome<T = CallSuccess> = Result<T>;

/// Server-side timing block attached to every REST response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallTime {
	/// Unix timestamp (seconds, fractional) the call started at.
	pub start: f64,
	/// Unix timestamp (seconds, fractional) the call finished at.
	pub finish: f64,
	/// Total duration in seconds.
	pub duration: f64,
	/// Processing time in seconds.
	pub processing: f64,
	/// Formatted start date.
	pub date_start: Option<String>,
	/// Formatted finish date.
	pub date_finish: Option<String>,
	/// Seconds of method execution time consumed in the current window.
	pub operating: Option<f64>,
	/// Unix timestamp at which `operating` resets.
	pub operating_reset_at: Option<i64>,
}

/// Successful REST call payload.
#[derive(Clone, Debug, PartialEq)]
pub struct CallSuccess {
	/// Contents of the `result` field.
	pub result: Value,
	/// Total number of records for list methods.
	pub total: Option<u64>,
	/// Offset of the next page for list methods.
	pub next: Option<u64>,
	/// Server-side timing.
	pub time: Option<CallTime>,
	/// HTTP status code.
	pub status: u16,
}
impl CallSuccess {
	/// Converts `result` into `T`, reporting the JSON path of the first mismatch.
	pub fn deserialize_result<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		serde_path_to_error::deserialize(self.result.clone())
			.map_err(|e| MalformedError::Payload(e).into())
	}

	/// Returns `true` when a list method has more pages.
	pub fn has_more(&self) -> bool {
		self.next.is_some()
	}
}

#[derive(Debug, Deserialize)]
struct Envelope {
	#[serde(default)]
	result: Value,
	#[serde(default)]
	total: Option<u64>,
	#[serde(default)]
	next: Option<u64>,
	#[serde(default)]
	time: Option<CallTime>,
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	error_description: Option<String>,
}

/// How the dispatcher should treat one response.
#[derive(Debug)]
pub(crate) enum Classified {
	Success(CallSuccess),
	AuthExpired(RawResponse),
	Failure(Error),
}

pub(crate) fn classify(response: RestResponse) -> Classified {
	let raw = RawResponse {
		status: response.status,
		retry_after: response.retry_after,
		body: response.body_text().into_owned(),
	};
	let mut deserializer = serde_json::Deserializer::from_slice(&response.body);
	let envelope = match serde_path_to_error::deserialize::<_, Envelope>(&mut deserializer) {
		Ok(envelope) => envelope,
		Err(source) => {
			if raw.status == 401 {
				return Classified::AuthExpired(raw);
			}
			if is_rate_limit_status(raw.status) {
				return Classified::Failure(rate_limited(
					format!("HTTP_{}", raw.status),
					"Request was rejected before reaching the REST handler".into(),
					raw,
				));
			}

			return Classified::Failure(
				MalformedError::Response { source, raw: Box::new(raw) }.into(),
			);
		},
	};

	if let Some(code) = envelope.error {
		let description = envelope.error_description.unwrap_or_default();

		if AUTH_EXPIRED_CODES.contains(&code.as_str()) {
			return Classified::AuthExpired(raw);
		}
		if RATE_LIMIT_CODES.contains(&code.as_str()) || is_rate_limit_status(raw.status) {
			return Classified::Failure(rate_limited(code, description, raw));
		}

		return Classified::Failure(Error::RemoteValidation {
			code,
			description,
			raw: Box::new(raw),
		});
	}

	match raw.status {
		200..=299 => Classified::Success(CallSuccess {
			result: envelope.result,
			total: envelope.total,
			next: envelope.next,
			time: envelope.time,
			status: raw.status,
		}),
		401 => Classified::AuthExpired(raw),
		status if is_rate_limit_status(status) => Classified::Failure(rate_limited(
			format!("HTTP_{status}"),
			"Request intensity limit exceeded".into(),
			raw,
		)),
		status => Classified::Failure(Error::RemoteValidation {
			code: format!("HTTP_{status}"),
			description: "Response carried no error code".into(),
			raw: Box::new(raw),
		}),
	}
}

fn is_rate_limit_status(status: u16) -> bool {
	matches!(status, 429 | 503)
}

fn rate_limited(code: String, description: String, raw: RawResponse) -> Error {
	Error::RateLimited { code, description, raw: Box::new(raw) }
}
