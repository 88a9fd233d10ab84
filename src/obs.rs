//! Observability helpers: channel-configurable loggers, spans, and outcome counters.
//!
//! # Feature Flags
//!
//! - `tracing` (default): dispatches and refreshes run inside a `b24_rest.op` span with
//!   `op` and `method` fields, and [`Logger`] channels become `tracing` events.
//! - `metrics`: `b24_rest_op_total{op,outcome}` counts attempts, successes, and failures;
//!   `b24_rest_error_total{op,kind}` breaks failures down by [`ErrorKind`](crate::ErrorKind).

mod logger;
mod metrics;
mod tracing;

pub use logger::*;
pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operation kinds observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// One REST call through the dispatcher.
	Dispatch,
	/// Credential refresh exchange.
	Refresh,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::Dispatch => "dispatch",
			OpKind::Refresh => "refresh",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
