// self
use crate::{
	ErrorKind,
	obs::{OpKind, OpOutcome},
};

/// Counts one operation outcome as `b24_rest_op_total{op,outcome}`.
///
/// A no-op unless the `metrics` feature is enabled.
pub fn record_op_outcome(kind: OpKind, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!("b24_rest_op_total", "op" => kind.as_str(), "outcome" => outcome.as_str())
		.increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}

/// Counts one failed operation as `b24_rest_error_total{op,kind}`.
///
/// A no-op unless the `metrics` feature is enabled.
pub fn record_op_error(kind: OpKind, error: ErrorKind) {
	#[cfg(feature = "metrics")]
	metrics::counter!("b24_rest_error_total", "op" => kind.as_str(), "kind" => error.as_str())
		.increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = (kind, error);
}
