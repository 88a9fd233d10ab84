// self
use crate::{_prelude::*, obs::OpKind};

/// Future returned by [`OpSpan::instrument`]; a plain passthrough without `tracing`.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Future returned by [`OpSpan::instrument`]; a plain passthrough without `tracing`.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// `b24_rest.op` span carrying the operation kind and the REST method (or endpoint) it
/// targets.
#[derive(Clone, Debug)]
pub struct OpSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OpSpan {
	/// Opens a span for `kind` against `target`, e.g. `crm.deal.list`.
	pub fn new(kind: OpKind, target: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			Self { span: tracing::info_span!("b24_rest.op", op = kind.as_str(), method = target) }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, target);

			Self {}
		}
	}

	/// Runs `fut` inside the span without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}
