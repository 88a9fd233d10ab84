//! Wall-clock sources for load decay.

// self
use crate::_prelude::*;

/// Millisecond wall clock consulted on every admission check.
///
/// Decay is driven by elapsed wall-clock time, so a process that was suspended (laptop
/// sleep, stopped container) sees the bucket drained on resume.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Milliseconds since the Unix epoch.
	fn now_ms(&self) -> i64;
}

/// Clock backed by the system UTC time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now_ms(&self) -> i64 {
		let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;

		i64::try_from(millis).unwrap_or(i64::MAX)
	}
}

/// Clock that only moves when told to; useful for deterministic throttling tests.
#[derive(Clone, Debug, Default)]
pub struct ManualClock(Arc<std::sync::atomic::AtomicI64>);
impl ManualClock {
	/// Creates a clock frozen at `start_ms`.
	pub fn starting_at(start_ms: i64) -> Self {
		Self(Arc::new(std::sync::atomic::AtomicI64::new(start_ms)))
	}

	/// Moves the clock forward.
	pub fn advance(&self, by: StdDuration) {
		let millis = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);

		self.0.fetch_add(millis, Ordering::SeqCst);
	}
}
impl Clock for ManualClock {
	fn now_ms(&self) -> i64 {
		self.0.load(Ordering::SeqCst)
	}
}
