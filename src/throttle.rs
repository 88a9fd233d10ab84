//! Leaky-bucket admission control for outbound REST calls.
//!
//! Bitrix24 tracks request intensity per account: every call adds one unit of load and
//! the accumulated load drains at a fixed rate. [`Throttle::admit`] mirrors that model
//! locally so a client backs off before the remote server starts rejecting calls.
//! Admission is not queued; when several callers wait at once each one re-checks the
//! bucket independently after its cooldown, so under load they may be admitted out of
//! request order.

mod clock;

pub use clock::*;

// crates.io
use tokio::time::{self as tokio_time, Instant};
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	obs::{self, Logger},
};

/// Tunables for [`Throttle`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
	/// Maximum instantaneous load; a call is admitted while the load is below it.
	pub capacity_limit: f64,
	/// Load drained per elapsed millisecond.
	pub decay_rate_per_ms: f64,
	/// Sleep between admission re-checks while the bucket is full, in milliseconds.
	pub cooldown_ms: u64,
}
impl ThrottleConfig {
	/// Returns the cooldown as a duration.
	pub fn cooldown(&self) -> StdDuration {
		StdDuration::from_millis(self.cooldown_ms)
	}

	/// Checks that every value is finite and in range.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !self.capacity_limit.is_finite() || self.capacity_limit <= 0. {
			return Err(ConfigError::InvalidThrottle {
				reason: "capacity_limit must be a positive number",
			});
		}
		if !self.decay_rate_per_ms.is_finite() || self.decay_rate_per_ms < 0. {
			return Err(ConfigError::InvalidThrottle {
				reason: "decay_rate_per_ms must be a non-negative number",
			});
		}
		if self.cooldown_ms == 0 {
			return Err(ConfigError::InvalidThrottle { reason: "cooldown_ms must be positive" });
		}

		Ok(())
	}
}
impl Default for ThrottleConfig {
	fn default() -> Self {
		Self { capacity_limit: 30., decay_rate_per_ms: 0.001, cooldown_ms: 1_000 }
	}
}

/// Returned by [`Throttle::admit_until`] when the deadline passes before admission.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Throttle did not admit `{tag}` before the deadline.")]
pub struct ThrottleTimeout {
	/// Tag passed to the admission call.
	pub tag: String,
}

/// Thread-safe counters for admission decisions.
#[derive(Debug, Default)]
pub struct ThrottleMetrics {
	admitted: AtomicU64,
	waits: AtomicU64,
}
impl ThrottleMetrics {
	/// Returns the number of admitted calls.
	pub fn admitted(&self) -> u64 {
		self.admitted.load(Ordering::Relaxed)
	}

	/// Returns the number of cooldown sleeps taken.
	pub fn waits(&self) -> u64 {
		self.waits.load(Ordering::Relaxed)
	}

	fn record_admitted(&self) {
		self.admitted.fetch_add(1, Ordering::Relaxed);
	}

	fn record_wait(&self) {
		self.waits.fetch_add(1, Ordering::Relaxed);
	}
}

#[derive(Debug, Default)]
struct ThrottleState {
	current_load: f64,
	last_update_ms: Option<i64>,
}
impl ThrottleState {
	fn decay(&mut self, now_ms: i64, rate: f64) {
		if let Some(last) = self.last_update_ms {
			self.current_load = projected_load(self.current_load, last, now_ms, rate);
		}

		self.last_update_ms = Some(now_ms);
	}
}

/// Outcome of one decay-check-increment step, with the load observed before incrementing.
#[derive(Clone, Copy, Debug)]
struct Check {
	admitted: bool,
	load: f64,
}

/// Leaky-bucket admission controller shared by every call of a dispatcher.
pub struct Throttle {
	config: ThrottleConfig,
	clock: Arc<dyn Clock>,
	state: Mutex<ThrottleState>,
	logger: RwLock<Option<Arc<Logger>>>,
	metrics: ThrottleMetrics,
}
impl Throttle {
	/// Creates a throttle with validated settings and the system clock.
	pub fn new(config: ThrottleConfig) -> Result<Self, ConfigError> {
		Self::with_clock(config, SystemClock)
	}

	/// Creates a throttle reading time from `clock`.
	pub fn with_clock(
		config: ThrottleConfig,
		clock: impl 'static + Clock,
	) -> Result<Self, ConfigError> {
		config.validate()?;

		Ok(Self {
			config,
			clock: Arc::new(clock),
			state: Default::default(),
			logger: Default::default(),
			metrics: Default::default(),
		})
	}

	/// Active settings.
	pub fn config(&self) -> &ThrottleConfig {
		&self.config
	}

	/// Admission counters.
	pub fn metrics(&self) -> &ThrottleMetrics {
		&self.metrics
	}

	/// Attaches a logger for load diagnostics.
	pub fn set_logger(&self, logger: Arc<Logger>) {
		*self.logger.write() = Some(logger);
	}

	/// Current load drained up to now, without recording an update.
	pub fn load(&self) -> f64 {
		let now = self.clock.now_ms();
		let state = self.state.lock();

		match state.last_update_ms {
			Some(last) =>
				projected_load(state.current_load, last, now, self.config.decay_rate_per_ms),
			None => state.current_load,
		}
	}

	/// Waits until the bucket has room, then records one unit of load.
	///
	/// The wait is unbounded; use [`Throttle::admit_until`] to give up at a deadline.
	pub async fn admit(&self, tag: &str) {
		let check = self.check();

		if check.admitted {
			self.log_no_sleep(tag, check.load);

			return;
		}

		loop {
			self.log_go_sleep(tag);
			self.metrics.record_wait();

			tokio_time::sleep(self.config.cooldown()).await;

			let check = self.check();

			if check.admitted {
				self.log_stop_sleep(tag, check.load);

				return;
			}
		}
	}

	/// Like [`Throttle::admit`], but fails once `deadline` passes without admission.
	pub async fn admit_until(&self, tag: &str, deadline: Instant) -> Result<(), ThrottleTimeout> {
		let check = self.check();

		if check.admitted {
			self.log_no_sleep(tag, check.load);

			return Ok(());
		}

		loop {
			let now = Instant::now();

			if now >= deadline {
				self.log(|logger| {
					let status = self.status(self.load());

					logger.warn(format_args!("!! deadline passed {tag} {status}"));
				});

				return Err(ThrottleTimeout { tag: tag.to_owned() });
			}

			self.log_go_sleep(tag);
			self.metrics.record_wait();

			tokio_time::sleep_until((now + self.config.cooldown()).min(deadline)).await;

			let check = self.check();

			if check.admitted {
				self.log_stop_sleep(tag, check.load);

				return Ok(());
			}
		}
	}

	fn check(&self) -> Check {
		let now = self.clock.now_ms();
		let mut state = self.state.lock();

		state.decay(now, self.config.decay_rate_per_ms);

		let load = state.current_load;

		if load < self.config.capacity_limit {
			state.current_load += 1.;
			self.metrics.record_admitted();

			Check { admitted: true, load }
		} else {
			Check { admitted: false, load }
		}
	}

	fn status(&self, load: f64) -> String {
		format!("{load:.4} from {}", self.config.capacity_limit)
	}

	fn log_no_sleep(&self, tag: &str, load: f64) {
		self.log(|logger| {
			logger.log(format_args!(">> no sleep >>> {tag} {}", self.status(load)));
		});
	}

	fn log_go_sleep(&self, tag: &str) {
		self.log(|logger| {
			logger.info(format_args!(">> go sleep >>> {tag} {}", self.status(self.load())));
		});
	}

	fn log_stop_sleep(&self, tag: &str, load: f64) {
		self.log(|logger| {
			logger.info(format_args!("<< stop sleep <<< {tag} {}", self.status(load)));
		});
	}

	fn log(&self, f: impl FnOnce(&Logger)) {
		obs::with_logger(&self.logger, f);
	}
}
impl Default for Throttle {
	fn default() -> Self {
		Self {
			config: ThrottleConfig::default(),
			clock: Arc::new(SystemClock),
			state: Default::default(),
			logger: Default::default(),
			metrics: Default::default(),
		}
	}
}
impl Debug for Throttle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Throttle")
			.field("config", &self.config)
			.field("load", &self.load())
			.field("logger_set", &self.logger.read().is_some())
			.finish()
	}
}

fn projected_load(load: f64, last_ms: i64, now_ms: i64, rate: f64) -> f64 {
	let elapsed = now_ms.saturating_sub(last_ms).max(0) as f64;

	(load - elapsed * rate).max(0.)
}
