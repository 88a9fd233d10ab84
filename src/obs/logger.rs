//! Named logger with independently switchable channels.
//!
//! Components hold an `Option<Arc<Logger>>`; when none is attached they skip logging
//! entirely. With the `tracing` feature each channel becomes a `tracing` event carrying
//! the logger name, otherwise messages are only counted.

// self
use crate::_prelude::*;

/// Output channels a [`Logger`] can emit on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogChannel {
	/// Desktop-notification style messages.
	Desktop,
	/// General chatter.
	Log,
	/// Informational messages.
	Info,
	/// Warnings.
	Warn,
	/// Errors.
	Error,
	/// Fine-grained tracing.
	Trace,
}
impl LogChannel {
	/// Every channel, in declaration order.
	pub const ALL: [LogChannel; 6] = [
		LogChannel::Desktop,
		LogChannel::Log,
		LogChannel::Info,
		LogChannel::Warn,
		LogChannel::Error,
		LogChannel::Trace,
	];

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			LogChannel::Desktop => "desktop",
			LogChannel::Log => "log",
			LogChannel::Info => "info",
			LogChannel::Warn => "warn",
			LogChannel::Error => "error",
			LogChannel::Trace => "trace",
		}
	}

	const fn index(self) -> usize {
		match self {
			LogChannel::Desktop => 0,
			LogChannel::Log => 1,
			LogChannel::Info => 2,
			LogChannel::Warn => 3,
			LogChannel::Error => 4,
			LogChannel::Trace => 5,
		}
	}
}
impl Display for LogChannel {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Channel on/off mapping; channels missing from the map keep their current state.
pub type LogConfig = BTreeMap<LogChannel, bool>;

/// Named logger whose channels can be toggled at runtime.
#[derive(Debug)]
pub struct Logger {
	name: String,
	enabled: RwLock<[bool; 6]>,
	emitted: [AtomicU64; 6],
}
impl Logger {
	/// Creates a logger with every channel enabled.
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into(), enabled: RwLock::new([true; 6]), emitted: Default::default() }
	}

	/// Creates a logger and applies `config` on top of the all-enabled default.
	pub fn with_config(name: impl Into<String>, config: &LogConfig) -> Self {
		let logger = Self::new(name);

		logger.set_config(config);

		logger
	}

	/// Returns the logger name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Applies a channel mapping.
	pub fn set_config(&self, config: &LogConfig) {
		let mut enabled = self.enabled.write();

		for (channel, on) in config {
			enabled[channel.index()] = *on;
		}
	}

	/// Returns the current channel mapping.
	pub fn config(&self) -> LogConfig {
		let enabled = self.enabled.read();

		LogChannel::ALL.iter().map(|channel| (*channel, enabled[channel.index()])).collect()
	}

	/// Checks whether a channel currently emits.
	pub fn is_enabled(&self, channel: LogChannel) -> bool {
		self.enabled.read()[channel.index()]
	}

	/// Number of messages emitted on a channel so far.
	pub fn emitted(&self, channel: LogChannel) -> u64 {
		self.emitted[channel.index()].load(Ordering::Relaxed)
	}

	/// Emits on the `desktop` channel.
	pub fn desktop(&self, message: impl Display) {
		self.emit(LogChannel::Desktop, message);
	}

	/// Emits on the `log` channel.
	pub fn log(&self, message: impl Display) {
		self.emit(LogChannel::Log, message);
	}

	/// Emits on the `info` channel.
	pub fn info(&self, message: impl Display) {
		self.emit(LogChannel::Info, message);
	}

	/// Emits on the `warn` channel.
	pub fn warn(&self, message: impl Display) {
		self.emit(LogChannel::Warn, message);
	}

	/// Emits on the `error` channel.
	pub fn error(&self, message: impl Display) {
		self.emit(LogChannel::Error, message);
	}

	/// Emits on the `trace` channel.
	pub fn trace(&self, message: impl Display) {
		self.emit(LogChannel::Trace, message);
	}

	fn emit(&self, channel: LogChannel, message: impl Display) {
		if !self.is_enabled(channel) {
			return;
		}

		self.emitted[channel.index()].fetch_add(1, Ordering::Relaxed);

		#[cfg(feature = "tracing")]
		{
			let logger = self.name.as_str();

			match channel {
				LogChannel::Desktop => tracing::info!(logger, desktop = true, "{message}"),
				LogChannel::Log => tracing::debug!(logger, "{message}"),
				LogChannel::Info => tracing::info!(logger, "{message}"),
				LogChannel::Warn => tracing::warn!(logger, "{message}"),
				LogChannel::Error => tracing::error!(logger, "{message}"),
				LogChannel::Trace => tracing::trace!(logger, "{message}"),
			}
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = message;
		}
	}
}

/// Emits through an optional logger; does nothing when none is attached.
pub(crate) fn with_logger(slot: &RwLock<Option<Arc<Logger>>>, f: impl FnOnce(&Logger)) {
	let logger = slot.read().clone();

	if let Some(logger) = logger {
		f(&logger);
	}
}
