// std
use std::{sync::Arc, time::Duration};
// crates.io
use tokio::time::Instant;
// self
use b24_rest::{
	obs::{LogChannel, Logger},
	throttle::{ManualClock, Throttle, ThrottleConfig},
};

const EPOCH_MS: i64 = 1_700_000_000_000;

fn build(capacity_limit: f64) -> (Throttle, ManualClock) {
	let clock = ManualClock::starting_at(EPOCH_MS);
	let config = ThrottleConfig { capacity_limit, ..ThrottleConfig::default() };
	let throttle = Throttle::with_clock(config, clock.clone())
		.expect("Throttle fixture settings should validate.");

	(throttle, clock)
}

fn assert_load(throttle: &Throttle, expected: f64) {
	let load = throttle.load();

	assert!((load - expected).abs() < 1e-9, "Expected load {expected}, observed {load}.");
}

#[tokio::test]
async fn instant_calls_accumulate_one_unit_each() {
	let (throttle, _clock) = build(30.);

	for n in 1..=30 {
		throttle.admit("crm.deal.list").await;

		assert_load(&throttle, n as f64);
	}

	assert_eq!(throttle.metrics().admitted(), 30);
	assert_eq!(throttle.metrics().waits(), 0);
}

#[tokio::test]
async fn decay_is_time_proportional_and_clamped() {
	let (throttle, clock) = build(30.);

	for _ in 0..10 {
		throttle.admit("user.current").await;
	}

	clock.advance(Duration::from_millis(4_000));

	assert_load(&throttle, 6.);

	clock.advance(Duration::from_secs(60));

	assert_load(&throttle, 0.);
}

#[tokio::test(start_paused = true)]
async fn call_beyond_capacity_waits_for_a_cooldown() {
	let (throttle, clock) = build(3.);
	let logger = Arc::new(Logger::new("throttle"));

	throttle.set_logger(logger.clone());

	for _ in 0..3 {
		throttle.admit("crm.lead.add").await;
	}

	assert_eq!(logger.emitted(LogChannel::Log), 3);

	let started = Instant::now();
	let drain = async {
		tokio::time::sleep(Duration::from_millis(500)).await;
		clock.advance(Duration::from_secs(2));
	};

	tokio::join!(throttle.admit("crm.lead.add"), drain);

	assert!(started.elapsed() >= throttle.config().cooldown());
	assert_eq!(throttle.metrics().waits(), 1);
	assert_eq!(throttle.metrics().admitted(), 4);
	assert_eq!(logger.emitted(LogChannel::Info), 2);
	assert_load(&throttle, 2.);
}

#[tokio::test(start_paused = true)]
async fn admit_until_gives_up_at_the_deadline() {
	let (throttle, _clock) = build(1.);

	throttle.admit("batch").await;

	let started = Instant::now();
	let err = throttle
		.admit_until("batch", started + Duration::from_millis(2_500))
		.await
		.expect_err("Saturated throttle should not admit before the deadline.");

	assert_eq!(err.tag, "batch");
	assert!(started.elapsed() >= Duration::from_millis(2_500));
	assert!(started.elapsed() < Duration::from_millis(3_000));
	assert_eq!(throttle.metrics().waits(), 3);
	assert_load(&throttle, 1.);
}

#[tokio::test(start_paused = true)]
async fn admit_until_admits_once_load_drains() {
	let (throttle, clock) = build(1.);

	throttle.admit("batch").await;
	clock.advance(Duration::from_millis(1_500));
	throttle
		.admit_until("batch", Instant::now() + Duration::from_secs(5))
		.await
		.expect("Drained throttle should admit immediately.");

	assert_eq!(throttle.metrics().waits(), 0);
}

#[tokio::test(start_paused = true)]
async fn admit_until_logs_like_admit() {
	let (throttle, clock) = build(1.);
	let logger = Arc::new(Logger::new("throttle"));

	throttle.set_logger(logger.clone());
	throttle
		.admit_until("crm.lead.add", Instant::now() + Duration::from_secs(5))
		.await
		.expect("Empty throttle should admit.");

	assert_eq!(logger.emitted(LogChannel::Log), 1);

	let drain = async {
		tokio::time::sleep(Duration::from_millis(500)).await;
		clock.advance(Duration::from_secs(2));
	};
	let (admitted, _) = tokio::join!(
		throttle.admit_until("crm.lead.add", Instant::now() + Duration::from_secs(5)),
		drain
	);

	admitted.expect("Drained throttle should admit before the deadline.");

	assert_eq!(logger.emitted(LogChannel::Info), 2);
	assert_eq!(logger.emitted(LogChannel::Warn), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_admissions_never_exceed_capacity() {
	let (throttle, _clock) = build(30.);
	let throttle = Arc::new(throttle);
	let deadline = Instant::now();
	let handles = (0..40)
		.map(|_| {
			let throttle = throttle.clone();

			tokio::spawn(async move { throttle.admit_until("batch", deadline).await.is_ok() })
		})
		.collect::<Vec<_>>();
	let mut admitted = 0;

	for handle in handles {
		if handle.await.expect("Admission task should not panic.") {
			admitted += 1;
		}
	}

	assert_eq!(admitted, 30);
	assert_eq!(throttle.metrics().admitted(), 30);
	assert_load(&throttle, 30.);
}
