use std::io::{self, Cursor};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use powercapper::{
	CapperConfig, CapperError, DualRate, EnergyCounterSource, IdleActuator, PackageCState, PowerCapper, Status,
	run_control_shell,
};

// Energy field 14: one count is 1/16384 J
const UNIT_DESCRIPTOR: u64 = 0x000A_0E03;
// Roughly 5000 in logged power units
const BUSY_COUNTS_PER_MS: u64 = 82_000;

/// Counters driven by wall-clock time, with a nanosecond cycle counter
struct FakeRapl {
	started: Instant,
	counts_per_ms: u64,
	energy: Mutex<(u64, u64)>,
	fail_units: bool,
	unit_delay: Duration,
	clock_khz: u64,
	fail_energy: AtomicBool,
	unit_reads: AtomicUsize,
	package_reads: AtomicUsize,
}

impl FakeRapl {
	fn new(counts_per_ms: u64) -> Arc<Self> {
		Arc::new(Self {
			started: Instant::now(),
			counts_per_ms,
			energy: Mutex::new((0, 0)),
			fail_units: false,
			unit_delay: Duration::ZERO,
			clock_khz: 1_000_000,
			fail_energy: AtomicBool::new(false),
			unit_reads: AtomicUsize::new(0),
			package_reads: AtomicUsize::new(0),
		})
	}

	fn broken_units() -> Arc<Self> {
		let mut fake = Arc::into_inner(Self::new(0)).unwrap();
		fake.fail_units = true;
		Arc::new(fake)
	}

	fn stopped_clock() -> Arc<Self> {
		let mut fake = Arc::into_inner(Self::new(0)).unwrap();
		fake.clock_khz = 0;
		Arc::new(fake)
	}

	fn slow_units(delay: Duration) -> Arc<Self> {
		let mut fake = Arc::into_inner(Self::new(0)).unwrap();
		fake.unit_delay = delay;
		Arc::new(fake)
	}

	fn now_ns(&self) -> u64 {
		self.started.elapsed().as_nanos() as u64
	}
}

impl EnergyCounterSource for FakeRapl {
	fn read_unit_descriptor(&self) -> io::Result<u64> {
		self.unit_reads.fetch_add(1, Ordering::SeqCst);
		thread::sleep(self.unit_delay);
		if self.fail_units {
			return Err(io::Error::new(io::ErrorKind::PermissionDenied, "msr device unavailable"));
		}
		Ok(UNIT_DESCRIPTOR)
	}

	fn read_package_energy(&self) -> io::Result<u64> {
		self.package_reads.fetch_add(1, Ordering::SeqCst);
		if self.fail_energy.load(Ordering::SeqCst) {
			return Err(io::Error::other("read timed out"));
		}

		let now = self.now_ns();
		let mut energy = self.energy.lock().unwrap();
		let elapsed = now.saturating_sub(energy.0);
		energy.1 += elapsed * self.counts_per_ms / 1_000_000;
		energy.0 = now;
		Ok(energy.1 & 0xFFFF_FFFF)
	}

	fn read_dram_energy(&self) -> io::Result<u64> {
		Ok(0)
	}

	fn read_idle_residency(&self, state: PackageCState) -> io::Result<u64> {
		match state {
			PackageCState::C6 => Ok(self.now_ns() / 4),
			_ => Err(io::Error::new(io::ErrorKind::Unsupported, "not implemented")),
		}
	}

	fn read_cycle_counter(&self) -> u64 {
		self.now_ns()
	}

	fn clock_khz(&self) -> io::Result<u64> {
		Ok(self.clock_khz)
	}
}

#[derive(Default)]
struct RecordingActuator {
	ratios: Mutex<Vec<u64>>,
	released: AtomicBool,
}

impl IdleActuator for RecordingActuator {
	fn apply_ratio(&self, ratio: u64) {
		self.ratios.lock().unwrap().push(ratio);
	}

	fn release(&self) {
		self.released.store(true, Ordering::SeqCst);
	}
}

fn fast_config(target: u64) -> CapperConfig {
	CapperConfig::new(target).with_period(Duration::from_millis(5))
}

fn capper(
	source: Arc<FakeRapl>,
	config: CapperConfig,
) -> (PowerCapper<FakeRapl, RecordingActuator>, Arc<RecordingActuator>) {
	let actuator = Arc::new(RecordingActuator::default());
	let capper = PowerCapper::new(source, actuator.clone(), config).unwrap();
	(capper, actuator)
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
	let deadline = Instant::now() + timeout;
	while Instant::now() < deadline {
		if done() {
			return true;
		}
		thread::sleep(Duration::from_millis(5));
	}
	done()
}

#[test]
fn construction_applies_baseline_ratio() {
	let (capper, actuator) = capper(FakeRapl::new(0), fast_config(4000));
	assert_eq!(*actuator.ratios.lock().unwrap(), vec![1]);
	assert_eq!(capper.status(), Status::Stopped);
	assert_eq!(capper.ratio(), 1);
}

#[test]
fn invalid_config_is_rejected() {
	let actuator = Arc::new(RecordingActuator::default());
	let result = PowerCapper::new(FakeRapl::new(0), actuator, CapperConfig::new(0));
	assert!(matches!(result, Err(CapperError::InvalidConfig(_))));
}

#[test]
fn failed_calibration_prevents_start() {
	let (capper, _) = capper(FakeRapl::broken_units(), fast_config(4000));

	let err = capper.start().unwrap_err();
	assert!(err.is_fatal());
	assert!(matches!(err, CapperError::Calibration { .. }));
	assert_eq!(capper.status(), Status::Stopped);
}

#[test]
fn zero_clock_frequency_fails_calibration() {
	let (capper, _) = capper(FakeRapl::stopped_clock(), fast_config(4000));

	let err = capper.start().unwrap_err();
	assert!(matches!(err, CapperError::Calibration { .. }));
	assert!(err.is_fatal());
	assert_eq!(capper.status(), Status::Stopped);
}

#[test]
fn stop_during_calibration_is_honoured() {
	let source = FakeRapl::slow_units(Duration::from_millis(200));
	let (capper, _) = capper(source.clone(), fast_config(4000));

	thread::scope(|s| {
		let starting = s.spawn(|| capper.start());
		assert!(wait_until(Duration::from_secs(2), || source.unit_reads.load(Ordering::SeqCst) > 0));
		capper.stop();
		starting.join().unwrap().unwrap();
	});

	assert_eq!(capper.status(), Status::Stopped);
	capper.shutdown();
}

#[test]
fn second_start_is_a_no_op() {
	let source = FakeRapl::new(BUSY_COUNTS_PER_MS);
	let config = CapperConfig::new(4000).with_period(Duration::from_millis(500));
	let (capper, _) = capper(source.clone(), config);

	capper.start().unwrap();
	capper.start().unwrap();

	assert_eq!(capper.status(), Status::Running);
	// One calibration and one baseline sample, no tick yet
	assert_eq!(source.unit_reads.load(Ordering::SeqCst), 1);
	assert_eq!(source.package_reads.load(Ordering::SeqCst), 1);

	capper.shutdown();
	assert_eq!(capper.status(), Status::Stopped);
}

#[test]
fn stop_when_stopped_is_a_no_op() {
	let (capper, actuator) = capper(FakeRapl::new(0), fast_config(4000));
	capper.stop();
	capper.shutdown();
	assert_eq!(capper.status(), Status::Stopped);
	assert!(!actuator.released.load(Ordering::SeqCst));
}

#[test]
fn dump_lists_recorded_cycles() {
	let (capper, _) = capper(FakeRapl::new(BUSY_COUNTS_PER_MS), fast_config(100_000));

	capper.start().unwrap();
	thread::sleep(Duration::from_millis(150));
	capper.shutdown();

	let dump = capper.dump_log();
	assert_ne!(dump, "NONE");
	for line in dump.lines() {
		let fields: Vec<u64> = line.split(',').map(|f| f.parse().unwrap()).collect();
		assert_eq!(fields.len(), 8, "line {line:?}");
		// average_power, target_power, cur_idle_rate, idle_rate, duration_ns, ...
		assert_eq!(fields[1], 100_000);
		// C6 residency advances at a quarter of the cycle counter
		assert!((20..=30).contains(&fields[2]), "idle rate {}", fields[2]);
		assert_eq!(fields[3], 1);
		assert!(fields[4] > 0);
		assert!(fields[5] > 0);
	}
}

#[test]
fn no_entries_after_stop() {
	let (capper, _) = capper(FakeRapl::new(BUSY_COUNTS_PER_MS), fast_config(100_000));

	capper.start().unwrap();
	thread::sleep(Duration::from_millis(60));
	capper.shutdown();

	let _ = capper.dump_log();
	thread::sleep(Duration::from_millis(60));
	assert_eq!(capper.dump_log(), "NONE");
}

#[test]
fn overshoot_drives_actuator_and_stop_releases_it() {
	let (capper, actuator) = capper(FakeRapl::new(BUSY_COUNTS_PER_MS), fast_config(100));

	capper.start().unwrap();
	assert!(wait_until(Duration::from_secs(2), || capper.ratio() > 1));
	capper.shutdown();

	let ratios = actuator.ratios.lock().unwrap().clone();
	assert!(ratios.len() > 1);
	assert!(ratios.iter().all(|&r| r >= 1));
	assert!(actuator.released.load(Ordering::SeqCst));
	assert_eq!(capper.ratio(), 1);
}

#[test]
fn set_target_ignores_non_positive_values() {
	let (capper, _) = capper(FakeRapl::new(0), fast_config(4000));

	capper.set_target(0);
	capper.set_target(-20);
	assert_eq!(capper.target(), 4000);

	capper.set_target(3500);
	assert_eq!(capper.target(), 3500);
}

#[test]
fn target_change_reaches_the_log() {
	let (capper, _) = capper(FakeRapl::new(BUSY_COUNTS_PER_MS), fast_config(100_000));

	capper.start().unwrap();
	capper.set_target(90_000);
	thread::sleep(Duration::from_millis(80));
	capper.shutdown();

	let dump = capper.dump_log();
	let last = dump.lines().last().unwrap();
	assert_eq!(last.split(',').nth(1), Some("90000"));
}

#[test]
fn failed_reads_skip_ticks() {
	let source = FakeRapl::new(BUSY_COUNTS_PER_MS);
	let (capper, _) = capper(source.clone(), fast_config(100_000));

	source.fail_energy.store(true, Ordering::SeqCst);
	capper.start().unwrap();
	thread::sleep(Duration::from_millis(60));
	assert_eq!(capper.dump_log(), "NONE");

	source.fail_energy.store(false, Ordering::SeqCst);
	thread::sleep(Duration::from_millis(100));
	capper.shutdown();
	assert_ne!(capper.dump_log(), "NONE");
}

#[test]
fn restart_reuses_calibration() {
	let source = FakeRapl::new(BUSY_COUNTS_PER_MS);
	let (capper, _) = capper(source.clone(), fast_config(100_000));

	capper.start().unwrap();
	capper.stop();
	capper.start().unwrap();
	assert_eq!(capper.status(), Status::Running);
	capper.shutdown();

	assert_eq!(source.unit_reads.load(Ordering::SeqCst), 1);
}

#[test]
fn dual_rate_lines_carry_change_power() {
	let config = CapperConfig::new(100_000).with_dual_rate(DualRate {
		calibration: Duration::from_millis(3),
		measurement: Duration::from_millis(7),
	});
	let (capper, _) = capper(FakeRapl::new(BUSY_COUNTS_PER_MS), config);

	capper.start().unwrap();
	thread::sleep(Duration::from_millis(150));
	capper.shutdown();

	let dump = capper.dump_log();
	assert_ne!(dump, "NONE");
	for line in dump.lines() {
		assert_eq!(line.split(',').count(), 9, "line {line:?}");
		assert_eq!(line.split(',').nth(2), Some("100000"));
	}
}

#[test]
fn control_shell_serves_commands() {
	let config = CapperConfig::new(4000).with_period(Duration::from_millis(300));
	let (capper, _) = capper(FakeRapl::new(BUSY_COUNTS_PER_MS), config);

	let input = Cursor::new("status\nstart\nstatus\ntarget 0\ntarget 3000\nbogus\ndump\nquit\nstatus\n");
	let mut output = Vec::new();
	run_control_shell(&capper, input, &mut output).unwrap();

	let output = String::from_utf8(output).unwrap();
	let mut lines = output.lines();
	assert_eq!(lines.next(), Some("stopped"));
	assert_eq!(lines.next(), Some("running"));
	assert!(lines.next().unwrap().starts_with("error: unknown command"));
	assert_eq!(lines.next(), Some("NONE"));
	assert_eq!(lines.next(), None);

	assert_eq!(capper.target(), 3000);
	assert_eq!(capper.status(), Status::Stopped);
}
