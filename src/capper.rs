use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};

use crate::actuator::IdleActuator;
use crate::config::CapperConfig;
use crate::constants::BASELINE_RATIO;
use crate::controller::ControllerState;
use crate::error::{CapperError, Result};
use crate::monitor::PowerMonitor;
use crate::source::EnergyCounterSource;
use crate::telemetry::TelemetryLog;
use crate::units::{UnitScale, calibrate};

/// Run state reported by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
	Stopped,
	Running,
}

impl Status {
	pub fn as_str(&self) -> &'static str {
		match self {
			Status::Stopped => "stopped",
			Status::Running => "running",
		}
	}
}

impl fmt::Display for Status {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy)]
struct Calibration {
	scale: UnitScale,
	clock_khz: u64,
}

/// Control-plane facade over the measurement-and-control loop
///
/// Every operation takes `&self` and may be called from any thread while
/// the loop runs.
pub struct PowerCapper<S: ?Sized, A: ?Sized> {
	source: Arc<S>,
	actuator: Arc<A>,
	config: CapperConfig,
	state: Arc<ControllerState>,
	log: Arc<TelemetryLog>,
	calibration: OnceLock<Calibration>,
	// Also serializes start against itself
	worker: Mutex<Option<JoinHandle<()>>>,
}

impl<S, A> PowerCapper<S, A>
where
	S: EnergyCounterSource + ?Sized + 'static,
	A: IdleActuator + ?Sized + 'static,
{
	/// Creates a stopped capper and puts the actuator at the baseline ratio
	pub fn new(source: Arc<S>, actuator: Arc<A>, config: CapperConfig) -> Result<Self> {
		config.validate()?;

		actuator.apply_ratio(BASELINE_RATIO);

		Ok(Self {
			source,
			actuator,
			state: Arc::new(ControllerState::new(config.target_power)),
			log: Arc::new(TelemetryLog::default()),
			config,
			calibration: OnceLock::new(),
			worker: Mutex::new(None),
		})
	}

	/// Starts the control loop unless it is already running
	///
	/// The first start calibrates units and the reference clock; a failure
	/// there is returned and the loop never begins.
	pub fn start(&self) -> Result<()> {
		let mut worker = self.lock_worker();

		if self.state.is_running() {
			log::debug!("start ignored, control loop already running");
			return Ok(());
		}

		// A loop told to stop may still be finishing its last tick
		if let Some(previous) = worker.take() {
			if previous.join().is_err() {
				log::warn!("previous control loop panicked");
			}
		}

		let calibration = self.calibrate()?;

		let mut monitor = PowerMonitor::new(
			self.source.clone(),
			calibration.scale,
			calibration.clock_khz,
			self.state.clone(),
			self.log.clone(),
			self.actuator.clone(),
			&self.config,
		);
		if let Err(e) = monitor.baseline() {
			log::warn!("Baseline sample failed, the first good tick becomes the baseline: {e}");
		}

		self.state.begin();
		let handle = thread::Builder::new()
			.name("power_monitor".into())
			.spawn(move || monitor.run())
			.map_err(|e| {
				self.state.end();
				CapperError::Spawn(e)
			})?;

		*worker = Some(handle);
		log::info!("power capping started");
		Ok(())
	}

	/// Requests loop termination; takes effect within one control period
	///
	/// A stop issued while `start` is still calibrating waits for it and
	/// then stops the freshly started loop.
	pub fn stop(&self) {
		let _worker = self.lock_worker();
		if self.state.end() {
			log::info!("power capping stop requested");
		} else {
			log::debug!("stop ignored, control loop not running");
		}
	}

	/// Stops the loop and waits for it to exit
	pub fn shutdown(&self) {
		self.stop();
		self.join_worker();
	}

	/// Updates the setpoint used from the next tick on
	///
	/// Non-positive values are ignored.
	pub fn set_target(&self, target: i64) {
		let accepted = u64::try_from(target).map(|t| self.state.set_target(t)).unwrap_or(false);
		if accepted {
			log::info!("target power set to {target}");
		} else {
			log::debug!("ignoring non-positive target {target}");
		}
	}

	pub fn status(&self) -> Status {
		if self.state.is_running() {
			Status::Running
		} else {
			Status::Stopped
		}
	}

	/// Swaps the telemetry buffers and renders the drained one
	pub fn dump_log(&self) -> String {
		self.log.dump()
	}

	pub fn target(&self) -> u64 {
		self.state.target()
	}

	/// Current idle ratio, 1 when not throttling
	pub fn ratio(&self) -> u64 {
		self.state.ratio()
	}

	pub fn config(&self) -> &CapperConfig {
		&self.config
	}

	fn calibrate(&self) -> Result<Calibration> {
		if let Some(calibration) = self.calibration.get() {
			return Ok(*calibration);
		}

		let scale = calibrate(self.source.as_ref())?;
		let clock_khz = self
			.source
			.clock_khz()
			.and_then(|khz| match khz {
				0 => Err(io::Error::new(io::ErrorKind::InvalidData, "cycle counter frequency is zero")),
				khz => Ok(khz),
			})
			.map_err(|source| {
				log::error!("failed to determine the cycle counter frequency: {source}");
				CapperError::Calibration { source }
			})?;
		log::info!("cycle counter runs at {clock_khz} kHz");

		let calibration = Calibration { scale, clock_khz };
		let _ = self.calibration.set(calibration);
		Ok(calibration)
	}
}

impl<S: ?Sized, A: ?Sized> PowerCapper<S, A> {
	fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
		self.worker.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn join_worker(&self) {
		if let Some(handle) = self.lock_worker().take() {
			if handle.join().is_err() {
				log::warn!("control loop panicked");
			}
		}
	}
}

impl<S: ?Sized, A: ?Sized> Drop for PowerCapper<S, A> {
	fn drop(&mut self) {
		self.state.end();
		self.join_worker();
	}
}
