use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::actuator::IdleActuator;
use crate::config::{CapperConfig, DualRate};
use crate::constants::BASELINE_RATIO;
use crate::controller::{ControllerState, Transition, transition, transition_with_trigger};
use crate::energy::{EnergySampler, RawSample};
use crate::error::Result;
use crate::power::{PowerEstimate, estimate};
use crate::source::EnergyCounterSource;
use crate::telemetry::{LogEntry, TelemetryLog};
use crate::units::UnitScale;
use crate::util::cpu::pin_current_thread;

/// Runs the sample → estimate → control → record cycle
pub struct PowerMonitor<S: ?Sized, A: ?Sized> {
	sampler: EnergySampler<S>,
	scale: UnitScale,
	clock_khz: u64,
	state: Arc<ControllerState>,
	log: Arc<TelemetryLog>,
	actuator: Arc<A>,
	period: Duration,
	dual_rate: Option<DualRate>,
	pin_cpu: Option<usize>,
	last: Option<RawSample>,
}

impl<S, A> PowerMonitor<S, A>
where
	S: EnergyCounterSource + ?Sized,
	A: IdleActuator + ?Sized,
{
	/// Creates a monitor over calibrated units
	pub fn new(
		source: Arc<S>,
		scale: UnitScale,
		clock_khz: u64,
		state: Arc<ControllerState>,
		log: Arc<TelemetryLog>,
		actuator: Arc<A>,
		config: &CapperConfig,
	) -> Self {
		Self {
			sampler: EnergySampler::new(source),
			scale,
			clock_khz,
			state,
			log,
			actuator,
			period: config.period,
			dual_rate: config.dual_rate,
			pin_cpu: config.pin_cpu,
			last: None,
		}
	}

	/// Takes the reference sample the first interval is measured from
	///
	/// On failure the first successful tick becomes the baseline instead.
	pub fn baseline(&mut self) -> Result<()> {
		self.last = Some(self.sampler.sample()?);
		Ok(())
	}

	/// Sample the next interval will be measured from
	pub fn last_sample(&self) -> Option<RawSample> {
		self.last
	}

	/// Loops until the shared running flag is cleared
	///
	/// The flag is checked before and after each sleep, so at most the tick
	/// in flight completes once stop is requested.
	pub fn run(mut self) {
		if let Some(cpu) = self.pin_cpu {
			match pin_current_thread(cpu) {
				Ok(()) => log::debug!("control loop pinned to CPU {cpu}"),
				Err(e) => log::warn!("Failed to pin control loop to CPU {cpu}: {e}"),
			}
		}

		log::info!("power monitor running, target={}", self.state.target());

		while self.state.is_running() {
			match self.dual_rate {
				None => {
					thread::sleep(self.period);
					if !self.state.is_running() {
						break;
					}
					self.tick();
				},
				Some(dual) => {
					thread::sleep(dual.calibration);
					let mark = self.sampler.sample();
					thread::sleep(dual.measurement);
					if !self.state.is_running() {
						break;
					}
					match mark {
						Ok(mark) => {
							self.tick_dual(&mark);
						},
						Err(e) => log::warn!("Skipping control period: {e}"),
					}
				},
			}
		}

		self.actuator.release();
		self.state.set_ratio(BASELINE_RATIO);
		log::info!("power monitor stopped");
	}

	/// Runs one single-rate control cycle without sleeping
	///
	/// Returns the recorded entry, or `None` when the tick was skipped. A
	/// skipped tick leaves the baseline sample untouched.
	pub fn tick(&mut self) -> Option<LogEntry> {
		let now = self.sample_or_skip()?;
		let last = self.rebase(now)?;
		let est = self.interval(&last, &now)?;
		self.last = Some(now);

		let target = self.state.target();
		let step = transition(self.state.ratio(), est.average_power, target);
		Some(self.apply(step, &est, None, target))
	}

	/// Runs one dual-rate control cycle without sleeping
	///
	/// `mark` is the sample taken at the end of the calibration window; the
	/// logged estimate spans the whole period while the controller is driven
	/// by the measurement window alone.
	pub fn tick_dual(&mut self, mark: &RawSample) -> Option<LogEntry> {
		let now = self.sample_or_skip()?;
		let last = self.rebase(now)?;
		let logged = self.interval(&last, &now)?;
		let change = self.interval(mark, &now)?;
		self.last = Some(now);

		let target = self.state.target();
		let step = transition_with_trigger(self.state.ratio(), logged.average_power, change.average_power, target);
		Some(self.apply(step, &logged, Some(change.average_power), target))
	}

	fn sample_or_skip(&mut self) -> Option<RawSample> {
		match self.sampler.sample() {
			Ok(sample) => Some(sample),
			Err(e) => {
				log::warn!("Skipping tick: {e}");
				None
			},
		}
	}

	/// Returns the previous sample, or installs `now` as the baseline
	fn rebase(&mut self, now: RawSample) -> Option<RawSample> {
		match self.last {
			Some(last) => Some(last),
			None => {
				log::debug!("baseline sample taken at {}", now.timestamp);
				self.last = Some(now);
				None
			},
		}
	}

	fn interval(&self, from: &RawSample, to: &RawSample) -> Option<PowerEstimate> {
		let est = estimate(from, to, &self.scale, self.clock_khz);
		if est.is_none() {
			log::debug!("zero-length interval ending at {}, skipping", to.timestamp);
		}
		est
	}

	fn apply(&self, step: Transition, est: &PowerEstimate, change_power: Option<u64>, target: u64) -> LogEntry {
		if step.applies() {
			self.actuator.apply_ratio(step.ratio);
		}
		self.state.set_ratio(step.ratio);

		log::debug!(
			"power={} target={} ratio={} ({:?})",
			est.average_power,
			target,
			step.ratio,
			step.branch
		);

		let entry = LogEntry {
			duration_ns: est.duration_ns,
			package_energy_delta: est.package_energy_delta,
			dram_energy_delta: est.dram_energy_delta,
			idle_rate: step.ratio,
			cur_idle_rate: est.cur_idle_rate,
			average_power: est.average_power,
			change_power,
			target_power: target,
			timestamp: est.timestamp,
		};
		self.log.record(entry);
		entry
	}
}
