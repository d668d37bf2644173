use std::time::Duration;

use crate::constants::{DATA_COLLECTION_INTERVAL_MS, DUAL_RATE_CALIBRATION_MS, DUAL_RATE_MEASUREMENT_MS};
use crate::error::{CapperError, Result};

/// Split of one control period into a short calibration window followed by
/// a longer measurement window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DualRate {
	pub calibration: Duration,
	pub measurement: Duration,
}

impl Default for DualRate {
	fn default() -> Self {
		Self {
			calibration: Duration::from_millis(DUAL_RATE_CALIBRATION_MS),
			measurement: Duration::from_millis(DUAL_RATE_MEASUREMENT_MS),
		}
	}
}

impl DualRate {
	/// Length of a full control period in dual-rate mode
	pub fn period(&self) -> Duration {
		self.calibration + self.measurement
	}
}

/// Runtime configuration of the power capper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapperConfig {
	/// Initial power setpoint
	pub target_power: u64,

	/// Control period in single-rate mode
	pub period: Duration,

	/// Enables dual-rate sampling when set
	pub dual_rate: Option<DualRate>,

	/// CPU whose MSR device is read
	pub msr_cpu: u16,

	/// CPU the control loop thread is pinned to, if any
	pub pin_cpu: Option<usize>,
}

impl CapperConfig {
	/// Creates a single-rate configuration with the default 100 ms period
	pub fn new(target_power: u64) -> Self {
		Self {
			target_power,
			period: Duration::from_millis(DATA_COLLECTION_INTERVAL_MS),
			dual_rate: None,
			msr_cpu: 0,
			pin_cpu: None,
		}
	}

	pub fn with_period(mut self, period: Duration) -> Self {
		self.period = period;
		self
	}

	pub fn with_dual_rate(mut self, dual_rate: DualRate) -> Self {
		self.dual_rate = Some(dual_rate);
		self
	}

	pub fn with_msr_cpu(mut self, cpu: u16) -> Self {
		self.msr_cpu = cpu;
		self
	}

	pub fn with_pin_cpu(mut self, cpu: usize) -> Self {
		self.pin_cpu = Some(cpu);
		self
	}

	/// Checks the configuration for values the control loop cannot run with
	pub fn validate(&self) -> Result<()> {
		if self.target_power == 0 {
			return Err(CapperError::InvalidConfig("target power must be positive".into()));
		}

		if self.period.is_zero() {
			return Err(CapperError::InvalidConfig("control period must be non-zero".into()));
		}

		if let Some(dual) = &self.dual_rate {
			if dual.calibration.is_zero() || dual.measurement.is_zero() {
				return Err(CapperError::InvalidConfig(
					"dual-rate sub-intervals must be non-zero".into(),
				));
			}
		}

		if let Some(cpu) = self.pin_cpu {
			let online = num_cpus::get();
			if cpu >= online {
				return Err(CapperError::InvalidConfig(format!(
					"cannot pin to CPU {cpu}, only {online} online"
				)));
			}
		}

		Ok(())
	}
}
