use crate::constants::{ENERGY_UNIT_SCALE, MICRO_SCALE};
use crate::energy::RawSample;
use crate::units::UnitScale;
use crate::util::{energy_delta, mul_div};

/// Power drawn over the interval between two raw samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PowerEstimate {
	/// Cycles elapsed between the samples
	pub cycles: u64,

	/// Interval length in nanoseconds
	pub duration_ns: u64,

	/// Package energy consumed, in microjoules
	pub package_energy_delta: u64,

	/// DRAM energy consumed, in microjoules
	pub dram_energy_delta: u64,

	/// Percentage of cycles spent in package idle states, 0 when the set of
	/// summed idle states changed during the interval
	pub cur_idle_rate: u64,

	/// `(package + dram) * 1000 / duration_ns`
	pub average_power: u64,

	/// Cycle counter of the later sample
	pub timestamp: u64,
}

/// Converts a cycle count into nanoseconds for a clock of `clock_khz`
pub fn cycles_to_ns(cycles: u64, clock_khz: u64) -> u64 {
	mul_div(cycles, MICRO_SCALE, clock_khz)
}

/// Average power over an interval, truncating like the integer formula it is
pub fn average_power(package_energy_delta: u64, dram_energy_delta: u64, duration_ns: u64) -> u64 {
	let total_energy = package_energy_delta.saturating_add(dram_energy_delta);
	mul_div(total_energy, 1000, duration_ns)
}

/// Estimates power between `prev` and `cur`
///
/// All counter differences are taken modulo the counter width so a
/// wrap between the samples yields the true elapsed count. Returns `None`
/// for a zero-length interval, which carries no power information.
pub fn estimate(prev: &RawSample, cur: &RawSample, scale: &UnitScale, clock_khz: u64) -> Option<PowerEstimate> {
	let cycles = cur.timestamp.wrapping_sub(prev.timestamp);
	let duration_ns = cycles_to_ns(cycles, clock_khz);
	if cycles == 0 || duration_ns == 0 {
		return None;
	}

	let package_energy_delta = mul_div(
		energy_delta(prev.package_energy, cur.package_energy),
		scale.energy_unit,
		ENERGY_UNIT_SCALE,
	);
	let dram_energy_delta = mul_div(
		energy_delta(prev.dram_energy, cur.dram_energy),
		scale.dram_energy_unit,
		ENERGY_UNIT_SCALE,
	);

	let cur_idle_rate = if prev.idle_generation == cur.idle_generation {
		mul_div(cur.idle_residency.wrapping_sub(prev.idle_residency), 100, cycles)
	} else {
		0
	};

	Some(PowerEstimate {
		cycles,
		duration_ns,
		package_energy_delta,
		dram_energy_delta,
		cur_idle_rate,
		average_power: average_power(package_energy_delta, dram_energy_delta, duration_ns),
		timestamp: cur.timestamp,
	})
}
