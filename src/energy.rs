use std::sync::Arc;

use crate::constants::ENERGY_STATUS_MASK;
use crate::error::{CapperError, Result};
use crate::source::{EnergyCounterSource, PackageCState};

/// Snapshot of the raw counters taken at one tick
///
/// Energy fields hold raw counts masked to the counter's 32-bit width;
/// scaling happens when two samples are compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawSample {
	/// Cycle counter value at the time of the sample
	pub timestamp: u64,

	/// Package energy status count
	pub package_energy: u64,

	/// DRAM energy status count
	pub dram_energy: u64,

	/// Sum of the residency counters of all supported package idle states
	pub idle_residency: u64,

	/// Bumped whenever an idle state drops out of `idle_residency`; sums of
	/// different generations cover different states and do not subtract
	pub idle_generation: u32,
}

#[derive(Debug, Clone, Copy)]
struct IdleCounter {
	state: PackageCState,
	skip: bool,
}

/// Takes raw samples from an energy counter source
///
/// Idle-residency registers are probed lazily: the first failed read of a
/// state marks it unavailable for the lifetime of the sampler.
#[derive(Debug)]
pub struct EnergySampler<S: ?Sized> {
	source: Arc<S>,
	idle_counters: Vec<IdleCounter>,
	idle_generation: u32,
}

impl<S: EnergyCounterSource + ?Sized> EnergySampler<S> {
	pub fn new(source: Arc<S>) -> Self {
		let idle_counters = PackageCState::ALL
			.iter()
			.map(|&state| IdleCounter { state, skip: false })
			.collect();

		Self {
			source,
			idle_counters,
			idle_generation: 0,
		}
	}

	/// Reads all counters once
	///
	/// Fails if either energy register is unreadable. Unsupported idle
	/// states never fail the sample.
	pub fn sample(&mut self) -> Result<RawSample> {
		let timestamp = self.source.read_cycle_counter();

		let package = self
			.source
			.read_package_energy()
			.map_err(|e| CapperError::hardware("package energy status", e))?;
		let dram = self
			.source
			.read_dram_energy()
			.map_err(|e| CapperError::hardware("DRAM energy status", e))?;

		let idle_residency = self.idle_residency();

		Ok(RawSample {
			timestamp,
			package_energy: package & ENERGY_STATUS_MASK,
			dram_energy: dram & ENERGY_STATUS_MASK,
			idle_residency,
			idle_generation: self.idle_generation,
		})
	}

	/// Package idle states that have not failed a read so far
	pub fn available_idle_states(&self) -> Vec<PackageCState> {
		self.idle_counters.iter().filter(|c| !c.skip).map(|c| c.state).collect()
	}

	fn idle_residency(&mut self) -> u64 {
		let mut count: u64 = 0;

		for counter in self.idle_counters.iter_mut().filter(|c| !c.skip) {
			match self.source.read_idle_residency(counter.state) {
				Ok(value) => count = count.wrapping_add(value),
				Err(e) => {
					log::warn!("{} residency unavailable, excluding it from idle accounting: {e}", counter.state);
					counter.skip = true;
					self.idle_generation = self.idle_generation.wrapping_add(1);
				},
			}
		}

		count
	}
}
