pub mod rapl;

use std::fmt;
use std::io;

use crate::constants::*;

/// Package idle states whose residency counters feed the idle-rate estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageCState {
	C2,
	C3,
	C6,
	C7,
	C8,
	C9,
	C10,
}

impl PackageCState {
	/// Every package C-state probed by the sampler, shallowest first
	pub const ALL: [PackageCState; 7] = [
		PackageCState::C2,
		PackageCState::C3,
		PackageCState::C6,
		PackageCState::C7,
		PackageCState::C8,
		PackageCState::C9,
		PackageCState::C10,
	];

	/// Numeric C-state id (2 for PC2, ...)
	pub fn id(self) -> u8 {
		match self {
			PackageCState::C2 => 2,
			PackageCState::C3 => 3,
			PackageCState::C6 => 6,
			PackageCState::C7 => 7,
			PackageCState::C8 => 8,
			PackageCState::C9 => 9,
			PackageCState::C10 => 10,
		}
	}

	/// Residency MSR backing this state
	pub fn msr_index(self) -> u32 {
		match self {
			PackageCState::C2 => MSR_PKG_C2_RESIDENCY,
			PackageCState::C3 => MSR_PKG_C3_RESIDENCY,
			PackageCState::C6 => MSR_PKG_C6_RESIDENCY,
			PackageCState::C7 => MSR_PKG_C7_RESIDENCY,
			PackageCState::C8 => MSR_PKG_C8_RESIDENCY,
			PackageCState::C9 => MSR_PKG_C9_RESIDENCY,
			PackageCState::C10 => MSR_PKG_C10_RESIDENCY,
		}
	}
}

impl fmt::Display for PackageCState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "PC{}", self.id())
	}
}

/// Hardware counters the measurement core samples
///
/// Implementations are shared between the control-plane caller (for
/// calibration) and the control loop thread, hence `Send + Sync`.
pub trait EnergyCounterSource: Send + Sync {
	/// Reads the raw unit descriptor register
	fn read_unit_descriptor(&self) -> io::Result<u64>;

	/// Reads the raw package energy status register
	fn read_package_energy(&self) -> io::Result<u64>;

	/// Reads the raw DRAM energy status register
	fn read_dram_energy(&self) -> io::Result<u64>;

	/// Reads the residency counter of one package idle state
	///
	/// Returns an error when the state is not supported on this processor.
	fn read_idle_residency(&self, state: PackageCState) -> io::Result<u64>;

	/// Reads the monotonic cycle counter
	fn read_cycle_counter(&self) -> u64;

	/// Frequency of the cycle counter in kHz
	fn clock_khz(&self) -> io::Result<u64>;
}
