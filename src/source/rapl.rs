#[cfg(target_arch = "x86_64")]
use std::fs;
use std::io;

use crate::config::CapperConfig;
use crate::constants::*;
use crate::source::{EnergyCounterSource, PackageCState};
use crate::util::msr::read_msr;

/// Intel RAPL counters read through the msr driver of one designated CPU
#[derive(Debug, Clone)]
pub struct MsrCounterSource {
	cpu: u16,
}

impl MsrCounterSource {
	/// Creates a source reading the MSR device of `cpu`
	pub fn new(cpu: u16) -> Self {
		Self { cpu }
	}

	/// Creates a source reading the MSR device named by `config`
	pub fn from_config(config: &CapperConfig) -> Self {
		Self::new(config.msr_cpu)
	}

	pub fn cpu(&self) -> u16 {
		self.cpu
	}

	/// Derives the TSC frequency from the maximum non-turbo ratio
	#[cfg(target_arch = "x86_64")]
	fn platform_clock_khz(&self) -> io::Result<u64> {
		let info = read_msr(MSR_PLATFORM_INFO, self.cpu)?;
		let ratio = (info & PLATFORM_RATIO_MASK) >> PLATFORM_RATIO_OFFSET;
		if ratio == 0 {
			return Err(io::Error::new(
				io::ErrorKind::InvalidData,
				"MSR_PLATFORM_INFO reports a zero base ratio",
			));
		}
		Ok(ratio * BUS_CLOCK_KHZ)
	}
}

impl EnergyCounterSource for MsrCounterSource {
	fn read_unit_descriptor(&self) -> io::Result<u64> {
		read_msr(MSR_RAPL_POWER_UNIT, self.cpu)
	}

	fn read_package_energy(&self) -> io::Result<u64> {
		read_msr(MSR_PKG_ENERGY_STATUS, self.cpu)
	}

	fn read_dram_energy(&self) -> io::Result<u64> {
		read_msr(MSR_DRAM_ENERGY_STATUS, self.cpu)
	}

	fn read_idle_residency(&self, state: PackageCState) -> io::Result<u64> {
		read_msr(state.msr_index(), self.cpu)
	}

	#[cfg(target_arch = "x86_64")]
	fn read_cycle_counter(&self) -> u64 {
		// SAFETY: rdtsc has no preconditions on x86_64
		#[allow(unused_unsafe)]
		unsafe {
			core::arch::x86_64::_rdtsc()
		}
	}

	#[cfg(not(target_arch = "x86_64"))]
	fn read_cycle_counter(&self) -> u64 {
		let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
		// SAFETY: ts is a valid, writable timespec
		unsafe {
			libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut ts);
		}
		(ts.tv_sec as u64) * 1_000_000_000 + ts.tv_nsec as u64
	}

	#[cfg(target_arch = "x86_64")]
	fn clock_khz(&self) -> io::Result<u64> {
		match self.platform_clock_khz() {
			Ok(khz) => Ok(khz),
			Err(e) => {
				log::debug!("MSR_PLATFORM_INFO unusable ({e}), falling back to {TSC_BASE_FREQUENCY_PATH}");
				let content = fs::read_to_string(TSC_BASE_FREQUENCY_PATH)?;
				content
					.trim()
					.parse::<u64>()
					.ok()
					.filter(|&khz| khz > 0)
					.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unparsable base_frequency"))
			},
		}
	}

	#[cfg(not(target_arch = "x86_64"))]
	fn clock_khz(&self) -> io::Result<u64> {
		// The cycle counter is CLOCK_MONOTONIC_RAW in nanoseconds
		Ok(MICRO_SCALE)
	}
}
