use std::io;

use crate::constants::*;
use crate::error::{CapperError, Result};
use crate::source::EnergyCounterSource;

/// Scale factors converting raw RAPL counts into physical units
///
/// Decoded once from the unit descriptor register and read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitScale {
	/// Energy per count, in 1/`ENERGY_UNIT_SCALE` microjoules
	pub energy_unit: u64,

	/// Power per count, in microwatts
	pub power_unit: u64,

	/// Time per count, in microseconds
	pub time_unit: u64,

	/// Fixed DRAM energy per count, same scale as `energy_unit`
	pub dram_energy_unit: u64,
}

impl UnitScale {
	/// Decodes the three bit fields of a raw unit descriptor
	///
	/// Each field `n` encodes a unit of `1 / 2^n` of the base quantity.
	pub fn from_descriptor(descriptor: u64) -> Self {
		let energy_bits = (descriptor & ENERGY_UNIT_MASK) >> ENERGY_UNIT_OFFSET;
		let power_bits = (descriptor & POWER_UNIT_MASK) >> POWER_UNIT_OFFSET;
		let time_bits = (descriptor & TIME_UNIT_MASK) >> TIME_UNIT_OFFSET;

		Self {
			energy_unit: ENERGY_UNIT_SCALE * MICRO_SCALE / (1u64 << energy_bits),
			power_unit: MICRO_SCALE / (1u64 << power_bits),
			time_unit: MICRO_SCALE / (1u64 << time_bits),
			dram_energy_unit: DRAM_ENERGY_UNIT,
		}
	}
}

/// Reads the unit descriptor and derives the scale factors
///
/// Any failure here is fatal: without units no sample can be interpreted.
pub fn calibrate<S: EnergyCounterSource + ?Sized>(source: &S) -> Result<UnitScale> {
	let descriptor = source.read_unit_descriptor().map_err(|source| {
		log::error!("failed to read the RAPL unit descriptor: {source}");
		CapperError::Calibration { source }
	})?;

	let scale = UnitScale::from_descriptor(descriptor);
	if scale.energy_unit == 0 {
		return Err(CapperError::Calibration {
			source: io::Error::new(
				io::ErrorKind::InvalidData,
				format!("unit descriptor {descriptor:#x} decodes to a zero energy unit"),
			),
		});
	}

	log::info!(
		"Units: energy={}pJ, time={}us, power={}uW",
		scale.energy_unit,
		scale.time_unit,
		scale.power_unit
	);

	Ok(scale)
}
