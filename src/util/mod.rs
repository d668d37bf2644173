pub mod cpu;
pub mod msr;

use crate::constants::ENERGY_STATUS_MASK;

/// Difference between two readings of a counter that wraps at `mask + 1`
///
/// # Arguments
///
/// * `start` - Earlier reading
/// * `end` - Later reading
/// * `mask` - All-ones mask covering the counter's native width
///
/// # Returns
///
/// The number of counts elapsed, assuming at most one wrap in between
pub const fn counter_delta(start: u64, end: u64, mask: u64) -> u64 {
	end.wrapping_sub(start) & mask
}

/// Difference between two 32-bit RAPL energy status readings
pub const fn energy_delta(start: u64, end: u64) -> u64 {
	counter_delta(start, end, ENERGY_STATUS_MASK)
}

/// Computes `value * mul / div` without overflowing the intermediate product
///
/// Returns 0 when `div` is 0.
pub fn mul_div(value: u64, mul: u64, div: u64) -> u64 {
	if div == 0 {
		return 0;
	}
	let wide = u128::from(value) * u128::from(mul) / u128::from(div);
	u64::try_from(wide).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn energy_delta_without_wrap() {
		assert_eq!(energy_delta(1_000, 4_500), 3_500);
	}

	#[test]
	fn energy_delta_across_wrap() {
		let prev = 0xFFFF_FF00;
		let cur = 0x40;
		assert_eq!(energy_delta(prev, cur), (1u64 << 32) - prev + cur);
		assert_eq!(energy_delta(prev, cur), 0x140);
	}

	#[test]
	fn energy_delta_ignores_bits_above_counter_width() {
		// Reserved upper bits must not leak into the delta
		assert_eq!(energy_delta(0xABCD_0000_0010, 0x1234_0000_0020), 0x10);
	}

	#[test]
	fn full_width_counter_wraps_at_u64() {
		assert_eq!(counter_delta(u64::MAX - 4, 5, u64::MAX), 10);
	}

	#[test]
	fn mul_div_keeps_wide_intermediates() {
		assert_eq!(mul_div(u64::MAX / 2, 4, 8), u64::MAX / 4);
		assert_eq!(mul_div(7, 3, 2), 10);
		assert_eq!(mul_div(7, 3, 0), 0);
	}
}
