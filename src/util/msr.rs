use msru::{Accessor, Msr};
use std::io;

/// Reads a value from a Model-Specific Register (MSR)
///
/// # Arguments
///
/// * `msr_address` - The address of the MSR to read
/// * `cpu_id` - The CPU whose `/dev/cpu/N/msr` device is used
///
/// # Returns
///
/// The raw 64-bit register value, or an io::Error if the register is
/// unreadable (missing msr driver, insufficient privileges, or a register
/// the processor does not implement)
pub fn read_msr(msr_address: u32, cpu_id: u16) -> io::Result<u64> {
	Msr::new(msr_address, cpu_id)
		.map_err(io::Error::other)?
		.read()
		.map_err(io::Error::other)
}
