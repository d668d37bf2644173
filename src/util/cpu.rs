use std::io;

/// Pins the calling thread to a single logical CPU
///
/// # Arguments
///
/// * `cpu_id` - Logical CPU the thread may run on from now on
pub fn pin_current_thread(cpu_id: usize) -> io::Result<()> {
	if cpu_id >= libc::CPU_SETSIZE as usize {
		return Err(io::Error::new(
			io::ErrorKind::InvalidInput,
			format!("CPU {cpu_id} exceeds the affinity mask size"),
		));
	}

	// SAFETY: cpu_set_t is plain data, zeroed is a valid empty set, and the
	// index was bounds-checked above
	let result = unsafe {
		let mut cpuset: libc::cpu_set_t = std::mem::zeroed();
		libc::CPU_SET(cpu_id, &mut cpuset);

		let thread_id = libc::pthread_self();
		libc::pthread_setaffinity_np(thread_id, std::mem::size_of::<libc::cpu_set_t>(), &cpuset)
	};

	if result != 0 {
		return Err(io::Error::from_raw_os_error(result));
	}

	Ok(())
}
