use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::constants::{EMPTY_LOG_SENTINEL, MAX_NUMBER_OF_LOG};

/// One control cycle as recorded in the telemetry log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogEntry {
	/// Interval length in nanoseconds
	pub duration_ns: u64,

	/// Package energy consumed over the interval
	pub package_energy_delta: u64,

	/// DRAM energy consumed over the interval
	pub dram_energy_delta: u64,

	/// Controller ratio after this cycle
	pub idle_rate: u64,

	/// Measured package idle percentage over the interval
	pub cur_idle_rate: u64,

	/// Average package + DRAM power over the interval
	pub average_power: u64,

	/// Short-window power, only present in dual-rate mode
	pub change_power: Option<u64>,

	/// Setpoint in effect when the cycle ran
	pub target_power: u64,

	/// Cycle counter at the end of the interval
	pub timestamp: u64,
}

impl fmt::Display for LogEntry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.average_power)?;
		if let Some(change_power) = self.change_power {
			write!(f, ",{change_power}")?;
		}
		write!(
			f,
			",{},{},{},{},{},{},{}",
			self.target_power,
			self.cur_idle_rate,
			self.idle_rate,
			self.duration_ns,
			self.package_energy_delta,
			self.dram_energy_delta,
			self.timestamp
		)
	}
}

/// Fixed-capacity ring of log entries with a write cursor
#[derive(Debug, Clone)]
pub struct LogBuffer {
	entries: Box<[LogEntry]>,
	cursor: usize,
}

impl LogBuffer {
	pub fn new(capacity: usize) -> Self {
		Self {
			entries: vec![LogEntry::default(); capacity.max(1)].into_boxed_slice(),
			cursor: 0,
		}
	}

	/// Writes at the cursor, wrapping to slot 0 once the buffer is full
	pub fn push(&mut self, entry: LogEntry) {
		if self.cursor == self.entries.len() {
			self.cursor = 0;
		}
		self.entries[self.cursor] = entry;
		self.cursor += 1;
	}

	pub fn cursor(&self) -> usize {
		self.cursor
	}

	pub fn capacity(&self) -> usize {
		self.entries.len()
	}

	pub fn get(&self, index: usize) -> Option<&LogEntry> {
		self.entries.get(index)
	}

	/// Entries eligible for a dump: slots before the cursor, minus the most
	/// recent one
	pub fn settled(&self) -> &[LogEntry] {
		&self.entries[..self.cursor.saturating_sub(1)]
	}

	fn reset(&mut self) {
		self.cursor = 0;
	}
}

#[derive(Debug)]
struct DoubleBuffer {
	buffers: [LogBuffer; 2],
	active: usize,
}

/// Pair of log buffers: the control loop appends to the active one while a
/// dump swaps them and drains the one that was active
///
/// Appends and swaps are serialized by one lock, so a dump never sees a
/// cursor mid-update.
#[derive(Debug)]
pub struct TelemetryLog {
	inner: Mutex<DoubleBuffer>,
}

impl Default for TelemetryLog {
	fn default() -> Self {
		Self::with_capacity(MAX_NUMBER_OF_LOG)
	}
}

impl TelemetryLog {
	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			inner: Mutex::new(DoubleBuffer {
				buffers: [LogBuffer::new(capacity), LogBuffer::new(capacity)],
				active: 0,
			}),
		}
	}

	fn lock(&self) -> MutexGuard<'_, DoubleBuffer> {
		self.inner.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Appends one entry to the active buffer
	pub fn record(&self, entry: LogEntry) {
		let mut log = self.lock();
		let active = log.active;
		log.buffers[active].push(entry);
	}

	/// Number of writes held by the active buffer
	pub fn pending(&self) -> usize {
		let log = self.lock();
		log.buffers[log.active].cursor()
	}

	/// Swaps the buffers and returns the settled entries of the one that was
	/// active
	pub fn drain(&self) -> Vec<LogEntry> {
		let mut log = self.lock();
		let drained = log.active;
		let next = 1 - drained;

		log.buffers[next].reset();
		log.active = next;

		log.buffers[drained].settled().to_vec()
	}

	/// Drains and renders one comma-separated line per entry, or `NONE`
	pub fn dump(&self) -> String {
		let entries = self.drain();
		if entries.is_empty() {
			return EMPTY_LOG_SENTINEL.to_string();
		}

		entries.iter().map(|entry| format!("{entry}\n")).collect()
	}
}
