use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the capper
pub type Result<T> = std::result::Result<T, CapperError>;

/// Failures surfaced by the measurement-and-control core
#[derive(Debug, Error)]
pub enum CapperError {
	/// Unit calibration failed; the control loop cannot start
	#[error("unit calibration failed: {source}")]
	Calibration {
		#[source]
		source: io::Error,
	},

	/// A single register read failed for one tick
	#[error("failed to read {register}: {source}")]
	HardwareRead {
		register: &'static str,
		#[source]
		source: io::Error,
	},

	#[error("invalid configuration: {0}")]
	InvalidConfig(String),

	#[error("failed to spawn the control loop: {0}")]
	Spawn(#[source] io::Error),

	/// The idle actuator could not be located or opened
	#[error("idle actuator unavailable at {}: {source}", .path.display())]
	Actuator {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
}

impl CapperError {
	pub(crate) fn hardware(register: &'static str, source: io::Error) -> Self {
		Self::HardwareRead { register, source }
	}

	/// Returns true for errors that prevent the loop from ever starting
	pub fn is_fatal(&self) -> bool {
		matches!(self, Self::Calibration { .. })
	}
}
