use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{POWERCLAMP_DEVICE_TYPE, THERMAL_CLASS_DIR};
use crate::error::{CapperError, Result};

/// Consumer of the controller's idle ratio
///
/// Calls are fire-and-forget: implementations report their own failures.
pub trait IdleActuator: Send + Sync {
	/// Requests idle injection at `ratio` (always at least 1)
	fn apply_ratio(&self, ratio: u64);

	/// Stops idle injection entirely, called when the control loop exits
	fn release(&self) {}
}

/// Drives the `intel_powerclamp` thermal cooling device
#[derive(Debug, Clone)]
pub struct PowerclampActuator {
	cur_state: PathBuf,
	max_state: u64,
}

impl PowerclampActuator {
	/// Locates the powerclamp cooling device under `/sys/class/thermal`
	pub fn discover() -> Result<Self> {
		Self::discover_in(Path::new(THERMAL_CLASS_DIR))
	}

	/// Locates the powerclamp cooling device under an arbitrary class directory
	pub fn discover_in(thermal_dir: &Path) -> Result<Self> {
		let entries = fs::read_dir(thermal_dir).map_err(|source| CapperError::Actuator {
			path: thermal_dir.to_path_buf(),
			source,
		})?;

		for entry in entries.filter_map(std::result::Result::ok) {
			let path = entry.path();
			let is_cooling_device = path
				.file_name()
				.map(|name| name.to_string_lossy().starts_with("cooling_device"))
				.unwrap_or(false);
			if !is_cooling_device {
				continue;
			}

			let Ok(device_type) = fs::read_to_string(path.join("type")) else {
				continue;
			};
			if device_type.trim() == POWERCLAMP_DEVICE_TYPE {
				return Self::open(&path);
			}
		}

		Err(CapperError::Actuator {
			path: thermal_dir.to_path_buf(),
			source: std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("no {POWERCLAMP_DEVICE_TYPE} cooling device (is the driver loaded?)"),
			),
		})
	}

	/// Opens a specific cooling device directory
	pub fn open(device_dir: &Path) -> Result<Self> {
		let max_path = device_dir.join("max_state");
		let max_state = fs::read_to_string(&max_path)
			.and_then(|s| {
				s.trim()
					.parse::<u64>()
					.map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
			})
			.map_err(|source| CapperError::Actuator { path: max_path, source })?;

		log::info!("Using {} (max_state={max_state})", device_dir.display());

		Ok(Self {
			cur_state: device_dir.join("cur_state"),
			max_state,
		})
	}

	pub fn max_state(&self) -> u64 {
		self.max_state
	}

	fn write_state(&self, state: u64) {
		if let Err(e) = fs::write(&self.cur_state, state.to_string()) {
			log::warn!("Failed to write {} to {}: {e}", state, self.cur_state.display());
		}
	}
}

impl IdleActuator for PowerclampActuator {
	fn apply_ratio(&self, ratio: u64) {
		let state = ratio.min(self.max_state);
		log::debug!("idle injection ratio {ratio} -> cur_state {state}");
		self.write_state(state);
	}

	fn release(&self) {
		self.write_state(0);
	}
}

/// Actuator that only logs the requested ratio
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunActuator;

impl IdleActuator for DryRunActuator {
	fn apply_ratio(&self, ratio: u64) {
		log::info!("dry run: idle injection ratio {ratio}");
	}
}
