//! Idle-ratio feedback controller
//!
//! The controller is a decayed proportional controller with asymmetric gain:
//! overshoot is answered immediately with a jump proportional to the excess,
//! undershoot only relaxes the ratio once it exceeds a 5% dead band.
//! A ratio of 1 is the baseline and means no throttling.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::constants::*;

/// Which arm of the controller produced a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
	/// Over budget: ratio raised (or re-decayed) and applied
	Throttle,
	/// Under budget beyond the dead band: ratio lowered and applied
	Relax,
	/// Nothing to do: baseline under budget, or inside the dead band
	Hold,
}

/// Result of one controller step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
	pub ratio: u64,
	pub branch: Branch,
}

impl Transition {
	/// Whether the new ratio must be pushed to the actuator
	pub fn applies(&self) -> bool {
		self.branch != Branch::Hold
	}
}

/// Computes the next idle ratio from a single power measurement
pub fn transition(ratio: u64, measured: u64, target: u64) -> Transition {
	transition_with_trigger(ratio, measured, measured, target)
}

/// Computes the next idle ratio when the branch is chosen by one estimate
/// (`trigger`) and the step is sized by another (`measured`)
///
/// In dual-rate mode `trigger` is the logged long-window power and
/// `measured` the short-window power. When the two disagree the chosen arm
/// hands off to the other one, at most once.
pub fn transition_with_trigger(ratio: u64, trigger: u64, measured: u64, target: u64) -> Transition {
	let ratio = ratio.max(BASELINE_RATIO);

	if trigger >= target {
		if measured < target {
			return relax(ratio, measured, target);
		}
		return throttle(ratio, measured, target);
	}

	if ratio == BASELINE_RATIO {
		return hold(ratio);
	}
	if measured > target {
		return throttle(ratio, measured, target);
	}
	relax(ratio, measured, target)
}

/// Percentage by which `measured` exceeds `target`, damped for large readings
///
/// Readings at or below the damping offset fall back to the undamped ratio
/// so the denominator stays positive.
fn overshoot_pct(measured: u64, target: u64) -> u64 {
	let excess = measured.saturating_sub(target);
	let denominator = if measured > OVERSHOOT_DAMPING {
		measured - OVERSHOOT_DAMPING
	} else {
		measured.max(1)
	};
	excess.saturating_mul(100) / denominator
}

fn throttle(ratio: u64, measured: u64, target: u64) -> Transition {
	let over = overshoot_pct(measured, target);

	let raised = if ratio == BASELINE_RATIO {
		over
	} else {
		ratio.saturating_add(over)
	};

	let decayed = raised.saturating_mul(DECAY_NUMERATOR) / DECAY_DENOMINATOR;

	Transition {
		ratio: decayed.max(BASELINE_RATIO),
		branch: Branch::Throttle,
	}
}

fn relax(ratio: u64, measured: u64, target: u64) -> Transition {
	if ratio == BASELINE_RATIO || target == 0 {
		return hold(ratio);
	}

	let under = 1 + target.saturating_sub(measured).saturating_mul(100) / target;
	if under <= HYSTERESIS_PCT {
		return hold(ratio);
	}

	let step = under - HYSTERESIS_PCT;
	let next = if ratio > step { ratio - step } else { BASELINE_RATIO };

	Transition {
		ratio: next,
		branch: Branch::Relax,
	}
}

fn hold(ratio: u64) -> Transition {
	Transition {
		ratio,
		branch: Branch::Hold,
	}
}

/// State shared between the control loop and the control plane
///
/// Each field is a single atomic so a tick never observes a torn update.
#[derive(Debug)]
pub struct ControllerState {
	current_ratio: AtomicU64,
	target_power: AtomicU64,
	running: AtomicBool,
}

impl ControllerState {
	pub fn new(target_power: u64) -> Self {
		Self {
			current_ratio: AtomicU64::new(BASELINE_RATIO),
			target_power: AtomicU64::new(target_power),
			running: AtomicBool::new(false),
		}
	}

	pub fn ratio(&self) -> u64 {
		self.current_ratio.load(Ordering::Acquire)
	}

	pub(crate) fn set_ratio(&self, ratio: u64) {
		self.current_ratio.store(ratio.max(BASELINE_RATIO), Ordering::Release);
	}

	pub fn target(&self) -> u64 {
		self.target_power.load(Ordering::Acquire)
	}

	/// Updates the setpoint; zero is rejected and leaves the state untouched
	pub fn set_target(&self, target_power: u64) -> bool {
		if target_power == 0 {
			return false;
		}
		self.target_power.store(target_power, Ordering::Release);
		true
	}

	pub fn is_running(&self) -> bool {
		self.running.load(Ordering::Acquire)
	}

	/// Flips `running` from false to true; returns false if already running
	pub(crate) fn begin(&self) -> bool {
		self.running
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_ok()
	}

	/// Flips `running` from true to false; returns false if already stopped
	pub(crate) fn end(&self) -> bool {
		self.running
			.compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
			.is_ok()
	}
}
