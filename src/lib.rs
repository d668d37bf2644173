pub mod actuator;
pub mod capper;
pub mod command;
pub mod config;
pub mod constants;
pub mod controller;
pub mod energy;
pub mod error;
pub mod monitor;
pub mod power;
pub mod source;
pub mod telemetry;
pub mod units;
pub mod util;

use std::io::{self, BufRead, Write};

pub use crate::actuator::{DryRunActuator, IdleActuator, PowerclampActuator};
pub use crate::capper::{PowerCapper, Status};
pub use crate::command::Command;
pub use crate::config::{CapperConfig, DualRate};
pub use crate::error::{CapperError, Result};
pub use crate::source::rapl::MsrCounterSource;
pub use crate::source::{EnergyCounterSource, PackageCState};
pub use crate::telemetry::LogEntry;

/// Serves control commands read line by line from `input`
///
/// This is the command surface of the capper: every line is one of the
/// `start`, `stop`, `target <n>`, `status` and `dump` commands, and the
/// replies go to `output`. Returns when `quit` is read or input ends; the
/// control loop is stopped before returning.
pub fn run_control_shell<S, A, R, W>(capper: &PowerCapper<S, A>, input: R, mut output: W) -> io::Result<()>
where
	S: EnergyCounterSource + ?Sized + 'static,
	A: IdleActuator + ?Sized + 'static,
	R: BufRead,
	W: Write,
{
	for line in input.lines() {
		let line = line?;
		if line.trim().is_empty() {
			continue;
		}

		let command = match line.parse::<Command>() {
			Ok(command) => command,
			Err(e) => {
				writeln!(output, "error: {e}")?;
				continue;
			},
		};

		match command {
			Command::Start => {
				if let Err(e) = capper.start() {
					writeln!(output, "error: {e}")?;
				}
			},
			Command::Stop => capper.stop(),
			Command::SetTarget(target) => capper.set_target(target),
			Command::Status => writeln!(output, "{}", capper.status())?,
			Command::DumpLog => {
				let dump = capper.dump_log();
				if dump.ends_with('\n') {
					write!(output, "{dump}")?;
				} else {
					writeln!(output, "{dump}")?;
				}
			},
			Command::Help => writeln!(output, "{}", crate::command::HELP)?,
			Command::Quit => break,
		}
		output.flush()?;
	}

	capper.shutdown();
	Ok(())
}
