use std::str::FromStr;

use thiserror::Error;

/// One line of the control shell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
	Start,
	Stop,
	SetTarget(i64),
	Status,
	DumpLog,
	Help,
	Quit,
}

/// Reason a shell line was not understood
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ParseCommandError(String);

impl FromStr for Command {
	type Err = ParseCommandError;

	fn from_str(line: &str) -> Result<Self, Self::Err> {
		let mut words = line.split_whitespace();
		let Some(verb) = words.next() else {
			return Err(ParseCommandError("empty command".into()));
		};

		let command = match verb.to_ascii_lowercase().as_str() {
			"start" => Command::Start,
			"stop" => Command::Stop,
			"status" => Command::Status,
			"dump" | "dump_log" => Command::DumpLog,
			"help" | "?" => Command::Help,
			"quit" | "exit" => Command::Quit,
			"target" | "set_target" => {
				let value = words
					.next()
					.ok_or_else(|| ParseCommandError(format!("{verb} needs a power value")))?;
				let target = value
					.parse::<i64>()
					.map_err(|e| ParseCommandError(format!("bad power value {value:?}: {e}")))?;
				Command::SetTarget(target)
			},
			other => return Err(ParseCommandError(format!("unknown command {other:?}"))),
		};

		if let Some(extra) = words.next() {
			return Err(ParseCommandError(format!("unexpected argument {extra:?}")));
		}

		Ok(command)
	}
}

pub const HELP: &str = "\
commands:
  start            begin power capping
  stop             stop power capping
  target <power>   set the power target (positive integer)
  status           print stopped/running
  dump             print and clear the telemetry log
  quit             stop and exit";

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_control_commands() {
		assert_eq!("start".parse(), Ok(Command::Start));
		assert_eq!("  STOP \n".parse(), Ok(Command::Stop));
		assert_eq!("status".parse(), Ok(Command::Status));
		assert_eq!("dump_log".parse(), Ok(Command::DumpLog));
		assert_eq!("dump".parse(), Ok(Command::DumpLog));
		assert_eq!("exit".parse(), Ok(Command::Quit));
	}

	#[test]
	fn parses_targets_including_non_positive() {
		assert_eq!("target 4000".parse(), Ok(Command::SetTarget(4000)));
		assert_eq!("set_target -5".parse(), Ok(Command::SetTarget(-5)));
		assert_eq!("target 0".parse(), Ok(Command::SetTarget(0)));
	}

	#[test]
	fn rejects_malformed_lines() {
		assert!("".parse::<Command>().is_err());
		assert!("target".parse::<Command>().is_err());
		assert!("target lots".parse::<Command>().is_err());
		assert!("start now".parse::<Command>().is_err());
		assert!("reboot".parse::<Command>().is_err());
	}

	#[test]
	fn parse_errors_describe_the_line() {
		let err = "reboot".parse::<Command>().unwrap_err();
		assert_eq!(err.to_string(), "unknown command \"reboot\"");

		let boxed: Box<dyn std::error::Error> = Box::new("target".parse::<Command>().unwrap_err());
		assert_eq!(boxed.to_string(), "target needs a power value");
	}
}
