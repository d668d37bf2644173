use std::error::Error;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use powercapper::constants::{DATA_COLLECTION_INTERVAL_MS, DUAL_RATE_CALIBRATION_MS, DUAL_RATE_MEASUREMENT_MS};
use powercapper::{
	CapperConfig, DryRunActuator, DualRate, IdleActuator, MsrCounterSource, PowerCapper, PowerclampActuator,
	run_control_shell,
};

#[derive(Debug, Parser)]
#[command(name = "powercapper", version)]
#[command(about = "Caps package + DRAM power by driving intel_powerclamp idle injection from RAPL readings")]
#[command(after_help = "Reads control commands (start, stop, target <n>, status, dump, quit) from stdin.")]
struct Args {
	/// Power target, in the units of the logged average power
	#[arg(short, long, value_name = "POWER", value_parser = clap::value_parser!(u64).range(1..))]
	target: u64,

	/// Control period in single-rate mode
	#[arg(long, value_name = "MS", default_value_t = DATA_COLLECTION_INTERVAL_MS)]
	period_ms: u64,

	/// Split each period into a calibration and a measurement window
	#[arg(long)]
	dual_rate: bool,

	/// Calibration window in dual-rate mode
	#[arg(long, value_name = "MS", default_value_t = DUAL_RATE_CALIBRATION_MS, requires = "dual_rate")]
	calibration_ms: u64,

	/// Measurement window in dual-rate mode
	#[arg(long, value_name = "MS", default_value_t = DUAL_RATE_MEASUREMENT_MS, requires = "dual_rate")]
	measurement_ms: u64,

	/// CPU whose MSR device is read
	#[arg(long, value_name = "CPU", default_value_t = 0)]
	msr_cpu: u16,

	/// Pin the control loop thread to this CPU
	#[arg(long, value_name = "CPU")]
	pin_cpu: Option<usize>,

	/// Log the idle ratio instead of driving intel_powerclamp
	#[arg(long)]
	dry_run: bool,

	/// Start capping immediately instead of waiting for `start`
	#[arg(long)]
	autostart: bool,
}

impl Args {
	fn config(&self) -> CapperConfig {
		let mut config = CapperConfig::new(self.target)
			.with_period(Duration::from_millis(self.period_ms))
			.with_msr_cpu(self.msr_cpu);

		if self.dual_rate {
			config = config.with_dual_rate(DualRate {
				calibration: Duration::from_millis(self.calibration_ms),
				measurement: Duration::from_millis(self.measurement_ms),
			});
		}

		if let Some(cpu) = self.pin_cpu {
			config = config.with_pin_cpu(cpu);
		}

		config
	}
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
	let actuator: Arc<dyn IdleActuator> = if args.dry_run {
		Arc::new(DryRunActuator)
	} else {
		Arc::new(PowerclampActuator::discover()?)
	};
	let config = args.config();
	let source = Arc::new(MsrCounterSource::from_config(&config));

	let capper = PowerCapper::new(source, actuator, config)?;

	if args.autostart {
		capper.start()?;
	}

	run_control_shell(&capper, io::stdin().lock(), io::stdout().lock())?;
	Ok(())
}

fn main() -> ExitCode {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	match run(Args::parse()) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			log::error!("{e}");
			ExitCode::FAILURE
		},
	}
}
