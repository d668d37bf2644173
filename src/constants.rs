// Intel RAPL MSR addresses
pub const MSR_RAPL_POWER_UNIT: u32 = 0x606;
pub const MSR_PKG_ENERGY_STATUS: u32 = 0x611;
pub const MSR_DRAM_ENERGY_STATUS: u32 = 0x619;

// Platform info, bits 15:8 hold the maximum non-turbo ratio (100 MHz steps)
pub const MSR_PLATFORM_INFO: u32 = 0xCE;
pub const PLATFORM_RATIO_OFFSET: u32 = 8;
pub const PLATFORM_RATIO_MASK: u64 = 0xFF00;
pub const BUS_CLOCK_KHZ: u64 = 100_000;

// Package C-state residency MSRs
pub const MSR_PKG_C2_RESIDENCY: u32 = 0x60D;
pub const MSR_PKG_C3_RESIDENCY: u32 = 0x3F8;
pub const MSR_PKG_C6_RESIDENCY: u32 = 0x3F9;
pub const MSR_PKG_C7_RESIDENCY: u32 = 0x3FA;
pub const MSR_PKG_C8_RESIDENCY: u32 = 0x630;
pub const MSR_PKG_C9_RESIDENCY: u32 = 0x631;
pub const MSR_PKG_C10_RESIDENCY: u32 = 0x632;

// Bit fields of MSR_RAPL_POWER_UNIT
pub const POWER_UNIT_OFFSET: u32 = 0;
pub const POWER_UNIT_MASK: u64 = 0x0F;
pub const ENERGY_UNIT_OFFSET: u32 = 0x08;
pub const ENERGY_UNIT_MASK: u64 = 0x1F00;
pub const TIME_UNIT_OFFSET: u32 = 0x10;
pub const TIME_UNIT_MASK: u64 = 0xF_0000;

/// Native width of the RAPL energy status counters
pub const ENERGY_STATUS_MASK: u64 = 0xFFFF_FFFF;

/// Scale from the calibrated energy unit to microjoules
pub const ENERGY_UNIT_SCALE: u64 = 1000;
/// Fixed DRAM energy unit, in the same scale as the calibrated energy unit
pub const DRAM_ENERGY_UNIT: u64 = 15_300;
pub const MICRO_SCALE: u64 = 1_000_000;

// Idle-ratio controller tuning
pub const BASELINE_RATIO: u64 = 1;
pub const OVERSHOOT_DAMPING: u64 = 50;
pub const DECAY_NUMERATOR: u64 = 19;
pub const DECAY_DENOMINATOR: u64 = 20;
pub const HYSTERESIS_PCT: u64 = 5;

/// Entries per telemetry buffer
pub const MAX_NUMBER_OF_LOG: usize = 512;
pub const EMPTY_LOG_SENTINEL: &str = "NONE";

// Loop timing
pub const DATA_COLLECTION_INTERVAL_MS: u64 = 100;
pub const DUAL_RATE_CALIBRATION_MS: u64 = 25;
pub const DUAL_RATE_MEASUREMENT_MS: u64 = 75;

// Powerclamp cooling device discovery
pub const THERMAL_CLASS_DIR: &str = "/sys/class/thermal";
pub const POWERCLAMP_DEVICE_TYPE: &str = "intel_powerclamp";
pub const TSC_BASE_FREQUENCY_PATH: &str = "/sys/devices/system/cpu/cpu0/cpufreq/base_frequency";
