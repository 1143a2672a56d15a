//! Calibration table generator.
//!
//! Reads measured busy-wait calibration for one or more clock tiers from a
//! TOML file, validates each tier with the library's own tick-rate and
//! calibration checks, and prints `#[derive(ClockTier)]` declarations to
//! paste into board code.
//!
//! # Input
//!
//! ```toml
//! [[tier]]
//! name = "Board16"
//! cpu_hz = 16_000_000
//! prescaler = 64          # optional, default 64
//! counter_top = 255       # optional, default 255
//! floor_us = 1
//! overhead_cycles = 20
//! loop_cycles = 4
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --features calgen --bin tickclock-calgen -- calibration.toml
//! ```

use std::fmt::Write as _;
use std::process::ExitCode;

use serde::Deserialize;
use tickclock::config::{Calibration, ConfigError, TickRate};
use tickclock::hw::Prescaler;

#[derive(Debug, Deserialize)]
struct CalibrationFile {
    #[serde(default)]
    tier: Vec<TierEntry>,
}

#[derive(Debug, Deserialize)]
struct TierEntry {
    name: String,
    cpu_hz: u32,
    #[serde(default = "default_prescaler")]
    prescaler: u16,
    #[serde(default = "default_counter_top")]
    counter_top: u16,
    floor_us: u16,
    overhead_cycles: u16,
    loop_cycles: u8,
}

fn default_prescaler() -> u16 {
    64
}

fn default_counter_top() -> u16 {
    255
}

#[derive(Debug)]
enum TierError {
    Name,
    Config(ConfigError),
}

impl std::fmt::Display for TierError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TierError::Name => write!(f, "name must be a Rust identifier"),
            TierError::Config(err) => write!(f, "{err}"),
        }
    }
}

impl From<ConfigError> for TierError {
    fn from(err: ConfigError) -> Self {
        TierError::Config(err)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn render_tier(entry: &TierEntry) -> Result<String, TierError> {
    if !is_identifier(&entry.name) {
        return Err(TierError::Name);
    }

    let prescaler =
        Prescaler::from_divisor(entry.prescaler).ok_or(ConfigError::UnsupportedPrescaler)?;
    let rate = TickRate::try_derive(entry.cpu_hz, prescaler.divisor(), entry.counter_top)?;
    let calibration = Calibration::new(entry.floor_us, entry.overhead_cycles, entry.loop_cycles);
    calibration.validate(rate.cycles_per_us)?;

    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(
        out,
        "/// {} MHz: {} ns/tick, {} ms + {}/{} per tick",
        entry.cpu_hz / 1_000_000,
        rate.nanos_per_tick(),
        rate.millis_inc,
        rate.fract_inc,
        rate.fract_max
    );
    let _ = writeln!(out, "#[derive(Debug, Copy, Clone, PartialEq, Eq, ClockTier)]");
    let _ = writeln!(
        out,
        "#[clock(cpu_hz = {}, prescaler = {}, counter_top = {}, floor_us = {}, overhead_cycles = {}, loop_cycles = {})]",
        entry.cpu_hz,
        entry.prescaler,
        entry.counter_top,
        entry.floor_us,
        entry.overhead_cycles,
        entry.loop_cycles
    );
    let _ = writeln!(out, "pub struct {};", entry.name);
    Ok(out)
}

fn main() -> ExitCode {
    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: tickclock-calgen <calibration.toml>");
        return ExitCode::from(2);
    };

    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("error: cannot read {path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let file: CalibrationFile = match toml::from_str(&text) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("error: {path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    if file.tier.is_empty() {
        eprintln!("error: {path}: no [[tier]] entries");
        return ExitCode::FAILURE;
    }

    let mut failed = false;
    println!("use tickclock::ClockTier;");
    for (index, entry) in file.tier.iter().enumerate() {
        match render_tier(entry) {
            Ok(rendered) => {
                println!();
                print!("{rendered}");
            }
            Err(err) => {
                eprintln!("error: tier[{index}] ({}): {err}", entry.name);
                failed = true;
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
