//! Clock tier configuration.
//!
//! The `ClockConfig` trait fixes, at compile time, everything the clock needs
//! to know about one CPU-frequency tier: the timer divider and period, the
//! millisecond/fractional increments applied per tick, and the busy-wait
//! calibration. All values are const (zero runtime cost).
//!
//! Tiers are declared with `#[derive(ClockTier)]`. The active tier for a
//! build is chosen by exactly one `cpu-*` cargo feature and exposed as
//! [`ActiveTier`].

use core::fmt;

use crate::ClockTier;
use crate::hw::Prescaler;

// ============================================================================
// Configuration Trait
// ============================================================================

/// Compile-time description of one CPU-frequency tier.
pub trait ClockConfig {
    /// CPU clock in Hz (a whole number of MHz)
    const CPU_HZ: u32;

    /// Timer divider
    const PRESCALER: Prescaler;

    /// Highest timer count before overflow (255 for an 8-bit timer)
    const COUNTER_TOP: u16;

    /// Busy-wait calibration for `delay_us`
    const CALIBRATION: Calibration;

    /// Per-tick increments derived from the values above
    const RATE: TickRate =
        TickRate::derive(Self::CPU_HZ, Self::PRESCALER.divisor(), Self::COUNTER_TOP);
}

/// Force evaluation of a tier's derived constants.
///
/// Emitted by `#[derive(ClockTier)]`; an invalid tier turns into a
/// compile-time panic here.
pub const fn assert_valid<C: ClockConfig>() {
    let rate = C::RATE;
    if let Err(err) = C::CALIBRATION.validate(rate.cycles_per_us) {
        err.panic();
    }
}

// ============================================================================
// Derived Tick Rate
// ============================================================================

/// Fixed-point per-tick increments.
///
/// The fractional carry is kept in CPU-cycle units reduced by their common
/// divisor, so the long-run millisecond rate is exact for every tier.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickRate {
    /// CPU cycles between overflows
    pub cycles_per_tick: u32,
    /// Timer counts between overflows (`counter_top + 1`)
    pub counts_per_tick: u32,
    /// CPU cycles per microsecond
    pub cycles_per_us: u32,
    /// Whole milliseconds added per tick
    pub millis_inc: u32,
    /// Fractional units added per tick
    pub fract_inc: u16,
    /// Fractional units per millisecond
    pub fract_max: u16,
    /// Microseconds per timer count, numerator
    pub micros_num: u32,
    /// Microseconds per timer count, denominator
    pub micros_den: u32,
    /// Whole microseconds added per tick
    pub micros_inc: u32,
    /// Fractional microseconds added per tick, in units of `1 / micros_den`
    pub micros_fract_inc: u16,
}

impl TickRate {
    /// Derive the rate, panicking (at compile time when used in a const) if
    /// the tier cannot be represented.
    pub const fn derive(cpu_hz: u32, prescaler: u16, counter_top: u16) -> Self {
        match Self::try_derive(cpu_hz, prescaler, counter_top) {
            Ok(rate) => rate,
            Err(err) => err.panic(),
        }
    }

    /// Derive the rate for a CPU frequency, divider and counter period.
    pub const fn try_derive(
        cpu_hz: u32,
        prescaler: u16,
        counter_top: u16,
    ) -> Result<Self, ConfigError> {
        if cpu_hz == 0 || cpu_hz % 1_000_000 != 0 {
            return Err(ConfigError::CpuHzNotWholeMegahertz);
        }
        if Prescaler::from_divisor(prescaler).is_none() {
            return Err(ConfigError::UnsupportedPrescaler);
        }
        if counter_top == 0 {
            return Err(ConfigError::CounterTopZero);
        }

        let counts_per_tick = counter_top as u32 + 1;
        let cycles_per_tick = prescaler as u32 * counts_per_tick;
        let cycles_per_ms = cpu_hz / 1000;
        let cycles_per_us = cpu_hz / 1_000_000;

        let millis_inc = cycles_per_tick / cycles_per_ms;
        let remainder = cycles_per_tick % cycles_per_ms;
        let g = gcd(remainder, cycles_per_ms);
        let fract_inc = remainder / g;
        let fract_max = cycles_per_ms / g;
        if fract_max > u16::MAX as u32 {
            return Err(ConfigError::FractionTooWide);
        }

        let micros = gcd(prescaler as u32, cycles_per_us);
        let micros_num = prescaler as u32 / micros;
        let micros_den = cycles_per_us / micros;
        let micros_per_tick = counts_per_tick * micros_num;

        Ok(Self {
            cycles_per_tick,
            counts_per_tick,
            cycles_per_us,
            millis_inc,
            fract_inc: fract_inc as u16,
            fract_max: fract_max as u16,
            micros_num,
            micros_den,
            micros_inc: micros_per_tick / micros_den,
            micros_fract_inc: (micros_per_tick % micros_den) as u16,
        })
    }

    /// Microseconds covered by `sub` live timer counts, plus a fractional
    /// residue in units of `1 / micros_den`.
    pub const fn sub_tick_micros(&self, micros_fract: u16, sub: u16) -> u32 {
        (micros_fract as u32 + sub as u32 * self.micros_num) / self.micros_den
    }

    /// Tick period in nanoseconds.
    pub const fn nanos_per_tick(&self) -> u64 {
        self.cycles_per_tick as u64 * 1000 / self.cycles_per_us as u64
    }
}

const fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    if a == 0 { 1 } else { a }
}

// ============================================================================
// Busy-Wait Calibration
// ============================================================================

/// Per-tier busy-wait constants.
///
/// Measured against a reference clock for one compiled form of the delay
/// loop. A new toolchain or loop body needs re-measuring.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    /// Requests at or below this many microseconds return immediately
    pub floor_us: u16,
    /// Cycles spent on call and setup before the loop starts
    pub overhead_cycles: u16,
    /// Cycles per loop iteration
    pub loop_cycles: u8,
}

impl Calibration {
    /// Create a calibration entry.
    pub const fn new(floor_us: u16, overhead_cycles: u16, loop_cycles: u8) -> Self {
        Self {
            floor_us,
            overhead_cycles,
            loop_cycles,
        }
    }

    /// Check the entry against the tier's cycles-per-microsecond.
    ///
    /// The smallest request above the floor must cover the overhead, so the
    /// loop count never has to go negative.
    pub const fn validate(&self, cycles_per_us: u32) -> Result<(), ConfigError> {
        if self.loop_cycles == 0 {
            return Err(ConfigError::LoopCyclesZero);
        }
        if (self.floor_us as u32 + 1) * cycles_per_us < self.overhead_cycles as u32 {
            return Err(ConfigError::FloorBelowOverhead);
        }
        Ok(())
    }

    /// Loop iterations for a `us` microsecond wait.
    ///
    /// Computed in 64 bits: the full `u32` microsecond range fits at every
    /// tier.
    pub const fn iterations(&self, us: u32, cycles_per_us: u32) -> u64 {
        if us <= self.floor_us as u32 {
            return 0;
        }
        (us as u64 * cycles_per_us as u64).saturating_sub(self.overhead_cycles as u64)
            / self.loop_cycles as u64
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Reasons a tier description is rejected.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// CPU frequency is zero or not a whole number of MHz
    CpuHzNotWholeMegahertz,
    /// Divider not available on the timer
    UnsupportedPrescaler,
    /// Counter period of zero counts
    CounterTopZero,
    /// Reduced fractional denominator does not fit 16 bits
    FractionTooWide,
    /// Calibration loop of zero cycles
    LoopCyclesZero,
    /// Overhead exceeds the shortest delay above the floor
    FloorBelowOverhead,
}

impl ConfigError {
    const fn panic(self) -> ! {
        match self {
            ConfigError::CpuHzNotWholeMegahertz => {
                panic!("clock tier: CPU_HZ must be a whole number of MHz")
            }
            ConfigError::UnsupportedPrescaler => panic!("clock tier: unsupported prescaler"),
            ConfigError::CounterTopZero => panic!("clock tier: COUNTER_TOP must be non-zero"),
            ConfigError::FractionTooWide => {
                panic!("clock tier: fractional millisecond does not fit 16 bits")
            }
            ConfigError::LoopCyclesZero => panic!("clock tier: loop_cycles must be non-zero"),
            ConfigError::FloorBelowOverhead => {
                panic!("clock tier: overhead_cycles exceeds the delay above floor_us")
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::CpuHzNotWholeMegahertz => {
                write!(f, "CPU frequency must be a whole number of MHz")
            }
            ConfigError::UnsupportedPrescaler => write!(f, "Unsupported prescaler"),
            ConfigError::CounterTopZero => write!(f, "Counter top must be non-zero"),
            ConfigError::FractionTooWide => write!(f, "Fractional millisecond too wide"),
            ConfigError::LoopCyclesZero => write!(f, "Loop cycles must be non-zero"),
            ConfigError::FloorBelowOverhead => {
                write!(f, "Overhead cycles exceed the shortest delay above the floor")
            }
        }
    }
}

// ============================================================================
// Built-in Tiers
// ============================================================================

/// 1 MHz (internal RC, default fuses)
#[derive(Debug, Copy, Clone, PartialEq, Eq, ClockTier)]
#[clock(cpu_hz = 1_000_000)]
pub struct Mhz1;

/// 8 MHz (internal RC or 3.3V boards)
#[derive(Debug, Copy, Clone, PartialEq, Eq, ClockTier)]
#[clock(cpu_hz = 8_000_000)]
pub struct Mhz8;

/// 12 MHz
#[derive(Debug, Copy, Clone, PartialEq, Eq, ClockTier)]
#[clock(cpu_hz = 12_000_000)]
pub struct Mhz12;

/// 16 MHz (most 5V boards)
#[derive(Debug, Copy, Clone, PartialEq, Eq, ClockTier)]
#[clock(cpu_hz = 16_000_000)]
pub struct Mhz16;

/// 20 MHz
#[derive(Debug, Copy, Clone, PartialEq, Eq, ClockTier)]
#[clock(cpu_hz = 20_000_000)]
pub struct Mhz20;

/// 24 MHz (overclocked)
#[derive(Debug, Copy, Clone, PartialEq, Eq, ClockTier)]
#[clock(cpu_hz = 24_000_000)]
pub struct Mhz24;

// ============================================================================
// Active Tier Selection
// ============================================================================

#[cfg(not(any(
    feature = "cpu-1mhz",
    feature = "cpu-8mhz",
    feature = "cpu-12mhz",
    feature = "cpu-16mhz",
    feature = "cpu-20mhz",
    feature = "cpu-24mhz"
)))]
compile_error!("Enable exactly one `cpu-*mhz` feature to select the clock tier.");

const SELECTED_TIERS: usize = cfg!(feature = "cpu-1mhz") as usize
    + cfg!(feature = "cpu-8mhz") as usize
    + cfg!(feature = "cpu-12mhz") as usize
    + cfg!(feature = "cpu-16mhz") as usize
    + cfg!(feature = "cpu-20mhz") as usize
    + cfg!(feature = "cpu-24mhz") as usize;

const _: () = assert!(
    SELECTED_TIERS <= 1,
    "`cpu-*mhz` features are mutually exclusive; enable only one"
);

/// Tier selected by the `cpu-*mhz` feature.
#[cfg(feature = "cpu-24mhz")]
pub type ActiveTier = Mhz24;

/// Tier selected by the `cpu-*mhz` feature.
#[cfg(all(feature = "cpu-20mhz", not(feature = "cpu-24mhz")))]
pub type ActiveTier = Mhz20;

/// Tier selected by the `cpu-*mhz` feature.
#[cfg(all(
    feature = "cpu-16mhz",
    not(any(feature = "cpu-20mhz", feature = "cpu-24mhz"))
))]
pub type ActiveTier = Mhz16;

/// Tier selected by the `cpu-*mhz` feature.
#[cfg(all(
    feature = "cpu-12mhz",
    not(any(feature = "cpu-16mhz", feature = "cpu-20mhz", feature = "cpu-24mhz"))
))]
pub type ActiveTier = Mhz12;

/// Tier selected by the `cpu-*mhz` feature.
#[cfg(all(
    feature = "cpu-8mhz",
    not(any(
        feature = "cpu-12mhz",
        feature = "cpu-16mhz",
        feature = "cpu-20mhz",
        feature = "cpu-24mhz"
    ))
))]
pub type ActiveTier = Mhz8;

/// Tier selected by the `cpu-*mhz` feature.
#[cfg(all(
    feature = "cpu-1mhz",
    not(any(
        feature = "cpu-8mhz",
        feature = "cpu-12mhz",
        feature = "cpu-16mhz",
        feature = "cpu-20mhz",
        feature = "cpu-24mhz"
    ))
))]
pub type ActiveTier = Mhz1;
