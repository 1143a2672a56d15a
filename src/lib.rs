//! # tickclock
//!
//! Monotonic millisecond/microsecond clock for bare-metal microcontrollers,
//! driven by a periodic hardware timer overflow.
//!
//! **Key features:**
//! - **Drift-free** - Fixed-point fractional carry, integer arithmetic only
//! - **Torn-read free** - Every read is a critical-section snapshot
//! - **Const configuration** - CPU tier chosen at compile time, invalid tiers fail the build
//! - **Shared interrupt** - One overflow ISR, independent subscribers via `TickBus`
//! - **Delays** - Cooperative `delay_ms` with a yield hook, calibrated busy-wait `delay_us`
//!
//! ## Optional Features
//!
//! - `cpu-1mhz` .. `cpu-24mhz` - Select [`config::ActiveTier`] (exactly one, default `cpu-16mhz`)
//! - `atmega32u4` - Timer/Counter0 driver in [`hw::avr`] (via `avr-device`, nightly on AVR)
//! - `async` - `Clock::delay_ms_async`
//! - `embedded-hal` - `DelayNs` for [`BusyDelay`]
//! - `defmt` / `log` - Logging backend (mutually exclusive)
//! - `calgen` - `tickclock-calgen` calibration table generator (std)
//!
//! The library provides a `#[derive(ClockTier)]` macro for custom tiers.
//!
//! This library is `no_std` compatible. A `critical-section` implementation
//! must be linked in (your HAL or `avr-device` provides one).

#![no_std]
#![cfg_attr(
    all(feature = "atmega32u4", target_arch = "avr"),
    feature(asm_experimental_arch)
)]
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

// Lets `#[derive(ClockTier)]` expansions resolve `tickclock::` inside this crate
extern crate self as tickclock;

// Re-export derive macro (always available)
pub use tickclock_macros::ClockTier;

// ============================================================================
// Module Declarations
// ============================================================================

mod logging;

pub mod clock;
pub mod config;
pub mod delay;
pub mod error;
pub mod hw;
pub mod tick;

// ============================================================================
// Re-exports - Public API
// ============================================================================

pub use clock::{Clock, ClockState, Counters};
pub use config::{ActiveTier, Calibration, ClockConfig, TickRate};
pub use delay::{BusyDelay, Yield};
pub use error::ClockError;
pub use hw::{Prescaler, TickTimer};
pub use tick::{TickBus, TickSubscriber};

/// Clock running at the tier selected by the `cpu-*mhz` feature.
pub type SystemClock<T> = Clock<ActiveTier, T>;

// ============================================================================
// Library Metadata
// ============================================================================

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
