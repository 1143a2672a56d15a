//! Hardware timer abstraction.
//!
//! The `TickTimer` trait is the only thing the clock needs from the silicon: a
//! free-running counter that overflows at a fixed interval, its live value,
//! and the pending-overflow flag. Implement it for any periodic timer
//! (Timer/Counter0 on AVR, a simulated timer in tests, etc.).

#[cfg(feature = "atmega32u4")]
pub mod avr;

/// Hardware clock divider between the CPU clock and the timer counter.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Prescaler {
    /// Count every CPU cycle
    Div1,
    /// Count every 8 CPU cycles
    Div8,
    /// Count every 64 CPU cycles
    Div64,
    /// Count every 256 CPU cycles
    Div256,
    /// Count every 1024 CPU cycles
    Div1024,
}

impl Prescaler {
    /// CPU cycles per timer count.
    pub const fn divisor(self) -> u16 {
        match self {
            Prescaler::Div1 => 1,
            Prescaler::Div8 => 8,
            Prescaler::Div64 => 64,
            Prescaler::Div256 => 256,
            Prescaler::Div1024 => 1024,
        }
    }

    /// Look up the prescaler for a divisor, if the hardware has one.
    pub const fn from_divisor(divisor: u16) -> Option<Self> {
        match divisor {
            1 => Some(Prescaler::Div1),
            8 => Some(Prescaler::Div8),
            64 => Some(Prescaler::Div64),
            256 => Some(Prescaler::Div256),
            1024 => Some(Prescaler::Div1024),
            _ => None,
        }
    }
}

/// Periodic hardware timer driving the clock.
///
/// All methods take `&self`: the timer is memory-mapped hardware (or an
/// atomics-backed simulation) and is shared between the main line and the
/// overflow interrupt.
///
/// Implementations must not block. `counter()` and `overflow_pending()` are
/// called inside a critical section.
pub trait TickTimer {
    /// Largest `counter_top` the hardware supports (255 for an 8-bit timer).
    const MAX_TOP: u16;

    /// Configure the divider and counting mode so the counter runs
    /// `0..=counter_top` and overflows back to zero, clear any stale
    /// overflow flag, and enable the overflow interrupt.
    fn start(&self, prescaler: Prescaler, counter_top: u16);

    /// Live sub-tick count, `0..=counter_top`.
    fn counter(&self) -> u16;

    /// True when the overflow flag is set but the interrupt has not run yet.
    fn overflow_pending(&self) -> bool;

    /// Busy-wait `iterations` trips of a loop costing `loop_cycles` CPU
    /// cycles each.
    ///
    /// `loop_cycles` is the per-trip cost the tier's `Calibration` was
    /// measured with. Cycle-exact implementations (see `hw::avr::Timer0`)
    /// spin `iterations * loop_cycles` cycles. The default is a portable
    /// countdown whose per-trip cost depends on the target and optimizer, so
    /// `delay_us` is only as accurate as that cost is close to `loop_cycles`.
    #[inline(never)]
    fn spin(&self, iterations: u32, loop_cycles: u8) {
        let _ = loop_cycles;
        let mut remaining = iterations;
        while remaining != 0 {
            remaining = core::hint::black_box(remaining) - 1;
        }
    }
}
