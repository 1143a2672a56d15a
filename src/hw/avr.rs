//! ATmega32U4 Timer/Counter0 driver
//!
//! Fast PWM mode 3 is used when TOP is 0xFF, which leaves OCR0A free for PWM
//! output. Any other TOP selects fast PWM mode 7 with TOP in OCR0A. Either
//! way TOV0 is raised once per period and TCNT0 is the live sub-tick count.
//!
//! # Usage
//!
//! ```ignore
//! use tickclock::{Clock, TickBus, config::ActiveTier, hw::avr::Timer0};
//!
//! static CLOCK: Clock<ActiveTier, Timer0> = Clock::new(Timer0::new());
//! static TICKS: TickBus<2> = TickBus::new();
//!
//! #[avr_device::interrupt(atmega32u4)]
//! fn TIMER0_OVF() {
//!     TICKS.dispatch();
//! }
//! ```

use avr_device::atmega32u4::{TC0, tc0};

use super::{Prescaler, TickTimer};

/// Cycles per trip of the `sbiw`/`brne` busy loop.
#[cfg(target_arch = "avr")]
const SPIN_LOOP_CYCLES: u64 = 4;

/// Timer/Counter0 of the ATmega32U4.
///
/// Zero-sized so it can sit in a `static` `Clock`; registers are reached
/// through the `TC0` register block.
#[derive(Debug, Default)]
pub struct Timer0 {
    _private: (),
}

impl Timer0 {
    /// Handle to Timer/Counter0.
    ///
    /// Only one handle should drive the peripheral. Pass the HAL's `TC0` to
    /// [`Timer0::take`] to have the type system enforce that.
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Handle to Timer/Counter0, consuming the peripheral singleton.
    pub fn take(_tc0: TC0) -> Self {
        Self::new()
    }

    fn regs(&self) -> &'static tc0::RegisterBlock {
        // SAFETY: TC0 is a fixed MMIO block; `Timer0` is its only user
        unsafe { &*TC0::ptr() }
    }
}

impl TickTimer for Timer0 {
    const MAX_TOP: u16 = 0xFF;

    fn start(&self, prescaler: Prescaler, counter_top: u16) {
        let tc0 = self.regs();
        let top_in_ocr0a = counter_top < Self::MAX_TOP;

        // Stop the counter while reconfiguring
        tc0.tccr0b().write(|w| w.cs0().no_clock());
        tc0.tccr0a().modify(|_, w| w.wgm0().pwm_fast());
        if top_in_ocr0a {
            tc0.ocr0a().write(|w| unsafe { w.bits(counter_top as u8) });
        }
        tc0.tcnt0().write(|w| unsafe { w.bits(0) });

        // Clear a stale overflow before arming the interrupt
        tc0.tifr0().write(|w| w.tov0().set_bit());
        tc0.timsk0().modify(|_, w| w.toie0().set_bit());

        tc0.tccr0b().write(|w| {
            let w = match prescaler {
                Prescaler::Div1 => w.cs0().direct(),
                Prescaler::Div8 => w.cs0().prescale_8(),
                Prescaler::Div64 => w.cs0().prescale_64(),
                Prescaler::Div256 => w.cs0().prescale_256(),
                Prescaler::Div1024 => w.cs0().prescale_1024(),
            };
            w.wgm02().bit(top_in_ocr0a)
        });
    }

    fn counter(&self) -> u16 {
        self.regs().tcnt0().read().bits() as u16
    }

    fn overflow_pending(&self) -> bool {
        self.regs().tifr0().read().tov0().bit_is_set()
    }

    /// Spins `iterations * loop_cycles` CPU cycles in a 4-cycle
    /// `sbiw`/`brne` loop, 65535 trips at a time.
    #[cfg(target_arch = "avr")]
    #[inline(never)]
    fn spin(&self, iterations: u32, loop_cycles: u8) {
        let mut trips = iterations as u64 * loop_cycles as u64 / SPIN_LOOP_CYCLES;
        while trips != 0 {
            let chunk = u16::try_from(trips).unwrap_or(u16::MAX);
            // SAFETY: register-only countdown, no memory or stack access
            unsafe {
                core::arch::asm!(
                    "1:",
                    "sbiw {n}, 1",
                    "brne 1b",
                    n = inout(reg_iw) chunk => _,
                    options(nomem, nostack),
                );
            }
            trips -= chunk as u64;
        }
    }
}
