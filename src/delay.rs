//! Delays derived from the clock.
//!
//! - `delay_ms`: cooperative. Polls `micros()` and calls a yield hook between
//!   polls so background work keeps running.
//! - `delay_us`: calibrated busy-wait. Blocks the main line completely; the
//!   tick interrupt still preempts it.

use crate::clock::Clock;
use crate::config::ClockConfig;
use crate::error::ClockError;
use crate::hw::TickTimer;
use crate::logging::log_warn;

/// Cooperative yield hook called while waiting in `delay_ms`.
///
/// Use it to service peripherals, a watchdog or a task scheduler. This crate
/// only calls it; what it does is up to the caller.
pub trait Yield {
    /// Let other work run for a moment.
    fn yield_now(&mut self);
}

impl<F: FnMut()> Yield for F {
    fn yield_now(&mut self) {
        self()
    }
}

impl<C: ClockConfig, T: TickTimer> Clock<C, T> {
    /// Wait approximately `ms` milliseconds, calling `hook` between polls.
    ///
    /// The baseline advances by exactly 1000 us per elapsed millisecond
    /// rather than being re-sampled, so time spent in the hook does not
    /// accumulate as drift.
    ///
    /// Returns `ClockError::NotRunning` if the clock was never started
    /// (the wait would never end).
    pub fn delay_ms(&self, ms: u32, hook: &mut impl Yield) -> Result<(), ClockError> {
        if !self.is_running() {
            log_warn!("delay_ms({}) on a stopped clock", ms);
            return Err(ClockError::NotRunning);
        }

        let mut remaining = ms;
        let mut start = self.micros();

        while remaining > 0 {
            hook.yield_now();
            while remaining > 0 && self.micros().wrapping_sub(start) >= 1000 {
                remaining -= 1;
                start = start.wrapping_add(1000);
            }
        }

        Ok(())
    }

    /// Async variant of [`Clock::delay_ms`]: yields to the executor between
    /// polls instead of calling a hook.
    #[cfg(feature = "async")]
    pub async fn delay_ms_async(&self, ms: u32) -> Result<(), ClockError> {
        if !self.is_running() {
            log_warn!("delay_ms_async({}) on a stopped clock", ms);
            return Err(ClockError::NotRunning);
        }

        let mut remaining = ms;
        let mut start = self.micros();

        while remaining > 0 {
            YieldNow::new().await;
            while remaining > 0 && self.micros().wrapping_sub(start) >= 1000 {
                remaining -= 1;
                start = start.wrapping_add(1000);
            }
        }

        Ok(())
    }

    /// Busy-wait approximately `us` microseconds.
    ///
    /// Requests at or below the tier's `floor_us` return immediately. The
    /// whole `u32` range is honored; long waits are spun in chunks. Never
    /// use this where anything else must make progress during the wait.
    #[inline]
    pub fn delay_us(&self, us: u32) {
        let calibration = C::CALIBRATION;
        let mut remaining = calibration.iterations(us, C::RATE.cycles_per_us);
        while remaining != 0 {
            let chunk = u32::try_from(remaining).unwrap_or(u32::MAX);
            self.timer().spin(chunk, calibration.loop_cycles);
            remaining -= chunk as u64;
        }
    }

    /// Busy-wait delay handle for drivers written against `embedded-hal`.
    pub fn busy_delay(&self) -> BusyDelay<'_, C, T> {
        BusyDelay { clock: self }
    }
}

/// Borrowed busy-wait delay.
///
/// Implements `embedded_hal::delay::DelayNs` with the `embedded-hal`
/// feature. Every wait is a calibrated busy loop.
#[derive(Debug)]
pub struct BusyDelay<'a, C: ClockConfig, T: TickTimer> {
    clock: &'a Clock<C, T>,
}

impl<C: ClockConfig, T: TickTimer> BusyDelay<'_, C, T> {
    /// Busy-wait `us` microseconds.
    pub fn wait_us(&mut self, us: u32) {
        self.clock.delay_us(us);
    }
}

#[cfg(feature = "embedded-hal")]
impl<C: ClockConfig, T: TickTimer> embedded_hal::delay::DelayNs for BusyDelay<'_, C, T> {
    fn delay_ns(&mut self, ns: u32) {
        self.clock.delay_us(ns.div_ceil(1000));
    }

    fn delay_us(&mut self, us: u32) {
        self.clock.delay_us(us);
    }

    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.clock.delay_us(1000);
        }
    }
}

/// Future that is pending exactly once.
#[cfg(feature = "async")]
struct YieldNow {
    yielded: bool,
}

#[cfg(feature = "async")]
impl YieldNow {
    fn new() -> Self {
        Self { yielded: false }
    }
}

#[cfg(feature = "async")]
impl core::future::Future for YieldNow {
    type Output = ();

    fn poll(
        mut self: core::pin::Pin<&mut Self>,
        cx: &mut core::task::Context<'_>,
    ) -> core::task::Poll<()> {
        if self.yielded {
            return core::task::Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        core::task::Poll::Pending
    }
}
