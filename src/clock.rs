//! The monotonic clock.
//!
//! `Clock` owns the tick counters and the hardware timer. The overflow
//! interrupt advances the counters through [`TickSubscriber::on_tick`]; every
//! other access goes through the read accessors, each of which copies state
//! inside a critical section.
//!
//! All counters wrap at 32 bits. Use [`Clock::elapsed_millis`] /
//! [`Clock::elapsed_micros`] (or `wrapping_sub`) for durations.

use core::cell::Cell;
use core::fmt;
use core::marker::PhantomData;

use critical_section::{CriticalSection, Mutex};

use crate::config::{ClockConfig, TickRate};
use crate::error::ClockError;
use crate::hw::TickTimer;
use crate::logging::{debug, info, log_warn};
use crate::tick::TickSubscriber;

// ============================================================================
// Counters
// ============================================================================

/// Tick-driven counters, copied out as one consistent snapshot.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Counters {
    /// Serviced timer overflows since init
    pub ticks: u32,
    /// Elapsed milliseconds since init
    pub millis: u32,
    /// Sub-millisecond residue, always below `TickRate::fract_max`
    pub fract: u16,
    /// Elapsed microseconds at the last serviced overflow
    pub micros: u32,
    /// Sub-microsecond residue, always below `TickRate::micros_den`
    pub micros_fract: u16,
}

impl Counters {
    /// All counters at zero.
    pub const ZERO: Self = Self {
        ticks: 0,
        millis: 0,
        fract: 0,
        micros: 0,
        micros_fract: 0,
    };

    /// Apply one tick.
    ///
    /// Whole milliseconds first, then the fractional carry, then the same
    /// for microseconds, then the tick count. Everything wraps, and each
    /// time base wraps on its own word boundary.
    pub const fn advance(self, rate: &TickRate) -> Self {
        let mut millis = self.millis.wrapping_add(rate.millis_inc);
        let mut fract = self.fract as u32 + rate.fract_inc as u32;
        if fract >= rate.fract_max as u32 {
            fract -= rate.fract_max as u32;
            millis = millis.wrapping_add(1);
        }

        let mut micros = self.micros.wrapping_add(rate.micros_inc);
        let mut micros_fract = self.micros_fract as u32 + rate.micros_fract_inc as u32;
        if micros_fract >= rate.micros_den {
            micros_fract -= rate.micros_den;
            micros = micros.wrapping_add(1);
        }

        Self {
            ticks: self.ticks.wrapping_add(1),
            millis,
            fract: fract as u16,
            micros,
            micros_fract: micros_fract as u16,
        }
    }

    /// Microseconds at `sub` live timer counts past the last overflow.
    pub const fn micros_at(&self, rate: &TickRate, sub: u16) -> u32 {
        self.micros.wrapping_add(rate.sub_tick_micros(self.micros_fract, sub))
    }
}

// ============================================================================
// Clock State
// ============================================================================

/// Lifecycle of a clock. There is no way back from `Running`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockState {
    /// `init()` not called yet; ticks are ignored
    Uninitialized,
    /// Timer armed, counters advancing
    Running,
}

// ============================================================================
// Clock
// ============================================================================

/// Millisecond/microsecond clock driven by a periodic timer overflow.
///
/// Const-constructible so it can live in a `static` shared with the
/// interrupt handler.
///
/// # Example
///
/// ```ignore
/// static CLOCK: Clock<ActiveTier, Timer0> = Clock::new(Timer0::new());
/// static TICKS: TickBus<2> = TickBus::new();
///
/// fn main() -> ! {
///     TICKS.subscribe(&CLOCK).ok();
///     CLOCK.init().ok();
///     let start = CLOCK.millis();
///     // ...
///     let took = CLOCK.elapsed_millis(start);
/// }
/// ```
pub struct Clock<C: ClockConfig, T: TickTimer> {
    timer: T,
    counters: Mutex<Cell<Counters>>,
    state: Mutex<Cell<ClockState>>,
    // `fn() -> C` keeps the clock Sync for any tier type
    _config: PhantomData<fn() -> C>,
}

impl<C: ClockConfig, T: TickTimer> Clock<C, T> {
    /// Create an uninitialized clock around a timer.
    pub const fn new(timer: T) -> Self {
        Self {
            timer,
            counters: Mutex::new(Cell::new(Counters::ZERO)),
            state: Mutex::new(Cell::new(ClockState::Uninitialized)),
            _config: PhantomData,
        }
    }

    /// Arm the timer and start counting from zero.
    ///
    /// Call once. A second call leaves the running clock untouched and
    /// returns `ClockError::AlreadyRunning`.
    pub fn init(&self) -> Result<(), ClockError> {
        const {
            assert!(
                C::COUNTER_TOP <= T::MAX_TOP,
                "clock tier COUNTER_TOP exceeds the timer's range"
            )
        };

        let result = critical_section::with(|cs| {
            let state = self.state.borrow(cs);
            if state.get() == ClockState::Running {
                return Err(ClockError::AlreadyRunning);
            }

            self.counters.borrow(cs).set(Counters::ZERO);
            self.timer.start(C::PRESCALER, C::COUNTER_TOP);
            state.set(ClockState::Running);
            Ok(())
        });

        match result {
            Ok(()) => {
                let rate = C::RATE;
                info!(
                    "clock running: {} Hz, prescaler {}, {} ns/tick",
                    C::CPU_HZ,
                    C::PRESCALER.divisor(),
                    rate.nanos_per_tick()
                );
                debug!(
                    "tick increments: {} ms + {}/{}",
                    rate.millis_inc,
                    rate.fract_inc,
                    rate.fract_max
                );
            }
            Err(err) => log_warn!("clock init ignored: {}", err),
        }

        result
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClockState {
        critical_section::with(|cs| self.state.borrow(cs).get())
    }

    /// True once `init()` has armed the timer.
    pub fn is_running(&self) -> bool {
        self.state() == ClockState::Running
    }

    /// The underlying timer.
    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Milliseconds since `init()`, wrapping at `u32::MAX`.
    pub fn millis(&self) -> u32 {
        critical_section::with(|cs| self.counters.borrow(cs).get().millis)
    }

    /// Microseconds since `init()`, wrapping at `u32::MAX`.
    ///
    /// Combines the microseconds accumulated at the last serviced overflow
    /// with the live timer count. An
    /// overflow that has fired but not been serviced yet is counted here, so
    /// `micros()` never lags a `millis()` taken just before it.
    pub fn micros(&self) -> u32 {
        critical_section::with(|cs| {
            let mut counters = self.counters.borrow(cs).get();
            let sub = self.timer.counter();
            if self.timer.overflow_pending() && sub < C::COUNTER_TOP {
                counters = counters.advance(&C::RATE);
            }
            counters.micros_at(&C::RATE, sub)
        })
    }

    /// All counters, copied together.
    pub fn snapshot(&self) -> Counters {
        critical_section::with(|cs| self.counters.borrow(cs).get())
    }

    /// Milliseconds elapsed since an earlier `millis()` reading.
    pub fn elapsed_millis(&self, since: u32) -> u32 {
        self.millis().wrapping_sub(since)
    }

    /// Microseconds elapsed since an earlier `micros()` reading.
    pub fn elapsed_micros(&self, since: u32) -> u32 {
        self.micros().wrapping_sub(since)
    }
}

impl<C: ClockConfig, T: TickTimer> fmt::Debug for Clock<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("cpu_hz", &C::CPU_HZ)
            .field("state", &self.state())
            .field("counters", &self.snapshot())
            .finish()
    }
}

impl<C: ClockConfig, T: TickTimer + Sync> TickSubscriber for Clock<C, T> {
    /// Overflow handler body. Runs in interrupt context: fixed cost, no
    /// branches beyond the carry.
    fn on_tick(&self, cs: CriticalSection<'_>) {
        if self.state.borrow(cs).get() != ClockState::Running {
            return;
        }

        let counters = self.counters.borrow(cs);
        counters.set(counters.get().advance(&C::RATE));
    }
}
