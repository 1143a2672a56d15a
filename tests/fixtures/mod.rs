//! Test fixtures and utilities for tickclock testing.
//!
//! Provides:
//! - `SimTimer`: simulated 8-bit overflow timer with a reference cycle clock
//! - `sim_clock!`: a running `'static` clock wired to its own `TickBus`
//! - `expected_counters`: closed-form counter values after N ticks

#![allow(dead_code)]
#![allow(unused_macros)]

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};

use tickclock::config::TickRate;
use tickclock::{Counters, Prescaler, TickTimer};

// ============================================================================
// SimTimer - Simulated Hardware Timer
// ============================================================================

/// Simulated timer.
///
/// Time is a count of CPU cycles (the reference clock). Advancing it sets the
/// overflow flag at every counter wrap and, unless interrupts are masked,
/// runs the attached ISR once per overflow and clears the flag, the way the
/// hardware vectors on TOV.
#[derive(Debug)]
pub struct SimTimer {
    cycles: AtomicU64,
    started_at: AtomicU64,
    prescaler: AtomicU16,
    counter_top: AtomicU16,
    started: AtomicBool,
    pending: AtomicBool,
    masked: AtomicBool,
    isr: OnceLock<fn()>,
}

impl SimTimer {
    /// Stopped timer at cycle zero.
    pub const fn new() -> Self {
        Self {
            cycles: AtomicU64::new(0),
            started_at: AtomicU64::new(0),
            prescaler: AtomicU16::new(1),
            counter_top: AtomicU16::new(0xFF),
            started: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            masked: AtomicBool::new(false),
            isr: OnceLock::new(),
        }
    }

    /// Attach the overflow interrupt handler.
    pub fn attach(&self, isr: fn()) {
        let _ = self.isr.set(isr);
    }

    /// Reference clock, in CPU cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Stop servicing overflows (the flag still gets set).
    pub fn mask(&self) {
        self.masked.store(true, Ordering::SeqCst);
    }

    /// Resume servicing; a pending overflow is serviced immediately.
    pub fn unmask(&self) {
        self.masked.store(false, Ordering::SeqCst);
        if self.pending.load(Ordering::SeqCst) {
            self.service();
        }
    }

    fn counts(&self, cycles: u64) -> u64 {
        let since = cycles - self.started_at.load(Ordering::SeqCst);
        since / self.prescaler.load(Ordering::SeqCst) as u64
    }

    fn period(&self) -> u64 {
        self.counter_top.load(Ordering::SeqCst) as u64 + 1
    }

    // Vectoring clears the flag with interrupts already masked
    fn service(&self) {
        critical_section::with(|_| {
            self.pending.store(false, Ordering::SeqCst);
            if let Some(isr) = self.isr.get() {
                isr();
            }
        });
    }

    /// Advance the reference clock by `cycles`, raising overflows on the way.
    ///
    /// The counter and the overflow flag move together, as in hardware.
    pub fn advance_cycles(&self, cycles: u64) {
        let overflows = critical_section::with(|_| {
            let before = self.cycles.fetch_add(cycles, Ordering::SeqCst);
            if !self.started.load(Ordering::SeqCst) {
                return 0;
            }
            let period = self.period();
            let overflows = self.counts(before + cycles) / period - self.counts(before) / period;
            if overflows > 0 {
                self.pending.store(true, Ordering::SeqCst);
            }
            overflows
        });

        for _ in 0..overflows {
            if self.masked.load(Ordering::SeqCst) {
                // Flag stays set; further overflows are lost like on hardware
                return;
            }
            self.service();
        }
    }

    /// Advance by whole microseconds at `cycles_per_us`.
    pub fn advance_micros(&self, us: u64, cycles_per_us: u32) {
        self.advance_cycles(us * cycles_per_us as u64);
    }

    /// Advance by exactly `n` overflow periods.
    pub fn advance_ticks(&self, n: u64) {
        let per_tick = self.prescaler.load(Ordering::SeqCst) as u64 * self.period();
        self.advance_cycles(n * per_tick);
    }
}

impl Default for SimTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TickTimer for SimTimer {
    const MAX_TOP: u16 = 0xFF;

    fn start(&self, prescaler: Prescaler, counter_top: u16) {
        self.started_at.store(self.cycles(), Ordering::SeqCst);
        self.prescaler.store(prescaler.divisor(), Ordering::SeqCst);
        self.counter_top.store(counter_top, Ordering::SeqCst);
        self.pending.store(false, Ordering::SeqCst);
        self.started.store(true, Ordering::SeqCst);
    }

    fn counter(&self) -> u16 {
        if !self.started.load(Ordering::SeqCst) {
            return 0;
        }
        (self.counts(self.cycles()) % self.period()) as u16
    }

    fn overflow_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    // Cycle-exact, like a hardware driver's busy loop
    fn spin(&self, iterations: u32, loop_cycles: u8) {
        self.advance_cycles(iterations as u64 * loop_cycles as u64);
    }
}

// ============================================================================
// Clock Construction
// ============================================================================

/// Build a running `&'static Clock<$tier, SimTimer>` subscribed to its own
/// bus, with the timer's ISR pointed at that bus.
///
/// Each expansion site owns separate statics, so tests stay independent.
macro_rules! sim_clock {
    ($tier:ty) => {{
        use tickclock::{Clock, TickBus};

        static CLOCK: Clock<$tier, $crate::fixtures::SimTimer> =
            Clock::new($crate::fixtures::SimTimer::new());
        static BUS: TickBus<2> = TickBus::new();

        fn isr() {
            BUS.dispatch();
        }

        BUS.subscribe(&CLOCK).unwrap();
        CLOCK.timer().attach(isr);
        CLOCK.init().unwrap();
        (&CLOCK, &BUS)
    }};
}

/// Same as `sim_clock!`, without calling `init()`.
macro_rules! sim_clock_stopped {
    ($tier:ty) => {{
        use tickclock::{Clock, TickBus};

        static CLOCK: Clock<$tier, $crate::fixtures::SimTimer> =
            Clock::new($crate::fixtures::SimTimer::new());
        static BUS: TickBus<2> = TickBus::new();

        fn isr() {
            BUS.dispatch();
        }

        BUS.subscribe(&CLOCK).unwrap();
        CLOCK.timer().attach(isr);
        (&CLOCK, &BUS)
    }};
}

// ============================================================================
// Expected Values
// ============================================================================

/// Counter values after `n` ticks from zero, computed in closed form.
pub fn expected_counters(rate: &TickRate, n: u64) -> Counters {
    let fract_total = n * rate.fract_inc as u64;
    let millis = n * rate.millis_inc as u64 + fract_total / rate.fract_max as u64;
    let micros_total = n * rate.counts_per_tick as u64 * rate.micros_num as u64;
    Counters {
        ticks: n as u32,
        millis: millis as u32,
        fract: (fract_total % rate.fract_max as u64) as u16,
        micros: (micros_total / rate.micros_den as u64) as u32,
        micros_fract: (micros_total % rate.micros_den as u64) as u16,
    }
}

/// Exact milliseconds for `n` ticks: floor(n * cycles_per_tick / cycles_per_ms).
pub fn exact_millis(rate: &TickRate, n: u64) -> u64 {
    n * rate.cycles_per_tick as u64 / (rate.cycles_per_us as u64 * 1000)
}
