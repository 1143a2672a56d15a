//! Reader-side guarantees: consistent snapshots, monotonic micros,
//! pending-overflow compensation, and wrap-safe elapsed time.

#[allow(clippy::duplicate_mod)]
#[path = "fixtures/mod.rs"]
#[macro_use]
mod fixtures;

use fixtures::expected_counters;
use tickclock::config::{Mhz8, Mhz16};
use tickclock::{ClockConfig, ClockState, Counters, TickTimer};

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_stopped_clock_reads_zero() {
    let (clock, _) = sim_clock_stopped!(Mhz16);

    clock.timer().advance_ticks(10);

    assert_eq!(clock.state(), ClockState::Uninitialized);
    assert_eq!(clock.millis(), 0);
    assert_eq!(clock.micros(), 0);
    assert_eq!(clock.snapshot(), Counters::ZERO);
}

#[test]
fn test_counting_starts_at_init() {
    let (clock, _) = sim_clock_stopped!(Mhz16);

    clock.timer().advance_cycles(1_000_000);
    clock.init().unwrap();
    assert_eq!(clock.micros(), 0);

    clock.timer().advance_ticks(2);
    assert_eq!(clock.micros(), 2048);
    assert_eq!(clock.millis(), 2);
}

// ============================================================================
// Monotonic Reads
// ============================================================================

#[test]
fn test_micros_non_decreasing() {
    let (clock, _) = sim_clock!(Mhz16);
    let mut last = clock.micros();

    // Odd step sizes so reads land all over the counter period
    let steps = [1u64, 63, 64, 65, 1000, 16_383, 16_384, 16_385, 99, 40_000];
    for round in 0..200 {
        clock.timer().advance_cycles(steps[round % steps.len()]);
        let now = clock.micros();
        assert!(now >= last, "micros went backward: {} -> {}", last, now);
        last = now;
    }
}

#[test]
fn test_micros_never_lags_millis() {
    let (clock, _) = sim_clock!(Mhz8);

    for _ in 0..500 {
        clock.timer().advance_cycles(3_331);
        let millis = clock.millis();
        let micros = clock.micros();
        assert!(
            micros / 1000 >= millis,
            "micros {} behind millis {}",
            micros,
            millis
        );
    }
}

// ============================================================================
// Pending Overflow Compensation
// ============================================================================

#[test]
fn test_pending_overflow_counted_once() {
    let (clock, _) = sim_clock!(Mhz16);
    clock.timer().advance_ticks(5);
    let before = clock.micros();
    assert_eq!(before, 5 * 1024);

    // Overflow fires while interrupts are masked: counter wrapped, tick not
    // yet serviced
    clock.timer().mask();
    clock.timer().advance_cycles(64 * (256 + 10));
    assert_eq!(clock.snapshot().ticks, 5);
    assert!(clock.timer().overflow_pending());

    let during = clock.micros();
    assert_eq!(during, (6 * 256 + 10) * 4);
    assert!(during >= before);

    // Servicing the overflow must not change the reading
    clock.timer().unmask();
    assert_eq!(clock.snapshot().ticks, 6);
    assert_eq!(clock.micros(), during);
}

#[test]
fn test_millis_frozen_while_masked() {
    let (clock, _) = sim_clock!(Mhz16);
    clock.timer().advance_ticks(3);

    clock.timer().mask();
    let millis = clock.millis();
    clock.timer().advance_ticks(1);
    assert_eq!(clock.millis(), millis);

    clock.timer().unmask();
    assert_eq!(clock.millis(), 4);
}

// ============================================================================
// Concurrent Tick vs Read
// ============================================================================

#[test]
fn test_reads_never_torn_under_concurrent_ticks() {
    let (clock, _) = sim_clock!(Mhz16);
    let rate = Mhz16::RATE;

    let writer = std::thread::spawn(move || {
        for _ in 0..20_000 {
            clock.timer().advance_ticks(1);
        }
    });

    let mut last = Counters::ZERO;
    let mut last_micros = 0;
    let mut reads = 0u32;
    while !writer.is_finished() || reads == 0 {
        let snapshot = clock.snapshot();
        // Every field must come from the same tick
        assert_eq!(snapshot, expected_counters(&rate, snapshot.ticks as u64));
        assert!(snapshot.ticks >= last.ticks);
        last = snapshot;

        let micros = clock.micros();
        assert!(micros >= last_micros);
        last_micros = micros;
        reads += 1;
    }
    writer.join().unwrap();

    assert_eq!(clock.snapshot(), expected_counters(&rate, 20_000));
}

// ============================================================================
// Wraparound
// ============================================================================

#[test]
fn test_micros_wrap_gives_small_elapsed() {
    let (clock, _) = sim_clock!(Mhz16);

    // 2^32 us is exactly 4,194,304 ticks at 16 MHz; stop just short of it
    clock.timer().advance_ticks(4_194_300);
    let before = clock.micros();
    assert_eq!(before, u32::MAX - 4 * 1024 + 1);

    clock.timer().advance_ticks(10);
    let after = clock.micros();

    assert!(after < before, "micros should have wrapped");
    assert_eq!(after.wrapping_sub(before), 10 * 1024);
    assert_eq!(clock.elapsed_micros(before), 10 * 1024);
}

#[test]
fn test_elapsed_millis() {
    let (clock, _) = sim_clock!(Mhz16);
    clock.timer().advance_ticks(7);
    let start = clock.millis();

    clock.timer().advance_ticks(100);
    // 107 ticks = 109.568 ms, 7 ticks = 7.168 ms
    assert_eq!(clock.elapsed_millis(start), 109 - 7);
}
