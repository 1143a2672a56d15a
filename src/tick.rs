//! Timer-overflow event source.
//!
//! One hardware interrupt, several independent consumers: the clock is one
//! subscriber, a reset-combination watchdog or a scheduler tick can be
//! others. The board's overflow ISR calls [`TickBus::dispatch`] and nothing
//! else.

use core::cell::RefCell;
use core::fmt;

use critical_section::{CriticalSection, Mutex};
use heapless::Vec;

use crate::error::ClockError;
use crate::logging::{debug, log_warn};

/// Consumer of timer-overflow events.
///
/// `on_tick` runs in interrupt context with interrupts masked. It must
/// finish in bounded time and must not block, allocate, or re-enter the bus.
pub trait TickSubscriber: Sync {
    /// Handle one overflow.
    fn on_tick(&self, cs: CriticalSection<'_>);
}

/// Fixed-capacity list of tick subscribers.
///
/// `N` is the number of subscriber slots. Const-constructible for use in a
/// `static`.
pub struct TickBus<const N: usize> {
    subscribers: Mutex<RefCell<Vec<&'static dyn TickSubscriber, N>>>,
}

impl<const N: usize> TickBus<N> {
    /// Create an empty bus.
    pub const fn new() -> Self {
        Self {
            subscribers: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Register a subscriber. Subscribers run in registration order.
    pub fn subscribe(&self, subscriber: &'static dyn TickSubscriber) -> Result<(), ClockError> {
        let result = critical_section::with(|cs| {
            let mut subscribers = self.subscribers.borrow_ref_mut(cs);
            subscribers
                .push(subscriber)
                .map(|_| subscribers.len())
                .map_err(|_| ClockError::SubscribersFull)
        });

        match result {
            Ok(count) => {
                debug!("tick subscriber added ({} of {})", count, N);
                Ok(())
            }
            Err(err) => {
                log_warn!("tick subscriber rejected: {}", err);
                Err(err)
            }
        }
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.subscribers.borrow_ref(cs).len())
    }

    /// True when nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interrupt entry point: deliver one overflow to every subscriber.
    ///
    /// All subscribers see the same tick inside a single critical section.
    pub fn dispatch(&self) {
        critical_section::with(|cs| {
            // A subscriber re-entering the bus would find it borrowed; skip
            // rather than panic in interrupt context.
            if let Ok(subscribers) = self.subscribers.borrow(cs).try_borrow() {
                for subscriber in subscribers.iter() {
                    subscriber.on_tick(cs);
                }
            }
        });
    }
}

impl<const N: usize> Default for TickBus<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for TickBus<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickBus")
            .field("subscribers", &self.len())
            .field("capacity", &N)
            .finish()
    }
}
