// Licensed under the Apache-2.0 license

//! RTOS service seams used by the driver.
//!
//! The driver does not own a scheduler. It needs three kernel objects per
//! instance: binary wake signals that a task can block on, one-shot timers
//! whose expiry is delivered from the timer-service context, and the
//! interrupt line of the peripheral. Each is a trait so the same driver runs
//! on an RTOS port on target and on the host simulation in tests.
//!
//! All objects are pre-allocated with the driver object. `construct` and
//! `destruct` arm and disarm them at open/close time; neither allocates.

use core::convert::Infallible;

/// One system tick. The reference configuration runs the tick at 1 kHz.
pub type Ticks = fugit::MillisDurationU32;

/// Bound on a blocking wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Timeout {
    /// Give up after the given number of ticks. Zero never blocks.
    After(Ticks),
    /// Wait until signalled.
    Forever,
}

impl Timeout {
    pub const NO_WAIT: Self = Self::After(Ticks::from_ticks(0));

    #[must_use]
    pub const fn ticks(count: u32) -> Self {
        Self::After(Ticks::from_ticks(count))
    }

    #[must_use]
    pub fn is_no_wait(&self) -> bool {
        matches!(self, Self::After(t) if t.ticks() == 0)
    }
}

/// Binary semaphore a task blocks on until another context posts it.
///
/// Posting an already-posted signal has no further effect.
pub trait WakeSignal: Sync {
    /// Reset to the un-posted state.
    fn construct(&self);

    /// Callable from interrupt and timer context.
    fn post(&self);

    /// Consume a pending post without blocking.
    ///
    /// # Errors
    ///
    /// `nb::Error::WouldBlock` when nothing was posted.
    fn try_pend(&self) -> nb::Result<(), Infallible>;

    /// Block the calling task until posted or the timeout elapses.
    ///
    /// Returns `true` when the post was consumed, `false` on timeout.
    fn pend(&self, timeout: Timeout) -> bool;

    fn destruct(&self);
}

/// Identifies which of a driver's timers expired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerId {
    ReadTimeout,
    WritePending,
}

/// Receiver of timer expiries.
pub trait TimerTarget: Sync {
    /// Runs in the timer-service context. Must not block.
    fn timer_expired(&self, id: TimerId);
}

/// One-shot countdown timer.
pub trait OneShotTimer: Sync {
    /// Bind the timer to its target. The timer is left stopped.
    fn construct(&self, timeout: Ticks, target: &'static dyn TimerTarget, id: TimerId);

    /// (Re)start the countdown from the full timeout.
    fn start(&self);

    /// Cancel a running countdown. Stopping a stopped timer is a no-op.
    fn stop(&self);

    fn destruct(&self);
}

/// Receiver of a peripheral interrupt.
pub trait InterruptHandler: Sync {
    /// Runs in interrupt context. Must not block.
    fn on_interrupt(&self);
}

/// The interrupt line of one peripheral instance.
pub trait InterruptLine: Sync {
    /// Register the handler. The line stays masked until [`enable`].
    ///
    /// [`enable`]: InterruptLine::enable
    fn construct(&self, handler: &'static dyn InterruptHandler, priority: u8);

    fn enable(&self);

    fn disable(&self);

    /// Mask the line and drop the handler registration.
    fn destruct(&self);
}

/// Bundle of kernel object types a driver instance is built from.
pub trait Kernel: 'static {
    type Interrupt: InterruptLine + 'static;
    type Signal: WakeSignal + 'static;
    type Timer: OneShotTimer + 'static;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_tick_timeout_is_poll_mode() {
        assert!(Timeout::NO_WAIT.is_no_wait());
        assert!(Timeout::ticks(0).is_no_wait());
        assert!(!Timeout::ticks(10).is_no_wait());
        assert!(!Timeout::Forever.is_no_wait());
    }

    #[test]
    fn tick_count_round_trips_through_fugit() {
        match Timeout::ticks(100) {
            Timeout::After(t) => assert_eq!(t.ticks(), 100),
            Timeout::Forever => panic!("expected a bounded timeout"),
        }
    }
}
