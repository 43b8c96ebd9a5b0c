// Licensed under the Apache-2.0 license

//! Master-write direction: the interrupt handler fills the ring, `read`
//! drains it.

use super::{I2cSlaveObject, SlaveState};
use crate::common::Logger;
use crate::i2c::common::{Error, I2cSEvent};
use crate::i2c::ring_buffer::Full;
use crate::i2c::traits::SlaveHardware;
use crate::kernel::{Kernel, OneShotTimer, Timeout, WakeSignal};

/// Consumer bookkeeping shared with the interrupt and timer contexts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) struct RxState {
    /// Set by the read timer; tells a woken reader to give up.
    timed_out: bool,
    /// A reader found the ring empty and is blocked on the read signal.
    wake_pending: bool,
}

impl RxState {
    pub(super) const IDLE: Self = Self {
        timed_out: false,
        wake_pending: false,
    };
}

enum Received {
    Stored { wake: bool },
    Dropped,
}

impl<H, K, L, const N: usize> I2cSlaveObject<H, K, L, N>
where
    H: SlaveHardware + 'static,
    K: Kernel,
    L: Logger + 'static,
{
    /// Interrupt context: move the received byte into the ring.
    pub(super) fn receive_byte(&self) {
        let byte = self.hw.data_get();
        self.logger.debug(format_args!("read in isr 0x{byte:x}"));

        let outcome = self.with_state(|state| {
            state.last_event = Some(I2cSEvent::SlaveWrRecvd);
            match state.ring.put(byte) {
                Ok(()) => Received::Stored {
                    wake: core::mem::take(&mut state.rx.wake_pending),
                },
                Err(Full) => {
                    state.rx_overruns = state.rx_overruns.saturating_add(1);
                    Received::Dropped
                }
            }
        });

        match outcome {
            Received::Stored { wake: true } => self.kernel.read_signal.post(),
            Received::Stored { wake: false } => {}
            Received::Dropped => self
                .logger
                .warn(format_args!("ring full, dropped 0x{byte:x}")),
        }
    }

    /// Timer context: the read timeout elapsed.
    pub(super) fn read_timeout_expired(&self) {
        self.with_state(|state| state.rx.timed_out = true);
        self.kernel.read_signal.post();
    }

    /// Copy up to `buffer.len()` received bytes into `buffer`.
    ///
    /// Blocks while the ring is empty, bounded by the read timeout the
    /// instance was opened with. With `Timeout::NO_WAIT` it returns whatever
    /// is buffered. A short count means the timeout elapsed.
    ///
    /// # Errors
    ///
    /// [`Error::NotOpen`] if the instance is not open.
    pub fn read(&self, buffer: &mut [u8]) -> Result<usize, Error> {
        let read_timeout = self.open_state(|state| state.read_timeout)?;
        if buffer.is_empty() {
            return Ok(0);
        }

        self.with_state(|state| state.rx.timed_out = false);
        // A post left over from an earlier call must not end this one.
        let _ = self.kernel.read_signal.try_pend();

        let armed = matches!(read_timeout, Timeout::After(t) if t.ticks() != 0);
        if armed {
            self.kernel.read_timer.start();
        }

        let mut filled = 0;
        'fill: for slot in buffer.iter_mut() {
            let byte = loop {
                if let Some(byte) = self.with_state(take_byte) {
                    break byte;
                }

                self.logger.debug(format_args!("read wait task"));
                if read_timeout.is_no_wait() {
                    break 'fill;
                }

                self.kernel.read_signal.pend(Timeout::Forever);

                let timed_out = self.with_state(|state| {
                    if state.rx.timed_out {
                        state.rx.wake_pending = false;
                    }
                    state.rx.timed_out
                });
                if timed_out {
                    self.logger.debug(format_args!("read timeout"));
                    break 'fill;
                }
            };
            *slot = byte;
            filled += 1;
        }

        if armed {
            self.kernel.read_timer.stop();
        }
        self.logger.debug(format_args!("read finish {filled}"));
        Ok(filled)
    }
}

/// Dequeue one byte, or register as a waiting reader when empty.
fn take_byte<const N: usize>(state: &mut SlaveState<N>) -> Option<u8> {
    match state.ring.get() {
        Ok(byte) => Some(byte),
        Err(_) => {
            state.rx.wake_pending = true;
            None
        }
    }
}
