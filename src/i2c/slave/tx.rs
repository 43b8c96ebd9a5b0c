// Licensed under the Apache-2.0 license

//! Master-read direction: `write` lends a buffer, the interrupt handler
//! clocks it out one byte per transmit request.

use super::{I2cSlaveObject, PLACEHOLDER_BYTE};
use crate::common::Logger;
use crate::i2c::common::{Error, I2cSEvent};
use crate::i2c::traits::SlaveHardware;
use crate::kernel::{Kernel, OneShotTimer, WakeSignal};

/// Borrowed view of the caller's write buffer.
///
/// Only valid while the `write` call that installed it is running; `write`
/// replaces it with [`TxBuffer::EMPTY`] before returning.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct TxBuffer {
    ptr: *const u8,
    len: usize,
}

// SAFETY: the pointer is only dereferenced under the interrupt guard while the
// owning `write` call holds the borrow it was taken from.
unsafe impl Send for TxBuffer {}

impl TxBuffer {
    const EMPTY: Self = Self {
        ptr: core::ptr::null(),
        len: 0,
    };

    fn new(data: &[u8]) -> Self {
        Self {
            ptr: data.as_ptr(),
            len: data.len(),
        }
    }

    /// # Safety
    ///
    /// The slice this buffer was built from must still be borrowed.
    unsafe fn byte(&self, index: usize) -> Option<u8> {
        if index < self.len {
            // SAFETY: in bounds, and the caller guarantees the slice is live.
            Some(unsafe { *self.ptr.add(index) })
        } else {
            None
        }
    }
}

/// Producer bookkeeping shared with the interrupt and timer contexts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) struct TxState {
    buffer: TxBuffer,
    size: usize,
    /// Bytes not yet handed to the hardware.
    count: usize,
    /// A `write` call owns the producer. Cleared only when that call returns.
    owned: bool,
}

impl TxState {
    pub(super) const IDLE: Self = Self {
        buffer: TxBuffer::EMPTY,
        size: 0,
        count: 0,
        owned: false,
    };

    pub(super) fn remaining(&self) -> usize {
        self.count
    }

    fn sent(&self) -> usize {
        self.size - self.count
    }
}

enum Step {
    Sent(u8),
    Starved,
    Overrun(usize),
}

/// Context a producer step runs in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum Caller {
    Interrupt,
    /// `write` saw a waiting master. The request is re-checked under the
    /// guard because the interrupt may have answered it in between.
    Task,
}

impl<H, K, L, const N: usize> I2cSlaveObject<H, K, L, N>
where
    H: SlaveHardware + 'static,
    K: Kernel,
    L: Logger + 'static,
{
    /// Answer one transmit request.
    ///
    /// Runs in interrupt context, or in task context from `write` when the
    /// master was already waiting.
    pub(super) fn transmit_step(&self, caller: Caller) {
        let outcome = self.with_state(|state| {
            if caller == Caller::Task && !self.hw.transmit_requested() {
                return None;
            }
            let step = if state.tx.count > 0 {
                let index = state.tx.sent();
                // SAFETY: count is only non-zero while the owning write call
                // is running and holds the borrow of the buffer.
                match unsafe { state.tx.buffer.byte(index) } {
                    Some(byte) => {
                        self.hw.data_put(byte);
                        state.tx.count -= 1;
                        state.last_event = Some(I2cSEvent::SlaveRdProc);
                        Step::Sent(byte)
                    }
                    None => {
                        state.tx.count = 0;
                        Step::Overrun(index)
                    }
                }
            } else {
                state.last_event = Some(I2cSEvent::SlaveRdPending);
                Step::Starved
            };
            Some((step, state.tx.count == 0, state.write_pending_timeout))
        });
        let Some((step, done, pending_ticks)) = outcome else {
            self.logger.debug(format_args!("request already answered"));
            return;
        };

        match step {
            Step::Sent(byte) => self.logger.debug(format_args!("write 0x{byte:x}")),
            Step::Overrun(index) => self
                .logger
                .error(format_args!("tx index {index} past end of buffer")),
            Step::Starved => {
                self.logger.debug(format_args!("wait write"));
                if pending_ticks.ticks() != 0 {
                    self.kernel.write_pending_timer.start();
                }
            }
        }

        if done {
            self.kernel.write_signal.post();
        }
    }

    /// Timer context: the master has been stalled on a read for the whole
    /// pending window with nothing to send.
    pub(super) fn write_pending_expired(&self) {
        let sent = self.with_state(|state| {
            if state.tx.count == 0 && self.hw.transmit_requested() {
                self.hw.data_put(PLACEHOLDER_BYTE);
                state.last_event = Some(I2cSEvent::SlaveRdPlaceholder);
                true
            } else {
                false
            }
        });
        if sent {
            self.logger.warn(format_args!("reset write"));
        }
        self.kernel.write_pending_timer.stop();
    }

    /// Offer `data` to the master and block until it has been clocked out or
    /// the write timeout elapses.
    ///
    /// Returns the number of bytes the master actually read. Bytes not sent
    /// by the timeout are abandoned.
    ///
    /// # Errors
    ///
    /// * [`Error::NotOpen`] if the instance is not open.
    /// * [`Error::Busy`] if another write is still in progress.
    pub fn write(&self, data: &[u8]) -> Result<usize, Error> {
        let write_timeout = self.open_state(|state| state.write_timeout)?;
        if data.is_empty() {
            return Ok(0);
        }

        let accepted = self.with_state(|state| {
            if state.tx.owned {
                return false;
            }
            state.tx = TxState {
                buffer: TxBuffer::new(data),
                size: data.len(),
                count: data.len(),
                owned: true,
            };
            true
        });
        if !accepted {
            self.logger.warn(format_args!("write busy"));
            return Err(Error::Busy);
        }
        self.logger.debug(format_args!("try write {}", data.len()));

        if self.hw.transmit_requested() {
            self.kernel.write_pending_timer.stop();
            self.logger.debug(format_args!("pending write"));
            self.transmit_step(Caller::Task);
        }

        let _ = self.kernel.write_signal.try_pend();
        if self.with_state(|state| state.tx.count) != 0 {
            if self.kernel.write_signal.pend(write_timeout) {
                self.logger.debug(format_args!("write finish"));
            } else {
                self.logger.debug(format_args!("write timeout"));
            }
        }

        let sent = self.with_state(|state| {
            let sent = state.tx.sent();
            state.tx = TxState::IDLE;
            sent
        });
        Ok(sent)
    }
}
