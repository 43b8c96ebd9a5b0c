// Licensed under the Apache-2.0 license

//! # I2C Slave Hardware Abstraction
//!
//! The driver core never touches registers directly. Everything it needs from
//! the peripheral goes through [`SlaveHardware`], which mirrors the register
//! level operations of a byte-mode slave controller:
//!
//! ```text
//! SlaveHardware
//!     ├── lifecycle      init / enable / disable / disable_fifo
//!     ├── interrupts     enable_interrupts / disable_interrupts / clear_interrupts
//!     ├── status         activity / interrupt_cause / take_irq_status
//!     └── data           data_get / data_put
//! ```
//!
//! Methods take `&self`: the register file is shared between the task and the
//! interrupt handler, and each access is a single volatile load or store.

use embedded_hal::i2c::SevenBitAddress;

/// Activity bit: the master wrote a byte that is waiting in the data register.
pub const SLAVE_ACT_RREQ: u32 = 0x01;
/// Activity bit: the master is clocking a read and wants the next byte.
pub const SLAVE_ACT_TREQ: u32 = 0x02;

/// Interrupt cause: data request or data received.
pub const SLAVE_INT_DATA: u32 = 0x01;

/// Status registers sampled once at interrupt entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlaveIrqStatus {
    /// Slave activity register
    pub activity: u32,
    /// Masked interrupt cause register
    pub cause: u32,
}

impl SlaveIrqStatus {
    /// A received byte is ready to be read.
    #[must_use]
    pub fn receive_ready(&self) -> bool {
        self.activity & SLAVE_ACT_RREQ != 0 && self.cause & SLAVE_INT_DATA != 0
    }

    /// The master is waiting for a byte from us.
    #[must_use]
    pub fn transmit_requested(&self) -> bool {
        self.activity & SLAVE_ACT_TREQ != 0
    }
}

/// Register-level capabilities of a byte-mode I2C slave peripheral.
pub trait SlaveHardware: Sync {
    /// Enable the slave function and program its own address.
    fn init(&self, address: SevenBitAddress);

    /// Enable the slave function (device active).
    fn enable(&self);

    /// Disable the slave function.
    fn disable(&self);

    /// Route data through the single-byte data register, bypassing any FIFO.
    fn disable_fifo(&self);

    /// Unmask peripheral interrupt sources.
    fn enable_interrupts(&self, mask: u32);

    /// Mask peripheral interrupt sources.
    fn disable_interrupts(&self, mask: u32);

    /// Acknowledge the given interrupt causes. Bits not in `mask` are left
    /// untouched.
    fn clear_interrupts(&self, mask: u32);

    /// Current slave activity bits (`SLAVE_ACT_*`).
    fn activity(&self) -> u32;

    /// Current masked interrupt causes (`SLAVE_INT_*`).
    fn interrupt_cause(&self) -> u32;

    /// Read the received byte. Clears the receive request.
    fn data_get(&self) -> u8;

    /// Hand the next byte to the shifter. Clears the transmit request.
    fn data_put(&self, byte: u8);

    /// Sample both status registers and acknowledge exactly the causes that
    /// were observed.
    fn take_irq_status(&self) -> SlaveIrqStatus {
        let activity = self.activity();
        let cause = self.interrupt_cause();
        self.clear_interrupts(cause);
        SlaveIrqStatus { activity, cause }
    }

    /// The master is currently waiting for a byte.
    fn transmit_requested(&self) -> bool {
        self.activity() & SLAVE_ACT_TREQ != 0
    }
}
