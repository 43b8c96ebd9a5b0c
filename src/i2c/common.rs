// Licensed under the Apache-2.0 license

//! Common types for the I2C slave driver.
//!
//! This module provides the open parameters and their builder, the error type
//! shared by every layer, and the diagnostic status snapshot.

use crate::kernel::{Ticks, Timeout};
use embedded_hal::i2c::{ErrorKind, SevenBitAddress};

/// Largest valid 7-bit slave address.
pub const MAX_SEVEN_BIT_ADDRESS: SevenBitAddress = 0x7f;

/// Errors returned to task-context callers.
///
/// Interrupt-context conditions (ring overrun, spurious status bits) never
/// show up here; they are counted and logged instead.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A write is already in flight on this instance.
    Busy,
    /// `open` on an instance that is already open.
    AlreadyOpen,
    /// Read, write or close on an instance that is not open.
    NotOpen,
    /// Registry index past the end of the instance table.
    OutOfRange,
    /// Registry used before `init`.
    NotInitialized,
    /// Slave address does not fit in seven bits.
    InvalidAddress,
    /// Nothing was transferred before the timeout. Only the `embedded-io`
    /// adapters produce this; the core API reports short counts.
    TimedOut,
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl embedded_io::Error for Error {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Error::Busy => embedded_io::ErrorKind::Other,
            Error::AlreadyOpen => embedded_io::ErrorKind::AddrInUse,
            Error::NotOpen | Error::NotInitialized => embedded_io::ErrorKind::NotConnected,
            Error::OutOfRange | Error::InvalidAddress => embedded_io::ErrorKind::InvalidInput,
            Error::TimedOut => embedded_io::ErrorKind::TimedOut,
        }
    }
}

/// Slave-side bus events, as seen by the interrupt handler.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum I2cSEvent {
    /// Master wrote a byte; it is in the data register.
    SlaveWrRecvd,
    /// Master asked for a byte and one was supplied.
    SlaveRdProc,
    /// Master asked for a byte before the application supplied any.
    SlaveRdPending,
    /// The pending-write timer clocked out the placeholder byte.
    SlaveRdPlaceholder,
}

/// Diagnostic snapshot of one driver instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlaveStatus {
    /// Whether the instance is open
    pub opened: bool,
    /// Slave address (if open)
    pub address: Option<SevenBitAddress>,
    /// Bytes received and not yet read by the application
    pub rx_buffer_count: usize,
    /// Bytes of the in-flight write still waiting for the master
    pub tx_remaining: usize,
    /// Received bytes dropped because the ring buffer was full
    pub rx_overruns: u32,
    /// Last bus event handled
    pub last_event: Option<I2cSEvent>,
}

/// Parameters supplied to `open`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct I2cSlaveParams {
    /// Bound on a blocking read. `Timeout::NO_WAIT` makes `read` a poll.
    pub read_timeout: Timeout,
    /// Bound on waiting for the master to clock out a write.
    pub write_timeout: Timeout,
    /// How long the master may stall on a read request before the slave
    /// clocks out a placeholder byte. Zero disables the placeholder.
    pub write_pending_timeout: Ticks,
    pub slave_address: SevenBitAddress,
}

impl I2cSlaveParams {
    pub const DEFAULT: Self = Self {
        read_timeout: Timeout::Forever,
        write_timeout: Timeout::Forever,
        write_pending_timeout: Ticks::from_ticks(100),
        slave_address: 0x1D,
    };
}

impl Default for I2cSlaveParams {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Builder for [`I2cSlaveParams`], starting from the defaults.
pub struct I2cSlaveParamsBuilder {
    params: I2cSlaveParams,
}

impl Default for I2cSlaveParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl I2cSlaveParamsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            params: I2cSlaveParams::DEFAULT,
        }
    }
    #[must_use]
    pub fn read_timeout(mut self, timeout: Timeout) -> Self {
        self.params.read_timeout = timeout;
        self
    }
    #[must_use]
    pub fn write_timeout(mut self, timeout: Timeout) -> Self {
        self.params.write_timeout = timeout;
        self
    }
    #[must_use]
    pub fn write_pending_timeout(mut self, ticks: Ticks) -> Self {
        self.params.write_pending_timeout = ticks;
        self
    }
    #[must_use]
    pub fn slave_address(mut self, address: SevenBitAddress) -> Self {
        self.params.slave_address = address;
        self
    }

    /// # Errors
    ///
    /// [`Error::InvalidAddress`] if the address needs more than seven bits.
    pub fn build(self) -> Result<I2cSlaveParams, Error> {
        if self.params.slave_address > MAX_SEVEN_BIT_ADDRESS {
            return Err(Error::InvalidAddress);
        }
        Ok(self.params)
    }
}

/// Static per-instance hardware attributes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct I2cSlaveHwAttrs {
    /// Peripheral base address
    pub base_addr: usize,
    /// Interrupt number of the peripheral
    pub int_num: u16,
    /// Interrupt priority, in the encoding of the interrupt controller
    pub int_priority: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_configuration() {
        let params = I2cSlaveParams::default();
        assert_eq!(params.read_timeout, Timeout::Forever);
        assert_eq!(params.write_timeout, Timeout::Forever);
        assert_eq!(params.write_pending_timeout.ticks(), 100);
        assert_eq!(params.slave_address, 0x1D);
    }

    #[test]
    fn builder_overrides_selected_fields() {
        let params = I2cSlaveParamsBuilder::new()
            .read_timeout(Timeout::ticks(10))
            .write_timeout(Timeout::ticks(100))
            .slave_address(0x42)
            .build()
            .unwrap();

        assert_eq!(params.read_timeout, Timeout::ticks(10));
        assert_eq!(params.write_timeout, Timeout::ticks(100));
        assert_eq!(params.write_pending_timeout.ticks(), 100);
        assert_eq!(params.slave_address, 0x42);
    }

    #[test]
    fn builder_rejects_eight_bit_address() {
        let result = I2cSlaveParamsBuilder::new().slave_address(0x80).build();
        assert_eq!(result, Err(Error::InvalidAddress));
    }

    #[test]
    fn io_error_kinds() {
        use embedded_io::Error as _;
        assert_eq!(Error::TimedOut.kind(), embedded_io::ErrorKind::TimedOut);
        assert_eq!(Error::NotOpen.kind(), embedded_io::ErrorKind::NotConnected);
        assert_eq!(Error::OutOfRange.kind(), embedded_io::ErrorKind::InvalidInput);
    }
}
