// Licensed under the Apache-2.0 license

//! Board-level instance table and application handles.
//!
//! The board places its driver objects in `static`s and lists them in an
//! [`I2cSlaveRegistry`]. Applications open instances by index and talk to
//! them through [`I2cSlaveHandle`], which also implements the `embedded-io`
//! blocking byte stream traits.

use core::cell::Cell;

use critical_section::Mutex;

use crate::common::Logger;
use crate::i2c::common::{Error, I2cSlaveParams, SlaveStatus};
use crate::i2c::slave::I2cSlaveObject;
use crate::i2c::traits::SlaveHardware;
use crate::kernel::Kernel;

/// Object-safe view of one driver instance.
pub trait I2cSlaveDriver: Sync {
    fn init(&self);

    /// # Errors
    ///
    /// See [`I2cSlaveObject::open`].
    fn open(&'static self, params: &I2cSlaveParams) -> Result<(), Error>;

    fn close(&self);

    /// # Errors
    ///
    /// See [`I2cSlaveObject::read`].
    fn read(&self, buffer: &mut [u8]) -> Result<usize, Error>;

    /// # Errors
    ///
    /// See [`I2cSlaveObject::write`].
    fn write(&self, data: &[u8]) -> Result<usize, Error>;

    fn status(&self) -> SlaveStatus;
}

impl<H, K, L, const N: usize> I2cSlaveDriver for I2cSlaveObject<H, K, L, N>
where
    H: SlaveHardware + 'static,
    K: Kernel,
    L: Logger + 'static,
{
    fn init(&self) {
        I2cSlaveObject::init(self);
    }

    fn open(&'static self, params: &I2cSlaveParams) -> Result<(), Error> {
        I2cSlaveObject::open(self, params)
    }

    fn close(&self) {
        I2cSlaveObject::close(self);
    }

    fn read(&self, buffer: &mut [u8]) -> Result<usize, Error> {
        I2cSlaveObject::read(self, buffer)
    }

    fn write(&self, data: &[u8]) -> Result<usize, Error> {
        I2cSlaveObject::write(self, data)
    }

    fn status(&self) -> SlaveStatus {
        I2cSlaveObject::status(self)
    }
}

/// The board's table of slave instances.
pub struct I2cSlaveRegistry {
    entries: &'static [&'static dyn I2cSlaveDriver],
    initialized: Mutex<Cell<bool>>,
}

impl I2cSlaveRegistry {
    #[must_use]
    pub const fn new(entries: &'static [&'static dyn I2cSlaveDriver]) -> Self {
        Self {
            entries,
            initialized: Mutex::new(Cell::new(false)),
        }
    }

    /// Initialize every instance. Repeated calls do nothing.
    pub fn init(&self) {
        critical_section::with(|cs| {
            let initialized = self.initialized.borrow(cs);
            if initialized.get() {
                return;
            }
            for entry in self.entries {
                entry.init();
            }
            initialized.set(true);
        });
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        critical_section::with(|cs| self.initialized.borrow(cs).get())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Open instance `index`. `None` uses [`I2cSlaveParams::DEFAULT`].
    ///
    /// # Errors
    ///
    /// * [`Error::NotInitialized`] before [`init`](Self::init).
    /// * [`Error::OutOfRange`] if `index` is past the end of the table.
    /// * Anything the instance's `open` reports.
    pub fn open(
        &self,
        index: usize,
        params: Option<&I2cSlaveParams>,
    ) -> Result<I2cSlaveHandle, Error> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }
        let driver = *self.entries.get(index).ok_or(Error::OutOfRange)?;
        let params = params.copied().unwrap_or_default();
        driver.open(&params)?;
        Ok(I2cSlaveHandle { driver })
    }

    /// Close every open instance and forget the initialization.
    pub fn shutdown(&self) {
        for entry in self.entries {
            entry.close();
        }
        critical_section::with(|cs| self.initialized.borrow(cs).set(false));
    }
}

/// Application handle to an open instance.
#[derive(Clone, Copy)]
pub struct I2cSlaveHandle {
    driver: &'static dyn I2cSlaveDriver,
}

impl I2cSlaveHandle {
    /// # Errors
    ///
    /// See [`I2cSlaveObject::read`].
    pub fn read(&self, buffer: &mut [u8]) -> Result<usize, Error> {
        self.driver.read(buffer)
    }

    /// # Errors
    ///
    /// See [`I2cSlaveObject::write`].
    pub fn write(&self, data: &[u8]) -> Result<usize, Error> {
        self.driver.write(data)
    }

    #[must_use]
    pub fn status(&self) -> SlaveStatus {
        self.driver.status()
    }

    pub fn close(self) {
        self.driver.close();
    }
}

impl embedded_io::ErrorType for I2cSlaveHandle {
    type Error = Error;
}

impl embedded_io::Read for I2cSlaveHandle {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.driver.read(buf)? {
            0 => Err(Error::TimedOut),
            n => Ok(n),
        }
    }
}

impl embedded_io::Write for I2cSlaveHandle {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.driver.write(buf)? {
            0 => Err(Error::TimedOut),
            n => Ok(n),
        }
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Timeout;
    use crate::tests::sim::SimRig;
    use hex_literal::hex;

    fn registry_of(rigs: &[&SimRig]) -> &'static I2cSlaveRegistry {
        let entries: Vec<&'static dyn I2cSlaveDriver> = rigs
            .iter()
            .map(|rig| rig.slave as &'static dyn I2cSlaveDriver)
            .collect();
        Box::leak(Box::new(I2cSlaveRegistry::new(Box::leak(
            entries.into_boxed_slice(),
        ))))
    }

    fn poll_params() -> I2cSlaveParams {
        I2cSlaveParams {
            read_timeout: Timeout::NO_WAIT,
            write_timeout: Timeout::ticks(10),
            ..I2cSlaveParams::DEFAULT
        }
    }

    #[test]
    fn open_before_init_is_rejected() {
        let rig = SimRig::new();
        let registry = registry_of(&[&rig]);
        assert_eq!(registry.open(0, None).err(), Some(Error::NotInitialized));
    }

    #[test]
    fn open_past_table_end_is_out_of_range() {
        let rig = SimRig::new();
        let registry = registry_of(&[&rig]);
        registry.init();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.open(1, None).err(), Some(Error::OutOfRange));
        assert!(!rig.slave.is_open());
    }

    #[test]
    fn open_without_params_uses_defaults() {
        let rig = SimRig::new();
        let registry = registry_of(&[&rig]);
        registry.init();

        let handle = registry.open(0, None).unwrap();

        let status = handle.status();
        assert!(status.opened);
        assert_eq!(status.address, Some(I2cSlaveParams::DEFAULT.slave_address));
    }

    #[test]
    fn second_open_through_registry_fails() {
        let rig = SimRig::new();
        let registry = registry_of(&[&rig]);
        registry.init();

        let _handle = registry.open(0, Some(&poll_params())).unwrap();
        assert_eq!(
            registry.open(0, Some(&poll_params())).err(),
            Some(Error::AlreadyOpen)
        );
    }

    #[test]
    fn repeated_init_does_not_reset_open_instances() {
        let rig = SimRig::new();
        let registry = registry_of(&[&rig]);
        registry.init();
        let _handle = registry.open(0, Some(&poll_params())).unwrap();

        registry.init();
        assert!(rig.slave.is_open());
    }

    #[test]
    fn shutdown_closes_everything() {
        let first = SimRig::new();
        let second = SimRig::new();
        let registry = registry_of(&[&first, &second]);
        registry.init();
        let handle = registry.open(0, Some(&poll_params())).unwrap();
        let _other = registry.open(1, Some(&poll_params())).unwrap();

        registry.shutdown();

        assert!(!first.slave.is_open());
        assert!(!second.slave.is_open());
        assert!(!registry.is_initialized());
        assert_eq!(handle.read(&mut [0u8; 2]), Err(Error::NotOpen));
    }

    #[test]
    fn io_read_maps_empty_poll_to_timeout() {
        let rig = SimRig::new();
        let registry = registry_of(&[&rig]);
        registry.init();
        let mut handle = registry.open(0, Some(&poll_params())).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(
            embedded_io::Read::read(&mut handle, &mut buf),
            Err(Error::TimedOut)
        );

        rig.master.send(&hex!("5a5b"));
        assert_eq!(embedded_io::Read::read(&mut handle, &mut buf), Ok(2));
        assert_eq!(&buf[..2], &hex!("5a5b"));
    }

    #[test]
    fn io_write_to_waiting_master() {
        use embedded_io::Write as _;

        let rig = SimRig::new();
        let registry = registry_of(&[&rig]);
        registry.init();
        let mut handle = registry.open(0, Some(&poll_params())).unwrap();

        assert_eq!(rig.master.request(), None);
        handle.write_all(&[0x33]).unwrap();
        assert_eq!(rig.bus.transmitted(), vec![0x33]);
        handle.flush().unwrap();
    }

    #[test]
    fn io_write_to_silent_master_times_out() {
        let rig = SimRig::new();
        let registry = registry_of(&[&rig]);
        registry.init();
        let mut handle = registry.open(0, Some(&poll_params())).unwrap();

        let writer =
            std::thread::spawn(move || embedded_io::Write::write(&mut handle, &hex!("0102")));
        rig.core.wait_for_waiter(&rig.write_signal);
        rig.core.advance(10);

        assert_eq!(writer.join().unwrap(), Err(Error::TimedOut));
        assert!(rig.bus.transmitted().is_empty());
        assert_eq!(handle.status().tx_remaining, 0);
    }

    #[test]
    fn closed_handle_reports_not_open() {
        let rig = SimRig::new();
        let registry = registry_of(&[&rig]);
        registry.init();
        let handle = registry.open(0, Some(&poll_params())).unwrap();
        let copy = handle;

        handle.close();

        assert!(!copy.status().opened);
        assert_eq!(copy.write(&[1]), Err(Error::NotOpen));
    }
}
