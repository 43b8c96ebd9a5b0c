// Licensed under the Apache-2.0 license

//! I2C System Setup Helper
//!
//! Board bring-up for the slave instances: clock gating and pin muxing of the
//! peripheral, followed by registry initialization. The register work sits
//! behind [`PeripheralSetup`] so boards other than the EK-TM4C1294XL, and the
//! tests, can provide their own.

use tm4c129x::{gpio_porta_ahb, sysctl};

use crate::i2c::registry::I2cSlaveRegistry;

/// Errors from board-level peripheral setup.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SetupError {
    /// A peripheral did not report ready after its clock was enabled.
    ClockNotReady,
}

/// Board hook that makes the I2C peripherals usable.
pub trait PeripheralSetup {
    type Error;

    /// Enable peripheral clocks and route the bus pins.
    ///
    /// # Errors
    ///
    /// Board specific.
    fn init_peripheral_pins(&mut self) -> Result<(), Self::Error>;
}

/// Helper for bringing the slave instances up at boot.
pub struct I2cSystemSetup;

impl I2cSystemSetup {
    /// Configure the board, then initialize every registered instance.
    ///
    /// # Errors
    ///
    /// Whatever the board setup reports. The registry is left uninitialized
    /// in that case.
    pub fn bring_up<S: PeripheralSetup>(
        setup: &mut S,
        registry: &I2cSlaveRegistry,
    ) -> Result<(), S::Error> {
        setup.init_peripheral_pins()?;
        registry.init();
        Ok(())
    }
}

const PORTB: u32 = 1 << 1;
const I2C5: u32 = 1 << 5;
const PIN_SCL: u32 = 1 << 0;
const PIN_SDA: u32 = 1 << 1;
/// PB0 = I2C5SCL, PB1 = I2C5SDA (alternate function 2).
const PCTL_PB0_PB1_MASK: u32 = 0xFF;
const PCTL_PB0_PB1_I2C5: u32 = 0x22;

const READY_POLL_LIMIT: u32 = 10_000;

/// I2C5 on PB0/PB1 of the EK-TM4C1294XL.
pub struct Ek1294I2c5Pins {
    sysctl: *const sysctl::RegisterBlock,
    gpio: *const gpio_porta_ahb::RegisterBlock,
}

impl Ek1294I2c5Pins {
    /// # Safety
    ///
    /// Both pointers must reference the corresponding register blocks (or
    /// memory laid out like them) for the life of the value.
    #[must_use]
    pub const unsafe fn new(
        sysctl: *const sysctl::RegisterBlock,
        gpio: *const gpio_porta_ahb::RegisterBlock,
    ) -> Self {
        Self { sysctl, gpio }
    }

    /// The on-chip register blocks.
    ///
    /// # Safety
    ///
    /// Only valid on a TM4C129 device, and nothing else may reconfigure the
    /// I2C5 clock gate or port B pins 0 and 1 concurrently.
    #[must_use]
    pub const unsafe fn board() -> Self {
        Self {
            sysctl: tm4c129x::SYSCTL::ptr(),
            gpio: tm4c129x::GPIO_PORTB_AHB::ptr(),
        }
    }

    fn sysctl(&self) -> &sysctl::RegisterBlock {
        // SAFETY: `new`/`board` guarantee the register block is valid.
        unsafe { &*self.sysctl }
    }

    fn gpio(&self) -> &gpio_porta_ahb::RegisterBlock {
        // SAFETY: `new`/`board` guarantee the register block is valid.
        unsafe { &*self.gpio }
    }

    fn wait_ready(ready: impl Fn() -> bool) -> Result<(), SetupError> {
        for _ in 0..READY_POLL_LIMIT {
            if ready() {
                return Ok(());
            }
        }
        Err(SetupError::ClockNotReady)
    }
}

impl PeripheralSetup for Ek1294I2c5Pins {
    type Error = SetupError;

    fn init_peripheral_pins(&mut self) -> Result<(), SetupError> {
        let sysctl = self.sysctl();
        sysctl
            .rcgci2c
            .modify(|r, w| unsafe { w.bits(r.bits() | I2C5) });
        sysctl
            .rcgcgpio
            .modify(|r, w| unsafe { w.bits(r.bits() | PORTB) });
        Self::wait_ready(|| sysctl.pri2c.read().bits() & I2C5 != 0)?;
        Self::wait_ready(|| sysctl.prgpio.read().bits() & PORTB != 0)?;

        let gpio = self.gpio();
        gpio.pctl.modify(|r, w| unsafe {
            w.bits((r.bits() & !PCTL_PB0_PB1_MASK) | PCTL_PB0_PB1_I2C5)
        });
        gpio.afsel
            .modify(|r, w| unsafe { w.bits(r.bits() | PIN_SCL | PIN_SDA) });
        gpio.dr2r
            .modify(|r, w| unsafe { w.bits(r.bits() | PIN_SCL | PIN_SDA) });
        // SCL is push-pull on this part; only SDA is open drain.
        gpio.odr
            .modify(|r, w| unsafe { w.bits((r.bits() & !PIN_SCL) | PIN_SDA) });
        gpio.den
            .modify(|r, w| unsafe { w.bits(r.bits() | PIN_SCL | PIN_SDA) });
        Ok(())
    }
}
