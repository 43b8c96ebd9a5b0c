// Licensed under the Apache-2.0 license

//! TM4C129 I2C slave register backend over the `tm4c129x` register blocks.
//!
//! Only the slave half of the module and the master configuration register
//! (for the slave function enable) are touched.

use embedded_hal::i2c::SevenBitAddress;
use tm4c129x::i2c0::RegisterBlock;

use crate::i2c::common::I2cSlaveHwAttrs;
use crate::i2c::traits::SlaveHardware;

/// I2C module 5 on the EK-TM4C1294XL.
pub const I2C5_BASE: usize = 0x400C_1000;
/// Vector number of I2C5 in the device vector table.
pub const INT_I2C5: u16 = 84;
/// Lowest urgency the 3-bit priority field can encode.
pub const DEFAULT_INT_PRIORITY: u8 = 0xE0;

pub const I2C5_ATTRS: I2cSlaveHwAttrs = I2cSlaveHwAttrs {
    base_addr: I2C5_BASE,
    int_num: INT_I2C5,
    int_priority: DEFAULT_INT_PRIORITY,
};

/// Activity bits of SCSR on read (RREQ, TREQ).
const SCSR_ACT_MASK: u32 = 0x03;

/// Register interface of one TM4C129 I2C module in slave mode.
pub struct TivaI2cSlave {
    regs: *const RegisterBlock,
}

// SAFETY: every access is a single volatile load or store on the register
// block; the driver serializes read-modify-write sequences itself.
unsafe impl Sync for TivaI2cSlave {}
// SAFETY: see above.
unsafe impl Send for TivaI2cSlave {}

impl TivaI2cSlave {
    /// # Safety
    ///
    /// `regs` must point at a TM4C129 I2C register block (or memory laid out
    /// like one) that stays valid for the life of the value, and no other
    /// code may drive the slave half of that module.
    #[must_use]
    pub const unsafe fn new(regs: *const RegisterBlock) -> Self {
        Self { regs }
    }

    /// Take over I2C5.
    #[must_use]
    pub fn i2c5(_i2c: tm4c129x::I2C5) -> Self {
        // SAFETY: the PAC singleton is consumed, so nothing else owns I2C5.
        unsafe { Self::new(tm4c129x::I2C5::ptr()) }
    }

    fn regs(&self) -> &RegisterBlock {
        // SAFETY: `new` guarantees the register block is valid.
        unsafe { &*self.regs }
    }
}

/// Device Active bit of the SCSR control view.
const SCSR_DA: u32 = 1 << 0;

/// Stores a control word to SCSR.
fn write_scsr(regs: &tm4c129x::i2c0::RegisterBlock, value: u32) {
    // SAFETY: SCSR is read/write on silicon (status on read, control on
    // write), but the `tm4c129x` SVD only models the read view. `regs`
    // points at a valid register block, so the address is valid for a
    // 32-bit volatile store.
    unsafe {
        core::ptr::write_volatile(
            core::ptr::addr_of!(regs.scsr).cast::<u32>().cast_mut(),
            value,
        );
    }
}

impl SlaveHardware for TivaI2cSlave {
    fn init(&self, address: SevenBitAddress) {
        let regs = self.regs();
        regs.mcr.modify(|_, w| w.sfe().set_bit());
        regs.soar.write(|w| unsafe { w.oar().bits(address) });
        regs.soar2.modify(|_, w| w.oar2en().clear_bit());
        regs.sackctl.modify(|_, w| w.ackoen().clear_bit());
    }

    fn enable(&self) {
        let regs = self.regs();
        write_scsr(regs, SCSR_DA);
        regs.mcr.modify(|_, w| w.sfe().set_bit());
    }

    fn disable(&self) {
        let regs = self.regs();
        write_scsr(regs, 0);
        regs.mcr.modify(|_, w| w.sfe().clear_bit());
    }

    fn disable_fifo(&self) {
        // SCSR writes select the FIFO routing; DA is kept set.
        write_scsr(self.regs(), SCSR_DA);
    }

    fn enable_interrupts(&self, mask: u32) {
        self.regs()
            .simr
            .modify(|r, w| unsafe { w.bits(r.bits() | mask) });
    }

    fn disable_interrupts(&self, mask: u32) {
        self.regs()
            .simr
            .modify(|r, w| unsafe { w.bits(r.bits() & !mask) });
    }

    fn clear_interrupts(&self, mask: u32) {
        self.regs().sicr.write(|w| unsafe { w.bits(mask) });
    }

    fn activity(&self) -> u32 {
        self.regs().scsr.read().bits() & SCSR_ACT_MASK
    }

    fn interrupt_cause(&self) -> u32 {
        self.regs().smis.read().bits()
    }

    fn data_get(&self) -> u8 {
        self.regs().sdr.read().data().bits()
    }

    fn data_put(&self, byte: u8) {
        self.regs().sdr.write(|w| unsafe { w.data().bits(byte) });
    }
}

#[cfg(feature = "tm4c129")]
pub use self::nvic::NvicLine;

#[cfg(feature = "tm4c129")]
mod nvic {
    use core::cell::Cell;

    use cortex_m::interrupt::InterruptNumber;
    use cortex_m::peripheral::NVIC;
    use critical_section::Mutex;

    use crate::kernel::{InterruptHandler, InterruptLine};

    /// Vector numbers below this are core exceptions, not NVIC lines.
    const FIRST_DEVICE_VECTOR: u16 = 16;

    #[derive(Clone, Copy)]
    struct Irq(u16);

    // SAFETY: the number comes from the device vector table constants.
    unsafe impl InterruptNumber for Irq {
        fn number(self) -> u16 {
            self.0
        }
    }

    /// NVIC-backed interrupt line.
    ///
    /// The device vector for this line must call [`NvicLine::dispatch`].
    pub struct NvicLine {
        irq: Irq,
        handler: Mutex<Cell<Option<&'static dyn InterruptHandler>>>,
    }

    impl NvicLine {
        /// `vector` is the device vector number, as in
        /// [`I2cSlaveHwAttrs::int_num`](crate::i2c::common::I2cSlaveHwAttrs).
        #[must_use]
        pub const fn new(vector: u16) -> Self {
            Self {
                irq: Irq(vector.saturating_sub(FIRST_DEVICE_VECTOR)),
                handler: Mutex::new(Cell::new(None)),
            }
        }

        /// Forward the vector to the registered handler, if any.
        pub fn dispatch(&self) {
            let handler = critical_section::with(|cs| self.handler.borrow(cs).get());
            if let Some(handler) = handler {
                handler.on_interrupt();
            }
        }
    }

    impl InterruptLine for NvicLine {
        fn construct(&self, handler: &'static dyn InterruptHandler, priority: u8) {
            NVIC::mask(self.irq);
            critical_section::with(|cs| self.handler.borrow(cs).set(Some(handler)));
            // SAFETY: priority changes on a masked line cannot break a
            // priority-based critical section.
            unsafe {
                let mut peripherals = cortex_m::Peripherals::steal();
                peripherals.NVIC.set_priority(self.irq, priority);
            }
            NVIC::unpend(self.irq);
        }

        fn enable(&self) {
            // SAFETY: the handler is registered before the line is unmasked.
            unsafe { NVIC::unmask(self.irq) };
        }

        fn disable(&self) {
            NVIC::mask(self.irq);
        }

        fn destruct(&self) {
            NVIC::mask(self.irq);
            critical_section::with(|cs| self.handler.borrow(cs).set(None));
        }
    }
}
