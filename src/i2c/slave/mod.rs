// Licensed under the Apache-2.0 license

//! Interrupt-driven I2C slave driver object.
//!
//! One [`I2cSlaveObject`] owns everything a single peripheral instance needs:
//! the register interface, the interrupt line, two wake signals, two one-shot
//! timers and the shared transfer state. The object is placed in a `static`
//! and opened with a `'static` borrow so the interrupt line and the timers can
//! call back into it.
//!
//! Contexts that touch the shared state:
//!
//! ```text
//!  task:   read()  ── get ──┐            ┌── sets tx ── write()
//!                           ▼            ▼
//!                       ┌───────────────────┐
//!  interrupt:  put ────▶│    SlaveState     │◀──── producer step
//!                       └───────────────────┘
//!  timer service:  read timeout sets timed_out, pending write sends 0x00
//! ```
//!
//! Every access to [`SlaveState`] happens under an [`InterruptGuard`]. Signal
//! posts and timer starts are issued after the guard is dropped.

mod rx;
mod tx;

use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal::i2c::SevenBitAddress;

use crate::common::{InterruptGuard, Logger, NoOpLogger};
use crate::i2c::common::{
    Error, I2cSEvent, I2cSlaveHwAttrs, I2cSlaveParams, SlaveStatus, MAX_SEVEN_BIT_ADDRESS,
};
use crate::i2c::ring_buffer::RingBuffer;
use crate::i2c::traits::{SlaveHardware, SLAVE_INT_DATA};
use crate::kernel::{
    InterruptHandler, InterruptLine, Kernel, OneShotTimer, Ticks, TimerId, TimerTarget,
    Timeout, WakeSignal,
};

use self::rx::RxState;
use self::tx::{Caller, TxState};

/// Receive ring capacity of the reference configuration.
pub const DEFAULT_RING_SIZE: usize = 32;

/// Byte clocked out when the master stalls on a read the application has not
/// supplied data for.
pub const PLACEHOLDER_BYTE: u8 = 0x00;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Lifecycle {
    Closed,
    Opening,
    Open,
    Closing,
}

/// State shared between task, interrupt and timer contexts.
struct SlaveState<const N: usize> {
    lifecycle: Lifecycle,
    slave_address: SevenBitAddress,
    read_timeout: Timeout,
    write_timeout: Timeout,
    write_pending_timeout: Ticks,
    ring: RingBuffer<N>,
    rx: RxState,
    tx: TxState,
    rx_overruns: u32,
    last_event: Option<I2cSEvent>,
}

impl<const N: usize> SlaveState<N> {
    const fn new() -> Self {
        Self {
            lifecycle: Lifecycle::Closed,
            slave_address: I2cSlaveParams::DEFAULT.slave_address,
            read_timeout: I2cSlaveParams::DEFAULT.read_timeout,
            write_timeout: I2cSlaveParams::DEFAULT.write_timeout,
            write_pending_timeout: I2cSlaveParams::DEFAULT.write_pending_timeout,
            ring: RingBuffer::new(),
            rx: RxState::IDLE,
            tx: TxState::IDLE,
            rx_overruns: 0,
            last_event: None,
        }
    }

    fn apply(&mut self, params: &I2cSlaveParams) {
        self.slave_address = params.slave_address;
        self.read_timeout = params.read_timeout;
        self.write_timeout = params.write_timeout;
        self.write_pending_timeout = params.write_pending_timeout;
        self.ring.reset();
        self.rx = RxState::IDLE;
        self.tx = TxState::IDLE;
        self.rx_overruns = 0;
        self.last_event = None;
    }

    fn is_open(&self) -> bool {
        self.lifecycle == Lifecycle::Open
    }
}

/// Kernel objects an instance is built from.
pub struct SlaveKernelObjects<K: Kernel> {
    pub irq: K::Interrupt,
    /// Posted when received data arrives for a waiting reader, or when the
    /// read timer expires.
    pub read_signal: K::Signal,
    /// Posted when the in-flight write has been fully clocked out.
    pub write_signal: K::Signal,
    pub read_timer: K::Timer,
    pub write_pending_timer: K::Timer,
}

/// One I2C slave peripheral instance.
///
/// `N` is the receive ring capacity.
pub struct I2cSlaveObject<H, K: Kernel, L = NoOpLogger, const N: usize = DEFAULT_RING_SIZE> {
    hw: H,
    attrs: I2cSlaveHwAttrs,
    kernel: SlaveKernelObjects<K>,
    logger: L,
    state: Mutex<RefCell<SlaveState<N>>>,
}

impl<H, K, L, const N: usize> I2cSlaveObject<H, K, L, N>
where
    H: SlaveHardware + 'static,
    K: Kernel,
    L: Logger + 'static,
{
    pub const fn new(
        hw: H,
        attrs: I2cSlaveHwAttrs,
        kernel: SlaveKernelObjects<K>,
        logger: L,
    ) -> Self {
        Self {
            hw,
            attrs,
            kernel,
            logger,
            state: Mutex::new(RefCell::new(SlaveState::new())),
        }
    }

    #[must_use]
    pub fn hw_attrs(&self) -> &I2cSlaveHwAttrs {
        &self.attrs
    }

    /// Put the instance in the closed state. Called once at boot, before any
    /// other operation.
    pub fn init(&self) {
        let guard = InterruptGuard::acquire();
        self.state.borrow_ref_mut(guard.token()).lifecycle = Lifecycle::Closed;
    }

    /// Bring the instance up with `params`.
    ///
    /// Kernel objects are constructed and the peripheral is configured before
    /// the interrupt line is enabled; the interrupt is the last thing switched
    /// on.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidAddress`] if the address needs more than seven bits.
    /// * [`Error::AlreadyOpen`] if the instance is not closed. The running
    ///   instance is left untouched.
    pub fn open(&'static self, params: &I2cSlaveParams) -> Result<(), Error> {
        if params.slave_address > MAX_SEVEN_BIT_ADDRESS {
            return Err(Error::InvalidAddress);
        }

        {
            let guard = InterruptGuard::acquire();
            let mut state = self.state.borrow_ref_mut(guard.token());
            if state.lifecycle != Lifecycle::Closed {
                drop(state);
                drop(guard);
                self.logger
                    .warn(format_args!("open on busy instance 0x{:x}", self.attrs.base_addr));
                return Err(Error::AlreadyOpen);
            }
            state.lifecycle = Lifecycle::Opening;
            state.apply(params);
        }

        self.kernel.irq.construct(self, self.attrs.int_priority);

        self.kernel.write_signal.construct();
        self.kernel.read_signal.construct();

        let read_ticks = match params.read_timeout {
            Timeout::After(ticks) => ticks,
            Timeout::Forever => Ticks::from_ticks(0),
        };
        self.kernel.read_timer
            .construct(read_ticks, self, TimerId::ReadTimeout);
        self.kernel.write_pending_timer.construct(
            params.write_pending_timeout,
            self,
            TimerId::WritePending,
        );

        self.hw.init(params.slave_address);
        self.hw.clear_interrupts(SLAVE_INT_DATA);
        self.hw.enable();
        self.hw.disable_fifo();
        self.hw.enable_interrupts(SLAVE_INT_DATA);

        {
            let guard = InterruptGuard::acquire();
            self.state.borrow_ref_mut(guard.token()).lifecycle = Lifecycle::Open;
        }
        self.kernel.irq.enable();

        self.logger.debug(format_args!(
            "slave open at 0x{:x} addr 0x{:x}",
            self.attrs.base_addr, params.slave_address
        ));
        Ok(())
    }

    /// Tear the instance down. Closing a closed instance does nothing.
    pub fn close(&self) {
        {
            let guard = InterruptGuard::acquire();
            let mut state = self.state.borrow_ref_mut(guard.token());
            if state.lifecycle != Lifecycle::Open {
                return;
            }
            state.lifecycle = Lifecycle::Closing;
        }

        self.kernel.irq.disable();
        self.hw.disable_interrupts(SLAVE_INT_DATA);
        self.hw.disable();

        self.kernel.irq.destruct();

        self.kernel.write_signal.destruct();
        self.kernel.write_pending_timer.destruct();
        self.kernel.read_signal.destruct();
        self.kernel.read_timer.destruct();

        {
            let guard = InterruptGuard::acquire();
            let mut state = self.state.borrow_ref_mut(guard.token());
            state.rx = RxState::IDLE;
            state.tx = TxState::IDLE;
            state.lifecycle = Lifecycle::Closed;
        }

        self.logger
            .debug(format_args!("slave closed at 0x{:x}", self.attrs.base_addr));
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        let guard = InterruptGuard::acquire();
        let open = self.state.borrow_ref(guard.token()).is_open();
        open
    }

    #[must_use]
    pub fn status(&self) -> SlaveStatus {
        let guard = InterruptGuard::acquire();
        let state = self.state.borrow_ref(guard.token());
        let opened = state.is_open();
        SlaveStatus {
            opened,
            address: opened.then_some(state.slave_address),
            rx_buffer_count: state.ring.len(),
            tx_remaining: state.tx.remaining(),
            rx_overruns: state.rx_overruns,
            last_event: state.last_event,
        }
    }

    /// Service one peripheral interrupt.
    ///
    /// Receive and transmit are both handled when the status shows both.
    fn handle_interrupt(&self) {
        let status = self.hw.take_irq_status();

        if status.receive_ready() {
            self.receive_byte();
        }

        if status.transmit_requested() {
            self.logger.debug(format_args!("write in isr"));
            self.transmit_step(Caller::Interrupt);
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SlaveState<N>) -> R) -> R {
        let guard = InterruptGuard::acquire();
        let mut state = self.state.borrow_ref_mut(guard.token());
        f(&mut state)
    }

    /// Run `f` on the state if the instance is open.
    fn open_state<R>(&self, f: impl FnOnce(&mut SlaveState<N>) -> R) -> Result<R, Error> {
        self.with_state(|state| {
            if state.is_open() {
                Ok(f(state))
            } else {
                Err(Error::NotOpen)
            }
        })
    }
}

impl<H, K, L, const N: usize> InterruptHandler for I2cSlaveObject<H, K, L, N>
where
    H: SlaveHardware + 'static,
    K: Kernel,
    L: Logger + 'static,
{
    fn on_interrupt(&self) {
        self.handle_interrupt();
    }
}

impl<H, K, L, const N: usize> TimerTarget for I2cSlaveObject<H, K, L, N>
where
    H: SlaveHardware + 'static,
    K: Kernel,
    L: Logger + 'static,
{
    fn timer_expired(&self, id: TimerId) {
        match id {
            TimerId::ReadTimeout => self.read_timeout_expired(),
            TimerId::WritePending => self.write_pending_expired(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i2c::tiva::{TivaI2cSlave, I2C5_ATTRS, INT_I2C5};
    use crate::tests::sim::{Journal, SimRig};
    use hex_literal::hex;

    fn poll_params() -> I2cSlaveParams {
        crate::i2c::common::I2cSlaveParamsBuilder::new()
            .read_timeout(Timeout::NO_WAIT)
            .write_timeout(Timeout::ticks(100))
            .build()
            .unwrap()
    }

    /// Kernel objects that do nothing, so an instance fits in a `static`.
    struct Inert;

    impl WakeSignal for Inert {
        fn construct(&self) {}
        fn post(&self) {}
        fn try_pend(&self) -> nb::Result<(), core::convert::Infallible> {
            Err(nb::Error::WouldBlock)
        }
        fn pend(&self, _timeout: Timeout) -> bool {
            false
        }
        fn destruct(&self) {}
    }

    impl OneShotTimer for Inert {
        fn construct(&self, _timeout: Ticks, _target: &'static dyn TimerTarget, _id: TimerId) {}
        fn start(&self) {}
        fn stop(&self) {}
        fn destruct(&self) {}
    }

    impl InterruptLine for Inert {
        fn construct(&self, _handler: &'static dyn InterruptHandler, _priority: u8) {}
        fn enable(&self) {}
        fn disable(&self) {}
        fn destruct(&self) {}
    }

    struct InertKernel;

    impl Kernel for InertKernel {
        type Interrupt = Inert;
        type Signal = Inert;
        type Timer = Inert;
    }

    static BOARD_I2C5: I2cSlaveObject<TivaI2cSlave, InertKernel> = I2cSlaveObject::new(
        // SAFETY: the test never opens the instance, so no register is touched.
        unsafe { TivaI2cSlave::new(tm4c129x::I2C5::ptr()) },
        I2C5_ATTRS,
        SlaveKernelObjects {
            irq: Inert,
            read_signal: Inert,
            write_signal: Inert,
            read_timer: Inert,
            write_pending_timer: Inert,
        },
        NoOpLogger {},
    );

    #[test]
    fn instance_is_built_in_a_static_and_starts_closed() {
        BOARD_I2C5.init();
        assert!(!BOARD_I2C5.is_open());
        assert_eq!(BOARD_I2C5.hw_attrs().int_num, INT_I2C5);
        assert_eq!(BOARD_I2C5.status().address, None);
    }

    #[test]
    fn open_enables_interrupt_line_last() {
        let rig = SimRig::new();
        rig.slave.open(&poll_params()).unwrap();

        let journal = rig.journal.entries();
        assert_eq!(journal.last(), Some(&Journal::IrqEnable));
        let hw_init = journal.iter().position(|e| *e == Journal::HwInit(0x1D));
        let irq_construct = journal.iter().position(|e| *e == Journal::IrqConstruct);
        let data_int = journal
            .iter()
            .position(|e| *e == Journal::HwEnableInterrupts(SLAVE_INT_DATA));
        assert!(irq_construct < hw_init);
        assert!(hw_init < data_int);
        assert!(journal.contains(&Journal::HwDisableFifo));
    }

    #[test]
    fn second_open_reports_already_open_and_keeps_running_instance() {
        let rig = SimRig::new();
        rig.slave.open(&poll_params()).unwrap();

        let other = crate::i2c::common::I2cSlaveParamsBuilder::new()
            .slave_address(0x2A)
            .build()
            .unwrap();
        assert_eq!(rig.slave.open(&other), Err(Error::AlreadyOpen));

        let status = rig.slave.status();
        assert!(status.opened);
        assert_eq!(status.address, Some(0x1D));
        assert_eq!(rig.journal.count(&Journal::IrqConstruct), 1);
    }

    #[test]
    fn open_rejects_wide_address_and_stays_closed() {
        let rig = SimRig::new();
        let params = I2cSlaveParams {
            slave_address: 0x90,
            ..I2cSlaveParams::DEFAULT
        };
        assert_eq!(rig.slave.open(&params), Err(Error::InvalidAddress));
        assert!(!rig.slave.is_open());
        assert!(rig.journal.entries().is_empty());
    }

    #[test]
    fn close_is_idempotent() {
        let rig = SimRig::new();
        rig.slave.open(&poll_params()).unwrap();

        rig.slave.close();
        rig.slave.close();

        assert!(!rig.slave.is_open());
        assert_eq!(rig.journal.count(&Journal::HwDisable), 1);
        assert_eq!(rig.journal.count(&Journal::IrqDestruct), 1);
        assert!(!rig.irq.is_enabled());
    }

    #[test]
    fn close_masks_line_and_peripheral_before_dropping_interrupt() {
        let rig = SimRig::new();
        rig.slave.open(&poll_params()).unwrap();
        rig.journal.clear();

        rig.slave.close();

        let journal = rig.journal.entries();
        assert_eq!(
            &journal[..4],
            &[
                Journal::IrqDisable,
                Journal::HwDisableInterrupts(SLAVE_INT_DATA),
                Journal::HwDisable,
                Journal::IrqDestruct,
            ]
        );
    }

    #[test]
    fn closed_instance_rejects_transfers() {
        let rig = SimRig::new();
        let mut buf = [0u8; 4];
        assert_eq!(rig.slave.read(&mut buf), Err(Error::NotOpen));
        assert_eq!(rig.slave.write(&hex!("0102")), Err(Error::NotOpen));

        rig.slave.open(&poll_params()).unwrap();
        rig.slave.close();
        assert_eq!(rig.slave.read(&mut buf), Err(Error::NotOpen));
        assert_eq!(rig.slave.write(&hex!("0102")), Err(Error::NotOpen));
    }

    #[test]
    fn reopen_starts_from_empty_ring() {
        let rig = SimRig::new();
        rig.slave.open(&poll_params()).unwrap();
        rig.master.send(&hex!("aabb"));
        assert_eq!(rig.slave.status().rx_buffer_count, 2);
        rig.slave.close();

        rig.slave.open(&poll_params()).unwrap();
        let status = rig.slave.status();
        assert_eq!(status.rx_buffer_count, 0);
        assert_eq!(status.last_event, None);

        let mut buf = [0u8; 4];
        assert_eq!(rig.slave.read(&mut buf), Ok(0));
    }

    #[test]
    fn receive_and_transmit_in_one_interrupt() {
        let rig = SimRig::new();
        rig.slave.open(&poll_params()).unwrap();

        rig.master.send_and_request(0x42);

        assert_eq!(rig.slave.status().rx_buffer_count, 1);
        assert!(rig.bus.transmitted().is_empty());
        assert_eq!(rig.slave.status().last_event, Some(I2cSEvent::SlaveRdPending));

        let mut buf = [0u8; 1];
        assert_eq!(rig.slave.read(&mut buf), Ok(1));
        assert_eq!(buf, [0x42]);
    }

    #[test]
    fn interrupt_acknowledges_observed_cause() {
        let rig = SimRig::new();
        rig.slave.open(&poll_params()).unwrap();

        rig.master.send(&[0x11]);

        assert_eq!(rig.bus.pending_cause(), 0);
        assert_eq!(rig.slave.status().last_event, Some(I2cSEvent::SlaveWrRecvd));
    }
}
