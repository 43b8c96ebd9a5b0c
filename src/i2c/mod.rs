// Licensed under the Apache-2.0 license

//! Interrupt-driven I2C slave driver.
//!
//! The peripheral answers an external bus master. Bytes the master writes are
//! buffered by the interrupt handler and handed to the application through a
//! blocking, timeout-bounded `read`; bytes the application `write`s are
//! clocked out one per master read request. Targets the TM4C129 I2C modules,
//! with the register access and RTOS services behind traits.

pub mod common;
pub mod registry;
pub mod ring_buffer;
pub mod slave;
pub mod system_setup;
pub mod tiva;
pub mod traits;

pub use common::{Error, I2cSlaveParams, I2cSlaveParamsBuilder, SlaveStatus};
pub use registry::{I2cSlaveDriver, I2cSlaveHandle, I2cSlaveRegistry};
pub use slave::{I2cSlaveObject, SlaveKernelObjects};
