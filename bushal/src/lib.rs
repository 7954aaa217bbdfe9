//! Portable bus access for embedded Linux boards.
//!
//! Each bus type has a handle generic over its backend: [`i2c::I2cBus`],
//! [`spi::SpiBus`], [`gpio::Gpio`] and [`uart::Uart`]. The Linux backends talk
//! to kernel device nodes; the mock backends run anywhere and back the test
//! suite. Drivers in [`peripheral`] are written against the [`hw_trait`]
//! traits and work with either.

pub mod config;
pub mod daemon;
pub mod demo;
pub mod error;
pub mod gpio;
pub mod hw_trait;
pub mod i2c;
pub mod peripheral;
pub mod spi;
pub mod tracing;
pub mod uart;

pub use error::{Error, ErrorKind, Result};
