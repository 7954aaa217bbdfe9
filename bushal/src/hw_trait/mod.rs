//! Hardware abstraction layer traits.
//!
//! This module defines the driver-facing interfaces (I2C, SPI, GPIO) that
//! let device drivers work with any backend, whether the Linux kernel
//! interfaces or the software mocks. Bus handles implement these traits, and
//! so do shared references to them, so one handle can serve several drivers.

pub mod gpio;
pub mod i2c;
pub mod spi;

// Re-export traits
pub use gpio::Gpio;
pub use i2c::I2c;
pub use spi::Spi;
