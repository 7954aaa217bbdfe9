//! Drivers for devices hanging off the buses.
//!
//! Drivers take any [`I2c`](crate::hw_trait::I2c) implementation by value;
//! pass `&bus` or an `Arc` to share one bus between several drivers.

pub mod mcp23008;
pub mod tmp102;

pub use mcp23008::Mcp23008;
pub use tmp102::Tmp102;
