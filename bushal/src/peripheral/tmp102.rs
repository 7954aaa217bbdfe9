//! TMP102 temperature sensor driver.
//!
//! The TMP102 reports a 12-bit two's-complement temperature, left-aligned in
//! a big-endian register pair, at 0.0625 °C per LSB. The mock I2C backend
//! emulates one at its default address.

use crate::error::Result;
use crate::hw_trait::I2c;
use crate::tracing::prelude::*;

/// Default I2C address (ADD0 tied to ground).
pub const DEFAULT_ADDRESS: u8 = 0x48;

/// Degrees Celsius per LSB.
pub const RESOLUTION: f32 = 0.0625;

mod regs {
    /// Temperature, two bytes.
    pub const TEMPERATURE: u8 = 0x00;
    /// Raw low-byte override on the emulated sensor.
    pub const RAW_OVERRIDE: u8 = 0xF0;
}

/// Convert the temperature register pair to °C.
pub fn decode_celsius(hi: u8, lo: u8) -> f32 {
    // Arithmetic shift keeps the sign of the 12-bit value.
    let raw = i16::from_be_bytes([hi, lo]) >> 4;
    f32::from(raw) * RESOLUTION
}

/// TMP102 driver
pub struct Tmp102<I: I2c> {
    i2c: I,
    address: u8,
}

impl<I: I2c> Tmp102<I> {
    pub fn new(i2c: I) -> Self {
        Self::new_with_address(i2c, DEFAULT_ADDRESS)
    }

    pub fn new_with_address(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Check that the sensor acknowledges.
    pub fn probe(&self) -> Result<()> {
        self.i2c.probe(self.address)
    }

    /// Read the current temperature.
    pub fn read_celsius(&self) -> Result<f32> {
        let mut buf = [0u8; 2];
        self.i2c
            .read_register(self.address, regs::TEMPERATURE, &mut buf)?;
        let celsius = decode_celsius(buf[0], buf[1]);
        trace!(addr = self.address, hi = buf[0], lo = buf[1], celsius, "TMP102 read");
        Ok(celsius)
    }

    /// Replace the low byte of the raw reading.
    ///
    /// Only the emulated sensor honours this; real parts ignore writes to
    /// register `0xF0`.
    pub fn set_raw_low_byte(&self, value: u8) -> Result<()> {
        self.i2c
            .write_register_u8(self.address, regs::RAW_OVERRIDE, value)
    }
}
