//! Software I2C backend with one emulated temperature sensor.
//!
//! The bus has a single device at [`MOCK_ADDRESS`] that looks like a TMP102:
//! registers `0x00..=0x01` hold the 12-bit temperature left-aligned in a
//! big-endian word. The temperature drifts upward by 0.5 °C every time a read
//! is serviced and wraps after 30 °C, so client code sees a changing value
//! without a clock.
//!
//! Writes of `[0xF0, v]` replace the low byte of the raw value with `v`,
//! which lets tests inject a known reading. Other register writes are kept in
//! a scratch register file and read back verbatim; registers never written
//! read as [`UNMAPPED_FILL`].
//!
//! All state lives in the backend instance, so every mock bus is an
//! independent scenario.

use super::{I2cBackend, I2cConfig};
use crate::error::{Error, Result};
use crate::tracing::prelude::*;

/// The only address that answers.
pub const MOCK_ADDRESS: u8 = 0x48;

/// Write `[OVERRIDE_REG, v]` to set the raw value's low byte.
pub const OVERRIDE_REG: u8 = 0xF0;

/// Fill byte for reads addressed to an absent device.
pub const NO_DEVICE_FILL: u8 = 0xEE;

/// Fill byte for registers outside the emulated window.
pub const UNMAPPED_FILL: u8 = 0xFF;

/// Degrees Celsius per raw LSB.
pub const LSB_CELSIUS: f32 = 0.0625;

/// Raw value at start-up and after wrapping: 25.0 °C.
const TEMP_BASE_RAW: u16 = 400;

/// Drift per serviced read: 0.5 °C.
const TEMP_STEP_RAW: u16 = 8;

/// Highest raw value reached before wrapping: 30.0 °C.
const TEMP_MAX_RAW: u16 = 480;

const RAW_MASK: u16 = 0x0fff;

/// Left-align a 12-bit raw value in a big-endian register pair.
pub fn encode_raw(raw: u16) -> [u8; 2] {
    ((raw & RAW_MASK) << 4).to_be_bytes()
}

/// Mock I2C backend.
pub struct MockI2c {
    bus: String,
    selected: Option<u8>,
    temp_raw: u16,
    registers: [Option<u8>; 256],
}

impl MockI2c {
    pub fn new(bus: impl Into<String>) -> Self {
        Self {
            bus: bus.into(),
            selected: None,
            temp_raw: TEMP_BASE_RAW,
            registers: [None; 256],
        }
    }

    /// Current raw 12-bit temperature.
    pub fn raw_temperature(&self) -> u16 {
        self.temp_raw
    }

    /// Current temperature in °C.
    pub fn celsius(&self) -> f32 {
        f32::from(self.temp_raw) * LSB_CELSIUS
    }

    /// Address last selected, if any.
    pub fn selected(&self) -> Option<u8> {
        self.selected
    }

    /// Step the sensor. Past the upper bound, the cycle restarts one step
    /// above the base value.
    fn advance(&mut self) {
        let next = self.temp_raw + TEMP_STEP_RAW;
        self.temp_raw = if next > TEMP_MAX_RAW {
            TEMP_BASE_RAW + TEMP_STEP_RAW
        } else {
            next
        };
    }

    fn present(&self) -> Result<u8> {
        match self.selected {
            Some(MOCK_ADDRESS) => Ok(MOCK_ADDRESS),
            Some(addr) => Err(Error::NoDevice(addr)),
            None => Err(Error::invalid("no device selected")),
        }
    }

    fn register(&self, index: usize, temp: [u8; 2]) -> u8 {
        match index {
            0 | 1 => temp[index],
            i if i < self.registers.len() => self.registers[i].unwrap_or(UNMAPPED_FILL),
            _ => UNMAPPED_FILL,
        }
    }
}

impl I2cBackend for MockI2c {
    fn open(config: &I2cConfig) -> Result<Self> {
        info!(bus = %config.bus, speed_hz = config.speed_hz, "Mock I2C bus opened");
        Ok(Self::new(config.bus.clone()))
    }

    fn select(&mut self, addr: u8) -> Result<()> {
        self.selected = Some(addr);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.present()?;
        match data {
            [OVERRIDE_REG, low, ..] => {
                self.temp_raw = (self.temp_raw & 0x0f00) | u16::from(*low);
                debug!(bus = %self.bus, raw = self.temp_raw, "Mock temperature overridden");
            }
            [reg, payload @ ..] => {
                let start = usize::from(*reg);
                for (slot, value) in self.registers[start..].iter_mut().zip(payload) {
                    *slot = Some(*value);
                }
                trace!(bus = %self.bus, reg = *reg, len = payload.len(), "Mock write");
            }
            [] => {}
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        if let Err(e) = self.present() {
            buf.fill(NO_DEVICE_FILL);
            return Err(e);
        }
        self.advance();
        let temp = encode_raw(self.temp_raw);
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = temp[i % 2];
        }
        trace!(bus = %self.bus, raw = self.temp_raw, len = buf.len(), "Mock read");
        Ok(())
    }

    fn probe(&mut self, addr: u8) -> Result<()> {
        self.select(addr)?;
        self.present().map(drop)
    }

    fn read_register(&mut self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<()> {
        self.select(addr)?;
        if let Err(e) = self.present() {
            buf.fill(NO_DEVICE_FILL);
            return Err(e);
        }
        self.advance();
        let temp = encode_raw(self.temp_raw);
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.register(usize::from(reg) + i, temp);
        }
        trace!(bus = %self.bus, reg, raw = self.temp_raw, len = buf.len(), "Mock register read");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw_trait::I2c;
    use crate::i2c::I2cBus;
    use crate::ErrorKind;

    fn bus() -> I2cBus<MockI2c> {
        I2cBus::open(&I2cConfig::new("mock-bus-0")).unwrap()
    }

    fn decode(bytes: [u8; 2]) -> f32 {
        f32::from(u16::from_be_bytes(bytes) >> 4) * LSB_CELSIUS
    }

    #[test]
    fn starts_at_25_degrees() {
        let mock = MockI2c::new("m");
        assert_eq!(mock.raw_temperature(), 400);
        assert_eq!(mock.celsius(), 25.0);
        assert_eq!(encode_raw(400), [0x19, 0x00]);
    }

    #[test]
    fn eleven_reads_follow_step_and_wrap() {
        let bus = bus();
        let mut seen = Vec::new();
        for _ in 0..11 {
            let mut buf = [0u8; 2];
            bus.read_register(MOCK_ADDRESS, 0x00, &mut buf).unwrap();
            seen.push(decode(buf));
        }
        let expected = [
            25.5, 26.0, 26.5, 27.0, 27.5, 28.0, 28.5, 29.0, 29.5, 30.0, 25.5,
        ];
        assert_eq!(seen, expected);
    }

    #[test]
    fn probe_only_answers_at_0x48() {
        let bus = bus();
        assert!(bus.probe(0x48).is_ok());
        for addr in [0x00, 0x20, 0x47, 0x49, 0x7f] {
            assert!(matches!(bus.probe(addr), Err(Error::NoDevice(a)) if a == addr));
        }
        // Probing is not a serviced read.
        bus.with_backend(|m| assert_eq!(m.raw_temperature(), 400));
    }

    #[test]
    fn absent_device_fills_sentinel() {
        let bus = bus();
        let mut buf = [0u8; 3];
        let err = bus.read(0x50, &mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoDevice);
        assert_eq!(buf, [NO_DEVICE_FILL; 3]);

        let mut buf = [0u8; 2];
        let err = bus.read_register(0x50, 0x00, &mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoDevice);
        assert_eq!(buf, [NO_DEVICE_FILL; 2]);

        let err = bus.write(0x50, &[0x01, 0x02]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoDevice);
    }

    #[test]
    fn override_replaces_low_byte_only() {
        let bus = bus();
        // 400 = 0x190; high nibble 0x1 survives.
        bus.write_register_u8(MOCK_ADDRESS, OVERRIDE_REG, 0x20).unwrap();
        bus.with_backend(|m| assert_eq!(m.raw_temperature(), 0x120));

        bus.write(MOCK_ADDRESS, &[OVERRIDE_REG, 0x7f]).unwrap();
        bus.with_backend(|m| assert_eq!(m.raw_temperature(), 0x17f));
    }

    #[test]
    fn raw_read_repeats_temperature_pair() {
        let bus = bus();
        let mut buf = [0u8; 5];
        bus.read(MOCK_ADDRESS, &mut buf).unwrap();
        let pair = encode_raw(408);
        assert_eq!(buf, [pair[0], pair[1], pair[0], pair[1], pair[0]]);
    }

    #[test]
    fn register_round_trip_outside_temperature_window() {
        let bus = bus();
        bus.write_register(MOCK_ADDRESS, 0x10, &[0xde, 0xad, 0xbe])
            .unwrap();
        let mut buf = [0u8; 3];
        bus.read_register(MOCK_ADDRESS, 0x10, &mut buf).unwrap();
        assert_eq!(buf, [0xde, 0xad, 0xbe]);
    }

    #[test]
    fn unaligned_range_uses_sentinel() {
        let bus = bus();
        let mut buf = [0u8; 4];
        bus.read_register(MOCK_ADDRESS, 0x01, &mut buf).unwrap();
        let temp = encode_raw(408);
        assert_eq!(buf, [temp[1], UNMAPPED_FILL, UNMAPPED_FILL, UNMAPPED_FILL]);

        let mut tail = [0u8; 2];
        bus.read_register(MOCK_ADDRESS, 0xff, &mut tail).unwrap();
        assert_eq!(tail, [UNMAPPED_FILL; 2]);
    }

    #[test]
    fn buses_are_independent() {
        let a = bus();
        let b = bus();
        let mut buf = [0u8; 2];
        for _ in 0..3 {
            a.read_register(MOCK_ADDRESS, 0, &mut buf).unwrap();
        }
        a.with_backend(|m| assert_eq!(m.celsius(), 26.5));
        b.with_backend(|m| assert_eq!(m.celsius(), 25.0));
    }
}
