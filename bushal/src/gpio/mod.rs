//! GPIO LED bank and button pair.
//!
//! [`Gpio`] requests a contiguous run of 1 to 8 output lines for LEDs and two
//! input lines for buttons, then moves them in bulk: one call sets every LED,
//! one call samples both buttons. Polarity is fixed at open time and applied
//! on every access, so callers always work in logical terms (on = 1,
//! pressed = 1).
//!
//! Line access goes through a [`GpioChip`] backend: [`LinuxChip`] uses the
//! kernel GPIO character device through `gpio-cdev`, [`MockChip`] keeps line
//! levels in memory.

pub mod linux;
pub mod mock;

pub use linux::LinuxChip;
pub use mock::{LineProbe, MockChip};

use crate::error::{Error, Result};
use crate::hw_trait;
use crate::tracing::prelude::*;

/// Most LEDs a bank can drive.
pub const MAX_LEDS: u8 = 8;

const LED_CONSUMER: &str = "bushal-leds";
const BTN_CONSUMER: &str = "bushal-btns";

/// Both button bits.
const BTN_MASK: u8 = hw_trait::gpio::BTN0 | hw_trait::gpio::BTN1;

/// Lines to request and how they are wired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioConfig {
    /// Chip name (`gpiochip0`) or device path (`/dev/gpiochip0`).
    pub chip: String,
    /// Offset of LED 0; LED `i` is at `led_base + i`.
    pub led_base: u32,
    pub led_count: u8,
    pub btn0_offset: u32,
    pub btn1_offset: u32,
    pub leds_active_low: bool,
    /// Buttons pull the line low when pressed.
    pub btns_active_low: bool,
}

impl GpioConfig {
    /// Eight active-high LEDs at 0..8, buttons at 8 and 9.
    pub fn new(chip: impl Into<String>) -> Self {
        Self {
            chip: chip.into(),
            led_base: 0,
            led_count: MAX_LEDS,
            btn0_offset: 8,
            btn1_offset: 9,
            leds_active_low: false,
            btns_active_low: false,
        }
    }

    /// LED line offsets; `None` if the bank runs past the last offset.
    fn led_offsets(&self) -> Option<Vec<u32>> {
        (0..u32::from(self.led_count))
            .map(|i| self.led_base.checked_add(i))
            .collect()
    }
}

/// A set of requested lines, addressed by position in the request.
///
/// Bit `i` of a value corresponds to the `i`-th requested offset.
pub trait LineGroup: Send + Sync {
    fn set_values(&self, bits: u64) -> Result<()>;
    fn get_values(&self) -> Result<u64>;
}

/// A GPIO controller that hands out [`LineGroup`]s.
///
/// Failing to open the chip is [`Error::BusUnavailable`]; failing to request
/// lines is [`Error::Config`]. Lines are released when their group drops.
pub trait GpioChip: Send + Sync + Sized {
    type Lines: LineGroup;

    fn open(chip: &str) -> Result<Self>;

    fn request_outputs(
        &self,
        offsets: &[u32],
        initial: u64,
        consumer: &str,
    ) -> Result<Self::Lines>;

    fn request_inputs(&self, offsets: &[u32], consumer: &str) -> Result<Self::Lines>;
}

/// Open LED bank plus buttons.
pub struct Gpio<C: GpioChip> {
    chip_name: String,
    led_mask: u8,
    leds_active_low: bool,
    btns_active_low: bool,
    leds: C::Lines,
    buttons: C::Lines,
    // Dropped last so the line requests go first.
    _chip: C,
}

impl<C: GpioChip> Gpio<C> {
    /// Open the chip named in `config` and request its lines.
    pub fn open(config: &GpioConfig) -> Result<Self> {
        validate(config)?;
        let chip = C::open(&config.chip)?;
        Self::request(config, chip)
    }

    /// Request lines from an already-open chip.
    pub fn with_chip(config: &GpioConfig, chip: C) -> Result<Self> {
        validate(config)?;
        Self::request(config, chip)
    }

    fn request(config: &GpioConfig, chip: C) -> Result<Self> {
        let led_mask = mask(config.led_count);
        // LEDs start logically off.
        let initial = if config.leds_active_low {
            u64::from(led_mask)
        } else {
            0
        };
        let offsets = config
            .led_offsets()
            .ok_or_else(|| Error::invalid("LED bank overflows the line offset range"))?;
        let leds = chip.request_outputs(&offsets, initial, LED_CONSUMER)?;
        let buttons = chip.request_inputs(
            &[config.btn0_offset, config.btn1_offset],
            BTN_CONSUMER,
        )?;

        info!(
            chip = %config.chip,
            led_base = config.led_base,
            led_count = config.led_count,
            btn0 = config.btn0_offset,
            btn1 = config.btn1_offset,
            "GPIO lines requested"
        );

        Ok(Self {
            chip_name: config.chip.clone(),
            led_mask,
            leds_active_low: config.leds_active_low,
            btns_active_low: config.btns_active_low,
            leds,
            buttons,
            _chip: chip,
        })
    }

    pub fn chip_name(&self) -> &str {
        &self.chip_name
    }

    pub fn led_count(&self) -> u8 {
        self.led_mask.count_ones() as u8
    }

    /// Release every line. Equivalent to dropping.
    pub fn close(self) {}
}

impl<C: GpioChip> Drop for Gpio<C> {
    fn drop(&mut self) {
        debug!(chip = %self.chip_name, "GPIO lines released");
    }
}

impl<C: GpioChip> hw_trait::Gpio for Gpio<C> {
    fn write_leds(&self, value: u8) -> Result<()> {
        let mut raw = value & self.led_mask;
        if self.leds_active_low {
            raw ^= self.led_mask;
        }
        trace!(chip = %self.chip_name, value, raw, "Write LEDs");
        self.leds.set_values(u64::from(raw))
    }

    fn read_buttons(&self) -> Result<u8> {
        // Only the low two bits can be set; the truncation is exact.
        let mut bits = (self.buttons.get_values()? as u8) & BTN_MASK;
        if self.btns_active_low {
            bits ^= BTN_MASK;
        }
        Ok(bits)
    }
}

fn validate(config: &GpioConfig) -> Result<()> {
    if config.chip.is_empty() {
        return Err(Error::invalid("empty GPIO chip name"));
    }
    if config.led_count == 0 || config.led_count > MAX_LEDS {
        return Err(Error::invalid(format!(
            "LED count {} outside 1..={}",
            config.led_count, MAX_LEDS
        )));
    }
    if config.led_offsets().is_none() {
        return Err(Error::invalid(format!(
            "LED base {} plus {} lines overflows the line offset range",
            config.led_base, config.led_count
        )));
    }
    Ok(())
}

fn mask(count: u8) -> u8 {
    ((1u16 << count) - 1) as u8
}
