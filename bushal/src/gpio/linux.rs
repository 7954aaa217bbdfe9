//! Linux GPIO character-device backend.
//!
//! Built on [`gpio_cdev`]. Each bank is one multi-line request; bulk reads
//! and writes go through its `MultiLineHandle`. Dropping the handle releases
//! the lines.

use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use gpio_cdev::{Chip, LineRequestFlags, MultiLineHandle};

use super::{GpioChip, LineGroup};
use crate::error::{Error, Result};
use crate::tracing::prelude::*;

/// Resolve `gpiochip0` to `/dev/gpiochip0`; paths pass through.
fn chip_path(chip: &str) -> PathBuf {
    if chip.starts_with('/') {
        PathBuf::from(chip)
    } else {
        PathBuf::from("/dev").join(chip)
    }
}

/// Line levels in request order, one byte per line, from bit `i` of `bits`.
fn to_levels(bits: u64, count: usize) -> Vec<u8> {
    (0..count).map(|i| ((bits >> i) & 1) as u8).collect()
}

/// Fold per-line levels back into bits.
fn from_levels(levels: &[u8]) -> u64 {
    levels
        .iter()
        .enumerate()
        .fold(0, |acc, (i, &level)| acc | (u64::from(level != 0) << i))
}

/// An open `/dev/gpiochipN`.
pub struct LinuxChip {
    // gpio-cdev hands out lines through `&mut Chip`.
    chip: Mutex<Chip>,
    name: String,
}

impl LinuxChip {
    fn request(
        &self,
        offsets: &[u32],
        flags: LineRequestFlags,
        initial: u64,
        consumer: &str,
    ) -> Result<LinuxLines> {
        let mut chip = self.chip.lock().unwrap_or_else(PoisonError::into_inner);
        let defaults = to_levels(initial, offsets.len());
        let handle = chip
            .get_lines(offsets)
            .and_then(|lines| lines.request(flags, &defaults, consumer))
            .map_err(|e| {
                warn!(chip = %self.name, ?offsets, error = %e, "GPIO line request failed");
                Error::Config(format!(
                    "request for lines {:?} on {}: {}",
                    offsets, self.name, e
                ))
            })?;
        Ok(LinuxLines {
            handle,
            count: offsets.len(),
        })
    }
}

impl GpioChip for LinuxChip {
    type Lines = LinuxLines;

    fn open(chip: &str) -> Result<Self> {
        let path = chip_path(chip);
        let handle = Chip::new(&path).map_err(|e| {
            warn!(chip, path = %path.display(), error = %e, "Failed to open GPIO chip");
            Error::unavailable(chip, io::Error::other(e))
        })?;
        debug!(chip, lines = handle.num_lines(), "GPIO chip opened");
        Ok(Self {
            chip: Mutex::new(handle),
            name: chip.to_string(),
        })
    }

    fn request_outputs(
        &self,
        offsets: &[u32],
        initial: u64,
        consumer: &str,
    ) -> Result<LinuxLines> {
        self.request(offsets, LineRequestFlags::OUTPUT, initial, consumer)
    }

    fn request_inputs(&self, offsets: &[u32], consumer: &str) -> Result<LinuxLines> {
        self.request(offsets, LineRequestFlags::INPUT, 0, consumer)
    }
}

/// A held multi-line request.
pub struct LinuxLines {
    handle: MultiLineHandle,
    count: usize,
}

impl LineGroup for LinuxLines {
    fn set_values(&self, bits: u64) -> Result<()> {
        let levels = to_levels(bits, self.count);
        self.handle.set_values(&levels).map_err(|e| {
            debug!(error = %e, "GPIO set values failed");
            Error::Io(io::Error::other(e))
        })
    }

    fn get_values(&self) -> Result<u64> {
        let levels = self.handle.get_values().map_err(|e| {
            debug!(error = %e, "GPIO get values failed");
            Error::Io(io::Error::other(e))
        })?;
        Ok(from_levels(&levels))
    }
}
