//! Linux spidev backend.
//!
//! Built on the [`spidev`] crate. Settings go through [`SpidevOptions`]; a
//! message is one `transfer_multiple` call, so the kernel keeps chip select
//! asserted across all of its transfers.

use std::os::fd::AsRawFd;

use spidev::{spidevioctl, SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};

use super::{BitOrder, Segment, SpiBackend, SpiConfig, SpiMode, SpiSettings};
use crate::error::{Error, Result};
use crate::tracing::prelude::*;

fn mode_flags(mode: SpiMode) -> SpiModeFlags {
    match mode {
        SpiMode::Mode0 => SpiModeFlags::SPI_MODE_0,
        SpiMode::Mode1 => SpiModeFlags::SPI_MODE_1,
        SpiMode::Mode2 => SpiModeFlags::SPI_MODE_2,
        SpiMode::Mode3 => SpiModeFlags::SPI_MODE_3,
    }
}

fn options(config: &SpiConfig) -> SpidevOptions {
    SpidevOptions::new()
        .mode(mode_flags(config.mode))
        .lsb_first(config.bit_order == BitOrder::LsbFirst)
        .bits_per_word(config.bits_per_word)
        .max_speed_hz(config.max_speed_hz)
        .build()
}

/// Backend for a `/dev/spidev*` node.
pub struct LinuxSpi {
    spi: Spidev,
    device: String,
}

impl SpiBackend for LinuxSpi {
    fn open(config: &SpiConfig) -> Result<Self> {
        let mut spi = Spidev::open(&config.device).map_err(|e| {
            warn!(device = %config.device, error = %e, "Failed to open SPI device");
            Error::unavailable(&config.device, e)
        })?;

        // On failure `spi` drops here, closing the fd.
        spi.configure(&options(config)).map_err(|e| {
            warn!(device = %config.device, error = %e, "Failed to configure SPI device");
            Error::unavailable(&config.device, e)
        })?;

        Ok(Self {
            spi,
            device: config.device.clone(),
        })
    }

    fn transfer(&mut self, segments: &mut [Segment<'_>], settings: &SpiSettings) -> Result<()> {
        let mut xfers = Vec::with_capacity(segments.len());
        for segment in segments.iter_mut() {
            if u32::try_from(segment.tx.len()).is_err() {
                return Err(Error::invalid("SPI segment too long"));
            }
            let mut xfer = match segment.rx.as_deref_mut() {
                Some(rx) if rx.len() == segment.tx.len() => {
                    SpidevTransfer::read_write(segment.tx, rx)
                }
                Some(_) => return Err(Error::invalid("SPI rx/tx length mismatch")),
                None => SpidevTransfer::write(segment.tx),
            };
            xfer.speed_hz = settings.speed_hz;
            xfer.bits_per_word = settings.bits_per_word;
            xfer.cs_change = segment.cs_change.into();
            xfers.push(xfer);
        }

        self.spi.transfer_multiple(&mut xfers).map_err(|e| {
            warn!(device = %self.device, error = %e, "SPI message failed");
            Error::Io(e)
        })
    }

    fn set_speed(&mut self, hz: u32) -> Result<()> {
        let options = SpidevOptions::new().max_speed_hz(hz).build();
        self.spi.configure(&options).map_err(|e| {
            warn!(device = %self.device, speed_hz = hz, error = %e, "SPI speed rejected");
            Error::unavailable(&self.device, e)
        })
    }

    fn read_mode(&mut self) -> Result<(SpiMode, BitOrder)> {
        let fd = self.spi.as_raw_fd();
        let mode = spidevioctl::get_mode(fd)?;
        let order = if spidevioctl::get_lsb_first(fd)? != 0 {
            BitOrder::LsbFirst
        } else {
            BitOrder::MsbFirst
        };
        Ok((SpiMode::try_from((mode & 0x03) as u8)?, order))
    }

    fn read_bits_per_word(&mut self) -> Result<u8> {
        let bits = spidevioctl::get_bits_per_word(self.spi.as_raw_fd())?;
        // The kernel reports 0 for the default of 8.
        Ok(if bits == 0 { 8 } else { bits })
    }

    fn read_speed_hz(&mut self) -> Result<u32> {
        Ok(spidevioctl::get_max_speed_hz(self.spi.as_raw_fd())?)
    }
}
