//! Recording SPI backend for tests.
//!
//! Every message is logged segment by segment. Received bytes come from a
//! queue of scripted MISO bytes; once the queue is empty the backend loops
//! transmitted bytes back.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{BitOrder, Segment, SpiBackend, SpiConfig, SpiMode, SpiSettings};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSegment {
    pub tx: Vec<u8>,
    /// Length of the receive buffer, if the caller wanted the bytes.
    pub rx_len: Option<usize>,
    pub cs_change: bool,
    pub speed_hz: u32,
    pub bits_per_word: u8,
}

/// One chip-select framed message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordedMessage {
    pub segments: Vec<RecordedSegment>,
}

impl RecordedMessage {
    /// Whether chip select stays asserted after the message.
    pub fn holds_cs(&self) -> bool {
        self.segments.last().is_some_and(|s| s.cs_change)
    }
}

#[derive(Default)]
struct Shared {
    messages: Vec<RecordedMessage>,
    miso: VecDeque<u8>,
    speed_override: Option<u32>,
    fail_transfers: bool,
    chip_select: Vec<bool>,
}

/// Test-side handle onto a [`RecordingSpi`]'s log.
#[derive(Clone, Default)]
pub struct SpiRecorder {
    shared: Arc<Mutex<Shared>>,
}

impl SpiRecorder {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn messages(&self) -> Vec<RecordedMessage> {
        self.lock().messages.clone()
    }

    /// Total segments across all messages.
    pub fn operation_count(&self) -> usize {
        self.lock().messages.iter().map(|m| m.segments.len()).sum()
    }

    /// Queue bytes the device will shift out next.
    pub fn push_miso(&self, bytes: &[u8]) {
        self.lock().miso.extend(bytes);
    }

    /// Report `hz` on readback regardless of what was set.
    pub fn override_speed(&self, hz: u32) {
        self.lock().speed_override = Some(hz);
    }

    pub fn fail_transfers(&self, fail: bool) {
        self.lock().fail_transfers = fail;
    }

    /// Chip-select levels requested through `assert_chip_select`.
    pub fn chip_select_history(&self) -> Vec<bool> {
        self.lock().chip_select.clone()
    }

    pub fn clear(&self) {
        self.lock().messages.clear();
    }
}

/// SPI backend that records instead of driving hardware.
#[derive(Default)]
pub struct RecordingSpi {
    recorder: SpiRecorder,
    settings: Option<SpiSettings>,
}

impl RecordingSpi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorder(&self) -> SpiRecorder {
        self.recorder.clone()
    }
}

impl SpiBackend for RecordingSpi {
    fn open(config: &SpiConfig) -> Result<Self> {
        Ok(Self {
            recorder: SpiRecorder::default(),
            settings: Some(config.settings()),
        })
    }

    fn transfer(&mut self, segments: &mut [Segment<'_>], settings: &SpiSettings) -> Result<()> {
        let mut shared = self.recorder.lock();
        if shared.fail_transfers {
            return Err(Error::Io(std::io::Error::other("injected SPI failure")));
        }
        self.settings = Some(*settings);

        let mut message = RecordedMessage::default();
        for segment in segments.iter_mut() {
            let tx = segment.tx;
            let mut clocked = Vec::with_capacity(tx.len());
            for &byte in tx {
                clocked.push(shared.miso.pop_front().unwrap_or(byte));
            }
            let rx_len = segment.rx.as_deref_mut().map(|rx| {
                let n = rx.len().min(clocked.len());
                rx[..n].copy_from_slice(&clocked[..n]);
                rx.len()
            });
            message.segments.push(RecordedSegment {
                tx: tx.to_vec(),
                rx_len,
                cs_change: segment.cs_change,
                speed_hz: settings.speed_hz,
                bits_per_word: settings.bits_per_word,
            });
        }
        shared.messages.push(message);
        Ok(())
    }

    fn set_speed(&mut self, hz: u32) -> Result<()> {
        if let Some(settings) = self.settings.as_mut() {
            settings.speed_hz = hz;
        }
        Ok(())
    }

    fn read_mode(&mut self) -> Result<(SpiMode, BitOrder)> {
        self.settings
            .map(|s| (s.mode, s.bit_order))
            .ok_or_else(|| Error::Config("mode not reported".into()))
    }

    fn read_bits_per_word(&mut self) -> Result<u8> {
        self.settings
            .map(|s| s.bits_per_word)
            .ok_or_else(|| Error::Config("word size not reported".into()))
    }

    fn read_speed_hz(&mut self) -> Result<u32> {
        if let Some(hz) = self.recorder.lock().speed_override {
            return Ok(hz);
        }
        self.settings
            .map(|s| s.speed_hz)
            .ok_or_else(|| Error::Config("speed not reported".into()))
    }

    fn assert_chip_select(&mut self, active: bool) -> Result<()> {
        self.recorder.lock().chip_select.push(active);
        Ok(())
    }
}
