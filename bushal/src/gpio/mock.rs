//! In-memory GPIO chip.
//!
//! Holds 64 line levels. Output requests drive them; input requests sample
//! them. A [`LineProbe`] gives tests the other side of the wire: read what
//! the LEDs were driven to, or pull a button line.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{GpioChip, LineGroup};
use crate::error::{Error, Result};
use crate::tracing::prelude::*;

/// Lines per mock chip.
pub const MOCK_LINES: u32 = 64;

#[derive(Default)]
struct Lines {
    levels: u64,
    requested: u64,
    fail_io: bool,
}

type Shared = Arc<Mutex<Lines>>;

fn lock(shared: &Shared) -> MutexGuard<'_, Lines> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock GPIO controller.
#[derive(Default)]
pub struct MockChip {
    shared: Shared,
}

impl MockChip {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> LineProbe {
        LineProbe {
            shared: Arc::clone(&self.shared),
        }
    }

    fn request(&self, offsets: &[u32], output: bool) -> Result<MockLines> {
        let mut lines = lock(&self.shared);
        let mut claim = 0u64;
        for &offset in offsets {
            if offset >= MOCK_LINES {
                return Err(Error::Config(format!("line {} out of range", offset)));
            }
            let bit = 1u64 << offset;
            if (lines.requested | claim) & bit != 0 {
                return Err(Error::Config(format!("line {} busy", offset)));
            }
            claim |= bit;
        }
        lines.requested |= claim;
        Ok(MockLines {
            shared: Arc::clone(&self.shared),
            offsets: offsets.to_vec(),
            output,
        })
    }
}

impl GpioChip for MockChip {
    type Lines = MockLines;

    fn open(chip: &str) -> Result<Self> {
        debug!(chip, "Mock GPIO chip opened");
        Ok(Self::new())
    }

    fn request_outputs(
        &self,
        offsets: &[u32],
        initial: u64,
        _consumer: &str,
    ) -> Result<MockLines> {
        let group = self.request(offsets, true)?;
        group.set_values(initial)?;
        Ok(group)
    }

    fn request_inputs(&self, offsets: &[u32], _consumer: &str) -> Result<MockLines> {
        self.request(offsets, false)
    }
}

/// Lines requested from a [`MockChip`].
pub struct MockLines {
    shared: Shared,
    offsets: Vec<u32>,
    output: bool,
}

impl LineGroup for MockLines {
    fn set_values(&self, bits: u64) -> Result<()> {
        let mut lines = lock(&self.shared);
        if lines.fail_io {
            return Err(Error::Io(io::Error::other("injected GPIO failure")));
        }
        if !self.output {
            return Err(Error::Io(io::Error::from(io::ErrorKind::PermissionDenied)));
        }
        for (i, &offset) in self.offsets.iter().enumerate() {
            let bit = 1u64 << offset;
            if bits & (1 << i) != 0 {
                lines.levels |= bit;
            } else {
                lines.levels &= !bit;
            }
        }
        Ok(())
    }

    fn get_values(&self) -> Result<u64> {
        let lines = lock(&self.shared);
        if lines.fail_io {
            return Err(Error::Io(io::Error::other("injected GPIO failure")));
        }
        let mut bits = 0u64;
        for (i, &offset) in self.offsets.iter().enumerate() {
            if lines.levels & (1u64 << offset) != 0 {
                bits |= 1 << i;
            }
        }
        Ok(bits)
    }
}

impl Drop for MockLines {
    fn drop(&mut self) {
        let mut lines = lock(&self.shared);
        for &offset in &self.offsets {
            lines.requested &= !(1u64 << offset);
        }
    }
}

/// Test access to a [`MockChip`]'s physical line levels.
#[derive(Clone)]
pub struct LineProbe {
    shared: Shared,
}

impl LineProbe {
    /// Physical level of `offset` (true = high).
    pub fn level(&self, offset: u32) -> bool {
        lock(&self.shared).levels & (1u64 << offset) != 0
    }

    /// Drive `offset` from outside, as a button would.
    pub fn set_level(&self, offset: u32, high: bool) {
        let mut lines = lock(&self.shared);
        if high {
            lines.levels |= 1u64 << offset;
        } else {
            lines.levels &= !(1u64 << offset);
        }
    }

    pub fn is_requested(&self, offset: u32) -> bool {
        lock(&self.shared).requested & (1u64 << offset) != 0
    }

    /// Make every bulk access fail until cleared.
    pub fn fail_io(&self, fail: bool) {
        lock(&self.shared).fail_io = fail;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_follow_request_order() {
        let chip = MockChip::new();
        let probe = chip.probe();
        let lines = chip.request_outputs(&[5, 2, 7], 0, "t").unwrap();
        lines.set_values(0b101).unwrap();
        assert!(probe.level(5));
        assert!(!probe.level(2));
        assert!(probe.level(7));
        assert_eq!(lines.get_values().unwrap(), 0b101);
    }

    #[test]
    fn out_of_range_line_is_config_error() {
        let chip = MockChip::new();
        assert!(matches!(
            chip.request_inputs(&[MOCK_LINES], "t"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn inputs_cannot_be_driven() {
        let chip = MockChip::new();
        let lines = chip.request_inputs(&[0], "t").unwrap();
        assert!(matches!(lines.set_values(1), Err(Error::Io(_))));
    }

    #[test]
    fn failed_request_claims_nothing() {
        let chip = MockChip::new();
        let probe = chip.probe();
        let _held = chip.request_inputs(&[3], "t").unwrap();
        assert!(chip.request_outputs(&[1, 2, 3], 0, "t").is_err());
        assert!(!probe.is_requested(1));
        assert!(!probe.is_requested(2));
    }
}
