//! In-memory UART whose TX is wired to its RX.
//!
//! A [`UartPeer`] stands in for the far end of the cable: it can inject
//! bytes into the receive queue and inspect everything written.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{FlushTarget, UartBackend, UartConfig};
use crate::error::Result;

#[derive(Default)]
struct Wire {
    rx: VecDeque<u8>,
    written: Vec<u8>,
}

#[derive(Default)]
struct Shared {
    wire: Mutex<Wire>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Wire> {
        self.wire.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Default)]
pub struct LoopbackUart {
    shared: Arc<Shared>,
}

impl LoopbackUart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer(&self) -> UartPeer {
        UartPeer {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl UartBackend for LoopbackUart {
    fn open(_config: &UartConfig) -> Result<Self> {
        Ok(Self::new())
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut wire = self.shared.lock();
        wire.written.extend_from_slice(data);
        wire.rx.extend(data);
        self.shared.ready.notify_all();
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<usize> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut wire = self.shared.lock();
        while wire.rx.is_empty() {
            wire = match deadline {
                None => self
                    .shared
                    .ready
                    .wait(wire)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(0);
                    }
                    self.shared
                        .ready
                        .wait_timeout(wire, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        let n = buf.len().min(wire.rx.len());
        for (slot, byte) in buf.iter_mut().zip(wire.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn flush(&mut self, target: FlushTarget) -> Result<()> {
        // Writes complete immediately, so only input can be pending.
        if matches!(target, FlushTarget::Input | FlushTarget::Both) {
            self.shared.lock().rx.clear();
        }
        Ok(())
    }
}

/// The far end of a [`LoopbackUart`].
#[derive(Clone)]
pub struct UartPeer {
    shared: Arc<Shared>,
}

impl UartPeer {
    /// Queue bytes for the port to receive.
    pub fn inject(&self, bytes: &[u8]) {
        self.shared.lock().rx.extend(bytes);
        self.shared.ready.notify_all();
    }

    /// Everything the port has transmitted so far.
    pub fn written(&self) -> Vec<u8> {
        self.shared.lock().written.clone()
    }

    pub fn pending(&self) -> usize {
        self.shared.lock().rx.len()
    }
}
