//! Register reads on a bus shared between threads.
//!
//! A register read is a select, an index write, and a read. If another
//! thread can slip its own index write in between, the first thread gets
//! the wrong register's data. The handle holds its lock across the whole
//! sequence; the per-step variant below shows what that prevents.

use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use bushal::hw_trait::I2c;
use bushal::i2c::{I2cBackend, I2cBus, I2cConfig};
use bushal::Result;

const DEVICE: u8 = 0x50;

/// Value a register index maps to.
fn response(reg: u8) -> u8 {
    reg.wrapping_mul(7) ^ 0x5a
}

/// Device with a register pointer: an index write moves it, a read returns
/// the pointed-to register.
#[derive(Default)]
struct PointerDevice {
    pointer: u8,
}

impl I2cBackend for PointerDevice {
    fn open(_config: &I2cConfig) -> Result<Self> {
        Ok(Self::default())
    }

    fn select(&mut self, _addr: u8) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        if let Some(&reg) = data.first() {
            self.pointer = reg;
        }
        thread::yield_now();
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        buf.fill(response(self.pointer));
        Ok(())
    }
}

/// Takes the lock separately for each step, with a hook between the index
/// write and the read.
struct PerStepLocked {
    backend: Mutex<PointerDevice>,
}

impl PerStepLocked {
    fn read_register_u8(&self, reg: u8, between: impl FnOnce()) -> u8 {
        self.backend.lock().unwrap().select(DEVICE).unwrap();
        self.backend.lock().unwrap().write(&[reg]).unwrap();
        between();
        let mut buf = [0u8; 1];
        self.backend.lock().unwrap().read(&mut buf).unwrap();
        buf[0]
    }
}

#[test]
fn per_step_locking_lets_reads_interleave() {
    let bus = Arc::new(PerStepLocked {
        backend: Mutex::new(PointerDevice::default()),
    });
    let barrier = Arc::new(Barrier::new(2));

    // A writes its index, B writes its own, then both read.
    let a = {
        let (bus, barrier) = (Arc::clone(&bus), Arc::clone(&barrier));
        thread::spawn(move || {
            bus.read_register_u8(0x01, || {
                barrier.wait();
                barrier.wait();
            })
        })
    };
    let b = {
        let (bus, barrier) = (Arc::clone(&bus), Arc::clone(&barrier));
        thread::spawn(move || {
            barrier.wait();
            bus.read_register_u8(0x02, || {
                barrier.wait();
            })
        })
    };

    let seen_by_a = a.join().unwrap();
    let seen_by_b = b.join().unwrap();
    assert_eq!(seen_by_b, response(0x02));
    assert_eq!(
        seen_by_a,
        response(0x02),
        "A reads the register B selected"
    );
}

#[test]
fn shared_handle_never_mixes_responses() {
    let config = I2cConfig::new("pointer-bus");
    let bus = Arc::new(I2cBus::from_backend(&config, PointerDevice::default()));

    let workers: Vec<_> = (0u8..4)
        .map(|id| {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                for i in 0..2_000u32 {
                    let reg = id.wrapping_mul(64).wrapping_add((i % 64) as u8);
                    let value = bus.read_register_u8(DEVICE, reg).unwrap();
                    assert_eq!(value, response(reg), "thread {} reg {:#04x}", id, reg);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn drivers_share_one_bus() {
    let config = I2cConfig::new("pointer-bus");
    let bus = I2cBus::from_backend(&config, PointerDevice::default());

    thread::scope(|s| {
        for reg in [0x10u8, 0x20, 0x30] {
            let bus = &bus;
            s.spawn(move || {
                for _ in 0..500 {
                    let mut buf = [0u8; 2];
                    bus.read_register(DEVICE, reg, &mut buf).unwrap();
                    assert_eq!(buf, [response(reg); 2]);
                }
            });
        }
    });
}
