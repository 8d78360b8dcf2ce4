//! Sample ring between a blocking writer and the device callback.
//!
//! Single producer (the host's write path), single consumer (the cpal
//! callback). Samples are stored as `f32` bit patterns in atomics so the
//! ring needs no unsafe code.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

pub struct SampleRing {
    slots: Box<[AtomicU32]>,
    read_pos: AtomicUsize,
    write_pos: AtomicUsize,
    /// Power of two.
    capacity: usize,
    mask: usize,
}

impl SampleRing {
    /// Capacity is rounded up to the next power of two.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let slots = (0..capacity).map(|_| AtomicU32::new(0)).collect();

        Self {
            slots,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
            capacity,
            mask: capacity - 1,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples waiting to be read.
    pub fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    pub fn free(&self) -> usize {
        self.capacity - self.available()
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Producer side. Returns how many samples fit.
    pub fn write(&self, samples: &[f32]) -> usize {
        let write_pos = self.write_pos.load(Ordering::Relaxed);
        let read_pos = self.read_pos.load(Ordering::Acquire);
        let space = self.capacity - write_pos.wrapping_sub(read_pos);
        let count = samples.len().min(space);

        for (offset, sample) in samples[..count].iter().enumerate() {
            let slot = write_pos.wrapping_add(offset) & self.mask;
            self.slots[slot].store(sample.to_bits(), Ordering::Relaxed);
        }

        self.write_pos
            .store(write_pos.wrapping_add(count), Ordering::Release);
        count
    }

    /// Consumer side. Returns how many samples were copied into `output`.
    pub fn read(&self, output: &mut [f32]) -> usize {
        let read_pos = self.read_pos.load(Ordering::Relaxed);
        let write_pos = self.write_pos.load(Ordering::Acquire);
        let count = output.len().min(write_pos.wrapping_sub(read_pos));

        for (offset, sample) in output[..count].iter_mut().enumerate() {
            let slot = read_pos.wrapping_add(offset) & self.mask;
            *sample = f32::from_bits(self.slots[slot].load(Ordering::Relaxed));
        }

        self.read_pos
            .store(read_pos.wrapping_add(count), Ordering::Release);
        count
    }

    /// Discards everything not yet read.
    pub fn clear(&self) {
        let write_pos = self.write_pos.load(Ordering::Acquire);
        self.read_pos.store(write_pos, Ordering::Release);
    }
}
