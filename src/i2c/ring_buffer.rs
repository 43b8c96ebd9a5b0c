// Licensed under the Apache-2.0 license

//! Fixed-capacity byte FIFO between the interrupt handler and the reader.
//!
//! There is no internal locking. The producer (interrupt context) only calls
//! [`RingBuffer::put`], the consumer (task context) only calls
//! [`RingBuffer::get`], and the owner serializes the two by masking
//! interrupts around the consumer side.

/// The buffer had no room; the byte was not stored.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Full;

/// The buffer holds no bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Empty;

pub struct RingBuffer<const N: usize> {
    storage: [u8; N],
    head: usize,
    count: usize,
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RingBuffer<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            storage: [0; N],
            head: 0,
            count: 0,
        }
    }

    /// Drop all buffered bytes.
    pub fn reset(&mut self) {
        self.head = 0;
        self.count = 0;
    }

    /// # Errors
    ///
    /// [`Full`] when `N` bytes are already buffered. The byte is dropped.
    pub fn put(&mut self, byte: u8) -> Result<(), Full> {
        if self.count >= N {
            return Err(Full);
        }
        let tail = (self.head + self.count) % N;
        let slot = self.storage.get_mut(tail).ok_or(Full)?;
        *slot = byte;
        self.count += 1;
        Ok(())
    }

    /// # Errors
    ///
    /// [`Empty`] when nothing is buffered.
    pub fn get(&mut self) -> Result<u8, Empty> {
        if self.count == 0 {
            return Err(Empty);
        }
        let byte = *self.storage.get(self.head).ok_or(Empty)?;
        self.head = (self.head + 1) % N;
        self.count -= 1;
        Ok(byte)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }
}
