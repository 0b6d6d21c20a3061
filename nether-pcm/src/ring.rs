//! Fixed-capacity ring of packet indices
//!
//! Classic head/tail circular queue with one reserved sentinel slot so that
//! "full" and "empty" can be told apart without a separate counter. The ring
//! has no synchronization of its own; [`PacketFifo`](crate::PacketFifo)
//! guards both of its rings with a single mutex.

/// Circular FIFO of small integers (packet indices)
#[derive(Debug, Clone)]
pub struct IndexRing {
    /// Backing storage, `max_values + 1` slots
    slots: Box<[usize]>,
    /// Next slot to write
    head: usize,
    /// Next slot to read
    tail: usize,
}

impl IndexRing {
    /// Create a ring able to hold up to `max_values` indices
    pub fn new(max_values: usize) -> Self {
        Self {
            slots: vec![0; max_values + 1].into_boxed_slice(),
            head: 0,
            tail: 0,
        }
    }

    /// Number of slots, including the sentinel
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of queued indices
    #[inline]
    pub fn count(&self) -> usize {
        (self.head + self.capacity() - self.tail) % self.capacity()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.count() == self.capacity() - 1
    }

    /// Append `value` at the head.
    ///
    /// # Panics
    ///
    /// Panics if the ring is full. Callers account for every index they own,
    /// so an overflow means the bookkeeping is broken.
    #[inline]
    pub fn enqueue(&mut self, value: usize) {
        assert!(!self.is_full(), "index ring overflow");
        self.slots[self.head] = value;
        self.head = (self.head + 1) % self.capacity();
    }

    /// Remove and return the oldest index.
    ///
    /// # Panics
    ///
    /// Panics if the ring is empty.
    #[inline]
    pub fn dequeue(&mut self) -> usize {
        assert!(!self.is_empty(), "index ring underflow");
        let value = self.slots[self.tail];
        self.tail = (self.tail + 1) % self.capacity();
        value
    }
}
