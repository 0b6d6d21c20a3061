//! Packet FIFO between a producer and the real-time fill thread
//!
//! A fixed pool of equally sized byte packets circulates between two index
//! rings:
//!
//! ```text
//!              write()                           read()
//! Producer ──► [in-flight packet] ──► read queue ──► destination buffer
//!                    ▲                                    │
//!                    └──────────── write queue ◄──────────┘
//! ```
//!
//! Every packet index lives in exactly one place at a time: the write queue,
//! the read queue, or the producer's in-flight slot. Reads are all-or-nothing
//! so the consumer never receives a buffer that is part audio, part garbage;
//! on a miss it is expected to fill silence instead.
//!
//! Locking: `writer` serializes producers and owns the in-flight packet,
//! `state` guards both rings and the pool. Lock order is always
//! `writer` then `state`. Payload is copied into the in-flight packet
//! outside the `state` lock; reads copy under it, bounded by the packet size.

use std::mem;
use std::sync::Mutex;

use crate::lock_or_recover;
use crate::ring::IndexRing;

#[cfg(test)]
mod tests;

/// Thread-safe fixed-pool packet queue
#[derive(Debug)]
pub struct PacketFifo {
    packet_size: usize,
    num_packets: usize,
    writer: Mutex<WriteCursor>,
    state: Mutex<FifoState>,
}

/// Producer-side state: the packet currently being filled, if any
#[derive(Debug, Default)]
struct WriteCursor {
    packet: Option<InFlightPacket>,
}

/// A packet taken out of the pool while the producer fills it
#[derive(Debug)]
struct InFlightPacket {
    index: usize,
    data: Box<[u8]>,
    offset: usize,
}

#[derive(Debug)]
struct FifoState {
    /// False after shutdown; reads and writes become no-ops
    valid: bool,
    /// Packet storage indexed by packet index. The in-flight packet's slot
    /// holds an empty box until it is returned.
    packets: Vec<Box<[u8]>>,
    /// Packets free to be filled
    write_queue: IndexRing,
    /// Filled packets awaiting the consumer
    read_queue: IndexRing,
}

/// Where the packets currently are
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FifoOccupancy {
    /// Packets free to be filled
    pub write_queued: usize,
    /// Filled packets awaiting the consumer
    pub read_queued: usize,
    /// Whether the producer holds a partially filled packet
    pub in_flight: bool,
}

impl FifoOccupancy {
    /// Total packets accounted for; equals `num_packets` while the FIFO is valid
    pub fn total(&self) -> usize {
        self.write_queued + self.read_queued + usize::from(self.in_flight)
    }
}

impl PacketFifo {
    /// Allocate `num_packets` packets of `packet_size` bytes, all free.
    ///
    /// # Panics
    ///
    /// Panics if either size is zero.
    pub fn new(packet_size: usize, num_packets: usize) -> Self {
        assert!(packet_size > 0, "packet size must be non-zero");
        assert!(num_packets > 0, "packet count must be non-zero");

        let packets = (0..num_packets)
            .map(|_| vec![0u8; packet_size].into_boxed_slice())
            .collect();

        let mut write_queue = IndexRing::new(num_packets);
        for index in 0..num_packets {
            write_queue.enqueue(index);
        }

        Self {
            packet_size,
            num_packets,
            writer: Mutex::new(WriteCursor::default()),
            state: Mutex::new(FifoState {
                valid: true,
                packets,
                write_queue,
                read_queue: IndexRing::new(num_packets),
            }),
        }
    }

    /// Size of one packet in bytes
    #[inline]
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Number of packets in the pool
    #[inline]
    pub fn num_packets(&self) -> usize {
        self.num_packets
    }

    /// Whether the FIFO is still accepting reads and writes
    pub fn is_valid(&self) -> bool {
        lock_or_recover(&self.state).valid
    }

    /// Append `src` to the stream, packetizing as it goes.
    ///
    /// Returns the number of bytes accepted. Fewer than `src.len()` means the
    /// write queue ran dry; the caller should retry the remainder later.
    /// Never blocks on the consumer. Returns 0 after [`shutdown`](Self::shutdown).
    pub fn write(&self, src: &[u8]) -> usize {
        let mut cursor = lock_or_recover(&self.writer);

        // shutdown takes the writer lock first, so validity cannot change
        // for the rest of this call
        if !lock_or_recover(&self.state).valid {
            return 0;
        }

        let mut remaining = src;
        while !remaining.is_empty() {
            if cursor.packet.is_none() {
                let mut state = lock_or_recover(&self.state);
                if state.write_queue.is_empty() {
                    break;
                }
                let index = state.write_queue.dequeue();
                let data = mem::take(&mut state.packets[index]);
                cursor.packet = Some(InFlightPacket {
                    index,
                    data,
                    offset: 0,
                });
            }

            let Some(packet) = cursor.packet.as_mut() else {
                break;
            };

            let to_copy = remaining.len().min(self.packet_size - packet.offset);
            packet.data[packet.offset..packet.offset + to_copy]
                .copy_from_slice(&remaining[..to_copy]);
            packet.offset += to_copy;
            remaining = &remaining[to_copy..];

            if packet.offset == self.packet_size
                && let Some(full) = cursor.packet.take()
            {
                let mut state = lock_or_recover(&self.state);
                state.packets[full.index] = full.data;
                state.read_queue.enqueue(full.index);
            }
        }

        src.len() - remaining.len()
    }

    /// Fill `dst` with whole packets, oldest first.
    ///
    /// `dst.len()` must be a multiple of [`packet_size`](Self::packet_size).
    /// Either every byte of `dst` is written and its length returned, or
    /// nothing is touched and 0 is returned (not enough packets ready, or the
    /// FIFO has been shut down).
    pub fn read(&self, dst: &mut [u8]) -> usize {
        debug_assert!(
            dst.len() % self.packet_size == 0,
            "read of {} bytes is not a multiple of the {}-byte packet size",
            dst.len(),
            self.packet_size
        );

        let mut guard = lock_or_recover(&self.state);
        let state = &mut *guard;
        if !state.valid {
            return 0;
        }

        let needed = dst.len() / self.packet_size;
        if needed == 0 || state.read_queue.count() < needed {
            return 0;
        }

        for chunk in dst.chunks_exact_mut(self.packet_size) {
            let index = state.read_queue.dequeue();
            chunk.copy_from_slice(&state.packets[index]);
            state.write_queue.enqueue(index);
        }

        needed * self.packet_size
    }

    /// Bytes [`write`](Self::write) would accept right now
    pub fn writable_bytes(&self) -> usize {
        let cursor = lock_or_recover(&self.writer);
        let state = lock_or_recover(&self.state);
        if !state.valid {
            return 0;
        }
        let in_flight_room = cursor
            .packet
            .as_ref()
            .map_or(0, |packet| self.packet_size - packet.offset);
        state.write_queue.count() * self.packet_size + in_flight_room
    }

    /// Bytes of complete packets waiting for the consumer
    pub fn readable_bytes(&self) -> usize {
        let state = lock_or_recover(&self.state);
        if !state.valid {
            return 0;
        }
        state.read_queue.count() * self.packet_size
    }

    /// Consistent snapshot of where the packets are
    pub fn occupancy(&self) -> FifoOccupancy {
        let cursor = lock_or_recover(&self.writer);
        let state = lock_or_recover(&self.state);
        if !state.valid {
            return FifoOccupancy::default();
        }
        FifoOccupancy {
            write_queued: state.write_queue.count(),
            read_queued: state.read_queue.count(),
            in_flight: cursor.packet.is_some(),
        }
    }

    /// Invalidate the FIFO and release the packet pool.
    ///
    /// Safe to call more than once and while the fill thread is still
    /// running; its next read simply returns 0.
    pub fn shutdown(&self) {
        let mut cursor = lock_or_recover(&self.writer);
        let mut state = lock_or_recover(&self.state);
        state.valid = false;
        state.packets = Vec::new();
        cursor.packet = None;
    }
}
