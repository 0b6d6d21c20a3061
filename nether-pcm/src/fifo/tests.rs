//! Packet FIFO tests

use super::*;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

// =============================================================
// Reference scenario
// =============================================================

#[test]
fn test_write_then_read_small_packets() {
    let fifo = PacketFifo::new(4, 3);

    assert_eq!(fifo.write(&[1, 2, 3, 4, 5, 6, 7, 8]), 8);
    let occupancy = fifo.occupancy();
    assert_eq!(occupancy.read_queued, 2);
    assert!(!occupancy.in_flight);

    let mut out = [0u8; 8];
    assert_eq!(fifo.read(&mut out), 8);
    assert_eq!(out, [1, 2, 3, 4, 5, 6, 7, 8]);

    // nothing left until the producer writes again
    let mut more = [0xAAu8; 4];
    assert_eq!(fifo.read(&mut more), 0);
    assert_eq!(more, [0xAA; 4]);
}

#[test]
fn test_new_fifo_is_all_writable() {
    let fifo = PacketFifo::new(16, 8);
    assert!(fifo.is_valid());
    assert_eq!(fifo.writable_bytes(), 128);
    assert_eq!(fifo.readable_bytes(), 0);
    assert_eq!(
        fifo.occupancy(),
        FifoOccupancy {
            write_queued: 8,
            read_queued: 0,
            in_flight: false,
        }
    );
}

// =============================================================
// Partial packets
// =============================================================

#[test]
fn test_partial_packet_is_not_readable() {
    let fifo = PacketFifo::new(4, 3);
    assert_eq!(fifo.write(&[1, 2, 3]), 3);

    let occupancy = fifo.occupancy();
    assert!(occupancy.in_flight);
    assert_eq!(occupancy.read_queued, 0);
    assert_eq!(fifo.writable_bytes(), 2 * 4 + 1);

    let mut out = [0u8; 4];
    assert_eq!(fifo.read(&mut out), 0);

    // completing the packet publishes it
    assert_eq!(fifo.write(&[4]), 1);
    assert_eq!(fifo.read(&mut out), 4);
    assert_eq!(out, [1, 2, 3, 4]);
}

#[test]
fn test_write_spanning_many_packets() {
    let fifo = PacketFifo::new(8, 16);
    let data = pattern(100, 3);

    assert_eq!(fifo.write(&data), 100);
    // 12 full packets published, 4 bytes in flight
    assert_eq!(fifo.readable_bytes(), 96);
    assert!(fifo.occupancy().in_flight);

    let mut out = vec![0u8; 96];
    assert_eq!(fifo.read(&mut out), 96);
    assert_eq!(&out[..], &data[..96]);
}

#[test]
fn test_empty_write_and_read_are_noops() {
    let fifo = PacketFifo::new(4, 2);
    assert_eq!(fifo.write(&[]), 0);
    assert_eq!(fifo.read(&mut []), 0);
    assert_eq!(fifo.occupancy().write_queued, 2);
}

// =============================================================
// All-or-nothing reads
// =============================================================

#[test]
fn test_read_requires_all_packets() {
    let fifo = PacketFifo::new(4, 4);
    assert_eq!(fifo.write(&pattern(8, 0)), 8);

    let mut out = [0x55u8; 12];
    assert_eq!(fifo.read(&mut out), 0);
    assert_eq!(out, [0x55; 12]);
    // the two ready packets are untouched
    assert_eq!(fifo.occupancy().read_queued, 2);

    let mut out = [0u8; 8];
    assert_eq!(fifo.read(&mut out), 8);
    assert_eq!(fifo.occupancy().read_queued, 0);
    assert_eq!(fifo.occupancy().write_queued, 4);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "not a multiple")]
fn test_read_non_multiple_panics_in_debug() {
    let fifo = PacketFifo::new(4, 4);
    let mut out = [0u8; 6];
    fifo.read(&mut out);
}

// =============================================================
// Backpressure
// =============================================================

#[test]
fn test_starvation_then_recovery() {
    let fifo = PacketFifo::new(4, 3);

    // fill every packet
    assert_eq!(fifo.write(&pattern(16, 1)), 12);
    assert_eq!(fifo.writable_bytes(), 0);
    assert_eq!(fifo.write(&[9, 9, 9, 9]), 0);
    assert_eq!(fifo.write(&[9]), 0);

    // consumer frees one packet
    let mut out = [0u8; 4];
    assert_eq!(fifo.read(&mut out), 4);
    assert_eq!(fifo.writable_bytes(), 4);

    assert_eq!(fifo.write(&[7, 7, 7, 7, 7]), 4);

    let mut rest = [0u8; 12];
    assert_eq!(fifo.read(&mut rest), 12);
    assert_eq!(&rest[8..], &[7, 7, 7, 7]);
}

#[test]
fn test_write_never_reports_more_than_supplied() {
    let fifo = PacketFifo::new(6, 5);
    for len in [0, 1, 5, 6, 7, 13, 29, 30, 31] {
        let accepted = fifo.write(&pattern(len, 2));
        assert!(accepted <= len);
        let mut drain = vec![0u8; fifo.readable_bytes()];
        fifo.read(&mut drain);
    }
}

// =============================================================
// Invariants under random traffic
// =============================================================

#[test]
fn test_capacity_invariant_random_sequence() {
    let packet_size = 5;
    let num_packets = 7;
    let fifo = PacketFifo::new(packet_size, num_packets);
    let mut rng = Pcg32::seed_from_u64(0x5eed);

    let mut written: Vec<u8> = Vec::new();
    let mut read_back: Vec<u8> = Vec::new();
    let mut counter = 0u8;

    for _ in 0..5_000 {
        if rng.random_bool(0.5) {
            let len = rng.random_range(0..3 * packet_size);
            let chunk: Vec<u8> = (0..len)
                .map(|_| {
                    counter = counter.wrapping_add(1);
                    counter
                })
                .collect();
            let accepted = fifo.write(&chunk);
            assert!(accepted <= len);
            written.extend_from_slice(&chunk[..accepted]);
            // unaccepted bytes are never resent, so the stream stays contiguous
            counter = counter.wrapping_sub((len - accepted) as u8);
        } else {
            let packets = rng.random_range(1..=3);
            let before = fifo.occupancy();
            let mut out = vec![0u8; packets * packet_size];
            let got = fifo.read(&mut out);
            let after = fifo.occupancy();
            if got == 0 {
                assert_eq!(before, after);
            } else {
                assert_eq!(got, out.len());
                assert_eq!(after.read_queued, before.read_queued - packets);
                assert_eq!(after.write_queued, before.write_queued + packets);
                read_back.extend_from_slice(&out);
            }
        }

        assert_eq!(fifo.occupancy().total(), num_packets);
    }

    assert_eq!(&written[..read_back.len()], &read_back[..]);
}

#[test]
fn test_concurrent_round_trip() {
    let packet_size = 64;
    let fifo = Arc::new(PacketFifo::new(packet_size, 8));
    let data = Arc::new(pattern(64 * 500, 11));

    let producer = {
        let fifo = Arc::clone(&fifo);
        let data = Arc::clone(&data);
        thread::spawn(move || {
            let mut offset = 0;
            let deadline = Instant::now() + Duration::from_secs(10);
            while offset < data.len() && Instant::now() < deadline {
                let end = (offset + 100).min(data.len());
                let accepted = fifo.write(&data[offset..end]);
                offset += accepted;
                if accepted == 0 {
                    thread::yield_now();
                }
            }
            offset
        })
    };

    let mut received = Vec::with_capacity(data.len());
    let mut buffer = vec![0u8; packet_size * 2];
    let deadline = Instant::now() + Duration::from_secs(10);
    while received.len() < data.len() && Instant::now() < deadline {
        if fifo.read(&mut buffer) == buffer.len() {
            received.extend_from_slice(&buffer);
        } else {
            thread::yield_now();
        }
    }

    assert_eq!(producer.join().unwrap(), data.len());
    assert_eq!(received, *data);
}

// =============================================================
// Shutdown
// =============================================================

#[test]
fn test_shutdown_makes_everything_a_noop() {
    let fifo = PacketFifo::new(4, 3);
    assert_eq!(fifo.write(&[1, 2, 3, 4, 5, 6]), 6);

    fifo.shutdown();
    assert!(!fifo.is_valid());

    let mut out = [0xEEu8; 4];
    assert_eq!(fifo.read(&mut out), 0);
    assert_eq!(out, [0xEE; 4]);
    assert_eq!(fifo.write(&[1, 2, 3, 4]), 0);
    assert_eq!(fifo.writable_bytes(), 0);
    assert_eq!(fifo.readable_bytes(), 0);
    assert_eq!(fifo.occupancy(), FifoOccupancy::default());

    // idempotent
    fifo.shutdown();
    assert!(!fifo.is_valid());
}

#[test]
fn test_shutdown_races_reader() {
    let fifo = Arc::new(PacketFifo::new(32, 4));
    let reader = {
        let fifo = Arc::clone(&fifo);
        thread::spawn(move || {
            let mut buffer = [0u8; 32];
            let mut reads = 0u32;
            while fifo.is_valid() || reads < 100 {
                fifo.read(&mut buffer);
                reads += 1;
            }
        })
    };

    for _ in 0..50 {
        fifo.write(&[1u8; 48]);
    }
    fifo.shutdown();

    reader.join().unwrap();
    assert_eq!(fifo.write(&[1u8; 32]), 0);
}

#[test]
#[should_panic(expected = "packet size must be non-zero")]
fn test_zero_packet_size_panics() {
    PacketFifo::new(0, 4);
}
