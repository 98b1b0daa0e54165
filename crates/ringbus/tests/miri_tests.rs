//! Miri-compatible tests for detecting undefined behavior.
//!
//! Run with: `cargo +nightly miri test --test miri_tests`
//!
//! These tests are sized to exercise every unsafe path — raw-pointer
//! views, the off-heap region, header atomics, wrap-around and the
//! zero-copy claim protocol — in a few iterations each.

use ringbus_rs::{Config, MpmcRing, SpscRing};

#[test]
fn miri_spsc_offer_poll_with_wrap() {
    let ring = SpscRing::new(Config::new(64, false)).unwrap();
    let mut producer = ring.producer().unwrap();
    let mut consumer = ring.consumer().unwrap();

    // Several laps with mixed payload sizes to cross the wrap both with
    // and without padding.
    for round in 0..6u64 {
        let payload = vec![round as u8; 8 + (round % 3) as usize * 8];
        assert!(producer.offer(1, &payload).unwrap());

        let polled = consumer.poll_all(|_, msg| {
            assert_eq!(msg.as_slice(), payload.as_slice());
        });
        assert_eq!(polled, 1);
    }
}

#[test]
fn miri_spsc_claim_publish_and_abandon() {
    let ring = SpscRing::new(Config::new(128, false)).unwrap();
    let mut producer = ring.producer().unwrap();
    let mut consumer = ring.consumer().unwrap();

    let offset = producer.claim(2, 16).unwrap().unwrap();
    producer.buffer().put_bytes(offset, &[7u8; 16]);
    producer.publish(offset).unwrap();

    let offset = producer.claim(3, 8).unwrap().unwrap();
    producer.abandon(offset).unwrap();

    let mut seen = Vec::new();
    consumer.poll_all(|type_id, msg| seen.push((type_id, msg.len())));
    assert_eq!(seen, vec![(2, 16)]);
    assert_eq!(ring.consumer_seq(), ring.producer_seq());
}

#[test]
fn miri_mpmc_offer_poll_with_wrap() {
    let ring = MpmcRing::new(Config::new(64, false)).unwrap();
    let mut producer = ring.producer();
    let mut consumer = ring.consumer();

    for round in 0..6u64 {
        let payload = round.to_ne_bytes();
        assert!(producer.offer(1, &payload).unwrap());
        assert!(producer.offer(2, &payload).unwrap());

        let polled = consumer.poll_all(|_, msg| {
            assert_eq!(msg.get_u64(0), round);
        });
        assert_eq!(polled, 2);
    }
}

#[test]
fn miri_view_accessors() {
    let ring = SpscRing::new(Config::new(256, false)).unwrap();
    let mut producer = ring.producer().unwrap();
    let mut consumer = ring.consumer().unwrap();

    let mut payload = [0u8; 24];
    payload[0] = 0xAB;
    payload[1..3].copy_from_slice(&(-5i16).to_ne_bytes());
    payload[3..7].copy_from_slice(&0xDEAD_BEEFu32.to_ne_bytes());
    payload[7..15].copy_from_slice(&1.5f64.to_ne_bytes());
    assert!(producer.offer(1, &payload).unwrap());

    consumer.poll_all(|_, msg| {
        // Deliberately unaligned multibyte reads.
        assert_eq!(msg.get_u8(0), 0xAB);
        assert_eq!(msg.get_i16(1), -5);
        assert_eq!(msg.get_u32(3), 0xDEAD_BEEF);
        assert_eq!(msg.get_f64(7), 1.5);
    });
}

#[test]
fn miri_heartbeat_and_correlation() {
    let ring = MpmcRing::new(Config::new(64, false)).unwrap();
    ring.mark_heartbeat(99);
    assert_eq!(ring.read_heartbeat(), 99);
    assert_eq!(ring.next_correlation(), 0);
    assert_eq!(ring.next_correlation(), 1);
}
