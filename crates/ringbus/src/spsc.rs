//! Single-producer single-consumer ring buffer for variable-sized records.
//!
//! One producer thread and one consumer thread progress fully in parallel,
//! coordinated only by the record headers and the two position cursors in
//! the trailer. The producer keeps a private cache of the consumer position
//! so that the common not-near-full reservation touches no consumer-owned
//! cache line.
//!
//! Publication protocol (producer side):
//!
//! 1. Reserve: check free space against the cached consumer position,
//!    refreshing it with an acquire load only when the cache says full.
//!    If the record would straddle the region end, first lay down a
//!    padding record over the gap.
//! 2. Write the payload with plain stores.
//! 3. Release-store the committed header, then release-store the producer
//!    position. The consumer's acquire loads of the position and header
//!    make the payload visible.
//!
//! The consumer only ever reads records below the producer position, so a
//! header it can reach is always fully written.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::buffer::{AtomicBuffer, ReadBuffer};
use crate::config::Config;
use crate::control::ConsumerAction;
use crate::descriptor::{RingCore, Trailer};
use crate::error::RingError;
use crate::idle::IdleStrategy;
use crate::invariants::{debug_assert_bounded_fill, debug_assert_within_available};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::record::{self, HEADER_LENGTH, PADDING_TYPE_ID, RECORD_ALIGNMENT};
use crate::region::AlignedRegion;

#[derive(Debug)]
struct SpscState {
    core: RingCore,
    metrics: Metrics,
    enable_metrics: bool,
    producer_attached: AtomicBool,
    consumer_attached: AtomicBool,
}

/// Single-producer single-consumer message transport.
///
/// The ring itself is a cheap shared handle; the write and read sides are
/// driven through the [`SpscProducer`] and [`SpscConsumer`] handles, each of
/// which can be attached exactly once and moved to its own thread.
#[derive(Debug)]
pub struct SpscRing {
    state: Arc<SpscState>,
}

impl SpscRing {
    /// Creates a ring over a freshly allocated region.
    pub fn new(config: Config) -> Result<Self, RingError> {
        let region = AlignedRegion::allocate(config.data_size, config.alignment)?;
        Self::build(region, config.enable_metrics)
    }

    /// Wraps a caller-provided region (metrics disabled).
    pub fn wrap(region: AlignedRegion) -> Result<Self, RingError> {
        Self::build(region, false)
    }

    fn build(region: AlignedRegion, enable_metrics: bool) -> Result<Self, RingError> {
        Ok(Self {
            state: Arc::new(SpscState {
                core: RingCore::from_region(region)?,
                metrics: Metrics::new(),
                enable_metrics,
                producer_attached: AtomicBool::new(false),
                consumer_attached: AtomicBool::new(false),
            }),
        })
    }

    /// Attach the producer handle. Only one may ever exist: the reservation
    /// state it carries is valid only for a single writer.
    pub fn producer(&self) -> Result<SpscProducer, RingError> {
        if self.state.producer_attached.swap(true, Ordering::AcqRel) {
            return Err(RingError::ProducerAttached);
        }
        Ok(SpscProducer {
            state: Arc::clone(&self.state),
            pending: None,
        })
    }

    /// Attach the consumer handle. Only one may ever exist.
    pub fn consumer(&self) -> Result<SpscConsumer, RingError> {
        if self.state.consumer_attached.swap(true, Ordering::AcqRel) {
            return Err(RingError::ConsumerAttached);
        }
        Ok(SpscConsumer {
            state: Arc::clone(&self.state),
        })
    }

    /// Data region capacity in bytes.
    pub fn size(&self) -> usize {
        self.state.core.capacity()
    }

    /// Largest payload a single record can carry.
    pub fn max_payload_length(&self) -> usize {
        self.state.core.max_payload()
    }

    /// Bytes currently in flight, clamped to the capacity.
    pub fn utilization(&self) -> usize {
        self.state.core.utilization()
    }

    /// Absolute producer byte position.
    pub fn producer_seq(&self) -> u64 {
        self.state.core.producer_seq()
    }

    /// Absolute consumer byte position.
    pub fn consumer_seq(&self) -> u64 {
        self.state.core.consumer_seq()
    }

    /// Mint a correlation id, unique for the life of this ring.
    pub fn next_correlation(&self) -> u64 {
        self.state.core.next_correlation()
    }

    /// Record a liveness timestamp.
    pub fn mark_heartbeat(&self, timestamp: u64) {
        self.state.core.mark_heartbeat(timestamp);
    }

    /// Read back the last recorded liveness timestamp.
    pub fn read_heartbeat(&self) -> u64 {
        self.state.core.read_heartbeat()
    }

    /// Raw view over the underlying region, for external zero-copy writes.
    pub fn buffer(&self) -> AtomicBuffer {
        self.state.core.buffer()
    }

    /// Reset to the freshly constructed state.
    ///
    /// Not safe to call while the producer or consumer is concurrently
    /// active; quiesce both sides first.
    pub fn clear(&self) {
        self.state.core.clear();
    }

    /// Snapshot of the operation counters; zeroed when metrics are off.
    pub fn metrics(&self) -> MetricsSnapshot {
        if self.state.enable_metrics {
            self.state.metrics.snapshot()
        } else {
            MetricsSnapshot::default()
        }
    }
}

impl Clone for SpscRing {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

/// A reservation made but not yet published.
#[derive(Debug, Clone, Copy)]
struct PendingClaim {
    payload_offset: usize,
    record_slot: usize,
    frame_length: i32,
    type_id: i32,
    new_position: u64,
}

struct Reserved {
    record_slot: usize,
    new_position: u64,
    padded: bool,
}

/// Reserve space for one record, emitting a padding record over the
/// end-of-region gap when the record would not fit contiguously.
fn reserve(core: &RingCore, record_len: usize) -> Option<Reserved> {
    let trailer = core.trailer();
    let capacity = core.capacity();
    let producer = trailer.producer_position_plain();
    let slot = (producer & core.mask()) as usize;
    let to_end = capacity - slot;
    let padding = if record_len > to_end { to_end } else { 0 };
    let required = (record_len + padding) as u64;

    let mut consumer = trailer.consumer_cache();
    if producer + required - consumer > capacity as u64 {
        // Fast-path cache is stale; refresh from the shared slot.
        consumer = trailer.consumer_position();
        trailer.store_consumer_cache(consumer);
        if producer + required - consumer > capacity as u64 {
            return None;
        }
    }
    debug_assert_bounded_fill!((producer + required - consumer) as usize, capacity);

    let record_slot = if padding > 0 { 0 } else { slot };
    let buf = core.buffer();

    // Zero the header slot just past the reservation so a stale committed
    // header from an earlier lap can never be misread as the next record.
    // Skipped when the reservation leaves less than a header of free space:
    // that slot then still aliases the oldest unconsumed record.
    let next_slot = record_slot + record_len;
    if next_slot + HEADER_LENGTH <= capacity
        && producer + required + HEADER_LENGTH as u64 - consumer <= capacity as u64
    {
        buf.put_i64(next_slot, 0);
    }

    if padding > 0 {
        buf.put_i64_ordered(slot, record::pack(padding as i32, PADDING_TYPE_ID));
    }

    Some(Reserved {
        record_slot,
        new_position: producer + required,
        padded: padding > 0,
    })
}

/// Write side of an [`SpscRing`].
///
/// All methods take `&mut self`: the reservation state (and the consumer
/// position cache in the trailer) have exactly one writer by contract.
#[derive(Debug)]
pub struct SpscProducer {
    state: Arc<SpscState>,
    pending: Option<PendingClaim>,
}

impl SpscProducer {
    /// Copy `msg` into the ring as one record of kind `type_id`.
    ///
    /// Returns `Ok(false)` without side effects when the ring lacks space.
    pub fn offer(&mut self, type_id: i32, msg: &[u8]) -> Result<bool, RingError> {
        record::check_type_id(type_id)?;
        let max = self.state.core.max_payload();
        if msg.len() > max {
            return Err(RingError::MessageTooLong {
                length: msg.len(),
                max,
            });
        }
        if self.pending.is_some() {
            return Err(RingError::ClaimOutstanding);
        }

        let record_len = record::record_length(msg.len());
        let Some(reserved) = reserve(&self.state.core, record_len) else {
            if self.state.enable_metrics {
                self.state.metrics.add_offer_failure();
            }
            return Ok(false);
        };

        let buf = self.state.core.buffer();
        buf.put_bytes(reserved.record_slot + HEADER_LENGTH, msg);
        let frame = (msg.len() + HEADER_LENGTH) as i32;
        buf.put_i64_ordered(reserved.record_slot, record::pack(frame, type_id));
        self.state
            .core
            .trailer()
            .store_producer_position(reserved.new_position);

        if self.state.enable_metrics {
            self.state.metrics.add_messages_offered(1);
            if reserved.padded {
                self.state.metrics.add_padding_record();
            }
        }
        Ok(true)
    }

    /// `offer`, idling between retries while the ring is full.
    ///
    /// Gives up with `Ok(false)` once the wait strategy is exhausted.
    pub fn offer_with_retry(&mut self, type_id: i32, msg: &[u8]) -> Result<bool, RingError> {
        let mut strategy = IdleStrategy::new();
        loop {
            if self.offer(type_id, msg)? {
                return Ok(true);
            }
            if strategy.is_exhausted() {
                return Ok(false);
            }
            strategy.idle();
        }
    }

    /// Reserve `length` payload bytes for zero-copy writing.
    ///
    /// On success the record is marked in-progress and the payload offset is
    /// returned; write through [`Self::buffer`] at that offset, then either
    /// [`Self::publish`] or [`Self::abandon`] the claim. Returns `Ok(None)`
    /// when the ring lacks space. At most one claim may be outstanding.
    pub fn claim(&mut self, type_id: i32, length: usize) -> Result<Option<usize>, RingError> {
        record::check_type_id(type_id)?;
        let max = self.state.core.max_payload();
        if length > max {
            return Err(RingError::MessageTooLong { length, max });
        }
        if self.pending.is_some() {
            return Err(RingError::ClaimOutstanding);
        }

        let record_len = record::record_length(length);
        let Some(reserved) = reserve(&self.state.core, record_len) else {
            if self.state.enable_metrics {
                self.state.metrics.add_offer_failure();
            }
            return Ok(None);
        };

        let frame = (length + HEADER_LENGTH) as i32;
        self.state
            .core
            .buffer()
            .put_i64_ordered(reserved.record_slot, record::pack(-frame, type_id));
        if self.state.enable_metrics && reserved.padded {
            self.state.metrics.add_padding_record();
        }

        let payload_offset = reserved.record_slot + HEADER_LENGTH;
        self.pending = Some(PendingClaim {
            payload_offset,
            record_slot: reserved.record_slot,
            frame_length: frame,
            type_id,
            new_position: reserved.new_position,
        });
        Ok(Some(payload_offset))
    }

    /// Commit the in-progress record claimed at `offset`.
    pub fn publish(&mut self, offset: usize) -> Result<(), RingError> {
        let claim = self.take_pending(offset)?;
        let buf = self.state.core.buffer();
        buf.put_i64_ordered(
            claim.record_slot,
            record::pack(claim.frame_length, claim.type_id),
        );
        self.state
            .core
            .trailer()
            .store_producer_position(claim.new_position);
        if self.state.enable_metrics {
            self.state.metrics.add_messages_offered(1);
        }
        Ok(())
    }

    /// Convert the in-progress record claimed at `offset` into padding, so
    /// the consumer skips it silently.
    pub fn abandon(&mut self, offset: usize) -> Result<(), RingError> {
        let claim = self.take_pending(offset)?;
        let buf = self.state.core.buffer();
        buf.put_i64_ordered(
            claim.record_slot,
            record::pack(claim.frame_length, PADDING_TYPE_ID),
        );
        self.state
            .core
            .trailer()
            .store_producer_position(claim.new_position);
        if self.state.enable_metrics {
            self.state.metrics.add_padding_record();
        }
        Ok(())
    }

    fn take_pending(&mut self, offset: usize) -> Result<PendingClaim, RingError> {
        match self.pending {
            Some(claim) if claim.payload_offset == offset => {
                let header = self.state.core.buffer().get_i64(claim.record_slot);
                if record::frame_length(header) != -claim.frame_length {
                    return Err(RingError::InvalidClaim(offset));
                }
                self.pending = None;
                Ok(claim)
            }
            _ => Err(RingError::InvalidClaim(offset)),
        }
    }

    /// Raw view over the underlying region, for writing claimed payloads.
    pub fn buffer(&self) -> AtomicBuffer {
        self.state.core.buffer()
    }
}

impl Drop for SpscProducer {
    fn drop(&mut self) {
        // An unresolved claim would wedge the consumer forever; turn it
        // into padding on the way out.
        if let Some(claim) = self.pending.take() {
            let buf = self.state.core.buffer();
            buf.put_i64_ordered(
                claim.record_slot,
                record::pack(claim.frame_length, PADDING_TYPE_ID),
            );
            self.state
                .core
                .trailer()
                .store_producer_position(claim.new_position);
        }
    }
}

/// Publishes consumed bytes on every exit path, including unwinding out of
/// a panicking callback. Progress is committed up to, but not including,
/// the record whose callback failed.
struct CommitGuard {
    trailer: Trailer,
    base: u64,
    bytes: u64,
}

impl Drop for CommitGuard {
    fn drop(&mut self) {
        if self.bytes > 0 {
            self.trailer.store_consumer_position(self.base + self.bytes);
        }
    }
}

/// Read side of an [`SpscRing`].
#[derive(Debug)]
pub struct SpscConsumer {
    state: Arc<SpscState>,
}

impl SpscConsumer {
    /// Consume up to `limit` records, invoking `handler` for each.
    ///
    /// The view passed to the handler is valid only for that invocation.
    /// Padding records are skipped silently and do not count against
    /// `limit`. Returns the number of records delivered.
    pub fn poll<F>(&mut self, limit: usize, mut handler: F) -> usize
    where
        F: FnMut(i32, ReadBuffer<'_>),
    {
        self.controlled_poll(limit, |type_id, msg| {
            handler(type_id, msg);
            ConsumerAction::Continue
        })
    }

    /// Consume every available record.
    pub fn poll_all<F>(&mut self, handler: F) -> usize
    where
        F: FnMut(i32, ReadBuffer<'_>),
    {
        self.poll(usize::MAX, handler)
    }

    /// Consume up to `limit` records under callback flow control.
    ///
    /// `Continue` and `Commit` both commit the record (`Commit` also
    /// publishes the consumer position immediately); `Break` commits and
    /// returns; `Abort` returns leaving the consumer position at the last
    /// committed boundary, so the record is redelivered next time.
    pub fn controlled_poll<F>(&mut self, limit: usize, mut handler: F) -> usize
    where
        F: FnMut(i32, ReadBuffer<'_>) -> ConsumerAction,
    {
        let core = &self.state.core;
        let trailer = core.trailer();
        let head = trailer.consumer_position();
        let available = trailer.producer_position() - head;
        if available == 0 || limit == 0 {
            return 0;
        }

        let capacity = core.capacity();
        let buf = core.buffer();
        let mut guard = CommitGuard {
            trailer,
            base: head,
            bytes: 0,
        };
        let mut bytes: u64 = 0;
        let mut count = 0usize;

        while bytes < available && count < limit {
            let slot = ((head + bytes) & core.mask()) as usize;
            let header = buf.get_i64_volatile(slot);
            let frame = record::frame_length(header);
            if frame <= 0 {
                break;
            }

            let aligned = record::align_up(frame as usize, RECORD_ALIGNMENT) as u64;
            if bytes + aligned > available {
                break;
            }
            bytes += aligned;

            // A record that cannot physically reach past the region end is
            // a wrap filler, as is anything carrying the padding sentinel.
            if slot + aligned as usize > capacity || record::type_id(header) == PADDING_TYPE_ID {
                guard.bytes = bytes;
                continue;
            }

            let view = buf.view(slot + HEADER_LENGTH, frame as usize - HEADER_LENGTH);
            match handler(record::type_id(header), view) {
                ConsumerAction::Continue => {
                    count += 1;
                    guard.bytes = bytes;
                }
                ConsumerAction::Commit => {
                    count += 1;
                    guard.bytes = bytes;
                    trailer.store_consumer_position(head + bytes);
                }
                ConsumerAction::Break => {
                    count += 1;
                    guard.bytes = bytes;
                    break;
                }
                ConsumerAction::Abort => {
                    break;
                }
            }
        }
        debug_assert_within_available!(bytes, available);
        drop(guard);

        if self.state.enable_metrics && count > 0 {
            self.state.metrics.add_messages_polled(count as u64);
        }
        count
    }

    /// Controlled-poll every available record.
    pub fn controlled_poll_all<F>(&mut self, handler: F) -> usize
    where
        F: FnMut(i32, ReadBuffer<'_>) -> ConsumerAction,
    {
        self.controlled_poll(usize::MAX, handler)
    }

    /// Raw view over the underlying region.
    pub fn buffer(&self) -> AtomicBuffer {
        self.state.core.buffer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_of(data_size: usize) -> (SpscRing, SpscProducer, SpscConsumer) {
        let ring = SpscRing::new(Config::new(data_size, true)).unwrap();
        let producer = ring.producer().unwrap();
        let consumer = ring.consumer().unwrap();
        (ring, producer, consumer)
    }

    #[test]
    fn test_single_record_round_trip() {
        let (ring, mut producer, mut consumer) = ring_of(1024);

        assert!(producer.offer(7, &[0x01, 0x02, 0x03, 0x04]).unwrap());

        let mut seen = Vec::new();
        let polled = consumer.poll(1, |type_id, msg| {
            seen.push((type_id, msg.as_slice().to_vec()));
        });

        assert_eq!(polled, 1);
        assert_eq!(seen, vec![(7, vec![0x01, 0x02, 0x03, 0x04])]);
        assert_eq!(ring.producer_seq(), 16);
        assert_eq!(ring.consumer_seq(), 16);
    }

    #[test]
    fn test_fill_and_drain() {
        let (ring, mut producer, mut consumer) = ring_of(64);

        // 8-byte payloads make 16-byte records: exactly four fit.
        let mut accepted: u64 = 0;
        while producer.offer(1, &accepted.to_ne_bytes()).unwrap() {
            accepted += 1u64;
        }
        assert_eq!(accepted, 4);
        assert_eq!(ring.utilization(), 64);

        let mut order = Vec::new();
        let polled = consumer.poll_all(|_, msg| order.push(msg.get_u64(0)));
        assert_eq!(polled, 4);
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert_eq!(ring.utilization(), 0);
    }

    #[test]
    fn test_wrap_with_padding() {
        let (ring, mut producer, mut consumer) = ring_of(64);

        for i in 0..3u64 {
            assert!(producer.offer(1, &i.to_ne_bytes()).unwrap());
        }
        assert_eq!(consumer.poll(2, |_, _| ()), 2);
        assert_eq!(ring.producer_seq(), 48);
        assert_eq!(ring.consumer_seq(), 32);

        // A 24-byte record does not fit in the 16 bytes before the wrap:
        // a padding record spans the gap and the payload lands at slot 0.
        let big = [0xAAu8; 16];
        assert!(producer.offer(2, &big).unwrap());
        assert_eq!(ring.producer_seq(), 88);

        let mut seen = Vec::new();
        let polled = consumer.poll(10, |type_id, msg| {
            seen.push((type_id, msg.as_slice().to_vec()));
        });
        assert_eq!(polled, 2);
        assert_eq!(seen[0].0, 1);
        assert_eq!(seen[1], (2, big.to_vec()));
        assert_eq!(ring.consumer_seq(), 88);
        assert_eq!(ring.metrics().padding_records, 1);
    }

    #[test]
    fn test_wrap_exact_fit_emits_no_padding() {
        let (ring, mut producer, mut consumer) = ring_of(64);

        for i in 0..3u64 {
            assert!(producer.offer(1, &i.to_ne_bytes()).unwrap());
        }
        assert_eq!(consumer.poll_all(|_, _| ()), 3);

        // The next 16-byte record ends exactly at the region end.
        assert!(producer.offer(2, &[0u8; 8]).unwrap());
        assert_eq!(ring.producer_seq(), 64);
        assert_eq!(consumer.poll_all(|_, _| ()), 1);

        // And the one after starts back at slot 0.
        assert!(producer.offer(3, &[1u8; 8]).unwrap());
        assert_eq!(consumer.poll_all(|_, _| ()), 1);
        assert_eq!(ring.metrics().padding_records, 0);
    }

    #[test]
    fn test_claim_write_publish() {
        let (ring, mut producer, mut consumer) = ring_of(256);

        let offset = producer.claim(3, 12).unwrap().unwrap();
        assert_eq!(offset, HEADER_LENGTH);

        // Nothing is visible until publish.
        assert_eq!(ring.producer_seq(), 0);

        let payload: Vec<u8> = (0..12).collect();
        producer.buffer().put_bytes(offset, &payload);
        producer.publish(offset).unwrap();

        let mut seen = Vec::new();
        consumer.poll_all(|type_id, msg| seen.push((type_id, msg.as_slice().to_vec())));
        assert_eq!(seen, vec![(3, payload)]);
        assert_eq!(ring.producer_seq(), 24);
        assert_eq!(ring.consumer_seq(), 24);
    }

    #[test]
    fn test_claim_abandon_skips_silently() {
        let (ring, mut producer, mut consumer) = ring_of(256);

        let offset = producer.claim(5, 20).unwrap().unwrap();
        producer.abandon(offset).unwrap();

        let polled = consumer.poll_all(|_, _| panic!("padding must not be delivered"));
        assert_eq!(polled, 0);
        assert_eq!(ring.consumer_seq(), 32);
        assert_eq!(ring.consumer_seq(), ring.producer_seq());
    }

    #[test]
    fn test_zero_length_payload() {
        let (ring, mut producer, mut consumer) = ring_of(64);

        assert!(producer.offer(9, &[]).unwrap());
        let polled = consumer.poll_all(|type_id, msg| {
            assert_eq!(type_id, 9);
            assert!(msg.is_empty());
        });
        assert_eq!(polled, 1);
        assert_eq!(ring.consumer_seq(), 8);
    }

    #[test]
    fn test_max_payload_fills_whole_region() {
        let (ring, mut producer, mut consumer) = ring_of(64);
        assert_eq!(ring.max_payload_length(), 56);

        let payload = [0x5Au8; 56];
        assert!(producer.offer(1, &payload).unwrap());
        assert_eq!(ring.utilization(), 64);

        // Nothing else fits until the consumer drains.
        assert!(!producer.offer(1, &[]).unwrap());

        let polled = consumer.poll_all(|_, msg| assert_eq!(msg.as_slice(), payload));
        assert_eq!(polled, 1);
        assert!(producer.offer(1, &[]).unwrap());
    }

    #[test]
    fn test_full_ring_preserves_oldest_record_across_wrap() {
        let (ring, mut producer, mut consumer) = ring_of(64);
        for i in 0..4u64 {
            assert!(producer.offer(1, &i.to_ne_bytes()).unwrap());
        }

        // Consume one and refill at slot 0: the ring is exactly full again
        // and the new reservation borders the oldest unconsumed record.
        assert_eq!(consumer.poll(1, |_, _| ()), 1);
        assert!(producer.offer(1, &4u64.to_ne_bytes()).unwrap());
        assert_eq!(ring.utilization(), 64);

        let mut values = Vec::new();
        consumer.poll_all(|_, msg| values.push(msg.get_u64(0)));
        assert_eq!(values, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_argument_validation() {
        let (_ring, mut producer, _consumer) = ring_of(64);

        assert_eq!(producer.offer(0, &[1]), Err(RingError::InvalidTypeId(0)));
        assert_eq!(producer.offer(-3, &[1]), Err(RingError::InvalidTypeId(-3)));
        assert_eq!(
            producer.offer(1, &[0u8; 57]),
            Err(RingError::MessageTooLong {
                length: 57,
                max: 56
            })
        );
        assert_eq!(producer.claim(0, 4), Err(RingError::InvalidTypeId(0)));
        assert_eq!(
            producer.claim(1, 57),
            Err(RingError::MessageTooLong {
                length: 57,
                max: 56
            })
        );
    }

    #[test]
    fn test_claim_protocol_misuse() {
        let (_ring, mut producer, _consumer) = ring_of(256);

        let offset = producer.claim(1, 8).unwrap().unwrap();
        assert_eq!(producer.claim(1, 8), Err(RingError::ClaimOutstanding));
        assert_eq!(producer.offer(1, &[0]), Err(RingError::ClaimOutstanding));
        assert_eq!(
            producer.publish(offset + 8),
            Err(RingError::InvalidClaim(offset + 8))
        );

        producer.publish(offset).unwrap();
        assert_eq!(producer.publish(offset), Err(RingError::InvalidClaim(offset)));
        assert_eq!(producer.abandon(offset), Err(RingError::InvalidClaim(offset)));
    }

    #[test]
    fn test_controlled_poll_break() {
        let (ring, mut producer, mut consumer) = ring_of(256);
        for i in 0..3u64 {
            assert!(producer.offer(1, &i.to_ne_bytes()).unwrap());
        }

        let polled = consumer.controlled_poll(10, |_, _| ConsumerAction::Break);
        assert_eq!(polled, 1);
        assert_eq!(ring.consumer_seq(), 16);
    }

    #[test]
    fn test_controlled_poll_abort_redelivers() {
        let (ring, mut producer, mut consumer) = ring_of(256);
        for i in 0..3u64 {
            assert!(producer.offer(1, &i.to_ne_bytes()).unwrap());
        }

        // Abort on the second record: only the first is committed.
        let mut seen = 0;
        let polled = consumer.controlled_poll(10, |_, _| {
            seen += 1;
            if seen == 2 {
                ConsumerAction::Abort
            } else {
                ConsumerAction::Continue
            }
        });
        assert_eq!(polled, 1);
        assert_eq!(ring.consumer_seq(), 16);

        // The aborted record comes back.
        let mut values = Vec::new();
        consumer.poll_all(|_, msg| values.push(msg.get_u64(0)));
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn test_controlled_poll_commit_publishes_immediately() {
        let (ring, mut producer, mut consumer) = ring_of(256);
        for i in 0..2u64 {
            assert!(producer.offer(1, &i.to_ne_bytes()).unwrap());
        }

        let observer = ring.clone();
        let mut positions = Vec::new();
        consumer.controlled_poll(10, |_, msg| {
            positions.push(observer.consumer_seq());
            let _ = msg.len();
            ConsumerAction::Commit
        });

        // The first record's position was already published when the second
        // callback ran.
        assert_eq!(positions, vec![0, 16]);
        assert_eq!(ring.consumer_seq(), 32);
    }

    #[test]
    fn test_panicking_callback_commits_preceding_records() {
        let (ring, mut producer, mut consumer) = ring_of(1024);
        for i in 0..3u64 {
            assert!(producer.offer(1, &i.to_ne_bytes()).unwrap());
        }

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut seen = 0;
            consumer.poll(10, |_, _| {
                seen += 1;
                if seen == 2 {
                    panic!("handler failure");
                }
            })
        }));
        assert!(result.is_err());

        // Progress covers the first record only; the failing one and its
        // successor are redelivered.
        assert_eq!(ring.consumer_seq(), 16);
        let mut values = Vec::new();
        consumer.poll_all(|_, msg| values.push(msg.get_u64(0)));
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn test_clear_behaves_like_fresh_ring() {
        let (ring, mut producer, mut consumer) = ring_of(64);
        for i in 0..3u64 {
            assert!(producer.offer(1, &i.to_ne_bytes()).unwrap());
        }
        assert_eq!(consumer.poll(1, |_, _| ()), 1);

        ring.clear();
        assert_eq!(ring.producer_seq(), 0);
        assert_eq!(ring.consumer_seq(), 0);
        assert_eq!(ring.utilization(), 0);

        assert!(producer.offer(4, &[0xEE; 8]).unwrap());
        let polled = consumer.poll_all(|type_id, msg| {
            assert_eq!(type_id, 4);
            assert_eq!(msg.as_slice(), &[0xEE; 8]);
        });
        assert_eq!(polled, 1);
    }

    #[test]
    fn test_handles_attach_once() {
        let (ring, _producer, _consumer) = ring_of(64);
        assert_eq!(ring.producer().unwrap_err(), RingError::ProducerAttached);
        assert_eq!(ring.consumer().unwrap_err(), RingError::ConsumerAttached);
    }

    #[test]
    fn test_correlation_and_heartbeat() {
        let (ring, _producer, _consumer) = ring_of(64);

        assert_eq!(ring.next_correlation(), 0);
        assert_eq!(ring.next_correlation(), 1);

        ring.mark_heartbeat(123_456);
        assert_eq!(ring.read_heartbeat(), 123_456);
    }

    #[test]
    fn test_dropping_producer_abandons_claim() {
        let (ring, mut producer, mut consumer) = ring_of(256);
        let _ = producer.claim(2, 8).unwrap().unwrap();
        drop(producer);

        // The orphaned claim became padding; the consumer moves past it.
        assert_eq!(consumer.poll_all(|_, _| ()), 0);
        assert_eq!(ring.consumer_seq(), 16);
    }

    #[test]
    fn test_metrics_accounting() {
        let (ring, mut producer, mut consumer) = ring_of(64);

        while producer.offer(1, &[0u8; 8]).unwrap() {}
        consumer.poll_all(|_, _| ());

        let m = ring.metrics();
        assert_eq!(m.messages_offered, 4);
        assert_eq!(m.offer_failures, 1);
        assert_eq!(m.messages_polled, 4);
    }
}
