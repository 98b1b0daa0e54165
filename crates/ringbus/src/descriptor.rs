//! Region layout: data region first, metadata trailer behind it.
//!
//! The trailer spans two cache lines. The producer position (and, for the
//! single-producer variant, the producer's private cache of the consumer
//! position) live on the first line; the consumer-side cursors, correlation
//! counter and heartbeat live on the second. Keeping the hot fields of the
//! two sides on separate lines avoids false sharing between producer and
//! consumer cores.
//!
//! ```text
//! region:   [ data region (power-of-two bytes) | trailer (128 bytes) ]
//! trailer:  [ producer_position @ 0  | consumer_cache @ 8 | pad .. 64 ]
//!           [ consumer_position @ 64 | correlation @ 80 | heartbeat @ 88
//!             | consumer_claim @ 96 | pad .. 128 ]
//! ```

use crate::buffer::AtomicBuffer;
use crate::error::RingError;
use crate::invariants::debug_assert_monotonic;
use crate::record::HEADER_LENGTH;
use crate::region::{check_data_size, AlignedRegion};

/// Length of the metadata trailer behind the data region: two cache lines.
pub const TRAILER_LENGTH: usize = 128;

const PRODUCER_POSITION_OFFSET: usize = 0;
const CONSUMER_CACHE_OFFSET: usize = 8;
const CONSUMER_POSITION_OFFSET: usize = 64;
const CORRELATION_COUNTER_OFFSET: usize = 80;
const HEARTBEAT_OFFSET: usize = 88;
// Internal cursor of the multi-consumer claim protocol; sits in the padding
// of the consumer cache line.
const CONSUMER_CLAIM_OFFSET: usize = 96;

/// Typed accessor over the trailer slots.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Trailer {
    buf: AtomicBuffer,
    base: usize,
}

impl Trailer {
    fn new(buf: AtomicBuffer, base: usize) -> Self {
        Self { buf, base }
    }

    /// Producer position with acquire semantics.
    #[inline]
    pub(crate) fn producer_position(&self) -> u64 {
        self.buf.get_u64_volatile(self.base + PRODUCER_POSITION_OFFSET)
    }

    /// Producer position as a plain load. Only the producer itself may use
    /// this: it is the sole writer of the slot.
    #[inline]
    pub(crate) fn producer_position_plain(&self) -> u64 {
        self.buf.get_u64(self.base + PRODUCER_POSITION_OFFSET)
    }

    /// Publish a new producer position with release semantics.
    #[inline]
    pub(crate) fn store_producer_position(&self, position: u64) {
        debug_assert_monotonic!("producer", self.producer_position_plain(), position);
        self.buf
            .put_u64_ordered(self.base + PRODUCER_POSITION_OFFSET, position);
    }

    #[inline]
    pub(crate) fn cas_producer_position(&self, expected: u64, desired: u64) -> bool {
        self.buf
            .cas_u64(self.base + PRODUCER_POSITION_OFFSET, expected, desired)
    }

    /// Consumer position with acquire semantics.
    #[inline]
    pub(crate) fn consumer_position(&self) -> u64 {
        self.buf.get_u64_volatile(self.base + CONSUMER_POSITION_OFFSET)
    }

    /// Publish a new consumer position with release semantics.
    #[inline]
    pub(crate) fn store_consumer_position(&self, position: u64) {
        self.buf
            .put_u64_ordered(self.base + CONSUMER_POSITION_OFFSET, position);
    }

    /// Producer-private cache of the consumer position. Plain accesses: the
    /// producer is the only thread that ever touches this slot.
    #[inline]
    pub(crate) fn consumer_cache(&self) -> u64 {
        self.buf.get_u64(self.base + CONSUMER_CACHE_OFFSET)
    }

    #[inline]
    pub(crate) fn store_consumer_cache(&self, position: u64) {
        self.buf.put_u64(self.base + CONSUMER_CACHE_OFFSET, position);
    }

    /// Multi-consumer claim cursor with acquire semantics.
    #[inline]
    pub(crate) fn consumer_claim(&self) -> u64 {
        self.buf.get_u64_volatile(self.base + CONSUMER_CLAIM_OFFSET)
    }

    #[inline]
    pub(crate) fn cas_consumer_claim(&self, expected: u64, desired: u64) -> bool {
        self.buf
            .cas_u64(self.base + CONSUMER_CLAIM_OFFSET, expected, desired)
    }

    /// Mint the next correlation id.
    #[inline]
    pub(crate) fn next_correlation(&self) -> u64 {
        self.buf
            .get_and_add_u64(self.base + CORRELATION_COUNTER_OFFSET, 1)
    }

    #[inline]
    pub(crate) fn mark_heartbeat(&self, timestamp: u64) {
        self.buf.put_u64_ordered(self.base + HEARTBEAT_OFFSET, timestamp);
    }

    #[inline]
    pub(crate) fn heartbeat(&self) -> u64 {
        self.buf.get_u64_volatile(self.base + HEARTBEAT_OFFSET)
    }

    /// Reset every position cursor to zero. Correlation counter and
    /// heartbeat survive: correlation ids stay unique for the life of the
    /// buffer instance.
    pub(crate) fn reset_positions(&self) {
        self.buf.put_u64_ordered(self.base + PRODUCER_POSITION_OFFSET, 0);
        self.buf.put_u64(self.base + CONSUMER_CACHE_OFFSET, 0);
        self.buf.put_u64_ordered(self.base + CONSUMER_POSITION_OFFSET, 0);
        self.buf.put_u64_ordered(self.base + CONSUMER_CLAIM_OFFSET, 0);
    }
}

/// State and observers shared by both ring variants.
#[derive(Debug)]
pub(crate) struct RingCore {
    buf: AtomicBuffer,
    capacity: usize,
    mask: u64,
    max_payload: usize,
    trailer: Trailer,
    // Owned when the ring allocated its own region; callers wrapping an
    // external region hand over ownership the same way.
    _region: Option<AlignedRegion>,
}

impl RingCore {
    pub(crate) fn from_region(region: AlignedRegion) -> Result<Self, RingError> {
        let buf = region.as_buffer();
        let capacity = region.data_size();
        check_data_size(capacity)?;
        Ok(Self {
            buf,
            capacity,
            mask: (capacity - 1) as u64,
            max_payload: capacity - HEADER_LENGTH,
            trailer: Trailer::new(buf, capacity),
            _region: Some(region),
        })
    }

    /// Data region capacity in bytes.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub(crate) fn mask(&self) -> u64 {
        self.mask
    }

    /// Largest payload a single record can carry.
    #[inline]
    pub(crate) fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// View over the whole region (data and trailer).
    #[inline]
    pub(crate) fn buffer(&self) -> AtomicBuffer {
        self.buf
    }

    #[inline]
    pub(crate) fn trailer(&self) -> Trailer {
        self.trailer
    }

    pub(crate) fn producer_seq(&self) -> u64 {
        self.trailer.producer_position()
    }

    pub(crate) fn consumer_seq(&self) -> u64 {
        self.trailer.consumer_position()
    }

    /// Bytes currently in flight, clamped to the capacity.
    ///
    /// The two cursors cannot be read in one shot, so the consumer position
    /// is re-read until it is stable around the producer read.
    pub(crate) fn utilization(&self) -> usize {
        let mut consumer = self.trailer.consumer_position();
        loop {
            let before = consumer;
            let producer = self.trailer.producer_position();
            consumer = self.trailer.consumer_position();
            if consumer == before {
                let fill = producer.saturating_sub(consumer) as usize;
                return fill.min(self.capacity);
            }
        }
    }

    pub(crate) fn next_correlation(&self) -> u64 {
        self.trailer.next_correlation()
    }

    pub(crate) fn mark_heartbeat(&self, timestamp: u64) {
        self.trailer.mark_heartbeat(timestamp);
    }

    pub(crate) fn read_heartbeat(&self) -> u64 {
        self.trailer.heartbeat()
    }

    /// Reset to the freshly constructed state: positions to zero and the
    /// data region cleared. Not safe to call while producers or consumers
    /// are active.
    pub(crate) fn clear(&self) {
        self.buf.set_memory(0, self.capacity, 0);
        self.trailer.reset_positions();
    }
}
