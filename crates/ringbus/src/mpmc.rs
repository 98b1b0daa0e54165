//! Multi-producer multi-consumer ring buffer for variable-sized records.
//!
//! The wire layout is identical to the single-producer variant; the
//! coordination differs:
//!
//! - Producers reserve space with a CAS on the producer position. The CAS
//!   itself is the position update, and because padding is computed before
//!   the CAS it is atomic with the reservation: partial padding can never
//!   be observed. The record (or its in-progress header) is written with
//!   release stores after the CAS wins.
//! - Consumers claim records one at a time with a CAS on an internal claim
//!   cursor, which serializes claims in position order without blocking
//!   the other consumers' progress past already-claimed records.
//!
//! The public consumer position is the *release boundary*: it advances, in
//! claim order, only after a claimed record has been processed and its
//! bytes zeroed. Producers gate free space on the release boundary, so any
//! header a consumer can reach reads as zero (not yet published) until the
//! owning producer's release store lands, and no producer can reuse a span
//! that a consumer is still reading.

use std::sync::Arc;

use crate::buffer::{AtomicBuffer, ReadBuffer};
use crate::config::Config;
use crate::control::ConsumerAction;
use crate::descriptor::{RingCore, Trailer};
use crate::error::RingError;
use crate::idle::IdleStrategy;
use crate::invariants::debug_assert_bounded_fill;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::record::{self, HEADER_LENGTH, PADDING_TYPE_ID, RECORD_ALIGNMENT};
use crate::region::AlignedRegion;

#[derive(Debug)]
struct MpmcState {
    core: RingCore,
    metrics: Metrics,
    enable_metrics: bool,
}

/// Multi-producer multi-consumer message transport.
///
/// Any number of [`MpmcProducer`] and [`MpmcConsumer`] handles may be
/// attached; each handle belongs to one thread at a time.
#[derive(Debug)]
pub struct MpmcRing {
    state: Arc<MpmcState>,
}

impl MpmcRing {
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
            state: Arc::new(MpmcState {
                core: RingCore::from_region(region)?,
                metrics: Metrics::new(),
                enable_metrics,
            }),
        })
    }

    /// Attach a producer handle.
    pub fn producer(&self) -> MpmcProducer {
        MpmcProducer {
            state: Arc::clone(&self.state),
            pending: None,
        }
    }

    /// Attach a consumer handle.
    pub fn consumer(&self) -> MpmcConsumer {
        MpmcConsumer {
            state: Arc::clone(&self.state),
        }
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

    /// Absolute producer byte position (reservations included).
    pub fn producer_seq(&self) -> u64 {
        self.state.core.producer_seq()
    }

    /// Absolute consumer byte position (released records only).
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
    /// Not safe to call while any producer or consumer is active.
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

impl Clone for MpmcRing {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingClaim {
    payload_offset: usize,
    record_slot: usize,
    frame_length: i32,
    type_id: i32,
}

struct Reserved {
    record_slot: usize,
    padded: bool,
}

/// CAS-reserve space for one record, retrying under contention. The CAS on
/// the producer position is the reservation; padding is part of the same
/// update.
fn reserve(core: &RingCore, record_len: usize) -> Option<Reserved> {
    let trailer = core.trailer();
    let capacity = core.capacity() as u64;
    let mut strategy = IdleStrategy::new();
    loop {
        let consumer = trailer.consumer_position();
        let producer = trailer.producer_position();
        let slot = (producer & core.mask()) as usize;
        let to_end = core.capacity() - slot;
        let padding = if record_len > to_end { to_end } else { 0 };
        let required = (record_len + padding) as u64;

        if producer + required - consumer > capacity {
            return None;
        }
        debug_assert_bounded_fill!((producer + required - consumer) as usize, core.capacity());

        if trailer.cas_producer_position(producer, producer + required) {
            if padding > 0 {
                core.buffer()
                    .put_i64_ordered(slot, record::pack(padding as i32, PADDING_TYPE_ID));
            }
            return Some(Reserved {
                record_slot: if padding > 0 { 0 } else { slot },
                padded: padding > 0,
            });
        }
        strategy.idle();
    }
}

/// Write side of an [`MpmcRing`].
#[derive(Debug)]
pub struct MpmcProducer {
    state: Arc<MpmcState>,
    pending: Option<PendingClaim>,
}

impl MpmcProducer {
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

        // The reserved span reads as zeroes to consumers until the header
        // store below, so the payload can go in with plain writes.
        let buf = self.state.core.buffer();
        buf.put_bytes(reserved.record_slot + HEADER_LENGTH, msg);
        let frame = (msg.len() + HEADER_LENGTH) as i32;
        buf.put_i64_ordered(reserved.record_slot, record::pack(frame, type_id));

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
    /// The record is exclusively owned once the reservation CAS wins; it is
    /// marked in-progress until [`Self::publish`] or [`Self::abandon`]
    /// resolves it. Returns `Ok(None)` when the ring lacks space.
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
        });
        Ok(Some(payload_offset))
    }

    /// Commit the in-progress record claimed at `offset`.
    pub fn publish(&mut self, offset: usize) -> Result<(), RingError> {
        let claim = self.take_pending(offset)?;
        self.state.core.buffer().put_i64_ordered(
            claim.record_slot,
            record::pack(claim.frame_length, claim.type_id),
        );
        if self.state.enable_metrics {
            self.state.metrics.add_messages_offered(1);
        }
        Ok(())
    }

    /// Convert the in-progress record claimed at `offset` into padding.
    pub fn abandon(&mut self, offset: usize) -> Result<(), RingError> {
        let claim = self.take_pending(offset)?;
        self.state.core.buffer().put_i64_ordered(
            claim.record_slot,
            record::pack(claim.frame_length, PADDING_TYPE_ID),
        );
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

impl Drop for MpmcProducer {
    fn drop(&mut self) {
        // An unresolved claim would stall every consumer at its header;
        // turn it into padding on the way out.
        if let Some(claim) = self.pending.take() {
            self.state.core.buffer().put_i64_ordered(
                claim.record_slot,
                record::pack(claim.frame_length, PADDING_TYPE_ID),
            );
        }
    }
}

/// Zeroes a claimed record's span and advances the release boundary past
/// it, in claim order, on every exit path (including a panicking callback:
/// the record cannot be un-claimed, so it is released as consumed and the
/// panic propagates).
struct ReleaseGuard {
    trailer: Trailer,
    buf: AtomicBuffer,
    start: u64,
    slot: usize,
    length: usize,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.buf.set_memory(self.slot, self.length, 0);
        let mut strategy = IdleStrategy::new();
        while self.trailer.consumer_position() != self.start {
            strategy.idle();
        }
        self.trailer
            .store_consumer_position(self.start + self.length as u64);
    }
}

/// Read side of an [`MpmcRing`]. One handle per consumer thread; the
/// flyweight state lives in the handle.
#[derive(Debug)]
pub struct MpmcConsumer {
    state: Arc<MpmcState>,
}

impl MpmcConsumer {
    /// Claim the next record in position order. `None` when the ring is
    /// empty or the head record has not been published yet (callers
    /// re-poll later rather than spinning here).
    ///
    /// Claims advance an internal cursor; the public consumer position
    /// trails it and is advanced per record by [`ReleaseGuard`] — see the
    /// "release boundary" decision in DESIGN.md.
    fn claim_next(&self) -> Option<(i64, usize, ReleaseGuard)> {
        let core = &self.state.core;
        let trailer = core.trailer();
        let buf = core.buffer();
        loop {
            let claim = trailer.consumer_claim();
            let producer = trailer.producer_position();
            if claim >= producer {
                return None;
            }

            let slot = (claim & core.mask()) as usize;
            let header = buf.get_i64_volatile(slot);
            let frame = record::frame_length(header);
            if frame <= 0 {
                return None;
            }

            let aligned = record::align_up(frame as usize, RECORD_ALIGNMENT);
            if !trailer.cas_consumer_claim(claim, claim + aligned as u64) {
                continue; // another consumer won this record
            }

            return Some((
                header,
                slot,
                ReleaseGuard {
                    trailer,
                    buf,
                    start: claim,
                    slot,
                    length: aligned,
                },
            ));
        }
    }

    /// Consume up to `limit` records, invoking `handler` for each.
    ///
    /// Padding records are claimed and released internally and do not count
    /// against `limit`. Returns the number of records delivered.
    pub fn poll<F>(&mut self, limit: usize, mut handler: F) -> usize
    where
        F: FnMut(i32, ReadBuffer<'_>),
    {
        let mut count = 0usize;
        while count < limit {
            let Some((header, slot, guard)) = self.claim_next() else {
                break;
            };
            if record::type_id(header) != PADDING_TYPE_ID {
                let frame = record::frame_length(header) as usize;
                let buffer = self.state.core.buffer();
                let view = buffer.view(slot + HEADER_LENGTH, frame - HEADER_LENGTH);
                handler(record::type_id(header), view);
                count += 1;
            }
            drop(guard);
        }

        if self.state.enable_metrics && count > 0 {
            self.state.metrics.add_messages_polled(count as u64);
        }
        count
    }

    /// Consume every record published so far.
    pub fn poll_all<F>(&mut self, handler: F) -> usize
    where
        F: FnMut(i32, ReadBuffer<'_>),
    {
        self.poll(usize::MAX, handler)
    }

    /// Consume up to `limit` records under callback flow control.
    ///
    /// `Continue` and `Commit` coincide here: a claimed record is released
    /// as soon as its callback returns. `Abort` is unsupported — the record
    /// was already atomically claimed — and returns an error after the
    /// record has been released as consumed.
    pub fn controlled_poll<F>(&mut self, limit: usize, mut handler: F) -> Result<usize, RingError>
    where
        F: FnMut(i32, ReadBuffer<'_>) -> ConsumerAction,
    {
        let mut count = 0usize;
        let mut aborted = false;
        while count < limit {
            let Some((header, slot, guard)) = self.claim_next() else {
                break;
            };
            if record::type_id(header) == PADDING_TYPE_ID {
                drop(guard);
                continue;
            }

            let frame = record::frame_length(header) as usize;
            let buffer = self.state.core.buffer();
            let view = buffer.view(slot + HEADER_LENGTH, frame - HEADER_LENGTH);
            let action = handler(record::type_id(header), view);
            drop(guard);
            count += 1;

            match action {
                ConsumerAction::Continue | ConsumerAction::Commit => {}
                ConsumerAction::Break => break,
                ConsumerAction::Abort => {
                    aborted = true;
                    break;
                }
            }
        }

        if self.state.enable_metrics && count > 0 {
            self.state.metrics.add_messages_polled(count as u64);
        }
        if aborted {
            return Err(RingError::AbortUnsupported);
        }
        Ok(count)
    }

    /// Controlled-poll every record published so far.
    pub fn controlled_poll_all<F>(&mut self, handler: F) -> Result<usize, RingError>
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
