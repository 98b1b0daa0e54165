use thiserror::Error;

/// Error types for ring buffer operations.
///
/// Transient conditions are not errors: a full ring is reported through
/// `offer` returning `Ok(false)` or `claim` returning `Ok(None)`, and an
/// empty ring through `poll` returning 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingError {
    /// Message type ids below 1 are reserved by the wire protocol.
    #[error("message type id must be >= 1 (got {0})")]
    InvalidTypeId(i32),
    /// The payload can never fit, even in an empty ring.
    #[error("message length {length} exceeds max payload length {max}")]
    MessageTooLong {
        /// Requested payload length in bytes.
        length: usize,
        /// Largest payload the ring can carry.
        max: usize,
    },
    /// The data region capacity must be a power of two within the supported range.
    #[error("data capacity must be a power of two in [16, 2^30] (got {0})")]
    InvalidCapacity(usize),
    /// Region alignment must be a power of two of at least 8 bytes.
    #[error("region alignment must be a power of two >= 8 (got {0})")]
    InvalidAlignment(usize),
    /// The underlying allocator could not satisfy the request.
    #[error("allocation of {0} bytes failed")]
    AllocationFailed(usize),
    /// A zero-copy claim is already outstanding on this producer.
    #[error("a claim is already outstanding on this producer")]
    ClaimOutstanding,
    /// `publish`/`abandon` was handed an offset that does not name an
    /// in-progress claim.
    #[error("offset {0} does not name an in-progress claim")]
    InvalidClaim(usize),
    /// Multi-consumer polls cannot roll back an atomically claimed record.
    #[error("abort is not supported by multi-consumer polls")]
    AbortUnsupported,
    /// The single producer handle has already been attached.
    #[error("producer handle already attached")]
    ProducerAttached,
    /// The single consumer handle has already been attached.
    #[error("consumer handle already attached")]
    ConsumerAttached,
}
