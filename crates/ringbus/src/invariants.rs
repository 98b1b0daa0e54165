//! Debug assertion macros for the ring buffer protocol invariants.
//!
//! Active only in debug builds (`#[cfg(debug_assertions)]` via
//! `debug_assert!`), so there is zero overhead on release hot paths.

/// Assert that a buffer access of `size` bytes at `index` stays inside a
/// view of `len` bytes.
macro_rules! debug_assert_in_bounds {
    ($index:expr, $size:expr, $len:expr) => {
        debug_assert!(
            $index + $size <= $len,
            "access of {} bytes at index {} overruns view of {} bytes",
            $size,
            $index,
            $len
        )
    };
}

/// Assert that an atomic access lands on a naturally aligned address.
macro_rules! debug_assert_atomic_aligned {
    ($addr:expr, $align:expr) => {
        debug_assert!(
            ($addr as usize) % $align == 0,
            "atomic access at address {:#x} is not {}-byte aligned",
            $addr as usize,
            $align
        )
    };
}

/// Assert that the bytes in flight never exceed the data region capacity.
///
/// Holds as `producer - consumer <= capacity` after every reservation.
macro_rules! debug_assert_bounded_fill {
    ($fill:expr, $capacity:expr) => {
        debug_assert!(
            $fill <= $capacity,
            "ring fill of {} bytes exceeds capacity {}",
            $fill,
            $capacity
        )
    };
}

/// Assert that a position only moves forward.
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "{} position decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

/// Assert that a consumed byte count stays within what the producer has
/// published.
macro_rules! debug_assert_within_available {
    ($bytes:expr, $available:expr) => {
        debug_assert!(
            $bytes <= $available,
            "consumed {} bytes but only {} were published",
            $bytes,
            $available
        )
    };
}

pub(crate) use debug_assert_atomic_aligned;
pub(crate) use debug_assert_bounded_fill;
pub(crate) use debug_assert_in_bounds;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_within_available;
