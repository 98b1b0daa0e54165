//! RingBus - Lock-Free Ring Buffers for Variable-Sized Message Records
//!
//! Bounded, allocation-free, off-heap message transports: records carry a
//! packed 64-bit header and an arbitrary byte payload, laid out contiguously
//! in a power-of-two data region with a 128-byte metadata trailer behind it.
//!
//! # Key Features
//!
//! - Single-producer/single-consumer and multi-producer/multi-consumer
//!   variants over the same wire layout
//! - Copy-in (`offer`) and zero-copy (`claim`/`publish`/`abandon`) write
//!   paths
//! - Bounded polling with flow control (`controlled_poll`)
//! - Cache-line-aware trailer layout, release/acquire publication, padding
//!   records across the wrap-around
//! - Correlation-id minting and a heartbeat slot for liveness
//!
//! # Example
//!
//! ```
//! use ringbus_rs::{Config, SpscRing};
//!
//! let ring = SpscRing::new(Config::new(1024, false)).unwrap();
//! let mut producer = ring.producer().unwrap();
//! let mut consumer = ring.consumer().unwrap();
//!
//! // Copy-in path
//! assert!(producer.offer(7, &[1, 2, 3, 4]).unwrap());
//!
//! // Zero-copy path
//! if let Some(offset) = producer.claim(8, 4).unwrap() {
//!     producer.buffer().put_bytes(offset, &[5, 6, 7, 8]);
//!     producer.publish(offset).unwrap();
//! }
//!
//! let polled = consumer.poll_all(|type_id, msg| {
//!     println!("kind {type_id}: {} bytes", msg.len());
//! });
//! assert_eq!(polled, 2);
//! ```

mod buffer;
mod config;
mod control;
mod descriptor;
mod error;
mod idle;
mod invariants;
mod metrics;
mod mpmc;
mod record;
mod region;
mod spsc;

pub use buffer::{AtomicBuffer, ReadBuffer};
pub use config::{Config, HIGH_THROUGHPUT_CONFIG, LOW_LATENCY_CONFIG};
pub use control::ConsumerAction;
pub use descriptor::TRAILER_LENGTH;
pub use error::RingError;
pub use idle::IdleStrategy;
pub use metrics::MetricsSnapshot;
pub use mpmc::{MpmcConsumer, MpmcProducer, MpmcRing};
pub use record::{HEADER_LENGTH, PADDING_TYPE_ID, RECORD_ALIGNMENT};
pub use region::AlignedRegion;
pub use spsc::{SpscConsumer, SpscProducer, SpscRing};
