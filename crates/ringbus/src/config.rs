/// Configuration for ring construction.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Data region capacity in bytes (power of two, 16 ..= 2^30).
    pub data_size: usize,
    /// Base alignment of an internally allocated region.
    pub alignment: usize,
    /// Enable metrics collection (slight overhead).
    pub enable_metrics: bool,
}

impl Config {
    /// Creates a configuration with the default 128-byte region alignment.
    ///
    /// Validation happens when the ring (or region) is constructed, so an
    /// out-of-range `data_size` surfaces there as an error.
    pub const fn new(data_size: usize, enable_metrics: bool) -> Self {
        Self {
            data_size,
            alignment: 128,
            enable_metrics,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_size: 1 << 16, // 64 KiB
            alignment: 128,
            enable_metrics: false,
        }
    }
}

/// Low latency configuration (16 KiB data region, fits in L1/L2).
pub const LOW_LATENCY_CONFIG: Config = Config::new(1 << 14, false);

/// High throughput configuration (1 MiB data region).
pub const HIGH_THROUGHPUT_CONFIG: Config = Config::new(1 << 20, false);
