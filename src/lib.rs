//! Network Speed Tester
//!
//! Measures idle and loaded latency plus single- and multi-threaded
//! download/upload throughput against an HTTP(S) endpoint. Connections can be
//! pinned to an address chosen from dual DNS-over-HTTPS lookups.

pub mod app;
pub mod cli;
pub mod client;
pub mod config;
pub mod dns;
pub mod endpoint;
pub mod error;
pub mod i18n;
pub mod latency;
pub mod logging;
pub mod models;
pub mod output;
pub mod stats;
pub mod transfer;

// Re-export commonly used types
pub use app::App;
pub use error::{AppError, Result};
pub use i18n::Lang;
pub use models::{Config, Direction, Endpoint, LatencyStats, TransferResult};
pub use output::{Bus, Event, EventKind, EventSink};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const GIT_COMMIT: &str = env!("GIT_COMMIT");
pub const BUILD_TIME: &str = env!("BUILD_TIME");

/// Default configuration values
pub mod defaults {
    pub const DEFAULT_DL_URL: &str = "https://mensura.cdn-apple.com/api/v1/gm/large";
    pub const DEFAULT_UL_URL: &str = "https://mensura.cdn-apple.com/api/v1/gm/slurp";
    pub const DEFAULT_LATENCY_URL: &str = "https://mensura.cdn-apple.com/api/v1/gm/small";

    /// Per-thread byte cap, as written in configuration
    pub const DEFAULT_MAX: &str = "2G";
    pub const DEFAULT_MAX_BYTES: u64 = 2_000_000_000;
    pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
    pub const DEFAULT_THREADS: usize = 4;
    pub const DEFAULT_LATENCY_COUNT: usize = 20;
    pub const DEFAULT_ENABLE_COLOR: bool = true;

    pub const MAX_TIMEOUT_SECS: u64 = 120;
    pub const MAX_THREADS: usize = 64;
    pub const MAX_LATENCY_COUNT: usize = 100;
}
