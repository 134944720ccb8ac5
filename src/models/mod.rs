//! Data models shared by the measurement core and the runner

pub mod config;
pub mod metrics;

pub use config::Config;
pub use metrics::{Direction, Endpoint, IpInfo, LatencyStats, TransferResult};
