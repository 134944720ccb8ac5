//! Measurement result data models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Latency statistics over a set of successful probes.
///
/// All values are milliseconds rounded to two decimals. `n == 0` means no
/// probe succeeded and every other field is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub min: f64,
    pub avg: f64,
    pub median: f64,
    pub max: f64,
    /// Mean absolute difference between consecutive sorted samples
    pub jitter: f64,
    pub n: usize,
}

impl LatencyStats {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_samples(samples: &[f64]) -> Self {
        crate::stats::compute(samples)
    }
}

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Download,
    Upload,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Download => "Download",
            Direction::Upload => "Upload",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate outcome of one transfer round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferResult {
    pub direction: Direction,
    pub threads: usize,
    pub total_bytes: u64,
    pub duration: Duration,
    pub mbps: f64,
}

impl TransferResult {
    /// Build a result, substituting one second for a zero duration
    pub fn new(direction: Direction, threads: usize, total_bytes: u64, elapsed: Duration) -> Self {
        let duration = if elapsed.is_zero() {
            Duration::from_secs(1)
        } else {
            elapsed
        };
        Self {
            direction,
            threads,
            total_bytes,
            duration,
            mbps: mbps(total_bytes, duration),
        }
    }
}

/// Megabits per second for `bytes` moved in `elapsed`
pub fn mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    bytes as f64 * 8.0 / (secs * 1_000_000.0)
}

/// A resolved address chosen for connection pinning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub ip: IpAddr,
    pub description: String,
}

impl Endpoint {
    pub fn new(ip: IpAddr, description: impl Into<String>) -> Self {
        Self {
            ip,
            description: description.into(),
        }
    }
}

/// Subset of the ip-api.com response used for connection information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpInfo {
    pub status: String,
    pub query: String,
    #[serde(rename = "as")]
    pub asn: String,
    pub isp: String,
    pub org: String,
    pub city: String,
    #[serde(rename = "regionName")]
    pub region_name: String,
    pub country: String,
}

impl IpInfo {
    /// `City, Region, Country`, with the region dropped when it equals the city
    pub fn location(&self) -> String {
        self.location_or("?")
    }

    /// [`IpInfo::location`] with `placeholder` when no part is known
    pub fn location_or(&self, placeholder: &str) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(3);
        if !self.city.is_empty() {
            parts.push(&self.city);
        }
        if !self.region_name.is_empty() && self.region_name != self.city {
            parts.push(&self.region_name);
        }
        if !self.country.is_empty() {
            parts.push(&self.country);
        }
        if parts.is_empty() {
            placeholder.to_string()
        } else {
            parts.join(", ")
        }
    }
}
