//! Configuration data model and validation

use crate::config::size::parse_size;
use crate::defaults;
use crate::error::{AppError, Result};
use crate::i18n::Lang;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Download test URL
    #[serde(default = "default_dl_url")]
    pub dl_url: String,

    /// Upload test URL
    #[serde(default = "default_ul_url")]
    pub ul_url: String,

    /// Latency test URL
    #[serde(default = "default_latency_url")]
    pub latency_url: String,

    /// Per-thread transfer cap as written by the user
    #[serde(default = "default_max")]
    pub max: String,

    /// `max` parsed into bytes; filled in by [`Config::validate`]
    #[serde(default)]
    pub max_bytes: u64,

    /// Per-thread timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,

    /// Concurrent transfer workers for the multi-thread rounds
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Idle latency probes
    #[serde(default = "default_latency_count")]
    pub latency_count: usize,

    #[serde(default)]
    pub lang: Lang,

    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dl_url: default_dl_url(),
            ul_url: default_ul_url(),
            latency_url: default_latency_url(),
            max: default_max(),
            max_bytes: defaults::DEFAULT_MAX_BYTES,
            timeout_seconds: default_timeout_secs(),
            threads: default_threads(),
            latency_count: default_latency_count(),
            lang: Lang::En,
            enable_color: default_enable_color(),
            verbose: false,
            debug: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-thread timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Validate the configuration, resolving `max_bytes` from `max`.
    ///
    /// Checks run in a fixed order so the first reported problem is stable:
    /// size, lower bounds, upper bounds, then URL schemes.
    pub fn validate(&mut self) -> Result<()> {
        let lang = self.lang;

        self.max_bytes = parse_size(&self.max).map_err(|e| {
            AppError::config(format!(
                "{} {:?}: {}",
                lang.text("invalid MAX", "MAX 值无效"),
                self.max,
                e
            ))
        })?;

        if self.max_bytes == 0 {
            return Err(AppError::config(lang.text("MAX must be > 0", "MAX 必须大于 0")));
        }
        if self.timeout_seconds == 0 {
            return Err(AppError::config(lang.text("TIMEOUT must be > 0", "TIMEOUT 必须大于 0")));
        }
        if self.threads == 0 {
            return Err(AppError::config(lang.text("THREADS must be > 0", "THREADS 必须大于 0")));
        }
        if self.latency_count == 0 {
            return Err(AppError::config(lang.text(
                "LATENCY_COUNT must be > 0",
                "LATENCY_COUNT 必须大于 0",
            )));
        }
        if self.timeout_seconds > defaults::MAX_TIMEOUT_SECS {
            return Err(AppError::config(lang.text(
                "TIMEOUT must be <= 120",
                "TIMEOUT 必须小于等于 120",
            )));
        }
        if self.threads > defaults::MAX_THREADS {
            return Err(AppError::config(lang.text("THREADS must be <= 64", "THREADS 必须小于等于 64")));
        }
        if self.latency_count > defaults::MAX_LATENCY_COUNT {
            return Err(AppError::config(lang.text(
                "LATENCY_COUNT must be <= 100",
                "LATENCY_COUNT 必须小于等于 100",
            )));
        }

        for (name, value) in [
            ("DL_URL", &self.dl_url),
            ("UL_URL", &self.ul_url),
            ("LATENCY_URL", &self.latency_url),
        ] {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                return Err(AppError::config(format!(
                    "{} {}",
                    name,
                    lang.text("must start with http(s)://", "必须以 http(s):// 开头")
                )));
            }
        }

        Ok(())
    }

    /// Merge environment variables into this configuration
    pub fn merge_from_env(&mut self) {
        self.merge_from_lookup(|key| std::env::var(key).ok());
    }

    /// Merge from an arbitrary variable lookup.
    ///
    /// Empty values are ignored. Integers that fail to parse keep the current
    /// value; negative integers become zero so that validation reports them.
    pub fn merge_from_lookup<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(value) = non_empty("DL_URL") {
            self.dl_url = value;
        }
        if let Some(value) = non_empty("UL_URL") {
            self.ul_url = value;
        }
        if let Some(value) = non_empty("LATENCY_URL") {
            self.latency_url = value;
        }
        if let Some(value) = non_empty("MAX") {
            self.max = value;
        }
        if let Some(value) = non_empty("TIMEOUT").and_then(|v| parse_env_int(&v)) {
            self.timeout_seconds = value;
        }
        if let Some(value) = non_empty("THREADS").and_then(|v| parse_env_int(&v)) {
            self.threads = value as usize;
        }
        if let Some(value) = non_empty("LATENCY_COUNT").and_then(|v| parse_env_int(&v)) {
            self.latency_count = value as usize;
        }
    }

    /// One-line settings summary shown under the banner
    pub fn summary(&self) -> String {
        match self.lang {
            Lang::Zh => format!(
                "超时={}s  上限={}  线程={}  延迟采样={}",
                self.timeout_seconds, self.max, self.threads, self.latency_count
            ),
            Lang::En => format!(
                "timeout={}s  max={}  threads={}  latency_count={}",
                self.timeout_seconds, self.max, self.threads, self.latency_count
            ),
        }
    }
}

fn parse_env_int(value: &str) -> Option<u64> {
    value.trim().parse::<i64>().ok().map(|n| n.max(0) as u64)
}

fn default_dl_url() -> String {
    defaults::DEFAULT_DL_URL.to_string()
}

fn default_ul_url() -> String {
    defaults::DEFAULT_UL_URL.to_string()
}

fn default_latency_url() -> String {
    defaults::DEFAULT_LATENCY_URL.to_string()
}

fn default_max() -> String {
    defaults::DEFAULT_MAX.to_string()
}

fn default_timeout_secs() -> u64 {
    defaults::DEFAULT_TIMEOUT_SECS
}

fn default_threads() -> usize {
    defaults::DEFAULT_THREADS
}

fn default_latency_count() -> usize {
    defaults::DEFAULT_LATENCY_COUNT
}

fn default_enable_color() -> bool {
    defaults::DEFAULT_ENABLE_COLOR
}
