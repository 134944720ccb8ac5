//! Structured diagnostics logging
//!
//! The event sink in [`crate::output`] is what the user reads; this logger is
//! for diagnosing the measurement core (DoH sub-query outcomes, worker exits,
//! IP-info retries, prompt cancellation). Entries always go to stderr so that
//! stdout stays clean for `--version` and `help` output.

use crate::error::AppError;
use crate::models::Config;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Severity, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    /// ANSI color for the level tag
    fn ansi(&self) -> &'static str {
        match self {
            LogLevel::Debug => "\x1b[36m",
            LogLevel::Info => "\x1b[32m",
            LogLevel::Warn => "\x1b[33m",
            LogLevel::Error => "\x1b[31m",
        }
    }

    /// Threshold selected by `--debug` / `--verbose`
    pub fn for_config(config: &Config) -> Self {
        if config.debug {
            LogLevel::Debug
        } else if config.verbose {
            LogLevel::Info
        } else {
            LogLevel::Warn
        }
    }
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// `HH:MM:SS.mmm LEVEL [component] message {fields}`
    Console,
    /// One JSON object per line
    Json,
}

/// One diagnostic record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// Component that produced the entry ("dns", "transfer", ...)
    pub component: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    /// Operation the entry belongs to, e.g. one speed test run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub fields: BTreeMap<String, serde_json::Value>,
    /// `file:line` of the call site
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Default)]
struct SessionContext {
    session_id: Option<String>,
    operation_id: Option<String>,
}

/// Component logger.
///
/// Clones and [`Logger::named`] derivatives share one session context, so a
/// logger can be handed to every spawned worker.
#[derive(Debug, Clone)]
pub struct Logger {
    threshold: LogLevel,
    format: LogFormat,
    use_color: bool,
    show_location: bool,
    component: String,
    context: Arc<RwLock<SessionContext>>,
}

impl Logger {
    /// Logger that only reports warnings and errors, as plain text
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            threshold: LogLevel::Warn,
            format: LogFormat::Console,
            use_color: false,
            show_location: false,
            component: component.into(),
            context: Arc::new(RwLock::new(SessionContext::default())),
        }
    }

    /// `--debug` selects JSON lines with call sites; `--verbose` adds info
    /// entries to the console format
    pub fn with_config(component: impl Into<String>, config: &Config) -> Self {
        Self {
            threshold: LogLevel::for_config(config),
            format: if config.debug { LogFormat::Json } else { LogFormat::Console },
            use_color: config.enable_color,
            show_location: config.debug,
            ..Self::new(component)
        }
    }

    /// Logger for another component, sharing this one's session
    pub fn named(&self, component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            ..self.clone()
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.threshold
    }

    pub async fn set_session_id(&self, session_id: String) {
        self.context.write().await.session_id = Some(session_id);
    }

    /// Tag subsequent entries with a fresh operation id and return it
    pub async fn start_operation(&self, name: &str) -> String {
        let id = Uuid::new_v4().to_string();
        self.context.write().await.operation_id = Some(id.clone());
        self.debug(&format!("{} started", name)).log().await;
        id
    }

    /// Close the operation started as `id`; a newer operation stays open
    pub async fn end_operation(&self, id: &str, name: &str, success: bool) {
        self.debug(&format!("{} finished", name))
            .field("success", success)
            .log()
            .await;

        let mut context = self.context.write().await;
        if context.operation_id.as_deref() == Some(id) {
            context.operation_id = None;
        }
    }

    /// Id of the operation currently tagging entries, if any
    pub async fn current_operation(&self) -> Option<String> {
        self.context.read().await.operation_id.clone()
    }

    pub fn entry(&self, level: LogLevel, message: &str) -> EntryBuilder<'_> {
        EntryBuilder {
            logger: self,
            entry: LogEntry {
                timestamp: Utc::now(),
                level,
                component: self.component.clone(),
                message: message.to_string(),
                session: None,
                operation: None,
                fields: BTreeMap::new(),
                location: None,
            },
        }
    }

    pub fn debug(&self, message: &str) -> EntryBuilder<'_> {
        self.entry(LogLevel::Debug, message)
    }

    pub fn info(&self, message: &str) -> EntryBuilder<'_> {
        self.entry(LogLevel::Info, message)
    }

    pub fn warn(&self, message: &str) -> EntryBuilder<'_> {
        self.entry(LogLevel::Warn, message)
    }

    async fn write(&self, mut entry: LogEntry) {
        if !self.enabled(entry.level) {
            return;
        }

        {
            let context = self.context.read().await;
            entry.session = context.session_id.clone();
            entry.operation = context.operation_id.clone();
        }

        let line = match self.format {
            LogFormat::Console => self.render_console(&entry),
            LogFormat::Json => render_json(&entry),
        };
        let _ = writeln!(io::stderr().lock(), "{}", line);
    }

    fn render_console(&self, entry: &LogEntry) -> String {
        let level = if self.use_color {
            format!("{}{:<5}\x1b[0m", entry.level.ansi(), entry.level.as_str())
        } else {
            format!("{:<5}", entry.level.as_str())
        };

        let mut line = format!(
            "{} {} [{}] {}",
            entry.timestamp.format("%H:%M:%S%.3f"),
            level,
            entry.component,
            entry.message
        );

        if let Some(operation) = &entry.operation {
            line.push_str(&format!(" op={}", operation.get(..8).unwrap_or(operation)));
        }
        if !entry.fields.is_empty() {
            let fields: Vec<String> = entry.fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            line.push_str(&format!(" {{{}}}", fields.join(", ")));
        }
        if self.show_location {
            if let Some(location) = &entry.location {
                line.push_str(&format!(" @ {}", location));
            }
        }
        line
    }
}

fn render_json(entry: &LogEntry) -> String {
    serde_json::to_string(entry)
        .unwrap_or_else(|e| format!("{{\"level\":\"error\",\"message\":\"unserializable log entry: {}\"}}", e))
}

/// Accumulates fields for one entry; nothing is written until [`EntryBuilder::log`]
pub struct EntryBuilder<'a> {
    logger: &'a Logger,
    entry: LogEntry,
}

impl EntryBuilder<'_> {
    pub fn field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.entry.fields.insert(key.to_string(), value);
        }
        self
    }

    pub fn at(mut self, file: &str, line: u32) -> Self {
        self.entry.location = Some(format!("{}:{}", file, line));
        self
    }

    /// Attach an error's message, category and whether a retry could help
    pub fn error_info(self, error: &AppError) -> Self {
        self.field("error", error.to_string())
            .field("category", error.category())
            .field("recoverable", error.is_recoverable())
    }

    pub async fn log(self) {
        self.logger.write(self.entry).await;
    }
}

#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)*) => {
        $logger.debug(&format!($($arg)*)).at(file!(), line!()).log().await
    };
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)*) => {
        $logger.info(&format!($($arg)*)).at(file!(), line!()).log().await
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> LogEntry {
        let mut fields = BTreeMap::new();
        fields.insert("slot".to_string(), serde_json::json!("cf-a"));
        fields.insert("addresses".to_string(), serde_json::json!(2));
        LogEntry {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            component: "dns".to_string(),
            message: "DoH sub-query finished".to_string(),
            session: Some("session-1".to_string()),
            operation: Some("0123456789abcdef".to_string()),
            fields,
            location: Some("src/dns/mod.rs:42".to_string()),
        }
    }

    #[test]
    fn test_thresholds_follow_flags() {
        let quiet = Logger::new("transfer");
        assert!(!quiet.enabled(LogLevel::Info));
        assert!(quiet.enabled(LogLevel::Warn));

        let verbose = Logger::with_config(
            "app",
            &Config {
                verbose: true,
                ..Default::default()
            },
        );
        assert!(verbose.enabled(LogLevel::Info));
        assert!(!verbose.enabled(LogLevel::Debug));
        assert_eq!(verbose.format, LogFormat::Console);

        let debug = Logger::with_config(
            "app",
            &Config {
                debug: true,
                ..Default::default()
            },
        );
        assert!(debug.enabled(LogLevel::Debug));
        assert!(debug.show_location);
        assert_eq!(debug.format, LogFormat::Json);
    }

    #[test]
    fn test_console_line() {
        let line = Logger::new("dns").render_console(&entry());
        assert!(line.contains(" INFO  [dns] DoH sub-query finished"));
        assert!(line.contains(" op=01234567"));
        // Fields are sorted by key
        assert!(line.contains("{addresses=2, slot=\"cf-a\"}"));
        assert!(!line.contains("src/dns/mod.rs"));
    }

    #[test]
    fn test_short_operation_id_is_kept_whole() {
        let mut entry = entry();
        entry.operation = Some("abc".to_string());
        assert!(Logger::new("dns").render_console(&entry).contains(" op=abc"));
    }

    #[test]
    fn test_json_line() {
        let json = render_json(&entry());
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["level"], "info");
        assert_eq!(value["component"], "dns");
        assert_eq!(value["fields"]["slot"], "cf-a");
        assert_eq!(value["location"], "src/dns/mod.rs:42");

        let mut bare = entry();
        bare.session = None;
        bare.fields.clear();
        let value: serde_json::Value = serde_json::from_str(&render_json(&bare)).unwrap();
        assert!(value.get("session").is_none());
        assert!(value.get("fields").is_none());
    }

    #[tokio::test]
    async fn test_named_loggers_share_session() {
        let root = Logger::new("runner");
        root.set_session_id("session-1".to_string()).await;
        let dns = root.named("dns");

        assert_eq!(dns.component(), "dns");
        assert_eq!(dns.context.read().await.session_id.as_deref(), Some("session-1"));
    }

    #[tokio::test]
    async fn test_operation_lifecycle() {
        let logger = Logger::new("runner");
        let first = logger.start_operation("speed test").await;
        assert_eq!(logger.current_operation().await, Some(first.clone()));

        // Ending a stale id leaves the current operation open
        let second = logger.start_operation("speed test").await;
        logger.end_operation(&first, "speed test", false).await;
        assert_eq!(logger.current_operation().await, Some(second.clone()));

        logger.end_operation(&second, "speed test", true).await;
        assert!(logger.current_operation().await.is_none());
    }

    #[tokio::test]
    async fn test_builder_attaches_error_info() {
        let logger = Logger::new("dns");
        let builder = logger
            .warn("sub-query failed")
            .field("slot", "ali-aaaa")
            .error_info(&AppError::status(502))
            .at("dns.rs", 12);

        assert_eq!(builder.entry.fields["category"], "HTTP");
        assert_eq!(builder.entry.fields["recoverable"], true);
        assert_eq!(builder.entry.location.as_deref(), Some("dns.rs:12"));
        builder.log().await;
    }
}
