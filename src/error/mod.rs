//! Error handling for the network speed tester
//!
//! The measurement core never aborts a run: transfer workers, DoH sub-queries
//! and IP-info attempts reduce their failures to empty or zero results. The
//! errors below describe why an individual step produced nothing, and the
//! startup failures (configuration, client construction) that do stop the
//! process.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Bad flag, environment variable or `.env` value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unparsable size string, URL or response body
    #[error("Parse error: {0}")]
    Parse(String),

    /// Connection could not be made or was cut short
    #[error("Network error: {0}")]
    Network(String),

    #[error("DNS error: {0}")]
    Dns(String),

    /// The server answered, but not with what was asked for
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(String),

    /// A bug or an environment the program cannot run in
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network(message.into())
    }

    pub fn dns<S: Into<String>>(message: S) -> Self {
        Self::Dns(message.into())
    }

    pub fn http<S: Into<String>>(message: S) -> Self {
        Self::Http(message.into())
    }

    /// Non-success HTTP status
    pub fn status(code: u16) -> Self {
        Self::Http(format!("HTTP {}", code))
    }

    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Short tag used in log fields
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Parse(_) => "PARSE",
            Self::Network(_) => "NETWORK",
            Self::Dns(_) => "DNS",
            Self::Http(_) => "HTTP",
            Self::Timeout(_) => "TIMEOUT",
            Self::Io(_) => "IO",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether another attempt of the same request could succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Dns(_) | Self::Http(_) | Self::Timeout(_))
    }

    /// Whether this error means the operation ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Process exit status when this error ends the program.
    ///
    /// 2 and 130 belong to degraded and interrupted runs, so every startup
    /// failure is 1 except internal errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Internal(_) => 99,
            _ => 1,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("invalid JSON: {}", error))
    }
}

impl From<std::num::ParseFloatError> for AppError {
    fn from(error: std::num::ParseFloatError) -> Self {
        Self::parse(format!("invalid number: {}", error))
    }
}

/// reqwest folds every failure into one type; split it back into what went
/// wrong so retries and DoH timeout accounting can tell them apart
impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(error.to_string())
        } else if error.is_decode() {
            Self::parse(error.to_string())
        } else if let Some(status) = error.status() {
            Self::status(status.as_u16())
        } else if error.is_connect() || error.is_request() || error.is_body() {
            Self::network(error.to_string())
        } else {
            Self::http(error.to_string())
        }
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::timeout("deadline elapsed")
    }
}

impl From<trust_dns_resolver::error::ResolveError> for AppError {
    fn from(error: trust_dns_resolver::error::ResolveError) -> Self {
        Self::dns(error.to_string())
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!(".env: {}", error))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
