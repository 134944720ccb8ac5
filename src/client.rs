//! HTTP client construction and the fixed request headers
//!
//! Every request the measurement core makes goes through a `reqwest::Client`
//! built here. Endpoint pinning connects to a chosen IP while TLS still
//! presents the original hostname.

use crate::error::{AppError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use url::Url;

/// User agent of Apple's networkQuality tool, expected by the default CDN
pub const DEFAULT_USER_AGENT: &str = "networkQuality/194.80.3 CFNetwork/3860.400.51 Darwin/25.3.0";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TCP_KEEPALIVE: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const POOL_MAX_IDLE_PER_HOST: usize = 100;

/// Added on top of the per-thread timeout for the client-wide deadline
pub const CLIENT_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Client construction options
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Connect to this IP whenever the URL host equals this hostname
    pub pin: Option<(String, IpAddr)>,
    /// Whole-request deadline; `None` leaves it to per-request timeouts
    pub timeout: Option<Duration>,
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Pin `host` to `ip`; ignored when the host is empty
    pub fn with_pin(mut self, host: impl Into<String>, ip: IpAddr) -> Self {
        let host = host.into();
        if !host.is_empty() {
            self.pin = Some((host, ip));
        }
        self
    }
}

/// HTTP client factory
pub struct ClientFactory;

impl ClientFactory {
    pub fn build(options: &ClientOptions) -> Result<Client> {
        let mut builder = Client::builder()
            .use_rustls_tls()
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .connect_timeout(CONNECT_TIMEOUT)
            .tcp_keepalive(TCP_KEEPALIVE)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .user_agent(DEFAULT_USER_AGENT);

        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        // Port 0 keeps whatever port the URL names
        if let Some((host, ip)) = &options.pin {
            builder = builder.resolve(host, SocketAddr::new(*ip, 0));
        }

        builder
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {}", e)))
    }

    /// Client for one measurement run: per-thread timeout plus margin
    pub fn for_run(timeout: Duration, pin: Option<(String, IpAddr)>) -> Result<Client> {
        let mut options = ClientOptions::new().with_timeout(timeout + CLIENT_TIMEOUT_MARGIN);
        if let Some((host, ip)) = pin {
            options = options.with_pin(host, ip);
        }
        Self::build(&options)
    }
}

/// Headers sent with every probe and transfer request
pub fn request_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh-Hans;q=0.9"));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    headers
}

/// [`request_headers`] plus the resumable-upload draft headers
pub fn upload_headers() -> HeaderMap {
    let mut headers = request_headers();
    headers.insert(
        HeaderName::from_static("upload-draft-interop-version"),
        HeaderValue::from_static("6"),
    );
    headers.insert(HeaderName::from_static("upload-complete"), HeaderValue::from_static("?1"));
    headers
}

/// Hostname of `url`, or an empty string when it cannot be parsed
pub fn host_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(|host| host.trim_matches(['[', ']']).to_string()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_from_url() {
        assert_eq!(host_from_url("https://mensura.cdn-apple.com/api/v1/gm/large"), "mensura.cdn-apple.com");
        assert_eq!(host_from_url("http://127.0.0.1:8080/x"), "127.0.0.1");
        assert_eq!(host_from_url("http://[::1]:8080/x"), "::1");
        assert_eq!(host_from_url("not a url"), "");
    }

    #[test]
    fn test_request_headers() {
        let headers = request_headers();
        assert_eq!(headers[USER_AGENT], DEFAULT_USER_AGENT);
        assert_eq!(headers[ACCEPT], "*/*");
        assert_eq!(headers[ACCEPT_ENCODING], "identity");
        assert!(!headers.contains_key("upload-complete"));

        let upload = upload_headers();
        assert_eq!(upload["upload-draft-interop-version"], "6");
        assert_eq!(upload["upload-complete"], "?1");
        assert_eq!(upload[ACCEPT_LANGUAGE], "zh-CN,zh-Hans;q=0.9");
    }

    #[test]
    fn test_empty_pin_host_is_ignored() {
        let options = ClientOptions::new().with_pin("", "1.2.3.4".parse().unwrap());
        assert!(options.pin.is_none());

        let options = ClientOptions::new().with_pin("example.com", "1.2.3.4".parse().unwrap());
        assert_eq!(options.pin.as_ref().map(|(h, _)| h.as_str()), Some("example.com"));
    }

    #[test]
    fn test_build_clients() {
        assert!(ClientFactory::build(&ClientOptions::new()).is_ok());
        assert!(ClientFactory::for_run(
            Duration::from_secs(10),
            Some(("example.com".to_string(), "93.184.216.34".parse().unwrap()))
        )
        .is_ok());
    }
}
