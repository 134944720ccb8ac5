//! Hostname resolution for endpoint selection
//!
//! Two DNS-over-HTTPS providers are asked for both A and AAAA records at the
//! same time. Their answers are merged in a fixed slot order (CF-A, CF-AAAA,
//! Ali-A, Ali-AAAA) regardless of which query finishes first. The system
//! resolver is only consulted when both providers timed out.

use crate::{
    error::{AppError, Result},
    log_debug,
    logging::Logger,
};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{header::ACCEPT, Client, StatusCode};
use serde::Deserialize;
use std::{
    collections::HashSet,
    net::IpAddr,
    sync::OnceLock,
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use trust_dns_resolver::{system_conf, TokioAsyncResolver};

/// Cloudflare JSON endpoint; `{name}` and `{type}` are substituted per query
pub const CLOUDFLARE_TEMPLATE: &str = "https://cloudflare-dns.com/dns-query?name={name}&type={type}";

/// AliDNS short-form endpoint
pub const ALIDNS_TEMPLATE: &str = "https://dns.alidns.com/resolve?name={name}&type={type}&short=1";

/// Deadline for one sub-query, covering both the request and the body read
pub const DOH_QUERY_TIMEOUT: Duration = Duration::from_secs(1);

const DNS_JSON: &str = "application/dns-json";

fn ipv4_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("ipv4 pattern compiles"))
}

fn ipv6_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)(?:[0-9a-f]{0,4}:){2,7}[0-9a-f]{0,4}").expect("ipv6 pattern compiles"))
}

/// DNS record type asked of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    A,
    Aaaa,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }
}

/// Outcome of one provider/record-type query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DohQueryResult {
    /// Addresses in order of first appearance, without duplicates
    pub ips: Vec<IpAddr>,
    pub timed_out: bool,
    pub error: Option<String>,
}

impl DohQueryResult {
    fn failed(error: &AppError) -> Self {
        Self {
            ips: Vec::new(),
            timed_out: error.is_timeout(),
            error: Some(error.to_string()),
        }
    }
}

/// Merged answer of both providers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DohResolution {
    pub ips: Vec<IpAddr>,
    /// Both Cloudflare queries timed out
    pub cf_timed_out: bool,
    /// Both AliDNS queries timed out
    pub ali_timed_out: bool,
}

impl DohResolution {
    /// Merge the four sub-query results given in slot order
    pub fn from_results(cf_a: &DohQueryResult, cf_aaaa: &DohQueryResult, ali_a: &DohQueryResult, ali_aaaa: &DohQueryResult) -> Self {
        Self {
            ips: merge_ips(&[cf_a.ips.as_slice(), cf_aaaa.ips.as_slice(), ali_a.ips.as_slice(), ali_aaaa.ips.as_slice()]),
            cf_timed_out: cf_a.timed_out && cf_aaaa.timed_out,
            ali_timed_out: ali_a.timed_out && ali_aaaa.timed_out,
        }
    }

    /// Whether the caller should fall back to system DNS
    pub fn needs_system_fallback(&self) -> bool {
        self.ips.is_empty() && self.cf_timed_out && self.ali_timed_out
    }
}

/// Resolution seam used by the endpoint selector
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Query both DoH providers for `host`
    async fn resolve_dual(&self, host: &str, token: &CancellationToken) -> DohResolution;

    /// First IPv4 address from the system resolver
    async fn resolve_system(&self, host: &str) -> Option<IpAddr>;
}

#[derive(Deserialize)]
struct DohAnswer {
    #[serde(default)]
    data: String,
}

#[derive(Deserialize)]
struct DohResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

/// Extract addresses from a DoH response body.
///
/// The JSON `Answer[].data` form is tried first. When that yields nothing the
/// raw text is scanned for IPv4 and IPv6 literals, kept in textual order.
pub fn extract_ips_from_body(body: &str) -> Vec<IpAddr> {
    if let Ok(response) = serde_json::from_str::<DohResponse>(body) {
        let mut seen = HashSet::new();
        let ips: Vec<IpAddr> = response
            .answer
            .iter()
            .filter_map(|answer| answer.data.trim().parse::<IpAddr>().ok())
            .filter(|ip| seen.insert(*ip))
            .collect();
        if !ips.is_empty() {
            return ips;
        }
    }

    let mut matches: Vec<(usize, &str)> = ipv4_pattern()
        .find_iter(body)
        .chain(ipv6_pattern().find_iter(body))
        .map(|m| (m.start(), m.as_str()))
        .collect();
    matches.sort_by_key(|(position, _)| *position);

    let mut seen = HashSet::new();
    matches
        .into_iter()
        .filter_map(|(_, text)| text.parse::<IpAddr>().ok())
        .filter(|ip| seen.insert(*ip))
        .collect()
}

/// Concatenate address lists in order, keeping only first occurrences
pub fn merge_ips(lists: &[&[IpAddr]]) -> Vec<IpAddr> {
    let mut seen = HashSet::new();
    lists
        .iter()
        .flat_map(|list| list.iter().copied())
        .filter(|ip| seen.insert(*ip))
        .collect()
}

/// Dual-provider DoH resolver with system DNS fallback
#[derive(Clone)]
pub struct DohResolver {
    client: Client,
    cloudflare_template: String,
    alidns_template: String,
    query_timeout: Duration,
    logger: Logger,
}

impl DohResolver {
    pub fn new(client: Client, logger: Logger) -> Self {
        Self {
            client,
            cloudflare_template: CLOUDFLARE_TEMPLATE.to_string(),
            alidns_template: ALIDNS_TEMPLATE.to_string(),
            query_timeout: DOH_QUERY_TIMEOUT,
            logger,
        }
    }

    /// Replace the provider URL templates
    pub fn with_templates(mut self, cloudflare: impl Into<String>, alidns: impl Into<String>) -> Self {
        self.cloudflare_template = cloudflare.into();
        self.alidns_template = alidns.into();
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    fn query_url(template: &str, host: &str, record: RecordType) -> String {
        template.replace("{name}", host).replace("{type}", record.as_str())
    }

    /// Run one sub-query. Cancellation of `token` ends it without marking a
    /// timeout; only the per-query deadline does that.
    pub async fn query(&self, template: &str, host: &str, record: RecordType, json: bool, token: &CancellationToken) -> DohQueryResult {
        let url = Self::query_url(template, host, record);

        let outcome = tokio::select! {
            _ = token.cancelled() => Err(AppError::network("DoH query cancelled")),
            result = tokio::time::timeout(self.query_timeout, self.fetch(&url, json)) => match result {
                Ok(inner) => inner,
                Err(elapsed) => Err(elapsed.into()),
            },
        };

        match outcome {
            Ok(ips) => {
                log_debug!(self.logger, "DoH {} {}: {} address(es)", url, record.as_str(), ips.len());
                DohQueryResult { ips, timed_out: false, error: None }
            }
            Err(e) => {
                self.logger
                    .debug("DoH sub-query failed")
                    .field("url", &url)
                    .field("record", record.as_str())
                    .error_info(&e)
                    .at(file!(), line!())
                    .log()
                    .await;
                DohQueryResult::failed(&e)
            }
        }
    }

    async fn fetch(&self, url: &str, json: bool) -> Result<Vec<IpAddr>> {
        let mut request = self.client.get(url);
        if json {
            request = request.header(ACCEPT, DNS_JSON);
        }

        let response = request.send().await?;
        if response.status() != StatusCode::OK {
            return Err(AppError::status(response.status().as_u16()));
        }

        let body = response.text().await?;
        Ok(extract_ips_from_body(&body))
    }
}

#[async_trait]
impl HostResolver for DohResolver {
    async fn resolve_dual(&self, host: &str, token: &CancellationToken) -> DohResolution {
        let cf = self.cloudflare_template.as_str();
        let ali = self.alidns_template.as_str();

        let (cf_a, cf_aaaa, ali_a, ali_aaaa) = tokio::join!(
            self.query(cf, host, RecordType::A, true, token),
            self.query(cf, host, RecordType::Aaaa, true, token),
            self.query(ali, host, RecordType::A, false, token),
            self.query(ali, host, RecordType::Aaaa, false, token),
        );

        DohResolution::from_results(&cf_a, &cf_aaaa, &ali_a, &ali_aaaa)
    }

    async fn resolve_system(&self, host: &str) -> Option<IpAddr> {
        match system_lookup(host).await {
            Ok(ips) => first_ipv4(&ips),
            Err(e) => {
                log_debug!(self.logger, "System DNS lookup for {} failed: {}", host, e);
                None
            }
        }
    }
}

fn first_ipv4(ips: &[IpAddr]) -> Option<IpAddr> {
    ips.iter().copied().find(IpAddr::is_ipv4)
}

/// Resolve through the system configuration, or the OS resolver when that
/// configuration cannot be read
pub async fn system_lookup(host: &str) -> Result<Vec<IpAddr>> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![ip]);
    }

    match system_conf::read_system_conf() {
        Ok((config, opts)) => {
            let resolver = TokioAsyncResolver::tokio(config, opts);
            let lookup = resolver.lookup_ip(host).await?;
            Ok(lookup.iter().collect())
        }
        Err(_) => {
            let addrs = tokio::net::lookup_host((host, 0))
                .await
                .map_err(|e| AppError::dns(format!("Lookup failed for {}: {}", host, e)))?;
            Ok(addrs.map(|addr| addr.ip()).collect())
        }
    }
}

/// First IPv4 address of `host` from system DNS
pub async fn resolve_host(host: &str) -> Option<IpAddr> {
    system_lookup(host).await.ok().and_then(|ips| first_ipv4(&ips))
}
