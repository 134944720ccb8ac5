//! ip-api.com lookups: endpoint descriptions and connection information

use crate::{
    error::{AppError, Result},
    i18n::Lang,
    log_debug,
    logging::Logger,
    models::IpInfo,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::{future::Future, net::IpAddr, time::Duration};
use tokio_util::sync::CancellationToken;

pub const IP_API_BASE: &str = "http://ip-api.com/json/";

pub const DESCRIBE_TIMEOUT: Duration = Duration::from_secs(4);
pub const INFO_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_STEP: Duration = Duration::from_millis(500);

const DESCRIBE_FIELDS: &str = "status,city,regionName,country,as,org";
const SELF_INFO_FIELDS: &str = "status,query,as,isp,city,regionName,country";
const TARGET_INFO_FIELDS: &str = "status,query,as,isp,org,city,regionName,country";

/// Produces the human-readable label shown next to a candidate address
#[async_trait]
pub trait IpDescriber: Send + Sync {
    async fn describe(&self, ip: IpAddr, token: &CancellationToken) -> String;
}

/// `City, Region, Country (AS…)`; the region is skipped when it repeats the
/// city and the ASN falls back to the organisation
pub fn describe_info(info: &IpInfo, lang: Lang) -> String {
    let mut location = info.location_or(lang.text("unknown location", "未知位置"));

    let asn = if info.asn.is_empty() { &info.org } else { &info.asn };
    if !asn.is_empty() {
        location.push_str(&format!(" ({})", asn));
    }
    location
}

/// Client for ip-api.com with bounded retries
#[derive(Clone)]
pub struct IpInfoClient {
    client: Client,
    base_url: String,
    lang: Lang,
    backoff_step: Duration,
    logger: Logger,
}

impl IpInfoClient {
    pub fn new(client: Client, lang: Lang, logger: Logger) -> Self {
        Self {
            client,
            base_url: IP_API_BASE.to_string(),
            lang,
            backoff_step: BACKOFF_STEP,
            logger,
        }
    }

    /// Point at another ip-api compatible server; must end with `/`
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_backoff_step(mut self, step: Duration) -> Self {
        self.backoff_step = step;
        self
    }

    /// Lookup URL for `target`; an empty target asks about the caller itself
    pub fn lookup_url(&self, target: &str, fields: &str) -> String {
        let suffix = if self.lang.is_zh() { "&lang=zh-CN" } else { "" };
        format!("{}{}?fields={}{}", self.base_url, target, fields, suffix)
    }

    /// Run `attempt` up to three times, sleeping `n × step` before attempt
    /// `n`. Gives up early when `token` is cancelled.
    async fn with_retries<T, F, Fut>(&self, what: &str, token: &CancellationToken, attempt: F) -> Option<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        for n in 0..MAX_ATTEMPTS {
            if n > 0 {
                tokio::select! {
                    _ = token.cancelled() => return None,
                    _ = tokio::time::sleep(self.backoff_step * n) => {}
                }
            }

            let outcome = tokio::select! {
                _ = token.cancelled() => return None,
                outcome = attempt() => outcome,
            };
            match outcome {
                Ok(value) => return Some(value),
                Err(e) => log_debug!(self.logger, "{} attempt {} failed: {}", what, n + 1, e),
            }
        }
        None
    }

    async fn get_info(&self, url: &str, timeout: Duration) -> Result<IpInfo> {
        let response = self.client.get(url).timeout(timeout).send().await?;
        if response.status() != StatusCode::OK {
            return Err(AppError::status(response.status().as_u16()));
        }
        Ok(response.json::<IpInfo>().await?)
    }

    async fn fetch_description(&self, ip: IpAddr) -> Result<String> {
        let url = self.lookup_url(&ip.to_string(), DESCRIBE_FIELDS);
        let info = self.get_info(&url, DESCRIBE_TIMEOUT).await?;
        if info.status != "success" {
            return Err(AppError::http(format!("ip-api status: {}", info.status)));
        }
        Ok(describe_info(&info, self.lang))
    }

    async fn fetch_info_once(&self, target: &str) -> Result<IpInfo> {
        let fields = if target.is_empty() { SELF_INFO_FIELDS } else { TARGET_INFO_FIELDS };
        let info = self.get_info(&self.lookup_url(target, fields), INFO_TIMEOUT).await?;
        if !info.status.is_empty() && info.status != "success" {
            return Err(AppError::http(format!("ip-api status: {}", info.status)));
        }
        Ok(info)
    }

    /// Connection information for `target`, or for this host when empty.
    /// Exhausted retries yield an empty record.
    pub async fn fetch_info(&self, target: &str, token: &CancellationToken) -> IpInfo {
        self.with_retries("ip info", token, || self.fetch_info_once(target))
            .await
            .unwrap_or_default()
    }
}

#[async_trait]
impl IpDescriber for IpInfoClient {
    async fn describe(&self, ip: IpAddr, token: &CancellationToken) -> String {
        match self.with_retries("ip description", token, || self.fetch_description(ip)).await {
            Some(description) => description,
            None => self.lang.text("lookup failed", "查询失败").to_string(),
        }
    }
}
