//! Endpoint selection: resolve the transfer host, describe each candidate
//! address, and settle on the one to pin connections to

pub mod ipinfo;
pub mod prompt;

pub use ipinfo::{describe_info, IpDescriber, IpInfoClient};
pub use prompt::{parse_choice, ChoicePrompt, TerminalPrompt};

use crate::{
    dns::HostResolver,
    i18n::Lang,
    log_debug,
    logging::Logger,
    models::Endpoint,
    output::EventSink,
};
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Drives DoH resolution, candidate descriptions and the optional prompt
pub struct EndpointSelector {
    resolver: Arc<dyn HostResolver>,
    describer: Arc<dyn IpDescriber>,
    prompt: Arc<dyn ChoicePrompt>,
    lang: Lang,
    interactive: bool,
    logger: Logger,
}

impl EndpointSelector {
    /// `interactive` enables the prompt when more than one candidate exists
    pub fn new(
        resolver: Arc<dyn HostResolver>,
        describer: Arc<dyn IpDescriber>,
        prompt: Arc<dyn ChoicePrompt>,
        lang: Lang,
        interactive: bool,
        logger: Logger,
    ) -> Self {
        Self {
            resolver,
            describer,
            prompt,
            lang,
            interactive,
            logger,
        }
    }

    /// Pick an endpoint for `host`. `None` means connections use default DNS.
    pub async fn choose(&self, host: &str, sink: &dyn EventSink, token: &CancellationToken) -> Option<Endpoint> {
        let lang = self.lang;
        sink.header(lang.text("Endpoint Selection", "节点选择"));

        if host.is_empty() {
            sink.warn(lang.text(
                "Could not parse host from DL_URL. Skip endpoint selection.",
                "无法从 DL_URL 解析主机，跳过节点选择。",
            ));
            return None;
        }
        sink.info(&format!("{}{}", lang.text("Host: ", "主机: "), host));

        let resolution = self.resolver.resolve_dual(host, token).await;
        log_debug!(
            self.logger,
            "DoH for {}: {} candidate(s), cf_timed_out={}, ali_timed_out={}",
            host,
            resolution.ips.len(),
            resolution.cf_timed_out,
            resolution.ali_timed_out
        );

        if resolution.ips.is_empty() {
            if resolution.needs_system_fallback() {
                sink.warn(lang.text(
                    "Dual DoH (CF + Ali) both timed out. Fallback to system DNS.",
                    "双 DoH（CF + Ali）均超时，回退系统 DNS。",
                ));
                if let Some(ip) = self.resolver.resolve_system(host).await {
                    let endpoint = Endpoint::new(ip, lang.text("system DNS fallback", "系统 DNS 回退"));
                    self.announce(&endpoint, sink);
                    return Some(endpoint);
                }
            } else {
                sink.warn(lang.text(
                    "Dual DoH returned no endpoint, continue with default DNS.",
                    "双 DoH 未返回节点，继续使用默认 DNS。",
                ));
            }
            sink.warn(lang.text(
                "Could not resolve endpoint IP, continue with default DNS.",
                "无法解析节点 IP，继续使用默认 DNS。",
            ));
            return None;
        }

        let descriptions = join_all(resolution.ips.iter().map(|ip| self.describer.describe(*ip, token))).await;
        let endpoints: Vec<Endpoint> = resolution
            .ips
            .iter()
            .zip(descriptions)
            .map(|(ip, description)| Endpoint::new(*ip, description))
            .collect();

        sink.info(lang.text("Available endpoints:", "可用节点:"));
        for (i, endpoint) in endpoints.iter().enumerate() {
            sink.info(&format!("  {}) {}  {}", i + 1, endpoint.ip, endpoint.description));
        }

        let mut choice = 0;
        if endpoints.len() > 1 && self.interactive {
            // Candidate lines must be on screen before the question
            sink.flush().await;
            match self.prompt.choose(endpoints.len(), sink, token).await {
                Some(index) => choice = index,
                None => return None,
            }
        }

        let selected = endpoints.into_iter().nth(choice)?;
        self.announce(&selected, sink);
        Some(selected)
    }

    fn announce(&self, endpoint: &Endpoint, sink: &dyn EventSink) {
        sink.info(&match self.lang {
            Lang::En => format!("Selected endpoint: {} ({})", endpoint.ip, endpoint.description),
            Lang::Zh => format!("已选择节点: {} ({})", endpoint.ip, endpoint.description),
        });
    }
}
