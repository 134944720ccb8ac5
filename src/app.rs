//! Main application orchestration and execution
//!
//! The pipeline is fixed: endpoint selection, connection information, idle
//! latency, four transfer rounds (download and upload, single and multi
//! thread) each with loaded latency, then the summary.

use crate::{
    client::{host_from_url, ClientFactory, ClientOptions},
    config::human_bytes,
    dns::{self, DohResolver, HostResolver},
    endpoint::{ChoicePrompt, EndpointSelector, IpInfoClient, TerminalPrompt},
    error::Result,
    i18n::Lang,
    latency::LatencyProber,
    log_info,
    logging::Logger,
    models::{Config, Direction, Endpoint, IpInfo, LatencyStats},
    output::EventSink,
    transfer::TransferEngine,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const EXIT_OK: i32 = 0;
/// A client or server lookup came back empty
pub const EXIT_DEGRADED: i32 = 2;
pub const EXIT_INTERRUPTED: i32 = 130;

/// Runs one complete speed test
pub struct App {
    config: Config,
    sink: Arc<dyn EventSink>,
    interactive: bool,
    ip_api_base: Option<String>,
    doh_templates: Option<(String, String)>,
    logger: Logger,
}

impl App {
    /// `interactive` allows the endpoint prompt; pass whether output is a terminal
    pub fn new(config: Config, sink: Arc<dyn EventSink>, interactive: bool) -> Self {
        let logger = Logger::with_config("runner", &config);
        Self {
            config,
            sink,
            interactive,
            ip_api_base: None,
            doh_templates: None,
            logger,
        }
    }

    /// Log through `logger` instead of one derived from the configuration
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Use another ip-api compatible server for lookups
    pub fn with_ip_api_base(mut self, base: impl Into<String>) -> Self {
        self.ip_api_base = Some(base.into());
        self
    }

    /// Replace the Cloudflare and AliDNS query templates
    pub fn with_doh_templates(mut self, cloudflare: impl Into<String>, alidns: impl Into<String>) -> Self {
        self.doh_templates = Some((cloudflare.into(), alidns.into()));
        self
    }

    fn text<'a>(&self, en: &'a str, zh: &'a str) -> &'a str {
        self.config.lang.text(en, zh)
    }

    /// Close the run's log operation as failed and report the interruption
    async fn interrupted(&self, session: &str) -> i32 {
        self.logger.end_operation(session, "speed test", false).await;
        self.sink.warn(self.text("Interrupted.", "已中断。"));
        EXIT_INTERRUPTED
    }

    fn ip_info_client(&self, lookup_client: reqwest::Client) -> IpInfoClient {
        let client = IpInfoClient::new(lookup_client, self.config.lang, self.logger.named("ipinfo"));
        match &self.ip_api_base {
            Some(base) => client.with_base_url(base.clone()),
            None => client,
        }
    }

    /// Run the pipeline and return the process exit code. Only client
    /// construction can fail; measurement problems end up in the output.
    pub async fn run(&self, token: &CancellationToken) -> Result<i32> {
        let config = &self.config;
        let sink = self.sink.as_ref();
        self.logger.set_session_id(Uuid::new_v4().to_string()).await;
        let session = self.logger.start_operation("speed test").await;
        let mut degraded = false;

        sink.line();
        sink.banner("⚡ iNetSpeed-CLI");
        sink.info(&format!("{}{}", self.text("Config:  ", "配置:  "), config.summary()));
        sink.line();

        sink.header(self.text("Environment Check", "环境检查"));
        sink.info(self.text(
            "Native binary, no external dependencies required.",
            "原生二进制程序，无需外部依赖。",
        ));

        if token.is_cancelled() {
            return Ok(self.interrupted(&session).await);
        }

        let lookup_client = ClientFactory::build(&ClientOptions::new())?;
        let ip_info = self.ip_info_client(lookup_client.clone());

        let host = host_from_url(&config.dl_url);
        let endpoint = self.select_endpoint(&host, lookup_client, &ip_info, token).await;

        let pin = endpoint.as_ref().map(|endpoint| (host.clone(), endpoint.ip));
        let client = ClientFactory::for_run(config.timeout(), pin)?;

        if token.is_cancelled() {
            return Ok(self.interrupted(&session).await);
        }

        if !self.gather_info(&ip_info, &host, endpoint.as_ref(), token).await {
            degraded = true;
        }

        if token.is_cancelled() {
            return Ok(self.interrupted(&session).await);
        }

        let prober = LatencyProber::new(client.clone(), &config.latency_url, self.logger.named("latency"));
        sink.header(self.text("Idle Latency", "空载延迟"));
        sink.info(&format!("{}{}", self.text("Endpoint: ", "端点: "), config.latency_url));
        sink.info(&match config.lang {
            Lang::En => format!("Samples: {}", config.latency_count),
            Lang::Zh => format!("采样: {}", config.latency_count),
        });

        let idle = prober.measure_idle(config.latency_count, token).await;
        sink.result(&format_idle(&idle, config.lang));

        let engine = TransferEngine::from_config(client, config, self.logger.named("transfer"));
        let rounds = [
            (Direction::Download, 1, self.text("Download (single thread)", "下载（单线程）"), &config.dl_url),
            (Direction::Download, config.threads, self.text("Download (multi-thread)", "下载（多线程）"), &config.dl_url),
            (Direction::Upload, 1, self.text("Upload (single thread)", "上传（单线程）"), &config.ul_url),
            (Direction::Upload, config.threads, self.text("Upload (multi-thread)", "上传（多线程）"), &config.ul_url),
        ];

        let mut total_data: u64 = 0;
        for (direction, threads, label, url) in rounds {
            if token.is_cancelled() {
                break;
            }
            total_data += self.run_round(&engine, &prober, direction, threads, label, url, token).await;
        }

        if token.is_cancelled() {
            return Ok(self.interrupted(&session).await);
        }

        sink.line();
        sink.banner(self.text("📊 Summary", "📊 测速汇总"));
        sink.line();
        sink.kv(
            self.text("Idle Latency", "空载延迟"),
            &match config.lang {
                Lang::En => format!("{:.2} ms  (jitter {:.2} ms)", idle.median, idle.jitter),
                Lang::Zh => format!("{:.2} 毫秒  (抖动 {:.2} 毫秒)", idle.median, idle.jitter),
            },
        );
        sink.kv(self.text("Data Used", "消耗流量"), &human_bytes(total_data));
        sink.line();
        sink.info(self.text("All tests complete.", "所有测试完成。"));
        sink.line();

        self.logger.end_operation(&session, "speed test", true).await;
        log_info!(self.logger, "Run finished: degraded={}, data used={} bytes", degraded, total_data);

        Ok(if degraded { EXIT_DEGRADED } else { EXIT_OK })
    }

    async fn select_endpoint(
        &self,
        host: &str,
        lookup_client: reqwest::Client,
        ip_info: &IpInfoClient,
        token: &CancellationToken,
    ) -> Option<Endpoint> {
        let mut resolver = DohResolver::new(lookup_client, self.logger.named("dns"));
        if let Some((cloudflare, alidns)) = &self.doh_templates {
            resolver = resolver.with_templates(cloudflare.clone(), alidns.clone());
        }
        let resolver: Arc<dyn HostResolver> = Arc::new(resolver);
        let prompt: Arc<dyn ChoicePrompt> = Arc::new(TerminalPrompt::new(
            self.config.lang,
            self.config.enable_color,
            self.logger.named("prompt"),
        ));

        let selector = EndpointSelector::new(
            resolver,
            Arc::new(ip_info.clone()),
            prompt,
            self.config.lang,
            self.interactive,
            self.logger.named("endpoint"),
        );
        selector.choose(host, self.sink.as_ref(), token).await
    }

    /// Connection information section; false when the client or server
    /// address stayed unknown
    async fn gather_info(&self, ip_info: &IpInfoClient, host: &str, endpoint: Option<&Endpoint>, token: &CancellationToken) -> bool {
        let sink = self.sink.as_ref();
        let mut complete = true;
        sink.header(self.text("Connection Information", "连接信息"));

        let own = ip_info.fetch_info("", token).await;
        let client_ip = or_unknown(&own.query);
        if client_ip == "?" {
            complete = false;
        }
        sink.kv(self.text("Client", "客户端"), &format!("{}  ({})", client_ip, or_unknown(&own.isp)));
        sink.kv("  ASN", or_unknown(&own.asn));
        sink.kv(self.text("  Location", "  位置"), &own.location());

        let mut server_ip = endpoint.map(|endpoint| endpoint.ip);
        if server_ip.is_none() && !host.is_empty() {
            server_ip = dns::resolve_host(host).await;
        }
        let server_label = server_ip.map(|ip| ip.to_string()).unwrap_or_else(|| "?".to_string());
        sink.kv(self.text("Server", "服务端"), &format!("{}  →  {}", host, server_label));
        if let Some(endpoint) = endpoint {
            sink.kv(self.text("  Endpoint", "  节点"), &endpoint.description);
        }

        match server_ip {
            Some(ip) => {
                let server = ip_info.fetch_info(&ip.to_string(), token).await;
                sink.kv("  ASN", &server_asn(&server));
                sink.kv(self.text("  Location", "  位置"), &server.location());
            }
            None => complete = false,
        }

        complete
    }

    /// One transfer round with loaded latency; returns the bytes it moved
    #[allow(clippy::too_many_arguments)]
    async fn run_round(
        &self,
        engine: &TransferEngine,
        prober: &LatencyProber,
        direction: Direction,
        threads: usize,
        label: &str,
        url: &str,
        token: &CancellationToken,
    ) -> u64 {
        let config = &self.config;
        let sink = self.sink.as_ref();
        let lang = config.lang;

        sink.header(label);
        sink.info(&match lang {
            Lang::En => format!("Threads: {}", threads),
            Lang::Zh => format!("线程: {}", threads),
        });
        sink.info(&match lang {
            Lang::En => format!("Limit: {} / {}s per thread", config.max, config.timeout_seconds),
            Lang::Zh => format!("上限: {} / 每线程 {}s", config.max, config.timeout_seconds),
        });

        let loaded = prober.start_loaded(token);
        let result = engine.run(direction, threads, url, self.sink.clone(), token).await;
        let loaded = loaded.stop().await;

        let moved = human_bytes(result.total_bytes);
        let secs = result.duration.as_secs_f64();
        sink.result(&match (lang, threads <= 1) {
            (Lang::En, true) => format!("{:.0} Mbps  ({} in {:.1}s)", result.mbps, moved, secs),
            (Lang::Zh, true) => format!("{:.0} Mbps  ({}，耗时 {:.1}s)", result.mbps, moved, secs),
            (Lang::En, false) => format!("{:.0} Mbps  ({} in {:.1}s, {} threads)", result.mbps, moved, secs, threads),
            (Lang::Zh, false) => format!("{:.0} Mbps  ({}，耗时 {:.1}s，{} 线程)", result.mbps, moved, secs, threads),
        });
        sink.info(&match lang {
            Lang::En => format!("Loaded latency: {:.2} ms  (jitter {:.2} ms)", loaded.median, loaded.jitter),
            Lang::Zh => format!("负载延迟: {:.2} 毫秒  (抖动 {:.2} 毫秒)", loaded.median, loaded.jitter),
        });

        result.total_bytes
    }
}

/// Idle latency result line
pub fn format_idle(stats: &LatencyStats, lang: Lang) -> String {
    match lang {
        Lang::En => format!(
            "{:.2} ms median  (min {:.2} / avg {:.2} / max {:.2})  jitter {:.2} ms",
            stats.median, stats.min, stats.avg, stats.max, stats.jitter
        ),
        Lang::Zh => format!(
            "{:.2} 毫秒 中位数  (最小 {:.2} / 平均 {:.2} / 最大 {:.2})  抖动 {:.2} 毫秒",
            stats.median, stats.min, stats.avg, stats.max, stats.jitter
        ),
    }
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() {
        "?"
    } else {
        value
    }
}

fn server_asn(info: &IpInfo) -> String {
    let asn = if info.asn.is_empty() { &info.org } else { &info.asn };
    or_unknown(asn).to_string()
}
