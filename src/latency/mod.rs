//! Round-trip latency probes
//!
//! A probe is one GET against the latency URL, timed from request start
//! until the body has been drained. Idle mode takes a fixed number of
//! sequential samples; loaded mode samples back-to-back in a background task
//! while a transfer runs.

use crate::{client::request_headers, log_debug, logging::Logger, models::LatencyStats};
use futures::StreamExt;
use reqwest::Client;
use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Upper bound for a single probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Issues latency probes against one URL
#[derive(Clone)]
pub struct LatencyProber {
    client: Client,
    url: String,
    timeout: Duration,
    logger: Logger,
}

impl LatencyProber {
    pub fn new(client: Client, url: impl Into<String>, logger: Logger) -> Self {
        Self {
            client,
            url: url.into(),
            timeout: PROBE_TIMEOUT,
            logger,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Time one request in milliseconds; `None` on any failure or cancellation
    pub async fn probe(&self, token: &CancellationToken) -> Option<f64> {
        tokio::select! {
            _ = token.cancelled() => None,
            result = tokio::time::timeout(self.timeout, self.timed_request()) => result.ok().flatten(),
        }
    }

    async fn timed_request(&self) -> Option<f64> {
        let start = Instant::now();
        let response = self
            .client
            .get(&self.url)
            .headers(request_headers())
            .send()
            .await
            .ok()?;

        // Drain errors end the drain, not the sample
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            if chunk.is_err() {
                break;
            }
        }

        Some(start.elapsed().as_micros() as f64 / 1000.0)
    }

    /// Take up to `count` sequential samples, stopping early once cancelled
    pub async fn measure_idle(&self, count: usize, token: &CancellationToken) -> LatencyStats {
        let mut samples = Vec::with_capacity(count);
        for _ in 0..count {
            if token.is_cancelled() {
                break;
            }
            if let Some(ms) = self.probe(token).await {
                samples.push(ms);
            }
        }

        log_debug!(self.logger, "Idle latency: {} of {} probes succeeded", samples.len(), count);
        LatencyStats::from_samples(&samples)
    }

    /// Start sampling in the background until [`LoadedProbe::stop`] or until
    /// `token` is cancelled
    pub fn start_loaded(&self, token: &CancellationToken) -> LoadedProbe {
        let stop = token.child_token();
        let samples = Arc::new(Mutex::new(Vec::new()));

        let prober = self.clone();
        let loop_token = stop.clone();
        let loop_samples = samples.clone();
        let handle = tokio::spawn(async move {
            while !loop_token.is_cancelled() {
                if let Some(ms) = prober.probe(&loop_token).await {
                    if let Ok(mut samples) = loop_samples.lock() {
                        samples.push(ms);
                    }
                }
            }
        });

        LoadedProbe {
            stop,
            samples,
            handle,
            logger: self.logger.clone(),
        }
    }
}

/// Background sampling started by [`LatencyProber::start_loaded`]
pub struct LoadedProbe {
    stop: CancellationToken,
    samples: Arc<Mutex<Vec<f64>>>,
    handle: JoinHandle<()>,
    logger: Logger,
}

impl LoadedProbe {
    /// Stop sampling, wait for the loop to exit, and summarize what it collected
    pub async fn stop(self) -> LatencyStats {
        self.stop.cancel();
        let _ = self.handle.await;

        let samples = self.samples.lock().map(|samples| samples.clone()).unwrap_or_default();
        log_debug!(self.logger, "Loaded latency: {} samples", samples.len());
        LatencyStats::from_samples(&samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn small_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/small"))
            .and(header("accept-encoding", "identity"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 32]).set_delay(Duration::from_millis(2)))
            .mount(&server)
            .await;
        server
    }

    fn prober(url: String) -> LatencyProber {
        LatencyProber::new(Client::new(), url, Logger::new("latency-test"))
    }

    #[tokio::test]
    async fn test_idle_collects_every_sample() {
        let server = small_server().await;
        let stats = prober(format!("{}/small", server.uri()))
            .measure_idle(5, &CancellationToken::new())
            .await;

        assert_eq!(stats.n, 5);
        assert!(stats.min > 0.0);
        assert!(stats.min <= stats.median && stats.median <= stats.max);
    }

    #[tokio::test]
    async fn test_failed_probes_are_not_recorded() {
        // Nothing listens on port 9 of the loopback in the test environment
        let stats = prober("http://127.0.0.1:9/small".to_string())
            .with_timeout(Duration::from_millis(200))
            .measure_idle(3, &CancellationToken::new())
            .await;
        assert_eq!(stats, LatencyStats::empty());
    }

    #[tokio::test]
    async fn test_idle_stops_when_cancelled() {
        let server = small_server().await;
        let token = CancellationToken::new();
        token.cancel();

        let stats = prober(format!("{}/small", server.uri())).measure_idle(5, &token).await;
        assert_eq!(stats.n, 0);
    }

    #[tokio::test]
    async fn test_probe_timeout_returns_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let sample = prober(server.uri())
            .with_timeout(Duration::from_millis(100))
            .probe(&CancellationToken::new())
            .await;
        assert!(sample.is_none());
    }

    #[tokio::test]
    async fn test_loaded_probe_collects_until_stopped() {
        let server = small_server().await;
        let token = CancellationToken::new();
        let loaded = prober(format!("{}/small", server.uri())).start_loaded(&token);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let stats = loaded.stop().await;

        assert!(stats.n > 0);
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_loaded_probe_ends_with_parent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let token = CancellationToken::new();
        let loaded = prober(server.uri()).start_loaded(&token);
        token.cancel();

        let stats = tokio::time::timeout(Duration::from_secs(1), loaded.stop())
            .await
            .expect("stop returns promptly after cancellation");
        assert_eq!(stats.n, 0);
    }
}
