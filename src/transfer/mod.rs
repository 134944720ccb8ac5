//! Multi-worker download and upload rounds
//!
//! All workers of one round add to a single atomic byte counter. A ticker
//! samples that counter for live progress, and the final counter value over
//! wall-clock time gives the round's throughput. Byte caps and timeouts are
//! per worker, not per round.

use crate::{
    client::{request_headers, upload_headers},
    config::human_bytes,
    log_debug,
    logging::Logger,
    models::{Config, Direction, TransferResult},
    output::EventSink,
};
use bytes::Bytes;
use futures::{stream, StreamExt};
use reqwest::{Body, Client};
use std::{
    io,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Progress sampling period
pub const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Extra time a round gets beyond the per-worker timeout
pub const DEADLINE_GRACE: Duration = Duration::from_secs(2);

const UPLOAD_CHUNK: usize = 64 * 1024;
static ZEROS: [u8; UPLOAD_CHUNK] = [0; UPLOAD_CHUNK];

/// Sizes of the zero chunks that make up one upload body
struct ZeroChunks {
    remaining: u64,
}

impl Iterator for ZeroChunks {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let len = self.remaining.min(UPLOAD_CHUNK as u64) as usize;
        self.remaining -= len as u64;
        Some(len)
    }
}

/// Runs transfer rounds with one client and one set of limits
#[derive(Clone)]
pub struct TransferEngine {
    client: Client,
    max_bytes: u64,
    timeout: Duration,
    tick: Duration,
    logger: Logger,
}

impl TransferEngine {
    /// `max_bytes` and `timeout` apply to each worker separately
    pub fn new(client: Client, max_bytes: u64, timeout: Duration, logger: Logger) -> Self {
        Self {
            client,
            max_bytes,
            timeout,
            tick: TICK_INTERVAL,
            logger,
        }
    }

    pub fn from_config(client: Client, config: &Config, logger: Logger) -> Self {
        Self::new(client, config.max_bytes, config.timeout(), logger)
    }

    pub fn with_tick_interval(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Run `threads` workers against `url` and aggregate their bytes.
    ///
    /// Returns once every worker has finished, the round deadline (per-worker
    /// timeout plus [`DEADLINE_GRACE`]) has passed, or `token` is cancelled.
    pub async fn run(
        &self,
        direction: Direction,
        threads: usize,
        url: &str,
        sink: Arc<dyn EventSink>,
        token: &CancellationToken,
    ) -> TransferResult {
        let round = token.child_token();
        let total = Arc::new(AtomicI64::new(0));
        let start = Instant::now();

        let ticker = tokio::spawn(progress_loop(
            direction,
            self.tick,
            start,
            total.clone(),
            sink,
            round.clone(),
        ));

        let mut workers = JoinSet::new();
        for worker in 0..threads {
            let engine = self.clone();
            let url = url.to_string();
            let total = total.clone();
            let round = round.clone();
            workers.spawn(async move {
                let bytes = tokio::select! {
                    _ = round.cancelled() => None,
                    bytes = tokio::time::timeout(engine.timeout, engine.worker(direction, &url, &total)) => bytes.ok(),
                };
                log_debug!(engine.logger, "{} worker {} finished: {:?} bytes credited", direction, worker, bytes);
            });
        }

        let deadline = self.timeout + DEADLINE_GRACE;
        let drained = tokio::time::timeout(deadline, async {
            while workers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            log_debug!(self.logger, "{} round hit its {:?} deadline", direction, deadline);
        }

        // Stops the ticker and any worker still running after the deadline
        round.cancel();
        while workers.join_next().await.is_some() {}
        let _ = ticker.await;

        let bytes = total.load(Ordering::SeqCst).max(0) as u64;
        TransferResult::new(direction, threads, bytes, start.elapsed())
    }

    async fn worker(&self, direction: Direction, url: &str, total: &Arc<AtomicI64>) -> i64 {
        match direction {
            Direction::Download => self.download(url, total).await,
            Direction::Upload => self.upload(url, total).await,
        }
    }

    /// Read the body until the cap, EOF or a read error. Error statuses
    /// contribute nothing.
    async fn download(&self, url: &str, total: &AtomicI64) -> i64 {
        let response = match self.client.get(url).headers(request_headers()).send().await {
            Ok(response) => response,
            Err(_) => return 0,
        };
        if response.status().as_u16() >= 400 {
            return 0;
        }

        let cap = self.max_bytes as i64;
        let mut received: i64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(_) => break,
            };
            let len = (chunk.len() as i64).min(cap - received);
            received += len;
            total.fetch_add(len, Ordering::SeqCst);
            if received >= cap {
                break;
            }
        }
        received
    }

    /// PUT a zero body of the worker's cap. Bytes are counted as the HTTP
    /// layer pulls them; an error status rolls the whole contribution back.
    async fn upload(&self, url: &str, total: &Arc<AtomicI64>) -> i64 {
        let sent = Arc::new(AtomicI64::new(0));

        let body_sent = sent.clone();
        let body_total = total.clone();
        let chunks = stream::iter(ZeroChunks { remaining: self.max_bytes }).map(move |len| {
            body_sent.fetch_add(len as i64, Ordering::SeqCst);
            body_total.fetch_add(len as i64, Ordering::SeqCst);
            Ok::<Bytes, io::Error>(Bytes::from_static(&ZEROS).slice(..len))
        });

        let response = match self
            .client
            .put(url)
            .headers(upload_headers())
            .body(Body::wrap_stream(chunks))
            .send()
            .await
        {
            Ok(response) => response,
            Err(_) => return sent.load(Ordering::SeqCst),
        };

        let status = response.status();
        let _ = response.bytes().await;

        if status.as_u16() >= 400 {
            let rejected = sent.load(Ordering::SeqCst);
            total.fetch_sub(rejected, Ordering::SeqCst);
            log_debug!(self.logger, "Upload rejected with {}, rolled back {} bytes", status, rejected);
            return 0;
        }
        sent.load(Ordering::SeqCst)
    }
}

/// Emit average throughput since `start` every `tick` until `stop` fires
async fn progress_loop(
    direction: Direction,
    tick: Duration,
    start: Instant,
    total: Arc<AtomicI64>,
    sink: Arc<dyn EventSink>,
    stop: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = ticker.tick() => {
                let bytes = total.load(Ordering::SeqCst).max(0) as u64;
                let elapsed = start.elapsed().as_secs_f64();
                if elapsed > 0.0 {
                    let mbps = bytes as f64 * 8.0 / (elapsed * 1_000_000.0);
                    sink.progress(
                        direction.as_str(),
                        &format!("{:.1} Mbps  {}  {:.1}s", mbps, human_bytes(bytes), elapsed),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::latency::LatencyProber;
    use crate::output::{EventKind, MemorySink};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MIB: usize = 1024 * 1024;

    fn engine(max_bytes: u64, timeout: Duration) -> TransferEngine {
        TransferEngine::new(Client::new(), max_bytes, timeout, Logger::new("transfer-test"))
    }

    fn sink() -> (Arc<MemorySink>, Arc<dyn EventSink>) {
        let memory = Arc::new(MemorySink::new());
        let dynamic: Arc<dyn EventSink> = memory.clone();
        (memory, dynamic)
    }

    #[test]
    fn test_zero_chunks_cover_the_cap() {
        let sizes: Vec<usize> = ZeroChunks { remaining: (UPLOAD_CHUNK * 2 + 10) as u64 }.collect();
        assert_eq!(sizes, vec![UPLOAD_CHUNK, UPLOAD_CHUNK, 10]);
        assert_eq!(ZeroChunks { remaining: 0 }.count(), 0);
    }

    #[tokio::test]
    async fn test_loaded_latency_samples_alongside_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/large"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![1u8; 256 * 1024])
                    .set_delay(Duration::from_millis(400)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/small"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 16]))
            .mount(&server)
            .await;

        let token = CancellationToken::new();
        let prober = LatencyProber::new(Client::new(), format!("{}/small", server.uri()), Logger::new("latency-test"));
        let loaded = prober.start_loaded(&token);

        let (_, events) = sink();
        let started = Instant::now();
        let result = engine(MIB as u64, Duration::from_secs(5))
            .run(Direction::Download, 2, &format!("{}/large", server.uri()), events, &token)
            .await;
        let elapsed = started.elapsed();
        let stats = loaded.stop().await;

        assert_eq!(result.total_bytes, 2 * 256 * 1024);
        assert!(elapsed >= Duration::from_millis(400));
        assert!(elapsed < Duration::from_secs(5), "transfer waited on the sampler: {:?}", elapsed);
        assert!(stats.n > 0);
        assert!(stats.min <= stats.median && stats.median <= stats.max);
    }

    #[tokio::test]
    async fn test_single_thread_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/large"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 2 * MIB]))
            .mount(&server)
            .await;

        let (_, events) = sink();
        let result = engine(2 * MIB as u64, Duration::from_secs(10))
            .run(Direction::Download, 1, &format!("{}/large", server.uri()), events, &CancellationToken::new())
            .await;

        assert_eq!(result.direction, Direction::Download);
        assert_eq!(result.threads, 1);
        assert!(result.total_bytes > 0);
        assert!(result.total_bytes <= 2 * MIB as u64);
        assert!(result.mbps > 0.0);
    }

    #[tokio::test]
    async fn test_download_respects_per_worker_cap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; MIB]))
            .mount(&server)
            .await;

        let (_, events) = sink();
        let result = engine(100_000, Duration::from_secs(10))
            .run(Direction::Download, 3, &server.uri(), events, &CancellationToken::new())
            .await;

        assert_eq!(result.total_bytes, 300_000);
    }

    #[tokio::test]
    async fn test_download_error_status_counts_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_bytes(vec![0u8; 4096]))
            .mount(&server)
            .await;

        let (_, events) = sink();
        let result = engine(MIB as u64, Duration::from_secs(5))
            .run(Direction::Download, 2, &server.uri(), events, &CancellationToken::new())
            .await;

        assert_eq!(result.total_bytes, 0);
        assert_eq!(result.mbps, 0.0);
    }

    #[tokio::test]
    async fn test_upload_credits_every_byte() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/slurp"))
            .and(header("upload-complete", "?1"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (_, events) = sink();
        let result = engine(200_000, Duration::from_secs(10))
            .run(Direction::Upload, 2, &format!("{}/slurp", server.uri()), events, &CancellationToken::new())
            .await;

        assert_eq!(result.direction, Direction::Upload);
        assert_eq!(result.total_bytes, 400_000);
    }

    #[tokio::test]
    async fn test_rejected_upload_is_rolled_back() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1..)
            .mount(&server)
            .await;

        let (_, events) = sink();
        let result = engine(200_000, Duration::from_secs(10))
            .run(Direction::Upload, 1, &server.uri(), events, &CancellationToken::new())
            .await;

        assert_eq!(result.total_bytes, 0);
    }

    #[tokio::test]
    async fn test_progress_is_reported_while_running() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 1024]).set_delay(Duration::from_millis(400)))
            .mount(&server)
            .await;

        let (memory, events) = sink();
        engine(1024, Duration::from_secs(5))
            .with_tick_interval(Duration::from_millis(50))
            .run(Direction::Download, 1, &server.uri(), events, &CancellationToken::new())
            .await;

        let progress: Vec<_> = memory.events().into_iter().filter(|e| e.kind == EventKind::Progress).collect();
        assert!(!progress.is_empty());
        assert!(progress.iter().all(|e| e.label == "Download" && e.value.contains(" Mbps  ")));
    }

    #[tokio::test]
    async fn test_cancellation_ends_round_early() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 1024]).set_delay(Duration::from_secs(20)))
            .mount(&server)
            .await;

        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        });

        let (_, events) = sink();
        let started = Instant::now();
        let result = engine(MIB as u64, Duration::from_secs(30))
            .run(Direction::Download, 4, &server.uri(), events, &token)
            .await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(result.total_bytes, 0);
    }

    #[tokio::test]
    async fn test_worker_timeout_bounds_the_round() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(20)))
            .mount(&server)
            .await;

        let (_, events) = sink();
        let started = Instant::now();
        engine(MIB as u64, Duration::from_millis(300))
            .run(Direction::Download, 2, &server.uri(), events, &CancellationToken::new())
            .await;

        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
