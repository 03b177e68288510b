//! Fetch-cycle state machine.
//!
//! ```text
//! IDLE ─► RESOLVING ─► CONNECTING ─► SENDING ─► RECEIVING ─► DONE ─► IDLE
//!             │             │            │                      (idle wait)
//!             └─────────────┴────────────┴──► RETRY_WAIT ─► RESOLVING
//! ```
//!
//! One [`SessionDriver`] owns the socket, the receive chunk and the response
//! buffer for the whole cycle. The buffer is released at the end of every
//! cycle, whatever the outcome, so memory never accumulates across retries.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;

use crate::backoff::BackoffPolicy;
use crate::buffer::ResponseBuffer;
use crate::config::Config;
use crate::error::{FailureClass, FetchError};
use crate::extract::FieldExtractor;
use crate::http::{find_body, status_code, RequestTemplate};
use crate::net::{LinkMonitor, Network};
use crate::sample::{Mailbox, WeatherSample};

const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CHUNK_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Resolving,
    Connecting,
    Sending,
    Receiving,
    Done,
    RetryWait,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "IDLE",
            SessionState::Resolving => "RESOLVING",
            SessionState::Connecting => "CONNECTING",
            SessionState::Sending => "SENDING",
            SessionState::Receiving => "RECEIVING",
            SessionState::Done => "DONE",
            SessionState::RetryWait => "RETRY_WAIT",
        };
        f.write_str(name)
    }
}

/// Result of one fetch cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// A sample was written to the mailbox; `valid` is set as published.
    Published(WeatherSample),
    /// The cycle stopped in `state` because of `error`.
    Failed {
        state: SessionState,
        error: FetchError,
    },
}

impl CycleOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, CycleOutcome::Published(_))
    }

    pub fn failure_class(&self) -> Option<FailureClass> {
        match self {
            CycleOutcome::Published(_) => None,
            CycleOutcome::Failed { error, .. } => Some(error.class()),
        }
    }
}

/// Running counters over the driver's lifetime.
#[derive(Debug, Clone, Default)]
pub struct DriverStats {
    pub cycles: u64,
    pub published: u64,
    failures: HashMap<FailureClass, u64>,
}

impl DriverStats {
    pub fn failures(&self, class: FailureClass) -> u64 {
        self.failures.get(&class).copied().unwrap_or(0)
    }

    pub fn total_failures(&self) -> u64 {
        self.failures.values().sum()
    }

    fn record_failure(&mut self, class: FailureClass) {
        *self.failures.entry(class).or_insert(0) += 1;
    }
}

/// Per-driver context carried from cycle to cycle.
#[derive(Debug, Default)]
struct Session {
    buffer: ResponseBuffer,
    /// Last extracted values; fields missing from a response keep these.
    sample: WeatherSample,
}

/// Drives fetch cycles forever and publishes each extracted sample.
pub struct SessionDriver<N, L> {
    network: N,
    link: L,
    request: RequestTemplate,
    extractor: FieldExtractor,
    policy: BackoffPolicy,
    recv_timeout: Duration,
    chunk: Box<[u8]>,
    mailbox: Arc<Mailbox>,
    session: Session,
    state: SessionState,
    stats: DriverStats,
}

impl<N: Network, L: LinkMonitor> SessionDriver<N, L> {
    /// Driver with the stock socket, parser and back-off settings.
    pub fn new(network: N, link: L, request: RequestTemplate, mailbox: Arc<Mailbox>) -> Self {
        Self {
            network,
            link,
            request,
            extractor: FieldExtractor::default(),
            policy: BackoffPolicy::default(),
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            chunk: vec![0; DEFAULT_CHUNK_SIZE].into_boxed_slice(),
            mailbox,
            session: Session::default(),
            state: SessionState::Idle,
            stats: DriverStats::default(),
        }
    }

    /// Apply socket, parser and back-off settings from `config`.
    pub fn with_config(self, config: &Config) -> Self {
        let mut driver = self
            .with_policy(config.backoff_policy())
            .with_extractor(config.extractor())
            .with_recv_timeout(config.socket.recv_timeout())
            .with_chunk_size(config.socket.chunk_size);
        driver.session.buffer = ResponseBuffer::with_limit(config.socket.max_response_bytes);
        driver
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_extractor(mut self, extractor: FieldExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk = vec![0; size.max(1)].into_boxed_slice();
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Values extracted so far, independent of the mailbox flag.
    pub fn last_sample(&self) -> WeatherSample {
        self.session.sample
    }

    /// Bytes held by the response buffer; zero between cycles.
    pub fn buffer_capacity(&self) -> usize {
        self.session.buffer.capacity()
    }

    /// Run cycles until `shutdown` fires.
    ///
    /// The signal is only observed while waiting between cycles; a cycle in
    /// progress always runs to completion.
    pub async fn run(mut self, mut shutdown: watch::Receiver<()>) {
        log::info!(
            "Polling {}:{} (idle {:?}, read timeout {:?}, {} byte reads)",
            self.request.host(),
            self.request.port(),
            self.policy.idle,
            self.recv_timeout,
            self.chunk.len()
        );

        loop {
            let outcome = self.run_cycle().await;
            let delay = self.policy.delay_for(outcome.failure_class());
            log::debug!("{}: next cycle in {:?}", self.state, delay);

            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    log::info!("Session driver stopping");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Run one complete fetch cycle and report how it ended.
    ///
    /// Leaves the driver in [`SessionState::Idle`] after a cycle that reached
    /// DONE and in [`SessionState::RetryWait`] after an earlier failure.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.stats.cycles += 1;
        let result = self.fetch().await;

        let released = self.session.buffer.release();
        log::debug!("Released {} byte response", released);

        let outcome = match result {
            Ok(sample) => {
                self.mailbox.publish(sample);
                self.stats.published += 1;
                log::info!(
                    "humidity: {}%, temperature: {:.2} K, pressure: {:.2} hPa",
                    sample.humidity,
                    sample.temperature,
                    sample.pressure
                );
                CycleOutcome::Published(sample)
            }
            Err(error) => {
                let class = error.class();
                self.stats.record_failure(class);
                match class {
                    FailureClass::Framing | FailureClass::Parse | FailureClass::Buffer => {
                        self.mailbox.invalidate();
                        log::error!("Cycle failed in {}: {}", self.state, error);
                    }
                    FailureClass::LinkDown => log::warn!("Network not available, skipping fetch"),
                    _ => log::warn!("Cycle failed in {}: {}", self.state, error),
                }
                CycleOutcome::Failed {
                    state: self.state,
                    error,
                }
            }
        };

        log::info!(
            "Cycles: {}, published: {}, failed: {}",
            self.stats.cycles,
            self.stats.published,
            self.stats.total_failures()
        );

        let next = if self.state == SessionState::Done {
            SessionState::Idle
        } else {
            SessionState::RetryWait
        };
        self.transition(next);
        outcome
    }

    fn transition(&mut self, next: SessionState) {
        log::debug!("{} -> {}", self.state, next);
        self.state = next;
    }

    async fn fetch(&mut self) -> Result<WeatherSample, FetchError> {
        self.transition(SessionState::Resolving);
        if !self.link.is_link_up().await {
            return Err(FetchError::LinkDown);
        }
        let addr = self
            .network
            .resolve(self.request.host(), self.request.port())
            .await
            .map_err(|source| FetchError::Resolve {
                host: self.request.host().to_string(),
                source,
            })?;
        log::debug!("DNS lookup succeeded: {} -> {}", self.request.host(), addr.ip());

        self.transition(SessionState::Connecting);
        let mut stream = self
            .network
            .connect(addr)
            .await
            .map_err(|source| FetchError::Connect { addr, source })?;

        self.transition(SessionState::Sending);
        stream
            .write_all(self.request.as_bytes())
            .await
            .map_err(FetchError::Send)?;
        stream.flush().await.map_err(FetchError::Send)?;

        self.transition(SessionState::Receiving);
        self.receive(&mut stream).await?;
        drop(stream);

        self.transition(SessionState::Done);
        self.process()
    }

    /// Read until the peer closes, a read fails or a read times out.
    async fn receive<S: AsyncRead + Unpin>(&mut self, stream: &mut S) -> Result<(), FetchError> {
        let mut reads = 0usize;
        loop {
            match tokio::time::timeout(self.recv_timeout, stream.read(&mut self.chunk)).await {
                Ok(Ok(0)) => {
                    log::debug!("Peer closed connection after {} reads", reads);
                    break;
                }
                Ok(Ok(n)) => {
                    reads += 1;
                    self.session.buffer.append(&self.chunk[..n])?;
                }
                Ok(Err(e)) => {
                    log::warn!("Read failed after {} reads, ending response: {}", reads, e);
                    break;
                }
                Err(_) => {
                    log::warn!(
                        "No data within {:?} after {} reads, ending response",
                        self.recv_timeout,
                        reads
                    );
                    break;
                }
            }
        }
        Ok(())
    }

    fn process(&mut self) -> Result<WeatherSample, FetchError> {
        let response = self.session.buffer.as_bytes();
        match status_code(response) {
            Some(code) if !(200..300).contains(&code) => {
                log::warn!("Server answered HTTP {}", code);
            }
            Some(_) => {}
            None => log::debug!("No HTTP status line in response"),
        }

        let body = find_body(response).ok_or(FetchError::Framing {
            received: response.len(),
        })?;
        let fields = self.extractor.extract(body, &mut self.session.sample)?;
        log::debug!("Extracted {} of 3 fields from {} byte body", fields, body.len());
        Ok(WeatherSample {
            valid: true,
            ..self.session.sample
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{QueryConfig, ServerConfig};
    use async_trait::async_trait;
    use std::io;
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use tokio_test::io::{Builder, Mock};

    const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"humidity\":57,\"temp\":299.42,\"pressure\":1013.25}";

    fn request() -> RequestTemplate {
        RequestTemplate::new(
            &ServerConfig {
                host: "weather.test".into(),
                port: 80,
                path: "/data".into(),
            },
            &QueryConfig {
                lat: "1".into(),
                lon: "2".into(),
                api_key: "k".into(),
            },
        )
    }

    /// Serves one pre-built mock stream per connect.
    struct MockNetwork {
        streams: Mutex<Vec<Mock>>,
        resolve_error: Option<io::ErrorKind>,
    }

    impl MockNetwork {
        fn serving(streams: Vec<Mock>) -> Self {
            Self {
                streams: Mutex::new(streams),
                resolve_error: None,
            }
        }
    }

    #[async_trait]
    impl Network for MockNetwork {
        type Stream = Mock;

        async fn resolve(&self, _host: &str, port: u16) -> io::Result<SocketAddr> {
            match self.resolve_error {
                Some(kind) => Err(io::Error::new(kind, "lookup failed")),
                None => Ok(SocketAddr::from(([10, 0, 0, 1], port))),
            }
        }

        async fn connect(&self, _addr: SocketAddr) -> io::Result<Mock> {
            self.streams
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        }
    }

    fn response_stream(chunks: &[&[u8]]) -> Mock {
        let mut builder = Builder::new();
        builder.write(request().as_bytes());
        for chunk in chunks {
            builder.read(chunk);
        }
        builder.build()
    }

    fn driver(network: MockNetwork, link: bool) -> SessionDriver<MockNetwork, crate::LinkFlag> {
        SessionDriver::new(
            network,
            crate::LinkFlag::new(link),
            request(),
            Arc::new(Mailbox::new()),
        )
    }

    #[tokio::test]
    async fn test_cycle_publishes_sample() {
        let mut driver = driver(MockNetwork::serving(vec![response_stream(&[RESPONSE])]), true);
        let outcome = driver.run_cycle().await;

        let CycleOutcome::Published(sample) = outcome else {
            panic!("expected a published sample");
        };
        assert_eq!(sample.humidity, 57);
        assert!(sample.valid);
        assert_eq!(driver.mailbox.peek(), sample);
        assert!(!driver.last_sample().valid);
        assert_eq!(driver.state(), SessionState::Idle);
        assert_eq!(driver.stats().published, 1);
        assert_eq!(driver.buffer_capacity(), 0);
    }

    #[tokio::test]
    async fn test_link_down_skips_resolution() {
        let network = MockNetwork {
            streams: Mutex::new(Vec::new()),
            resolve_error: Some(io::ErrorKind::Other),
        };
        let mut driver = driver(network, false);
        let outcome = driver.run_cycle().await;

        assert_eq!(outcome.failure_class(), Some(FailureClass::LinkDown));
        assert!(matches!(
            outcome,
            CycleOutcome::Failed {
                state: SessionState::Resolving,
                ..
            }
        ));
        assert_eq!(driver.state(), SessionState::RetryWait);
        assert_eq!(driver.stats().failures(FailureClass::LinkDown), 1);
        assert_eq!(driver.stats().failures(FailureClass::Resolve), 0);
    }

    #[tokio::test]
    async fn test_resolve_failure() {
        let network = MockNetwork {
            streams: Mutex::new(Vec::new()),
            resolve_error: Some(io::ErrorKind::NotFound),
        };
        let mut driver = driver(network, true);
        let outcome = driver.run_cycle().await;
        assert_eq!(outcome.failure_class(), Some(FailureClass::Resolve));
        assert_eq!(
            driver.policy().delay_for(outcome.failure_class()),
            Duration::from_secs(1)
        );
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let mut driver = driver(MockNetwork::serving(Vec::new()), true);
        let outcome = driver.run_cycle().await;
        assert!(matches!(
            outcome,
            CycleOutcome::Failed {
                state: SessionState::Connecting,
                error: FetchError::Connect { .. },
            }
        ));
    }

    #[tokio::test]
    async fn test_send_failure() {
        let stream = Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            .build();
        let mut driver = driver(MockNetwork::serving(vec![stream]), true);
        let outcome = driver.run_cycle().await;
        assert_eq!(outcome.failure_class(), Some(FailureClass::Send));
        assert_eq!(driver.state(), SessionState::RetryWait);
    }

    #[tokio::test]
    async fn test_headers_without_body_boundary_invalidates() {
        let truncated: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Ty";
        let mut driver = driver(
            MockNetwork::serving(vec![
                response_stream(&[truncated]),
                response_stream(&[RESPONSE]),
            ]),
            true,
        );

        // Streams are popped from the back: the good response comes first.
        assert!(driver.run_cycle().await.is_published());
        assert!(driver.mailbox.is_fresh());

        let outcome = driver.run_cycle().await;
        assert_eq!(outcome.failure_class(), Some(FailureClass::Framing));
        assert!(!driver.mailbox.is_fresh());
        assert_eq!(driver.state(), SessionState::Idle);
        assert_eq!(driver.buffer_capacity(), 0);
    }

    #[tokio::test]
    async fn test_read_error_ends_stream_and_keeps_data() {
        let stream = Builder::new()
            .write(request().as_bytes())
            .read(RESPONSE)
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut driver = driver(MockNetwork::serving(vec![stream]), true);
        assert!(driver.run_cycle().await.is_published());
    }

    #[tokio::test]
    async fn test_response_limit_aborts_cycle() {
        // One read takes the whole response so the mock is left fully drained.
        let mut driver = driver(MockNetwork::serving(vec![response_stream(&[RESPONSE])]), true)
            .with_chunk_size(512);
        driver.session.buffer = ResponseBuffer::with_limit(32);
        let outcome = driver.run_cycle().await;
        assert_eq!(outcome.failure_class(), Some(FailureClass::Buffer));
        assert_eq!(driver.buffer_capacity(), 0);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(SessionState::RetryWait.to_string(), "RETRY_WAIT");
        assert_eq!(SessionState::Resolving.to_string(), "RESOLVING");
    }
}
