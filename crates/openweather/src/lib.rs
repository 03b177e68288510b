//! OpenWeatherMap poller for constrained devices.
//!
//! Fetches the current-weather JSON document over a plain HTTP/1.1
//! connection, reassembles the streamed response, pulls `humidity`, `temp`
//! and `pressure` out of the body and hands the result to a consumer
//! through a single-slot mailbox. The fetch runs forever on a fixed cadence.
//!
//! # Architecture
//!
//! ```text
//! socket reads ──► ResponseBuffer ──► find_body ──► extract ──► Mailbox ──► consumer
//!   (64 B chunks)    (buffer)          (http)       (extract)    (sample)
//!        ▲
//!        └── SessionDriver: resolve → connect → send → receive → done ──► wait
//! ```
//!
//! # Modules
//!
//! - [`buffer`]: Growable, always-terminated receive buffer.
//! - [`http`]: Request template and header/body split.
//! - [`json`]: Bounded, non-recursive JSON tokenizer.
//! - [`extract`]: Field extraction into a [`WeatherSample`].
//! - [`sample`]: The sample record and the consumer mailbox.
//! - [`net`]: Network and link-state seams with their tokio implementations.
//! - [`backoff`]: Delay policy keyed by failure class.
//! - [`driver`]: The fetch-cycle state machine.
//! - [`consumer`]: Mailbox consumer that logs fresh samples.
//! - [`config`]: YAML configuration.
//! - [`error`]: Cycle error taxonomy.

pub mod backoff;
pub mod buffer;
pub mod config;
pub mod consumer;
pub mod driver;
pub mod error;
pub mod extract;
pub mod http;
pub mod json;
pub mod net;
pub mod sample;

pub use backoff::BackoffPolicy;
pub use buffer::{BufferError, ResponseBuffer};
pub use config::{Config, ConfigError};
pub use driver::{CycleOutcome, DriverStats, SessionDriver, SessionState};
pub use error::{FailureClass, FetchError};
pub use extract::{ExtractError, FieldExtractor};
pub use http::{find_body, status_code, RequestTemplate};
pub use net::{DefaultRouteProbe, LinkFlag, LinkMonitor, Network, TcpNetwork};
pub use sample::{Mailbox, WeatherSample};
