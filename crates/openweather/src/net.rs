//! Network seams used by the session driver.
//!
//! [`Network`] covers name resolution and connecting; the stream it returns
//! is any tokio byte stream, so tests can substitute scripted I/O.
//! [`LinkMonitor`] answers the single question "is the link usable right now".

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Resolver and connector for one fetch cycle.
#[async_trait]
pub trait Network: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Resolve `host` to a single IPv4 socket address.
    async fn resolve(&self, host: &str, port: u16) -> io::Result<SocketAddr>;

    /// Open a stream connection to `addr`.
    async fn connect(&self, addr: SocketAddr) -> io::Result<Self::Stream>;
}

/// Plain TCP over the host's resolver.
#[derive(Debug, Clone)]
pub struct TcpNetwork {
    connect_timeout: Duration,
}

impl TcpNetwork {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Network for TcpNetwork {
    type Stream = TcpStream;

    async fn resolve(&self, host: &str, port: u16) -> io::Result<SocketAddr> {
        let mut addrs = tokio::net::lookup_host((host, port)).await?;
        addrs.find(SocketAddr::is_ipv4).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no IPv4 address for {host}"),
            )
        })
    }

    async fn connect(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", self.connect_timeout),
                )
            })??;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// Reports whether the network link is usable.
#[async_trait]
pub trait LinkMonitor: Send + Sync {
    async fn is_link_up(&self) -> bool;
}

/// Link state driven by whoever owns the interface.
///
/// Clones share the same flag.
#[derive(Debug, Clone)]
pub struct LinkFlag(Arc<AtomicBool>);

impl LinkFlag {
    pub fn new(up: bool) -> Self {
        Self(Arc::new(AtomicBool::new(up)))
    }

    pub fn set(&self, up: bool) {
        self.0.store(up, Ordering::Release);
    }
}

#[async_trait]
impl LinkMonitor for LinkFlag {
    async fn is_link_up(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Linux probe: the link is up when the kernel routing table has a default route.
///
/// Where the routing table cannot be read (other platforms, restricted
/// sandboxes) the link is assumed up and connect errors take over.
#[derive(Debug, Clone)]
pub struct DefaultRouteProbe {
    route_table: PathBuf,
}

impl Default for DefaultRouteProbe {
    fn default() -> Self {
        Self::new("/proc/net/route")
    }
}

impl DefaultRouteProbe {
    pub fn new(route_table: impl Into<PathBuf>) -> Self {
        Self {
            route_table: route_table.into(),
        }
    }
}

#[async_trait]
impl LinkMonitor for DefaultRouteProbe {
    async fn is_link_up(&self) -> bool {
        match tokio::fs::read_to_string(&self.route_table).await {
            Ok(table) => has_default_route(&table),
            Err(e) => {
                log::trace!("Cannot read {}: {}", self.route_table.display(), e);
                true
            }
        }
    }
}

/// RTF_UP in the kernel route flags.
const RTF_UP: u32 = 0x1;

/// Whether a `/proc/net/route` listing contains an active default route.
fn has_default_route(table: &str) -> bool {
    table.lines().skip(1).any(|line| {
        let mut cols = line.split_whitespace();
        let (Some(_iface), Some(dest), Some(_gateway), Some(flags)) =
            (cols.next(), cols.next(), cols.next(), cols.next())
        else {
            return false;
        };
        let up = u32::from_str_radix(flags, 16).is_ok_and(|f| f & RTF_UP != 0);
        dest == "00000000" && up
    })
}
