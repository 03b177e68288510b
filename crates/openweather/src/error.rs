//! Errors that end a fetch cycle.

use std::fmt;

use crate::buffer::BufferError;
use crate::extract::ExtractError;

/// Coarse grouping of cycle failures; each class has its own retry delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Link collaborator reported the network unusable.
    LinkDown,
    Resolve,
    Connect,
    Send,
    /// No header/body boundary in the response.
    Framing,
    Parse,
    /// Receive buffer could not grow.
    Buffer,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureClass::LinkDown => "link-down",
            FailureClass::Resolve => "resolve",
            FailureClass::Connect => "connect",
            FailureClass::Send => "send",
            FailureClass::Framing => "framing",
            FailureClass::Parse => "parse",
            FailureClass::Buffer => "buffer",
        };
        f.write_str(name)
    }
}

/// Why a fetch cycle did not publish a sample.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network link is down")]
    LinkDown,

    #[error("DNS lookup for {host} failed: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("request send failed: {0}")]
    Send(#[source] std::io::Error),

    #[error("no end of HTTP headers in {received} byte response")]
    Framing { received: usize },

    #[error("response body rejected: {0}")]
    Parse(#[from] ExtractError),

    #[error("receive buffer: {0}")]
    Buffer(#[from] BufferError),
}

impl FetchError {
    pub fn class(&self) -> FailureClass {
        match self {
            FetchError::LinkDown => FailureClass::LinkDown,
            FetchError::Resolve { .. } => FailureClass::Resolve,
            FetchError::Connect { .. } => FailureClass::Connect,
            FetchError::Send(_) => FailureClass::Send,
            FetchError::Framing { .. } => FailureClass::Framing,
            FetchError::Parse(_) => FailureClass::Parse,
            FetchError::Buffer(_) => FailureClass::Buffer,
        }
    }
}
