//! Receive buffer that reassembles socket reads into one logical response.

use std::collections::TryReserveError;
use thiserror::Error;

/// Errors raised while growing the response buffer.
#[derive(Debug, Error)]
pub enum BufferError {
    /// The allocator refused to grow the buffer.
    #[error("failed to grow response buffer by {requested} bytes: {source}")]
    Alloc {
        requested: usize,
        #[source]
        source: TryReserveError,
    },
    /// The response would exceed the configured size cap.
    #[error("response exceeds {limit} bytes")]
    LimitExceeded { limit: usize },
}

/// Growable byte buffer holding every chunk of one response, in arrival order.
///
/// After each [`append`](Self::append) the stored bytes are followed by a
/// single `\0`. The terminator is not part of [`as_bytes`](Self::as_bytes).
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    bytes: Vec<u8>,
    limit: Option<usize>,
}

impl ResponseBuffer {
    /// Unbounded buffer. Nothing is allocated until the first append.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer that refuses to hold more than `limit` content bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit: Some(limit),
        }
    }

    /// Append one chunk after the current content.
    ///
    /// The previous terminator is overwritten and a fresh one written after
    /// the new bytes. On error the buffer is left as it was.
    pub fn append(&mut self, chunk: &[u8]) -> Result<(), BufferError> {
        let content_len = self.len();
        let new_len = content_len + chunk.len();
        if let Some(limit) = self.limit {
            if new_len > limit {
                return Err(BufferError::LimitExceeded { limit });
            }
        }

        let needed = (new_len + 1).saturating_sub(self.bytes.len());
        self.bytes
            .try_reserve(needed)
            .map_err(|source| BufferError::Alloc {
                requested: needed,
                source,
            })?;

        self.bytes.truncate(content_len);
        self.bytes.extend_from_slice(chunk);
        self.bytes.push(0);
        Ok(())
    }

    /// Content bytes, without the terminator.
    pub fn as_bytes(&self) -> &[u8] {
        match self.bytes.split_last() {
            Some((_, content)) => content,
            None => &[],
        }
    }

    /// Content bytes followed by the `\0` terminator. Empty before the first append.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of content bytes.
    pub fn len(&self) -> usize {
        self.bytes.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently reserved from the allocator.
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    /// Free the storage and return the number of content bytes dropped.
    pub fn release(&mut self) -> usize {
        let released = self.len();
        self.bytes = Vec::new();
        released
    }
}
