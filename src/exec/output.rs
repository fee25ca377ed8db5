// src/exec/output.rs

//! Bounded capture of process output.
//!
//! Output is treated as opaque bytes. Two buffers are kept per run: the live
//! buffer shown by status queries and the (usually smaller) tail that ends up
//! in the history entry. Both drop their oldest bytes once full.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncReadExt;

use super::backend::OutputStream;

pub const DEFAULT_LIVE_BUFFER_BYTES: usize = 10 * 1024;
pub const DEFAULT_HISTORY_OUTPUT_BYTES: usize = 5 * 1024;

const READ_CHUNK: usize = 8 * 1024;

/// Byte buffer that never holds more than `capacity` bytes.
#[derive(Debug, Clone)]
pub struct RollingBuffer {
    bytes: VecDeque<u8>,
    capacity: usize,
    dropped: u64,
}

impl RollingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(capacity.min(64 * 1024)),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        if self.capacity == 0 {
            self.dropped += chunk.len() as u64;
            return;
        }

        // Only the last `capacity` bytes of the chunk can survive anyway.
        let chunk = if chunk.len() > self.capacity {
            let skip = chunk.len() - self.capacity;
            self.dropped += skip as u64;
            &chunk[skip..]
        } else {
            chunk
        };

        let overflow = (self.bytes.len() + chunk.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            self.bytes.drain(..overflow);
            self.dropped += overflow as u64;
        }
        self.bytes.extend(chunk);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes discarded so far to stay within capacity.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.iter().copied().collect()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.to_vec()).into_owned()
    }
}

/// Capacities for the two buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLimits {
    pub live_bytes: usize,
    pub history_bytes: usize,
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self {
            live_bytes: DEFAULT_LIVE_BUFFER_BYTES,
            history_bytes: DEFAULT_HISTORY_OUTPUT_BYTES,
        }
    }
}

/// Live buffer plus history tail, updated together.
#[derive(Debug, Clone)]
pub struct OutputCapture {
    pub live: RollingBuffer,
    pub tail: RollingBuffer,
    pub total_bytes: u64,
}

pub type SharedOutput = Arc<Mutex<OutputCapture>>;

impl OutputCapture {
    pub fn new(limits: OutputLimits) -> Self {
        Self {
            live: RollingBuffer::new(limits.live_bytes),
            tail: RollingBuffer::new(limits.history_bytes),
            total_bytes: 0,
        }
    }

    pub fn shared(limits: OutputLimits) -> SharedOutput {
        Arc::new(Mutex::new(Self::new(limits)))
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.live.push(chunk);
        self.tail.push(chunk);
        self.total_bytes += chunk.len() as u64;
    }
}

/// Copy a stream into `capture` until EOF. Returns the number of bytes read.
pub async fn pump(mut stream: OutputStream, capture: SharedOutput) -> std::io::Result<u64> {
    let mut buf = vec![0u8; READ_CHUNK];
    let mut total = 0u64;
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        capture.lock().push(&buf[..n]);
        total += n as u64;
    }
}
