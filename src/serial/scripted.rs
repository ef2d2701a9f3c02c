//! In-memory transport that answers requests with queued replies.
//!
//! Clones share the same state, so a test can keep one clone for inspection
//! while the poll loop owns another.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{Result, SerialError, Transport};

#[derive(Debug, Default)]
struct ScriptState {
    rx: VecDeque<u8>,
    replies: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    closed: bool,
    close_calls: usize,
    fail_close: bool,
    byte_delay: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        // A panicking test thread must not hide the script from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a reply released by the next write.
    pub fn push_reply(&self, bytes: impl Into<Vec<u8>>) {
        self.lock().replies.push_back(bytes.into());
    }

    /// Make bytes readable right away, as if the device sent them unprompted.
    pub fn inject(&self, bytes: &[u8]) {
        self.lock().rx.extend(bytes.iter().copied());
    }

    /// Everything written by the host so far.
    pub fn written(&self) -> Vec<u8> {
        self.lock().written.clone()
    }

    pub fn pending_replies(&self) -> usize {
        self.lock().replies.len()
    }

    pub fn unread(&self) -> usize {
        self.lock().rx.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }

    /// Simulate the device vanishing: further reads and writes fail.
    pub fn disconnect(&self) {
        self.lock().closed = true;
    }

    /// Slow the device down: every byte read takes this long to arrive.
    pub fn set_byte_delay(&self, delay: Duration) {
        self.lock().byte_delay = Some(delay);
    }

    /// Make `close` report an error (the channel still counts as released).
    pub fn fail_on_close(&self) {
        self.lock().fail_close = true;
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(SerialError::NotConnected);
        }
        state.written.extend_from_slice(data);
        if let Some(reply) = state.replies.pop_front() {
            state.rx.extend(reply);
        }
        Ok(())
    }

    async fn read_byte(&mut self) -> Result<Option<u8>> {
        let delay = self.lock().byte_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let byte = {
            let mut state = self.lock();
            if state.closed {
                return Err(SerialError::NotConnected);
            }
            state.rx.pop_front()
        };
        if byte.is_none() {
            // Stand-in for the port's read timeout
            tokio::task::yield_now().await;
        }
        Ok(byte)
    }

    async fn bytes_available(&mut self) -> Result<usize> {
        let state = self.lock();
        if state.closed {
            return Err(SerialError::NotConnected);
        }
        Ok(state.rx.len())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.closed = true;
        state.close_calls += 1;
        if state.fail_close {
            return Err(SerialError::ConnectionFailed("close failed".to_string()));
        }
        Ok(())
    }
}
