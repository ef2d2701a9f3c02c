//! Request/response poll loop.
//!
//! One cycle walks `Idle -> AwaitingSentinel -> Decoding -> Publishing -> Idle`.
//! Only one request is ever in flight; a stop message is honoured while
//! waiting for the sentinel and while decoding, and abandons the frame.
pub mod handle;

pub use handle::DriverHandle;

use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::matrix::MatrixBuffer;
use crate::protocol::{DecodeError, FrameParser, ProtocolKind};
use crate::serial::{SerialError, Transport};
use crate::sink::SampleSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DriverState {
    #[default]
    Idle,
    AwaitingSentinel,
    Decoding,
    Publishing,
    Stopped,
}

/// Result of one poll cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A matrix was published under this sequence number
    Published(u64),
    /// The first byte was not this protocol's sentinel; it was discarded
    SentinelMismatch(u8),
    /// Nothing arrived before the response timeout
    NoResponse,
    DecodeFailed(DecodeError),
    Stopped,
}

#[derive(Debug, Clone, Copy)]
pub struct DriverTiming {
    /// Interval between availability checks while waiting for the sentinel
    pub poll_interval: Duration,
    /// Give up on a request after this long without a sentinel
    pub response_timeout: Duration,
}

impl Default for DriverTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            response_timeout: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverMetrics {
    pub state: DriverState,
    pub requests_sent: u64,
    pub frames_published: u64,
    pub decode_errors: u64,
    pub sentinel_mismatches: u64,
    pub response_timeouts: u64,
    pub sink_errors: u64,
    pub dropped_samples: u64,
    pub last_error: Option<String>,
}

/// Final word from a finished poll loop
#[derive(Debug, Clone)]
pub struct DriverReport {
    pub metrics: DriverMetrics,
    /// Set when the loop ended on a transport failure rather than a stop request
    pub transport_error: Option<String>,
}

enum SentinelWait {
    Byte(u8),
    Nothing,
    Stopped,
}

pub struct PollDriver {
    transport: Box<dyn Transport>,
    parser: Box<dyn FrameParser>,
    buffer: MatrixBuffer,
    sinks: Vec<Box<dyn SampleSink>>,
    timing: DriverTiming,
    state: DriverState,
    /// Installed by `stop_sender`; without one the loop only ends on a transport failure
    stop_rx: Option<mpsc::Receiver<()>>,
    stop_requested: bool,
    sink_rejections: u64,
    metrics: DriverMetrics,
    metrics_tx: watch::Sender<DriverMetrics>,
}

impl PollDriver {
    pub fn new(
        transport: Box<dyn Transport>,
        protocol: ProtocolKind,
        buffer: MatrixBuffer,
        timing: DriverTiming,
    ) -> Self {
        let (metrics_tx, _metrics_rx) = watch::channel(DriverMetrics::default());
        Self {
            transport,
            parser: protocol.parser(),
            buffer,
            sinks: Vec::new(),
            timing,
            state: DriverState::Idle,
            stop_rx: None,
            stop_requested: false,
            sink_rejections: 0,
            metrics: DriverMetrics::default(),
            metrics_tx,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn SampleSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn SampleSink>) {
        self.sinks.push(sink);
    }

    pub fn protocol(&self) -> ProtocolKind {
        self.parser.kind()
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn buffer(&self) -> &MatrixBuffer {
        &self.buffer
    }

    pub fn metrics(&self) -> &DriverMetrics {
        &self.metrics
    }

    /// Open the stop channel. Sending on the returned sender, or dropping it
    /// and all its clones, stops the loop. Calling this again replaces the
    /// channel, so senders handed out earlier no longer reach the driver.
    pub fn stop_sender(&mut self) -> mpsc::Sender<()> {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        self.stop_rx = Some(stop_rx);
        stop_tx
    }

    pub fn metrics_receiver(&self) -> watch::Receiver<DriverMetrics> {
        self.metrics_tx.subscribe()
    }

    fn set_state(&mut self, state: DriverState) {
        if self.state != state {
            log::trace!("Poll loop {:?} -> {:?}", self.state, state);
        }
        self.state = state;
        self.metrics.state = state;
    }

    fn report_metrics(&self) {
        self.metrics_tx.send_replace(self.metrics.clone());
    }

    fn refresh_sink_counters(&mut self) {
        self.metrics.dropped_samples = self.sinks.iter().map(|s| s.dropped_samples()).sum();
        self.metrics.sink_errors =
            self.sink_rejections + self.sinks.iter().map(|s| s.failed_samples()).sum::<u64>();
    }

    fn poll_stop(&mut self) -> bool {
        if !self.stop_requested {
            if let Some(stop_rx) = self.stop_rx.as_mut() {
                match stop_rx.try_recv() {
                    Ok(()) | Err(TryRecvError::Disconnected) => self.stop_requested = true,
                    Err(TryRecvError::Empty) => {}
                }
            }
        }
        self.stop_requested
    }

    /// Run one request/response cycle.
    ///
    /// Decode problems come back as an outcome; only transport failures
    /// outside a frame are returned as errors.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, SerialError> {
        if self.state == DriverState::Stopped || self.poll_stop() {
            return Ok(CycleOutcome::Stopped);
        }

        // Idle: issue the request
        self.set_state(DriverState::Idle);
        let kind = self.parser.kind();
        self.transport.write_bytes(&[kind.request_byte()]).await?;
        self.metrics.requests_sent += 1;

        self.set_state(DriverState::AwaitingSentinel);
        let first = match self.await_sentinel().await? {
            SentinelWait::Byte(byte) => byte,
            SentinelWait::Nothing => {
                self.metrics.response_timeouts += 1;
                log::debug!("No reply to '{}' within {:?}", kind.request_byte() as char, self.timing.response_timeout);
                self.set_state(DriverState::Idle);
                self.report_metrics();
                return Ok(CycleOutcome::NoResponse);
            }
            SentinelWait::Stopped => return Ok(CycleOutcome::Stopped),
        };

        if first != kind.sentinel() {
            // Routine: the device may chatter between frames
            self.metrics.sentinel_mismatches += 1;
            log::trace!("Ignoring byte 0x{:02X} while waiting for '{}'", first, kind.sentinel() as char);
            self.set_state(DriverState::Idle);
            self.report_metrics();
            return Ok(CycleOutcome::SentinelMismatch(first));
        }

        // Decoding: work on a private copy so a failed frame never leaks out
        self.set_state(DriverState::Decoding);
        let mut grid = (*self.buffer.current_matrix()).clone();
        let decoded = tokio::select! {
            biased;
            _ = stop_signal(&mut self.stop_rx) => None,
            res = self.parser.decode(self.transport.as_mut(), &mut grid) => Some(res),
        };

        match decoded {
            None => {
                self.stop_requested = true;
                log::info!("Stop requested mid-frame, abandoning frame");
                return Ok(CycleOutcome::Stopped);
            }
            Some(Err(e)) => {
                self.metrics.decode_errors += 1;
                self.metrics.last_error = Some(e.to_string());
                log::warn!("Discarding {} frame: {}", kind.as_str(), e);
                self.set_state(DriverState::Idle);
                self.report_metrics();
                return Ok(CycleOutcome::DecodeFailed(e));
            }
            Some(Ok(())) => {}
        }

        self.set_state(DriverState::Publishing);
        let sample = self.buffer.publish(grid);
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.on_sample(&sample).await {
                self.sink_rejections += 1;
                log::warn!("Sink '{}' rejected sample #{}: {}", sink.name(), sample.seq, e);
            }
        }
        self.metrics.frames_published += 1;
        self.refresh_sink_counters();

        self.set_state(DriverState::Idle);
        self.report_metrics();
        Ok(CycleOutcome::Published(sample.seq))
    }

    async fn await_sentinel(&mut self) -> Result<SentinelWait, SerialError> {
        let deadline = Instant::now() + self.timing.response_timeout;
        let mut ticker = interval(self.timing.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stop_signal(&mut self.stop_rx) => {
                    self.stop_requested = true;
                    return Ok(SentinelWait::Stopped);
                }
                _ = ticker.tick() => {}
            }

            if self.transport.bytes_available().await? > 0 {
                if let Some(byte) = self.transport.read_byte().await? {
                    return Ok(SentinelWait::Byte(byte));
                }
            }

            if Instant::now() >= deadline {
                return Ok(SentinelWait::Nothing);
            }
        }
    }

    /// Cycle until stopped or the transport fails, then release everything
    pub async fn run(mut self) -> DriverReport {
        log::info!(
            "Starting {} poll loop on {}x{} grid",
            self.parser.kind().as_str(),
            self.buffer.rows(),
            self.buffer.cols()
        );

        let mut transport_error = None;
        loop {
            match self.run_cycle().await {
                Ok(CycleOutcome::Stopped) => break,
                Ok(_) => {}
                Err(e) => {
                    log::error!("Transport failed, stopping poll loop: {}", e);
                    self.metrics.last_error = Some(e.to_string());
                    transport_error = Some(e.to_string());
                    break;
                }
            }
        }

        self.shutdown().await;
        log::info!(
            "Poll loop stopped: {} requests, {} frames published, {} decode errors",
            self.metrics.requests_sent,
            self.metrics.frames_published,
            self.metrics.decode_errors
        );

        DriverReport {
            metrics: self.metrics.clone(),
            transport_error,
        }
    }

    /// Close the transport and every sink. Each release is attempted even if
    /// an earlier one fails. Idempotent.
    pub async fn shutdown(&mut self) {
        if self.state == DriverState::Stopped {
            return;
        }
        self.set_state(DriverState::Stopped);

        if let Err(e) = self.transport.close().await {
            log::warn!("Failed to close transport: {}", e);
        }
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.close().await {
                log::warn!("Failed to close sink '{}': {}", sink.name(), e);
            }
        }

        // Queued sinks settle their counts only once drained
        self.refresh_sink_counters();
        self.report_metrics();
    }
}

/// Resolves on a stop message or once every sender is gone; never without a channel
async fn stop_signal(stop_rx: &mut Option<mpsc::Receiver<()>>) {
    match stop_rx {
        Some(rx) => {
            let _ = rx.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}
