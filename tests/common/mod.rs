use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pressure_logger_lib::driver::{DriverTiming, PollDriver};
use pressure_logger_lib::matrix::{Matrix, MatrixBuffer, Sample};
use pressure_logger_lib::protocol::ProtocolKind;
use pressure_logger_lib::serial::ScriptedTransport;
use pressure_logger_lib::sink::{self, SampleSink};

/// Sink that keeps every sample it is handed
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub samples: Arc<Mutex<Vec<Sample>>>,
    pub closed: Arc<AtomicUsize>,
}

#[allow(dead_code)] // Not every test file inspects everything.
impl RecordingSink {
    pub fn samples(&self) -> Vec<Sample> {
        self.samples.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SampleSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn on_sample(&mut self, sample: &Sample) -> sink::Result<()> {
        self.samples.lock().unwrap().push(sample.clone());
        Ok(())
    }

    async fn close(&mut self) -> sink::Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn fast_timing() -> DriverTiming {
    DriverTiming {
        poll_interval: Duration::from_millis(1),
        response_timeout: Duration::from_millis(20),
    }
}

/// Driver over a scripted device, plus handles to inspect both ends
pub fn scripted_driver(
    protocol: ProtocolKind,
    rows: usize,
    cols: usize,
) -> (PollDriver, ScriptedTransport, RecordingSink) {
    let transport = ScriptedTransport::new();
    let sink = RecordingSink::default();
    let driver = PollDriver::new(
        Box::new(transport.clone()),
        protocol,
        MatrixBuffer::new(rows, cols),
        fast_timing(),
    )
    .with_sink(Box::new(sink.clone()));
    (driver, transport, sink)
}

#[allow(dead_code)]
pub fn grid(rows: Vec<Vec<u16>>) -> Matrix {
    Matrix::from_rows(rows).expect("rectangular test grid")
}
