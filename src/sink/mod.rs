pub mod csv_log;
pub mod queued;

pub use csv_log::CsvSink;
pub use queued::QueuedSink;

use crate::matrix::Sample;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Sink already closed")]
    Closed,

    #[error("Sample is {found_rows}x{found_cols}, sink expects {rows}x{cols}")]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        found_rows: usize,
        found_cols: usize,
    },
}

pub type Result<T> = std::result::Result<T, SinkError>;

/// Consumer of published samples (CSV log, display, log pane...).
///
/// `on_sample` is awaited from the poll loop, so implementations that can be
/// slow should sit behind a [`QueuedSink`].
#[async_trait::async_trait]
pub trait SampleSink: Send {
    fn name(&self) -> &str;

    async fn on_sample(&mut self, sample: &Sample) -> Result<()>;

    /// Flush and release. Further samples are rejected with `SinkError::Closed`.
    async fn close(&mut self) -> Result<()>;

    /// Samples discarded instead of delivered
    fn dropped_samples(&self) -> u64 {
        0
    }

    /// Samples accepted but later rejected off the caller's task
    fn failed_samples(&self) -> u64 {
        0
    }
}

/// Reports each sample through the `log` facade
pub struct LogSink {
    logged: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self { logged: 0 }
    }

    pub fn logged(&self) -> u64 {
        self.logged
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SampleSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn on_sample(&mut self, sample: &Sample) -> Result<()> {
        self.logged += 1;
        log::info!("Data logged at {}", sample.timestamp_string());
        log::debug!(
            "Sample #{}: peak {}, {} active cells",
            sample.seq,
            sample.matrix.peak(),
            sample.matrix.active_cells()
        );
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        log::info!("Log sink closed after {} samples", self.logged);
        Ok(())
    }
}
