use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::matrix::Sample;
use super::{Result, SampleSink, SinkError};

/// Append-only CSV log: one header row, then one row per sample
/// (`timestamp, cell(0,0), cell(0,1), ... cell(R-1,C-1)`).
pub struct CsvSink<W: Write> {
    writer: Option<csv::Writer<W>>,
    rows: usize,
    cols: usize,
    path: Option<PathBuf>,
    written: u64,
}

impl CsvSink<File> {
    /// Create `logged_pressure_<YYYY-MM-DD_HH-MM-SS>.csv` inside `dir`
    pub fn create_in(dir: &Path, rows: usize, cols: usize) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let name = format!("logged_pressure_{}.csv", Local::now().format("%Y-%m-%d_%H-%M-%S"));
        let path = dir.join(name);
        let file = File::create(&path)?;
        let mut sink = Self::from_writer(file, rows, cols)?;
        log::info!("Logging samples to {}", path.display());
        sink.path = Some(path);
        Ok(sink)
    }
}

impl<W: Write> CsvSink<W> {
    pub fn from_writer(inner: W, rows: usize, cols: usize) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(header(rows, cols))?;
        writer.flush()?;
        Ok(Self {
            writer: Some(writer),
            rows,
            cols,
            path: None,
            written: 0,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and hand back the underlying writer
    pub fn into_inner(mut self) -> Result<W> {
        let writer = self.writer.take().ok_or(SinkError::Closed)?;
        writer
            .into_inner()
            .map_err(|e| SinkError::Io(e.into_error()))
    }

    fn write_sample(&mut self, sample: &Sample) -> Result<()> {
        let matrix = &sample.matrix;
        if matrix.rows() != self.rows || matrix.cols() != self.cols {
            return Err(SinkError::ShapeMismatch {
                rows: self.rows,
                cols: self.cols,
                found_rows: matrix.rows(),
                found_cols: matrix.cols(),
            });
        }

        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;
        let mut record = Vec::with_capacity(1 + self.rows * self.cols);
        record.push(sample.timestamp_string());
        record.extend(matrix.iter_row_major().map(|v| v.to_string()));
        writer.write_record(&record)?;
        writer.flush()?;
        self.written += 1;
        Ok(())
    }
}

fn header(rows: usize, cols: usize) -> Vec<String> {
    let mut names = Vec::with_capacity(1 + rows * cols);
    names.push("Timestamp".to_string());
    for i in 0..rows {
        for j in 0..cols {
            names.push(format!("Pressure_{}_{}", i + 1, j + 1));
        }
    }
    names
}

#[async_trait::async_trait]
impl<W: Write + Send> SampleSink for CsvSink<W> {
    fn name(&self) -> &str {
        "csv"
    }

    async fn on_sample(&mut self, sample: &Sample) -> Result<()> {
        self.write_sample(sample)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            if let Some(path) = &self.path {
                log::info!("Closed {} after {} samples", path.display(), self.written);
            }
        }
        Ok(())
    }
}
