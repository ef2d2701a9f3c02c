use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::matrix::Sample;
use super::{Result, SampleSink, SinkError};

/// Runs a sink on its own task behind a bounded queue.
///
/// `on_sample` never waits on the inner sink: when the queue is full the
/// sample is dropped and counted.
pub struct QueuedSink {
    name: String,
    tx: Option<mpsc::Sender<Sample>>,
    task: Option<JoinHandle<Result<()>>>,
    dropped: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl QueuedSink {
    pub fn spawn(mut inner: Box<dyn SampleSink>, capacity: usize) -> Self {
        let name = format!("queued-{}", inner.name());
        let (tx, mut rx) = mpsc::channel::<Sample>(capacity.max(1));
        let failed = Arc::new(AtomicU64::new(0));

        let worker_failed = failed.clone();
        let task = tokio::spawn(async move {
            while let Some(sample) = rx.recv().await {
                if let Err(e) = inner.on_sample(&sample).await {
                    worker_failed.fetch_add(1, Ordering::Relaxed);
                    log::warn!("Sink '{}' failed on sample #{}: {}", inner.name(), sample.seq, e);
                }
            }
            inner.close().await
        });

        Self {
            name,
            tx: Some(tx),
            task: Some(task),
            dropped: Arc::new(AtomicU64::new(0)),
            failed,
        }
    }
}

#[async_trait::async_trait]
impl SampleSink for QueuedSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_sample(&mut self, sample: &Sample) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(SinkError::Closed)?;
        match tx.try_send(sample.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(dropped)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("Sink '{}' queue full, dropping sample #{}", self.name, dropped.seq);
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(SinkError::Closed),
        }
    }

    /// Drains everything already queued, then closes the inner sink
    async fn close(&mut self) -> Result<()> {
        // Dropping the sender ends the worker loop once the queue is empty.
        self.tx.take();
        match self.task.take() {
            Some(task) => match task.await {
                Ok(result) => result,
                Err(e) => Err(SinkError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))),
            },
            None => Ok(()),
        }
    }

    fn dropped_samples(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn failed_samples(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}
