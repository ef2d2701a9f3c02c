use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::matrix::Sample;
use super::{DriverMetrics, DriverReport, PollDriver};

/// How long `stop` waits for the loop to wind down before aborting it
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// A poll loop running on its own tokio task
pub struct DriverHandle {
    stop_tx: mpsc::Sender<()>,
    task: JoinHandle<DriverReport>,
    samples_rx: watch::Receiver<Option<Arc<Sample>>>,
    metrics_rx: watch::Receiver<DriverMetrics>,
}

impl DriverHandle {
    /// Dropping the handle without `stop` still ends the loop, through the
    /// closed stop channel, and releases the transport and sinks.
    pub fn spawn(mut driver: PollDriver) -> Self {
        let stop_tx = driver.stop_sender();
        let samples_rx = driver.buffer().subscribe();
        let metrics_rx = driver.metrics_receiver();
        let task = tokio::spawn(driver.run());
        Self {
            stop_tx,
            task,
            samples_rx,
            metrics_rx,
        }
    }

    /// Receiver that wakes on every published sample
    pub fn samples(&self) -> watch::Receiver<Option<Arc<Sample>>> {
        self.samples_rx.clone()
    }

    pub fn metrics(&self) -> watch::Receiver<DriverMetrics> {
        self.metrics_rx.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the loop and wait for it to release its resources.
    ///
    /// Returns `None` if the task panicked or did not finish within `STOP_TIMEOUT`.
    pub async fn stop(mut self) -> Option<DriverReport> {
        // A full channel already holds a stop request; a closed one means the loop is done.
        let _ = self.stop_tx.try_send(());

        match timeout(STOP_TIMEOUT, &mut self.task).await {
            Ok(Ok(report)) => Some(report),
            Ok(Err(e)) => {
                log::error!("Poll loop task failed: {}", e);
                None
            }
            Err(_) => {
                log::warn!("Poll loop did not stop within {:?}, aborting", STOP_TIMEOUT);
                self.task.abort();
                None
            }
        }
    }

    /// Run until `shutdown` resolves (then stop) or the loop ends by itself
    pub async fn run_until<F>(mut self, shutdown: F) -> Option<DriverReport>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                log::info!("Shutdown requested");
                self.stop().await
            }
            res = &mut self.task => match res {
                Ok(report) => Some(report),
                Err(e) => {
                    log::error!("Poll loop task failed: {}", e);
                    None
                }
            },
        }
    }
}
