use std::sync::Arc;
use chrono::Local;
use tokio::sync::watch;

use super::{Matrix, Sample};

/// Last successfully decoded matrix, shared between the poll loop and readers.
///
/// Publishing swaps in a whole new `Arc<Sample>`; readers hold on to whichever
/// snapshot they cloned and can never observe a half-written grid.
#[derive(Clone)]
pub struct MatrixBuffer {
    tx: Arc<watch::Sender<Option<Arc<Sample>>>>,
    rows: usize,
    cols: usize,
}

impl MatrixBuffer {
    pub fn new(rows: usize, cols: usize) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            rows,
            cols,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Stamp and publish a freshly decoded matrix
    pub fn publish(&self, matrix: Matrix) -> Arc<Sample> {
        let mut sample = Arc::new(Sample {
            seq: 1,
            timestamp: Local::now(),
            matrix: Arc::new(matrix),
        });
        // Sequence read and swap happen under the channel's write lock.
        self.tx.send_modify(|slot| {
            if let Some(previous) = slot.as_ref() {
                Arc::make_mut(&mut sample).seq = previous.seq + 1;
            }
            *slot = Some(sample.clone());
        });
        sample
    }

    pub fn latest(&self) -> Option<Arc<Sample>> {
        self.tx.borrow().clone()
    }

    /// Last published grid, or zeros before the first publish
    pub fn current_matrix(&self) -> Arc<Matrix> {
        match self.latest() {
            Some(sample) => sample.matrix.clone(),
            None => Arc::new(Matrix::zeros(self.rows, self.cols)),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Sample>>> {
        self.tx.subscribe()
    }
}
