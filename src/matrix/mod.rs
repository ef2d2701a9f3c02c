pub mod buffer;

pub use buffer::MatrixBuffer;

use std::sync::Arc;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One pressure reading. Dense frames stay within `0..=MAX_PRESSURE`,
/// sparse frames carry raw 16-bit magnitudes.
pub type Cell = u16;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Row-major grid of pressure samples with a size fixed at session start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![0; rows * cols],
        }
    }

    /// Build from nested rows. Returns `None` when the rows are ragged or empty.
    pub fn from_rows(rows: Vec<Vec<Cell>>) -> Option<Self> {
        let cols = rows.first()?.len();
        if rows.iter().any(|r| r.len() != cols) {
            return None;
        }
        let row_count = rows.len();
        Some(Self {
            rows: row_count,
            cols,
            cells: rows.into_iter().flatten().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<Cell> {
        if self.contains(row, col) {
            Some(self.cells[row * self.cols + col])
        } else {
            None
        }
    }

    /// Write one cell. Out-of-range coordinates leave the grid untouched and return false.
    pub fn set(&mut self, row: usize, col: usize, value: Cell) -> bool {
        if !self.contains(row, col) {
            return false;
        }
        self.cells[row * self.cols + col] = value;
        true
    }

    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = 0);
    }

    pub fn row(&self, row: usize) -> Option<&[Cell]> {
        if row < self.rows {
            Some(&self.cells[row * self.cols..(row + 1) * self.cols])
        } else {
            None
        }
    }

    pub fn iter_row_major(&self) -> impl Iterator<Item = Cell> + '_ {
        self.cells.iter().copied()
    }

    pub fn peak(&self) -> Cell {
        self.cells.iter().copied().max().unwrap_or(0)
    }

    pub fn active_cells(&self) -> usize {
        self.cells.iter().filter(|&&c| c != 0).count()
    }

    pub fn to_rows(&self) -> Vec<Vec<Cell>> {
        self.cells.chunks(self.cols.max(1)).map(|r| r.to_vec()).collect()
    }
}

/// A published matrix together with its publish time. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub seq: u64,
    pub timestamp: DateTime<Local>,
    pub matrix: Arc<Matrix>,
}

impl Sample {
    pub fn timestamp_string(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}
