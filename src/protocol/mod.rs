//! Wire formats spoken by the pressure grid controller.
//!
//! Both variants follow the same cycle: the host writes a one-byte request,
//! the device answers with a sentinel byte and then a frame. The poll loop
//! consumes the sentinel; a [`FrameParser`] consumes the rest.
pub mod dense;
pub mod sparse;

pub use dense::DenseRowScan;
pub use sparse::SparseActivePoint;

use serde::{Deserialize, Serialize};

use crate::matrix::{Cell, Matrix};
use crate::serial::Transport;

/// Upper clamp for dense-protocol readings
pub const MAX_PRESSURE: Cell = 300;
/// 12-bit ADC full scale; dense readings are `SENSOR_FULL_SCALE - raw`
pub const SENSOR_FULL_SCALE: i32 = 4096;

pub const DENSE_REQUEST: u8 = b'S';
pub const DENSE_SENTINEL: u8 = b'H';
pub const ROW_MARKER: u8 = b'M';
pub const ROW_TERMINATOR: u8 = b'\n';

pub const SPARSE_REQUEST: u8 = b'R';
pub const SPARSE_SENTINEL: u8 = b'N';

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Timed out waiting for {0}")]
    FrameTimeout(&'static str),

    #[error("Bad {what}: expected 0x{expected:02X}, got 0x{found:02X}")]
    MarkerMismatch {
        what: &'static str,
        expected: u8,
        found: u8,
    },

    #[error("Communication Error: row {row} not terminated (got 0x{found:02X})")]
    RowTerminatorMissing { row: u8, found: u8 },

    #[error("Row index {index} outside grid of {cols} columns")]
    RowIndexOutOfRange { index: u8, cols: usize },

    #[error("Point ({x}, {y}) outside {rows}x{cols} grid")]
    OutOfBoundsCoordinate { x: u8, y: u8, rows: usize, cols: usize },

    #[error("Frame incomplete: {0}")]
    DecodeIncomplete(String),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    #[serde(alias = "dense_row_scan")]
    Dense,
    #[serde(alias = "sparse_active_point")]
    Sparse,
}

impl ProtocolKind {
    pub fn request_byte(&self) -> u8 {
        match self {
            ProtocolKind::Dense => DENSE_REQUEST,
            ProtocolKind::Sparse => SPARSE_REQUEST,
        }
    }

    pub fn sentinel(&self) -> u8 {
        match self {
            ProtocolKind::Dense => DENSE_SENTINEL,
            ProtocolKind::Sparse => SPARSE_SENTINEL,
        }
    }

    /// Grid size of the controllers each protocol shipped with
    pub fn default_grid(&self) -> (usize, usize) {
        match self {
            ProtocolKind::Dense => (20, 20),
            ProtocolKind::Sparse => (48, 48),
        }
    }

    pub fn parser(&self) -> Box<dyn FrameParser> {
        match self {
            ProtocolKind::Dense => Box::new(DenseRowScan),
            ProtocolKind::Sparse => Box::new(SparseActivePoint),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::Dense => "dense",
            ProtocolKind::Sparse => "sparse",
        }
    }
}

/// Decodes one frame body (everything after the sentinel) into `grid`.
///
/// `grid` arrives holding the last published matrix and is only handed on
/// for publishing when `decode` returns `Ok`; on error the caller drops it.
#[async_trait::async_trait]
pub trait FrameParser: Send {
    fn kind(&self) -> ProtocolKind;

    async fn decode(&mut self, transport: &mut dyn Transport, grid: &mut Matrix) -> Result<()>;
}

/// Dense readings: `4096 - ((low << 8) + high)` clamped to `[0, MAX_PRESSURE]`
pub fn dense_sample(high: u8, low: u8) -> Cell {
    let raw = ((low as i32) << 8) + high as i32;
    (SENSOR_FULL_SCALE - raw).clamp(0, MAX_PRESSURE as i32) as Cell
}

/// Sparse readings are big-endian magnitudes passed through unclamped
pub fn sparse_sample(high: u8, low: u8) -> Cell {
    u16::from_be_bytes([high, low])
}

/// Read one frame byte; a timeout or dead transport mid-frame fails the frame.
pub(crate) async fn next_byte(transport: &mut dyn Transport, what: &'static str) -> Result<u8> {
    match transport.read_byte().await {
        Ok(Some(byte)) => Ok(byte),
        Ok(None) => Err(DecodeError::FrameTimeout(what)),
        Err(e) => Err(DecodeError::DecodeIncomplete(format!("{} while reading {}", e, what))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_sample_inversion() {
        // raw = (0x0F << 8) + 0xC0 = 4032 -> 64
        assert_eq!(dense_sample(0xC0, 0x0F), 64);
        // raw = 4096 -> 0
        assert_eq!(dense_sample(0x00, 0x10), 0);
    }

    #[test]
    fn test_dense_sample_clamps() {
        // raw = 0 -> 4096, clamped
        assert_eq!(dense_sample(0, 0), MAX_PRESSURE);
        // raw = 0xFFFF -> negative, clamped
        assert_eq!(dense_sample(0xFF, 0xFF), 0);
        // raw = 3796 -> exactly 300
        assert_eq!(dense_sample(0xD4, 0x0E), 300);
        // raw = 3795 -> 301, clamped
        assert_eq!(dense_sample(0xD3, 0x0E), 300);
    }

    #[test]
    fn test_sparse_sample_is_big_endian_passthrough() {
        assert_eq!(sparse_sample(0x01, 0xF4), 500);
        assert_eq!(sparse_sample(0xFF, 0xFF), u16::MAX);
    }

    #[test]
    fn test_protocol_bytes() {
        assert_eq!(ProtocolKind::Dense.request_byte(), b'S');
        assert_eq!(ProtocolKind::Dense.sentinel(), b'H');
        assert_eq!(ProtocolKind::Sparse.request_byte(), b'R');
        assert_eq!(ProtocolKind::Sparse.sentinel(), b'N');
        assert_eq!(ProtocolKind::Sparse.parser().kind(), ProtocolKind::Sparse);
    }

    #[test]
    fn test_protocol_kind_serde_names() {
        let kind: ProtocolKind = serde_json::from_str("\"sparse\"").unwrap();
        assert_eq!(kind, ProtocolKind::Sparse);
        let kind: ProtocolKind = serde_json::from_str("\"dense_row_scan\"").unwrap();
        assert_eq!(kind, ProtocolKind::Dense);
        assert_eq!(serde_json::to_string(&ProtocolKind::Dense).unwrap(), "\"dense\"");
    }
}
