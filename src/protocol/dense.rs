//! Dense row-scan frames: every cell of the grid, every cycle.
//!
//! ```text
//! 'H' <reserved> <ascii>
//! COLS x { 'M' <ROWS> <index> ROWS x { <high> <low> } '\n' }
//! ```
//!
//! Record `index` carries one column of the grid; sample `x` of the record
//! lands in `grid[x][index]`.
use crate::matrix::Matrix;
use crate::serial::Transport;

use super::{
    dense_sample, next_byte, DecodeError, FrameParser, ProtocolKind, Result, DENSE_SENTINEL,
    ROW_MARKER, ROW_TERMINATOR, SENSOR_FULL_SCALE,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct DenseRowScan;

#[async_trait::async_trait]
impl FrameParser for DenseRowScan {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Dense
    }

    async fn decode(&mut self, transport: &mut dyn Transport, grid: &mut Matrix) -> Result<()> {
        let rows = grid.rows();
        let cols = grid.cols();

        next_byte(transport, "header reserved byte").await?;
        next_byte(transport, "header ascii byte").await?;

        for _ in 0..cols {
            let marker = next_byte(transport, "row marker").await?;
            if marker != ROW_MARKER {
                return Err(DecodeError::MarkerMismatch {
                    what: "row marker",
                    expected: ROW_MARKER,
                    found: marker,
                });
            }

            let size = next_byte(transport, "row size").await?;
            if size as usize != rows {
                return Err(DecodeError::MarkerMismatch {
                    what: "row size",
                    expected: rows as u8,
                    found: size,
                });
            }

            let index = next_byte(transport, "row index").await?;
            if index as usize >= cols {
                return Err(DecodeError::RowIndexOutOfRange { index, cols });
            }

            for x in 0..rows {
                let high = next_byte(transport, "sample high byte").await?;
                let low = next_byte(transport, "sample low byte").await?;
                grid.set(x, index as usize, dense_sample(high, low));
            }

            let end = next_byte(transport, "row terminator").await?;
            if end != ROW_TERMINATOR {
                return Err(DecodeError::RowTerminatorMissing { row: index, found: end });
            }
        }

        Ok(())
    }
}

/// Encode `grid` as a complete dense frame, sentinel included.
///
/// Values above `SENSOR_FULL_SCALE` saturate; anything above `MAX_PRESSURE`
/// decodes back as `MAX_PRESSURE`.
pub fn encode_frame(grid: &Matrix) -> Vec<u8> {
    let rows = grid.rows();
    let cols = grid.cols();
    let mut out = Vec::with_capacity(3 + cols * (4 + rows * 2));
    out.extend_from_slice(&[DENSE_SENTINEL, 0x00, b'0']);

    for index in 0..cols {
        out.extend_from_slice(&[ROW_MARKER, rows as u8, index as u8]);
        for x in 0..rows {
            let value = grid.get(x, index).unwrap_or(0) as i32;
            let [low, high] = encode_sample(value);
            out.push(high);
            out.push(low);
        }
        out.push(ROW_TERMINATOR);
    }

    out
}

/// `[low, high]` such that `4096 - ((low << 8) + high) == value`
fn encode_sample(value: i32) -> [u8; 2] {
    let raw = (SENSOR_FULL_SCALE - value).clamp(0, u16::MAX as i32) as u16;
    [(raw >> 8) as u8, (raw & 0xFF) as u8]
}
