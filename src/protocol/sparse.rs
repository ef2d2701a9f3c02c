//! Sparse active-point frames: only non-zero cells, addressed by coordinate.
//!
//! ```text
//! 'N' <ascii> <count_hi> <count_lo> <ascii> <ascii>
//! count x { <x> <y> <value_hi> <value_lo> }
//! ```
//!
//! The grid is rebuilt from zero every cycle, so a cell missing from the
//! frame reads as zero.
use crate::matrix::{Cell, Matrix};
use crate::serial::Transport;

use super::{next_byte, sparse_sample, DecodeError, FrameParser, ProtocolKind, Result, SPARSE_SENTINEL};

#[derive(Debug, Default, Clone, Copy)]
pub struct SparseActivePoint;

#[async_trait::async_trait]
impl FrameParser for SparseActivePoint {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Sparse
    }

    async fn decode(&mut self, transport: &mut dyn Transport, grid: &mut Matrix) -> Result<()> {
        next_byte(transport, "header ascii byte").await?;
        let high = next_byte(transport, "point count high byte").await?;
        let low = next_byte(transport, "point count low byte").await?;
        let n_points = u16::from_be_bytes([high, low]);
        next_byte(transport, "header delimiter").await?;
        next_byte(transport, "header delimiter").await?;

        grid.clear();

        for _ in 0..n_points {
            let x = next_byte(transport, "point x").await?;
            let y = next_byte(transport, "point y").await?;
            let high = next_byte(transport, "point value high byte").await?;
            let low = next_byte(transport, "point value low byte").await?;

            if !grid.set(y as usize, x as usize, sparse_sample(high, low)) {
                return Err(DecodeError::OutOfBoundsCoordinate {
                    x,
                    y,
                    rows: grid.rows(),
                    cols: grid.cols(),
                });
            }
        }

        Ok(())
    }
}

/// Encode `(x, y, value)` points as a complete sparse frame, sentinel included
pub fn encode_frame(points: &[(u8, u8, Cell)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(6 + points.len() * 4);
    let [count_hi, count_lo] = (points.len() as u16).to_be_bytes();
    out.extend_from_slice(&[SPARSE_SENTINEL, b'0', count_hi, count_lo, b',', b'\n']);
    for &(x, y, value) in points {
        let [hi, lo] = value.to_be_bytes();
        out.extend_from_slice(&[x, y, hi, lo]);
    }
    out
}

/// Points for every non-zero cell of `grid`, as the device would report them
pub fn active_points(grid: &Matrix) -> Vec<(u8, u8, Cell)> {
    let mut points = Vec::new();
    for y in 0..grid.rows() {
        for x in 0..grid.cols() {
            match grid.get(y, x) {
                Some(value) if value != 0 => points.push((x as u8, y as u8, value)),
                _ => {}
            }
        }
    }
    points
}
