//! Per-round Bernoulli selection of the state-action pairs to back up.

use bitvec::vec::BitVec;
use rand::Rng;
use rand_distr::{Bernoulli, Distribution};

use crate::error::{Result, SvpError};

/// The set of state-action pairs chosen for exact evaluation in one round.
///
/// Stored as a bitmap over the row-major flattening of the `rows x cols` grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationMask {
    rows: usize,
    cols: usize,
    bits: BitVec,
}

impl ObservationMask {
    /// Includes every pair independently with probability `p`.
    pub fn sample<R>(rows: usize, cols: usize, p: f64, rng: &mut R) -> Result<Self>
    where
        R: Rng + ?Sized,
    {
        let bernoulli = Bernoulli::new(p).map_err(|_| {
            SvpError::invalid_parameter(format!("sampling probability {} is not in [0, 1]", p))
        })?;
        let bits = (0..rows * cols).map(|_| bernoulli.sample(rng)).collect();
        Ok(Self { rows, cols, bits })
    }

    /// A mask containing every pair.
    pub fn full(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            bits: BitVec::repeat(true, rows * cols),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of selected pairs.
    pub fn len(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }

    /// Selected pairs as a fraction of the whole grid.
    pub fn fraction(&self) -> f64 {
        if self.bits.is_empty() {
            return 0.0;
        }
        self.len() as f64 / self.bits.len() as f64
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols && self.bits[row * self.cols + col]
    }

    /// Selected pairs in row-major order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let cols = self.cols;
        self.bits.iter_ones().map(move |idx| (idx / cols, idx % cols))
    }

    /// Number of selected pairs in `row`; zero for rows outside the grid.
    pub fn observed_in_row(&self, row: usize) -> usize {
        if row >= self.rows {
            return 0;
        }
        let start = row * self.cols;
        self.bits[start..start + self.cols].count_ones()
    }
}
