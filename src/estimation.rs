//! Matrix estimation from a sparse, uniformly sampled subset of entries.
//!
//! Reconstruction runs in two stages.
//!
//! The first is universal singular value thresholding (USVT): the observed
//! entries are zero-filled and rescaled by the observation rate, the result is
//! decomposed, and only the singular values that stand above the spectral
//! noise floor of the sampling are kept. With observation rate `p` every entry
//! of the rescaled matrix `M' = M / p` is an unbiased estimate of the true
//! entry `x`, with variance `x^2 (1 - p) / p`. For an `m x n` matrix of such
//! independent noise the largest singular value concentrates around
//! `sigma (sqrt(m) + sqrt(n))`, which gives the cutoff
//!
//! ```text
//! tau = scale * rms(observed) * sqrt((1 - p) / p) * (sqrt(m) + sqrt(n))
//! ```
//!
//! A caller that already holds a good guess for the matrix (the previous
//! planning iterate) passes it as a prior instead, and the first stage is
//! skipped.
//!
//! The second stage is iterative hard impute. Observed cells are pinned to
//! their values, unobserved cells start from the first-stage estimate (or the
//! prior), and each pass replaces the unobserved cells with a truncated SVD of
//! the current matrix until they settle. Only the unobserved cells carry error
//! here, a fraction `1 - p` of the grid with magnitude `r` (the rms residual of
//! the starting point on the observed cells), so the cutoff becomes
//!
//! ```text
//! tau' = scale * r * sqrt(1 - p) * (sqrt(m) + sqrt(n))
//! ```
//!
//! Fully observed input is returned unchanged.
//!
//! # Example
//!
//! ```
//! use svp::estimation::estimate;
//!
//! // Every entry observed: nothing to reconstruct.
//! let observed = vec![(0, 0, 1.0), (0, 1, 2.0), (1, 0, 2.0), (1, 1, 4.0)];
//! let dense = estimate(&observed, 1.0, (2, 2)).unwrap();
//! assert!((dense[[1, 1]] - 4.0).abs() < 1e-9);
//! ```

use log::trace;
use nalgebra::DMatrix;
use ndarray::Array2;

use crate::error::{Result, SvpError};

/// Tuning knobs for [`MatrixEstimator`].
#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    /// Multiplier on both noise thresholds. Larger values keep fewer
    /// singular values.
    pub threshold_scale: f64,
    /// Singular values below `relative_tolerance * sigma_max` are always
    /// dropped, regardless of the sampling rate.
    pub relative_tolerance: f64,
    /// Cap on hard-impute passes. Zero leaves the first-stage estimate as is.
    pub max_iterations: usize,
    /// Hard impute stops once the relative Frobenius change of a pass drops
    /// below this.
    pub convergence_tolerance: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            threshold_scale: 1.0,
            relative_tolerance: 1e-12,
            max_iterations: 200,
            convergence_tolerance: 1e-10,
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.threshold_scale.is_finite() || self.threshold_scale < 0.0 {
            return Err(SvpError::invalid_config(format!(
                "threshold scale must be finite and non-negative, got {}",
                self.threshold_scale
            )));
        }
        if !self.relative_tolerance.is_finite() || self.relative_tolerance < 0.0 {
            return Err(SvpError::invalid_config(format!(
                "relative tolerance must be finite and non-negative, got {}",
                self.relative_tolerance
            )));
        }
        if !self.convergence_tolerance.is_finite() || self.convergence_tolerance < 0.0 {
            return Err(SvpError::invalid_config(format!(
                "convergence tolerance must be finite and non-negative, got {}",
                self.convergence_tolerance
            )));
        }
        Ok(())
    }
}

/// Reconstructs dense matrices from sparse observations.
#[derive(Debug, Clone, Default)]
pub struct MatrixEstimator {
    config: EstimatorConfig,
    clip: Option<(f64, f64)>,
}

impl MatrixEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config, clip: None }
    }

    /// Clamps every reconstructed entry into `[lo, hi]`.
    pub fn with_clip(mut self, lo: f64, hi: f64) -> Self {
        self.clip = Some((lo.min(hi), lo.max(hi)));
        self
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn clip(&self) -> Option<(f64, f64)> {
        self.clip
    }

    /// Noise-floor cutoff on the singular values of the zero-filled,
    /// rescaled matrix.
    pub fn threshold(&self, rms: f64, observation_rate: f64, shape: (usize, usize)) -> f64 {
        let noise = rms * ((1.0 - observation_rate).max(0.0) / observation_rate).sqrt();
        self.config.threshold_scale * noise * spectral_edge(shape)
    }

    /// Noise-floor cutoff during hard impute, where only the unobserved cells
    /// deviate from the truth, by about `residual` each.
    pub fn imputation_threshold(
        &self,
        residual: f64,
        observation_rate: f64,
        shape: (usize, usize),
    ) -> f64 {
        let noise = residual * (1.0 - observation_rate).max(0.0).sqrt();
        self.config.threshold_scale * noise * spectral_edge(shape)
    }

    /// Estimates the full `shape` matrix from `(row, col, value)` observations
    /// drawn with probability `observation_rate` each.
    ///
    /// Duplicate coordinates keep the last value. Rows without any
    /// observation receive the column means of the rows that had one.
    ///
    /// # Errors
    /// - `InvalidParameter` if `observation_rate` is not in `(0, 1]` or an
    ///   observed value is not finite.
    /// - `ShapeMismatch` if a coordinate is outside `shape`.
    /// - `Decomposition` if the SVD cannot be recomposed.
    pub fn estimate(
        &self,
        entries: &[(usize, usize, f64)],
        observation_rate: f64,
        shape: (usize, usize),
    ) -> Result<Array2<f64>> {
        self.reconstruct(entries, observation_rate, shape, None)
    }

    /// Like [`estimate`](Self::estimate), but unobserved cells start from
    /// `prior` instead of the thresholded zero fill.
    ///
    /// Rows without any observation keep their low-rank imputation from the
    /// prior. No observations at all returns the (clamped) prior.
    ///
    /// # Errors
    /// As [`estimate`](Self::estimate), plus `InvalidParameter` if `prior` is
    /// not `shape` or holds a non-finite value.
    pub fn estimate_with_prior(
        &self,
        entries: &[(usize, usize, f64)],
        observation_rate: f64,
        shape: (usize, usize),
        prior: &Array2<f64>,
    ) -> Result<Array2<f64>> {
        if prior.dim() != shape {
            return Err(SvpError::invalid_parameter(format!(
                "prior is {:?}, expected {:?}",
                prior.dim(),
                shape
            )));
        }
        if prior.iter().any(|v| !v.is_finite()) {
            return Err(SvpError::invalid_parameter("prior holds a non-finite value"));
        }
        self.reconstruct(entries, observation_rate, shape, Some(prior))
    }

    fn reconstruct(
        &self,
        entries: &[(usize, usize, f64)],
        observation_rate: f64,
        shape: (usize, usize),
        prior: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>> {
        if !observation_rate.is_finite() || observation_rate <= 0.0 || observation_rate > 1.0 {
            return Err(SvpError::invalid_parameter(format!(
                "observation rate must lie in (0, 1], got {}",
                observation_rate
            )));
        }
        let (rows, cols) = shape;
        for &(row, col, value) in entries {
            if row >= rows || col >= cols {
                return Err(SvpError::ShapeMismatch {
                    row,
                    col,
                    rows,
                    cols,
                });
            }
            if !value.is_finite() {
                return Err(SvpError::invalid_parameter(format!(
                    "observed value at ({}, {}) is not finite",
                    row, col
                )));
            }
        }

        if rows == 0 || cols == 0 || entries.is_empty() {
            let mut base = match prior {
                Some(prior) => prior.clone(),
                None => Array2::zeros((rows, cols)),
            };
            self.apply_clip(&mut base);
            return Ok(base);
        }

        // Row-major, one slot per cell; later duplicates overwrite earlier ones.
        let mut cells: Vec<Option<f64>> = vec![None; rows * cols];
        for &(row, col, value) in entries {
            cells[row * cols + col] = Some(value);
        }
        let mut row_observed = vec![false; rows];
        let mut distinct = 0;
        for (idx, cell) in cells.iter().enumerate() {
            if cell.is_some() {
                row_observed[idx / cols] = true;
                distinct += 1;
            }
        }

        if distinct == rows * cols {
            let mut full = Array2::from_shape_fn(shape, |(i, j)| cells[i * cols + j].unwrap_or(0.0));
            self.apply_clip(&mut full);
            return Ok(full);
        }

        let start = match prior {
            Some(prior) => prior.clone(),
            None => self.threshold_zero_filled(&cells, observation_rate, shape)?,
        };
        let mut estimate = self.hard_impute(&cells, observation_rate, shape, &start)?;

        if prior.is_none() {
            fill_unobserved_rows(&mut estimate, &row_observed);
        }
        self.apply_clip(&mut estimate);
        Ok(estimate)
    }

    /// One-shot USVT of the zero-filled, rescaled observations.
    fn threshold_zero_filled(
        &self,
        cells: &[Option<f64>],
        observation_rate: f64,
        shape: (usize, usize),
    ) -> Result<Array2<f64>> {
        let (rows, cols) = shape;
        let scaled = DMatrix::from_fn(rows, cols, |i, j| {
            cells[i * cols + j].map_or(0.0, |value| value / observation_rate)
        });
        let rms = root_mean_square(cells.iter().flatten().copied());
        let floor = self.threshold(rms, observation_rate, shape);
        let (dense, rank) = truncated_svd(scaled, floor, self.config.relative_tolerance)?;
        trace!(
            "usvt {}x{}: cutoff {:.4e}, rank {}",
            rows,
            cols,
            floor,
            rank
        );
        Ok(Array2::from_shape_fn(shape, |(i, j)| dense[(i, j)]))
    }

    /// Pins observed cells and re-imputes the rest from a truncated SVD of
    /// the current matrix until the imputed cells settle.
    fn hard_impute(
        &self,
        cells: &[Option<f64>],
        observation_rate: f64,
        shape: (usize, usize),
        start: &Array2<f64>,
    ) -> Result<Array2<f64>> {
        let (rows, cols) = shape;
        let mut residuals = Vec::new();
        for (idx, cell) in cells.iter().enumerate() {
            if let Some(value) = *cell {
                residuals.push(value - start[[idx / cols, idx % cols]]);
            }
        }
        let floor = self.imputation_threshold(
            root_mean_square(residuals.into_iter()),
            observation_rate,
            shape,
        );

        let mut current = DMatrix::from_fn(rows, cols, |i, j| {
            cells[i * cols + j].unwrap_or(start[[i, j]])
        });
        let mut passes = 0;
        let mut rank = 0;
        let mut relative_change = 0.0;
        while passes < self.config.max_iterations {
            let (low_rank, kept) =
                truncated_svd(current.clone(), floor, self.config.relative_tolerance)?;
            passes += 1;
            rank = kept;

            let mut change = 0.0;
            let mut norm = 0.0;
            for i in 0..rows {
                for j in 0..cols {
                    if cells[i * cols + j].is_none() {
                        let next = low_rank[(i, j)];
                        change += (next - current[(i, j)]).powi(2);
                        current[(i, j)] = next;
                    }
                    norm += current[(i, j)].powi(2);
                }
            }
            relative_change = if norm > 1e-30 {
                (change / norm).sqrt()
            } else {
                change.sqrt()
            };
            if relative_change <= self.config.convergence_tolerance {
                break;
            }
        }
        trace!(
            "hard impute {}x{}: cutoff {:.4e}, rank {}, {} passes, last change {:.3e}",
            rows,
            cols,
            floor,
            rank,
            passes,
            relative_change
        );

        Ok(Array2::from_shape_fn(shape, |(i, j)| current[(i, j)]))
    }

    fn apply_clip(&self, matrix: &mut Array2<f64>) {
        if let Some((lo, hi)) = self.clip {
            matrix.mapv_inplace(|x| x.clamp(lo, hi));
        }
    }
}

/// Estimates a matrix with the default configuration and no clamp.
pub fn estimate(
    entries: &[(usize, usize, f64)],
    observation_rate: f64,
    shape: (usize, usize),
) -> Result<Array2<f64>> {
    MatrixEstimator::default().estimate(entries, observation_rate, shape)
}

/// `sqrt(m) + sqrt(n)`, the spectral edge of an `m x n` unit-variance noise
/// matrix.
fn spectral_edge((rows, cols): (usize, usize)) -> f64 {
    (rows as f64).sqrt() + (cols as f64).sqrt()
}

fn root_mean_square(values: impl Iterator<Item = f64>) -> f64 {
    let mut count = 0usize;
    let mut sum_sq = 0.0;
    for value in values {
        sum_sq += value * value;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        (sum_sq / count as f64).sqrt()
    }
}

/// Zeroes the singular values below `max(floor, relative_tolerance *
/// sigma_max)` and recomposes. Returns the matrix and the kept rank.
fn truncated_svd(
    matrix: DMatrix<f64>,
    floor: f64,
    relative_tolerance: f64,
) -> Result<(DMatrix<f64>, usize)> {
    let mut svd = matrix.svd(true, true);
    let sigma_max = svd.singular_values.iter().copied().fold(0.0, f64::max);
    let cutoff = floor.max(relative_tolerance * sigma_max);
    let mut rank = 0;
    for sigma in svd.singular_values.iter_mut() {
        if *sigma < cutoff || *sigma == 0.0 {
            *sigma = 0.0;
        } else {
            rank += 1;
        }
    }
    let dense = svd.recompose().map_err(SvpError::Decomposition)?;
    Ok((dense, rank))
}

/// Replaces rows that had no observation with the column means of the rows
/// that did.
fn fill_unobserved_rows(estimate: &mut Array2<f64>, row_observed: &[bool]) {
    let observed = row_observed.iter().filter(|&&seen| seen).count();
    if observed == 0 || observed == row_observed.len() {
        return;
    }
    let cols = estimate.ncols();
    let mut means = vec![0.0; cols];
    for (row, &seen) in row_observed.iter().enumerate() {
        if !seen {
            continue;
        }
        for (mean, value) in means.iter_mut().zip(estimate.row(row).iter()) {
            *mean += value;
        }
    }
    for mean in means.iter_mut() {
        *mean /= observed as f64;
    }
    for (row, &seen) in row_observed.iter().enumerate() {
        if seen {
            continue;
        }
        for (value, mean) in estimate.row_mut(row).iter_mut().zip(means.iter()) {
            *value = *mean;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    fn all_entries(matrix: &Array2<f64>) -> Vec<(usize, usize, f64)> {
        matrix
            .indexed_iter()
            .map(|((i, j), &v)| (i, j, v))
            .collect()
    }

    fn relative_error(estimate: &Array2<f64>, truth: &Array2<f64>) -> f64 {
        let err: f64 = estimate
            .iter()
            .zip(truth.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt();
        let norm: f64 = truth.iter().map(|v| v * v).sum::<f64>().sqrt();
        err / norm
    }

    fn rank_one(rows: usize, cols: usize, rng: &mut ChaCha20Rng) -> Array2<f64> {
        let u: Vec<f64> = (0..rows).map(|_| rng.gen_range(1.0..2.0)).collect();
        let v: Vec<f64> = (0..cols).map(|_| rng.gen_range(1.0..2.0)).collect();
        Array2::from_shape_fn((rows, cols), |(i, j)| u[i] * v[j])
    }

    #[test]
    fn test_full_observation_is_identity() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let matrix = Array2::from_shape_fn((6, 4), |_| rng.gen_range(-5.0..5.0));
        let dense = estimate(&all_entries(&matrix), 1.0, (6, 4)).unwrap();
        assert_eq!(dense.dim(), (6, 4));
        for (a, b) in dense.iter().zip(matrix.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_single_entry_fills_whole_matrix() {
        let dense = estimate(&[(2, 1, 3.0)], 0.2, (5, 3)).unwrap();
        assert_eq!(dense.dim(), (5, 3));
        assert!(dense.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_no_observations_yields_zero_matrix() {
        let dense = estimate(&[], 0.5, (3, 2)).unwrap();
        assert_eq!(dense, Array2::<f64>::zeros((3, 2)));

        let clipped = MatrixEstimator::default()
            .with_clip(1.0, 2.0)
            .estimate(&[], 0.5, (3, 2))
            .unwrap();
        assert!(clipped.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_rank_one_recovery_from_subsample() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let truth = rank_one(60, 40, &mut rng);
        let p = 0.8;
        let observed: Vec<_> = all_entries(&truth)
            .into_iter()
            .filter(|_| rng.gen_bool(p))
            .collect();

        let one_shot = MatrixEstimator::new(EstimatorConfig {
            max_iterations: 0,
            ..EstimatorConfig::default()
        })
        .estimate(&observed, p, (60, 40))
        .unwrap();
        let refined = estimate(&observed, p, (60, 40)).unwrap();

        let one_shot_err = relative_error(&one_shot, &truth);
        let refined_err = relative_error(&refined, &truth);
        assert!(one_shot_err < 0.5, "one-shot relative error {}", one_shot_err);
        assert!(refined_err < 0.05, "refined relative error {}", refined_err);
        assert!(refined_err <= one_shot_err);
    }

    #[test]
    fn test_observed_cells_are_kept() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let truth = rank_one(20, 6, &mut rng);
        let observed: Vec<_> = all_entries(&truth)
            .into_iter()
            .filter(|_| rng.gen_bool(0.6))
            .collect();
        let dense = estimate(&observed, 0.6, (20, 6)).unwrap();
        for &(i, j, v) in &observed {
            assert_abs_diff_eq!(dense[[i, j]], v, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_prior_fills_unobserved_cells() {
        let prior = Array2::from_shape_fn((3, 3), |(i, j)| (i + j) as f64);
        let estimator = MatrixEstimator::default();

        // Nothing observed: the prior comes back untouched.
        let dense = estimator
            .estimate_with_prior(&[], 0.5, (3, 3), &prior)
            .unwrap();
        assert_eq!(dense, prior);

        // Observations that agree with a rank-two prior leave it in place.
        let observed = vec![(0, 0, 0.0), (1, 2, 3.0), (2, 1, 3.0)];
        let dense = estimator
            .estimate_with_prior(&observed, 0.5, (3, 3), &prior)
            .unwrap();
        for (a, b) in dense.iter().zip(prior.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_prior_shape_checked() {
        let prior = Array2::<f64>::zeros((2, 2));
        assert!(matches!(
            MatrixEstimator::default().estimate_with_prior(&[(0, 0, 1.0)], 0.5, (3, 2), &prior),
            Err(SvpError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_duplicate_coordinates_keep_last_value() {
        let base = vec![(0, 0, 1.0), (1, 1, 2.0), (2, 0, -1.0), (3, 2, 0.5)];
        let mut repeated = vec![(0, 0, 1000.0), (3, 2, -40.0)];
        repeated.extend(base.iter().copied());

        let a = estimate(&base, 0.4, (4, 3)).unwrap();
        let b = estimate(&repeated, 0.4, (4, 3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unobserved_row_takes_column_means() {
        let truth = Array2::from_shape_fn((4, 3), |(i, j)| (i + 1) as f64 * (j + 1) as f64);
        let observed: Vec<_> = all_entries(&truth)
            .into_iter()
            .filter(|&(i, _, _)| i != 2)
            .collect();

        let dense = estimate(&observed, 0.75, (4, 3)).unwrap();
        for j in 0..3 {
            let mean = [0, 1, 3].iter().map(|&i| dense[[i, j]]).sum::<f64>() / 3.0;
            assert_abs_diff_eq!(dense[[2, j]], mean, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_clip_bounds_output() {
        let observed = vec![(0, 0, 50.0), (1, 1, -50.0), (0, 1, 10.0)];
        let dense = MatrixEstimator::default()
            .with_clip(-1.0, 1.0)
            .estimate(&observed, 0.5, (2, 2))
            .unwrap();
        assert!(dense.iter().all(|&v| (-1.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_deterministic() {
        let observed = vec![(0, 0, 1.5), (1, 2, -0.5), (3, 1, 2.0), (2, 2, 0.25)];
        let a = estimate(&observed, 0.3, (4, 3)).unwrap();
        let b = estimate(&observed, 0.3, (4, 3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_out_of_shape_entry_rejected() {
        let result = estimate(&[(0, 0, 1.0), (3, 0, 1.0)], 0.5, (3, 2));
        assert!(matches!(
            result,
            Err(SvpError::ShapeMismatch {
                row: 3,
                col: 0,
                rows: 3,
                cols: 2
            })
        ));
    }

    #[test]
    fn test_invalid_rate_rejected() {
        for rate in [0.0, -0.1, 1.5, f64::NAN] {
            assert!(matches!(
                estimate(&[(0, 0, 1.0)], rate, (1, 1)),
                Err(SvpError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn test_threshold_vanishes_at_full_rate() {
        let estimator = MatrixEstimator::default();
        assert_eq!(estimator.threshold(3.0, 1.0, (10, 10)), 0.0);
        assert!(estimator.threshold(3.0, 0.5, (10, 10)) > 0.0);
        assert_eq!(estimator.imputation_threshold(3.0, 1.0, (10, 10)), 0.0);
        assert!(
            estimator.imputation_threshold(3.0, 0.5, (10, 10))
                < estimator.threshold(3.0, 0.5, (10, 10))
        );
    }

    #[test]
    fn test_invalid_estimator_config() {
        let bad = EstimatorConfig {
            convergence_tolerance: f64::NAN,
            ..EstimatorConfig::default()
        };
        assert!(bad.validate().is_err());
        assert!(EstimatorConfig::default().validate().is_ok());
    }
}
