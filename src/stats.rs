//! Two-sample comparison of test-function means between a forward sample and a Markov chain.
//!
//! The forward side is i.i.d., so the variance of its column mean is the sample variance over
//! `n`. Chain output is autocorrelated; the variance of its column mean is estimated from
//! non-overlapping batch means.

use ndarray::prelude::*;
use ndarray_stats::QuantileExt;
use statrs::function::erf::erfc;
use std::f64::consts::SQRT_2;

use crate::error::{GewekeError, Result};

/// Outcome of the mean comparison for a single test function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZTest {
    pub column: usize,
    pub forward_mean: f64,
    pub chain_mean: f64,
    pub z: f64,
    /// Two-sided p-value of `z` under a standard normal.
    pub p_value: f64,
}

pub fn column_means(samples: ArrayView2<f64>) -> Result<Array1<f64>> {
    samples
        .mean_axis(Axis(0))
        .ok_or_else(|| GewekeError::InvalidArgument("cannot average zero rows".to_string()))
}

/// Variance of the mean of i.i.d. draws.
pub fn iid_mean_variance(column: ArrayView1<f64>) -> Result<f64> {
    let n = column.len();
    if n < 2 {
        return Err(GewekeError::InvalidArgument(format!(
            "need at least two draws, got {n}"
        )));
    }
    Ok(column.var(1.0) / n as f64)
}

/// Variance of the mean of an autocorrelated series, from `batches` batch means.
///
/// Trailing draws that do not fill a whole batch are ignored.
pub fn batch_means_variance(column: ArrayView1<f64>, batches: usize) -> Result<f64> {
    if batches < 2 {
        return Err(GewekeError::InvalidArgument(format!(
            "need at least two batches, got {batches}"
        )));
    }
    let size = column.len() / batches;
    if size == 0 {
        return Err(GewekeError::InvalidArgument(format!(
            "{} draws cannot fill {batches} batches",
            column.len()
        )));
    }
    let means: Array1<f64> = (0..batches)
        .map(|b| column.slice(s![b * size..(b + 1) * size]).sum() / size as f64)
        .collect();
    Ok(means.var(1.0) / batches as f64)
}

/// Two-sided normal p-value of `z`.
pub fn two_sided_p(z: f64) -> f64 {
    erfc(z.abs() / SQRT_2)
}

/**
Compares the column means of `forward` (i.i.d. rows) and `chain` (one Markov chain) with one
z-test per column.

# Examples

```rust
use geweke_mcmc::stats::geweke_z_test;
use ndarray::Array2;

let forward = Array2::from_shape_fn((400, 1), |(i, _)| (i % 7) as f64);
let chain = Array2::from_shape_fn((400, 1), |(i, _)| ((i * 3) % 7) as f64);
let tests = geweke_z_test(forward.view(), chain.view(), 20).unwrap();
assert!(tests[0].p_value > 0.05);
```
*/
pub fn geweke_z_test(
    forward: ArrayView2<f64>,
    chain: ArrayView2<f64>,
    batches: usize,
) -> Result<Vec<ZTest>> {
    if forward.ncols() != chain.ncols() {
        return Err(GewekeError::shape(
            "geweke_z_test",
            forward.ncols(),
            chain.ncols(),
        ));
    }
    let forward_means = column_means(forward)?;
    let chain_means = column_means(chain)?;
    (0..forward.ncols())
        .map(|column| {
            let v_forward = iid_mean_variance(forward.column(column))?;
            let v_chain = batch_means_variance(chain.column(column), batches)?;
            let diff = forward_means[column] - chain_means[column];
            let sd = (v_forward + v_chain).sqrt();
            let z = if sd > 0.0 {
                diff / sd
            } else if diff == 0.0 {
                0.0
            } else {
                diff.signum() * f64::INFINITY
            };
            Ok(ZTest {
                column,
                forward_mean: forward_means[column],
                chain_mean: chain_means[column],
                z,
                p_value: two_sided_p(z),
            })
        })
        .collect()
}

/// Smallest p-value of a set of tests, ignoring NaNs. `1.0` for an empty set.
pub fn min_p_value(tests: &[ZTest]) -> f64 {
    let p: Array1<f64> = tests.iter().map(|t| t.p_value).collect();
    if p.is_empty() {
        return 1.0;
    }
    *p.min_skipnan()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, Normal};

    #[test]
    fn p_values_of_known_z() {
        assert_abs_diff_eq!(two_sided_p(0.0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(two_sided_p(1.959_963_985), 0.05, epsilon = 1e-6);
        assert_abs_diff_eq!(two_sided_p(-1.959_963_985), 0.05, epsilon = 1e-6);
    }

    #[test]
    fn batch_means_of_iid_draws_match_iid_formula() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let normal = Normal::new(0.0, 2.0).unwrap();
        let x: Array1<f64> = (0..50_000).map(|_| normal.sample(&mut rng)).collect();
        let iid = iid_mean_variance(x.view()).unwrap();
        let batched = batch_means_variance(x.view(), 50).unwrap();
        assert_abs_diff_eq!(iid, 4.0 / 50_000.0, epsilon = 1e-5);
        assert!((batched / iid - 1.0).abs() < 0.5);
    }

    #[test]
    fn batch_means_capture_autocorrelation() {
        // AR(1) with rho = 0.9 has an integrated autocorrelation time of 19.
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let mut x = Array1::zeros(100_000);
        for t in 1..x.len() {
            x[t] = 0.9 * x[t - 1] + normal.sample(&mut rng);
        }
        let ratio =
            batch_means_variance(x.view(), 50).unwrap() / iid_mean_variance(x.view()).unwrap();
        assert!(ratio > 10.0 && ratio < 30.0, "ratio = {ratio}");
    }

    #[test]
    fn shifted_chain_is_flagged() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let forward = Array2::from_shape_fn((5_000, 2), |_| normal.sample(&mut rng));
        let mut chain = Array2::from_shape_fn((5_000, 2), |_| normal.sample(&mut rng));
        chain.column_mut(1).mapv_inplace(|v| v + 0.5);
        let tests = geweke_z_test(forward.view(), chain.view(), 25).unwrap();
        assert!(tests[0].p_value > 1e-3);
        assert!(tests[1].p_value < 1e-10);
        assert_eq!(min_p_value(&tests), tests[1].p_value);
    }

    #[test]
    fn degenerate_inputs() {
        let constant = Array2::from_elem((10, 1), 3.0);
        let tests = geweke_z_test(constant.view(), constant.view(), 2).unwrap();
        assert_eq!(tests[0].z, 0.0);
        assert_eq!(tests[0].p_value, 1.0);

        let other = Array2::from_elem((10, 1), 4.0);
        let tests = geweke_z_test(constant.view(), other.view(), 2).unwrap();
        assert_eq!(tests[0].p_value, 0.0);

        assert!(batch_means_variance(constant.column(0), 20).is_err());
        assert!(geweke_z_test(constant.view(), Array2::zeros((10, 2)).view(), 2).is_err());
        assert_eq!(min_p_value(&[]), 1.0);
    }
}
