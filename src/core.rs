/*!
The model contract and the three simulators of the joint distribution.

A [`Model`] owns its hyperparameters and its current latent state, and exposes three
primitives: `draw_prior`, `draw_likelihood` and `draw_posterior`. Each returns the block of the
sample row it just (re)generated. A full row is always `[likelihood block, parameter block]`.

- [`forward`]: independent prior then likelihood draws. Rows are i.i.d. draws from the joint.
- [`successive`]: one prior draw, then alternating likelihood and posterior draws.
- [`backward`]: a fresh prior and likelihood per row, followed by `burn_in + 1` posterior steps.

These functions run on the calling thread with whatever stream they are given; the
[`GewekeSampler`](crate::sampler::GewekeSampler) decides which stream that is and fans the work
out across workers.
*/

use indicatif::ProgressBar;
use ndarray::{Array2, Array3, ArrayView2, Axis};
use rand::Rng;
use std::ops::Range;

use crate::error::{GewekeError, Result};
use crate::geweke::geweke_functions;

pub trait Model: Clone + Send + Sync {
    /// Width of a full sample row.
    fn sample_dim(&self) -> usize;

    /// Columns of a sample row holding the parameters under test.
    fn theta_indices(&self) -> Range<usize>;

    /// Draws the parameters (and latent variables) from the prior, replacing the state.
    fn draw_prior<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Vec<f64>>;

    /// Draws observations given the current parameters.
    fn draw_likelihood<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Vec<f64>>;

    /// Applies one transition of the posterior kernel given the current observations.
    fn draw_posterior<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Vec<f64>>;

    /// Maps sample rows to the test functions compared between simulators.
    fn test_functions(&self, samples: ArrayView2<f64>) -> Result<Array2<f64>> {
        if samples.ncols() != self.sample_dim() {
            return Err(GewekeError::shape(
                "test_functions",
                self.sample_dim(),
                samples.ncols(),
            ));
        }
        Ok(geweke_functions(samples))
    }
}

/// Splits `n` iterations over `nproc` workers, giving the remainder to the first workers.
///
/// ```rust
/// use geweke_mcmc::core::split_iter;
/// assert_eq!(split_iter(10, 4), vec![3, 3, 2, 2]);
/// ```
pub fn split_iter(n: usize, nproc: usize) -> Vec<usize> {
    if nproc == 0 {
        return Vec::new();
    }
    let base = n / nproc;
    let extra = n % nproc;
    (0..nproc)
        .map(|w| base + usize::from(w < extra))
        .collect()
}

fn write_row<M: Model>(
    model: &M,
    out: &mut Array2<f64>,
    i: usize,
    likelihood: &[f64],
    theta: &[f64],
) -> Result<()> {
    let dim = model.sample_dim();
    if likelihood.len() + theta.len() != dim {
        return Err(GewekeError::shape(
            "sample row",
            dim,
            likelihood.len() + theta.len(),
        ));
    }
    let mut row = out.row_mut(i);
    row.iter_mut()
        .zip(likelihood.iter().chain(theta))
        .for_each(|(o, v)| *o = *v);
    Ok(())
}

/// Marginal-conditional simulator: `n` i.i.d. draws from the joint.
pub fn forward<M, R>(model: &mut M, rng: &mut R, n: usize, pb: &ProgressBar) -> Result<Array2<f64>>
where
    M: Model,
    R: Rng + ?Sized,
{
    let mut out = Array2::zeros((n, model.sample_dim()));
    pb.set_length(n as u64);
    for i in 0..n {
        let theta = model.draw_prior(rng)?;
        let y = model.draw_likelihood(rng)?;
        write_row(model, &mut out, i, &y, &theta)?;
        pb.inc(1);
    }
    Ok(out)
}

/// Successive-conditional simulator: one chain of `n` alternating likelihood/posterior draws.
pub fn successive<M, R>(
    model: &mut M,
    rng: &mut R,
    n: usize,
    pb: &ProgressBar,
) -> Result<Array2<f64>>
where
    M: Model,
    R: Rng + ?Sized,
{
    let mut out = Array2::zeros((n, model.sample_dim()));
    pb.set_length(n as u64);
    model.draw_prior(rng)?;
    for i in 0..n {
        let y = model.draw_likelihood(rng)?;
        let theta = model.draw_posterior(rng)?;
        write_row(model, &mut out, i, &y, &theta)?;
        pb.inc(1);
    }
    Ok(out)
}

/// Backward-conditional simulator: each row restarts from the prior and keeps only the
/// state after `burn_in + 1` posterior steps.
pub fn backward<M, R>(
    model: &mut M,
    rng: &mut R,
    n: usize,
    burn_in: usize,
    pb: &ProgressBar,
) -> Result<Array2<f64>>
where
    M: Model,
    R: Rng + ?Sized,
{
    let mut out = Array2::zeros((n, model.sample_dim()));
    pb.set_length(n as u64);
    for i in 0..n {
        model.draw_prior(rng)?;
        let y = model.draw_likelihood(rng)?;
        let mut theta = Vec::new();
        for _ in 0..=burn_in {
            theta = model.draw_posterior(rng)?;
        }
        write_row(model, &mut out, i, &y, &theta)?;
        pb.inc(1);
    }
    Ok(out)
}

/// Runs `n_chains` successive chains one after another on the same stream.
///
/// The result is shaped `chain × draw × column`.
pub fn chains_successive<M, R>(
    model: &mut M,
    rng: &mut R,
    n_chains: usize,
    n: usize,
    pb: &ProgressBar,
) -> Result<Array3<f64>>
where
    M: Model,
    R: Rng + ?Sized,
{
    let mut out = Array3::zeros((n_chains, n, model.sample_dim()));
    let chain_pb = ProgressBar::hidden();
    pb.set_length(n_chains as u64);
    for mut slot in out.axis_iter_mut(Axis(0)) {
        let chain = successive(model, rng, n, &chain_pb)?;
        slot.assign(&chain);
        pb.inc(1);
    }
    Ok(out)
}
