/*!
# Geweke Sampler

[`GewekeSampler`] wraps a [`Model`] together with its [`RngStreams`] and runs the three
simulators of [`crate::core`], either on the calling thread or fanned out over a `rayon` pool.

- With a single worker every mode runs on the sequential stream and mutates the wrapped model,
  so a later call continues from the state an earlier one left behind.
- With `nproc > 1` the requested count is split with [`split_iter`], each worker gets a clone of
  the model and its own stream, and results are concatenated in worker order. The worker
  streams are jumped once the batch is complete; the sequential stream is not touched.
- Multiple successive chains always go through the worker streams and are split by chain count.

## Example Usage

```rust
use geweke_mcmc::lasso::{BayesLasso, LassoConfig};
use geweke_mcmc::sampler::GewekeSampler;

let model = BayesLasso::new(LassoConfig {
    data_seed: Some(1),
    ..LassoConfig::default()
})
.unwrap();
let mut sampler = GewekeSampler::new(model).set_seed(42).set_nproc(2).unwrap();

let forward = sampler.sample_mc(100).unwrap();
let chain = sampler.sample_sc(100).unwrap();
assert_eq!(forward.dim(), chain.dim());

let f = sampler.test_functions(forward.view()).unwrap();
assert_eq!(f.nrows(), 100);
```
*/

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::core::{self, split_iter, Model};
use crate::error::{GewekeError, Result};
use crate::rng::{RngStreams, StreamKind};

const PROGRESS_TEMPLATE: &str = "{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}";

/// Front end running forward, successive and backward simulation for one model.
#[derive(Debug, Clone)]
pub struct GewekeSampler<M: Model> {
    model: M,
    streams: RngStreams,
    seed: Option<u64>,
    progress: bool,
}

impl<M: Model> GewekeSampler<M> {
    /// Wraps `model` with a single worker and streams keyed from entropy.
    pub fn new(model: M) -> Self {
        Self {
            model,
            streams: RngStreams::new(None),
            seed: None,
            progress: false,
        }
    }

    /// Re-keys all streams from `seed`, keeping the worker count.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self.streams.reseed(Some(seed));
        self
    }

    /// Sets the number of parallel workers. Zero is rejected.
    pub fn set_nproc(mut self, nproc: usize) -> Result<Self> {
        self.streams.set_worker_count(nproc)?;
        Ok(self)
    }

    /// Shows one progress bar per worker while sampling.
    pub fn set_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn nproc(&self) -> usize {
        self.streams.nproc()
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// Marginal-conditional sampling: `n` i.i.d. rows from the joint.
    pub fn sample_mc(&mut self, n: usize) -> Result<Array2<f64>> {
        positive(n, "number of samples")?;
        if self.nproc() == 1 {
            let pb = self.progress_bar("Forward", n)?;
            let out = core::forward(&mut self.model, self.streams.sequential(), n, &pb)?;
            pb.finish_with_message("Done!");
            return Ok(out);
        }
        let parts = self.fan_out(split_iter(n, self.nproc()), |model, rng, count, pb| {
            core::forward(model, rng, count, pb)
        })?;
        concat_rows(parts)
    }

    /// Successive-conditional sampling: one chain of `n` rows.
    pub fn sample_sc(&mut self, n: usize) -> Result<Array2<f64>> {
        positive(n, "number of samples")?;
        let pb = self.progress_bar("Successive", n)?;
        let out = core::successive(&mut self.model, self.streams.sequential(), n, &pb)?;
        pb.finish_with_message("Done!");
        Ok(out)
    }

    /// Successive-conditional sampling of `n_chains` independent chains of `n` rows each,
    /// shaped `chain × draw × column`.
    pub fn sample_sc_chains(&mut self, n: usize, n_chains: usize) -> Result<Array3<f64>> {
        positive(n, "number of samples")?;
        positive(n_chains, "number of chains")?;
        let parts = self.fan_out(split_iter(n_chains, self.nproc()), |model, rng, count, pb| {
            core::chains_successive(model, rng, count, n, pb)
        })?;
        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
        ndarray::concatenate(Axis(0), &views)
            .map_err(|e| GewekeError::InvalidArgument(e.to_string()))
    }

    /// Backward-conditional sampling: `n` rows, each after `burn_in + 1` posterior steps.
    pub fn sample_bc(&mut self, n: usize, burn_in: usize) -> Result<Array2<f64>> {
        positive(n, "number of samples")?;
        if self.nproc() == 1 {
            let pb = self.progress_bar("Backward", n)?;
            let out = core::backward(&mut self.model, self.streams.sequential(), n, burn_in, &pb)?;
            pb.finish_with_message("Done!");
            return Ok(out);
        }
        let parts = self.fan_out(split_iter(n, self.nproc()), |model, rng, count, pb| {
            core::backward(model, rng, count, burn_in, pb)
        })?;
        concat_rows(parts)
    }

    /// Test functions of `samples` as defined by the wrapped model.
    pub fn test_functions(&self, samples: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.model.test_functions(samples)
    }

    /// Runs `work` once per worker on a clone of the model and that worker's stream.
    fn fan_out<T, F>(&mut self, counts: Vec<usize>, work: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&mut M, &mut ChaCha8Rng, usize, &ProgressBar) -> Result<T> + Sync,
    {
        let workers = counts.len();
        let multi = MultiProgress::new();
        let progress = self.progress;
        let model = &self.model;

        let results: Vec<Result<T>> = self
            .streams
            .workers_mut()
            .par_iter_mut()
            .zip(counts)
            .enumerate()
            .map(|(w, (rng, count))| {
                let pb = if progress {
                    let pb = multi.add(ProgressBar::new(count as u64));
                    pb.set_prefix(format!("Worker {w}"));
                    pb.set_style(progress_style()?);
                    pb
                } else {
                    ProgressBar::hidden()
                };
                let mut local = model.clone();
                let out = work(&mut local, rng, count, &pb);
                pb.finish_with_message("Done!");
                out
            })
            .collect();

        self.streams.jump(StreamKind::Workers);

        let failed = results.iter().filter(|r| r.is_err()).count();
        let mut parts = Vec::with_capacity(workers);
        let mut first_error = None;
        for result in results {
            match result {
                Ok(part) => parts.push(part),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(source) => Err(GewekeError::Workers {
                failed,
                workers,
                source: Box::new(source),
            }),
            None => Ok(parts),
        }
    }

    fn progress_bar(&self, prefix: &str, len: usize) -> Result<ProgressBar> {
        if !self.progress {
            return Ok(ProgressBar::hidden());
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_prefix(prefix.to_string());
        pb.set_style(progress_style()?);
        Ok(pb)
    }
}

fn progress_style() -> Result<ProgressStyle> {
    Ok(ProgressStyle::default_bar()
        .template(PROGRESS_TEMPLATE)
        .map_err(|e| GewekeError::Configuration(e.to_string()))?
        .progress_chars("##-"))
}

fn positive(n: usize, what: &str) -> Result<()> {
    if n == 0 {
        return Err(GewekeError::InvalidArgument(format!("{what} must be positive")));
    }
    Ok(())
}

fn concat_rows(parts: Vec<Array2<f64>>) -> Result<Array2<f64>> {
    let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
    ndarray::concatenate(Axis(0), &views).map_err(|e| GewekeError::InvalidArgument(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tests::NormalMean;
    use rand::Rng;
    use std::ops::Range;

    /// Fails its posterior step, to exercise failure aggregation.
    #[derive(Clone, Debug)]
    struct Broken;

    impl Model for Broken {
        fn sample_dim(&self) -> usize {
            2
        }

        fn theta_indices(&self) -> Range<usize> {
            1..2
        }

        fn draw_prior<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Vec<f64>> {
            Ok(vec![rng.gen()])
        }

        fn draw_likelihood<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Vec<f64>> {
            Ok(vec![rng.gen()])
        }

        fn draw_posterior<R: Rng + ?Sized>(&mut self, _rng: &mut R) -> Result<Vec<f64>> {
            Err(GewekeError::NumericDegeneracy("broken kernel".to_string()))
        }
    }

    #[test]
    fn builder_sets_seed_and_workers() {
        let sampler = GewekeSampler::new(NormalMean::new(2))
            .set_seed(42)
            .set_nproc(3)
            .unwrap()
            .set_progress(false);
        assert_eq!(sampler.seed(), Some(42));
        assert_eq!(sampler.nproc(), 3);
        assert!(GewekeSampler::new(NormalMean::new(2)).set_nproc(0).is_err());
    }

    #[test]
    fn zero_counts_are_rejected() {
        let mut sampler = GewekeSampler::new(NormalMean::new(2)).set_seed(1);
        assert!(matches!(
            sampler.sample_mc(0),
            Err(GewekeError::InvalidArgument(_))
        ));
        assert!(matches!(
            sampler.sample_sc_chains(10, 0),
            Err(GewekeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn parallel_output_is_concatenated_in_worker_order() {
        let mut sampler = GewekeSampler::new(NormalMean::new(2))
            .set_seed(5)
            .set_nproc(3)
            .unwrap();
        let out = sampler.sample_mc(10).unwrap();
        assert_eq!(out.dim(), (10, 3));

        // Worker 0 produced the first four rows from its own stream.
        let mut streams = RngStreams::with_workers(Some(5), 3).unwrap();
        let mut model = NormalMean::new(2);
        let first =
            core::forward(&mut model, &mut streams.workers_mut()[0], 4, &ProgressBar::hidden())
                .unwrap();
        assert_eq!(out.slice(ndarray::s![..4, ..]), first);
    }

    #[test]
    fn reruns_are_identical_and_batches_differ() {
        let run = || {
            let mut sampler = GewekeSampler::new(NormalMean::new(2))
                .set_seed(11)
                .set_nproc(2)
                .unwrap();
            let a = sampler.sample_mc(50).unwrap();
            let b = sampler.sample_mc(50).unwrap();
            let c = sampler.sample_bc(20, 3).unwrap();
            (a, b, c)
        };
        let (a1, b1, c1) = run();
        let (a2, b2, c2) = run();
        assert_eq!(a1, a2);
        assert_eq!(b1, b2);
        assert_eq!(c1, c2);
        assert_ne!(a1, b1);
    }

    #[test]
    fn parallel_batches_leave_sequential_stream_alone() {
        let mut plain = GewekeSampler::new(NormalMean::new(2)).set_seed(3);
        let expected = plain.sample_sc(20).unwrap();

        let mut mixed = GewekeSampler::new(NormalMean::new(2))
            .set_seed(3)
            .set_nproc(2)
            .unwrap();
        mixed.sample_mc(30).unwrap();
        assert_eq!(mixed.sample_sc(20).unwrap(), expected);
    }

    #[test]
    fn chains_are_split_by_chain_count() {
        let mut sampler = GewekeSampler::new(NormalMean::new(1))
            .set_seed(8)
            .set_nproc(2)
            .unwrap();
        let chains = sampler.sample_sc_chains(6, 3).unwrap();
        assert_eq!(chains.dim(), (3, 6, 2));

        // More workers than chains: idle workers contribute nothing.
        let mut wide = GewekeSampler::new(NormalMean::new(1))
            .set_seed(8)
            .set_nproc(4)
            .unwrap();
        assert_eq!(wide.sample_sc_chains(6, 2).unwrap().dim(), (2, 6, 2));
    }

    #[test]
    fn worker_failures_are_aggregated() {
        let mut sampler = GewekeSampler::new(Broken).set_seed(1).set_nproc(3).unwrap();
        match sampler.sample_bc(7, 0) {
            Err(GewekeError::Workers {
                failed, workers, ..
            }) => {
                assert_eq!(failed, 3);
                assert_eq!(workers, 3);
            }
            other => panic!("expected aggregated failure, got {other:?}"),
        }
        // Forward sampling never touches the posterior kernel.
        assert_eq!(sampler.sample_mc(7).unwrap().nrows(), 7);
    }
}
