/*!
# Collapsed Gaussian-Mixture Gibbs Kernel

Model, for `M` components in `D` dimensions and `N` observations:

- `mu_k ~ N(m_k, S_k)` and `Sigma_k ~ IW(v_k, Psi_k)` for every component,
- mixing weights `p ~ Dirichlet(alpha)`, integrated out of the posterior,
- `s_i | p ~ Categorical(p)` and `y_i | s_i ~ N(mu_{s_i}, Sigma_{s_i})`.

A sample row is `[y (N·D), mu (M·D), Sigma (M·D²), s (N)]` and the parameters under test are
the `mu` and `Sigma` blocks.

One call to [`Model::draw_posterior`] is a full Gibbs sweep over assignments, covariances and
means, in that order. The assignment update is a systematic scan: site `i` is redrawn from its
collapsed conditional given every other site, and the counts are updated before site `i + 1`.

## Example Usage

```rust
use geweke_mcmc::core::Model;
use geweke_mcmc::mixture::{GaussianMixture, MixtureConfig};
use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

let config = MixtureConfig::shared_prior(
    10,
    1,
    vec![DVector::from_element(1, -2.0), DVector::from_element(1, 2.0)],
    DMatrix::identity(1, 1),
    5.0,
    DMatrix::from_element(1, 1, 4.0),
    vec![1.0, 1.0],
);
let mut mixture = GaussianMixture::new(config).unwrap();
let mut rng = ChaCha8Rng::seed_from_u64(42);

mixture.draw_prior(&mut rng).unwrap();
mixture.draw_likelihood(&mut rng).unwrap();
let theta = mixture.draw_posterior(&mut rng).unwrap();
assert_eq!(theta.len(), 2 + 2 + 10);
assert_eq!(mixture.counts().unwrap().iter().sum::<usize>(), 10);
```
*/

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use statrs::function::gamma::ln_gamma;
use std::ops::Range;

use crate::core::Model;
use crate::distributions::{Categorical, Dirichlet, Gaussian, InverseWishart};
use crate::error::{GewekeError, Result};
use crate::linalg;

/// Which derivation of the conditionals the kernel uses.
///
/// Only [`MixtureDerivation::Correct`] targets the posterior. The other variants reproduce
/// classic derivation mistakes, so a Geweke test can show that it catches them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixtureDerivation {
    #[default]
    Correct,
    /// The covariance scatter term sums over every observation, not only the component's.
    ScatterOverAllObservations,
    /// The assignment count term keeps the site being redrawn.
    NoLeaveOneOut,
}

/// Hyperparameters of the collapsed Gaussian mixture, one prior block per component.
#[derive(Debug, Clone, PartialEq)]
pub struct MixtureConfig {
    /// Number of observations `N`.
    pub n_obs: usize,
    /// Observation dimension `D`.
    pub dim: usize,
    /// Number of components `M`.
    pub n_components: usize,
    pub mean_prior_means: Vec<DVector<f64>>,
    pub mean_prior_covs: Vec<DMatrix<f64>>,
    pub cov_prior_dfs: Vec<f64>,
    pub cov_prior_scales: Vec<DMatrix<f64>>,
    /// Dirichlet concentration of the collapsed mixing weights.
    pub weight_concentration: Vec<f64>,
}

impl MixtureConfig {
    /// Config in which every component shares the same covariance priors. The number of
    /// components is the length of `mean_prior_means`.
    pub fn shared_prior(
        n_obs: usize,
        dim: usize,
        mean_prior_means: Vec<DVector<f64>>,
        mean_prior_cov: DMatrix<f64>,
        cov_prior_df: f64,
        cov_prior_scale: DMatrix<f64>,
        weight_concentration: Vec<f64>,
    ) -> Self {
        let m = mean_prior_means.len();
        Self {
            n_obs,
            dim,
            n_components: m,
            mean_prior_means,
            mean_prior_covs: vec![mean_prior_cov; m],
            cov_prior_dfs: vec![cov_prior_df; m],
            cov_prior_scales: vec![cov_prior_scale; m],
            weight_concentration,
        }
    }

    fn validate(&self) -> Result<()> {
        let (n, d, m) = (self.n_obs, self.dim, self.n_components);
        if n == 0 || d == 0 || m == 0 {
            return Err(GewekeError::Configuration(format!(
                "N, D and M must be positive, got N={n}, D={d}, M={m}"
            )));
        }
        let lengths = [
            ("mean_prior_means", self.mean_prior_means.len()),
            ("mean_prior_covs", self.mean_prior_covs.len()),
            ("cov_prior_dfs", self.cov_prior_dfs.len()),
            ("cov_prior_scales", self.cov_prior_scales.len()),
            ("weight_concentration", self.weight_concentration.len()),
        ];
        if let Some((name, len)) = lengths.iter().find(|(_, len)| *len != m) {
            return Err(GewekeError::Configuration(format!(
                "{name} has {len} entries for {m} components"
            )));
        }
        for k in 0..m {
            if self.mean_prior_means[k].len() != d {
                return Err(GewekeError::Configuration(format!(
                    "mean prior {k} has dimension {}, expected {d}",
                    self.mean_prior_means[k].len()
                )));
            }
            for (name, mat) in [
                ("mean prior covariance", &self.mean_prior_covs[k]),
                ("covariance prior scale", &self.cov_prior_scales[k]),
            ] {
                if mat.shape() != (d, d) {
                    return Err(GewekeError::Configuration(format!(
                        "{name} {k} is {}x{}, expected {d}x{d}",
                        mat.nrows(),
                        mat.ncols()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Current latent state: component means, covariances and assignments.
#[derive(Debug, Clone, PartialEq)]
pub struct MixtureState {
    pub means: Vec<DVector<f64>>,
    pub covs: Vec<DMatrix<f64>>,
    pub assignments: Vec<usize>,
}

impl MixtureState {
    /// Number of observations assigned to each of `m` components.
    pub fn counts(&self, m: usize) -> Vec<usize> {
        let mut counts = vec![0; m];
        for &s in &self.assignments {
            counts[s] += 1;
        }
        counts
    }
}

/// Collapsed Gibbs kernel for the Bayesian Gaussian mixture.
#[derive(Debug, Clone)]
pub struct GaussianMixture {
    config: MixtureConfig,
    derivation: MixtureDerivation,
    mean_priors: Vec<Gaussian>,
    cov_priors: Vec<InverseWishart>,
    weight_prior: Dirichlet,
    state: Option<MixtureState>,
    y: Option<Vec<DVector<f64>>>,
}

impl GaussianMixture {
    /// Validates `config` and builds every prior adapter.
    pub fn new(config: MixtureConfig) -> Result<Self> {
        config.validate()?;
        let (mean_priors, cov_priors, weight_prior) = Self::build(&config)?;
        Ok(Self {
            config,
            derivation: MixtureDerivation::Correct,
            mean_priors,
            cov_priors,
            weight_prior,
            state: None,
            y: None,
        })
    }

    fn build(config: &MixtureConfig) -> Result<(Vec<Gaussian>, Vec<InverseWishart>, Dirichlet)> {
        let invalid = |what: &str, k: usize, e: GewekeError| {
            GewekeError::Configuration(format!("{what} {k}: {e}"))
        };
        let mean_priors = (0..config.n_components)
            .map(|k| {
                Gaussian::new(
                    config.mean_prior_means[k].clone(),
                    config.mean_prior_covs[k].clone(),
                )
                .map_err(|e| invalid("mean prior", k, e))
            })
            .collect::<Result<Vec<_>>>()?;
        let cov_priors = (0..config.n_components)
            .map(|k| {
                InverseWishart::new(config.cov_prior_dfs[k], config.cov_prior_scales[k].clone())
                    .map_err(|e| invalid("covariance prior", k, e))
            })
            .collect::<Result<Vec<_>>>()?;
        let weight_prior = Dirichlet::new(config.weight_concentration.clone())?;
        Ok((mean_priors, cov_priors, weight_prior))
    }

    /// Switches the kernel to another derivation of its conditionals.
    pub fn with_derivation(mut self, derivation: MixtureDerivation) -> Self {
        self.derivation = derivation;
        self
    }

    pub fn derivation(&self) -> MixtureDerivation {
        self.derivation
    }

    pub fn config(&self) -> &MixtureConfig {
        &self.config
    }

    pub fn state(&self) -> Option<&MixtureState> {
        self.state.as_ref()
    }

    pub fn observations(&self) -> Option<&[DVector<f64>]> {
        self.y.as_deref()
    }

    /// Replaces the latent state after checking its shape.
    pub fn set_state(&mut self, state: MixtureState) -> Result<()> {
        self.check_state(&state)?;
        self.state = Some(state);
        Ok(())
    }

    fn check_state(&self, state: &MixtureState) -> Result<()> {
        let (d, m, n) = (self.config.dim, self.config.n_components, self.config.n_obs);
        if state.means.len() != m || state.covs.len() != m {
            return Err(GewekeError::shape("mixture components", m, state.means.len()));
        }
        if state.assignments.len() != n {
            return Err(GewekeError::shape("mixture assignments", n, state.assignments.len()));
        }
        if let Some(bad) = state.assignments.iter().find(|&&s| s >= m) {
            return Err(GewekeError::InvalidArgument(format!(
                "assignment {bad} out of range for {m} components"
            )));
        }
        for (mean, cov) in state.means.iter().zip(&state.covs) {
            if mean.len() != d {
                return Err(GewekeError::shape("mixture mean", d, mean.len()));
            }
            if cov.shape() != (d, d) {
                return Err(GewekeError::shape("mixture covariance", d * d, cov.len()));
            }
        }
        Ok(())
    }

    /// Replaces the observations after checking their shape.
    pub fn set_observations(&mut self, y: Vec<DVector<f64>>) -> Result<()> {
        if y.len() != self.config.n_obs {
            return Err(GewekeError::shape("mixture observations", self.config.n_obs, y.len()));
        }
        if let Some(bad) = y.iter().find(|yi| yi.len() != self.config.dim) {
            return Err(GewekeError::shape("mixture observation", self.config.dim, bad.len()));
        }
        self.y = Some(y);
        Ok(())
    }

    /// Assignment counts, recomputed from the assignment vector.
    pub fn counts(&self) -> Result<Vec<usize>> {
        Ok(self.current("counts")?.counts(self.config.n_components))
    }

    fn current(&self, context: &'static str) -> Result<&MixtureState> {
        self.state.as_ref().ok_or(GewekeError::Uninitialized(context))
    }

    fn observed(&self, context: &'static str) -> Result<&[DVector<f64>]> {
        self.y.as_deref().ok_or(GewekeError::Uninitialized(context))
    }

    fn component_likelihoods(state: &MixtureState) -> Result<Vec<Gaussian>> {
        state
            .means
            .iter()
            .zip(&state.covs)
            .map(|(mean, cov)| Gaussian::new(mean.clone(), cov.clone()))
            .collect()
    }

    /**
    Log of the collapsed joint density `p(y, mu, Sigma, s)` at `state`, with the mixing
    weights integrated out, using the current observations.

    This is the target every conditional of the kernel must be consistent with.
    */
    pub fn joint_log_density(&self, state: &MixtureState) -> Result<f64> {
        let y = self.observed("joint_log_density")?;
        self.check_state(state)?;
        let m = self.config.n_components;
        let mut lp = 0.0;
        for k in 0..m {
            lp += self.mean_priors[k].log_density_vec(&state.means[k])?;
            lp += self.cov_priors[k].log_density_matrix(&state.covs[k])?;
        }

        // Dirichlet-multinomial term of the collapsed weights.
        let alpha = self.weight_prior.alpha();
        let alpha_sum: f64 = alpha.iter().sum();
        let counts = state.counts(m);
        lp += ln_gamma(alpha_sum) - ln_gamma(self.config.n_obs as f64 + alpha_sum);
        lp += alpha
            .iter()
            .zip(&counts)
            .map(|(&a, &n)| ln_gamma(a + n as f64) - ln_gamma(a))
            .sum::<f64>();

        let likelihoods = Self::component_likelihoods(state)?;
        for (yi, &s) in y.iter().zip(&state.assignments) {
            lp += likelihoods[s].log_density_vec(yi)?;
        }
        Ok(lp)
    }

    /// Conditional of every component mean given the covariances, assignments and data.
    pub fn mean_conditionals(&self) -> Result<Vec<Gaussian>> {
        let state = self.current("mean_conditionals")?;
        let y = self.observed("mean_conditionals")?;
        (0..self.config.n_components)
            .map(|k| {
                let members: Vec<&DVector<f64>> = y
                    .iter()
                    .zip(&state.assignments)
                    .filter(|(_, &s)| s == k)
                    .map(|(yi, _)| yi)
                    .collect();
                if members.is_empty() {
                    return Ok(self.mean_priors[k].clone());
                }
                let prior = &self.mean_priors[k];
                let prior_prec = linalg::inverse(prior.cov())?;
                let comp_prec = linalg::inverse(&state.covs[k])?;
                let n_k = members.len() as f64;
                let total = members
                    .iter()
                    .fold(DVector::zeros(self.config.dim), |acc, yi| acc + *yi);
                let cov = linalg::inverse(&(&prior_prec + &comp_prec * n_k))?;
                let mean = &cov * (&prior_prec * prior.mean() + &comp_prec * total);
                Gaussian::new(mean, cov)
            })
            .collect()
    }

    /// Conditional of every component covariance given the means, assignments and data.
    pub fn covariance_conditionals(&self) -> Result<Vec<InverseWishart>> {
        let state = self.current("covariance_conditionals")?;
        let y = self.observed("covariance_conditionals")?;
        let counts = state.counts(self.config.n_components);
        (0..self.config.n_components)
            .map(|k| {
                let scatter = match self.derivation {
                    MixtureDerivation::ScatterOverAllObservations => {
                        linalg::scatter(y.iter(), &state.means[k])
                    }
                    _ => linalg::scatter(
                        y.iter()
                            .zip(&state.assignments)
                            .filter(|(_, &s)| s == k)
                            .map(|(yi, _)| yi),
                        &state.means[k],
                    ),
                };
                let prior = &self.cov_priors[k];
                InverseWishart::new(
                    prior.df() + counts[k] as f64,
                    linalg::symmetrize(&(prior.scale() + scatter)),
                )
            })
            .collect()
    }

    /// Collapsed conditional of assignment `i` given every other assignment.
    pub fn assignment_conditional(&self, i: usize) -> Result<Categorical> {
        let state = self.current("assignment_conditional")?;
        let y = self.observed("assignment_conditional")?;
        if i >= self.config.n_obs {
            return Err(GewekeError::InvalidArgument(format!(
                "observation index {i} out of range for N={}",
                self.config.n_obs
            )));
        }
        let likelihoods = Self::component_likelihoods(state)?;
        let counts = state.counts(self.config.n_components);
        self.assignment_weights(&likelihoods, &counts, state.assignments[i], &y[i])
    }

    fn assignment_weights(
        &self,
        likelihoods: &[Gaussian],
        counts: &[usize],
        current: usize,
        yi: &DVector<f64>,
    ) -> Result<Categorical> {
        let alpha = self.weight_prior.alpha();
        let alpha_sum: f64 = alpha.iter().sum();
        let n = self.config.n_obs as f64;
        let log_weights = (0..self.config.n_components)
            .map(|k| {
                let count_term = match self.derivation {
                    MixtureDerivation::NoLeaveOneOut => {
                        ((alpha[k] + counts[k] as f64) / (n + alpha_sum)).ln()
                    }
                    _ => {
                        let own = if k == current { 1.0 } else { 0.0 };
                        ((alpha[k] + counts[k] as f64 - own) / (n + alpha_sum - 1.0)).ln()
                    }
                };
                Ok(count_term + likelihoods[k].log_density_vec(yi)?)
            })
            .collect::<Result<Vec<f64>>>()?;
        Categorical::from_log_weights(&log_weights)
    }

    /// Redraws every assignment in turn from its collapsed conditional.
    pub fn update_assignments<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        let y = self.observed("update_assignments")?;
        let state = self.current("update_assignments")?;
        let likelihoods = Self::component_likelihoods(state)?;
        let mut counts = state.counts(self.config.n_components);
        let mut assignments = state.assignments.clone();
        for (i, yi) in y.iter().enumerate() {
            let current = assignments[i];
            let next = self
                .assignment_weights(&likelihoods, &counts, current, yi)?
                .draw(rng);
            counts[current] -= 1;
            counts[next] += 1;
            assignments[i] = next;
        }
        if let Some(state) = self.state.as_mut() {
            state.assignments = assignments;
        }
        Ok(())
    }

    /// Redraws every component covariance from its conditional.
    pub fn update_covariances<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        let covs = self
            .covariance_conditionals()?
            .iter()
            .map(|iw| iw.draw(rng))
            .collect::<Result<Vec<_>>>()?;
        if let Some(state) = self.state.as_mut() {
            state.covs = covs;
        }
        Ok(())
    }

    /// Redraws every component mean from its conditional.
    pub fn update_means<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        let means: Vec<DVector<f64>> = self
            .mean_conditionals()?
            .iter()
            .map(|g| g.draw(rng))
            .collect();
        if let Some(state) = self.state.as_mut() {
            state.means = means;
        }
        Ok(())
    }

    fn theta_row(&self, context: &'static str) -> Result<Vec<f64>> {
        let state = self.current(context)?;
        let mut row = Vec::with_capacity(self.sample_dim() - self.config.n_obs * self.config.dim);
        for mean in &state.means {
            row.extend(mean.iter());
        }
        for cov in &state.covs {
            row.extend(cov.iter());
        }
        row.extend(state.assignments.iter().map(|&s| s as f64));
        Ok(row)
    }
}

impl Model for GaussianMixture {
    fn sample_dim(&self) -> usize {
        let (n, d, m) = (self.config.n_obs, self.config.dim, self.config.n_components);
        d * n + (d * d + d) * m + n
    }

    fn theta_indices(&self) -> Range<usize> {
        let (n, d, m) = (self.config.n_obs, self.config.dim, self.config.n_components);
        n * d..n * d + (d * d + d) * m
    }

    /// Draws means, covariances and assignments from the prior. The mixing weights drawn here
    /// only generate the assignments and are then discarded.
    fn draw_prior<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Vec<f64>> {
        let means = self.mean_priors.iter().map(|g| g.draw(rng)).collect();
        let covs = self
            .cov_priors
            .iter()
            .map(|iw| iw.draw(rng))
            .collect::<Result<Vec<_>>>()?;
        let weights = Categorical::new(self.weight_prior.draw(rng)?)?;
        let assignments = (0..self.config.n_obs).map(|_| weights.draw(rng)).collect();
        self.state = Some(MixtureState {
            means,
            covs,
            assignments,
        });
        self.theta_row("draw_prior")
    }

    fn draw_likelihood<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Vec<f64>> {
        let state = self.current("draw_likelihood")?;
        let likelihoods = Self::component_likelihoods(state)?;
        let y: Vec<DVector<f64>> = state
            .assignments
            .iter()
            .map(|&s| likelihoods[s].draw(rng))
            .collect();
        let flat = y.iter().flat_map(|yi| yi.iter().copied()).collect();
        self.y = Some(y);
        Ok(flat)
    }

    fn draw_posterior<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Vec<f64>> {
        self.update_assignments(rng)?;
        self.update_covariances(rng)?;
        self.update_means(rng)?;
        self.theta_row("draw_posterior")
    }
}
