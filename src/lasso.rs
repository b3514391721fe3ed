/*!
# Bayesian Lasso Reversible-Jump Kernel

Sparse linear regression `y = X beta + sigma * e` with `N` observations and `p` covariates:

- the active-set size `k` follows a Poisson(`lambda`) law truncated to `1..=p`,
- the active set `gamma` is a uniform `k`-subset of `0..p`,
- active coefficients are i.i.d. Laplace(`tau`) and inactive ones are exactly zero,
- `sigma^2 ~ InvGamma(alpha_sigma2, beta_sigma2)`.

The covariates `X` are fixed for the lifetime of a model. They are either supplied in the
config or drawn once from `N(0, 1)` at construction.

A sample row is `[y (N), beta (p), sigma]` and the parameters under test are `beta` and `sigma`.

One call to [`Model::draw_posterior`] is one reversible-jump step on `(k, gamma, beta)` combined
with a Gibbs draw of `sigma`. Which of the two runs first is decided by a fair coin on every
call. Both sub-kernels leave the posterior invariant, so either order is valid; the coin makes
the composite kernel a random-scan sampler. [`BayesLasso::posterior_step`] runs a fixed order.

## Example Usage

```rust
use geweke_mcmc::core::Model;
use geweke_mcmc::lasso::{BayesLasso, LassoConfig};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

let mut lasso = BayesLasso::new(LassoConfig {
    n_obs: 5,
    n_features: 4,
    data_seed: Some(7),
    ..LassoConfig::default()
})
.unwrap();
let mut rng = ChaCha8Rng::seed_from_u64(42);

lasso.draw_prior(&mut rng).unwrap();
lasso.draw_likelihood(&mut rng).unwrap();
for _ in 0..10 {
    lasso.draw_posterior(&mut rng).unwrap();
}
let state = lasso.state().unwrap();
assert!((1..=4).contains(&state.k()));
```
*/

use nalgebra::{DMatrix, DVector};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use statrs::function::gamma::ln_gamma;
use std::collections::HashSet;
use std::ops::Range;

use crate::core::Model;
use crate::distributions::{
    normal_log_density, Categorical, Gaussian, InverseGamma, Laplace, Seeded,
};
use crate::error::{GewekeError, Result};
use crate::geweke::geweke_functions;

/// Which derivation of the acceptance ratio the kernel uses.
///
/// Only [`LassoDerivation::Correct`] targets the posterior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LassoDerivation {
    #[default]
    Correct,
    /// Birth and death moves are accepted on the joint-density ratio alone.
    NoHastingsCorrection,
    /// The Poisson term of the prior subtracts `ln Γ(k)` in place of `ln Γ(k + 1)`.
    PoissonOffByOne,
}

/// Hyperparameters of the Bayesian Lasso.
#[derive(Debug, Clone, PartialEq)]
pub struct LassoConfig {
    /// Number of observations `N`.
    pub n_obs: usize,
    /// Number of covariates `p`.
    pub n_features: usize,
    /// Poisson rate of the active-set size.
    pub lambda: f64,
    /// Laplace scale of active coefficients.
    pub tau: f64,
    pub alpha_sigma2: f64,
    pub beta_sigma2: f64,
    /// Scale of the Gaussian perturbation in update moves.
    pub epsilon_update: f64,
    /// Scale of the Gaussian a newborn coefficient is drawn from.
    pub epsilon_birth: f64,
    /// Seed for drawing the covariates; entropy when `None`.
    pub data_seed: Option<u64>,
    /// Fixed `N × p` covariates. Drawn from `N(0, 1)` when `None`.
    pub covariates: Option<DMatrix<f64>>,
}

impl Default for LassoConfig {
    fn default() -> Self {
        Self {
            n_obs: 1,
            n_features: 3,
            lambda: 1.0,
            tau: 1.0,
            alpha_sigma2: 3.0,
            beta_sigma2: 1.0,
            epsilon_update: 1.0,
            epsilon_birth: 1.0,
            data_seed: None,
            covariates: None,
        }
    }
}

impl LassoConfig {
    fn validate(&self) -> Result<()> {
        if self.n_obs == 0 || self.n_features == 0 {
            return Err(GewekeError::Configuration(format!(
                "N and p must be positive, got N={}, p={}",
                self.n_obs, self.n_features
            )));
        }
        let positives = [
            ("lambda", self.lambda),
            ("tau", self.tau),
            ("alpha_sigma2", self.alpha_sigma2),
            ("beta_sigma2", self.beta_sigma2),
            ("epsilon_update", self.epsilon_update),
            ("epsilon_birth", self.epsilon_birth),
        ];
        if let Some((name, value)) = positives
            .iter()
            .find(|(_, v)| !(*v > 0.0 && v.is_finite()))
        {
            return Err(GewekeError::Configuration(format!(
                "{name} must be positive and finite, got {value}"
            )));
        }
        if let Some(x) = &self.covariates {
            if x.shape() != (self.n_obs, self.n_features) {
                return Err(GewekeError::Configuration(format!(
                    "covariates are {}x{}, expected {}x{}",
                    x.nrows(),
                    x.ncols(),
                    self.n_obs,
                    self.n_features
                )));
            }
        }
        Ok(())
    }
}

/// Current state of the chain.
///
/// `k` is not stored separately: it is always `gamma.len()`.
#[derive(Debug, Clone, PartialEq)]
pub struct LassoState {
    pub beta: DVector<f64>,
    pub gamma: Vec<usize>,
    pub sigma: f64,
}

impl LassoState {
    pub fn k(&self) -> usize {
        self.gamma.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    Update,
    Birth,
    Death,
}

/// A proposed `(gamma, beta)` together with the move and coefficient that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub kind: MoveKind,
    pub index: usize,
    pub gamma: Vec<usize>,
    pub beta: DVector<f64>,
}

/// Order of the two sub-kernels within one posterior step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    SigmaFirst,
    MoveFirst,
}

/// Reversible-jump MH kernel for the Bayesian Lasso.
#[derive(Debug, Clone)]
pub struct BayesLasso {
    config: LassoConfig,
    derivation: LassoDerivation,
    x: DMatrix<f64>,
    k_prior: Categorical,
    slab: Laplace,
    sigma2_prior: InverseGamma,
    state: Option<LassoState>,
    y: Option<DVector<f64>>,
}

impl BayesLasso {
    /// Validates `config`, builds the prior adapters and fixes the covariates.
    pub fn new(config: LassoConfig) -> Result<Self> {
        config.validate()?;
        let x = match &config.covariates {
            Some(x) => x.clone(),
            None => Self::draw_covariates(&config)?,
        };
        let (k_prior, slab, sigma2_prior) = Self::build(&config)?;
        Ok(Self {
            config,
            derivation: LassoDerivation::Correct,
            x,
            k_prior,
            slab,
            sigma2_prior,
            state: None,
            y: None,
        })
    }

    fn build(config: &LassoConfig) -> Result<(Categorical, Laplace, InverseGamma)> {
        // Truncated Poisson over k = 1..=p, stored at index k - 1.
        let log_pmf: Vec<f64> = (1..=config.n_features)
            .map(|k| {
                let k = k as f64;
                k * config.lambda.ln() - config.lambda - ln_gamma(k + 1.0)
            })
            .collect();
        Ok((
            Categorical::from_log_weights(&log_pmf)?,
            Laplace::new(config.tau)?,
            InverseGamma::new(config.alpha_sigma2, config.beta_sigma2)?,
        ))
    }

    fn draw_covariates(config: &LassoConfig) -> Result<DMatrix<f64>> {
        let rng = match config.data_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let draws = Seeded::with_rng(Gaussian::standard(config.n_features)?, rng)
            .sample(config.n_obs)?;
        Ok(DMatrix::from_fn(config.n_obs, config.n_features, |i, j| {
            draws[[i, j]]
        }))
    }

    /// Switches the kernel to another derivation of its acceptance ratio.
    pub fn with_derivation(mut self, derivation: LassoDerivation) -> Self {
        self.derivation = derivation;
        self
    }

    pub fn derivation(&self) -> LassoDerivation {
        self.derivation
    }

    pub fn config(&self) -> &LassoConfig {
        &self.config
    }

    pub fn covariates(&self) -> &DMatrix<f64> {
        &self.x
    }

    pub fn state(&self) -> Option<&LassoState> {
        self.state.as_ref()
    }

    pub fn observations(&self) -> Option<&DVector<f64>> {
        self.y.as_ref()
    }

    /// Replaces the chain state after checking every invariant.
    pub fn set_state(&mut self, state: LassoState) -> Result<()> {
        self.check_state(&state)?;
        self.state = Some(state);
        Ok(())
    }

    fn check_state(&self, state: &LassoState) -> Result<()> {
        let p = self.config.n_features;
        if state.beta.len() != p {
            return Err(GewekeError::shape("lasso coefficients", p, state.beta.len()));
        }
        let active: HashSet<usize> = state.gamma.iter().copied().collect();
        if active.len() != state.gamma.len() || state.gamma.iter().any(|&j| j >= p) {
            return Err(GewekeError::InvalidArgument(format!(
                "active set {:?} must hold distinct indices below {p}",
                state.gamma
            )));
        }
        if !(1..=p).contains(&state.k()) {
            return Err(GewekeError::InvalidArgument(format!(
                "active set size {} outside 1..={p}",
                state.k()
            )));
        }
        if (0..p).any(|j| !active.contains(&j) && state.beta[j] != 0.0) {
            return Err(GewekeError::InvalidArgument(
                "inactive coefficients must be zero".to_string(),
            ));
        }
        if !(state.sigma > 0.0 && state.sigma.is_finite()) {
            return Err(GewekeError::InvalidArgument(format!(
                "sigma must be positive, got {}",
                state.sigma
            )));
        }
        Ok(())
    }

    /// Replaces the observations after checking their length.
    pub fn set_observations(&mut self, y: DVector<f64>) -> Result<()> {
        if y.len() != self.config.n_obs {
            return Err(GewekeError::shape("lasso observations", self.config.n_obs, y.len()));
        }
        self.y = Some(y);
        Ok(())
    }

    fn current(&self, context: &'static str) -> Result<&LassoState> {
        self.state.as_ref().ok_or(GewekeError::Uninitialized(context))
    }

    fn observed(&self, context: &'static str) -> Result<&DVector<f64>> {
        self.y.as_ref().ok_or(GewekeError::Uninitialized(context))
    }

    /// Log prior of `state`, up to the normalising constant of the truncated Poisson.
    pub fn log_prior(&self, state: &LassoState) -> Result<f64> {
        self.check_state(state)?;
        let p = self.config.n_features as f64;
        let k = state.k() as f64;
        let lambda = self.config.lambda;
        let k_factorial = match self.derivation {
            LassoDerivation::PoissonOffByOne => ln_gamma(k),
            _ => ln_gamma(k + 1.0),
        };
        // ln P(gamma | k) + ln P(k)
        let structure = -ln_gamma(p + 1.0) + ln_gamma(k + 1.0) + ln_gamma(p - k + 1.0) - lambda
            + k * lambda.ln()
            - k_factorial;
        let slab: f64 = state
            .gamma
            .iter()
            .map(|&j| self.slab.log_pdf(state.beta[j]))
            .sum();
        Ok(structure + slab + self.sigma2_prior.log_pdf(state.sigma * state.sigma))
    }

    /// Gaussian log-likelihood of `y` given `beta` and `sigma`.
    pub fn log_likelihood(
        &self,
        beta: &DVector<f64>,
        sigma: f64,
        y: &DVector<f64>,
    ) -> Result<f64> {
        let (n, p) = (self.config.n_obs, self.config.n_features);
        if beta.len() != p {
            return Err(GewekeError::shape("log_likelihood coefficients", p, beta.len()));
        }
        if y.len() != n {
            return Err(GewekeError::shape("log_likelihood observations", n, y.len()));
        }
        let fitted = &self.x * beta;
        Ok(y.iter()
            .zip(fitted.iter())
            .map(|(yi, mi)| normal_log_density(*yi, *mi, sigma))
            .sum())
    }

    /// Log prior plus log-likelihood of the current observations at `state`.
    pub fn log_joint(&self, state: &LassoState) -> Result<f64> {
        let y = self.observed("log_joint")?;
        Ok(self.log_prior(state)? + self.log_likelihood(&state.beta, state.sigma, y)?)
    }

    /**
    Probability that the move proposal turns active set `from` into active set `to`.

    The boundary cases split the move probability as follows:

    - `k == 1`: birth 1/2, shared over the `p - k` inactive indices, update 1/2.
    - `1 < k < p`: birth, update and death 1/3 each; birth and death are shared over the
      `p - k` and `k` eligible indices.
    - `k == p`: update 1/2, death 1/2 shared over the `k` active indices.

    An update keeps the active set, a birth adds one index to it and a death removes one.
    Sets that no single move connects have probability zero, as does every move when `p == 1`.
    */
    pub fn gamma_proposal_prob(&self, from: &[usize], to: &[usize]) -> f64 {
        let p = self.config.n_features;
        let k = from.len();
        if p == 1 || k == 0 {
            return 0.0;
        }
        let k_to = to.len();
        let from_set: HashSet<usize> = from.iter().copied().collect();
        let shared = to.iter().filter(|j| from_set.contains(j)).count();
        let (k_f, p_f) = (k as f64, p as f64);

        let birth = k_to == k + 1 && shared == k;
        let update = k_to == k && shared == k;
        let death = k_to + 1 == k && shared == k_to;
        if k == 1 {
            if birth {
                0.5 / (p_f - k_f)
            } else if update {
                0.5
            } else {
                0.0
            }
        } else if k < p {
            if birth {
                1.0 / 3.0 / (p_f - k_f)
            } else if update {
                1.0 / 3.0
            } else if death {
                1.0 / 3.0 / k_f
            } else {
                0.0
            }
        } else if k == p {
            if update {
                0.5
            } else if death {
                0.5 / k_f
            } else {
                0.0
            }
        } else {
            0.0
        }
    }

    /// Log-density of a newborn coefficient under the birth proposal.
    pub fn proposal_log_density(&self, beta_j: f64) -> f64 {
        normal_log_density(beta_j, 0.0, self.config.epsilon_birth)
    }

    /// Draws an update, birth or death move from the current state.
    pub fn propose<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Proposal> {
        let state = self.current("propose")?;
        let p = self.config.n_features;
        let k = state.k();
        let kind = if p == 1 {
            MoveKind::Update
        } else if k == 1 {
            [MoveKind::Update, MoveKind::Birth][rng.gen_range(0..2)]
        } else if k == p {
            [MoveKind::Death, MoveKind::Update][rng.gen_range(0..2)]
        } else {
            [MoveKind::Death, MoveKind::Update, MoveKind::Birth][rng.gen_range(0..3)]
        };

        let mut gamma = state.gamma.clone();
        let mut beta = state.beta.clone();
        let index = match kind {
            MoveKind::Update => {
                let j = state.gamma[rng.gen_range(0..k)];
                beta[j] += self.config.epsilon_update * rng.sample::<f64, _>(StandardNormal);
                j
            }
            MoveKind::Birth => {
                let inactive: Vec<usize> = (0..p).filter(|j| !state.gamma.contains(j)).collect();
                let j = inactive[rng.gen_range(0..inactive.len())];
                gamma.push(j);
                beta[j] = self.config.epsilon_birth * rng.sample::<f64, _>(StandardNormal);
                j
            }
            MoveKind::Death => {
                let j = state.gamma[rng.gen_range(0..k)];
                gamma.retain(|&g| g != j);
                beta[j] = 0.0;
                j
            }
        };
        Ok(Proposal {
            kind,
            index,
            gamma,
            beta,
        })
    }

    /// Log acceptance ratio of `proposal` from the current state.
    pub fn log_acceptance(&self, proposal: &Proposal) -> Result<f64> {
        let state = self.current("log_acceptance")?;
        let proposed = LassoState {
            beta: proposal.beta.clone(),
            gamma: proposal.gamma.clone(),
            sigma: state.sigma,
        };
        let diff_log_joint = self.log_joint(&proposed)? - self.log_joint(state)?;

        let hastings = match (self.derivation, proposal.kind) {
            (LassoDerivation::NoHastingsCorrection, _) | (_, MoveKind::Update) => 0.0,
            (_, MoveKind::Birth) => {
                self.gamma_proposal_prob(&proposal.gamma, &state.gamma).ln()
                    - self.gamma_proposal_prob(&state.gamma, &proposal.gamma).ln()
                    - self.proposal_log_density(proposal.beta[proposal.index])
            }
            (_, MoveKind::Death) => {
                self.gamma_proposal_prob(&proposal.gamma, &state.gamma).ln()
                    - self.gamma_proposal_prob(&state.gamma, &proposal.gamma).ln()
                    + self.proposal_log_density(state.beta[proposal.index])
            }
        };
        Ok(diff_log_joint + hastings)
    }

    /// One reversible-jump MH step on `(k, gamma, beta)`. Returns whether the move was accepted.
    pub fn jump_step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<bool> {
        let proposal = self.propose(rng)?;
        let threshold = self.log_acceptance(&proposal)?;
        let u: f64 = rng.gen();
        if u.ln() <= threshold {
            if let Some(state) = self.state.as_mut() {
                state.gamma = proposal.gamma;
                state.beta = proposal.beta;
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Full conditional of `sigma^2` given `beta` and the observations.
    pub fn sigma2_conditional(&self) -> Result<InverseGamma> {
        let state = self.current("sigma2_conditional")?;
        let y = self.observed("sigma2_conditional")?;
        let rss = (y - &self.x * &state.beta).norm_squared();
        InverseGamma::new(
            self.config.alpha_sigma2 + 0.5 * self.config.n_obs as f64,
            self.config.beta_sigma2 + 0.5 * rss,
        )
    }

    /// Gibbs draw of `sigma` from its full conditional.
    pub fn update_sigma<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        let sigma = self.sigma2_conditional()?.draw(rng).sqrt();
        if let Some(state) = self.state.as_mut() {
            state.sigma = sigma;
        }
        Ok(())
    }

    /// One posterior step with the sub-kernels in a fixed `order`.
    pub fn posterior_step<R: Rng + ?Sized>(&mut self, rng: &mut R, order: ScanOrder) -> Result<()> {
        self.observed("draw_posterior")?;
        match order {
            ScanOrder::SigmaFirst => {
                self.update_sigma(rng)?;
                self.jump_step(rng)?;
            }
            ScanOrder::MoveFirst => {
                self.jump_step(rng)?;
                self.update_sigma(rng)?;
            }
        }
        Ok(())
    }

    fn theta_row(&self, context: &'static str) -> Result<Vec<f64>> {
        let state = self.current(context)?;
        let mut row: Vec<f64> = state.beta.iter().copied().collect();
        row.push(state.sigma);
        Ok(row)
    }
}

impl Model for BayesLasso {
    fn sample_dim(&self) -> usize {
        self.config.n_obs + self.config.n_features + 1
    }

    fn theta_indices(&self) -> Range<usize> {
        self.config.n_obs..self.config.n_obs + self.config.n_features + 1
    }

    fn draw_prior<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Vec<f64>> {
        let p = self.config.n_features;
        let sigma = self.sigma2_prior.draw(rng).sqrt();
        let k = self.k_prior.draw(rng) + 1;
        let gamma = rand::seq::index::sample(rng, p, k).into_vec();
        let mut beta = DVector::zeros(p);
        for &j in &gamma {
            beta[j] = self.slab.draw(rng);
        }
        self.state = Some(LassoState { beta, gamma, sigma });
        self.theta_row("draw_prior")
    }

    fn draw_likelihood<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Vec<f64>> {
        let state = self.current("draw_likelihood")?;
        let fitted = &self.x * &state.beta;
        let sigma = state.sigma;
        let y = fitted.map(|m| m + sigma * rng.sample::<f64, _>(StandardNormal));
        let flat = y.iter().copied().collect();
        self.y = Some(y);
        Ok(flat)
    }

    fn draw_posterior<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Vec<f64>> {
        let order = if rng.gen::<bool>() {
            ScanOrder::SigmaFirst
        } else {
            ScanOrder::MoveFirst
        };
        self.posterior_step(rng, order)?;
        self.theta_row("draw_posterior")
    }

    /// Geweke functions of `(beta, sigma)` plus one column with each row's log-likelihood.
    fn test_functions(&self, samples: ArrayView2<f64>) -> Result<Array2<f64>> {
        if samples.ncols() != self.sample_dim() {
            return Err(GewekeError::shape(
                "test_functions",
                self.sample_dim(),
                samples.ncols(),
            ));
        }
        let (n, p) = (self.config.n_obs, self.config.n_features);
        let moments = geweke_functions(samples.slice(s![.., self.theta_indices()]));
        let log_lik = samples
            .rows()
            .into_iter()
            .map(|row| {
                let y = DVector::from_iterator(n, row.slice(s![..n]).iter().copied());
                let beta = DVector::from_iterator(p, row.slice(s![n..n + p]).iter().copied());
                self.log_likelihood(&beta, row[n + p], &y)
            })
            .collect::<Result<Vec<f64>>>()
            .map(Array1::from)?;
        ndarray::concatenate(Axis(1), &[moments.view(), log_lik.view().insert_axis(Axis(1))])
            .map_err(|e| GewekeError::InvalidArgument(e.to_string()))
    }
}
