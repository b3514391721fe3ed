//! Geweke tests of the collapsed Gaussian-mixture Gibbs kernel.
//!
//! The successive-conditional chain is compared with forward draws through the first and
//! second moments of the component means and covariances. The correct kernel must pass, and each
//! broken derivation must be flagged.

use geweke_mcmc::core::Model;
use geweke_mcmc::geweke::geweke_functions;
use geweke_mcmc::mixture::{GaussianMixture, MixtureConfig, MixtureDerivation};
use geweke_mcmc::sampler::GewekeSampler;
use geweke_mcmc::stats::{geweke_z_test, min_p_value, ZTest};
use nalgebra::{DMatrix, DVector};
use ndarray::{s, Array2};

const BATCHES: usize = 40;
/// Bonferroni-style bound over all test functions of one comparison.
const ALPHA: f64 = 1e-4;

/// One-dimensional, two-component mixture with a well-separated mean prior.
///
/// The covariance prior has `df = 10`, so the squared covariances have a finite variance.
fn scalar_mixture(n_obs: usize, centers: [f64; 2], scale: f64) -> GaussianMixture {
    GaussianMixture::new(MixtureConfig::shared_prior(
        n_obs,
        1,
        centers
            .iter()
            .map(|&c| DVector::from_element(1, c))
            .collect(),
        DMatrix::identity(1, 1),
        10.0,
        DMatrix::from_element(1, 1, scale),
        vec![1.0, 1.0],
    ))
    .unwrap()
}

fn theta_functions(model: &GaussianMixture, samples: &Array2<f64>) -> Array2<f64> {
    geweke_functions(samples.slice(s![.., model.theta_indices()]))
}

/// Forward draws against one successive chain, both `n` long after `burn_in` chain steps.
fn geweke_run(model: GaussianMixture, seed: u64, n: usize, burn_in: usize) -> Vec<ZTest> {
    let mut sampler = GewekeSampler::new(model).set_seed(seed);
    let forward = sampler.sample_mc(n).unwrap();
    let chain = sampler.sample_sc(n + burn_in).unwrap();
    let chain = chain.slice(s![burn_in.., ..]).to_owned();

    let g_forward = theta_functions(sampler.model(), &forward);
    let g_chain = theta_functions(sampler.model(), &chain);
    geweke_z_test(g_forward.view(), g_chain.view(), BATCHES).unwrap()
}

fn report(tests: &[ZTest]) -> String {
    tests
        .iter()
        .map(|t| format!("{}: z={:.2} p={:.1e}", t.column, t.z, t.p_value))
        .collect::<Vec<_>>()
        .join(", ")
}

#[test]
fn correct_kernel_passes_end_to_end() {
    let model = scalar_mixture(200, [-5.0, 5.0], 90.0);
    let tests = geweke_run(model, 42, 20_000, 1_000);
    // mu (2) and Sigma (2) give 4 columns and 10 products.
    assert_eq!(tests.len(), 14);
    assert!(min_p_value(&tests) > ALPHA, "{}", report(&tests));
}

#[test]
fn scatter_over_all_observations_is_detected() {
    // Few observations keep the broken chain stable, so it settles on a visibly wrong law.
    let model = scalar_mixture(3, [-1.0, 1.0], 10.0)
        .with_derivation(MixtureDerivation::ScatterOverAllObservations);
    let tests = geweke_run(model, 7, 20_000, 1_000);
    assert!(min_p_value(&tests) < ALPHA, "{}", report(&tests));
}

/// Runs 400k draws at N = 2 instead of the usual 20k. The bias of this derivation shrinks with
/// N and vanishes under a flat likelihood, so it only shows with two informative observations
/// and a long chain.
#[test]
fn missing_leave_one_out_is_detected() {
    let model =
        scalar_mixture(2, [-1.0, 1.0], 10.0).with_derivation(MixtureDerivation::NoLeaveOneOut);
    let tests = geweke_run(model, 11, 400_000, 1_000);
    assert!(min_p_value(&tests) < ALPHA, "{}", report(&tests));
}

/// Control for `missing_leave_one_out_is_detected`, at the same 400k draws and N = 2.
#[test]
fn correct_kernel_passes_on_small_data() {
    let model = scalar_mixture(2, [-1.0, 1.0], 10.0);
    let tests = geweke_run(model, 11, 400_000, 1_000);
    assert!(min_p_value(&tests) > ALPHA, "{}", report(&tests));
}

#[test]
fn parallel_forward_draws_match_sequential_chain() {
    let mut sampler = GewekeSampler::new(scalar_mixture(20, [-3.0, 3.0], 30.0))
        .set_seed(3)
        .set_nproc(4)
        .unwrap();
    let forward = sampler.sample_mc(20_000).unwrap();
    let chain = sampler.sample_sc(21_000).unwrap();
    let chain = chain.slice(s![1_000.., ..]).to_owned();
    let g_forward = theta_functions(sampler.model(), &forward);
    let g_chain = theta_functions(sampler.model(), &chain);
    let tests = geweke_z_test(g_forward.view(), g_chain.view(), BATCHES).unwrap();
    assert!(min_p_value(&tests) > ALPHA, "{}", report(&tests));
}
