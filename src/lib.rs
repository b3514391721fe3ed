//! Geweke joint-distribution tests for hand-derived MCMC kernels.
//!
//! A [`Model`](core::Model) exposes prior, likelihood and posterior-kernel draws; a
//! [`GewekeSampler`](sampler::GewekeSampler) turns them into forward, successive and backward
//! samples of the joint distribution on reproducible random streams, and [`stats`] compares
//! their test-function means.
//!
//! ```rust
//! use geweke_mcmc::lasso::{BayesLasso, LassoConfig};
//! use geweke_mcmc::sampler::GewekeSampler;
//! use geweke_mcmc::stats::{geweke_z_test, min_p_value};
//!
//! let model = BayesLasso::new(LassoConfig::default()).unwrap();
//! let mut sampler = GewekeSampler::new(model).set_seed(7);
//! let forward = sampler.sample_mc(2_000).unwrap();
//! let chain = sampler.sample_sc(2_000).unwrap();
//! let g_fw = sampler.test_functions(forward.view()).unwrap();
//! let g_sc = sampler.test_functions(chain.view()).unwrap();
//! let tests = geweke_z_test(g_fw.view(), g_sc.view(), 20).unwrap();
//! assert_eq!(tests.len(), g_fw.ncols());
//! assert!(min_p_value(&tests) >= 0.0);
//! ```

pub mod core;
pub mod distributions;
pub mod error;
pub mod geweke;
pub mod io;
pub mod lasso;
pub mod linalg;
pub mod mixture;
pub mod rng;
pub mod sampler;
pub mod stats;

pub use crate::core::Model;
pub use crate::error::{GewekeError, Result};
pub use crate::lasso::{BayesLasso, LassoConfig, LassoDerivation};
pub use crate::mixture::{GaussianMixture, MixtureConfig, MixtureDerivation};
pub use crate::sampler::GewekeSampler;
