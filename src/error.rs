//! Error taxonomy shared by the adapters, the model kernels and the sampler front end.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GewekeError {
    /// Invalid hyperparameters or sampler settings, raised at construction.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A sampling request whose counts are non-positive or inconsistent.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A value handed to a distribution adapter has the wrong dimensionality.
    #[error("Shape mismatch in {context}: expected {expected}, found {found}")]
    Shape {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    /// A covariance that is not positive-definite, or a density that is not finite.
    ///
    /// Never recovered from: inside a Geweke run it signals a broken conditional.
    #[error("Numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    /// A kernel primitive was called before `draw_prior` created the state.
    #[error("{0} called before draw_prior")]
    Uninitialized(&'static str),

    /// At least one worker of a parallel fan-out failed; no partial results are returned.
    #[error("{failed} of {workers} workers failed")]
    Workers {
        failed: usize,
        workers: usize,
        #[source]
        source: Box<GewekeError>,
    },
}

pub type Result<T> = std::result::Result<T, GewekeError>;

impl GewekeError {
    pub(crate) fn shape(context: &'static str, expected: usize, found: usize) -> Self {
        GewekeError::Shape {
            context,
            expected,
            found,
        }
    }
}
