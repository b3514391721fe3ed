//! Covariance-matrix helpers on top of `nalgebra`.
//!
//! Every helper takes a scalar path for 1×1 matrices: determinant is the value,
//! inverse is the reciprocal, and no factorisation is attempted.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

use crate::error::{GewekeError, Result};

/// Cholesky factor of a symmetric positive-definite matrix.
pub fn cholesky(m: &DMatrix<f64>) -> Result<Cholesky<f64, Dyn>> {
    if !m.is_square() {
        return Err(GewekeError::shape("cholesky", m.nrows(), m.ncols()));
    }
    Cholesky::new(m.clone()).ok_or_else(|| {
        GewekeError::NumericDegeneracy(format!("matrix is not positive-definite: {m}"))
    })
}

/// Natural log of the determinant of a positive-definite matrix.
pub fn log_det(m: &DMatrix<f64>) -> Result<f64> {
    if m.nrows() == 1 && m.ncols() == 1 {
        let v = m[(0, 0)];
        return positive_scalar(v).map(f64::ln);
    }
    let chol = cholesky(m)?;
    Ok(2.0 * chol.l_dirty().diagonal().iter().map(|d| d.ln()).sum::<f64>())
}

/// Inverse of a positive-definite matrix, symmetrised to absorb round-off.
pub fn inverse(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if m.nrows() == 1 && m.ncols() == 1 {
        let v = positive_scalar(m[(0, 0)])?;
        return Ok(DMatrix::from_element(1, 1, 1.0 / v));
    }
    let inv = cholesky(m)?.inverse();
    Ok(symmetrize(&inv))
}

/// `x^T m^{-1} x` for a positive-definite `m`.
pub fn inv_quad_form(m: &DMatrix<f64>, x: &DVector<f64>) -> Result<f64> {
    if m.nrows() != x.len() {
        return Err(GewekeError::shape("inv_quad_form", m.nrows(), x.len()));
    }
    if m.nrows() == 1 {
        let v = positive_scalar(m[(0, 0)])?;
        return Ok(x[0] * x[0] / v);
    }
    let z = cholesky(m)?.l().solve_lower_triangular(x).ok_or_else(|| {
        GewekeError::NumericDegeneracy("singular Cholesky factor".to_string())
    })?;
    Ok(z.norm_squared())
}

/// `(m + m^T) / 2`.
pub fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    (m + m.transpose()) * 0.5
}

/// Scatter matrix `sum_i (x_i - c)(x_i - c)^T` of the given points about `center`.
pub fn scatter<'a, I>(points: I, center: &DVector<f64>) -> DMatrix<f64>
where
    I: IntoIterator<Item = &'a DVector<f64>>,
{
    let d = center.len();
    points
        .into_iter()
        .fold(DMatrix::zeros(d, d), |acc, x| {
            let diff = x - center;
            acc + &diff * diff.transpose()
        })
}

fn positive_scalar(v: f64) -> Result<f64> {
    if v > 0.0 && v.is_finite() {
        Ok(v)
    } else {
        Err(GewekeError::NumericDegeneracy(format!(
            "scalar variance must be positive and finite, got {v}"
        )))
    }
}
