//! minimizer::numerics — finite-difference derivatives, EDM and covariance.
//!
//! Purpose
//! -------
//! Provide the derivative machinery shared by both engines: gradients of the
//! internal cost, value-based Hessians, the estimated distance to minimum
//! (EDM) and the positive-definite inverse used for the covariance matrix.
//!
//! Key behaviors
//! -------------
//! - [`value_gradient`] takes central differences with explicit per-coordinate
//!   steps and falls back to forward differences when the central estimate
//!   fails validation.
//! - [`value_hessian`] builds the Hessian from function values only
//!   (second central differences), then validates and symmetrizes it.
//! - [`derivative_steps`] scales both with the coordinate, so a point far
//!   from the origin is still resolved.
//! - [`estimated_distance`] computes `0.5 · gᵀ H⁺ g` over the directions
//!   with positive curvature. Significant negative curvature, or a slope
//!   along a direction without curvature, means the point is not a minimum
//!   and yields `+∞`.
//! - [`invert_positive_definite`] returns `None` unless every eigenvalue is
//!   clearly positive.
//!
//! Invariants & assumptions
//! ------------------------
//! - All vectors live in internal (unbounded) space.
//! - Closures passed here return `NaN` to signal an evaluation failure; the
//!   validators turn that into a typed error.
//!
//! Conventions
//! -----------
//! - No explicit matrix inverse is formed; inverses and pseudo-inverses go
//!   through `nalgebra`'s symmetric eigendecomposition.
//! - Eigenvalues at most `EIGEN_EPS · max|λ|` are treated as zero.
//!
//! Testing notes
//! -------------
//! - Unit tests use quadratic objectives with analytic Hessians.
use crate::minimizer::{
    errors::{MinResult, MinimizerError},
    types::{EIGEN_EPS, FLAT_GRADIENT_TOL, Grad, HESSIAN_STEP_SCALE, Hessian, RELATIVE_STEP_FLOOR, Theta},
};
use nalgebra::{DMatrix, DVector, SymmetricEigen};

/// Validate a gradient vector against dimension and finiteness.
pub fn validate_grad(grad: &Grad, dim: usize) -> MinResult<()> {
    if grad.len() != dim {
        return Err(MinimizerError::GradientDimMismatch { expected: dim, found: grad.len() });
    }
    for (index, &value) in grad.iter().enumerate() {
        if !value.is_finite() {
            return Err(MinimizerError::InvalidGradient {
                index,
                value,
                reason: "Gradient elements must be finite.",
            });
        }
    }
    Ok(())
}

/// Validate a Hessian against shape and finiteness.
pub fn validate_hessian(hess: &Hessian, dim: usize) -> MinResult<()> {
    if hess.nrows() != dim || hess.ncols() != dim {
        return Err(MinimizerError::HessianDimMismatch {
            expected: dim,
            found: (hess.nrows(), hess.ncols()),
        });
    }
    for ((row, col), &value) in hess.indexed_iter() {
        if !value.is_finite() {
            return Err(MinimizerError::InvalidHessian { row, col, value });
        }
    }
    Ok(())
}

/// derivative_steps — per-coordinate steps for value-based derivatives.
///
/// `max(HESSIAN_STEP_SCALE · step, RELATIVE_STEP_FLOOR · |θ|, 1e-8)`: the
/// relative floor keeps `θ ± h` distinct from `θ` in floating point.
pub fn derivative_steps(theta: &Theta, steps: &Theta) -> Theta {
    theta
        .iter()
        .zip(steps.iter())
        .map(|(&t, &s)| (HESSIAN_STEP_SCALE * s).max(RELATIVE_STEP_FLOOR * t.abs()).max(1e-8))
        .collect()
}

/// value_gradient — finite-difference gradient of an internal cost.
///
/// Parameters
/// ----------
/// - `theta`: `&Theta`
///   Internal point at which to differentiate.
/// - `steps`: `&Theta`
///   Per-coordinate step sizes; must be positive and match `theta` in length.
/// - `f`: `&F`
///   Cost closure; returns `NaN` on evaluation failure.
///
/// Returns
/// -------
/// `MinResult<Grad>`
///   A validated gradient of length `theta.len()`.
///
/// Errors
/// ------
/// - `MinimizerError::InvalidGradient` if neither the central nor the forward
///   estimate is finite.
/// - `MinimizerError::GradientDimMismatch` when `steps` does not match `theta`.
///
/// Notes
/// -----
/// - Central differences are tried first; forward differences are used only
///   when the central estimate fails validation (for instance because one of
///   the backward probes hit an undefined region of the objective).
pub fn value_gradient<F: Fn(&Theta) -> f64>(theta: &Theta, steps: &Theta, f: &F) -> MinResult<Grad> {
    let dim = theta.len();
    if steps.len() != dim {
        return Err(MinimizerError::GradientDimMismatch { expected: dim, found: steps.len() });
    }
    let probe = |k: usize, dx: f64| {
        let mut x = theta.clone();
        x[k] += dx;
        f(&x)
    };
    let grad = Grad::from_shape_fn(dim, |k| (probe(k, steps[k]) - probe(k, -steps[k])) / (2.0 * steps[k]));
    match validate_grad(&grad, dim) {
        Ok(()) => Ok(grad),
        Err(_) => {
            let f0 = f(theta);
            let grad = Grad::from_shape_fn(dim, |k| (probe(k, steps[k]) - f0) / steps[k]);
            validate_grad(&grad, dim)?;
            Ok(grad)
        }
    }
}

/// value_hessian — second central differences from function values.
///
/// Purpose
/// -------
/// Approximate `∂²f/∂θᵢ∂θⱼ` using only evaluations of `f`:
/// `H_ii = (f(x+hᵢ) - 2f(x) + f(x-hᵢ)) / hᵢ²` and
/// `H_ij = (f(++) - f(+-) - f(-+) + f(--)) / (4 hᵢ hⱼ)`.
///
/// Parameters
/// ----------
/// - `theta`: `&Theta`
///   Internal point.
/// - `steps`: `&Theta`
///   Per-coordinate step sizes; must be positive and match `theta` in length.
/// - `f`: `&F`
///   Cost closure; returns `NaN` on evaluation failure.
///
/// Returns
/// -------
/// `MinResult<Hessian>`
///   A finite, symmetric `n × n` matrix.
///
/// Errors
/// ------
/// - `MinimizerError::InvalidHessian` when any entry is not finite.
/// - `MinimizerError::HessianDimMismatch` when `steps` does not match `theta`.
///
/// Notes
/// -----
/// - Differencing a finite-difference gradient would compound the gradient
///   noise; value-based differences keep the error at `O(h²)` for smooth
///   objectives and are exact for quadratics.
pub fn value_hessian<F: Fn(&Theta) -> f64>(theta: &Theta, steps: &Theta, f: &F) -> MinResult<Hessian> {
    let n = theta.len();
    if steps.len() != n {
        return Err(MinimizerError::HessianDimMismatch { expected: n, found: (steps.len(), 1) });
    }
    let f0 = f(theta);
    let probe = |moves: &[(usize, f64)]| {
        let mut x = theta.clone();
        for &(k, dx) in moves {
            x[k] += dx;
        }
        f(&x)
    };
    let mut hess = Hessian::zeros((n, n));
    for i in 0..n {
        let hi = steps[i];
        hess[[i, i]] = (probe(&[(i, hi)]) - 2.0 * f0 + probe(&[(i, -hi)])) / (hi * hi);
        for j in 0..i {
            let hj = steps[j];
            let fpp = probe(&[(i, hi), (j, hj)]);
            let fpm = probe(&[(i, hi), (j, -hj)]);
            let fmp = probe(&[(i, -hi), (j, hj)]);
            let fmm = probe(&[(i, -hi), (j, -hj)]);
            hess[[i, j]] = (fpp - fpm - fmp + fmm) / (4.0 * hi * hj);
        }
    }
    symmetrize_hess(&mut hess);
    validate_hessian(&hess, n)?;
    Ok(hess)
}

/// Mirror the strict lower triangle into the upper triangle.
fn symmetrize_hess(hess: &mut Hessian) {
    for i in 0..hess.nrows() {
        for j in 0..i {
            hess[[j, i]] = hess[[i, j]];
        }
    }
}

/// estimated_distance — EDM `0.5 · gᵀ H⁺ g`.
///
/// Directions whose curvature is numerically zero are dropped only while the
/// gradient along them is negligible, as for parameters the objective
/// ignores. Returns `+∞` when the Hessian has a clearly negative eigenvalue
/// or when the cost still slopes along a direction without curvature.
pub fn estimated_distance(grad: &Grad, hess: &Hessian) -> f64 {
    let n = grad.len();
    if n == 0 {
        return 0.0;
    }
    let eigen = symmetric_eigen(hess);
    let cutoff = eigen_cutoff(&eigen.eigenvalues);
    let g = DVector::from_iterator(n, grad.iter().copied());
    let slope_tol = FLAT_GRADIENT_TOL * (1.0 + g.norm());
    let mut edm = 0.0;
    for k in 0..n {
        let lambda = eigen.eigenvalues[k];
        let proj = eigen.eigenvectors.column(k).dot(&g);
        if lambda > cutoff {
            edm += proj * proj / lambda;
        } else if lambda < -cutoff || proj.abs() > slope_tol {
            return f64::INFINITY;
        }
    }
    0.5 * edm
}

/// invert_positive_definite — inverse of a clearly positive-definite matrix.
///
/// Returns `None` when any eigenvalue is at most `EIGEN_EPS · max|λ|`, which
/// is how unconstrained or degenerate parameters show up.
pub fn invert_positive_definite(hess: &Hessian) -> Option<Hessian> {
    let n = hess.nrows();
    if n == 0 {
        return Some(Hessian::zeros((0, 0)));
    }
    let eigen = symmetric_eigen(hess);
    let cutoff = eigen_cutoff(&eigen.eigenvalues);
    if eigen.eigenvalues.iter().any(|&l| l <= cutoff) {
        return None;
    }
    let q = &eigen.eigenvectors;
    let mut inv = Hessian::zeros((n, n));
    for i in 0..n {
        for j in i..n {
            let v: f64 = (0..n).map(|k| q[(i, k)] * q[(j, k)] / eigen.eigenvalues[k]).sum();
            inv[[i, j]] = v;
            inv[[j, i]] = v;
        }
    }
    Some(inv)
}

fn symmetric_eigen(hess: &Hessian) -> SymmetricEigen<f64, nalgebra::Dyn> {
    let n = hess.nrows();
    let mut dense = DMatrix::<f64>::zeros(n, n);
    fill_dmatrix(hess, &mut dense);
    dense.symmetric_eigen()
}

fn eigen_cutoff(eigenvalues: &DVector<f64>) -> f64 {
    let scale = eigenvalues.iter().fold(0.0_f64, |m, l| m.max(l.abs()));
    EIGEN_EPS * scale.max(f64::MIN_POSITIVE)
}

/// Copy an `ndarray` matrix into a preallocated `DMatrix`, column by column.
fn fill_dmatrix(src: &Hessian, dst: &mut DMatrix<f64>) {
    let n = src.ncols();
    for j in 0..n {
        for i in 0..src.nrows() {
            dst[(i, j)] = src[[i, j]];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, array};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Gradient and value-based Hessian accuracy on quadratics.
    // - EDM on a displaced quadratic, on an ignored parameter and on a slope
    //   without curvature.
    // - Step scaling far from the origin.
    // - Positive-definite inversion and its refusal on singular matrices.
    //
    // They intentionally DO NOT cover:
    // - Engine integration (see engine tests).
    // -------------------------------------------------------------------------

    fn quadratic(x: &Theta) -> f64 {
        2.0 * (x[0] - 1.0).powi(2) + (x[0] - 1.0) * (x[1] + 2.0) + 3.0 * (x[1] + 2.0).powi(2)
    }

    #[test]
    // Purpose
    // -------
    // Check the value-based Hessian against the analytic one.
    //
    // Given
    // -----
    // - f = 2(x-1)² + (x-1)(y+2) + 3(y+2)², analytic H = [[4, 1], [1, 6]].
    //
    // Expect
    // ------
    // - Each entry within 1e-5 and exact symmetry.
    fn value_hessian_matches_analytic_quadratic() {
        // Arrange
        let theta = array![0.3, 0.7];
        let steps = Array1::from_elem(2, 1e-3);

        // Act
        let h = value_hessian(&theta, &steps, &quadratic).unwrap();

        // Assert
        assert!((h[[0, 0]] - 4.0).abs() < 1e-5);
        assert!((h[[1, 1]] - 6.0).abs() < 1e-5);
        assert!((h[[0, 1]] - 1.0).abs() < 1e-5);
        assert_eq!(h[[0, 1]], h[[1, 0]]);
    }

    #[test]
    // Purpose
    // -------
    // Verify that a NaN-returning objective surfaces as an invalid Hessian.
    //
    // Given
    // -----
    // - An objective that always returns NaN.
    //
    // Expect
    // ------
    // - `MinimizerError::InvalidHessian`.
    fn value_hessian_rejects_nan_objective() {
        // Arrange
        let theta = array![0.0];
        let steps = array![1e-3];

        // Act
        let result = value_hessian(&theta, &steps, &|_: &Theta| f64::NAN);

        // Assert
        assert!(matches!(result, Err(MinimizerError::InvalidHessian { .. })));
    }

    #[test]
    // Purpose
    // -------
    // Verify EDM for a 1-D quadratic displaced from its minimum.
    //
    // Given
    // -----
    // - f = (x-3)², evaluated at x = 2: g = -2, H = 2.
    //
    // Expect
    // ------
    // - EDM = 0.5 · 4 / 2 = 1 (the true distance f(2) - f(3)).
    fn estimated_distance_equals_true_gap_on_quadratic() {
        // Arrange
        let f = |x: &Theta| (x[0] - 3.0).powi(2);
        let theta = array![2.0];
        let grad = value_gradient(&theta, &array![1e-3], &f).unwrap();
        let hess = value_hessian(&theta, &array![1e-3], &f).unwrap();

        // Act
        let edm = estimated_distance(&grad, &hess);

        // Assert
        assert!((edm - 1.0).abs() < 1e-5, "edm = {edm}");
    }

    #[test]
    // Purpose
    // -------
    // Ensure a flat direction with zero gradient does not inflate EDM.
    //
    // Given
    // -----
    // - f = (x-1)², independent of y, evaluated at the minimum in x.
    //
    // Expect
    // ------
    // - EDM is ~0 and the inverse is refused.
    fn flat_direction_is_ignored_by_edm_and_blocks_inverse() {
        // Arrange
        let f = |x: &Theta| (x[0] - 1.0).powi(2);
        let theta = array![1.0, 5.0];
        let steps = Array1::from_elem(2, 1e-3);
        let grad = value_gradient(&theta, &steps, &f).unwrap();
        let hess = value_hessian(&theta, &steps, &f).unwrap();

        // Act
        let edm = estimated_distance(&grad, &hess);
        let inv = invert_positive_definite(&hess);

        // Assert
        assert!(edm < 1e-12, "edm = {edm}");
        assert!(inv.is_none());
    }

    #[test]
    // Purpose
    // -------
    // Check the eigen-based inverse on a known 2×2 matrix.
    //
    // Given
    // -----
    // - H = [[4, 1], [1, 6]] with inverse [[6, -1], [-1, 4]] / 23.
    //
    // Expect
    // ------
    // - Entries agree to 1e-12.
    fn invert_positive_definite_matches_closed_form() {
        // Arrange
        let h = array![[4.0, 1.0], [1.0, 6.0]];

        // Act
        let inv = invert_positive_definite(&h).unwrap();

        // Assert
        assert!((inv[[0, 0]] - 6.0 / 23.0).abs() < 1e-12);
        assert!((inv[[0, 1]] + 1.0 / 23.0).abs() < 1e-12);
        assert!((inv[[1, 1]] - 4.0 / 23.0).abs() < 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // Ensure a direction without curvature but with a slope is not mistaken
    // for a converged one.
    //
    // Given
    // -----
    // - f = (x-1)² + 0.5·y at (1, 4) with power-of-two steps, so the
    //   differences are exact: no curvature in y, gradient 0.5 there.
    //
    // Expect
    // ------
    // - EDM is +∞.
    fn sloped_flat_direction_yields_infinite_edm() {
        // Arrange
        let f = |x: &Theta| (x[0] - 1.0).powi(2) + 0.5 * x[1];
        let theta = array![1.0, 4.0];
        let steps = Array1::from_elem(2, 1.0 / 1024.0);
        let grad = value_gradient(&theta, &steps, &f).unwrap();
        let hess = value_hessian(&theta, &steps, &f).unwrap();

        // Act
        let edm = estimated_distance(&grad, &hess);

        // Assert
        assert_eq!(grad[1], 0.5);
        assert_eq!(edm, f64::INFINITY);
    }

    #[test]
    // Purpose
    // -------
    // Check that derivative steps grow with the coordinate so a far-away
    // point still resolves the slope of a linear cost.
    //
    // Given
    // -----
    // - f = x at x = -3.6e8 and at x = -2e301, declared step 0.1.
    //
    // Expect
    // ------
    // - Steps are 1e-4 near the origin and relative far from it.
    // - The gradient is 1 at both far points and the EDM is +∞.
    fn derivative_steps_resolve_far_points() {
        // Arrange
        let f = |x: &Theta| x[0];
        let declared = array![0.1];

        // Act
        let near = derivative_steps(&array![0.5], &declared);
        let results: Vec<(f64, f64)> = [-3.6e8, -2e301]
            .iter()
            .map(|&x| {
                let theta = array![x];
                let steps = derivative_steps(&theta, &declared);
                let grad = value_gradient(&theta, &steps, &f).unwrap();
                let hess = value_hessian(&theta, &steps, &f).unwrap();
                (grad[0], estimated_distance(&grad, &hess))
            })
            .collect();

        // Assert
        assert!((near[0] - 1e-4).abs() < 1e-18);
        for (g, edm) in results {
            assert!((g - 1.0).abs() < 1e-6, "g = {g}");
            assert_eq!(edm, f64::INFINITY);
        }
    }
}
