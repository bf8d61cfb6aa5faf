//! Integration tests for fit sessions, errors and contours.
//!
//! Purpose
//! -------
//! - Validate the end-to-end pipeline: parameter registry → session →
//!   minimize → errors / covariance → contour, through the public API only.
//! - Check the behaviors callers rely on: analytic minima are found,
//!   call-order mistakes are errors, grid values land in the right cells
//!   whatever the evaluation order.
//!
//! Coverage
//! --------
//! - `minimizer::session`: `ManagedMinimizer` and `NativeMinimizer` on
//!   quadratics, MINOS-style errors, correlation, and an unbounded linear
//!   objective that must end as `FIT_FAILED` on both bindings.
//! - `minimizer::contour` / `minimizer::execution`: 1-D and 2-D grids,
//!   log spacing, positional reordering with no free parameters left,
//!   serial vs pooled execution with a completion-reordering pool.
//! - `stats_tools`: model comparison built from a finished fit.
//!
//! Exclusions
//! ----------
//! - Engine internals and scripted retry sequences; those are covered by
//!   unit tests with a scripted engine.
use astrofit::{
    minimizer::{
        contour::GridPoint,
        execution::{BatchState, PointJob, SlotBatch},
        prelude::*,
    },
    stats_tools::{AnalysisSummary, MleSummary, ModelComparison, SortKey},
};
use std::{sync::Arc, time::Duration};

/// Registry of unbounded parameters, all starting at 0 with step 1.
fn registry(paths: &[&str]) -> ParameterRegistry {
    ParameterRegistry::from_parameters(paths.iter().map(|p| Parameter::new(*p, 0.0, 1.0).unwrap())).unwrap()
}

/// Session on `f` over `paths` with default options.
fn session(
    paths: &[&str], f: impl Fn(&[f64]) -> f64 + Send + Sync + 'static,
) -> ManagedMinimizer {
    ManagedMinimizer::new(Objective::new(paths.len(), f), registry(paths), MinimizerOptions::default())
        .unwrap()
        .with_sink(Box::new(CollectingSink::default()))
}

/// Pool that finishes the batch synchronously, last point first.
struct ReversingPool;

impl WorkerPool for ReversingPool {
    fn submit(&self, points: Vec<GridPoint>, job: PointJob) -> MinResult<Box<dyn BatchHandle>> {
        let batch = Arc::new(BatchState::new(points.len()));
        for (slot, point) in points.into_iter().enumerate().rev() {
            batch.complete(slot, job(point));
        }
        Ok(Box::new(SlotBatch::new(batch)))
    }
}

fn three_parameter_bowl(p: &[f64]) -> f64 {
    (p[0] - 1.0).powi(2) + (p[1] - 2.0).powi(2) + (p[2] - 3.0).powi(2)
}

#[test]
// Purpose
// -------
// Verify that a one-parameter parabola is minimized and that its
// asymmetric errors match Δ(-ln L) = 0.5.
//
// Given
// -----
// - f(x) = (x - 3)², x starting at 0 with step 1, no bounds.
//
// Expect
// ------
// - best fit x ≈ 3, minimum ≈ 0.
// - errors ≈ (-0.7071, +0.7071).
// - The stored best fit and minimum match the returned ones.
fn parabola_minimum_and_errors() {
    // Arrange
    let mut fit = session(&["x"], |p| (p[0] - 3.0).powi(2));

    // Act
    let (best_fit, minimum) = fit.minimize().unwrap();
    let errors = fit.get_errors().unwrap();

    // Assert
    let x = *best_fit.get("x").unwrap();
    assert!((x - 3.0).abs() < 1e-4, "x = {x}");
    assert!(minimum.abs() < 1e-8, "minimum = {minimum}");
    assert_eq!(fit.best_fit_parameters(), Some(&best_fit));
    assert_eq!(fit.function_minimum_value(), Some(minimum));
    let (negative, positive) = *errors.get("x").unwrap();
    assert!((negative + 0.5f64.sqrt()).abs() < 1e-3, "negative = {negative}");
    assert!((positive - 0.5f64.sqrt()).abs() < 1e-3, "positive = {positive}");
    assert!((fit.registry().get("x").unwrap().value() - x).abs() < 1e-12);
}

#[test]
// Purpose
// -------
// Ensure errors cannot be requested before a converged minimization.
//
// Given
// -----
// - A fresh session.
//
// Expect
// ------
// - `CannotComputeErrors`, not a panic.
fn errors_before_minimize_are_rejected() {
    let mut fit = session(&["x"], |p| p[0] * p[0]);
    assert_eq!(fit.get_errors(), Err(MinimizerError::CannotComputeErrors));
}

#[test]
// Purpose
// -------
// Verify the correlation matrix of a correlated quadratic.
//
// Given
// -----
// - f(x, y) = x² + y² + xy, so H = [[2, 1], [1, 2]] and cov = H⁻¹.
//
// Expect
// ------
// - Unit diagonal, symmetric, off-diagonal ≈ -0.5; printing succeeds.
fn correlated_quadratic_correlation() {
    // Arrange
    let mut fit = session(&["x", "y"], |p| p[0] * p[0] + p[1] * p[1] + p[0] * p[1]);
    fit.set_parameter_value("x", 1.0).unwrap();
    fit.set_parameter_value("y", -2.0).unwrap();

    // Act
    fit.minimize().unwrap();
    let corr = fit.result_store().correlation_matrix().unwrap();

    // Assert
    assert!((corr[[0, 0]] - 1.0).abs() < 1e-9);
    assert!((corr[[1, 1]] - 1.0).abs() < 1e-9);
    assert!((corr[[0, 1]] + 0.5).abs() < 1e-3, "corr = {corr}");
    assert!((corr[[0, 1]] - corr[[1, 0]]).abs() < 1e-12);
    assert!(fit.print_correlation_matrix().is_ok());
    assert!(fit.print_fit_results().is_ok());
}

#[test]
// Purpose
// -------
// Check the derivative-free binding on a bounded two-parameter problem.
//
// Given
// -----
// - f(a, b) = (a - 1)² + (b + 2)², a ∈ [-5, 5], b ∈ [-5, 5].
//
// Expect
// ------
// - best fit ≈ (1, -2) within 1e-3.
fn native_engine_finds_bounded_minimum() {
    // Arrange
    let registry = ParameterRegistry::from_parameters([
        Parameter::new("m.a", 0.0, 0.5).unwrap().with_bounds(Some(-5.0), Some(5.0)).unwrap(),
        Parameter::new("m.b", 0.0, 0.5).unwrap().with_bounds(Some(-5.0), Some(5.0)).unwrap(),
    ])
    .unwrap();
    let objective = Objective::new(2, |p| (p[0] - 1.0).powi(2) + (p[1] + 2.0).powi(2));
    let mut fit = NativeMinimizer::new(objective, registry, MinimizerOptions::default()).unwrap();

    // Act
    let (best_fit, minimum) = fit.minimize().unwrap();

    // Assert
    assert!(minimum < FIT_FAILED);
    assert!((best_fit.get("m.a").unwrap() - 1.0).abs() < 1e-3);
    assert!((best_fit.get("m.b").unwrap() + 2.0).abs() < 1e-3);
}

#[test]
// Purpose
// -------
// Ensure an objective that keeps decreasing is never reported as a best
// fit, whichever binding drives it.
//
// Given
// -----
// - f(x) = x with x unbounded, starting at 0 with step 0.1.
//
// Expect
// ------
// - Both bindings return an empty best fit and `FIT_FAILED`.
// - Errors are unavailable afterwards.
fn unbounded_linear_objective_fails_on_both_bindings() {
    // Arrange
    let registry = || {
        ParameterRegistry::from_parameters([Parameter::new("x", 0.0, 0.1).unwrap()]).unwrap()
    };
    let mut managed =
        ManagedMinimizer::new(Objective::new(1, |p| p[0]), registry(), MinimizerOptions::default()).unwrap();
    let mut native =
        NativeMinimizer::new(Objective::new(1, |p| p[0]), registry(), MinimizerOptions::default()).unwrap();

    // Act
    let managed_result = managed.minimize().unwrap();
    let native_result = native.minimize().unwrap();

    // Assert
    for (best_fit, minimum) in [managed_result, native_result] {
        assert!(best_fit.is_empty());
        assert_eq!(minimum, FIT_FAILED);
    }
    assert!(matches!(managed.get_errors(), Err(MinimizerError::CannotComputeErrors)));
    assert!(matches!(native.get_errors(), Err(MinimizerError::CannotComputeErrors)));
}

#[test]
// Purpose
// -------
// Verify the 3×3 contour of a two-parameter bowl with both parameters
// pinned at every point.
//
// Given
// -----
// - f(x, y) = (x - 1)² + (y - 2)², bounds [-10, 10] on both.
// - contour over x ∈ [-10, 10] and y ∈ [-10, 10] with 3 steps each.
//
// Expect
// ------
// - Shape (3, 3); the smallest cell is (1, 1), i.e. (0, 0), with value 5.
// - Every cell equals f at its grid point.
fn two_dimensional_contour_of_bowl() {
    // Arrange
    let registry = ParameterRegistry::from_parameters([
        Parameter::new("x", 0.0, 1.0).unwrap().with_bounds(Some(-10.0), Some(10.0)).unwrap(),
        Parameter::new("y", 0.0, 1.0).unwrap().with_bounds(Some(-10.0), Some(10.0)).unwrap(),
    ])
    .unwrap();
    let bowl = |p: &[f64]| (p[0] - 1.0).powi(2) + (p[1] - 2.0).powi(2);
    let mut fit = ManagedMinimizer::new(Objective::new(2, bowl), registry, MinimizerOptions::default()).unwrap();
    fit.minimize().unwrap();
    let spec = ContourSpec::new("x", -10.0, 10.0, 3).with_second("y", -10.0, 10.0, 3).with_progress(false);

    // Act
    let result = fit.contour(&spec).unwrap();

    // Assert
    assert_eq!(result.values().dim(), (3, 3));
    assert_eq!(result.argmin(), Some((1, 1)));
    assert_eq!(result.values()[[1, 1]], 5.0);
    let steps_2 = result.steps_2().unwrap();
    for ((i, j), v) in result.values().indexed_iter() {
        assert_eq!(*v, bowl(&[result.steps_1()[i], steps_2[j]]));
    }
    assert!(result.failures().is_empty());
}

#[test]
// Purpose
// -------
// Ensure the zero-free-parameter path reorders arguments by registry
// position, not by the order the contour names them.
//
// Given
// -----
// - f(a, b) = 10a + b with registry order (a, b).
// - contour over b ∈ {1, 2} first and a ∈ {3, 4} second, without a prior fit.
//
// Expect
// ------
// - values[i][j] = 10·a_j + b_i: [[31, 41], [32, 42]].
fn contour_reorders_positional_arguments() {
    // Arrange
    let mut fit = session(&["a", "b"], |p| 10.0 * p[0] + p[1]);
    let spec = ContourSpec::new("b", 1.0, 2.0, 2).with_second("a", 3.0, 4.0, 2).with_progress(false);

    // Act
    let result = fit.contour(&spec).unwrap();

    // Assert
    assert_eq!(result.values()[[0, 0]], 31.0);
    assert_eq!(result.values()[[0, 1]], 41.0);
    assert_eq!(result.values()[[1, 0]], 32.0);
    assert_eq!(result.values()[[1, 1]], 42.0);
}

#[test]
// Purpose
// -------
// Verify logarithmic spacing through the session contour call.
//
// Given
// -----
// - f(a) = a, contour over a ∈ [1, 100] with 3 log steps.
//
// Expect
// ------
// - steps [1, 10, 100], shape (3, 1), no second axis, values = steps.
fn log_spaced_one_dimensional_contour() {
    // Arrange
    let mut fit = session(&["a"], |p| p[0]);
    let spec = ContourSpec::new("a", 1.0, 100.0, 3).with_log(&[true]).with_progress(false);

    // Act
    let result = fit.contour(&spec).unwrap();

    // Assert
    let steps = result.steps_1();
    assert_eq!(steps[0], 1.0);
    assert!((steps[1] - 10.0).abs() < 1e-12);
    assert_eq!(steps[2], 100.0);
    assert!(result.steps_2().is_none());
    assert_eq!(result.values().dim(), (3, 1));
    for i in 0..3 {
        assert_eq!(result.values()[[i, 0]], steps[i]);
    }
}

#[test]
// Purpose
// -------
// Ensure scanning an undeclared parameter fails immediately.
//
// Given
// -----
// - Free parameters x, y; a contour request on z.
//
// Expect
// ------
// - `ParameterIsNotFree` naming "z".
fn contour_on_unknown_parameter_is_rejected() {
    // Arrange
    let mut fit = session(&["x", "y"], |p| p[0] * p[0] + p[1] * p[1]);
    let spec = ContourSpec::new("z", 0.0, 1.0, 3).with_progress(false);

    // Act
    let result = fit.contour(&spec);

    // Assert
    assert!(matches!(result, Err(MinimizerError::ParameterIsNotFree { name }) if name == "z"));
}

#[test]
// Purpose
// -------
// Verify the shape invariant and per-point re-optimization of the
// remaining free parameter.
//
// Given
// -----
// - f = (x - 1)² + (y - 2)² + (z - 3)², fitted first.
// - contour over x with 5 steps in [0, 4] and y with 4 steps in [0, 3].
//
// Expect
// ------
// - Shape (5, 4); cell (i, j) ≈ (x_i - 1)² + (y_j - 2)² (z profiled out).
fn contour_shape_and_profiled_values() {
    // Arrange
    let mut fit = session(&["x", "y", "z"], three_parameter_bowl);
    fit.minimize().unwrap();
    let spec = ContourSpec::new("x", 0.0, 4.0, 5).with_second("y", 0.0, 3.0, 4).with_progress(false);

    // Act
    let result = fit.contour(&spec).unwrap();

    // Assert
    assert_eq!(result.values().dim(), (5, 4));
    let steps_2 = result.steps_2().unwrap();
    for ((i, j), v) in result.values().indexed_iter() {
        let expected = (result.steps_1()[i] - 1.0).powi(2) + (steps_2[j] - 2.0).powi(2);
        assert!((v - expected).abs() < 1e-6, "cell ({i}, {j}) = {v}, expected {expected}");
    }
}

#[test]
// Purpose
// -------
// Ensure pooled execution gives exactly the serial matrix, both on the
// rayon pool and on a pool that completes points in reverse order.
//
// Given
// -----
// - The three-parameter bowl, fitted, and a 4×3 contour over (x, y).
//
// Expect
// ------
// - Serial, rayon and reversing-pool matrices are identical.
fn serial_and_parallel_contours_agree() {
    // Arrange
    let mut fit = session(&["x", "y", "z"], three_parameter_bowl);
    fit.minimize().unwrap();
    let base = ContourSpec::new("x", -1.0, 2.0, 4).with_second("y", 0.0, 4.0, 3).with_progress(false);
    let fast = Duration::from_millis(10);
    let rayon = ParallelOptions::rayon(Some(3)).unwrap().with_poll_interval(fast);
    let reversing = ParallelOptions::new(Arc::new(ReversingPool)).with_poll_interval(fast);

    // Act
    let serial = fit.contour(&base.clone().with_strategy(ExecutionStrategy::Serial)).unwrap();
    let pooled = fit.contour(&base.clone().with_strategy(ExecutionStrategy::Parallel(rayon))).unwrap();
    let reversed = fit.contour(&base.with_strategy(ExecutionStrategy::Parallel(reversing))).unwrap();

    // Assert
    assert_eq!(pooled.values(), serial.values());
    assert_eq!(reversed.values(), serial.values());
}

#[test]
// Purpose
// -------
// Exercise model comparison on summaries built from finished fits.
//
// Given
// -----
// - Two fits of the same "data": a one-parameter and a two-parameter model
//   with equal minima, 50 data points.
//
// Expect
// ------
// - Sorted by BIC, the simpler model ranks first and is named from its
//   parameter path.
fn model_comparison_from_fits() {
    // Arrange
    let mut simple = session(&["src.line.norm"], |p| (p[0] - 1.0).powi(2) + 10.0);
    let mut complex =
        session(&["src.poly.c0", "src.poly.c1"], |p| (p[0] - 1.0).powi(2) + p[1].powi(2) + 10.0);
    let (fit_1, min_1) = simple.minimize().unwrap();
    let (fit_2, min_2) = complex.minimize().unwrap();
    let summaries = [
        AnalysisSummary::Mle(MleSummary::from_best_fit(&fit_2, min_2, 50)),
        AnalysisSummary::Mle(MleSummary::from_best_fit(&fit_1, min_1, 50)),
    ];

    // Act
    let comparison = ModelComparison::new(&summaries).unwrap();
    let ranked = comparison.sorted_by(SortKey::Bic);

    // Assert
    assert_eq!(ranked[0].model, "line");
    assert_eq!(ranked[1].model, "poly");
    assert_eq!(ranked[0].dof, 49);
}
