//! minimizer::convergence — retry policy around engine passes.
//!
//! Purpose
//! -------
//! Decide when a minimization is done. One engine pass may stop short of the
//! minimum (line-search failure, simplex collapse, budget); re-running from
//! the last point usually finishes the job. The controller runs passes until
//! the EDM criterion holds or the retry budget is spent.
//!
//! Key behaviors
//! -------------
//! - [`migrad_has_converged`] is `edm <= EDM_FACTOR · tolerance · LIKELIHOOD_ERROR_DEF`.
//! - [`ConvergenceController::drive`] performs at most `trials` passes and
//!   stops at the first converged one.
//!
//! Invariants & assumptions
//! ------------------------
//! - Exhaustion is a state, not an error. Only engine errors propagate.
//!
//! Downstream usage
//! ----------------
//! - The session maps `Exhausted` to the `FIT_FAILED` sentinel.
//! - Contour and profile workers map `Exhausted` to a failed point.
//!
//! Testing notes
//! -------------
//! - Unit tests drive a scripted engine and count passes.
use crate::minimizer::{
    engine::OptimizerEngine,
    errors::{MinResult, MinimizerError},
    types::{EDM_FACTOR, LIKELIHOOD_ERROR_DEF},
};

/// Terminal state of a controller run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceState {
    Converged { passes: usize },
    Exhausted { passes: usize },
}

impl ConvergenceState {
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceState::Converged { .. })
    }

    pub fn passes(&self) -> usize {
        match *self {
            ConvergenceState::Converged { passes } | ConvergenceState::Exhausted { passes } => passes,
        }
    }
}

/// EDM criterion for a `-ln L` objective.
pub fn migrad_has_converged(edm: f64, tolerance: f64) -> bool {
    edm.is_finite() && edm <= EDM_FACTOR * tolerance * LIKELIHOOD_ERROR_DEF
}

/// Runs engine passes until convergence or until the budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergenceController {
    trials: usize,
}

impl ConvergenceController {
    pub fn new(trials: usize) -> MinResult<Self> {
        if trials == 0 {
            return Err(MinimizerError::InvalidTrials {
                trials,
                reason: "At least one minimization pass is required.",
            });
        }
        Ok(Self { trials })
    }

    pub fn trials(&self) -> usize {
        self.trials
    }

    /// Run passes on `engine`, stopping at the first converged one.
    ///
    /// # Errors
    /// Propagates any error raised by [`OptimizerEngine::run_pass`].
    pub fn drive<E: OptimizerEngine>(&self, engine: &mut E) -> MinResult<ConvergenceState> {
        for pass in 1..=self.trials {
            engine.run_pass()?;
            if migrad_has_converged(engine.edm(), engine.tolerance()) {
                return Ok(ConvergenceState::Converged { passes: pass });
            }
            log::debug!("Pass {pass}/{}: edm = {:.3e}, retrying", self.trials, engine.edm());
        }
        Ok(ConvergenceState::Exhausted { passes: self.trials })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minimizer::{engine::test_support::ScriptedEngine, types::DEFAULT_TRIALS};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - The EDM threshold.
    // - Early stop on convergence and exhaustion after the full budget.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Verify the threshold `0.002 · tol · 0.5`.
    //
    // Given
    // -----
    // - tolerance 0.1, so the threshold is 1e-4.
    //
    // Expect
    // ------
    // - 1e-4 converges, 1.1e-4 and NaN do not.
    fn threshold_is_scaled_by_tolerance_and_error_def() {
        assert!(migrad_has_converged(1e-4, 0.1));
        assert!(!migrad_has_converged(1.1e-4, 0.1));
        assert!(!migrad_has_converged(f64::NAN, 0.1));
    }

    #[test]
    // Purpose
    // -------
    // Ensure the controller stops at the first converged pass.
    //
    // Given
    // -----
    // - An engine whose EDM is 1.0, 1.0 then 0.0.
    //
    // Expect
    // ------
    // - `Converged { passes: 3 }` after exactly three passes.
    fn drive_stops_at_first_converged_pass() {
        // Arrange
        let mut engine = ScriptedEngine::with_script(vec![1.0, 1.0, 0.0]);
        let controller = ConvergenceController::new(DEFAULT_TRIALS).unwrap();

        // Act
        let state = controller.drive(&mut engine).unwrap();

        // Assert
        assert_eq!(state, ConvergenceState::Converged { passes: 3 });
        assert_eq!(engine.passes, 3);
    }

    #[test]
    // Purpose
    // -------
    // Verify exhaustion after exactly the configured number of passes.
    //
    // Given
    // -----
    // - An engine that never reaches the threshold.
    //
    // Expect
    // ------
    // - `Exhausted { passes: 10 }` and 10 passes performed.
    fn drive_exhausts_after_ten_passes() {
        // Arrange
        let mut engine = ScriptedEngine::with_script(vec![1.0]);
        let controller = ConvergenceController::new(DEFAULT_TRIALS).unwrap();

        // Act
        let state = controller.drive(&mut engine).unwrap();

        // Assert
        assert_eq!(state, ConvergenceState::Exhausted { passes: 10 });
        assert_eq!(engine.passes, 10);
    }

    #[test]
    // Purpose
    // -------
    // Reject a zero retry budget.
    //
    // Given
    // -----
    // - trials = 0.
    //
    // Expect
    // ------
    // - `InvalidTrials`.
    fn new_rejects_zero_trials() {
        assert!(matches!(ConvergenceController::new(0), Err(MinimizerError::InvalidTrials { .. })));
    }
}
