//! MINOS-style asymmetric errors from the likelihood profile.
//!
//! For variable `i` at the best fit `x̂` with minimum `f_min`, the errors are
//! the distances to the two points where the profile
//! `p(x) = min over the other variables of f(.., xᵢ = x, ..)` crosses
//! `f_min + up`. Each profile value is a full controller-driven minimization
//! on a fresh engine built from the blueprint with `xᵢ` pinned, so the
//! calling engine is never disturbed.
//!
//! The crossing is bracketed by stepping outward from `x̂` in multiples of
//! the parabolic error (or the declared step when no covariance exists),
//! then refined with an Illinois-modified regula falsi. When a bound is
//! reached before the crossing, the distance to the bound is returned and a
//! warning is logged.
use crate::minimizer::{
    convergence::{ConvergenceController, ConvergenceState},
    engine::{EngineBlueprint, OptimizerEngine},
    errors::{MinResult, MinimizerError},
    types::DEFAULT_TRIALS,
};
use std::marker::PhantomData;

const MAX_BRACKET_STEPS: usize = 40;
const MAX_REFINE_STEPS: usize = 60;
/// Crossing accepted when `|p(x) - f_min - up| < CROSSING_TOL · up`.
const CROSSING_TOL: f64 = 1e-3;

/// `(negative, positive)` profile errors of variable `index`.
///
/// # Errors
/// - [`MinimizerError::ParameterIsNotFree`] if `index` is unknown or fixed.
/// - [`MinimizerError::MinosFailed`] if the engine holds no valid minimum, a
///   profile minimization does not converge, or no crossing is found.
pub fn profile_errors<E: OptimizerEngine>(engine: &E, index: usize) -> MinResult<(f64, f64)> {
    let blueprint = engine.blueprint();
    let decl = match blueprint.variables().get(index) {
        Some(decl) if !decl.fixed => decl.clone(),
        Some(decl) => return Err(MinimizerError::ParameterIsNotFree { name: decl.name.to_string() }),
        None => return Err(MinimizerError::ParameterIsNotFree { name: format!("#{index}") }),
    };
    let fmin = engine.fval();
    if !fmin.is_finite() {
        return Err(MinimizerError::MinosFailed {
            name: decl.name.to_string(),
            reason: "no valid minimum to start from".to_string(),
        });
    }
    let scale = engine
        .covariance()
        .and_then(|c| c.sigma_of(&decl.name))
        .filter(|s| s.is_finite() && *s > 0.0)
        .unwrap_or(decl.step);
    let scan = ProfileScan::<E> {
        blueprint,
        index,
        name: decl.name.to_string(),
        best: decl.value,
        fmin,
        up: engine.error_def(),
        controller: ConvergenceController::new(DEFAULT_TRIALS)?,
        _engine: PhantomData,
    };
    let lower = scan.crossing(-1.0, scale, decl.bounds.lower())?;
    let upper = scan.crossing(1.0, scale, decl.bounds.upper())?;
    Ok((-lower, upper))
}

struct ProfileScan<E> {
    blueprint: EngineBlueprint,
    index: usize,
    name: String,
    best: f64,
    fmin: f64,
    up: f64,
    controller: ConvergenceController,
    _engine: PhantomData<fn() -> E>,
}

impl<E: OptimizerEngine> ProfileScan<E> {
    /// `p(x) - f_min - up`.
    fn excess(&self, x: f64) -> MinResult<f64> {
        let mut blueprint = self.blueprint.clone();
        blueprint.pin(self.index, x)?;
        let mut engine = E::from_blueprint(&blueprint)?;
        match self.controller.drive(&mut engine)? {
            ConvergenceState::Converged { .. } => Ok(engine.fval() - self.fmin - self.up),
            ConvergenceState::Exhausted { passes } => Err(self.failed(format!(
                "profile minimization at {x} did not converge in {passes} trials"
            ))),
        }
    }

    /// Positive distance from `best` to the crossing in `direction`.
    fn crossing(&self, direction: f64, scale: f64, limit: Option<f64>) -> MinResult<f64> {
        let tol = CROSSING_TOL * self.up;
        let (mut inner, mut g_inner) = (0.0, -self.up);
        let mut outer = scale;
        for _ in 0..MAX_BRACKET_STEPS {
            if let Some(lim) = limit {
                let x = self.best + direction * outer;
                if (x - lim) * direction >= 0.0 {
                    let d_lim = (lim - self.best).abs();
                    let g_lim = self.excess(lim)?;
                    if g_lim < 0.0 {
                        log::warn!(
                            "MINOS for {} reached the parameter limit {lim} before the profile \
                             crossed the error level; reporting the distance to the limit.",
                            self.name
                        );
                        return Ok(d_lim);
                    }
                    return self.refine(direction, (inner, g_inner), (d_lim, g_lim));
                }
            }
            let g = self.excess(self.best + direction * outer)?;
            if g.abs() < tol {
                return Ok(outer);
            }
            if g > 0.0 {
                return self.refine(direction, (inner, g_inner), (outer, g));
            }
            inner = outer;
            g_inner = g;
            outer *= 2.0;
        }
        Err(self.failed(format!("no crossing found within {MAX_BRACKET_STEPS} doublings of {scale}")))
    }

    /// Illinois regula falsi on a bracket `g(a) < 0 <= g(b)`.
    fn refine(&self, direction: f64, (mut a, mut ga): (f64, f64), (mut b, mut gb): (f64, f64)) -> MinResult<f64> {
        let tol = CROSSING_TOL * self.up;
        let mut side = 0i8;
        for _ in 0..MAX_REFINE_STEPS {
            let c = if gb != ga { (a * gb - b * ga) / (gb - ga) } else { 0.5 * (a + b) };
            let gc = self.excess(self.best + direction * c)?;
            if gc.abs() < tol || (b - a).abs() <= 1e-12 * (1.0 + c.abs()) {
                return Ok(c);
            }
            if gc < 0.0 {
                a = c;
                ga = gc;
                if side == -1 {
                    gb *= 0.5;
                }
                side = -1;
            } else {
                b = c;
                gb = gc;
                if side == 1 {
                    ga *= 0.5;
                }
                side = 1;
            }
        }
        log::debug!("MINOS refinement for {} hit the iteration cap", self.name);
        Ok(0.5 * (a + b))
    }

    fn failed(&self, reason: String) -> MinimizerError {
        MinimizerError::MinosFailed { name: self.name.clone(), reason }
    }
}
