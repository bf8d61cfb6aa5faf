//! Managed engine binding: name-addressed variables, L-BFGS passes.
//!
//! The objective is bound once per instance: each evaluation lays the current
//! values out by engine name through the [`PositionTable`](crate::minimizer::objective::PositionTable)
//! and calls the objective positionally. A pass runs L-BFGS with a
//! More–Thuente line search in internal space, then recomputes `fval` and the
//! EDM at the accepted point.
use crate::minimizer::{
    engine::{
        EngineBlueprint, OptimizerEngine, verify_tolerance,
        adapter::{ArgminAdapter, Evaluator},
        state::EngineCore,
    },
    errors::{MinResult, MinimizerError},
    parameters::EngineName,
    results::Covariance,
    transforms::Bounds,
    types::{
        DEFAULT_LBFGS_MEM, LBFGS_MAX_ITERS, LBFGS_TOL_COST, LBFGS_TOL_GRAD, LbfgsMoreThuente,
        MoreThuenteLS,
    },
};
use argmin::core::{Executor, Gradient};
use argmin_math::ArgminL2Norm;
use std::sync::Arc;

/// L-BFGS engine addressed by engine name.
#[derive(Debug, Clone)]
pub struct ManagedEngine {
    core: EngineCore,
}

impl ManagedEngine {
    /// Current value of the variable declared as `name`.
    pub fn value_of(&self, name: &EngineName) -> MinResult<f64> {
        self.core
            .index_of(name)
            .map(|i| self.core.values()[i])
            .ok_or_else(|| MinimizerError::UnknownParameter { name: name.to_string() })
    }

    /// Bind the objective: declaration-order values → positional arguments.
    fn evaluator(&self) -> MinResult<Evaluator> {
        let objective = self.core.objective().clone();
        let slots = self
            .core
            .variables()
            .iter()
            .map(|v| self.core.positions().position(&v.name))
            .collect::<MinResult<Vec<usize>>>()?;
        Ok(Arc::new(move |values: &[f64]| {
            let mut args = vec![f64::NAN; objective.n_dim()];
            for (&value, &slot) in values.iter().zip(&slots) {
                if let Some(arg) = args.get_mut(slot) {
                    *arg = value;
                }
            }
            objective.call(&args)
        }))
    }

    fn declare(
        &mut self, index: usize, name: &EngineName, value: f64, step: f64, bounds: Bounds,
    ) -> MinResult<()> {
        self.core.positions().position(name)?;
        self.core.push(index, name, value, step, bounds)
    }
}

/// L-BFGS with More–Thuente line search and tight inner stopping rules.
pub fn build_optimizer_more_thuente() -> MinResult<LbfgsMoreThuente> {
    let solver = LbfgsMoreThuente::new(MoreThuenteLS::new(), DEFAULT_LBFGS_MEM)
        .with_tolerance_grad(LBFGS_TOL_GRAD)?
        .with_tolerance_cost(LBFGS_TOL_COST)?;
    Ok(solver)
}

impl OptimizerEngine for ManagedEngine {
    fn from_blueprint(blueprint: &EngineBlueprint) -> MinResult<Self> {
        Ok(Self { core: EngineCore::from_blueprint(blueprint)? })
    }

    fn blueprint(&self) -> EngineBlueprint {
        self.core.blueprint()
    }

    fn declare_variable(&mut self, index: usize, name: &EngineName, value: f64, step: f64) -> MinResult<()> {
        self.declare(index, name, value, step, Bounds::Free)
    }

    fn declare_lower_limited(
        &mut self, index: usize, name: &EngineName, value: f64, step: f64, lower: f64,
    ) -> MinResult<()> {
        self.declare(index, name, value, step, Bounds::Lower(lower))
    }

    fn declare_upper_limited(
        &mut self, index: usize, name: &EngineName, value: f64, step: f64, upper: f64,
    ) -> MinResult<()> {
        self.declare(index, name, value, step, Bounds::Upper(upper))
    }

    fn declare_limited(
        &mut self, index: usize, name: &EngineName, value: f64, step: f64, lower: f64, upper: f64,
    ) -> MinResult<()> {
        self.declare(index, name, value, step, Bounds::Both(lower, upper))
    }

    fn set_error_def(&mut self, up: f64) {
        self.core.settings_mut().error_def = up;
    }

    fn error_def(&self) -> f64 {
        self.core.settings().error_def
    }

    fn set_tolerance(&mut self, tolerance: f64) -> MinResult<()> {
        verify_tolerance(tolerance)?;
        self.core.settings_mut().tolerance = tolerance;
        Ok(())
    }

    fn tolerance(&self) -> f64 {
        self.core.settings().tolerance
    }

    fn set_print_level(&mut self, level: u8) {
        self.core.settings_mut().print_level = level;
    }

    /// One MIGRAD-like pass.
    ///
    /// Line-search failures ("not a descent direction" close to the minimum)
    /// end the pass early and keep the last accepted point; they are not
    /// errors. The pass is skipped when the starting gradient is already
    /// below the inner tolerance.
    fn run_pass(&mut self) -> MinResult<()> {
        let surface = self.core.surface(self.evaluator()?);
        let theta0 = self.core.internal_theta();
        if theta0.is_empty() {
            return self.core.refresh(&surface);
        }
        let problem = ArgminAdapter::new(&surface);
        let grad0 = problem.gradient(&theta0)?;
        if grad0.l2_norm() > LBFGS_TOL_GRAD {
            let solver = build_optimizer_more_thuente()?;
            #[cfg_attr(not(feature = "obs_slog"), allow(unused_mut))]
            let mut optimizer = Executor::new(problem, solver)
                .configure(|state| state.param(theta0).max_iters(LBFGS_MAX_ITERS));
            #[cfg(feature = "obs_slog")]
            if self.core.settings().print_level > 0 {
                let observer = argmin_observer_slog::SlogLogger::term_noblock();
                optimizer =
                    optimizer.add_observer(observer, argmin::core::observers::ObserverMode::Always);
            }
            match optimizer.run() {
                Ok(result) => {
                    let mut state = result.state().clone();
                    let best_cost = state.get_best_cost();
                    if let Some(best) = state.take_best_param() {
                        if best_cost.is_finite() {
                            self.core.accept(&surface, &best);
                        }
                    }
                }
                Err(err) => log::debug!("L-BFGS pass stopped early: {err}"),
            }
        }
        self.core.refresh(&surface)?;
        if self.core.settings().print_level > 0 {
            log::info!("MIGRAD pass: fval = {:.6}, edm = {:.3e}", self.core.fval(), self.core.edm());
        }
        Ok(())
    }

    fn values(&self) -> Vec<f64> {
        self.core.values().to_vec()
    }

    fn set_value(&mut self, index: usize, value: f64) -> MinResult<()> {
        self.core.set_value(index, value)
    }

    fn fval(&self) -> f64 {
        self.core.fval()
    }

    fn edm(&self) -> f64 {
        self.core.edm()
    }

    fn n_free(&self) -> usize {
        self.core.n_free()
    }

    fn hesse(&mut self) -> MinResult<()> {
        let surface = self.core.surface(self.evaluator()?);
        self.core.hesse(&surface)
    }

    fn covariance(&self) -> Option<Covariance> {
        self.core.covariance().cloned()
    }
}
