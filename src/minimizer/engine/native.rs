//! Native engine binding: index-addressed variables, simplex passes.
//!
//! The objective is wrapped once in a [`FixedArityAdapter`] that reports its
//! dimension and forwards values by position. Variables must be declared in
//! index order. A pass runs a Nelder–Mead simplex in internal space, seeded
//! at the current point with the declared step sizes, and is capped by the
//! function-call budget from the engine settings.
use crate::minimizer::{
    engine::{
        EngineBlueprint, OptimizerEngine, verify_tolerance,
        adapter::{BudgetedAdapter, CallBudget, Evaluator},
        state::EngineCore,
    },
    errors::{MinResult, MinimizerError},
    objective::FixedArityAdapter,
    parameters::EngineName,
    results::Covariance,
    transforms::Bounds,
    types::{SIMPLEX_SD_TOL, Theta},
};
use argmin::{core::Executor, solver::neldermead::NelderMead};
use std::sync::Arc;

/// Simplex engine addressed by variable index.
#[derive(Debug, Clone)]
pub struct NativeEngine {
    core: EngineCore,
    functor: FixedArityAdapter,
}

impl NativeEngine {
    /// Current values, by index.
    pub fn x(&self) -> &[f64] {
        self.core.values()
    }

    /// Function-call budget per pass.
    pub fn set_max_function_calls(&mut self, calls: usize) -> MinResult<()> {
        if calls == 0 {
            return Err(MinimizerError::InvalidMaxCalls {
                calls,
                reason: "Function-call budget must be positive.",
            });
        }
        self.core.settings_mut().max_function_calls = calls;
        Ok(())
    }

    fn evaluator(&self) -> Evaluator {
        let functor = self.functor.clone();
        Arc::new(move |values: &[f64]| functor.eval(values))
    }

    fn declare(
        &mut self, index: usize, name: &EngineName, value: f64, step: f64, bounds: Bounds,
    ) -> MinResult<()> {
        if index >= self.functor.ndim() {
            return Err(MinimizerError::DimensionMismatch {
                expected: self.functor.ndim(),
                found: index + 1,
            });
        }
        self.core.push(index, name, value, step, bounds)
    }

    /// Initial simplex: the current point plus one vertex per free variable,
    /// displaced by that variable's internal step.
    fn initial_simplex(&self, theta0: &Theta) -> Vec<Theta> {
        let steps = self.core.internal_steps();
        let mut simplex = Vec::with_capacity(theta0.len() + 1);
        simplex.push(theta0.clone());
        for k in 0..theta0.len() {
            let mut vertex = theta0.clone();
            vertex[k] += steps[k];
            simplex.push(vertex);
        }
        simplex
    }
}

impl OptimizerEngine for NativeEngine {
    fn from_blueprint(blueprint: &EngineBlueprint) -> MinResult<Self> {
        Ok(Self {
            core: EngineCore::from_blueprint(blueprint)?,
            functor: FixedArityAdapter::new(blueprint.objective().clone()),
        })
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

    fn run_pass(&mut self) -> MinResult<()> {
        let surface = self.core.surface(self.evaluator());
        let theta0 = self.core.internal_theta();
        if theta0.is_empty() {
            return self.core.refresh(&surface);
        }
        let solver = NelderMead::new(self.initial_simplex(&theta0)).with_sd_tolerance(SIMPLEX_SD_TOL)?;
        let budget = CallBudget::new(self.core.settings().max_function_calls);
        if let Err(err) = Executor::new(BudgetedAdapter::new(&surface, &budget), solver).run() {
            log::debug!("Simplex pass stopped after {} calls: {err}", budget.calls());
        }
        if let Some(best) = budget.take_best() {
            self.core.accept(&surface, &best);
        }
        self.core.refresh(&surface)?;
        if self.core.settings().print_level > 0 {
            log::info!("Simplex pass: fval = {:.6}, edm = {:.3e}", self.core.fval(), self.core.edm());
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
        let surface = self.core.surface(self.evaluator());
        self.core.hesse(&surface)
    }

    fn covariance(&self) -> Option<Covariance> {
        self.core.covariance().cloned()
    }
}
