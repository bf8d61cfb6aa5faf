//! Adapter that exposes an engine's cost surface as an `argmin` problem.
//!
//! The surface maps an internal vector of free variables to the external
//! argument vector (fixed variables keep their pinned values), calls the
//! bound evaluator and rejects non-finite results. The gradient is always a
//! finite difference of the cost; the user objective carries no analytic
//! gradient.
//!
//! [`BudgetedAdapter`] is the cost-only variant used by the simplex engine:
//! every call is charged to a [`CallBudget`], which also remembers the best
//! point seen so a pass cut short by the budget still yields a position.
use std::cell::{Cell, RefCell};

use crate::minimizer::{
    errors::{MinResult, MinimizerError},
    numerics::validate_grad,
    transforms::{Bounds, to_external},
    types::{Cost, Grad, Theta},
};
use argmin::core::{CostFunction, Error, Gradient};
use finitediff::FiniteDiff;
use std::sync::Arc;

/// Evaluator bound once per engine instance: external values in declaration
/// order → objective value.
pub type Evaluator = Arc<dyn Fn(&[f64]) -> MinResult<f64> + Send + Sync>;

/// Snapshot of an engine's variables seen from internal space.
#[derive(Clone)]
pub struct CostSurface {
    evaluator: Evaluator,
    base: Vec<f64>,
    free: Vec<usize>,
    bounds: Vec<Bounds>,
}

impl CostSurface {
    pub fn new(evaluator: Evaluator, base: Vec<f64>, free: Vec<usize>, bounds: Vec<Bounds>) -> Self {
        Self { evaluator, base, free, bounds }
    }

    pub fn dim(&self) -> usize {
        self.free.len()
    }

    /// External values (declaration order) for an internal point.
    pub fn external(&self, theta: &Theta) -> Vec<f64> {
        let mut values = self.base.clone();
        for (k, &i) in self.free.iter().enumerate() {
            values[i] = to_external(self.bounds[k], theta[k]);
        }
        values
    }

    /// Objective value at an internal point.
    ///
    /// # Errors
    /// - [`MinimizerError::NonFiniteObjective`] for NaN or infinite values.
    /// - Any error raised by the evaluator (arity mismatch).
    pub fn value(&self, theta: &Theta) -> MinResult<f64> {
        let value = (self.evaluator)(&self.external(theta))?;
        if !value.is_finite() {
            return Err(MinimizerError::NonFiniteObjective { value });
        }
        Ok(value)
    }

    /// Objective value, mapping failures to `NaN` for derivative probes.
    pub fn value_or_nan(&self, theta: &Theta) -> f64 {
        self.value(theta).unwrap_or(f64::NAN)
    }
}

/// Bridges a [`CostSurface`] to `argmin`'s `CostFunction` and `Gradient`.
#[derive(Clone)]
pub struct ArgminAdapter<'a> {
    surface: &'a CostSurface,
}

impl<'a> ArgminAdapter<'a> {
    pub fn new(surface: &'a CostSurface) -> Self {
        Self { surface }
    }
}

impl<'a> CostFunction for ArgminAdapter<'a> {
    type Param = Theta;
    type Output = Cost;

    fn cost(&self, theta: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.surface.value(theta)?)
    }
}

impl<'a> Gradient for ArgminAdapter<'a> {
    type Param = Theta;
    type Gradient = Grad;

    /// Central differences first. If a probe failed (captured in
    /// `closure_err`) or the estimate is not finite, retry with forward
    /// differences and surface the captured error if that fails too.
    fn gradient(&self, theta: &Self::Param) -> Result<Self::Gradient, Error> {
        let dim = theta.len();
        let closure_err: RefCell<Option<Error>> = RefCell::new(None);
        let cost_func = |theta: &Theta| -> f64 {
            match self.cost(theta) {
                Ok(val) => val,
                Err(e) => {
                    let mut slot = closure_err.borrow_mut();
                    if slot.is_none() {
                        *slot = Some(e);
                    }
                    f64::NAN
                }
            }
        };
        let fd_grad = theta.central_diff(&cost_func);
        if closure_err.borrow().is_none() && validate_grad(&fd_grad, dim).is_ok() {
            return Ok(fd_grad);
        }
        run_fd_diff(theta, &cost_func, &closure_err)
    }
}

/// Function-call budget for one pass, plus the best point it paid for.
#[derive(Debug)]
pub struct CallBudget {
    limit: usize,
    calls: Cell<usize>,
    best: RefCell<Option<(Cost, Theta)>>,
}

impl CallBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit, calls: Cell::new(0), best: RefCell::new(None) }
    }

    /// Objective calls charged so far.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn is_exhausted(&self) -> bool {
        self.calls.get() >= self.limit
    }

    /// Lowest-cost point evaluated, if any evaluation succeeded.
    pub fn take_best(&self) -> Option<Theta> {
        self.best.borrow_mut().take().map(|(_, theta)| theta)
    }

    fn charge(&self) -> MinResult<()> {
        if self.is_exhausted() {
            return Err(MinimizerError::CallLimitReached { calls: self.limit });
        }
        self.calls.set(self.calls.get() + 1);
        Ok(())
    }

    fn record(&self, theta: &Theta, cost: Cost) {
        let mut best = self.best.borrow_mut();
        let improves = match best.as_ref() {
            Some((current, _)) => cost < *current,
            None => true,
        };
        if improves {
            *best = Some((cost, theta.clone()));
        }
    }
}

/// Cost-only `argmin` adapter that stops with
/// [`MinimizerError::CallLimitReached`] once its budget is spent.
pub struct BudgetedAdapter<'a> {
    surface: &'a CostSurface,
    budget: &'a CallBudget,
}

impl<'a> BudgetedAdapter<'a> {
    pub fn new(surface: &'a CostSurface, budget: &'a CallBudget) -> Self {
        Self { surface, budget }
    }
}

impl<'a> CostFunction for BudgetedAdapter<'a> {
    type Param = Theta;
    type Output = Cost;

    fn cost(&self, theta: &Self::Param) -> Result<Self::Output, Error> {
        self.budget.charge()?;
        let value = self.surface.value(theta)?;
        self.budget.record(theta, value);
        Ok(value)
    }
}

/// Forward-difference gradient of `func` with error capture.
fn run_fd_diff<G: Fn(&Theta) -> f64>(
    theta: &Theta, func: &G, closure_err: &RefCell<Option<Error>>,
) -> Result<Grad, Error> {
    closure_err.replace(None);
    let fd_grad = theta.forward_diff(func);
    if let Some(err) = closure_err.take() {
        return Err(err);
    }
    validate_grad(&fd_grad, theta.len())?;
    Ok(fd_grad)
}
