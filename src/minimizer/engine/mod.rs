//! minimizer::engine — one contract over interchangeable optimizer engines.
//!
//! Purpose
//! -------
//! Define the capability set every optimizer engine offers
//! ([`OptimizerEngine`]) and the shared algorithm that declares a parameter
//! registry to an engine ([`declare_registry`]). Two bindings implement the
//! contract:
//! - [`ManagedEngine`]: name-addressed, quasi-Newton (L-BFGS) passes.
//! - [`NativeEngine`]: index-addressed through a fixed-arity functor,
//!   derivative-free simplex passes with a function-call budget.
//!
//! Key behaviors
//! -------------
//! - Each parameter is declared with exactly one of four primitives,
//!   chosen from its bounds: unbounded, lower-limited, upper-limited or
//!   two-sided.
//! - One [`OptimizerEngine::run_pass`] call is one warm-started minimization
//!   from the current position; the convergence controller decides how many
//!   passes to run.
//! - An [`EngineBlueprint`] is a thread-safe snapshot (objective, variables,
//!   settings) from which a fresh, independent engine is built. Contour and
//!   profile workers use it to pin variables without touching the session's
//!   engine.
//!
//! Invariants & assumptions
//! ------------------------
//! - Declaration order equals registry order equals the objective's
//!   positional order.
//! - `values()` is in declaration order and always within bounds.
//! - `fval()`/`edm()` describe the current position after the last pass.
//!
//! Conventions
//! -----------
//! - `error_def` is `0.5` for `-ln L`; tolerance feeds only the convergence
//!   test, not the solvers' inner stopping rules.
//! - HESSE, covariance and MINOS have default implementations; an engine
//!   that cannot provide them reports `None` or an error.
//!
//! Downstream usage
//! ----------------
//! - The session creates one engine from a blueprint and declares the
//!   registry with [`declare_registry`].
//! - `ConvergenceController::drive` is the only caller of `run_pass` in
//!   normal operation.
//!
//! Testing notes
//! -------------
//! - Unit tests here use a recording engine to verify the bound-class
//!   dispatch and declaration order.
//! - The bindings have their own minimization tests.
pub mod adapter;
pub(crate) mod state;
pub mod managed;
pub mod minos;
pub mod native;

pub use self::{managed::ManagedEngine, native::NativeEngine};

use crate::minimizer::{
    errors::{MinResult, MinimizerError},
    objective::{Objective, PositionTable},
    parameters::{EngineName, NameMap, ParameterRegistry},
    results::Covariance,
    transforms::Bounds,
    types::{DEFAULT_TOLERANCE, LIKELIHOOD_ERROR_DEF, NATIVE_MAX_CALLS},
};

/// Settings carried by every engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub error_def: f64,
    pub tolerance: f64,
    pub print_level: u8,
    /// Budget honored by the native engine; ignored by the managed one.
    pub max_function_calls: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            error_def: LIKELIHOOD_ERROR_DEF,
            tolerance: DEFAULT_TOLERANCE,
            print_level: 0,
            max_function_calls: NATIVE_MAX_CALLS,
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> MinResult<()> {
        verify_tolerance(self.tolerance)?;
        if !self.error_def.is_finite() || self.error_def <= 0.0 {
            return Err(MinimizerError::InvalidTolerance {
                tol: self.error_def,
                reason: "Error definition must be finite and positive.",
            });
        }
        if self.max_function_calls == 0 {
            return Err(MinimizerError::InvalidMaxCalls {
                calls: 0,
                reason: "Function-call budget must be positive.",
            });
        }
        Ok(())
    }
}

pub(crate) fn verify_tolerance(tol: f64) -> MinResult<()> {
    if !tol.is_finite() {
        return Err(MinimizerError::InvalidTolerance { tol, reason: "Tolerance must be finite." });
    }
    if tol <= 0.0 {
        return Err(MinimizerError::InvalidTolerance { tol, reason: "Tolerance must be positive." });
    }
    Ok(())
}

/// One declared variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub name: EngineName,
    pub value: f64,
    pub step: f64,
    pub bounds: Bounds,
    pub fixed: bool,
}

impl VariableDecl {
    pub fn new(name: EngineName, value: f64, step: f64, bounds: Bounds) -> MinResult<Self> {
        if !value.is_finite() {
            return Err(MinimizerError::InvalidValue {
                name: name.to_string(),
                value,
                reason: "Value must be finite.",
            });
        }
        if !step.is_finite() || step <= 0.0 {
            return Err(MinimizerError::InvalidDelta {
                name: name.to_string(),
                delta: step,
                reason: "Step size must be finite and positive.",
            });
        }
        if let Bounds::Both(lo, hi) = bounds {
            if lo > hi {
                return Err(MinimizerError::InvalidBounds {
                    name: name.to_string(),
                    lower: lo,
                    upper: hi,
                    reason: "Lower bound must not exceed the upper bound.",
                });
            }
        }
        let value = bounds.clamp(value);
        Ok(Self { name, value, step, bounds, fixed: false })
    }
}

/// Thread-safe recipe for a fresh engine.
#[derive(Debug, Clone)]
pub struct EngineBlueprint {
    objective: Objective,
    positions: PositionTable,
    variables: Vec<VariableDecl>,
    settings: EngineSettings,
}

impl EngineBlueprint {
    /// Blueprint without variables; declare them on the built engine.
    pub fn new(objective: Objective, positions: PositionTable, settings: EngineSettings) -> Self {
        Self { objective, positions, variables: Vec::new(), settings }
    }

    pub(crate) fn from_parts(
        objective: Objective, positions: PositionTable, variables: Vec<VariableDecl>,
        settings: EngineSettings,
    ) -> Self {
        Self { objective, positions, variables, settings }
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    pub fn positions(&self) -> &PositionTable {
        &self.positions
    }

    pub fn variables(&self) -> &[VariableDecl] {
        &self.variables
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut EngineSettings {
        &mut self.settings
    }

    pub fn index_of(&self, name: &EngineName) -> Option<usize> {
        self.variables.iter().position(|v| &v.name == name)
    }

    pub fn n_free(&self) -> usize {
        self.variables.iter().filter(|v| !v.fixed).count()
    }

    /// Fix variable `index` at `value`.
    ///
    /// # Errors
    /// [`MinimizerError::ParameterIsNotFree`] if the index is unknown or the
    /// variable is already fixed.
    pub fn pin(&mut self, index: usize, value: f64) -> MinResult<()> {
        match self.variables.get_mut(index) {
            Some(decl) if !decl.fixed => {
                decl.value = value;
                decl.fixed = true;
                Ok(())
            }
            Some(decl) => Err(MinimizerError::ParameterIsNotFree { name: decl.name.to_string() }),
            None => Err(MinimizerError::ParameterIsNotFree { name: format!("#{index}") }),
        }
    }

    /// Current values laid out in the objective's positional order.
    pub fn positional_arguments(&self) -> MinResult<Vec<f64>> {
        self.positions.arrange(
            self.variables.iter().map(|v| (&v.name, v.value)),
            self.objective.n_dim(),
        )
    }
}

/// Capability set of an optimizer engine.
pub trait OptimizerEngine: Sized + Send {
    /// Build an independent engine from a snapshot.
    fn from_blueprint(blueprint: &EngineBlueprint) -> MinResult<Self>;

    /// Snapshot of the current state (values, fixed flags, settings).
    fn blueprint(&self) -> EngineBlueprint;

    // ---- Declaration primitives ----
    fn declare_variable(&mut self, index: usize, name: &EngineName, value: f64, step: f64)
    -> MinResult<()>;
    fn declare_lower_limited(
        &mut self, index: usize, name: &EngineName, value: f64, step: f64, lower: f64,
    ) -> MinResult<()>;
    fn declare_upper_limited(
        &mut self, index: usize, name: &EngineName, value: f64, step: f64, upper: f64,
    ) -> MinResult<()>;
    fn declare_limited(
        &mut self, index: usize, name: &EngineName, value: f64, step: f64, lower: f64, upper: f64,
    ) -> MinResult<()>;

    // ---- Settings ----
    fn set_error_def(&mut self, up: f64);
    fn error_def(&self) -> f64;
    fn set_tolerance(&mut self, tolerance: f64) -> MinResult<()>;
    fn tolerance(&self) -> f64;
    fn set_print_level(&mut self, level: u8);

    // ---- Minimization ----
    /// One warm-started minimization pass from the current position.
    fn run_pass(&mut self) -> MinResult<()>;

    // ---- Read-back ----
    /// Current values in declaration order.
    fn values(&self) -> Vec<f64>;
    fn set_value(&mut self, index: usize, value: f64) -> MinResult<()>;
    fn fval(&self) -> f64;
    fn edm(&self) -> f64;
    fn n_free(&self) -> usize;

    /// Compute the covariance at the current position.
    fn hesse(&mut self) -> MinResult<()> {
        Ok(())
    }

    /// Covariance over the free variables, if available.
    fn covariance(&self) -> Option<Covariance> {
        None
    }

    /// Asymmetric `(negative, positive)` errors of variable `index` from a
    /// likelihood-profile scan.
    fn minos(&mut self, index: usize) -> MinResult<(f64, f64)> {
        minos::profile_errors(self, index)
    }
}

/// Declare every registry parameter to `engine`, in registry order, using
/// the primitive that matches its bound class.
pub fn declare_registry<E: OptimizerEngine>(
    engine: &mut E, registry: &ParameterRegistry, names: &NameMap,
) -> MinResult<()> {
    for (index, param) in registry.iter().enumerate() {
        let name = names
            .engine_name(param.path())
            .ok_or_else(|| MinimizerError::UnknownParameter { name: param.path().to_string() })?;
        let (value, step) = (param.value(), param.delta());
        match param.bounds() {
            Bounds::Free => engine.declare_variable(index, name, value, step)?,
            Bounds::Lower(lo) => engine.declare_lower_limited(index, name, value, step, lo)?,
            Bounds::Upper(hi) => engine.declare_upper_limited(index, name, value, step, hi)?,
            Bounds::Both(lo, hi) => engine.declare_limited(index, name, value, step, lo, hi)?,
        }
    }
    Ok(())
}
