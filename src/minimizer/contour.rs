//! minimizer::contour — profile likelihood over a 1-D or 2-D grid.
//!
//! Purpose
//! -------
//! Scan one or two free parameters over a grid and, at every grid point,
//! minimize `-ln L` over all remaining free parameters. The result is a
//! profile (1-D) or a profile surface (2-D) used for confidence regions.
//!
//! Key behaviors
//! -------------
//! - Axes are linear or logarithmic ([`AxisSpec`]); logarithmic axes need
//!   strictly positive bounds. With one axis the second axis is the single
//!   placeholder value `NaN`.
//! - Points are the Cartesian product in row-major order: the point for
//!   `(i, j)` has index `i · n₂ + j`.
//! - Each point is evaluated by [`ContourWorker::evaluate`] on a fresh
//!   engine built from a blueprint with the scanned parameters pinned. When
//!   nothing is left free the objective is called directly, with arguments
//!   laid out by position.
//! - A point whose minimization fails or does not converge gets
//!   `FIT_FAILED`; the cause is kept in [`ContourResult::failures`].
//!
//! Invariants & assumptions
//! ------------------------
//! - `values` has shape `(n₁, n₂)`, or `(n₁, 1)` for a 1-D scan.
//! - Evaluation order never affects placement (see `execution`).
//! - Scanned parameters must be free parameters of the session.
//!
//! Downstream usage
//! ----------------
//! - `Minimizer::contour` validates names, restores the best fit, builds the
//!   worker and hands the grid to the chosen execution strategy.
//!
//! Testing notes
//! -------------
//! - Unit tests cover the axis builders, grid ordering, worker behavior on
//!   pinned and zero-free blueprints, and result assembly.
use crate::minimizer::{
    convergence::{ConvergenceController, ConvergenceState},
    engine::{EngineBlueprint, OptimizerEngine},
    errors::{MinResult, MinimizerError},
    execution::ExecutionStrategy,
    parameters::NameMap,
    types::FIT_FAILED,
};
use ndarray::{Array1, Array2};
use std::marker::PhantomData;

/// One scanned axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisSpec {
    pub name: String,
    pub minimum: f64,
    pub maximum: f64,
    pub n_steps: usize,
}

impl AxisSpec {
    pub fn new(name: impl Into<String>, minimum: f64, maximum: f64, n_steps: usize) -> Self {
        Self { name: name.into(), minimum, maximum, n_steps }
    }

    /// Grid values along this axis.
    pub fn steps(&self, log: bool) -> MinResult<Array1<f64>> {
        let invalid = |reason| MinimizerError::InvalidContourRange { name: self.name.clone(), reason };
        if self.n_steps == 0 {
            return Err(invalid("At least one step is required."));
        }
        if !self.minimum.is_finite() || !self.maximum.is_finite() {
            return Err(invalid("Bounds must be finite."));
        }
        if log {
            if self.minimum <= 0.0 || self.maximum <= 0.0 {
                return Err(invalid("Logarithmic steps need strictly positive bounds."));
            }
            Ok(logspace(self.minimum, self.maximum, self.n_steps))
        } else {
            Ok(linspace(self.minimum, self.maximum, self.n_steps))
        }
    }
}

/// `n` evenly spaced values from `start` to `stop` inclusive.
pub fn linspace(start: f64, stop: f64, n: usize) -> Array1<f64> {
    if n == 1 {
        return Array1::from_elem(1, start);
    }
    let span = stop - start;
    let last = (n - 1) as f64;
    Array1::from_shape_fn(n, |k| if k + 1 == n { stop } else { start + span * k as f64 / last })
}

/// `n` values evenly spaced in `log10` from `start` to `stop` inclusive.
pub fn logspace(start: f64, stop: f64, n: usize) -> Array1<f64> {
    let mut steps = linspace(start.log10(), stop.log10(), n).mapv(|e| 10f64.powf(e));
    steps[0] = start;
    if n > 1 {
        steps[n - 1] = stop;
    }
    steps
}

/// Full contour request.
#[derive(Debug, Clone)]
pub struct ContourSpec {
    axis_1: AxisSpec,
    axis_2: Option<AxisSpec>,
    log: Option<Vec<bool>>,
    strategy: ExecutionStrategy,
    progress: bool,
}

impl ContourSpec {
    /// One-dimensional scan of `name` over `[minimum, maximum]`.
    pub fn new(name: impl Into<String>, minimum: f64, maximum: f64, n_steps: usize) -> Self {
        Self {
            axis_1: AxisSpec::new(name, minimum, maximum, n_steps),
            axis_2: None,
            log: None,
            strategy: ExecutionStrategy::Serial,
            progress: true,
        }
    }

    /// Add the second scanned parameter.
    pub fn with_second(mut self, name: impl Into<String>, minimum: f64, maximum: f64, n_steps: usize) -> Self {
        self.axis_2 = Some(AxisSpec::new(name, minimum, maximum, n_steps));
        self
    }

    /// One flag per scanned dimension; checked when the grid is built.
    pub fn with_log(mut self, flags: &[bool]) -> Self {
        self.log = Some(flags.to_vec());
        self
    }

    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn axis_1(&self) -> &AxisSpec {
        &self.axis_1
    }

    pub fn axis_2(&self) -> Option<&AxisSpec> {
        self.axis_2.as_ref()
    }

    pub fn strategy(&self) -> &ExecutionStrategy {
        &self.strategy
    }

    pub fn progress(&self) -> bool {
        self.progress
    }

    pub fn dimensions(&self) -> usize {
        1 + usize::from(self.axis_2.is_some())
    }

    /// Resolved log flags, one per dimension.
    pub fn log_flags(&self) -> MinResult<Vec<bool>> {
        let dims = self.dimensions();
        match &self.log {
            None => Ok(vec![false; dims]),
            Some(flags) if flags.len() == dims => Ok(flags.clone()),
            Some(flags) => Err(MinimizerError::InvalidLogFlags { expected: dims, found: flags.len() }),
        }
    }
}

/// One grid point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    pub index: usize,
    pub value_1: f64,
    /// `NaN` for a 1-D scan.
    pub value_2: f64,
}

/// Cartesian grid of a contour request.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub steps_1: Array1<f64>,
    pub steps_2: Option<Array1<f64>>,
    pub points: Vec<GridPoint>,
}

impl Grid {
    pub fn build(spec: &ContourSpec) -> MinResult<Self> {
        let log = spec.log_flags()?;
        let steps_1 = spec.axis_1.steps(log[0])?;
        let steps_2 = match &spec.axis_2 {
            Some(axis) => Some(axis.steps(log[1])?),
            None => None,
        };
        let second: Vec<f64> = match &steps_2 {
            Some(s) => s.to_vec(),
            None => vec![f64::NAN],
        };
        let mut points = Vec::with_capacity(steps_1.len() * second.len());
        for &value_1 in steps_1.iter() {
            for &value_2 in &second {
                points.push(GridPoint { index: points.len(), value_1, value_2 });
            }
        }
        Ok(Self { steps_1, steps_2, points })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.steps_1.len(), self.steps_2.as_ref().map_or(1, |s| s.len()))
    }
}

/// Why a grid point has no profile value.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureCause {
    NotConverged { passes: usize },
    Engine(String),
}

/// Outcome of one grid point.
#[derive(Debug, Clone, PartialEq)]
pub enum PointOutcome {
    Value(f64),
    Failed(FailureCause),
}

impl PointOutcome {
    /// Profile value, or [`FIT_FAILED`] for a failed point.
    pub fn value(&self) -> f64 {
        match self {
            PointOutcome::Value(v) => *v,
            PointOutcome::Failed(_) => FIT_FAILED,
        }
    }
}

/// Evaluates grid points on fresh engines built from a blueprint.
#[derive(Debug, Clone)]
pub struct ContourWorker<E> {
    blueprint: EngineBlueprint,
    index_1: usize,
    index_2: Option<usize>,
    controller: ConvergenceController,
    _engine: PhantomData<fn() -> E>,
}

impl<E: OptimizerEngine> ContourWorker<E> {
    /// Resolve the scanned parameter paths against the blueprint.
    ///
    /// # Errors
    /// - [`MinimizerError::ParameterIsNotFree`] if a path is unknown or its
    ///   variable is already fixed.
    /// - [`MinimizerError::InvalidContourRange`] if both axes scan the same
    ///   parameter.
    pub fn new(
        blueprint: EngineBlueprint, names: &NameMap, param_1: &str, param_2: Option<&str>,
        controller: ConvergenceController,
    ) -> MinResult<Self> {
        let index_1 = free_index(&blueprint, names, param_1)?;
        let index_2 = match param_2 {
            Some(p) if p == param_1 => {
                return Err(MinimizerError::InvalidContourRange {
                    name: p.to_string(),
                    reason: "Both axes scan the same parameter.",
                });
            }
            Some(p) => Some(free_index(&blueprint, names, p)?),
            None => None,
        };
        Ok(Self { blueprint, index_1, index_2, controller, _engine: PhantomData })
    }

    /// Profile value at `point`.
    pub fn evaluate(&self, point: &GridPoint) -> PointOutcome {
        match self.try_evaluate(point) {
            Ok(outcome) => outcome,
            Err(err) => PointOutcome::Failed(FailureCause::Engine(err.to_string())),
        }
    }

    fn try_evaluate(&self, point: &GridPoint) -> MinResult<PointOutcome> {
        let mut blueprint = self.blueprint.clone();
        blueprint.pin(self.index_1, point.value_1)?;
        if let Some(index_2) = self.index_2 {
            blueprint.pin(index_2, point.value_2)?;
        }
        if blueprint.n_free() == 0 {
            let args = blueprint.positional_arguments()?;
            let value = blueprint.objective().call(&args)?;
            if !value.is_finite() {
                return Err(MinimizerError::NonFiniteObjective { value });
            }
            return Ok(PointOutcome::Value(value));
        }
        let mut engine = E::from_blueprint(&blueprint)?;
        Ok(match self.controller.drive(&mut engine)? {
            ConvergenceState::Converged { .. } => PointOutcome::Value(engine.fval()),
            ConvergenceState::Exhausted { passes } => {
                PointOutcome::Failed(FailureCause::NotConverged { passes })
            }
        })
    }
}

fn free_index(blueprint: &EngineBlueprint, names: &NameMap, path: &str) -> MinResult<usize> {
    let not_free = || MinimizerError::ParameterIsNotFree { name: path.to_string() };
    let name = names.engine_name(path).ok_or_else(not_free)?;
    let index = blueprint.index_of(name).ok_or_else(not_free)?;
    if blueprint.variables()[index].fixed {
        return Err(not_free());
    }
    Ok(index)
}

/// Assembled profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourResult {
    steps_1: Array1<f64>,
    steps_2: Option<Array1<f64>>,
    values: Array2<f64>,
    failures: Vec<(usize, FailureCause)>,
}

impl ContourResult {
    /// Place outcomes (in grid order) into the `(n₁, n₂)` matrix.
    pub fn assemble(grid: Grid, outcomes: Vec<PointOutcome>) -> MinResult<Self> {
        let shape = grid.shape();
        if outcomes.len() != shape.0 * shape.1 {
            return Err(MinimizerError::DimensionMismatch {
                expected: shape.0 * shape.1,
                found: outcomes.len(),
            });
        }
        let mut failures = Vec::new();
        let mut flat = Vec::with_capacity(outcomes.len());
        for (k, outcome) in outcomes.into_iter().enumerate() {
            flat.push(outcome.value());
            if let PointOutcome::Failed(cause) = outcome {
                failures.push((k, cause));
            }
        }
        let found = flat.len();
        let values = Array2::from_shape_vec(shape, flat)
            .map_err(|_| MinimizerError::DimensionMismatch { expected: shape.0 * shape.1, found })?;
        if !failures.is_empty() {
            log::warn!("{} of {} contour points failed and were set to FIT_FAILED", failures.len(), values.len());
        }
        Ok(Self { steps_1: grid.steps_1, steps_2: grid.steps_2, values, failures })
    }

    pub fn steps_1(&self) -> &Array1<f64> {
        &self.steps_1
    }

    pub fn steps_2(&self) -> Option<&Array1<f64>> {
        self.steps_2.as_ref()
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// `(flat index, cause)` for every failed point.
    pub fn failures(&self) -> &[(usize, FailureCause)] {
        &self.failures
    }

    /// Grid cell `(i, j)` of the smallest profile value.
    pub fn argmin(&self) -> Option<(usize, usize)> {
        self.values
            .indexed_iter()
            .filter(|(_, v)| v.is_finite())
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(ij, _)| ij)
    }
}
