//! minimizer::session — the fit session seen by the modeling layer.
//!
//! Purpose
//! -------
//! Bundle an objective, a parameter registry, one optimizer engine and the
//! result store into a single session exposing the [`Minimizer`] contract:
//! minimize, read back the best fit, compute asymmetric errors, scan
//! contours and print results.
//!
//! Key behaviors
//! -------------
//! - Construction declares the whole registry to a fresh engine with the
//!   likelihood error definition (`0.5`) and the session tolerance.
//! - [`Minimizer::minimize`] drives the convergence controller. On
//!   exhaustion it logs a warning, clears the store and returns an empty
//!   best fit with [`FIT_FAILED`]. On success it optionally runs HESSE,
//!   stores the snapshot and restores it.
//! - Every operation that depends on current values restores the stored
//!   best fit first, since MINOS and contour setup use the engine.
//! - Tables go to a [`TableSink`] (stdout by default).
//!
//! Invariants & assumptions
//! ------------------------
//! - One session is used from one thread at a time; only contour points
//!   run concurrently, each on its own engine.
//! - Registry order equals declaration order equals objective position.
//!
//! Conventions
//! -----------
//! - Errors before a converged fit are [`MinimizerError::CannotComputeErrors`];
//!   a missing covariance is [`MinimizerError::CannotComputeCovariance`].
//! - A missing prior fit before contours is a warning, not an error.
//!
//! Downstream usage
//! ----------------
//! - Use [`ManagedMinimizer`] for smooth likelihoods and [`NativeMinimizer`]
//!   for derivative-free fits with a function-call budget.
//!
//! Testing notes
//! -------------
//! - Unit tests cover option validation, exhaustion on a scripted engine
//!   and the printed tables. End-to-end fits live in
//!   `tests/integration_fit_pipeline.rs`.
use crate::minimizer::{
    contour::{ContourResult, ContourSpec, ContourWorker, Grid},
    convergence::ConvergenceController,
    display::{ConsoleSink, Table, TableSink, format_asymmetric, format_correlation, format_with_error},
    engine::{
        EngineBlueprint, EngineSettings, ManagedEngine, NativeEngine, OptimizerEngine, declare_registry,
        verify_tolerance,
    },
    errors::{MinResult, MinimizerError},
    execution::{PointJob, ProgressSink, default_progress},
    objective::{Objective, PositionTable},
    parameters::{EngineName, NameMap, ParameterRegistry},
    results::{AsymmetricErrors, BestFit, Covariance, ResultStore},
    types::{CONTOUR_TOLERANCE, DEFAULT_TOLERANCE, DEFAULT_TRIALS, FIT_FAILED, LIKELIHOOD_ERROR_DEF, NATIVE_MAX_CALLS},
};
use std::{fmt, iter, sync::Arc};

/// Session configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimizerOptions {
    /// Fractional tolerance of the EDM criterion.
    pub tolerance: f64,
    /// Engine print level; > 0 logs every pass.
    pub verbosity: u8,
    /// Minimization passes before giving up.
    pub max_trials: usize,
    /// Function-call budget per pass (native engine only).
    pub max_function_calls: usize,
    /// Run HESSE after a converged minimization.
    pub compute_covariance: bool,
}

impl Default for MinimizerOptions {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            verbosity: 0,
            max_trials: DEFAULT_TRIALS,
            max_function_calls: NATIVE_MAX_CALLS,
            compute_covariance: true,
        }
    }
}

impl MinimizerOptions {
    pub fn new(tolerance: f64, verbosity: u8, max_trials: usize, compute_covariance: bool) -> MinResult<Self> {
        let options = Self { tolerance, verbosity, max_trials, compute_covariance, ..Self::default() };
        options.validate()?;
        Ok(options)
    }

    pub fn with_max_function_calls(mut self, calls: usize) -> MinResult<Self> {
        self.max_function_calls = calls;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> MinResult<()> {
        verify_tolerance(self.tolerance)?;
        ConvergenceController::new(self.max_trials)?;
        self.engine_settings().validate()
    }

    fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            error_def: LIKELIHOOD_ERROR_DEF,
            tolerance: self.tolerance,
            print_level: self.verbosity,
            max_function_calls: self.max_function_calls,
        }
    }
}

/// Uniform contract of a fit session.
pub trait Minimizer {
    /// Minimize and return `(best_fit, minimum)`; `(empty, FIT_FAILED)` when
    /// the retry budget is exhausted.
    fn minimize(&mut self) -> MinResult<(BestFit, f64)>;

    /// Best fit of the last converged minimization.
    fn best_fit_parameters(&self) -> Option<&BestFit>;

    /// Objective at the last converged minimum.
    fn function_minimum_value(&self) -> Option<f64>;

    /// Asymmetric `(negative, positive)` errors for every parameter.
    fn get_errors(&mut self) -> MinResult<AsymmetricErrors>;

    /// Profile the objective over a 1-D or 2-D grid.
    fn contour(&mut self, spec: &ContourSpec) -> MinResult<ContourResult>;

    /// Render best-fit values with approximate parabolic errors.
    fn print_fit_results(&mut self) -> MinResult<()>;

    /// Render the correlation matrix of the last fit.
    fn print_correlation_matrix(&mut self) -> MinResult<()>;
}

/// Fit session over any [`OptimizerEngine`].
pub struct EngineMinimizer<E: OptimizerEngine> {
    registry: ParameterRegistry,
    names: NameMap,
    options: MinimizerOptions,
    engine: E,
    store: ResultStore,
    controller: ConvergenceController,
    sink: Box<dyn TableSink>,
}

/// Session on the quasi-Newton engine.
pub type ManagedMinimizer = EngineMinimizer<ManagedEngine>;

/// Session on the simplex engine.
pub type NativeMinimizer = EngineMinimizer<NativeEngine>;

impl<E: OptimizerEngine> EngineMinimizer<E> {
    /// Declare `registry` to a fresh engine over `objective`.
    ///
    /// # Errors
    /// - [`MinimizerError::DimensionMismatch`] if the objective's arity differs
    ///   from the registry length.
    /// - [`MinimizerError::DuplicateParameter`] if two paths share an engine name.
    /// - Option and declaration errors from the engine.
    pub fn new(objective: Objective, registry: ParameterRegistry, options: MinimizerOptions) -> MinResult<Self> {
        options.validate()?;
        if objective.n_dim() != registry.len() {
            return Err(MinimizerError::DimensionMismatch { expected: registry.len(), found: objective.n_dim() });
        }
        let names = NameMap::from_registry(&registry)?;
        let positions = PositionTable::from_names(&names);
        let blueprint = EngineBlueprint::new(objective, positions, options.engine_settings());
        let mut engine = E::from_blueprint(&blueprint)?;
        engine.set_error_def(LIKELIHOOD_ERROR_DEF);
        engine.set_tolerance(options.tolerance)?;
        engine.set_print_level(options.verbosity);
        declare_registry(&mut engine, &registry, &names)?;
        Ok(Self {
            registry,
            names,
            options,
            engine,
            store: ResultStore::new(),
            controller: ConvergenceController::new(options.max_trials)?,
            sink: Box::new(ConsoleSink),
        })
    }

    /// Send tables somewhere other than stdout.
    pub fn with_sink(mut self, sink: Box<dyn TableSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn registry(&self) -> &ParameterRegistry {
        &self.registry
    }

    pub fn options(&self) -> &MinimizerOptions {
        &self.options
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn result_store(&self) -> &ResultStore {
        &self.store
    }

    /// Change a parameter's current value in both the registry and the engine.
    pub fn set_parameter_value(&mut self, path: &str, value: f64) -> MinResult<()> {
        let index = self
            .registry
            .position(path)
            .ok_or_else(|| MinimizerError::UnknownParameter { name: path.to_string() })?;
        self.registry.set_value(path, value)?;
        self.engine.set_value(index, value)
    }

    /// Write the stored best fit back into registry and engine.
    pub fn restore_best_fit(&mut self) -> MinResult<bool> {
        self.store.restore_to_registry(&mut self.registry, &mut self.engine)
    }

    fn covariance_after_hesse(&mut self) -> Option<Covariance> {
        if !self.options.compute_covariance {
            return None;
        }
        match self.engine.hesse() {
            Ok(()) => self.engine.covariance(),
            Err(err) => {
                log::debug!("HESSE failed: {err}");
                None
            }
        }
    }

    fn display_path(&self, name: &EngineName) -> String {
        self.names.path_of(name).map_or_else(|| name.to_string(), str::to_string)
    }
}

impl<E: OptimizerEngine + 'static> Minimizer for EngineMinimizer<E> {
    fn minimize(&mut self) -> MinResult<(BestFit, f64)> {
        let state = self.controller.drive(&mut self.engine)?;
        if !state.is_converged() {
            log::warn!("MIGRAD did not converge in {} trials.", state.passes());
            self.store.mark_failed();
            return Ok((BestFit::new(), FIT_FAILED));
        }
        let best_fit: BestFit = self.registry.paths().zip(self.engine.values()).collect();
        let minimum = self.engine.fval();
        let covariance = self.covariance_after_hesse();
        self.store.store(best_fit.clone(), minimum, covariance);
        self.restore_best_fit()?;
        Ok((best_fit, minimum))
    }

    fn best_fit_parameters(&self) -> Option<&BestFit> {
        self.store.best_fit()
    }

    fn function_minimum_value(&self) -> Option<f64> {
        self.store.minimum()
    }

    fn get_errors(&mut self) -> MinResult<AsymmetricErrors> {
        if !self.store.is_converged() {
            return Err(MinimizerError::CannotComputeErrors);
        }
        self.restore_best_fit()?;
        let paths: Vec<String> = self.registry.paths().map(str::to_string).collect();
        let mut errors = AsymmetricErrors::new();
        for (index, path) in paths.into_iter().enumerate() {
            let pair = self.engine.minos(index)?;
            errors.insert(path, pair);
        }
        self.store.set_errors(errors.clone())?;
        self.restore_best_fit()?;

        let mut table = Table::new(["Name", "Value", "Unit"]);
        for param in self.registry.iter() {
            let (negative, positive) = errors.get(param.path()).copied().unwrap_or((f64::NAN, f64::NAN));
            table.push_row([
                param.path().to_string(),
                format_asymmetric(param.value(), negative, positive),
                param.unit().to_string(),
            ]);
        }
        self.sink.display(&table);
        Ok(errors)
    }

    fn contour(&mut self, spec: &ContourSpec) -> MinResult<ContourResult> {
        let grid = Grid::build(spec)?;
        if !self.restore_best_fit()? {
            log::warn!(
                "No best fit to restore before contours computation. \
                 Perform the fit before running contours to remove this warning."
            );
        }
        let mut blueprint = self.engine.blueprint();
        *blueprint.settings_mut() = EngineSettings {
            error_def: LIKELIHOOD_ERROR_DEF,
            tolerance: CONTOUR_TOLERANCE,
            print_level: 0,
            ..*blueprint.settings()
        };
        let worker = Arc::new(ContourWorker::<E>::new(
            blueprint,
            &self.names,
            &spec.axis_1().name,
            spec.axis_2().map(|axis| axis.name.as_str()),
            self.controller,
        )?);
        let job: PointJob = Arc::new(move |point| worker.evaluate(&point));
        let mut progress: Box<dyn ProgressSink> = if spec.progress() { default_progress() } else { Box::new(()) };
        let outcomes = spec.strategy().execute(grid.points.clone(), job, progress.as_mut())?;
        ContourResult::assemble(grid, outcomes)
    }

    fn print_fit_results(&mut self) -> MinResult<()> {
        self.restore_best_fit()?;
        let covariance = self.store.covariance();
        let mut table = Table::new(["Name", "Value", "Unit"]);
        for param in self.registry.iter() {
            let sigma = self
                .names
                .engine_name(param.path())
                .and_then(|name| covariance.and_then(|c| c.sigma_of(name)))
                .filter(|s| s.is_finite() && *s > 0.0)
                .unwrap_or_else(|| param.delta());
            table.push_row([
                param.path().to_string(),
                format_with_error(param.value(), sigma),
                param.unit().to_string(),
            ]);
        }
        self.sink.display(&table);
        self.sink.note("NOTE: errors on parameters are approximate. Use get_errors().");
        Ok(())
    }

    fn print_correlation_matrix(&mut self) -> MinResult<()> {
        self.restore_best_fit()?;
        let covariance = self.store.covariance().ok_or(MinimizerError::CannotComputeCovariance)?;
        let correlation = covariance.correlation();
        let labels: Vec<String> = covariance.names().iter().map(|n| self.display_path(n)).collect();
        let mut table = Table::new(iter::once(String::new()).chain(labels.iter().cloned()));
        for (i, label) in labels.iter().enumerate() {
            table.push_row(
                iter::once(label.clone()).chain(correlation.row(i).iter().map(|v| format_correlation(*v))),
            );
        }
        self.sink.display(&table);
        Ok(())
    }
}

impl<E: OptimizerEngine + fmt::Debug> fmt::Debug for EngineMinimizer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineMinimizer")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .field("engine", &self.engine)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
