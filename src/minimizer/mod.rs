//! minimizer — likelihood minimization, errors and profile contours.
//!
//! Purpose
//! -------
//! Provide one fit-session contract over interchangeable optimizer engines:
//! declare a parameter registry, minimize a negative log-likelihood with a
//! retry policy, extract best-fit values, covariance and asymmetric errors,
//! and scan one or two parameters over a grid with the other parameters
//! re-optimized at every point.
//!
//! Key behaviors
//! -------------
//! - `session`: the [`Minimizer`](session::Minimizer) trait and
//!   [`EngineMinimizer`](session::EngineMinimizer), generic over the engine.
//! - `engine`: the [`OptimizerEngine`](engine::OptimizerEngine) capability
//!   set with a managed (L-BFGS) and a native (Nelder–Mead) binding, HESSE
//!   and MINOS-style profile errors.
//! - `convergence`: repeated warm-started passes until
//!   `edm <= 0.002 · tol · 0.5`, at most ten times by default.
//! - `results`: the atomic best-fit snapshot, restore and correlation.
//! - `contour` / `execution`: grid generation, per-point fresh engines and
//!   serial or pooled evaluation with ordered collection.
//! - `display`: tables and PDG-style rounding for printed results.
//!
//! Invariants & assumptions
//! ------------------------
//! - The objective is a negative log-likelihood; the error definition is
//!   `0.5` for every engine this module creates.
//! - Non-convergence and single bad grid points are data (`FIT_FAILED`),
//!   caller mistakes are errors.
//!
//! Conventions
//! -----------
//! - Parameters are identified by dotted paths (`"src.comp.shape.par"`);
//!   engines see them flattened with `_`.
//! - Bounded parameters are optimized in an unbounded internal space through
//!   the transforms in `transforms`; every value leaving an engine is in
//!   external units and inside its bounds.
//! - Fallible operations return [`MinResult`](errors::MinResult).
//!
//! Downstream usage
//! ----------------
//! - `use astrofit::minimizer::prelude::*;` brings in the session types,
//!   parameter registry, contour builder and execution strategies.
//!
//! Testing notes
//! -------------
//! - Each submodule carries its own unit tests; end-to-end scenarios live in
//!   `tests/integration_fit_pipeline.rs`.
pub mod contour;
pub mod convergence;
pub mod display;
pub mod engine;
pub mod errors;
pub mod execution;
pub mod numerics;
pub mod objective;
pub mod parameters;
pub mod results;
pub mod session;
pub mod transforms;
pub mod types;

pub mod prelude {
    pub use super::contour::{ContourResult, ContourSpec, FailureCause};
    pub use super::display::{CollectingSink, ConsoleSink, Table, TableSink};
    pub use super::engine::{ManagedEngine, NativeEngine, OptimizerEngine};
    pub use super::errors::{MinResult, MinimizerError};
    pub use super::execution::{BatchHandle, ExecutionStrategy, ParallelOptions, RayonPool, WorkerPool};
    pub use super::objective::Objective;
    pub use super::parameters::{Parameter, ParameterRegistry};
    pub use super::results::{AsymmetricErrors, BestFit};
    pub use super::session::{EngineMinimizer, ManagedMinimizer, Minimizer, MinimizerOptions, NativeMinimizer};
    pub use super::types::FIT_FAILED;
}
