//! astrofit — likelihood minimization and profile contours for model fitting.
//!
//! Purpose
//! -------
//! Serve as the crate root for the fitting layer that sits between a
//! statistical model (which supplies a negative log-likelihood) and the
//! numerical optimizers that minimize it.
//!
//! Key behaviors
//! -------------
//! - `minimizer`: parameter registry, optimizer engines behind one trait,
//!   retry-until-converged minimization, covariance and asymmetric errors,
//!   and grid contours evaluated serially or on a worker pool.
//! - `stats_tools`: AIC, BIC, DIC, χ² confidence deltas and a model
//!   comparison table.
//!
//! Invariants & assumptions
//! ------------------------
//! - Objectives are called with positional `f64` arguments in registry
//!   order and return a finite `-ln L` on their domain.
//! - Non-convergence is reported as data (`FIT_FAILED`), caller mistakes as
//!   `MinimizerError` values; nothing in the public API panics on bad input.
//!
//! Conventions
//! -----------
//! - Diagnostics go through the `log` facade; install any logger to see
//!   them. Printed tables go through a caller-chosen `TableSink`.
//!
//! Downstream usage
//! ----------------
//! - Most callers need only `astrofit::minimizer::prelude::*`.
//!
//! Testing notes
//! -------------
//! - Unit tests live next to the code; `tests/integration_fit_pipeline.rs`
//!   runs complete fits, error scans and contours through the public API.

pub mod minimizer;
pub mod stats_tools;
