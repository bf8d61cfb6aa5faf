//! minimizer::types — shared numeric aliases, constants and solver wiring.
//!
//! Purpose
//! -------
//! Centralize the numeric types, sentinel values and solver aliases used by
//! the minimizer layer so that engines, the convergence controller and the
//! contour engine agree on shapes and magic numbers.
//!
//! Key behaviors
//! -------------
//! - Define canonical aliases for internal parameter vectors, gradients,
//!   Hessians, and scalar costs (`Theta`, `Grad`, `Hessian`, `Cost`).
//! - Define the failure sentinel [`FIT_FAILED`] and the likelihood error
//!   definition [`LIKELIHOOD_ERROR_DEF`].
//! - Expose the pre-wired L-BFGS solver alias used by the managed engine.
//!
//! Invariants & assumptions
//! ------------------------
//! - `Theta` always lives in the engine's *internal* (unbounded) space;
//!   external values are plain `f64` slices in declaration order.
//! - [`FIT_FAILED`] is far above any realistic `-ln L` so it never wins a
//!   minimum search over a contour grid.
//!
//! Conventions
//! -----------
//! - The convergence threshold is `EDM_FACTOR * tolerance * LIKELIHOOD_ERROR_DEF`.
//!   `LIKELIHOOD_ERROR_DEF` is fixed at `0.5` for negative log-likelihoods.
//!
//! Testing notes
//! -------------
//! - This module only defines type aliases and constants; there are no
//!   dedicated unit tests.
use argmin::solver::{linesearch::MoreThuenteLineSearch, quasinewton::LBFGS};
use ndarray::{Array1, Array2};

/// Internal parameter vector of the free variables.
pub type Theta = Array1<f64>;

/// Gradient of the cost with respect to [`Theta`].
pub type Grad = Array1<f64>;

/// Dense `n × n` second-derivative matrix over the free variables.
pub type Hessian = Array2<f64>;

/// Scalar objective value (`-ln L`).
pub type Cost = f64;

/// Sentinel returned for a failed minimization or a failed grid point.
pub const FIT_FAILED: f64 = 1e12;

/// Error definition for a negative log-likelihood objective.
pub const LIKELIHOOD_ERROR_DEF: f64 = 0.5;

/// Multiplier applied to `tolerance * error_def` to obtain the EDM threshold.
pub const EDM_FACTOR: f64 = 0.002;

/// Maximum number of warm-started minimization passes.
pub const DEFAULT_TRIALS: usize = 10;

/// Default engine tolerance for full fits.
pub const DEFAULT_TOLERANCE: f64 = 0.1;

/// Loose tolerance used for the per-point profile minimizations of a contour.
pub const CONTOUR_TOLERANCE: f64 = 100.0;

/// Default function-call budget of the native engine.
pub const NATIVE_MAX_CALLS: usize = 1000;

/// Default history size (`m`) for L-BFGS runs.
pub const DEFAULT_LBFGS_MEM: usize = 7;

/// Gradient-norm stopping rule inside one L-BFGS pass.
pub const LBFGS_TOL_GRAD: f64 = 1e-8;

/// Cost-change stopping rule inside one L-BFGS pass.
pub const LBFGS_TOL_COST: f64 = 1e-12;

/// Iteration cap for one L-BFGS pass.
pub const LBFGS_MAX_ITERS: u64 = 500;

/// Standard-deviation stopping rule of the Nelder–Mead simplex.
pub const SIMPLEX_SD_TOL: f64 = 1e-12;

/// Relative eigenvalue cutoff below which curvature is treated as zero.
pub const EIGEN_EPS: f64 = 1e-10;

/// Derivative step as a fraction of the internal step size.
pub const HESSIAN_STEP_SCALE: f64 = 1e-3;

/// Lower bound on a derivative step relative to the coordinate's magnitude.
pub const RELATIVE_STEP_FLOOR: f64 = 1e-7;

/// Projected gradient above which a zero-curvature direction still slopes.
pub const FLAT_GRADIENT_TOL: f64 = 1e-6;

/// More–Thuente line search specialized to this crate's numeric types.
pub type MoreThuenteLS = MoreThuenteLineSearch<Theta, Grad, Cost>;

/// L-BFGS solver wired to the More–Thuente line search.
pub type LbfgsMoreThuente = LBFGS<MoreThuenteLS, Theta, Grad, Cost>;
