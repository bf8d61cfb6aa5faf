//! Unified error surface for the minimizer layer.
//!
//! Every fallible operation in [`crate::minimizer`] returns
//! [`MinResult<T>`]. Variants are grouped by the stage that raises them:
//! parameter bookkeeping, option validation, objective evaluation, fit-state
//! discipline (covariance/errors requested at the wrong time), contour input
//! validation, execution backends, statistics helpers and the argmin backend.
//!
//! Numerically expected failures (non-convergence, a bad grid point) are not
//! represented here; they travel as data (`FIT_FAILED`, `PointOutcome`).
use argmin::core::{ArgminError, Error};

/// Crate-wide result alias for minimizer operations.
pub type MinResult<T> = Result<T, MinimizerError>;

#[derive(Debug, Clone, PartialEq)]
pub enum MinimizerError {
    // ---- Parameters ----
    /// Parameter value must be finite and inside its bounds.
    InvalidValue {
        name: String,
        value: f64,
        reason: &'static str,
    },
    /// Step size must be finite and strictly positive.
    InvalidDelta {
        name: String,
        delta: f64,
        reason: &'static str,
    },
    /// Bounds must be finite and ordered.
    InvalidBounds {
        name: String,
        lower: f64,
        upper: f64,
        reason: &'static str,
    },
    /// Two parameters map to the same identity or engine name.
    DuplicateParameter {
        name: String,
    },
    /// Lookup of a parameter that was never declared.
    UnknownParameter {
        name: String,
    },
    /// Objective arity does not match the number of supplied arguments.
    DimensionMismatch {
        expected: usize,
        found: usize,
    },
    /// Index-addressed declaration out of sequence.
    VariableIndexMismatch {
        expected: usize,
        found: usize,
    },

    // ---- Options ----
    /// Tolerance needs to be positive and finite.
    InvalidTolerance {
        tol: f64,
        reason: &'static str,
    },
    /// Retry budget needs to be positive.
    InvalidTrials {
        trials: usize,
        reason: &'static str,
    },
    /// Function-call budget needs to be positive.
    InvalidMaxCalls {
        calls: usize,
        reason: &'static str,
    },

    // ---- Objective ----
    /// Objective returned a non-finite value.
    NonFiniteObjective {
        value: f64,
    },
    /// A pass spent its function-call budget.
    CallLimitReached {
        calls: usize,
    },
    /// Gradient dimensions do not match parameter dimensions.
    GradientDimMismatch {
        expected: usize,
        found: usize,
    },
    /// Gradient elements need to be finite.
    InvalidGradient {
        index: usize,
        value: f64,
        reason: &'static str,
    },
    /// Hessian matrix dimensions do not match parameter dimensions.
    HessianDimMismatch {
        expected: usize,
        found: (usize, usize),
    },
    /// Hessian values need to be finite.
    InvalidHessian {
        row: usize,
        col: usize,
        value: f64,
    },

    // ---- Fit state ----
    /// Covariance is not available (usually unconstrained parameters).
    CannotComputeCovariance,
    /// Errors requested without a converged minimization.
    CannotComputeErrors,
    /// Profile scan for asymmetric errors failed.
    MinosFailed {
        name: String,
        reason: String,
    },

    // ---- Contours ----
    /// Requested to fix a parameter that is not among the free parameters.
    ParameterIsNotFree {
        name: String,
    },
    /// Contour axis specification is not usable.
    InvalidContourRange {
        name: String,
        reason: &'static str,
    },
    /// One `log` flag is required per scanned dimension.
    InvalidLogFlags {
        expected: usize,
        found: usize,
    },

    // ---- Execution ----
    /// Worker pool could not be built or returned an incomplete batch.
    WorkerPool {
        text: String,
    },

    // ---- Statistics ----
    /// Model comparison needs at least one analysis.
    EmptyComparison,
    /// Model comparison mixes MLE and Bayesian analyses.
    MixedAnalysisTypes,
    /// Bayesian trace holds no samples.
    EmptyTrace,
    /// Confidence level must lie in (0, 1).
    InvalidConfidence {
        cl: f64,
        reason: &'static str,
    },
    /// Wrapper for statrs distribution construction errors.
    Distribution {
        text: String,
    },

    // ---- Argmin ----
    /// Wrapper for argmin::InvalidParameter
    InvalidParameter {
        text: String,
    },
    /// Wrapper for argmin::NotImplemented
    NotImplemented {
        text: String,
    },
    /// Wrapper for argmin::NotInitialized
    NotInitialized {
        text: String,
    },
    /// Wrapper for argmin::ConditionViolated
    ConditionViolated {
        text: String,
    },
    /// Wrapper for argmin::CheckPointNotFound
    CheckPointNotFound {
        text: String,
    },
    /// Wrapper for argmin::PotentialBug
    PotentialBug {
        text: String,
    },
    /// Wrapper for argmin::ImpossibleError
    ImpossibleError {
        text: String,
    },
    /// Wrapper for other argmin::Error types
    BackendError {
        text: String,
    },

    // ---- Fallback ----
    UnknownError,
}

impl std::error::Error for MinimizerError {}

impl std::fmt::Display for MinimizerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Parameters ----
            MinimizerError::InvalidValue { name, value, reason } => {
                write!(f, "Invalid value {value} for parameter '{name}': {reason}")
            }
            MinimizerError::InvalidDelta { name, delta, reason } => {
                write!(f, "Invalid step size {delta} for parameter '{name}': {reason}")
            }
            MinimizerError::InvalidBounds { name, lower, upper, reason } => {
                write!(f, "Invalid bounds [{lower}, {upper}] for parameter '{name}': {reason}")
            }
            MinimizerError::DuplicateParameter { name } => {
                write!(
                    f,
                    "Parameter '{name}' is declared twice (or two parameters flatten to the same \
                     engine name). Rename one of them."
                )
            }
            MinimizerError::UnknownParameter { name } => {
                write!(f, "Unknown parameter '{name}'")
            }
            MinimizerError::DimensionMismatch { expected, found } => {
                write!(f, "Dimension mismatch: expected {expected} arguments, found {found}")
            }
            MinimizerError::VariableIndexMismatch { expected, found } => {
                write!(
                    f,
                    "Variables must be declared in order: expected index {expected}, found {found}"
                )
            }

            // ---- Options ----
            MinimizerError::InvalidTolerance { tol, reason } => {
                write!(f, "Invalid tolerance {tol}: {reason}")
            }
            MinimizerError::InvalidTrials { trials, reason } => {
                write!(f, "Invalid number of trials {trials}: {reason}")
            }
            MinimizerError::InvalidMaxCalls { calls, reason } => {
                write!(f, "Invalid maximum number of function calls {calls}: {reason}")
            }

            // ---- Objective ----
            MinimizerError::NonFiniteObjective { value } => {
                write!(
                    f,
                    "Objective function returned a non-finite value ({value}). Check the allowed \
                     parameter ranges and reduce them if the model is undefined there."
                )
            }
            MinimizerError::CallLimitReached { calls } => {
                write!(f, "Function-call budget of {calls} calls exhausted")
            }
            MinimizerError::GradientDimMismatch { expected, found } => {
                write!(f, "Gradient dimension mismatch: expected {expected}, found {found}")
            }
            MinimizerError::InvalidGradient { index, value, reason } => {
                write!(f, "Invalid gradient at index {index}: {value}: {reason}")
            }
            MinimizerError::HessianDimMismatch { expected, found } => {
                write!(
                    f,
                    "Hessian dimension mismatch: expected ({expected}, {expected}), found {found:?}"
                )
            }
            MinimizerError::InvalidHessian { row, col, value } => {
                write!(f, "Invalid Hessian at ({row}, {col}): {value}, must be finite")
            }

            // ---- Fit state ----
            MinimizerError::CannotComputeCovariance => {
                write!(
                    f,
                    "Cannot compute covariance numerically. This usually means that there are \
                     unconstrained parameters. Fix those or reduce their allowed range, or use a \
                     simpler model."
                )
            }
            MinimizerError::CannotComputeErrors => {
                write!(
                    f,
                    "MIGRAD results not valid, cannot compute errors. Did you run the fit first?"
                )
            }
            MinimizerError::MinosFailed { name, reason } => {
                write!(
                    f,
                    "MINOS has failed for parameter '{name}' ({reason}). This usually means that \
                     the fit is very difficult, for example because of high correlation between \
                     parameters. Check the correlation matrix and the contours, or reformulate \
                     the model with less correlated parameters."
                )
            }

            // ---- Contours ----
            MinimizerError::ParameterIsNotFree { name } => {
                write!(f, "Parameter {name} is not a free parameter.")
            }
            MinimizerError::InvalidContourRange { name, reason } => {
                write!(f, "Invalid contour range for parameter '{name}': {reason}")
            }
            MinimizerError::InvalidLogFlags { expected, found } => {
                write!(
                    f,
                    "When specifying the 'log' option you have to provide a boolean for each \
                     dimension you are stepping on (expected {expected}, found {found})."
                )
            }

            // ---- Execution ----
            MinimizerError::WorkerPool { text } => {
                write!(f, "Worker pool error: {text}")
            }

            // ---- Statistics ----
            MinimizerError::EmptyComparison => {
                write!(f, "Model comparison needs at least one analysis")
            }
            MinimizerError::MixedAnalysisTypes => {
                write!(f, "Only all Bayesian or all MLE analyses are allowed. Not a mixture!")
            }
            MinimizerError::EmptyTrace => {
                write!(f, "Bayesian trace is empty; run the sampler before computing the DIC")
            }
            MinimizerError::InvalidConfidence { cl, reason } => {
                write!(f, "Invalid confidence level {cl}: {reason}")
            }
            MinimizerError::Distribution { text } => {
                write!(f, "Distribution error: {text}")
            }

            // ---- Argmin ----
            MinimizerError::InvalidParameter { text } => {
                write!(f, "Invalid parameter: {text}")
            }
            MinimizerError::NotImplemented { text } => {
                write!(f, "Not implemented: {text}")
            }
            MinimizerError::NotInitialized { text } => {
                write!(f, "Not initialized: {text}")
            }
            MinimizerError::ConditionViolated { text } => {
                write!(f, "Condition violated: {text}")
            }
            MinimizerError::CheckPointNotFound { text } => {
                write!(f, "Checkpoint not found: {text}")
            }
            MinimizerError::PotentialBug { text } => {
                write!(f, "Potential bug: {text}")
            }
            MinimizerError::ImpossibleError { text } => {
                write!(f, "Impossible error: {text}")
            }
            MinimizerError::BackendError { text } => {
                write!(f, "Backend error: {text}")
            }

            // ---- Fallback ----
            MinimizerError::UnknownError => {
                write!(f, "Unknown error")
            }
        }
    }
}

impl From<Error> for MinimizerError {
    fn from(original_err: Error) -> Self {
        // Our own errors travel through argmin wrapped in its `Error`; unwrap
        // them first so callers see the original variant.
        let original_err = match original_err.downcast::<MinimizerError>() {
            Ok(own) => return own,
            Err(err) => err,
        };
        match original_err.downcast() {
            Ok(opt_err) => match opt_err {
                ArgminError::InvalidParameter { text } => MinimizerError::InvalidParameter { text },
                ArgminError::NotImplemented { text } => MinimizerError::NotImplemented { text },
                ArgminError::NotInitialized { text } => MinimizerError::NotInitialized { text },
                ArgminError::ConditionViolated { text } => {
                    MinimizerError::ConditionViolated { text }
                }
                ArgminError::CheckpointNotFound { text } => {
                    MinimizerError::CheckPointNotFound { text }
                }
                ArgminError::PotentialBug { text } => MinimizerError::PotentialBug { text },
                ArgminError::ImpossibleError { text } => MinimizerError::ImpossibleError { text },
                _ => MinimizerError::UnknownError,
            },
            Err(err) => MinimizerError::BackendError { text: err.to_string() },
        }
    }
}
