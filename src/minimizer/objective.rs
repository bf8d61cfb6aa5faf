//! minimizer::objective — the user's `-ln L` and how engines call it.
//!
//! Purpose
//! -------
//! Wrap the user-supplied objective (positional `f64` arguments in registry
//! order, returning `-ln L`) so that it can be shared across threads and
//! called by either engine binding without rebinding on every call.
//!
//! Key behaviors
//! -------------
//! - [`Objective`] is a cheap-to-clone, `Send + Sync` handle with a fixed
//!   arity, checked on every call.
//! - [`PositionTable`] maps engine names to positional slots; the managed
//!   binding and the zero-free-parameter contour path use it to lay out
//!   arguments.
//! - [`FixedArityAdapter`] is the native binding's functor: it reports its
//!   dimension and forwards exactly that many arguments.
//!
//! Invariants & assumptions
//! ------------------------
//! - The objective is deterministic for identical inputs; the engines rely on
//!   that for finite differences and warm starts.
//! - `n_dim()` equals the registry length of the session that owns it.
//!
//! Testing notes
//! -------------
//! - Unit tests cover arity checks and positional reordering.
use crate::minimizer::{
    errors::{MinResult, MinimizerError},
    parameters::{EngineName, NameMap},
};
use std::{collections::HashMap, fmt, sync::Arc};

/// Signature of a user objective.
pub type ObjectiveFn = dyn Fn(&[f64]) -> f64 + Send + Sync;

/// Shared handle to a fixed-arity objective.
#[derive(Clone)]
pub struct Objective {
    f: Arc<ObjectiveFn>,
    n_dim: usize,
}

impl Objective {
    pub fn new<F>(n_dim: usize, f: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Self { f: Arc::new(f), n_dim }
    }

    pub fn n_dim(&self) -> usize {
        self.n_dim
    }

    /// Evaluate at `args`. The returned value is not checked for finiteness.
    ///
    /// # Errors
    /// [`MinimizerError::DimensionMismatch`] when `args.len() != n_dim()`.
    pub fn call(&self, args: &[f64]) -> MinResult<f64> {
        if args.len() != self.n_dim {
            return Err(MinimizerError::DimensionMismatch {
                expected: self.n_dim,
                found: args.len(),
            });
        }
        Ok((self.f)(args))
    }
}

impl fmt::Debug for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Objective").field("n_dim", &self.n_dim).finish_non_exhaustive()
    }
}

/// Engine name → positional slot of the objective.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PositionTable {
    positions: HashMap<EngineName, usize>,
}

impl PositionTable {
    /// Slots follow the registry order recorded in `names`.
    pub fn from_names(names: &NameMap) -> Self {
        let positions = names.names().iter().cloned().enumerate().map(|(i, n)| (n, i)).collect();
        Self { positions }
    }

    pub fn position(&self, name: &EngineName) -> MinResult<usize> {
        self.positions
            .get(name)
            .copied()
            .ok_or_else(|| MinimizerError::UnknownParameter { name: name.to_string() })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Lay out `(name, value)` pairs into a positional argument vector of
    /// length `n_dim`.
    pub fn arrange<'a, I>(&self, named: I, n_dim: usize) -> MinResult<Vec<f64>>
    where
        I: IntoIterator<Item = (&'a EngineName, f64)>,
    {
        let mut args = vec![f64::NAN; n_dim];
        let mut filled = 0usize;
        for (name, value) in named {
            let slot = self.position(name)?;
            let target = args
                .get_mut(slot)
                .ok_or(MinimizerError::DimensionMismatch { expected: n_dim, found: slot + 1 })?;
            *target = value;
            filled += 1;
        }
        if filled != n_dim {
            return Err(MinimizerError::DimensionMismatch { expected: n_dim, found: filled });
        }
        Ok(args)
    }
}

/// Index-addressed functor for the native engine.
#[derive(Debug, Clone)]
pub struct FixedArityAdapter {
    objective: Objective,
    dimensions: usize,
}

impl FixedArityAdapter {
    pub fn new(objective: Objective) -> Self {
        let dimensions = objective.n_dim();
        Self { objective, dimensions }
    }

    pub fn ndim(&self) -> usize {
        self.dimensions
    }

    /// Forward the first `ndim()` entries of `args` to the objective.
    pub fn eval(&self, args: &[f64]) -> MinResult<f64> {
        match args.get(..self.dimensions) {
            Some(head) => self.objective.call(head),
            None => Err(MinimizerError::DimensionMismatch {
                expected: self.dimensions,
                found: args.len(),
            }),
        }
    }
}
