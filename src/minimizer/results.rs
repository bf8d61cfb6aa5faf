//! minimizer::results — best-fit snapshot, covariance and correlation.
//!
//! Purpose
//! -------
//! Keep the outcome of the last converged minimization and make it the
//! single source of truth that later operations (errors, contours, printing)
//! restore from, regardless of what those operations did to the engine.
//!
//! Key behaviors
//! -------------
//! - [`ResultStore::store`] replaces the whole [`FitResult`] at once; a
//!   reader never sees values from one fit with the minimum of another.
//! - [`ResultStore::mark_failed`] clears the snapshot so a failed fit cannot
//!   be mistaken for a converged one.
//! - [`ResultStore::restore_to_registry`] writes the stored values into both
//!   the parameter registry and the engine; calling it twice is the same as
//!   calling it once.
//! - [`Covariance::correlation`] is `cov_ij / sqrt(cov_ii · cov_jj)`.
//!
//! Invariants & assumptions
//! ------------------------
//! - Best-fit entries follow registry order.
//! - A covariance, when present, is square and indexed by the engine names
//!   of the free variables.
//!
//! Testing notes
//! -------------
//! - Unit tests cover atomic replacement, restore idempotence and the
//!   correlation matrix.
use crate::minimizer::{
    engine::OptimizerEngine,
    errors::{MinResult, MinimizerError},
    parameters::{EngineName, ParameterRegistry},
};
use ndarray::Array2;

/// Insertion-ordered map keyed by parameter path.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append, or overwrite in place when the key already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// Best-fit value per parameter path.
pub type BestFit = OrderedMap<f64>;

/// `(negative, positive)` error per parameter path.
pub type AsymmetricErrors = OrderedMap<(f64, f64)>;

/// Covariance over the free variables, in external units.
#[derive(Debug, Clone, PartialEq)]
pub struct Covariance {
    names: Vec<EngineName>,
    matrix: Array2<f64>,
}

impl Covariance {
    pub fn new(names: Vec<EngineName>, matrix: Array2<f64>) -> MinResult<Self> {
        let n = names.len();
        if matrix.nrows() != n || matrix.ncols() != n {
            return Err(MinimizerError::HessianDimMismatch {
                expected: n,
                found: (matrix.nrows(), matrix.ncols()),
            });
        }
        Ok(Self { names, matrix })
    }

    pub fn names(&self) -> &[EngineName] {
        &self.names
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    pub fn get(&self, a: &EngineName, b: &EngineName) -> Option<f64> {
        let i = self.names.iter().position(|n| n == a)?;
        let j = self.names.iter().position(|n| n == b)?;
        Some(self.matrix[[i, j]])
    }

    /// Parabolic error `sqrt(cov_ii)` of one variable.
    pub fn sigma_of(&self, name: &EngineName) -> Option<f64> {
        self.get(name, name).map(f64::sqrt)
    }

    /// Parabolic errors in name order.
    pub fn parabolic_errors(&self) -> Vec<f64> {
        self.matrix.diag().iter().map(|v| v.sqrt()).collect()
    }

    /// `cov_ij / sqrt(cov_ii · cov_jj)`.
    pub fn correlation(&self) -> Array2<f64> {
        let sigma = self.parabolic_errors();
        let mut corr = self.matrix.clone();
        for ((i, j), v) in corr.indexed_iter_mut() {
            *v /= sigma[i] * sigma[j];
        }
        corr
    }
}

/// Snapshot of one converged minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub best_fit: BestFit,
    pub minimum: f64,
    pub covariance: Option<Covariance>,
    pub errors: Option<AsymmetricErrors>,
}

/// Holder of the last converged fit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultStore {
    latest: Option<FitResult>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored fit.
    pub fn store(&mut self, best_fit: BestFit, minimum: f64, covariance: Option<Covariance>) {
        self.latest = Some(FitResult { best_fit, minimum, covariance, errors: None });
    }

    /// Forget any stored fit after a failed minimization.
    pub fn mark_failed(&mut self) {
        self.latest = None;
    }

    /// Attach asymmetric errors to the stored fit.
    pub fn set_errors(&mut self, errors: AsymmetricErrors) -> MinResult<()> {
        match self.latest.as_mut() {
            Some(fit) => {
                fit.errors = Some(errors);
                Ok(())
            }
            None => Err(MinimizerError::CannotComputeErrors),
        }
    }

    pub fn latest(&self) -> Option<&FitResult> {
        self.latest.as_ref()
    }

    pub fn is_converged(&self) -> bool {
        self.latest.is_some()
    }

    pub fn best_fit(&self) -> Option<&BestFit> {
        self.latest.as_ref().map(|f| &f.best_fit)
    }

    pub fn minimum(&self) -> Option<f64> {
        self.latest.as_ref().map(|f| f.minimum)
    }

    pub fn covariance(&self) -> Option<&Covariance> {
        self.latest.as_ref().and_then(|f| f.covariance.as_ref())
    }

    /// Correlation matrix of the stored fit.
    ///
    /// # Errors
    /// [`MinimizerError::CannotComputeCovariance`] when no covariance exists.
    pub fn correlation_matrix(&self) -> MinResult<Array2<f64>> {
        self.covariance().map(Covariance::correlation).ok_or(MinimizerError::CannotComputeCovariance)
    }

    /// Write the stored best fit into `registry` and `engine`.
    ///
    /// Returns `false` (and changes nothing) when no fit is stored.
    pub fn restore_to_registry<E: OptimizerEngine>(
        &self, registry: &mut ParameterRegistry, engine: &mut E,
    ) -> MinResult<bool> {
        let Some(fit) = self.latest.as_ref() else {
            return Ok(false);
        };
        let paths: Vec<String> = registry.paths().map(str::to_string).collect();
        for (index, path) in paths.iter().enumerate() {
            let Some(&value) = fit.best_fit.get(path) else {
                continue;
            };
            let value = registry.get(path).map_or(value, |p| p.bounds().clamp(value));
            registry.set_value(path, value)?;
            engine.set_value(index, value)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minimizer::{
        engine::test_support::ScriptedEngine,
        parameters::Parameter,
    };
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Atomic replacement and clearing of the stored fit.
    // - Restore idempotence across registry and engine.
    // - Correlation matrix properties and the missing-covariance error.
    // -------------------------------------------------------------------------

    fn names(n: &[&str]) -> Vec<EngineName> {
        n.iter().map(|p| EngineName::from_path(p)).collect()
    }

    #[test]
    // Purpose
    // -------
    // Verify that a new store replaces every field of the previous one.
    //
    // Given
    // -----
    // - A stored fit with a covariance, then a store without one.
    //
    // Expect
    // ------
    // - The covariance is gone and values/minimum are the new ones.
    fn store_replaces_whole_snapshot() {
        // Arrange
        let mut store = ResultStore::new();
        let cov = Covariance::new(names(&["a"]), array![[1.0]]).unwrap();
        store.store([("a", 1.0)].into_iter().collect(), 10.0, Some(cov));

        // Act
        store.store([("a", 2.0)].into_iter().collect(), 5.0, None);

        // Assert
        assert_eq!(store.best_fit().unwrap().get("a"), Some(&2.0));
        assert_eq!(store.minimum(), Some(5.0));
        assert!(store.covariance().is_none());
    }

    #[test]
    // Purpose
    // -------
    // Ensure `mark_failed` leaves nothing that looks like a converged fit.
    //
    // Given
    // -----
    // - A stored fit followed by `mark_failed`.
    //
    // Expect
    // ------
    // - `is_converged()` is false and restore reports `false`.
    fn mark_failed_clears_snapshot() {
        // Arrange
        let mut store = ResultStore::new();
        store.store([("a", 1.0)].into_iter().collect(), 1.0, None);
        let mut registry = ParameterRegistry::from_parameters([Parameter::new("a", 0.0, 1.0).unwrap()]).unwrap();
        let mut engine = ScriptedEngine::with_script(vec![0.0]);
        engine.values = vec![0.0];

        // Act
        store.mark_failed();
        let restored = store.restore_to_registry(&mut registry, &mut engine).unwrap();

        // Assert
        assert!(!store.is_converged());
        assert!(!restored);
        assert_eq!(registry.get("a").unwrap().value(), 0.0);
    }

    #[test]
    // Purpose
    // -------
    // Verify that restoring twice gives the same state as restoring once.
    //
    // Given
    // -----
    // - A stored fit a = 1.5, b = -2 and a registry/engine at 0.
    //
    // Expect
    // ------
    // - Registry and engine values equal the stored ones after each restore.
    fn restore_is_idempotent() {
        // Arrange
        let mut store = ResultStore::new();
        store.store([("a", 1.5), ("b", -2.0)].into_iter().collect(), 0.0, None);
        let mut registry = ParameterRegistry::from_parameters([
            Parameter::new("a", 0.0, 1.0).unwrap(),
            Parameter::new("b", 0.0, 1.0).unwrap(),
        ])
        .unwrap();
        let mut engine = ScriptedEngine::with_script(vec![0.0]);
        engine.values = vec![0.0, 0.0];

        // Act
        store.restore_to_registry(&mut registry, &mut engine).unwrap();
        let once = (registry.values(), engine.values.clone());
        store.restore_to_registry(&mut registry, &mut engine).unwrap();

        // Assert
        assert_eq!(once.0, vec![1.5, -2.0]);
        assert_eq!(once.1, vec![1.5, -2.0]);
        assert_eq!((registry.values(), engine.values.clone()), once);
    }

    #[test]
    // Purpose
    // -------
    // Check the correlation matrix: unit diagonal, symmetry, known value.
    //
    // Given
    // -----
    // - cov = [[4, 1], [1, 1]].
    //
    // Expect
    // ------
    // - diag = 1, corr[0,1] = corr[1,0] = 0.5.
    fn correlation_has_unit_diagonal_and_is_symmetric() {
        // Arrange
        let mut store = ResultStore::new();
        let cov = Covariance::new(names(&["a", "b"]), array![[4.0, 1.0], [1.0, 1.0]]).unwrap();
        store.store([("a", 0.0), ("b", 0.0)].into_iter().collect(), 0.0, Some(cov));

        // Act
        let corr = store.correlation_matrix().unwrap();

        // Assert
        assert!((corr[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((corr[[1, 1]] - 1.0).abs() < 1e-12);
        assert!((corr[[0, 1]] - 0.5).abs() < 1e-12);
        assert_eq!(corr[[0, 1]], corr[[1, 0]]);
    }

    #[test]
    // Purpose
    // -------
    // Ensure a missing covariance is reported with the dedicated error.
    //
    // Given
    // -----
    // - A stored fit without covariance.
    //
    // Expect
    // ------
    // - `CannotComputeCovariance`.
    fn correlation_without_covariance_fails() {
        // Arrange
        let mut store = ResultStore::new();
        store.store([("a", 0.0)].into_iter().collect(), 0.0, None);

        // Act
        let result = store.correlation_matrix();

        // Assert
        assert_eq!(result, Err(MinimizerError::CannotComputeCovariance));
    }
}
