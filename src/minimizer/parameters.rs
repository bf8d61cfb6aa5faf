//! minimizer::parameters — free-parameter registry and engine naming.
//!
//! Purpose
//! -------
//! Hold the ordered set of free parameters handed to a minimizer, validate
//! each parameter at construction, and provide the flattened, engine-safe
//! names under which the parameters are declared to an optimizer engine.
//!
//! Key behaviors
//! -------------
//! - [`Parameter`] validates value, step size and bounds on construction and
//!   on every value update.
//! - [`ParameterRegistry`] preserves insertion order; that order is the
//!   positional order of the objective's arguments.
//! - [`EngineName`] replaces `.` with `_` in a dotted parameter path.
//!   [`NameMap`] rejects two paths that flatten to the same engine name.
//!
//! Invariants & assumptions
//! ------------------------
//! - `min_value <= value <= max_value` whenever the bounds are present.
//! - `delta > 0` and finite.
//! - Registry order is stable for the lifetime of a minimizer.
//!
//! Conventions
//! -----------
//! - Parameters are addressed by their full dotted path (for example
//!   `"source.spectrum.main.powerlaw.index"`).
//!
//! Downstream usage
//! ----------------
//! - The session builds a [`NameMap`] once and declares every parameter to
//!   the engine in registry order.
//! - The result store writes best-fit values back through
//!   [`ParameterRegistry::set_value`].
//!
//! Testing notes
//! -------------
//! - Unit tests cover validation failures, order preservation, duplicate
//!   detection and name flattening collisions.
use crate::minimizer::{
    errors::{MinResult, MinimizerError},
    transforms::Bounds,
};
use std::collections::HashMap;

/// One free parameter of the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    path: String,
    value: f64,
    delta: f64,
    min_value: Option<f64>,
    max_value: Option<f64>,
    unit: String,
}

impl Parameter {
    /// Create an unbounded parameter.
    ///
    /// # Errors
    /// - [`MinimizerError::InvalidValue`] if `value` is not finite.
    /// - [`MinimizerError::InvalidDelta`] if `delta` is not finite and positive.
    pub fn new(path: impl Into<String>, value: f64, delta: f64) -> MinResult<Self> {
        let path = path.into();
        if !value.is_finite() {
            return Err(MinimizerError::InvalidValue {
                name: path,
                value,
                reason: "Value must be finite.",
            });
        }
        if !delta.is_finite() || delta <= 0.0 {
            return Err(MinimizerError::InvalidDelta {
                name: path,
                delta,
                reason: "Step size must be finite and positive.",
            });
        }
        Ok(Self { path, value, delta, min_value: None, max_value: None, unit: String::new() })
    }

    /// Attach optional bounds, checking order and that the value lies inside.
    pub fn with_bounds(mut self, min_value: Option<f64>, max_value: Option<f64>) -> MinResult<Self> {
        let lower = min_value.unwrap_or(f64::NEG_INFINITY);
        let upper = max_value.unwrap_or(f64::INFINITY);
        if min_value.is_some_and(|v| !v.is_finite()) || max_value.is_some_and(|v| !v.is_finite()) {
            return Err(MinimizerError::InvalidBounds {
                name: self.path,
                lower,
                upper,
                reason: "Bounds must be finite when present.",
            });
        }
        if lower > upper {
            return Err(MinimizerError::InvalidBounds {
                name: self.path,
                lower,
                upper,
                reason: "Lower bound must not exceed the upper bound.",
            });
        }
        if self.value < lower || self.value > upper {
            return Err(MinimizerError::InvalidValue {
                name: self.path,
                value: self.value,
                reason: "Value must lie inside the bounds.",
            });
        }
        self.min_value = min_value;
        self.max_value = max_value;
        Ok(self)
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn min_value(&self) -> Option<f64> {
        self.min_value
    }

    pub fn max_value(&self) -> Option<f64> {
        self.max_value
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::from_limits(self.min_value, self.max_value)
    }

    /// Update the value, enforcing finiteness and bounds.
    pub fn set_value(&mut self, value: f64) -> MinResult<()> {
        if !value.is_finite() || !self.bounds().contains(value) {
            return Err(MinimizerError::InvalidValue {
                name: self.path.clone(),
                value,
                reason: "Value must be finite and inside the bounds.",
            });
        }
        self.value = value;
        Ok(())
    }
}

/// Ordered collection of free parameters keyed by path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterRegistry {
    params: Vec<Parameter>,
    index: HashMap<String, usize>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from parameters in positional order.
    pub fn from_parameters<I: IntoIterator<Item = Parameter>>(params: I) -> MinResult<Self> {
        let mut registry = Self::new();
        for param in params {
            registry.insert(param)?;
        }
        Ok(registry)
    }

    /// Append a parameter.
    ///
    /// # Errors
    /// [`MinimizerError::DuplicateParameter`] if the path is already present.
    pub fn insert(&mut self, param: Parameter) -> MinResult<()> {
        if self.index.contains_key(param.path()) {
            return Err(MinimizerError::DuplicateParameter { name: param.path().to_string() });
        }
        self.index.insert(param.path().to_string(), self.params.len());
        self.params.push(param);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&Parameter> {
        self.index.get(path).map(|&i| &self.params[i])
    }

    /// Positional index of `path`, if registered.
    pub fn position(&self, path: &str) -> Option<usize> {
        self.index.get(path).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.path())
    }

    pub fn values(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.value()).collect()
    }

    /// Set the value of a registered parameter.
    pub fn set_value(&mut self, path: &str, value: f64) -> MinResult<()> {
        match self.index.get(path) {
            Some(&i) => self.params[i].set_value(value),
            None => Err(MinimizerError::UnknownParameter { name: path.to_string() }),
        }
    }
}

/// Parameter path flattened into an identifier the engines accept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineName(String);

impl EngineName {
    /// Flatten a dotted path: every `.` becomes `_`.
    pub fn from_path(path: &str) -> Self {
        EngineName(path.replace('.', "_"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EngineName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bidirectional map between parameter paths and engine names.
#[derive(Debug, Clone, PartialEq)]
pub struct NameMap {
    ordered: Vec<EngineName>,
    to_engine: HashMap<String, usize>,
    to_path: HashMap<EngineName, String>,
}

impl NameMap {
    /// Flatten every registry path, in registry order.
    ///
    /// # Errors
    /// [`MinimizerError::DuplicateParameter`] when two paths flatten to the
    /// same engine name (e.g. `a.b_c` and `a_b.c`).
    pub fn from_registry(registry: &ParameterRegistry) -> MinResult<Self> {
        let mut ordered = Vec::with_capacity(registry.len());
        let mut to_engine = HashMap::with_capacity(registry.len());
        let mut to_path = HashMap::with_capacity(registry.len());
        for (i, path) in registry.paths().enumerate() {
            let name = EngineName::from_path(path);
            if let Some(previous) = to_path.insert(name.clone(), path.to_string()) {
                return Err(MinimizerError::DuplicateParameter {
                    name: format!("{path} (collides with {previous} as {name})"),
                });
            }
            to_engine.insert(path.to_string(), i);
            ordered.push(name);
        }
        Ok(Self { ordered, to_engine, to_path })
    }

    pub fn engine_name(&self, path: &str) -> Option<&EngineName> {
        self.to_engine.get(path).map(|&i| &self.ordered[i])
    }

    pub fn path_of(&self, name: &EngineName) -> Option<&str> {
        self.to_path.get(name).map(String::as_str)
    }

    /// Engine names in registry order.
    pub fn names(&self) -> &[EngineName] {
        &self.ordered
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Parameter construction and value validation.
    // - Registry order and duplicate detection.
    // - Engine name flattening and collision detection.
    //
    // They intentionally DO NOT cover:
    // - Declaration of parameters to engines (see engine tests).
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Reject a parameter whose initial value lies outside its bounds.
    //
    // Given
    // -----
    // - value 5.0 with bounds [0, 1].
    //
    // Expect
    // ------
    // - `InvalidValue`.
    fn with_bounds_rejects_value_outside_range() {
        // Act
        let result = Parameter::new("a", 5.0, 0.1).and_then(|p| p.with_bounds(Some(0.0), Some(1.0)));

        // Assert
        assert!(matches!(result, Err(MinimizerError::InvalidValue { .. })));
    }

    #[test]
    // Purpose
    // -------
    // Reject non-positive step sizes.
    //
    // Given
    // -----
    // - delta = 0.
    //
    // Expect
    // ------
    // - `InvalidDelta`.
    fn new_rejects_zero_delta() {
        assert!(matches!(Parameter::new("a", 1.0, 0.0), Err(MinimizerError::InvalidDelta { .. })));
    }

    #[test]
    // Purpose
    // -------
    // Verify that registry order equals insertion order.
    //
    // Given
    // -----
    // - Parameters inserted as c, a, b.
    //
    // Expect
    // ------
    // - `paths()` yields c, a, b and `position("b") == Some(2)`.
    fn registry_preserves_insertion_order() {
        // Arrange
        let registry = ParameterRegistry::from_parameters(
            ["c", "a", "b"].iter().map(|p| Parameter::new(*p, 1.0, 0.1).unwrap()),
        )
        .unwrap();

        // Act
        let paths: Vec<&str> = registry.paths().collect();

        // Assert
        assert_eq!(paths, vec!["c", "a", "b"]);
        assert_eq!(registry.position("b"), Some(2));
    }

    #[test]
    // Purpose
    // -------
    // Ensure a value update outside the bounds is rejected and leaves the
    // stored value untouched.
    //
    // Given
    // -----
    // - A parameter bounded to [0, 1] with value 0.5.
    //
    // Expect
    // ------
    // - `set_value(2.0)` errors and `value()` stays 0.5.
    fn set_value_outside_bounds_keeps_previous_value() {
        // Arrange
        let mut registry = ParameterRegistry::from_parameters([Parameter::new("a", 0.5, 0.1)
            .unwrap()
            .with_bounds(Some(0.0), Some(1.0))
            .unwrap()])
        .unwrap();

        // Act
        let result = registry.set_value("a", 2.0);

        // Assert
        assert!(result.is_err());
        assert_eq!(registry.get("a").unwrap().value(), 0.5);
    }

    #[test]
    // Purpose
    // -------
    // Verify flattening and its collision detection.
    //
    // Given
    // -----
    // - Paths `a.b_c` and `a_b.c`, both flattening to `a_b_c`.
    //
    // Expect
    // ------
    // - `NameMap::from_registry` returns `DuplicateParameter`.
    fn name_map_detects_flattening_collision() {
        // Arrange
        let registry = ParameterRegistry::from_parameters([
            Parameter::new("a.b_c", 1.0, 0.1).unwrap(),
            Parameter::new("a_b.c", 1.0, 0.1).unwrap(),
        ])
        .unwrap();

        // Act
        let result = NameMap::from_registry(&registry);

        // Assert
        assert!(matches!(result, Err(MinimizerError::DuplicateParameter { .. })));
    }

    #[test]
    // Purpose
    // -------
    // Check the path ↔ engine-name mapping in both directions.
    //
    // Given
    // -----
    // - A single path `src.spectrum.index`.
    //
    // Expect
    // ------
    // - Engine name `src_spectrum_index`, and the reverse lookup gives the path.
    fn name_map_round_trips_paths() {
        // Arrange
        let registry =
            ParameterRegistry::from_parameters([Parameter::new("src.spectrum.index", -2.0, 0.1).unwrap()])
                .unwrap();

        // Act
        let names = NameMap::from_registry(&registry).unwrap();
        let engine = names.engine_name("src.spectrum.index").unwrap();

        // Assert
        assert_eq!(engine.as_str(), "src_spectrum_index");
        assert_eq!(names.path_of(engine), Some("src.spectrum.index"));
    }
}
