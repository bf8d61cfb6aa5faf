//! minimizer::transforms — bounded ↔ internal variable transforms.
//!
//! Purpose
//! -------
//! Map each declared variable between its *external* value (what the
//! objective sees, respecting bounds) and an *internal* value on the whole
//! real line (what the unconstrained solvers move). Both engines minimize in
//! internal space, so bounds are honored without constrained solvers.
//!
//! Key behaviors
//! -------------
//! - [`Bounds::Both`] uses the sine transform
//!   `ext = lo + (hi - lo) / 2 · (sin(int) + 1)`.
//! - [`Bounds::Lower`] uses `ext = lo - 1 + sqrt(int² + 1)`.
//! - [`Bounds::Upper`] uses `ext = hi + 1 - sqrt(int² + 1)`.
//! - [`Bounds::Free`] is the identity.
//!
//! Invariants & assumptions
//! ------------------------
//! - `to_external` always lands inside the bounds (it clamps rounding noise).
//! - `to_internal` clamps its input to the bounds first, so a value sitting on
//!   a bound maps to the edge of the internal domain instead of NaN.
//!
//! Conventions
//! -----------
//! - Derivatives `dext/dint` are used to map steps to internal space and
//!   to bring the internal covariance back to external space.
//!
//! Testing notes
//! -------------
//! - Unit tests check that every transform stays in range and that
//!   `to_external ∘ to_internal` is the identity inside the bounds.

/// Bound class of a declared variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bounds {
    Free,
    Lower(f64),
    Upper(f64),
    Both(f64, f64),
}

impl Bounds {
    /// Build the bound class from optional lower/upper limits.
    pub fn from_limits(lower: Option<f64>, upper: Option<f64>) -> Self {
        match (lower, upper) {
            (None, None) => Bounds::Free,
            (Some(lo), None) => Bounds::Lower(lo),
            (None, Some(hi)) => Bounds::Upper(hi),
            (Some(lo), Some(hi)) => Bounds::Both(lo, hi),
        }
    }

    pub fn lower(&self) -> Option<f64> {
        match *self {
            Bounds::Lower(lo) | Bounds::Both(lo, _) => Some(lo),
            _ => None,
        }
    }

    pub fn upper(&self) -> Option<f64> {
        match *self {
            Bounds::Upper(hi) | Bounds::Both(_, hi) => Some(hi),
            _ => None,
        }
    }

    /// Clamp `value` into the admissible range.
    pub fn clamp(&self, value: f64) -> f64 {
        let mut v = value;
        if let Some(lo) = self.lower() {
            v = v.max(lo);
        }
        if let Some(hi) = self.upper() {
            v = v.min(hi);
        }
        v
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower().map_or(true, |lo| value >= lo) && self.upper().map_or(true, |hi| value <= hi)
    }
}

/// Internal → external value.
pub fn to_external(bounds: Bounds, internal: f64) -> f64 {
    let ext = match bounds {
        Bounds::Free => internal,
        Bounds::Lower(lo) => lo - 1.0 + (internal * internal + 1.0).sqrt(),
        Bounds::Upper(hi) => hi + 1.0 - (internal * internal + 1.0).sqrt(),
        Bounds::Both(lo, hi) => lo + 0.5 * (hi - lo) * (internal.sin() + 1.0),
    };
    bounds.clamp(ext)
}

/// External → internal value.
pub fn to_internal(bounds: Bounds, external: f64) -> f64 {
    let ext = bounds.clamp(external);
    match bounds {
        Bounds::Free => ext,
        Bounds::Lower(lo) => {
            let shifted = ext - lo + 1.0;
            (shifted * shifted - 1.0).max(0.0).sqrt()
        }
        Bounds::Upper(hi) => {
            let shifted = hi - ext + 1.0;
            (shifted * shifted - 1.0).max(0.0).sqrt()
        }
        Bounds::Both(lo, hi) => {
            let span = hi - lo;
            if span <= 0.0 {
                return 0.0;
            }
            (2.0 * (ext - lo) / span - 1.0).clamp(-1.0, 1.0).asin()
        }
    }
}

/// Derivative `dext/dint` at the given internal value.
pub fn dext_dint(bounds: Bounds, internal: f64) -> f64 {
    match bounds {
        Bounds::Free => 1.0,
        Bounds::Lower(_) => internal / (internal * internal + 1.0).sqrt(),
        Bounds::Upper(_) => -internal / (internal * internal + 1.0).sqrt(),
        Bounds::Both(lo, hi) => 0.5 * (hi - lo) * internal.cos(),
    }
}

/// Map an external step size to internal space.
///
/// Uses the local derivative of the transform. Near a bound the derivative
/// vanishes, so the internal step is capped at `1.0` there.
pub fn internal_step(bounds: Bounds, external: f64, step: f64) -> f64 {
    if let Bounds::Free = bounds {
        return step;
    }
    let slope = dext_dint(bounds, to_internal(bounds, external)).abs();
    if slope > f64::EPSILON {
        (step / slope).min(1.0)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Range preservation of each bounded transform.
    // - Inverse consistency inside the bounds.
    // - Step mapping on the free class.
    //
    // They intentionally DO NOT cover:
    // - Engine-level use of the transforms (see engine tests).
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Verify that bounded transforms never leave the admissible range.
    //
    // Given
    // -----
    // - Internal values spread over [-50, 50] for every bound class.
    //
    // Expect
    // ------
    // - Every external value satisfies the bounds.
    fn to_external_stays_inside_bounds() {
        // Arrange
        let classes = [Bounds::Lower(-2.0), Bounds::Upper(3.0), Bounds::Both(0.5, 4.0)];

        // Act + Assert
        for bounds in classes {
            for k in -50..=50 {
                let ext = to_external(bounds, k as f64);
                assert!(bounds.contains(ext), "{bounds:?} produced {ext}");
            }
        }
    }

    #[test]
    // Purpose
    // -------
    // Ensure `to_external(to_internal(x))` recovers `x` inside the bounds.
    //
    // Given
    // -----
    // - Interior points for each bound class.
    //
    // Expect
    // ------
    // - Round trip agrees to 1e-10.
    fn internal_round_trip_recovers_interior_value() {
        // Arrange
        let cases = [
            (Bounds::Free, -7.25),
            (Bounds::Lower(1.0), 2.5),
            (Bounds::Upper(-1.0), -3.0),
            (Bounds::Both(-1.0, 1.0), 0.3),
        ];

        // Act + Assert
        for (bounds, x) in cases {
            let back = to_external(bounds, to_internal(bounds, x));
            assert!((back - x).abs() < 1e-10, "{bounds:?}: {x} -> {back}");
        }
    }

    #[test]
    // Purpose
    // -------
    // Check that a value on a bound maps to a finite internal value.
    //
    // Given
    // -----
    // - `x = hi` for a two-sided bound.
    //
    // Expect
    // ------
    // - The internal value is π/2 and maps back to `hi`.
    fn to_internal_on_bound_is_finite() {
        // Arrange
        let bounds = Bounds::Both(0.0, 2.0);

        // Act
        let int = to_internal(bounds, 2.0);

        // Assert
        assert!((int - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((to_external(bounds, int) - 2.0).abs() < 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // Verify that free variables keep their step size unchanged.
    //
    // Given
    // -----
    // - A free variable with step 0.25.
    //
    // Expect
    // ------
    // - The internal step equals 0.25.
    fn internal_step_identity_for_free_variables() {
        assert_eq!(internal_step(Bounds::Free, 10.0, 0.25), 0.25);
    }
}
