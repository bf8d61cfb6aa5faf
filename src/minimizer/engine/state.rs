//! Engine state shared by the managed and native bindings.
//!
//! [`EngineCore`] owns the declared variables, their current external values,
//! the engine settings and the last computed `fval`, EDM and covariance. The
//! bindings differ only in how they bind the objective (an [`Evaluator`]) and
//! in the solver they run; everything else lives here.
use crate::minimizer::{
    engine::{
        EngineBlueprint, EngineSettings, VariableDecl,
        adapter::{CostSurface, Evaluator},
    },
    errors::{MinResult, MinimizerError},
    numerics::{derivative_steps, estimated_distance, invert_positive_definite, value_gradient, value_hessian},
    objective::{Objective, PositionTable},
    parameters::EngineName,
    results::Covariance,
    transforms::{Bounds, dext_dint, internal_step, to_internal},
    types::{Hessian, Theta},
};

#[derive(Debug, Clone)]
pub(crate) struct EngineCore {
    objective: Objective,
    positions: PositionTable,
    variables: Vec<VariableDecl>,
    values: Vec<f64>,
    settings: EngineSettings,
    fval: f64,
    edm: f64,
    covariance: Option<Covariance>,
}

impl EngineCore {
    pub(crate) fn from_blueprint(blueprint: &EngineBlueprint) -> MinResult<Self> {
        blueprint.settings().validate()?;
        let values = blueprint.variables().iter().map(|v| v.value).collect();
        Ok(Self {
            objective: blueprint.objective().clone(),
            positions: blueprint.positions().clone(),
            variables: blueprint.variables().to_vec(),
            values,
            settings: *blueprint.settings(),
            fval: f64::NAN,
            edm: f64::INFINITY,
            covariance: None,
        })
    }

    pub(crate) fn blueprint(&self) -> EngineBlueprint {
        let variables = self
            .variables
            .iter()
            .zip(&self.values)
            .map(|(decl, &value)| VariableDecl { value, ..decl.clone() })
            .collect();
        EngineBlueprint::from_parts(
            self.objective.clone(),
            self.positions.clone(),
            variables,
            self.settings,
        )
    }

    /// Append a variable; `index` must be the next free slot.
    pub(crate) fn push(
        &mut self, index: usize, name: &EngineName, value: f64, step: f64, bounds: Bounds,
    ) -> MinResult<()> {
        if index != self.variables.len() {
            return Err(MinimizerError::VariableIndexMismatch {
                expected: self.variables.len(),
                found: index,
            });
        }
        if self.variables.iter().any(|v| &v.name == name) {
            return Err(MinimizerError::DuplicateParameter { name: name.to_string() });
        }
        let decl = VariableDecl::new(name.clone(), value, step, bounds)?;
        self.values.push(decl.value);
        self.variables.push(decl);
        self.fval = f64::NAN;
        self.edm = f64::INFINITY;
        self.covariance = None;
        Ok(())
    }

    pub(crate) fn objective(&self) -> &Objective {
        &self.objective
    }

    pub(crate) fn positions(&self) -> &PositionTable {
        &self.positions
    }

    pub(crate) fn variables(&self) -> &[VariableDecl] {
        &self.variables
    }

    pub(crate) fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub(crate) fn settings_mut(&mut self) -> &mut EngineSettings {
        &mut self.settings
    }

    pub(crate) fn values(&self) -> &[f64] {
        &self.values
    }

    pub(crate) fn fval(&self) -> f64 {
        self.fval
    }

    pub(crate) fn edm(&self) -> f64 {
        self.edm
    }

    pub(crate) fn covariance(&self) -> Option<&Covariance> {
        self.covariance.as_ref()
    }

    pub(crate) fn index_of(&self, name: &EngineName) -> Option<usize> {
        self.variables.iter().position(|v| &v.name == name)
    }

    pub(crate) fn free_indices(&self) -> Vec<usize> {
        self.variables.iter().enumerate().filter(|(_, v)| !v.fixed).map(|(i, _)| i).collect()
    }

    pub(crate) fn n_free(&self) -> usize {
        self.variables.iter().filter(|v| !v.fixed).count()
    }

    /// Overwrite the current value of a variable, clamped to its bounds.
    pub(crate) fn set_value(&mut self, index: usize, value: f64) -> MinResult<()> {
        let decl = self.variables.get(index).ok_or(MinimizerError::VariableIndexMismatch {
            expected: self.variables.len(),
            found: index,
        })?;
        if !value.is_finite() {
            return Err(MinimizerError::InvalidValue {
                name: decl.name.to_string(),
                value,
                reason: "Value must be finite.",
            });
        }
        self.values[index] = decl.bounds.clamp(value);
        Ok(())
    }

    /// Cost surface over the free variables at the current values.
    pub(crate) fn surface(&self, evaluator: Evaluator) -> CostSurface {
        let free = self.free_indices();
        let bounds = free.iter().map(|&i| self.variables[i].bounds).collect();
        CostSurface::new(evaluator, self.values.clone(), free, bounds)
    }

    /// Current free values in internal space.
    pub(crate) fn internal_theta(&self) -> Theta {
        self.free_indices()
            .into_iter()
            .map(|i| to_internal(self.variables[i].bounds, self.values[i]))
            .collect()
    }

    /// Declared step sizes mapped to internal space.
    pub(crate) fn internal_steps(&self) -> Theta {
        self.free_indices()
            .into_iter()
            .map(|i| {
                let v = &self.variables[i];
                internal_step(v.bounds, self.values[i], v.step)
            })
            .collect()
    }

    /// Adopt an internal point as the current position.
    pub(crate) fn accept(&mut self, surface: &CostSurface, theta: &Theta) {
        self.values = surface.external(theta);
    }

    /// Recompute `fval` and the EDM at the current position.
    ///
    /// A failure to build derivatives is not an error: the EDM becomes `+∞`
    /// and the convergence controller treats the pass as not converged.
    pub(crate) fn refresh(&mut self, surface: &CostSurface) -> MinResult<()> {
        let theta = self.internal_theta();
        self.fval = surface.value(&theta)?;
        if theta.is_empty() {
            self.edm = 0.0;
            return Ok(());
        }
        let cost = |t: &Theta| surface.value_or_nan(t);
        let steps = derivative_steps(&theta, &self.internal_steps());
        let derivatives = value_gradient(&theta, &steps, &cost)
            .and_then(|g| value_hessian(&theta, &steps, &cost).map(|h| (g, h)));
        self.edm = match derivatives {
            Ok((grad, hess)) => estimated_distance(&grad, &hess),
            Err(err) => {
                log::debug!("EDM unavailable at the current point: {err}");
                f64::INFINITY
            }
        };
        Ok(())
    }

    /// HESSE: covariance `2 · up · H⁻¹` mapped back to external space.
    ///
    /// Leaves `covariance` at `None` when the Hessian is not positive-definite.
    pub(crate) fn hesse(&mut self, surface: &CostSurface) -> MinResult<()> {
        let theta = self.internal_theta();
        let free = self.free_indices();
        let names: Vec<EngineName> = free.iter().map(|&i| self.variables[i].name.clone()).collect();
        if theta.is_empty() {
            self.covariance = Some(Covariance::new(names, Hessian::zeros((0, 0)))?);
            return Ok(());
        }
        let cost = |t: &Theta| surface.value_or_nan(t);
        let hess = value_hessian(&theta, &derivative_steps(&theta, &self.internal_steps()), &cost)?;
        self.covariance = match invert_positive_definite(&hess) {
            Some(inv) => {
                let jac: Vec<f64> = free
                    .iter()
                    .enumerate()
                    .map(|(k, &i)| dext_dint(self.variables[i].bounds, theta[k]))
                    .collect();
                let scale = 2.0 * self.settings.error_def;
                let mut cov = inv;
                for ((r, c), v) in cov.indexed_iter_mut() {
                    *v *= scale * jac[r] * jac[c];
                }
                Some(Covariance::new(names, cov)?)
            }
            None => {
                log::debug!("Hessian is not positive-definite; covariance unavailable");
                None
            }
        };
        Ok(())
    }
}
