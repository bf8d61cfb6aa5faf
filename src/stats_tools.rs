//! stats_tools — information criteria and model comparison.
//!
//! Purpose
//! -------
//! Score fitted models against each other: AIC (with the small-sample
//! correction), BIC, DIC from posterior traces, and a comparison table over
//! several analyses of the same data.
//!
//! Key behaviors
//! -------------
//! - [`aic`] is `-2 ln L + 2k + 2k(k+1)/(n-k-1)`; the correction term is
//!   infinite when `n <= k + 1`.
//! - [`bic`] is `-2 ln L + k ln n`.
//! - [`dic`] is `2·mean(-2 ln P) - (-2 ln P(mean θ))` over a
//!   [`BayesianTrace`].
//! - [`delta_for_confidence`] turns a confidence level into the objective
//!   increase `0.5 · χ²⁻¹_dof(cl)` used to read contours.
//! - [`ModelComparison`] accepts only all-MLE or all-Bayesian collections and
//!   renders one row per model through a [`TableSink`].
//!
//! Invariants & assumptions
//! ------------------------
//! - `log_like` is the maximized log-likelihood (not its negative).
//! - Model names are taken from the second-to-last component of a dotted
//!   parameter path (`"src.powerlaw.index"` → `"powerlaw"`).
//!
//! Testing notes
//! -------------
//! - Unit tests check the formulas on hand-computed values, the χ² deltas at
//!   the usual confidence levels and the comparison error paths.
use crate::minimizer::{
    display::{Table, TableSink},
    errors::{MinResult, MinimizerError},
    results::BestFit,
};
use ndarray::{Array2, Axis};
use statrs::{
    distribution::{ChiSquared, ContinuousCDF},
    statistics::Statistics,
};
use std::cmp::Ordering;

/// Akaike information criterion with the small-sample correction.
pub fn aic(log_like: f64, n_parameters: usize, n_data_points: usize) -> f64 {
    let k = n_parameters as f64;
    let denominator = n_data_points as f64 - k - 1.0;
    let correction = if denominator > 0.0 { 2.0 * k * (k + 1.0) / denominator } else { f64::INFINITY };
    -2.0 * log_like + 2.0 * k + correction
}

/// Bayesian information criterion.
pub fn bic(log_like: f64, n_parameters: usize, n_data_points: usize) -> f64 {
    -2.0 * log_like + n_parameters as f64 * (n_data_points as f64).ln()
}

/// Posterior samples with their log-probabilities.
pub trait BayesianTrace {
    /// `ln P` of every sample.
    fn log_probability_values(&self) -> &[f64];

    /// `ln L` of every sample.
    fn log_like_values(&self) -> &[f64];

    /// Samples, one row per draw and one column per free parameter.
    fn raw_samples(&self) -> &Array2<f64>;

    /// `ln P` at an arbitrary parameter vector.
    fn log_probability(&self, theta: &[f64]) -> f64;
}

/// Deviance information criterion.
///
/// # Errors
/// [`MinimizerError::EmptyTrace`] when the trace has no samples.
pub fn dic<T: BayesianTrace + ?Sized>(trace: &T) -> MinResult<f64> {
    let log_probability = trace.log_probability_values();
    if log_probability.is_empty() || trace.raw_samples().nrows() == 0 {
        return Err(MinimizerError::EmptyTrace);
    }
    let mean_deviance = -2.0 * log_probability.mean();
    let mean_theta = trace.raw_samples().mean_axis(Axis(0)).ok_or(MinimizerError::EmptyTrace)?;
    let deviance_at_mean = -2.0 * trace.log_probability(&mean_theta.to_vec());
    Ok(2.0 * mean_deviance - deviance_at_mean)
}

/// Objective increase that bounds a `cl` confidence region in `dof`
/// parameters: `0.5 · χ²⁻¹_dof(cl)`.
///
/// # Errors
/// - [`MinimizerError::InvalidConfidence`] if `cl` is not in `(0, 1)`.
/// - [`MinimizerError::Distribution`] if `dof` is zero.
pub fn delta_for_confidence(cl: f64, dof: usize) -> MinResult<f64> {
    if !(cl > 0.0 && cl < 1.0) {
        return Err(MinimizerError::InvalidConfidence { cl, reason: "Confidence level must lie in (0, 1)." });
    }
    let chi2 = ChiSquared::new(dof as f64).map_err(|e| MinimizerError::Distribution { text: e.to_string() })?;
    Ok(0.5 * chi2.inverse_cdf(cl))
}

/// Second-to-last dotted component of a parameter path, or the path itself.
pub fn model_name_from_path(path: &str) -> &str {
    let mut parts = path.rsplit('.');
    let last = parts.next().unwrap_or(path);
    parts.next().unwrap_or(last)
}

/// Maximum-likelihood analysis to compare.
#[derive(Debug, Clone, PartialEq)]
pub struct MleSummary {
    pub model: String,
    /// `-ln L` at the minimum.
    pub minimum: f64,
    pub n_free_parameters: usize,
    pub n_data_points: usize,
}

impl MleSummary {
    /// Summary of a converged fit; the model is named after its first parameter.
    pub fn from_best_fit(best_fit: &BestFit, minimum: f64, n_data_points: usize) -> Self {
        let model = best_fit.keys().next().map_or("model", model_name_from_path).to_string();
        Self { model, minimum, n_free_parameters: best_fit.len(), n_data_points }
    }
}

/// Bayesian analysis to compare.
#[derive(Debug, Clone, PartialEq)]
pub struct BayesianSummary {
    pub model: String,
    /// Largest `ln L` over the trace.
    pub max_log_like: f64,
    pub dic: f64,
    pub log10_evidence: f64,
    pub n_free_parameters: usize,
    pub effective_free_parameters: f64,
    pub n_data_points: usize,
}

impl BayesianSummary {
    pub fn from_trace<T: BayesianTrace + ?Sized>(
        model: impl Into<String>, trace: &T, log10_evidence: f64, effective_free_parameters: f64,
        n_data_points: usize,
    ) -> MinResult<Self> {
        let max_log_like = trace.log_like_values().iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max_log_like.is_finite() {
            return Err(MinimizerError::EmptyTrace);
        }
        Ok(Self {
            model: model.into(),
            max_log_like,
            dic: dic(trace)?,
            log10_evidence,
            n_free_parameters: trace.raw_samples().ncols(),
            effective_free_parameters,
            n_data_points,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisSummary {
    Mle(MleSummary),
    Bayesian(BayesianSummary),
}

/// One row of the comparison table.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelStatistics {
    pub model: String,
    pub minus_two_log_like: f64,
    pub aic: f64,
    pub bic: f64,
    pub dic: Option<f64>,
    pub log10_evidence: Option<f64>,
    pub n_free_parameters: usize,
    pub effective_free_parameters: Option<f64>,
    pub dof: i64,
}

impl ModelStatistics {
    fn from_summary(summary: &AnalysisSummary) -> Self {
        match summary {
            AnalysisSummary::Mle(s) => {
                let log_like = -s.minimum;
                Self {
                    model: s.model.clone(),
                    minus_two_log_like: -2.0 * log_like,
                    aic: aic(log_like, s.n_free_parameters, s.n_data_points),
                    bic: bic(log_like, s.n_free_parameters, s.n_data_points),
                    dic: None,
                    log10_evidence: None,
                    n_free_parameters: s.n_free_parameters,
                    effective_free_parameters: None,
                    dof: s.n_data_points as i64 - s.n_free_parameters as i64,
                }
            }
            AnalysisSummary::Bayesian(s) => Self {
                model: s.model.clone(),
                minus_two_log_like: -2.0 * s.max_log_like,
                aic: aic(s.max_log_like, s.n_free_parameters, s.n_data_points),
                bic: bic(s.max_log_like, s.n_free_parameters, s.n_data_points),
                dic: Some(s.dic),
                log10_evidence: Some(s.log10_evidence),
                n_free_parameters: s.n_free_parameters,
                effective_free_parameters: Some(s.effective_free_parameters),
                dof: s.n_data_points as i64 - s.n_free_parameters as i64,
            },
        }
    }
}

/// Column a comparison can be sorted by (ascending).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Model,
    MinusTwoLogLike,
    Aic,
    Bic,
    Dic,
    Log10Evidence,
    FreeParameters,
    Dof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisKind {
    Mle,
    Bayesian,
}

/// Side-by-side statistics of several analyses.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelComparison {
    kind: AnalysisKind,
    rows: Vec<ModelStatistics>,
}

impl ModelComparison {
    /// # Errors
    /// - [`MinimizerError::EmptyComparison`] for an empty collection.
    /// - [`MinimizerError::MixedAnalysisTypes`] when MLE and Bayesian
    ///   analyses are mixed.
    pub fn new(analyses: &[AnalysisSummary]) -> MinResult<Self> {
        let first = analyses.first().ok_or(MinimizerError::EmptyComparison)?;
        let kind = match first {
            AnalysisSummary::Mle(_) => AnalysisKind::Mle,
            AnalysisSummary::Bayesian(_) => AnalysisKind::Bayesian,
        };
        let mixed = analyses.iter().any(|a| {
            !matches!(
                (kind, a),
                (AnalysisKind::Mle, AnalysisSummary::Mle(_)) | (AnalysisKind::Bayesian, AnalysisSummary::Bayesian(_))
            )
        });
        if mixed {
            return Err(MinimizerError::MixedAnalysisTypes);
        }
        Ok(Self { kind, rows: analyses.iter().map(ModelStatistics::from_summary).collect() })
    }

    pub fn kind(&self) -> AnalysisKind {
        self.kind
    }

    pub fn rows(&self) -> &[ModelStatistics] {
        &self.rows
    }

    /// Rows sorted ascending by `key`; the sort is stable.
    pub fn sorted_by(&self, key: SortKey) -> Vec<ModelStatistics> {
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| compare(a, b, key));
        rows
    }

    /// Render the comparison with `precision` decimals, optionally sorted.
    pub fn report(&self, sort: Option<SortKey>, precision: usize, sink: &mut dyn TableSink) {
        let rows = match sort {
            Some(key) => self.sorted_by(key),
            None => self.rows.clone(),
        };
        let columns: &[&str] = match self.kind {
            AnalysisKind::Mle => &["Model", "-2 ln(like)", "AIC", "BIC", "N. Free Parameters", "dof"],
            AnalysisKind::Bayesian => &[
                "Model",
                "-2 ln(like)",
                "AIC",
                "BIC",
                "DIC",
                "log10 (Z)",
                "N. Free Parameters",
                "Eff. N. Free Parameters",
                "dof",
            ],
        };
        let fixed = |v: f64| format!("{v:.precision$}");
        let mut table = Table::new(columns.iter().copied());
        for row in &rows {
            let mut cells = vec![row.model.clone(), fixed(row.minus_two_log_like), fixed(row.aic), fixed(row.bic)];
            if self.kind == AnalysisKind::Bayesian {
                cells.push(row.dic.map_or_else(String::new, fixed));
                cells.push(row.log10_evidence.map_or_else(String::new, fixed));
            }
            cells.push(row.n_free_parameters.to_string());
            if self.kind == AnalysisKind::Bayesian {
                cells.push(row.effective_free_parameters.map_or_else(String::new, fixed));
            }
            cells.push(row.dof.to_string());
            table.push_row(cells);
        }
        sink.display(&table);
    }
}

fn compare(a: &ModelStatistics, b: &ModelStatistics, key: SortKey) -> Ordering {
    let by = |x: f64, y: f64| x.total_cmp(&y);
    let opt = |x: Option<f64>, y: Option<f64>| by(x.unwrap_or(f64::INFINITY), y.unwrap_or(f64::INFINITY));
    match key {
        SortKey::Model => a.model.cmp(&b.model),
        SortKey::MinusTwoLogLike => by(a.minus_two_log_like, b.minus_two_log_like),
        SortKey::Aic => by(a.aic, b.aic),
        SortKey::Bic => by(a.bic, b.bic),
        SortKey::Dic => opt(a.dic, b.dic),
        SortKey::Log10Evidence => opt(a.log10_evidence, b.log10_evidence),
        SortKey::FreeParameters => a.n_free_parameters.cmp(&b.n_free_parameters),
        SortKey::Dof => a.dof.cmp(&b.dof),
    }
}
