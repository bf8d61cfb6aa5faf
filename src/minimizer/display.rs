//! minimizer::display — tabular rendering of fit results.
//!
//! Purpose
//! -------
//! Turn best-fit values, parabolic and asymmetric errors and correlation
//! matrices into plain-text tables, and hand them to a caller-chosen
//! [`TableSink`] instead of writing to stdout directly.
//!
//! Key behaviors
//! -------------
//! - [`format_with_error`] rounds the uncertainty to the Particle Data Group
//!   rule (two significant digits for leading digits 100–354, one for
//!   355–949) and the value to the same decimal place: `"3.0 +/- 0.7"`.
//! - [`format_asymmetric`] renders `"num -m +p"`, or `"(num -m +p)e+XX"`
//!   when the magnitude calls for a common exponent.
//! - Correlation coefficients are rendered with two decimals.
//!
//! Conventions
//! -----------
//! - A common exponent is used when the larger of `|value|` and the error
//!   is at least `1e5` or below `1e-4`.
use std::fmt::Write as _;

/// Column-aligned text table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self { columns: columns.into_iter().map(Into::into).collect(), rows: Vec::new() }
    }

    /// Append a row; short rows are padded with empty cells and long rows
    /// are truncated to the column count.
    pub fn push_row<S: Into<String>>(&mut self, cells: impl IntoIterator<Item = S>) {
        let mut row: Vec<String> = cells.into_iter().map(Into::into).take(self.columns.len()).collect();
        row.resize(self.columns.len(), String::new());
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Cell at `(row, column)` by column header.
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let c = self.columns.iter().position(|h| h == column)?;
        self.rows.get(row).map(|r| r[c].as_str())
    }

    pub fn render(&self) -> String {
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &self.rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }
        let mut out = String::new();
        let line = |out: &mut String, cells: &[String]| {
            let joined: Vec<String> =
                cells.iter().zip(&widths).map(|(c, &w)| format!("{c:<w$}")).collect();
            let _ = writeln!(out, "{}", joined.join("  ").trim_end());
        };
        line(&mut out, &self.columns);
        let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
        line(&mut out, &rule);
        for row in &self.rows {
            line(&mut out, row);
        }
        out
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

/// Destination of rendered tables.
pub trait TableSink: Send {
    fn display(&mut self, table: &Table);

    /// Free-text note printed after a table.
    fn note(&mut self, _text: &str) {}
}

/// Writes tables and notes to standard output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl TableSink for ConsoleSink {
    fn display(&mut self, table: &Table) {
        println!("{table}");
    }

    fn note(&mut self, text: &str) {
        println!("{text}");
    }
}

/// Keeps tables and notes in memory.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    pub tables: Vec<Table>,
    pub notes: Vec<String>,
}

impl TableSink for CollectingSink {
    fn display(&mut self, table: &Table) {
        self.tables.push(table.clone());
    }

    fn note(&mut self, text: &str) {
        self.notes.push(text.to_string());
    }
}

/// Rounded mantissas of `value` and `error` plus an optional common exponent.
#[derive(Debug, Clone, PartialEq)]
pub struct UncertaintyTokens {
    pub value: String,
    pub errors: Vec<String>,
    pub exponent: Option<String>,
}

/// Round `value` and one or more errors to the precision of the smallest
/// error under the Particle Data Group rule.
pub fn uncertainty_tokens(value: f64, errors: &[f64]) -> UncertaintyTokens {
    let reference = errors.iter().map(|e| e.abs()).filter(|e| e.is_finite() && *e > 0.0).fold(f64::INFINITY, f64::min);
    if !reference.is_finite() {
        return UncertaintyTokens {
            value: format!("{value}"),
            errors: errors.iter().map(|e| format!("{}", e.abs())).collect(),
            exponent: None,
        };
    }
    let last_digit = pdg_last_digit(reference);
    let magnitude = errors.iter().fold(value.abs(), |m, e| m.max(e.abs()));
    let order = magnitude.log10().floor() as i32;
    let common = if order >= 5 || order < -4 { order } else { 0 };
    let decimals = (common - last_digit).max(0) as usize;
    let scale = 10f64.powi(common);
    UncertaintyTokens {
        value: format!("{:.*}", decimals, value / scale),
        errors: errors.iter().map(|e| format!("{:.*}", decimals, e.abs() / scale)).collect(),
        exponent: (common != 0).then(|| format!("e{common:+03}")),
    }
}

/// Power of ten of the last significant digit kept for an error.
fn pdg_last_digit(error: f64) -> i32 {
    let order = error.log10().floor() as i32;
    let leading = (error / 10f64.powi(order - 2)).round() as i64;
    // 950..=999 rounds up to 1000, i.e. two digits at the next order.
    if leading <= 354 { order - 1 } else { order }
}

/// `"value +/- error"` with PDG rounding.
pub fn format_with_error(value: f64, error: f64) -> String {
    let t = uncertainty_tokens(value, &[error]);
    match t.exponent {
        Some(exp) => format!("({} +/- {}){exp}", t.value, t.errors[0]),
        None => format!("{} +/- {}", t.value, t.errors[0]),
    }
}

/// `"num -m +p"` (or `"(num -m +p)e+XX"`) for asymmetric errors.
pub fn format_asymmetric(value: f64, negative: f64, positive: f64) -> String {
    let t = uncertainty_tokens(value, &[negative, positive]);
    let body = format!("{} -{} +{}", t.value, t.errors[0], t.errors[1]);
    match t.exponent {
        Some(exp) => format!("({body}){exp}"),
        None => body,
    }
}

/// Correlation coefficient with two decimals.
pub fn format_correlation(value: f64) -> String {
    format!("{value:.2}")
}
