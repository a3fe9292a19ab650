//! Single-stage (pooled) conjoint analysis.
//!
//! All observations of one choice table are encoded and fitted by a single OLS
//! regression. The partworth listing carries the significance flag and ordering
//! a bar-chart renderer needs; rendering itself is left to the caller.

use cj_core::{ChoiceTable, Error, Result};
use serde::Serialize;

use crate::encoder::{AttributeEncoder, DesignMatrix, EncoderConfig, target_vector};
use crate::regression::{OlsFit, OlsOptions, ols_fit};

/// Significance level used for partworth flags.
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// One partworth with its significance flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartworthEntry {
    /// Encoded column name
    pub name: String,
    /// Coefficient
    pub weight: f64,
    /// `|weight|`
    pub abs_weight: f64,
    /// Two-sided p-value
    pub p_value: f64,
    /// `p_value < 0.05`
    pub significant_95: bool,
}

/// Pooled single-stage analysis.
#[derive(Debug, Clone)]
pub struct SimpleConjoint {
    design: DesignMatrix,
    target: Vec<f64>,
    fit: OlsFit,
}

impl SimpleConjoint {
    /// Encode `table` and fit the pooled model.
    pub fn fit(table: &ChoiceTable, encoder: &EncoderConfig, ols: OlsOptions) -> Result<Self> {
        let enc = AttributeEncoder::from_table(table, encoder)?;
        let design = enc.encode(table)?;
        let rows: Vec<usize> = (0..table.observations.len()).collect();
        let target = target_vector(table, &rows);
        let fit = ols_fit(&design, &target, ols)?;
        Ok(Self { design, target, fit })
    }

    /// Encoded design matrix.
    pub fn design(&self) -> &DesignMatrix {
        &self.design
    }

    /// 0/1 target vector.
    pub fn target(&self) -> &[f64] {
        &self.target
    }

    /// Underlying regression.
    pub fn regression(&self) -> &OlsFit {
        &self.fit
    }

    /// Partworths sorted ascending by `|weight|`.
    pub fn partworths(&self) -> Vec<PartworthEntry> {
        let mut out: Vec<PartworthEntry> = self
            .fit
            .names
            .iter()
            .zip(&self.fit.coefficients)
            .zip(&self.fit.p_values)
            .map(|((name, &w), &p)| PartworthEntry {
                name: name.clone(),
                weight: w,
                abs_weight: w.abs(),
                p_value: p,
                significant_95: p < SIGNIFICANCE_LEVEL,
            })
            .collect();
        out.sort_by(|a, b| a.abs_weight.total_cmp(&b.abs_weight));
        out
    }

    /// Total worth of an alternative with the given levels, rounded to 3 decimals.
    pub fn prob_mix<S: AsRef<str>>(&self, cols: &[S]) -> Result<f64> {
        let mut total = 0.0;
        for c in cols {
            let c = c.as_ref();
            total += self
                .fit
                .coefficient(c)
                .ok_or_else(|| Error::NotFound(format!("coefficient '{}' not found", c)))?;
        }
        Ok((total * 1000.0).round() / 1000.0)
    }
}
