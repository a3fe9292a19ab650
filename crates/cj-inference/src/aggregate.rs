//! Aggregation of final partworths across respondents.

use std::fmt;
use std::str::FromStr;

use cj_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::bridging::{FINAL_PREFIX, UnifiedPartworthTable};

/// Cross-respondent statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateMethod {
    /// Arithmetic mean
    #[default]
    Mean,
    /// Median (mean of the two middle values for even counts)
    Median,
}

impl AggregateMethod {
    /// Method name.
    pub fn name(self) -> &'static str {
        match self {
            AggregateMethod::Mean => "mean",
            AggregateMethod::Median => "median",
        }
    }

    /// Apply the statistic to a non-empty slice.
    pub fn apply(self, values: &[f64]) -> f64 {
        match self {
            AggregateMethod::Mean => values.iter().sum::<f64>() / values.len() as f64,
            AggregateMethod::Median => {
                let mut v = values.to_vec();
                v.sort_by(f64::total_cmp);
                let m = v.len() / 2;
                if v.len() % 2 == 0 { 0.5 * (v[m - 1] + v[m]) } else { v[m] }
            }
        }
    }
}

impl FromStr for AggregateMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mean" => Ok(AggregateMethod::Mean),
            "median" => Ok(AggregateMethod::Median),
            other => Err(Error::Configuration(format!(
                "invalid statistic '{}'; valid options are 'mean' and 'median'",
                other
            ))),
        }
    }
}

impl fmt::Display for AggregateMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Aggregated final partworths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartworthSummary {
    /// Statistic used
    pub method: AggregateMethod,
    /// Number of respondents aggregated
    pub n_respondents: usize,
    /// Final column names (`fin_*`)
    pub columns: Vec<String>,
    /// One aggregate value per column
    pub values: Vec<f64>,
}

impl PartworthSummary {
    /// Aggregate the final columns of `table`.
    pub fn from_table(table: &UnifiedPartworthTable, method: AggregateMethod) -> Result<Self> {
        if table.is_empty() {
            return Err(Error::Validation("no respondents to aggregate".into()));
        }
        table.validate()?;
        let columns: Vec<String> = table.final_columns().into_iter().map(str::to_string).collect();
        let values = columns
            .iter()
            .map(|c| {
                let col = table
                    .column(c)
                    .ok_or_else(|| Error::NotFound(format!("column '{}'", c)))?;
                Ok(method.apply(&col))
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(Self { method, n_respondents: table.len(), columns, values })
    }

    /// Aggregate value of a final column; the `fin_` prefix is optional.
    pub fn get(&self, name: &str) -> Option<f64> {
        let j = self.columns.iter().position(|c| c == name).or_else(|| {
            let prefixed = format!("{}{}", FINAL_PREFIX, name);
            self.columns.iter().position(|c| *c == prefixed)
        })?;
        Some(self.values[j])
    }

    /// Total utility of an alternative composed of the given levels.
    pub fn prob_mix<S: AsRef<str>>(&self, cols: &[S]) -> Result<f64> {
        cols.iter()
            .map(|c| {
                let c = c.as_ref();
                self.get(c).ok_or_else(|| {
                    Error::NotFound(format!("final partworth column '{}' not found", c))
                })
            })
            .sum()
    }

    /// `(column, value)` pairs sorted ascending by value.
    pub fn ranking(&self) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> =
            self.columns.iter().cloned().zip(self.values.iter().copied()).collect();
        out.sort_by(|a, b| a.1.total_cmp(&b.1));
        out
    }
}

/// Aggregate then sum the chosen final columns.
pub fn prob_mix<S: AsRef<str>>(
    table: &UnifiedPartworthTable,
    cols: &[S],
    method: AggregateMethod,
) -> Result<f64> {
    PartworthSummary::from_table(table, method)?.prob_mix(cols)
}
