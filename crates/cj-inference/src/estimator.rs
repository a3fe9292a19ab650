//! Per-respondent utility estimation.
//!
//! Observations are partitioned by respondent and every respondent gets an
//! independent OLS fit on the shared encoded design. Fits run on the Rayon pool;
//! results are collected in first-encounter order, so output never depends on
//! scheduling.
//!
//! Respondents whose fit fails (too few observations, collinear design) are
//! reported in [`StageEstimate::failures`] and left out of the coefficient table.

use cj_core::{ChoiceTable, CoefficientRow, CoefficientTable, RespondentFailure, Result, Stage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::encoder::{AttributeEncoder, EncoderConfig, target_vector};
use crate::regression::{OlsFit, OlsOptions, ols_fit};

/// Estimator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Attribute encoding.
    pub encoder: EncoderConfig,
    /// OLS solver options.
    #[serde(default)]
    pub ols: OlsOptions,
    /// Fit respondents in parallel.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_parallel() -> bool {
    true
}

impl EstimatorConfig {
    /// Config with default solver options and parallel fitting.
    pub fn new(encoder: EncoderConfig) -> Self {
        Self { encoder, ols: OlsOptions::default(), parallel: true }
    }
}

/// One respondent's fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RespondentFit {
    /// Respondent identifier
    pub respondent: String,
    /// OLS result over the respondent's observations
    pub fit: OlsFit,
}

/// Output of estimating one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageEstimate {
    /// Stage estimated
    pub stage: Stage,
    /// Encoded columns shared by every fit
    pub columns: Vec<String>,
    /// Every respondent of the input, in first-encounter order, failed ones included
    pub respondents: Vec<String>,
    /// Successful fits, in first-encounter order
    pub fits: Vec<RespondentFit>,
    /// Respondents that could not be fitted
    pub failures: Vec<RespondentFailure>,
}

impl StageEstimate {
    /// Partworth table of the successful fits.
    pub fn coefficient_table(&self) -> Result<CoefficientTable> {
        let rows = self
            .fits
            .iter()
            .map(|f| CoefficientRow {
                respondent: f.respondent.clone(),
                values: f.fit.coefficients.clone(),
            })
            .collect();
        CoefficientTable::new(self.stage, self.columns.clone(), rows)
    }

    /// `true` if every respondent was fitted.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fits one linear utility model per respondent.
#[derive(Debug, Clone)]
pub struct UtilityEstimator {
    stage: Stage,
    encoder: AttributeEncoder,
    ols: OlsOptions,
    parallel: bool,
}

impl UtilityEstimator {
    /// Build the estimator for `table`; the encoder schema is derived from the full table.
    pub fn new(table: &ChoiceTable, stage: Stage, config: &EstimatorConfig) -> Result<Self> {
        let encoder = AttributeEncoder::from_table(table, &config.encoder)?;
        Ok(Self { stage, encoder, ols: config.ols, parallel: config.parallel })
    }

    /// Encoder in use.
    pub fn encoder(&self) -> &AttributeEncoder {
        &self.encoder
    }

    /// Fit every respondent of `table`.
    pub fn estimate(&self, table: &ChoiceTable) -> StageEstimate {
        let groups = table.group_by_respondent();
        let respondents: Vec<String> = groups.iter().map(|(id, _)| id.to_string()).collect();

        let fit_one = |(id, rows): &(&str, Vec<usize>)| -> std::result::Result<RespondentFit, RespondentFailure> {
            let x = self
                .encoder
                .encode_rows(table, rows)
                .map_err(|e| RespondentFailure::new(*id, Some(self.stage), e))?;
            let y = target_vector(table, rows);
            let fit = ols_fit(&x, &y, self.ols)
                .map_err(|e| RespondentFailure::new(*id, Some(self.stage), e))?;
            Ok(RespondentFit { respondent: id.to_string(), fit })
        };

        let results: Vec<_> = if self.parallel {
            groups.par_iter().map(fit_one).collect()
        } else {
            groups.iter().map(fit_one).collect()
        };

        let mut fits = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for r in results {
            match r {
                Ok(f) => fits.push(f),
                Err(e) => {
                    log::warn!("skipping {}", e);
                    failures.push(e);
                }
            }
        }
        log::debug!(
            "{}: fitted {} respondents ({} failed) over {} columns",
            self.stage,
            fits.len(),
            failures.len(),
            self.encoder.columns().len()
        );

        StageEstimate { stage: self.stage, columns: self.encoder.columns(), respondents, fits, failures }
    }
}

/// Build an estimator for `table` and fit every respondent.
pub fn estimate_partworths(
    table: &ChoiceTable,
    stage: Stage,
    config: &EstimatorConfig,
) -> Result<StageEstimate> {
    Ok(UtilityEstimator::new(table, stage, config)?.estimate(table))
}
