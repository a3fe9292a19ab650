//! End-to-end two-stage analysis: estimate, bridge, aggregate.

use std::collections::BTreeSet;

use cj_core::{ChoiceTable, CoefficientTable, Error, RespondentFailure, Result, Stage};
use serde::Serialize;

use crate::aggregate::{AggregateMethod, PartworthSummary};
use crate::bridging::{BridgeConfig, BridgingEngine, BridgingOutcome};
use crate::estimator::{EstimatorConfig, StageEstimate, estimate_partworths};

/// Where stage-2 values come from.
#[derive(Debug, Clone)]
pub enum StageTwoInput {
    /// Self-rating scores, used as-is.
    Ratings(CoefficientTable),
    /// A second choice table, estimated like stage 1.
    Choices {
        /// Stage-2 observations
        table: ChoiceTable,
        /// Stage-2 estimator settings
        config: EstimatorConfig,
    },
}

/// Result of [`run_bridged_analysis`].
#[derive(Debug, Clone, Serialize)]
pub struct BridgedAnalysis {
    /// Stage-1 per-respondent fits
    pub stage_1: StageEstimate,
    /// Stage-2 fits, when stage 2 was estimated from choices
    pub stage_2: Option<StageEstimate>,
    /// Bridged table, debug map and bridging failures
    pub bridging: BridgingOutcome,
    /// Every failed respondent, across estimation and bridging
    pub failures: Vec<RespondentFailure>,
}

impl BridgedAnalysis {
    /// Aggregate the final partworths.
    pub fn summary(&self, method: AggregateMethod) -> Result<PartworthSummary> {
        PartworthSummary::from_table(&self.bridging.table, method)
    }

    /// Total utility of an alternative built from `cols`.
    pub fn prob_mix<S: AsRef<str>>(&self, cols: &[S], method: AggregateMethod) -> Result<f64> {
        self.summary(method)?.prob_mix(cols)
    }
}

/// Estimate stage 1 (and stage 2 if given as choices), then bridge.
///
/// A respondent that failed estimation is reported once; the bridging step's
/// "missing row" report for the same respondent is dropped.
pub fn run_bridged_analysis(
    stage_1: &ChoiceTable,
    stage_1_config: &EstimatorConfig,
    stage_2: StageTwoInput,
    bridge: &BridgeConfig,
) -> Result<BridgedAnalysis> {
    let engine = BridgingEngine::new(bridge.clone())?;

    let s1 = estimate_partworths(stage_1, Stage::Stage1, stage_1_config)?;
    let (s2_table, s2_order, s2_estimate) = match stage_2 {
        StageTwoInput::Ratings(table) => {
            if table.stage != Stage::Stage2 {
                return Err(Error::Validation(format!(
                    "ratings table is labelled {}, expected stage_2",
                    table.stage
                )));
            }
            let order: Vec<String> = table.rows.iter().map(|r| r.respondent.clone()).collect();
            (table, order, None)
        }
        StageTwoInput::Choices { table, config } => {
            let est = estimate_partworths(&table, Stage::Stage2, &config)?;
            (est.coefficient_table()?, est.respondents.clone(), Some(est))
        }
    };

    // Failed respondents keep their slot, so positional pairing stays aligned.
    let bridging =
        engine.run_with_order(&s1.coefficient_table()?, &s2_table, &s1.respondents, &s2_order)?;

    let mut failures: Vec<RespondentFailure> = s1.failures.clone();
    if let Some(est) = &s2_estimate {
        failures.extend(est.failures.iter().cloned());
    }
    let estimation_failed: BTreeSet<String> =
        failures.iter().map(|f| f.respondent.clone()).collect();
    failures.extend(
        bridging
            .failures
            .iter()
            .filter(|f| {
                !(matches!(f.error, Error::NotFound(_)) && estimation_failed.contains(&f.respondent))
            })
            .cloned(),
    );

    Ok(BridgedAnalysis { stage_1: s1, stage_2: s2_estimate, bridging, failures })
}
