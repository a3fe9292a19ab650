//! # cj-inference
//!
//! Utility estimation and bridging for choice-based conjoint analysis.
//!
//! This crate provides:
//! - Dummy encoding of categorical attributes (`full`, `reduced`, `anchored`)
//! - Per-respondent OLS partworth estimation (parallel over respondents)
//! - Two-stage bridging onto one common utility scale
//! - Mean/median aggregation and total-utility queries
//! - A pooled single-stage analysis
//!
//! ## Architecture
//!
//! Data types and errors live in `cj-core`; this crate only computes. Nothing
//! here touches the file system: tables come in as values, results go out as
//! values, and loading/rendering belong to the caller.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Final-partworth aggregation and `prob_mix` queries.
pub mod aggregate;
/// Ratio-based bridging of stage-1 and stage-2 partworths.
pub mod bridging;
/// Categorical attribute encoding.
pub mod encoder;
/// Per-respondent utility estimation.
pub mod estimator;
/// Estimate → bridge → aggregate in one call.
pub mod pipeline;
/// OLS with standard errors and p-values.
pub mod regression;
/// Pooled single-stage conjoint.
pub mod simple;

pub use aggregate::{AggregateMethod, PartworthSummary, prob_mix};
pub use bridging::{
    Alignment, BridgeConfig, BridgingEngine, BridgingOutcome, ColumnKind, ColumnRole,
    UnifiedColumn, UnifiedPartworthTable, bridge,
};
pub use encoder::{AttributeEncoder, ColumnMatch, DesignMatrix, EncoderConfig, EncodingMode};
pub use estimator::{
    EstimatorConfig, RespondentFit, StageEstimate, UtilityEstimator, estimate_partworths,
};
pub use pipeline::{BridgedAnalysis, StageTwoInput, run_bridged_analysis};
pub use regression::{OlsFit, OlsOptions, ols_fit};
pub use simple::{PartworthEntry, SimpleConjoint};
