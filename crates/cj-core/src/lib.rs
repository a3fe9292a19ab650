//! # cj-core
//!
//! Core types for conjoint analysis.
//!
//! This crate provides:
//! - The error taxonomy shared by every crate in the workspace
//! - The survey data model (stages, attribute schemas, choice tables)
//! - Per-respondent coefficient tables consumed by the bridging engine

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    Attribute, AttributeSchema, ChoiceTable, CoefficientRow, CoefficientTable, Observation,
    RespondentFailure, Stage,
};

/// Crate version, shared by the CLI `version` command.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
