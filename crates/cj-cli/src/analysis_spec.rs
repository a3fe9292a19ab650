//! Bridging analysis config (YAML) parsing + semantic validation.
//!
//! A single YAML file names the input tables and drives
//! estimate → bridge → aggregate.

use anyhow::{Context, Result, bail};
use cj_core::{ChoiceTable, CoefficientRow, CoefficientTable, Stage};
use cj_inference::{
    AggregateMethod, Alignment, BridgeConfig, ColumnMatch, EncoderConfig, EncodingMode,
    EstimatorConfig, OlsOptions, StageTwoInput,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const SPEC_V0: &str = "conjoint_bridge_v0";

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisSpecV0 {
    pub schema_version: String,
    pub inputs: Inputs,
    pub encoding: EncodingSection,
    #[serde(default)]
    pub stage_2_encoding: Option<EncodingSection>,
    pub bridge: BridgeSection,
    #[serde(default)]
    pub aggregate: AggregateSection,
    #[serde(default)]
    pub execution: Execution,
}

/// Input tables; paths are relative to the config file. Exactly one stage-2 source is set.
#[derive(Debug, Clone, Deserialize)]
pub struct Inputs {
    pub stage_1: PathBuf,
    #[serde(default)]
    pub stage_2_ratings: Option<PathBuf>,
    #[serde(default)]
    pub stage_2_choices: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncodingSection {
    pub predictors: Vec<String>,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub anchors: Vec<String>,
    #[serde(default = "default_matching")]
    pub matching: String,
    #[serde(default)]
    pub min_norm_fallback: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeSection {
    pub attributes: Vec<String>,
    #[serde(default)]
    pub alignment: Alignment,
    #[serde(default = "default_matching")]
    pub matching: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregateSection {
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub prob_mix: Vec<String>,
}

impl Default for AggregateSection {
    fn default() -> Self {
        Self { method: default_method(), prob_mix: Vec::new() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Execution {
    #[serde(default)]
    pub threads: usize,
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for Execution {
    fn default() -> Self {
        Self { threads: 0, parallel: true }
    }
}

fn default_mode() -> String {
    "reduced".to_string()
}

fn default_matching() -> String {
    "exact".to_string()
}

fn default_method() -> String {
    "mean".to_string()
}

fn default_true() -> bool {
    true
}

/// Stage-2 ratings file: rated columns plus one row of scores per respondent.
#[derive(Debug, Clone, Deserialize)]
struct RatingsFile {
    columns: Vec<String>,
    rows: Vec<CoefficientRow>,
}

/// Everything needed to run one bridged analysis.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub stage_1: ChoiceTable,
    pub stage_1_config: EstimatorConfig,
    pub stage_2: StageTwoInput,
    pub bridge: BridgeConfig,
    pub method: AggregateMethod,
    pub prob_mix: Vec<String>,
    pub threads: usize,
}

impl EncodingSection {
    fn to_estimator_config(&self, parallel: bool) -> Result<EstimatorConfig> {
        let mode = EncodingMode::from_name(&self.mode, &self.anchors)?;
        let matching: ColumnMatch = self.matching.parse()?;
        Ok(EstimatorConfig {
            encoder: EncoderConfig { predictors: self.predictors.clone(), mode, matching },
            ols: OlsOptions { min_norm_fallback: self.min_norm_fallback },
            parallel,
        })
    }
}

pub fn read_analysis_spec(path: &Path) -> Result<AnalysisSpecV0> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let spec: AnalysisSpecV0 = serde_yaml_ng::from_slice(&bytes)
        .with_context(|| format!("parsing {}", path.display()))?;
    if spec.schema_version != SPEC_V0 {
        bail!(
            "unsupported schema_version '{}' (expected '{}')",
            spec.schema_version,
            SPEC_V0
        );
    }
    Ok(spec)
}

pub fn read_choice_table(path: &Path) -> Result<ChoiceTable> {
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let table: ChoiceTable = serde_json::from_str(&json)
        .with_context(|| format!("parsing choice table {}", path.display()))?;
    table.validate()?;
    Ok(table)
}

pub fn read_ratings(path: &Path) -> Result<CoefficientTable> {
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let file: RatingsFile = serde_json::from_str(&json)
        .with_context(|| format!("parsing ratings table {}", path.display()))?;
    Ok(CoefficientTable::new(Stage::Stage2, file.columns, file.rows)?)
}

/// Resolve input paths against the config's directory and validate every section.
pub fn build_run_plan(spec: &AnalysisSpecV0, base_dir: &Path) -> Result<RunPlan> {
    let resolve = |p: &Path| if p.is_absolute() { p.to_path_buf() } else { base_dir.join(p) };

    let stage_1_config = spec.encoding.to_estimator_config(spec.execution.parallel)?;
    let stage_1 = read_choice_table(&resolve(&spec.inputs.stage_1))?;

    let stage_2 = match (&spec.inputs.stage_2_ratings, &spec.inputs.stage_2_choices) {
        (Some(p), None) => StageTwoInput::Ratings(read_ratings(&resolve(p))?),
        (None, Some(p)) => {
            let section = spec
                .stage_2_encoding
                .as_ref()
                .context("stage_2 choices need a `stage_2_encoding` section")?;
            StageTwoInput::Choices {
                table: read_choice_table(&resolve(p))?,
                config: section.to_estimator_config(spec.execution.parallel)?,
            }
        }
        (Some(_), Some(_)) => bail!("inputs: set only one of stage_2_ratings / stage_2_choices"),
        (None, None) => bail!("inputs: one of stage_2_ratings / stage_2_choices is required"),
    };

    let bridge = BridgeConfig {
        attributes: spec.bridge.attributes.clone(),
        alignment: spec.bridge.alignment,
        matching: spec.bridge.matching.parse()?,
    };
    let method: AggregateMethod = spec.aggregate.method.parse()?;

    Ok(RunPlan {
        stage_1,
        stage_1_config,
        stage_2,
        bridge,
        method,
        prob_mix: spec.aggregate.prob_mix.clone(),
        threads: spec.execution.threads,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
schema_version: conjoint_bridge_v0
inputs:
  stage_1: s1.json
  stage_2_ratings: s2.json
encoding:
  predictors: [speed, battery]
  mode: anchored
  anchors: [speed_slow]
bridge:
  attributes: [speed_slow, battery_short]
  alignment: positional
aggregate:
  method: median
  prob_mix: [speed_slow]
"#;

    #[test]
    fn parses_sections_and_defaults() {
        let spec: AnalysisSpecV0 = serde_yaml_ng::from_str(YAML).unwrap();
        assert_eq!(spec.schema_version, SPEC_V0);
        assert!(spec.inputs.stage_2_ratings.is_some());
        assert!(spec.inputs.stage_2_choices.is_none());
        assert_eq!(spec.bridge.alignment, Alignment::Positional);
        assert_eq!(spec.bridge.matching, "exact");
        assert_eq!(spec.execution.threads, 0);
        assert!(spec.execution.parallel);

        let cfg = spec.encoding.to_estimator_config(true).unwrap();
        assert_eq!(cfg.encoder.mode, EncodingMode::Anchored(vec!["speed_slow".into()]));
    }

    #[test]
    fn rejects_bad_mode_and_method() {
        let mut spec: AnalysisSpecV0 = serde_yaml_ng::from_str(YAML).unwrap();
        spec.encoding.mode = "sparse".into();
        let err = spec.encoding.to_estimator_config(true).unwrap_err();
        assert!(err.to_string().contains("anchored"), "{err}");

        spec.aggregate.method = "mode".into();
        assert!(spec.aggregate.method.parse::<AggregateMethod>().is_err());
    }
}
