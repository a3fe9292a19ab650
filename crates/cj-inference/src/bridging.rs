//! Two-stage bridging of partworths onto one utility scale.
//!
//! Stage 1 (conjoint) and stage 2 (self-rating) are measured on independent
//! scales. Two bridge attributes appear in both stages; per respondent their
//! summed values give the bridging ratio
//!
//! ```text
//! b_val         = (s1[bridge_1] + s1[bridge_2]) / (s2[bridge_1] + s2[bridge_2])
//! b_val_inverse = 1 / b_val
//! ```
//!
//! Every stage-1 column is carried onto the stage-2 scale with `b_val_inverse`,
//! every stage-2 column onto the stage-1 scale with `b_val`. A non-bridge final
//! partworth is its own value plus its transform; a bridge final is the sum of
//! its two transforms.
//!
//! # References
//!
//! - Louviere, *Conjoint analysis bridging designs*.
//! - Francois & Maclachlan (1999), bridged conjoint / self-explicated designs.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use cj_core::{CoefficientRow, CoefficientTable, Error, RespondentFailure, Result, Stage};
use serde::{Deserialize, Serialize};

use crate::encoder::ColumnMatch;

/// How stage-1 and stage-2 rows are paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    /// Join on respondent identifier.
    #[default]
    ById,
    /// Pair rows by position; the identifier comes from stage 1.
    Positional,
}

/// Bridging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// The two bridge attribute (column) names present in both stages.
    pub attributes: Vec<String>,
    /// Row pairing rule.
    #[serde(default)]
    pub alignment: Alignment,
    /// Bridge-name to column matching rule.
    #[serde(default)]
    pub matching: ColumnMatch,
}

impl BridgeConfig {
    /// Exact-match, id-aligned config for two bridge attributes.
    pub fn new(bridge_1: impl Into<String>, bridge_2: impl Into<String>) -> Self {
        Self {
            attributes: vec![bridge_1.into(), bridge_2.into()],
            alignment: Alignment::ById,
            matching: ColumnMatch::Exact,
        }
    }
}

/// Processing branch a column went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    /// Bridge attribute
    Bridge,
    /// Non-bridge stage-1 column
    #[serde(rename = "stage_1")]
    Stage1,
    /// Non-bridge stage-2 column
    #[serde(rename = "stage_2")]
    Stage2,
    /// Bookkeeping column, not transformed
    Skipped,
}

/// What a unified-table column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Input value as measured in this stage.
    Original(Stage),
    /// `b_val` or `b_val_inverse`.
    Ratio,
    /// Value carried onto this stage's scale.
    Transformed(Stage),
    /// Final merged partworth (`fin_`).
    Final,
}

/// Named column of a [`UnifiedPartworthTable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedColumn {
    /// Column name
    pub name: String,
    /// Column kind
    pub kind: ColumnKind,
}

/// Final merged partworth prefix.
pub const FINAL_PREFIX: &str = "fin_";

/// Per-respondent originals, transforms and final partworths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedPartworthTable {
    /// Column layout shared by every row
    pub columns: Vec<UnifiedColumn>,
    /// One row per bridged respondent
    pub rows: Vec<CoefficientRow>,
}

impl UnifiedPartworthTable {
    /// Index of a column by exact name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Value at (respondent, column).
    pub fn value(&self, respondent: &str, column: &str) -> Option<f64> {
        let j = self.column_index(column)?;
        self.rows.iter().find(|r| r.respondent == respondent)?.values.get(j).copied()
    }

    /// All values of a column, in row order; `None` if a row is too short.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let j = self.column_index(name)?;
        self.rows.iter().map(|r| r.values.get(j).copied()).collect()
    }

    /// Check that every row has one value per column.
    pub fn validate(&self) -> Result<()> {
        match self.rows.iter().find(|r| r.values.len() != self.columns.len()) {
            Some(r) => Err(Error::Validation(format!(
                "unified row for respondent '{}' has {} values, expected {}",
                r.respondent,
                r.values.len(),
                self.columns.len()
            ))),
            None => Ok(()),
        }
    }

    /// Names of the final (`fin_`) columns.
    pub fn final_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.kind == ColumnKind::Final)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Respondents, in row order.
    pub fn respondents(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.respondent.as_str()).collect()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// `true` if no respondent was bridged.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Result of a bridging run.
#[derive(Debug, Clone, Serialize)]
pub struct BridgingOutcome {
    /// Bridged respondents
    pub table: UnifiedPartworthTable,
    /// Respondents that could not be bridged
    pub failures: Vec<RespondentFailure>,
    /// Branch taken for every input column
    pub debug: BTreeMap<String, ColumnRole>,
}

/// Where a unified value comes from.
#[derive(Debug, Clone, Copy)]
enum Source {
    Original(Stage, usize),
    BVal,
    BValInverse,
    /// `factor(stage) * stage[j]`, factor is `b_val_inverse` for stage 1, `b_val` for stage 2.
    Transform(Stage, usize),
    /// Own value plus its transform.
    OwnFinal(Stage, usize),
    /// Sum of the stage-1 and stage-2 transforms of a bridge.
    BridgeFinal { s1: usize, s2: usize },
}

#[derive(Debug, Clone)]
struct Layout {
    columns: Vec<UnifiedColumn>,
    sources: Vec<Source>,
    debug: BTreeMap<String, ColumnRole>,
    /// Resolved bridge columns: (stage-1 index, stage-2 index) per bridge attribute.
    bridges: [(usize, usize); 2],
}

/// Bridging engine over two per-respondent coefficient tables.
#[derive(Debug, Clone)]
pub struct BridgingEngine {
    config: BridgeConfig,
}

impl BridgingEngine {
    /// Validate the config and build the engine.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        if config.attributes.len() != 2 {
            return Err(Error::Configuration(format!(
                "bridging needs exactly 2 bridge attributes, got {}",
                config.attributes.len()
            )));
        }
        if config.attributes[0] == config.attributes[1] {
            return Err(Error::Configuration(format!(
                "bridge attributes must differ, got '{}' twice",
                config.attributes[0]
            )));
        }
        Ok(Self { config })
    }

    /// Settings in use.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn resolve(&self, table: &CoefficientTable, name: &str) -> Result<usize> {
        let col = self.config.matching.find(name, &table.columns).ok_or_else(|| {
            Error::NotFound(format!(
                "bridge attribute '{}' not found in {} coefficients",
                name, table.stage
            ))
        })?;
        table
            .column_index(col)
            .ok_or_else(|| Error::NotFound(format!("column '{}' in {}", col, table.stage)))
    }

    fn is_bridge(&self, column: &str, resolved: &[usize], index: usize) -> bool {
        match self.config.matching {
            ColumnMatch::Exact => resolved.contains(&index),
            ColumnMatch::Substring => self.config.attributes.iter().any(|b| column.contains(b.as_str())),
        }
    }

    fn layout(&self, s1: &CoefficientTable, s2: &CoefficientTable) -> Result<Layout> {
        let [b1, b2] = [&self.config.attributes[0], &self.config.attributes[1]];
        let bridges = [(self.resolve(s1, b1)?, self.resolve(s2, b1)?), (self.resolve(s1, b2)?, self.resolve(s2, b2)?)];
        let resolved_1 = [bridges[0].0, bridges[1].0];
        let resolved_2 = [bridges[0].1, bridges[1].1];

        let mut debug = BTreeMap::new();
        debug.insert("respondent".to_string(), ColumnRole::Skipped);
        debug.insert("b_val".to_string(), ColumnRole::Skipped);
        debug.insert("b_val_inverse".to_string(), ColumnRole::Skipped);

        let role_1: Vec<ColumnRole> = s1
            .columns
            .iter()
            .enumerate()
            .map(|(j, c)| if self.is_bridge(c, &resolved_1, j) { ColumnRole::Bridge } else { ColumnRole::Stage1 })
            .collect();
        let role_2: Vec<ColumnRole> = s2
            .columns
            .iter()
            .enumerate()
            .map(|(j, c)| if self.is_bridge(c, &resolved_2, j) { ColumnRole::Bridge } else { ColumnRole::Stage2 })
            .collect();

        let mut columns = Vec::new();
        let mut sources = Vec::new();
        let mut push = |name: String, kind: ColumnKind, source: Source| {
            columns.push(UnifiedColumn { name, kind });
            sources.push(source);
        };

        for (table, roles) in [(s1, &role_1), (s2, &role_2)] {
            let stage = table.stage;
            for (j, c) in table.columns.iter().enumerate() {
                debug.insert(format!("{}_{}", stage.prefix(), c), roles[j]);
                push(format!("{}_{}", stage.prefix(), c), ColumnKind::Original(stage), Source::Original(stage, j));
            }
        }
        push("b_val".into(), ColumnKind::Ratio, Source::BVal);
        push("b_val_inverse".into(), ColumnKind::Ratio, Source::BValInverse);

        for table in [s1, s2] {
            let target = table.stage.other();
            for (j, c) in table.columns.iter().enumerate() {
                push(
                    format!("{}_tf_{}", target.prefix(), c),
                    ColumnKind::Transformed(target),
                    Source::Transform(table.stage, j),
                );
            }
        }

        for (table, roles) in [(s1, &role_1), (s2, &role_2)] {
            for (j, c) in table.columns.iter().enumerate() {
                if roles[j] != ColumnRole::Bridge {
                    push(format!("{}{}", FINAL_PREFIX, c), ColumnKind::Final, Source::OwnFinal(table.stage, j));
                }
            }
        }
        for (b, &(i1, i2)) in self.config.attributes.iter().zip(bridges.iter()) {
            push(format!("{}{}", FINAL_PREFIX, b), ColumnKind::Final, Source::BridgeFinal { s1: i1, s2: i2 });
        }

        let mut seen = BTreeSet::new();
        for c in &columns {
            if !seen.insert(c.name.as_str()) {
                return Err(Error::Validation(format!(
                    "column '{}' would be produced twice; non-bridge attributes must be unique to one stage",
                    c.name
                )));
            }
        }

        Ok(Layout { columns, sources, debug, bridges })
    }

    /// Pair stage-1 and stage-2 rows according to the alignment rule.
    ///
    /// Positional slots come from `order_1`/`order_2`, which may name respondents
    /// absent from the tables (failed estimates). The row facing such a slot is
    /// reported as `NotFound` instead of sliding onto the next slot.
    fn align<'a>(
        &self,
        s1: &'a CoefficientTable,
        s2: &'a CoefficientTable,
        order_1: &[String],
        order_2: &[String],
        failures: &mut Vec<RespondentFailure>,
    ) -> Vec<(&'a CoefficientRow, &'a CoefficientRow)> {
        let mut pairs = Vec::with_capacity(s1.rows.len().min(s2.rows.len()));
        match self.config.alignment {
            Alignment::ById => {
                let by_id: HashMap<&str, &CoefficientRow> =
                    s2.rows.iter().map(|r| (r.respondent.as_str(), r)).collect();
                for r1 in &s1.rows {
                    match by_id.get(r1.respondent.as_str()) {
                        Some(r2) => pairs.push((r1, *r2)),
                        None => failures.push(RespondentFailure::new(
                            r1.respondent.as_str(),
                            Some(Stage::Stage2),
                            Error::NotFound(format!("respondent '{}' has no stage_2 row", r1.respondent)),
                        )),
                    }
                }
                let ids_1: BTreeSet<&str> = s1.rows.iter().map(|r| r.respondent.as_str()).collect();
                for r2 in &s2.rows {
                    if !ids_1.contains(r2.respondent.as_str()) {
                        failures.push(RespondentFailure::new(
                            r2.respondent.as_str(),
                            Some(Stage::Stage1),
                            Error::NotFound(format!("respondent '{}' has no stage_1 row", r2.respondent)),
                        ));
                    }
                }
            }
            Alignment::Positional => {
                let rows_1: HashMap<&str, &CoefficientRow> =
                    s1.rows.iter().map(|r| (r.respondent.as_str(), r)).collect();
                let rows_2: HashMap<&str, &CoefficientRow> =
                    s2.rows.iter().map(|r| (r.respondent.as_str(), r)).collect();
                for i in 0..order_1.len().max(order_2.len()) {
                    let (id_1, id_2) = (order_1.get(i), order_2.get(i));
                    let r1 = id_1.and_then(|id| rows_1.get(id.as_str()).copied());
                    let r2 = id_2.and_then(|id| rows_2.get(id.as_str()).copied());
                    match (r1, r2) {
                        (Some(r1), Some(r2)) => {
                            if r1.respondent != r2.respondent {
                                log::warn!(
                                    "positional alignment pairs stage_1 '{}' with stage_2 '{}'",
                                    r1.respondent,
                                    r2.respondent
                                );
                            }
                            pairs.push((r1, r2));
                        }
                        (Some(r1), None) => failures.push(RespondentFailure::new(
                            r1.respondent.as_str(),
                            Some(Stage::Stage2),
                            Error::NotFound(format!("no stage_2 row at position {}", i)),
                        )),
                        (None, Some(r2)) => failures.push(RespondentFailure::new(
                            r2.respondent.as_str(),
                            Some(Stage::Stage1),
                            Error::NotFound(format!("no stage_1 row at position {}", i)),
                        )),
                        (None, None) => {}
                    }
                }
            }
        }
        pairs
    }

    /// Bridge one respondent.
    fn bridge_row(&self, layout: &Layout, r1: &CoefficientRow, r2: &CoefficientRow) -> Result<CoefficientRow> {
        let respondent = &r1.respondent;
        for (stage, row) in [(Stage::Stage1, r1), (Stage::Stage2, r2)] {
            if let Some(v) = row.values.iter().find(|v| !v.is_finite()) {
                return Err(Error::Numerical(format!(
                    "respondent '{}' has non-finite {} value {}",
                    respondent, stage, v
                )));
            }
        }

        let [(a1, a2), (c1, c2)] = layout.bridges;
        let numerator = r1.values[a1] + r1.values[c1];
        let denominator = r2.values[a2] + r2.values[c2];
        if denominator == 0.0 {
            return Err(Error::Numerical(format!(
                "respondent '{}': stage_2 bridge sum is zero, b_val undefined",
                respondent
            )));
        }
        let b_val = numerator / denominator;
        if b_val == 0.0 {
            return Err(Error::Numerical(format!(
                "respondent '{}': stage_1 bridge sum is zero, b_val_inverse undefined",
                respondent
            )));
        }
        let b_val_inverse = 1.0 / b_val;
        if !b_val.is_finite() || !b_val_inverse.is_finite() {
            return Err(Error::Numerical(format!(
                "respondent '{}': bridging ratio overflows (b_val = {})",
                respondent, b_val
            )));
        }

        let value = |stage: Stage, j: usize| match stage {
            Stage::Stage1 => r1.values[j],
            Stage::Stage2 => r2.values[j],
        };
        let transform = |stage: Stage, j: usize| match stage {
            Stage::Stage1 => b_val_inverse * r1.values[j],
            Stage::Stage2 => b_val * r2.values[j],
        };

        let values = layout
            .sources
            .iter()
            .map(|s| match *s {
                Source::Original(stage, j) => value(stage, j),
                Source::BVal => b_val,
                Source::BValInverse => b_val_inverse,
                Source::Transform(stage, j) => transform(stage, j),
                Source::OwnFinal(stage, j) => value(stage, j) + transform(stage, j),
                Source::BridgeFinal { s1, s2 } => transform(Stage::Stage2, s2) + transform(Stage::Stage1, s1),
            })
            .collect();

        Ok(CoefficientRow { respondent: respondent.clone(), values })
    }

    /// Bridge stage-1 and stage-2 coefficient tables.
    ///
    /// Whole-call problems (bad tables, missing bridge columns, name collisions)
    /// are returned as `Err`. Per-respondent problems (unmatched rows, zero
    /// bridge sums) are reported in [`BridgingOutcome::failures`].
    pub fn run(&self, stage_1: &CoefficientTable, stage_2: &CoefficientTable) -> Result<BridgingOutcome> {
        let ids = |t: &CoefficientTable| -> Vec<String> { t.rows.iter().map(|r| r.respondent.clone()).collect() };
        self.run_with_order(stage_1, stage_2, &ids(stage_1), &ids(stage_2))
    }

    /// Like [`run`](Self::run), with the full respondent order of each stage.
    ///
    /// `order_1`/`order_2` list every respondent of the stage's input in input
    /// order, including those whose estimate failed and is missing from the
    /// table. Positional alignment pairs by slot in these orders, so a failed
    /// respondent never shifts the ones after it. Id alignment ignores them.
    pub fn run_with_order(
        &self,
        stage_1: &CoefficientTable,
        stage_2: &CoefficientTable,
        order_1: &[String],
        order_2: &[String],
    ) -> Result<BridgingOutcome> {
        if stage_1.stage != Stage::Stage1 || stage_2.stage != Stage::Stage2 {
            return Err(Error::Validation(format!(
                "expected (stage_1, stage_2) tables, got ({}, {})",
                stage_1.stage, stage_2.stage
            )));
        }
        stage_1.validate()?;
        stage_2.validate()?;
        check_order(stage_1, order_1)?;
        check_order(stage_2, order_2)?;

        let layout = self.layout(stage_1, stage_2)?;
        let mut failures = Vec::new();
        let pairs = self.align(stage_1, stage_2, order_1, order_2, &mut failures);

        let mut rows = Vec::with_capacity(pairs.len());
        for (r1, r2) in pairs {
            match self.bridge_row(&layout, r1, r2) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    let f = RespondentFailure::new(r1.respondent.as_str(), None, e);
                    log::warn!("skipping {}", f);
                    failures.push(f);
                }
            }
        }
        log::debug!("bridged {} respondents ({} failed)", rows.len(), failures.len());

        Ok(BridgingOutcome {
            table: UnifiedPartworthTable { columns: layout.columns, rows },
            failures,
            debug: layout.debug,
        })
    }
}

/// Every table row must appear exactly once in `order`.
fn check_order(table: &CoefficientTable, order: &[String]) -> Result<()> {
    let mut listed = BTreeSet::new();
    for id in order {
        if !listed.insert(id.as_str()) {
            return Err(Error::Validation(format!(
                "{} respondent order lists '{}' twice",
                table.stage, id
            )));
        }
    }
    if let Some(r) = table.rows.iter().find(|r| !listed.contains(r.respondent.as_str())) {
        return Err(Error::Validation(format!(
            "{} respondent '{}' is missing from the respondent order",
            table.stage, r.respondent
        )));
    }
    Ok(())
}

/// Bridge two coefficient tables with `config`.
pub fn bridge(
    stage_1: &CoefficientTable,
    stage_2: &CoefficientTable,
    config: &BridgeConfig,
) -> Result<BridgingOutcome> {
    BridgingEngine::new(config.clone())?.run(stage_1, stage_2)
}
