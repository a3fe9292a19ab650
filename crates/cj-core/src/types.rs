//! Common data types for conjoint analysis

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::{Error, Result};

/// Survey stage an estimate belongs to.
///
/// Stage 1 is the choice-based conjoint block; stage 2 is the self-rating block
/// that carries the extended attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    /// Conjoint (choice) stage
    #[serde(rename = "stage_1")]
    Stage1,
    /// Self-rating stage
    #[serde(rename = "stage_2")]
    Stage2,
}

impl Stage {
    /// Column prefix used in unified partworth tables (`stage_1` / `stage_2`).
    pub fn prefix(self) -> &'static str {
        match self {
            Stage::Stage1 => "stage_1",
            Stage::Stage2 => "stage_2",
        }
    }

    /// The stage whose scale this stage's values are transformed into.
    pub fn other(self) -> Stage {
        match self {
            Stage::Stage1 => Stage::Stage2,
            Stage::Stage2 => Stage::Stage1,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// One categorical attribute with its ordered levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute (column) name
    pub name: String,
    /// Levels in encoding order; the first one is the reference level in reduced mode.
    pub levels: Vec<String>,
}

impl Attribute {
    /// Encoded column name for `level` of this attribute.
    pub fn encoded_name(&self, level: &str) -> String {
        format!("{}_{}", self.name, level)
    }

    /// Encoded column names for every level, in level order.
    pub fn encoded_names(&self) -> Vec<String> {
        self.levels.iter().map(|l| self.encoded_name(l)).collect()
    }

    /// Index of `level`, if declared.
    pub fn level_index(&self, level: &str) -> Option<usize> {
        self.levels.iter().position(|l| l == level)
    }
}

/// Ordered set of attributes with their levels.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttributeSchema {
    /// Attributes in column order
    pub attributes: Vec<Attribute>,
}

impl AttributeSchema {
    /// Build a schema from explicit attributes.
    ///
    /// Attribute names must be unique and every attribute needs at least one level.
    pub fn new(attributes: Vec<Attribute>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for a in &attributes {
            if !seen.insert(a.name.as_str()) {
                return Err(Error::Validation(format!("duplicate attribute '{}'", a.name)));
            }
            if a.levels.is_empty() {
                return Err(Error::Validation(format!("attribute '{}' has no levels", a.name)));
            }
            let mut lv = BTreeSet::new();
            for l in &a.levels {
                if !lv.insert(l.as_str()) {
                    return Err(Error::Validation(format!(
                        "attribute '{}' declares level '{}' twice",
                        a.name, l
                    )));
                }
            }
        }
        Ok(Self { attributes })
    }

    /// Derive the schema from a choice table.
    ///
    /// Levels are the distinct observed values, sorted lexicographically.
    pub fn from_table(table: &ChoiceTable) -> Result<Self> {
        table.validate()?;
        let mut levels: Vec<BTreeSet<&str>> = vec![BTreeSet::new(); table.attribute_columns.len()];
        for obs in &table.observations {
            for (j, level) in obs.levels.iter().enumerate() {
                levels[j].insert(level.as_str());
            }
        }
        let attributes = table
            .attribute_columns
            .iter()
            .zip(levels)
            .map(|(name, set)| Attribute {
                name: name.clone(),
                levels: set.into_iter().map(str::to_string).collect(),
            })
            .collect();
        Self::new(attributes)
    }

    /// Look up an attribute by exact name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// `true` if the schema has no attributes.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// One row of stated-choice survey data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Respondent identifier
    pub respondent: String,
    /// Whether the alternative was chosen
    pub chosen: bool,
    /// One level per attribute column, aligned with [`ChoiceTable::attribute_columns`]
    pub levels: Vec<String>,
}

/// In-memory stated-choice table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceTable {
    /// Name of the respondent identifier column
    #[serde(default = "default_respondent_column")]
    pub respondent_column: String,
    /// Name of the binary target column
    #[serde(default = "default_target_column")]
    pub target_column: String,
    /// Categorical attribute column names
    pub attribute_columns: Vec<String>,
    /// Observation rows
    pub observations: Vec<Observation>,
}

fn default_respondent_column() -> String {
    "respID".to_string()
}

fn default_target_column() -> String {
    "choice".to_string()
}

impl ChoiceTable {
    /// Create a table with the default respondent/target column names.
    pub fn new(attribute_columns: Vec<String>, observations: Vec<Observation>) -> Self {
        Self {
            respondent_column: default_respondent_column(),
            target_column: default_target_column(),
            attribute_columns,
            observations,
        }
    }

    /// Check that every row carries one level per attribute column.
    pub fn validate(&self) -> Result<()> {
        if self.attribute_columns.is_empty() {
            return Err(Error::Validation("choice table has no attribute columns".into()));
        }
        let mut seen = BTreeSet::new();
        for c in &self.attribute_columns {
            if !seen.insert(c.as_str()) {
                return Err(Error::Validation(format!("duplicate attribute column '{}'", c)));
            }
        }
        for (i, obs) in self.observations.iter().enumerate() {
            if obs.levels.len() != self.attribute_columns.len() {
                return Err(Error::Validation(format!(
                    "row {} has {} levels, expected {}",
                    i,
                    obs.levels.len(),
                    self.attribute_columns.len()
                )));
            }
        }
        Ok(())
    }

    /// Group row indices by respondent, in first-encounter order.
    pub fn group_by_respondent(&self) -> Vec<(&str, Vec<usize>)> {
        let mut slot: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
        for (i, obs) in self.observations.iter().enumerate() {
            let id = obs.respondent.as_str();
            let k = *slot.entry(id).or_insert_with(|| {
                groups.push((id, Vec::new()));
                groups.len() - 1
            });
            groups[k].1.push(i);
        }
        groups
    }
}

/// Partworths of one respondent, aligned with [`CoefficientTable::columns`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientRow {
    /// Respondent identifier
    pub respondent: String,
    /// One value per column
    pub values: Vec<f64>,
}

/// Per-respondent coefficient (partworth) table for one stage.
///
/// Stage-1 tables come out of the estimator; stage-2 tables are either
/// self-rating scores supplied as-is or a second estimator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientTable {
    /// Stage these values were measured in
    pub stage: Stage,
    /// Encoded-level (or rated attribute) column names
    pub columns: Vec<String>,
    /// One row per respondent
    pub rows: Vec<CoefficientRow>,
}

impl CoefficientTable {
    /// Create a table, checking that every row matches the column count.
    pub fn new(stage: Stage, columns: Vec<String>, rows: Vec<CoefficientRow>) -> Result<Self> {
        let t = Self { stage, columns, rows };
        t.validate()?;
        Ok(t)
    }

    /// Check column uniqueness, row widths and respondent uniqueness.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for c in &self.columns {
            if !seen.insert(c.as_str()) {
                return Err(Error::Validation(format!(
                    "{} table has duplicate column '{}'",
                    self.stage, c
                )));
            }
        }
        let mut ids = BTreeSet::new();
        for row in &self.rows {
            if row.values.len() != self.columns.len() {
                return Err(Error::Validation(format!(
                    "{} row for respondent '{}' has {} values, expected {}",
                    self.stage,
                    row.respondent,
                    row.values.len(),
                    self.columns.len()
                )));
            }
            if !ids.insert(row.respondent.as_str()) {
                return Err(Error::Validation(format!(
                    "{} table lists respondent '{}' twice",
                    self.stage, row.respondent
                )));
            }
        }
        Ok(())
    }

    /// Index of an exact column name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Row for a respondent.
    pub fn row(&self, respondent: &str) -> Option<&CoefficientRow> {
        self.rows.iter().find(|r| r.respondent == respondent)
    }

    /// Value at (respondent, column).
    pub fn value(&self, respondent: &str, column: &str) -> Option<f64> {
        let j = self.column_index(column)?;
        self.row(respondent)?.values.get(j).copied()
    }
}

/// A respondent whose computation failed, reported alongside partial results.
#[derive(Debug, Clone, PartialEq)]
pub struct RespondentFailure {
    /// Respondent identifier
    pub respondent: String,
    /// Stage the failure belongs to, if stage-specific
    pub stage: Option<Stage>,
    /// Why it failed
    pub error: Error,
}

impl RespondentFailure {
    /// Create a failure record.
    pub fn new(respondent: impl Into<String>, stage: Option<Stage>, error: Error) -> Self {
        Self { respondent: respondent.into(), stage, error }
    }
}

impl fmt::Display for RespondentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "respondent '{}' ({}): {}", self.respondent, stage, self.error),
            None => write!(f, "respondent '{}': {}", self.respondent, self.error),
        }
    }
}

impl Serialize for RespondentFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("RespondentFailure", 4)?;
        s.serialize_field("respondent", &self.respondent)?;
        s.serialize_field("stage", &self.stage)?;
        s.serialize_field("kind", self.error.kind())?;
        s.serialize_field("message", &self.error.to_string())?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(resp: &str, chosen: bool, levels: &[&str]) -> Observation {
        Observation {
            respondent: resp.to_string(),
            chosen,
            levels: levels.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_schema_from_table_sorts_levels() {
        let t = ChoiceTable::new(
            vec!["price".into(), "brand".into()],
            vec![
                obs("r1", true, &["mid", "b"]),
                obs("r1", false, &["high", "a"]),
                obs("r2", true, &["low", "b"]),
            ],
        );
        let s = AttributeSchema::from_table(&t).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.attributes[0].levels, vec!["high", "low", "mid"]);
        assert_eq!(s.attributes[1].encoded_names(), vec!["brand_a", "brand_b"]);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let t = ChoiceTable::new(vec!["price".into()], vec![obs("r1", true, &["low", "x"])]);
        assert!(matches!(t.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_group_by_respondent_first_encounter_order() {
        let t = ChoiceTable::new(
            vec!["a".into()],
            vec![obs("z", true, &["1"]), obs("a", false, &["2"]), obs("z", false, &["2"])],
        );
        let g = t.group_by_respondent();
        assert_eq!(g.len(), 2);
        assert_eq!(g[0], ("z", vec![0, 2]));
        assert_eq!(g[1], ("a", vec![1]));
    }

    #[test]
    fn test_coefficient_table_validation() {
        let bad = CoefficientTable::new(
            Stage::Stage2,
            vec!["x".into(), "x".into()],
            vec![],
        );
        assert!(bad.is_err());

        let t = CoefficientTable::new(
            Stage::Stage1,
            vec!["x".into(), "y".into()],
            vec![CoefficientRow { respondent: "r1".into(), values: vec![1.0, 2.0] }],
        )
        .unwrap();
        assert_eq!(t.value("r1", "y"), Some(2.0));
        assert_eq!(t.value("r2", "y"), None);

        // Deserialized tables skip `new`; short rows read as missing.
        let ragged: CoefficientTable = serde_json::from_str(
            r#"{"stage":"stage_1","columns":["x","y"],"rows":[{"respondent":"r1","values":[1.0]}]}"#,
        )
        .unwrap();
        assert_eq!(ragged.value("r1", "y"), None);
        assert!(ragged.validate().is_err());
    }

    #[test]
    fn test_failure_serializes_kind_and_message() {
        let f = RespondentFailure::new("r2", Some(Stage::Stage2), Error::Numerical("zero".into()));
        let v = serde_json::to_value(&f).unwrap();
        assert_eq!(v["respondent"], "r2");
        assert_eq!(v["stage"], "stage_2");
        assert_eq!(v["kind"], "numerical");
        assert_eq!(f.to_string(), "respondent 'r2' (stage_2): Numerical error: zero");
    }
}
