//! Dummy (one-hot) encoding of categorical attribute columns.
//!
//! Three encoding modes are supported:
//! - `full` keeps one column per level;
//! - `reduced` drops the first level of every attribute (the default contrast);
//! - `anchored` keeps all levels and then subsets to an explicit anchor list.
//!
//! Predictor selection is exact by default: a predictor name selects the attribute
//! column of the same name. [`ColumnMatch::Substring`] keeps the containment rule
//! (a predictor selects every column whose name contains it), which is ambiguous
//! when one attribute name is a substring of another.

use std::collections::BTreeSet;
use std::str::FromStr;

use cj_core::{Attribute, AttributeSchema, ChoiceTable, Error, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// How encoded columns are chosen per attribute.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "anchors")]
pub enum EncodingMode {
    /// Keep every level, no reference level dropped.
    Full,
    /// Drop the first level of each attribute.
    #[default]
    Reduced,
    /// Keep every level, then subset to these encoded column names (in this order).
    Anchored(Vec<String>),
}

impl EncodingMode {
    /// Valid mode names.
    pub const NAMES: [&'static str; 3] = ["full", "reduced", "anchored"];

    /// Parse a mode by name; `anchors` is only consulted for `anchored`.
    pub fn from_name(name: &str, anchors: &[String]) -> Result<Self> {
        let mode = match name {
            "full" => EncodingMode::Full,
            "reduced" => EncodingMode::Reduced,
            "anchored" => EncodingMode::Anchored(anchors.to_vec()),
            other => {
                return Err(Error::Configuration(format!(
                    "invalid encoding mode '{}'; valid options are 'full', 'reduced' and 'anchored'",
                    other
                )));
            }
        };
        mode.validate()?;
        Ok(mode)
    }

    /// Mode name.
    pub fn name(&self) -> &'static str {
        match self {
            EncodingMode::Full => "full",
            EncodingMode::Reduced => "reduced",
            EncodingMode::Anchored(_) => "anchored",
        }
    }

    /// Reject an anchored mode without anchors.
    pub fn validate(&self) -> Result<()> {
        if let EncodingMode::Anchored(anchors) = self {
            if anchors.is_empty() {
                return Err(Error::Configuration(
                    "anchored encoding requires a non-empty anchor list".into(),
                ));
            }
            let mut seen = BTreeSet::new();
            for a in anchors {
                if !seen.insert(a.as_str()) {
                    return Err(Error::Configuration(format!("anchor '{}' listed twice", a)));
                }
            }
        }
        Ok(())
    }
}

/// Rule used to match a requested name against available column names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnMatch {
    /// Names must be equal.
    #[default]
    Exact,
    /// The requested name must be contained in the column name.
    Substring,
}

impl ColumnMatch {
    /// Whether `column` is selected by `name`.
    #[inline]
    pub fn matches(self, name: &str, column: &str) -> bool {
        match self {
            ColumnMatch::Exact => name == column,
            ColumnMatch::Substring => column.contains(name),
        }
    }

    /// First column selected by `name`.
    pub fn find<'a, I>(self, name: &str, columns: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a String>,
    {
        columns.into_iter().map(String::as_str).find(|c| self.matches(name, c))
    }
}

impl FromStr for ColumnMatch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exact" => Ok(ColumnMatch::Exact),
            "substring" => Ok(ColumnMatch::Substring),
            other => Err(Error::Configuration(format!(
                "invalid column match '{}'; valid options are 'exact' and 'substring'",
                other
            ))),
        }
    }
}

/// Encoder settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Attribute names to encode.
    pub predictors: Vec<String>,
    /// Encoding mode.
    #[serde(default)]
    pub mode: EncodingMode,
    /// Predictor-to-column matching rule.
    #[serde(default)]
    pub matching: ColumnMatch,
}

impl EncoderConfig {
    /// Exact-match config with the given predictors and mode.
    pub fn new(predictors: Vec<String>, mode: EncodingMode) -> Self {
        Self { predictors, mode, matching: ColumnMatch::Exact }
    }
}

/// Dense row-major 0/1 design matrix with named columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesignMatrix {
    columns: Vec<String>,
    n_rows: usize,
    data: Vec<f64>,
}

impl DesignMatrix {
    /// Column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows (observations).
    pub fn nrows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns (encoded levels).
    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    /// Row slice.
    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        let p = self.ncols();
        &self.data[i * p..(i + 1) * p]
    }

    /// Copy of a named column.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let j = self.columns.iter().position(|c| c == name)?;
        Some((0..self.n_rows).map(|i| self.row(i)[j]).collect())
    }

    /// Convert to an `nalgebra` matrix.
    pub fn to_dmatrix(&self) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.n_rows, self.ncols(), &self.data)
    }
}

#[derive(Debug, Clone)]
struct SelectedAttribute {
    table_index: usize,
    attribute: Attribute,
}

#[derive(Debug, Clone)]
struct EncodedColumn {
    slot: usize,
    level: usize,
    name: String,
}

/// Attribute encoder bound to one choice table layout.
#[derive(Debug, Clone)]
pub struct AttributeEncoder {
    selected: Vec<SelectedAttribute>,
    columns: Vec<EncodedColumn>,
    mode: EncodingMode,
}

impl AttributeEncoder {
    /// Build an encoder, deriving the attribute schema from the table itself.
    pub fn from_table(table: &ChoiceTable, config: &EncoderConfig) -> Result<Self> {
        let schema = AttributeSchema::from_table(table)?;
        Self::new(table, &schema, config)
    }

    /// Build an encoder for `table` using an explicit schema.
    pub fn new(table: &ChoiceTable, schema: &AttributeSchema, config: &EncoderConfig) -> Result<Self> {
        config.mode.validate()?;
        table.validate()?;
        if config.predictors.is_empty() {
            return Err(Error::Configuration("predictor list is empty".into()));
        }

        let candidates: Vec<(usize, &String)> = table
            .attribute_columns
            .iter()
            .enumerate()
            .filter(|(_, c)| **c != table.target_column)
            .collect();

        for p in &config.predictors {
            if !candidates.iter().any(|(_, c)| config.matching.matches(p, c)) {
                return Err(Error::NotFound(format!(
                    "predictor '{}' matches no attribute column",
                    p
                )));
            }
        }

        let mut selected = Vec::new();
        for &(table_index, name) in &candidates {
            if !config.predictors.iter().any(|p| config.matching.matches(p, name)) {
                continue;
            }
            let attribute = schema
                .attribute(name)
                .ok_or_else(|| Error::NotFound(format!("attribute '{}' is not in the schema", name)))?
                .clone();
            selected.push(SelectedAttribute { table_index, attribute });
        }

        let mut all = Vec::new();
        for (slot, sel) in selected.iter().enumerate() {
            let skip = if config.mode == EncodingMode::Reduced { 1 } else { 0 };
            for (level, l) in sel.attribute.levels.iter().enumerate().skip(skip) {
                all.push(EncodedColumn { slot, level, name: sel.attribute.encoded_name(l) });
            }
        }

        let columns = match &config.mode {
            EncodingMode::Anchored(anchors) => {
                let mut out = Vec::with_capacity(anchors.len());
                for a in anchors {
                    let col = all
                        .iter()
                        .find(|c| &c.name == a)
                        .ok_or_else(|| Error::NotFound(format!("anchor column '{}' not encoded", a)))?;
                    out.push(col.clone());
                }
                out
            }
            _ => all,
        };

        if columns.is_empty() {
            return Err(Error::Validation("encoding produced no columns".into()));
        }

        Ok(Self { selected, columns, mode: config.mode.clone() })
    }

    /// Encoded column names.
    pub fn columns(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Selected attribute names, in table order.
    pub fn attributes(&self) -> Vec<&str> {
        self.selected.iter().map(|s| s.attribute.name.as_str()).collect()
    }

    /// Encoding mode.
    pub fn mode(&self) -> &EncodingMode {
        &self.mode
    }

    /// Encode every row of `table`.
    pub fn encode(&self, table: &ChoiceTable) -> Result<DesignMatrix> {
        let rows: Vec<usize> = (0..table.observations.len()).collect();
        self.encode_rows(table, &rows)
    }

    /// Encode the given rows of `table`.
    pub fn encode_rows(&self, table: &ChoiceTable, rows: &[usize]) -> Result<DesignMatrix> {
        let p = self.columns.len();
        let mut data = vec![0.0; rows.len() * p];
        let mut level_of = vec![0usize; self.selected.len()];

        for (r, &i) in rows.iter().enumerate() {
            let obs = table.observations.get(i).ok_or_else(|| {
                Error::Validation(format!("row index {} out of range", i))
            })?;
            for (slot, sel) in self.selected.iter().enumerate() {
                let value = obs.levels.get(sel.table_index).ok_or_else(|| {
                    Error::Validation(format!("row {} is missing column '{}'", i, sel.attribute.name))
                })?;
                level_of[slot] = sel.attribute.level_index(value).ok_or_else(|| {
                    Error::Validation(format!(
                        "row {}: level '{}' is not declared for attribute '{}'",
                        i, value, sel.attribute.name
                    ))
                })?;
            }
            let out = &mut data[r * p..(r + 1) * p];
            for (j, col) in self.columns.iter().enumerate() {
                if level_of[col.slot] == col.level {
                    out[j] = 1.0;
                }
            }
        }

        Ok(DesignMatrix { columns: self.columns(), n_rows: rows.len(), data })
    }
}

/// Binary target vector (1.0 = chosen) for the given rows.
pub fn target_vector(table: &ChoiceTable, rows: &[usize]) -> Vec<f64> {
    rows.iter()
        .filter_map(|&i| table.observations.get(i))
        .map(|o| if o.chosen { 1.0 } else { 0.0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cj_core::Observation;

    fn obs(resp: &str, chosen: bool, levels: &[&str]) -> Observation {
        Observation {
            respondent: resp.to_string(),
            chosen,
            levels: levels.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn table() -> ChoiceTable {
        ChoiceTable::new(
            vec!["price".into(), "brand".into(), "price_tier".into()],
            vec![
                obs("r1", true, &["low", "acme", "a"]),
                obs("r1", false, &["high", "zen", "b"]),
                obs("r1", false, &["mid", "zen", "c"]),
            ],
        )
    }

    fn config(mode: EncodingMode) -> EncoderConfig {
        EncoderConfig::new(vec!["price".into(), "brand".into()], mode)
    }

    #[test]
    fn test_reduced_drops_first_level() {
        let enc = AttributeEncoder::from_table(&table(), &config(EncodingMode::Reduced)).unwrap();
        // price: high < low < mid, brand: acme < zen
        assert_eq!(enc.columns(), vec!["price_low", "price_mid", "brand_zen"]);
        let x = enc.encode(&table()).unwrap();
        assert_eq!(x.nrows(), 3);
        assert_eq!(x.row(0), &[1.0, 0.0, 0.0]);
        assert_eq!(x.row(1), &[0.0, 0.0, 1.0]);
        assert_eq!(x.row(2), &[0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_full_keeps_all_levels() {
        let enc = AttributeEncoder::from_table(&table(), &config(EncodingMode::Full)).unwrap();
        assert_eq!(enc.columns().len(), 3 + 2);
        let x = enc.encode(&table()).unwrap();
        for i in 0..x.nrows() {
            assert_eq!(x.row(i).iter().sum::<f64>(), 2.0);
        }
    }

    #[test]
    fn test_anchored_subsets_in_anchor_order() {
        let anchors = vec!["brand_zen".to_string(), "price_high".to_string()];
        let enc = AttributeEncoder::from_table(&table(), &config(EncodingMode::Anchored(anchors)))
            .unwrap();
        assert_eq!(enc.columns(), vec!["brand_zen", "price_high"]);
        let x = enc.encode(&table()).unwrap();
        assert_eq!(x.column("price_high").unwrap(), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_anchored_requires_anchors() {
        let err = EncodingMode::from_name("anchored", &[]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        let err = AttributeEncoder::from_table(&table(), &config(EncodingMode::Anchored(vec![])))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_anchored_unknown_anchor_is_not_found() {
        let enc = AttributeEncoder::from_table(
            &table(),
            &config(EncodingMode::Anchored(vec!["price_free".into()])),
        );
        assert!(matches!(enc, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_invalid_mode_names_all_options() {
        let err = EncodingMode::from_name("sparse", &[]).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, Error::Configuration(_)));
        for name in EncodingMode::NAMES {
            assert!(msg.contains(name), "{msg}");
        }
    }

    #[test]
    fn test_substring_matching_is_ambiguous_exact_is_not() {
        let exact = AttributeEncoder::from_table(&table(), &config(EncodingMode::Full)).unwrap();
        assert_eq!(exact.attributes(), vec!["price", "brand"]);

        let mut cfg = config(EncodingMode::Full);
        cfg.matching = ColumnMatch::Substring;
        let sub = AttributeEncoder::from_table(&table(), &cfg).unwrap();
        assert_eq!(sub.attributes(), vec!["price", "brand", "price_tier"]);
    }

    #[test]
    fn test_target_never_selected() {
        let mut t = table();
        t.target_column = "brand".into();
        let mut cfg = config(EncodingMode::Full);
        cfg.predictors = vec!["price".into(), "brand".into()];
        let err = AttributeEncoder::from_table(&t, &cfg).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        cfg.predictors = vec!["price".into()];
        let enc = AttributeEncoder::from_table(&t, &cfg).unwrap();
        assert_eq!(enc.attributes(), vec!["price"]);
    }

    #[test]
    fn test_undeclared_level_rejected() {
        let schema = AttributeSchema::new(vec![
            Attribute { name: "price".into(), levels: vec!["low".into(), "high".into()] },
            Attribute { name: "brand".into(), levels: vec!["acme".into(), "zen".into()] },
        ])
        .unwrap();
        let enc = AttributeEncoder::new(&table(), &schema, &config(EncodingMode::Reduced)).unwrap();
        assert_eq!(enc.columns(), vec!["price_high", "brand_zen"]);
        let err = enc.encode(&table()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{err}");
    }

    #[test]
    fn test_target_vector() {
        assert_eq!(target_vector(&table(), &[0, 1, 2]), vec![1.0, 0.0, 0.0]);
    }
}
