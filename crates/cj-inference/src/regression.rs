//! Ordinary least squares on dummy-coded attributes.
//!
//! The utility model is a linear probability model: the 0/1 choice indicator is
//! regressed directly on the encoded level columns, with no intercept column.
//! Solving goes through the SVD pseudo-inverse so that rank can be checked
//! before coefficients are trusted.

use cj_core::{Error, Result};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::encoder::DesignMatrix;

/// Solver options.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Deserialize, Serialize)]
pub struct OlsOptions {
    /// Return the minimum-norm solution for collinear designs (`n >= p`, `rank < p`)
    /// instead of failing. Designs with fewer rows than columns always fail.
    #[serde(default)]
    pub min_norm_fallback: bool,
}

/// Result of an OLS fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OlsFit {
    /// Column names, aligned with the coefficient vectors.
    pub names: Vec<String>,
    /// Coefficient estimates (partworths).
    pub coefficients: Vec<f64>,
    /// Homoskedastic standard errors.
    pub std_errors: Vec<f64>,
    /// t statistics.
    pub t_values: Vec<f64>,
    /// Two-sided p-values.
    pub p_values: Vec<f64>,
    /// Residual sum of squares.
    pub rss: f64,
    /// Uncentered R² (no intercept in the model).
    pub r_squared: f64,
    /// Numerical rank of the design.
    pub rank: usize,
    /// Residual degrees of freedom (`n - rank`).
    pub dof_resid: usize,
    /// Number of observations.
    pub n_obs: usize,
}

impl OlsFit {
    /// Coefficient for a named column.
    pub fn coefficient(&self, name: &str) -> Option<f64> {
        self.names.iter().position(|n| n == name).map(|j| self.coefficients[j])
    }

    /// p-value for a named column.
    pub fn p_value(&self, name: &str) -> Option<f64> {
        self.names.iter().position(|n| n == name).map(|j| self.p_values[j])
    }
}

/// Two-sided Student-t p-value for `t` with `dof` degrees of freedom.
fn two_sided_p(t: f64, dof: usize) -> f64 {
    if dof == 0 || !t.is_finite() {
        return f64::NAN;
    }
    match StudentsT::new(0.0, 1.0, dof as f64) {
        Ok(dist) => 2.0 * (1.0 - dist.cdf(t.abs())),
        Err(_) => f64::NAN,
    }
}

/// Fit `y ~ X` by OLS without intercept.
pub fn ols_fit(x: &DesignMatrix, y: &[f64], opts: OlsOptions) -> Result<OlsFit> {
    let n = x.nrows();
    let p = x.ncols();
    if n == 0 {
        return Err(Error::Validation("X/y must be non-empty".into()));
    }
    if p == 0 {
        return Err(Error::Validation("X must have at least 1 column".into()));
    }
    if y.len() != n {
        return Err(Error::Validation(format!("y length ({}) != n ({})", y.len(), n)));
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(Error::Validation("y must contain only finite values".into()));
    }
    if n < p {
        return Err(Error::Numerical(format!(
            "rank-deficient fit: {} observations for {} columns",
            n, p
        )));
    }

    let x_mat = x.to_dmatrix();
    let y_vec = DVector::from_column_slice(y);

    let svd = x_mat.clone().svd(true, true);
    let s_max = svd.singular_values.iter().copied().fold(0.0_f64, f64::max);
    let eps = (n.max(p) as f64) * s_max * f64::EPSILON;
    let rank = svd.rank(eps);

    if rank < p {
        if !opts.min_norm_fallback {
            return Err(Error::Numerical(format!(
                "rank-deficient fit: design rank {} < {} columns",
                rank, p
            )));
        }
        log::warn!("collinear design (rank {} < {}); using minimum-norm solution", rank, p);
    }

    let pinv: DMatrix<f64> = svd
        .pseudo_inverse(eps)
        .map_err(|e| Error::Numerical(format!("pseudo-inverse failed: {}", e)))?;

    let beta = &pinv * &y_vec;
    let coefficients: Vec<f64> = beta.iter().copied().collect();
    if coefficients.iter().any(|b| !b.is_finite()) {
        return Err(Error::Numerical("non-finite OLS coefficients".into()));
    }

    let resid = &y_vec - &x_mat * &beta;
    let rss: f64 = resid.iter().map(|r| r * r).sum();
    let tss: f64 = y.iter().map(|v| v * v).sum();
    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 0.0 };

    // (X'X)^+ = X^+ (X^+)'
    let xtx_pinv = &pinv * pinv.transpose();
    let dof_resid = n - rank;
    let sigma2 = if dof_resid > 0 { rss / dof_resid as f64 } else { f64::NAN };

    let std_errors: Vec<f64> = (0..p).map(|j| (sigma2 * xtx_pinv[(j, j)]).max(0.0).sqrt()).collect();
    let t_values: Vec<f64> = coefficients
        .iter()
        .zip(&std_errors)
        .map(|(&b, &se)| if se > 0.0 { b / se } else { f64::NAN })
        .collect();
    let p_values: Vec<f64> = t_values.iter().map(|&t| two_sided_p(t, dof_resid)).collect();

    Ok(OlsFit {
        names: x.columns().to_vec(),
        coefficients,
        std_errors,
        t_values,
        p_values,
        rss,
        r_squared,
        rank,
        dof_resid,
        n_obs: n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{AttributeEncoder, EncoderConfig, EncodingMode, target_vector};
    use approx::assert_relative_eq;
    use cj_core::{ChoiceTable, Observation};

    fn obs(resp: &str, chosen: bool, levels: &[&str]) -> Observation {
        Observation {
            respondent: resp.to_string(),
            chosen,
            levels: levels.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn encode(table: &ChoiceTable, mode: EncodingMode) -> (DesignMatrix, Vec<f64>) {
        let cfg = EncoderConfig::new(table.attribute_columns.clone(), mode);
        let enc = AttributeEncoder::from_table(table, &cfg).unwrap();
        let rows: Vec<usize> = (0..table.observations.len()).collect();
        (enc.encode(table).unwrap(), target_vector(table, &rows))
    }

    #[test]
    fn test_ols_single_attribute_full_is_group_means() {
        // With one attribute fully encoded and no intercept, each coefficient is the
        // choice share of its level.
        let t = ChoiceTable::new(
            vec!["a".into()],
            vec![
                obs("r", true, &["x"]),
                obs("r", false, &["x"]),
                obs("r", true, &["y"]),
                obs("r", true, &["y"]),
                obs("r", true, &["y"]),
                obs("r", false, &["y"]),
            ],
        );
        let (x, y) = encode(&t, EncodingMode::Full);
        let fit = ols_fit(&x, &y, OlsOptions::default()).unwrap();
        assert_eq!(fit.names, vec!["a_x", "a_y"]);
        assert_relative_eq!(fit.coefficient("a_x").unwrap(), 0.5, epsilon = 1e-10);
        assert_relative_eq!(fit.coefficient("a_y").unwrap(), 0.75, epsilon = 1e-10);
        assert_eq!(fit.rank, 2);
        assert_eq!(fit.dof_resid, 4);
        // rss = 2*0.25 + 3*0.0625 + 0.5625 = 1.25
        assert_relative_eq!(fit.rss, 1.25, epsilon = 1e-10);
        assert!(fit.p_values.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_single_level_attribute_drops_out_in_reduced_mode() {
        let t = ChoiceTable::new(
            vec!["a".into(), "b".into()],
            vec![obs("r", true, &["x", "p"]), obs("r", false, &["y", "p"])],
        );
        let (x, y) = encode(&t, EncodingMode::Reduced);
        // reduced: a_y only (b has one level)
        assert_eq!(x.ncols(), 1);
        let fit = ols_fit(&x, &y, OlsOptions::default()).unwrap();
        assert_relative_eq!(fit.coefficients[0], 0.0, epsilon = 1e-10);
        assert_eq!(fit.dof_resid, 1);
    }

    #[test]
    fn test_fewer_rows_than_columns_is_numerical_error() {
        let t = ChoiceTable::new(
            vec!["a".into(), "b".into()],
            vec![obs("r", true, &["x", "p"]), obs("r", false, &["y", "q"])],
        );
        let (x, y) = encode(&t, EncodingMode::Full);
        assert_eq!(x.ncols(), 4);
        let err = ols_fit(&x, &y, OlsOptions { min_norm_fallback: true }).unwrap_err();
        assert!(matches!(err, Error::Numerical(_)), "{err}");
    }

    #[test]
    fn test_collinear_full_design_needs_fallback() {
        // Two fully encoded attributes: each block sums to one, so the design is collinear.
        let t = ChoiceTable::new(
            vec!["a".into(), "b".into()],
            vec![
                obs("r", true, &["x", "p"]),
                obs("r", false, &["x", "q"]),
                obs("r", true, &["y", "p"]),
                obs("r", false, &["y", "q"]),
                obs("r", true, &["y", "p"]),
            ],
        );
        let (x, y) = encode(&t, EncodingMode::Full);
        let err = ols_fit(&x, &y, OlsOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Numerical(_)));

        let fit = ols_fit(&x, &y, OlsOptions { min_norm_fallback: true }).unwrap();
        assert_eq!(fit.rank, 3);
        // Minimum-norm solution still reproduces the least-squares fitted values.
        let yhat: Vec<f64> = (0..x.nrows())
            .map(|i| x.row(i).iter().zip(&fit.coefficients).map(|(a, b)| a * b).sum())
            .collect();
        assert_relative_eq!(yhat[0], yhat[4], epsilon = 1e-10);
        assert_relative_eq!(yhat[0], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_ols_validation() {
        let t = ChoiceTable::new(vec!["a".into()], vec![obs("r", true, &["x"])]);
        let (x, _) = encode(&t, EncodingMode::Full);
        assert!(matches!(ols_fit(&x, &[1.0, 0.0], OlsOptions::default()), Err(Error::Validation(_))));
        assert!(matches!(ols_fit(&x, &[f64::NAN], OlsOptions::default()), Err(Error::Validation(_))));
    }

    #[test]
    fn test_two_sided_p_matches_normal_limit() {
        // Large dof: t ≈ z, two-sided p(1.96) ≈ 0.05.
        let p = two_sided_p(1.959964, 1_000_000);
        assert_relative_eq!(p, 0.05, epsilon = 1e-4);
        assert!(two_sided_p(1.0, 0).is_nan());
    }
}
