//! Column standardization applied before any distance computation

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AnalysisError, AnalysisResult};
use crate::features::CustomerProfiles;

/// What to do with a column whose sample standard deviation is zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroVariancePolicy {
    /// Scale the column to all zeros and record it as constant
    #[default]
    ZeroFill,
    /// Fail with `InvalidArgument`
    Reject,
}

/// Per-column mean and sample standard deviation fitted on a profile matrix
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    pub means: Array1<f64>,
    pub stds: Array1<f64>,
    /// Columns handled by [`ZeroVariancePolicy::ZeroFill`]
    pub constant_columns: Vec<usize>,
}

impl StandardScaler {
    pub fn fit(features: &Array2<f64>, policy: ZeroVariancePolicy) -> AnalysisResult<Self> {
        if features.nrows() < 2 {
            return Err(AnalysisError::invalid(format!(
                "at least 2 rows are required to standardize, got {}",
                features.nrows()
            )));
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::invalid("feature matrix contains non-finite values"));
        }

        let n = features.nrows() as f64;
        let means = features.sum_axis(Axis(0)) / n;
        let stds = features.std_axis(Axis(0), 1.0);

        let mut constant_columns = Vec::new();
        for (col, (&mean, &std)) in means.iter().zip(stds.iter()).enumerate() {
            if is_constant(mean, std) {
                if policy == ZeroVariancePolicy::Reject {
                    return Err(AnalysisError::invalid(format!(
                        "column {col} has zero variance"
                    )));
                }
                constant_columns.push(col);
            }
        }

        Ok(Self {
            means,
            stds,
            constant_columns,
        })
    }

    /// Standardize rows with the fitted statistics; returns a new matrix
    pub fn transform(&self, features: &Array2<f64>) -> AnalysisResult<Array2<f64>> {
        if features.ncols() != self.means.len() {
            return Err(AnalysisError::invalid(format!(
                "expected {} columns, got {}",
                self.means.len(),
                features.ncols()
            )));
        }

        let mut scaled = features.to_owned();
        for (col, mut column) in scaled.axis_iter_mut(Axis(1)).enumerate() {
            if self.constant_columns.contains(&col) {
                column.fill(0.0);
            } else {
                let (mean, std) = (self.means[col], self.stds[col]);
                column.mapv_inplace(|v| (v - mean) / std);
            }
        }
        Ok(scaled)
    }
}

/// Zero up to rounding relative to the column magnitude
fn is_constant(mean: f64, std: f64) -> bool {
    std == 0.0 || std <= 1e-12 * mean.abs()
}

/// Standardized profile matrix; the identity column is carried for attribution only
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMatrix {
    pub customer_ids: Vec<String>,
    pub column_names: Vec<String>,
    pub values: Array2<f64>,
    pub scaler: StandardScaler,
}

impl NormalizedMatrix {
    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn index_of(&self, customer_id: &str) -> Option<usize> {
        self.customer_ids.iter().position(|id| id == customer_id)
    }

    pub fn row(&self, customer_id: &str) -> Option<ArrayView1<'_, f64>> {
        self.index_of(customer_id).map(|i| self.values.row(i))
    }

    /// Names of the columns that were mapped to zero as constant
    pub fn constant_columns(&self) -> Vec<&str> {
        self.scaler
            .constant_columns
            .iter()
            .map(|&i| self.column_names[i].as_str())
            .collect()
    }
}

/// Rescale every profile column to mean 0 and sample standard deviation 1
pub fn normalize(
    profiles: &CustomerProfiles,
    policy: ZeroVariancePolicy,
) -> AnalysisResult<NormalizedMatrix> {
    let scaler = StandardScaler::fit(&profiles.values, policy)?;
    let values = scaler.transform(&profiles.values)?;

    let normalized = NormalizedMatrix {
        customer_ids: profiles.customer_ids.clone(),
        column_names: profiles.column_names(),
        values,
        scaler,
    };

    let constant = normalized.constant_columns();
    if !constant.is_empty() {
        warn!(columns = ?constant, "zero-variance columns scaled to zero");
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{build_profiles, tests::sample_records};

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_columns_standardized() {
        let features = Array2::from_shape_vec(
            (4, 2),
            vec![1.0, 100.0, 2.0, 300.0, 3.0, 200.0, 10.0, 400.0],
        )
        .unwrap();

        let scaler = StandardScaler::fit(&features, ZeroVariancePolicy::ZeroFill).unwrap();
        let scaled = scaler.transform(&features).unwrap();

        for column in scaled.axis_iter(Axis(1)) {
            assert_close(column.mean().unwrap(), 0.0);
            assert_close(column.std(1.0), 1.0);
        }
        assert!(scaler.constant_columns.is_empty());
    }

    #[test]
    fn test_input_not_mutated() {
        let features = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let copy = features.clone();
        let scaler = StandardScaler::fit(&features, ZeroVariancePolicy::ZeroFill).unwrap();
        let _ = scaler.transform(&features).unwrap();
        assert_eq!(features, copy);
    }

    #[test]
    fn test_zero_variance_policies() {
        let features =
            Array2::from_shape_vec((3, 2), vec![5.0, 1.0, 5.0, 2.0, 5.0, 3.0]).unwrap();

        let scaler = StandardScaler::fit(&features, ZeroVariancePolicy::ZeroFill).unwrap();
        assert_eq!(scaler.constant_columns, vec![0]);
        let scaled = scaler.transform(&features).unwrap();
        assert!(scaled.column(0).iter().all(|&v| v == 0.0));
        assert!(scaled.iter().all(|v| v.is_finite()));

        let err = StandardScaler::fit(&features, ZeroVariancePolicy::Reject).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidArgument(_)));
    }

    #[test]
    fn test_tiny_values_are_not_constant() {
        let features = Array2::from_shape_vec((3, 1), vec![1e-13, 2e-13, 3e-13]).unwrap();
        let scaler = StandardScaler::fit(&features, ZeroVariancePolicy::Reject).unwrap();
        assert!(scaler.constant_columns.is_empty());

        let scaled = scaler.transform(&features).unwrap();
        assert_close(scaled[[0, 0]], -1.0);
        assert_close(scaled[[2, 0]], 1.0);

        // Rounding noise around a constant still counts as zero variance
        let features = Array2::from_shape_vec((3, 1), vec![0.1, 0.1, 0.1]).unwrap();
        let scaler = StandardScaler::fit(&features, ZeroVariancePolicy::ZeroFill).unwrap();
        assert_eq!(scaler.constant_columns, vec![0]);
    }

    #[test]
    fn test_degenerate_inputs_rejected() {
        let single = Array2::from_shape_vec((1, 2), vec![1.0, 2.0]).unwrap();
        assert!(StandardScaler::fit(&single, ZeroVariancePolicy::ZeroFill).is_err());

        let nan = Array2::from_shape_vec((2, 1), vec![1.0, f64::NAN]).unwrap();
        assert!(StandardScaler::fit(&nan, ZeroVariancePolicy::ZeroFill).is_err());

        let features = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let scaler = StandardScaler::fit(&features, ZeroVariancePolicy::ZeroFill).unwrap();
        let narrow = Array2::zeros((2, 3));
        assert!(scaler.transform(&narrow).is_err());
    }

    #[test]
    fn test_normalize_profiles() {
        let profiles = build_profiles(&sample_records()).unwrap();
        let normalized = normalize(&profiles, ZeroVariancePolicy::ZeroFill).unwrap();

        assert_eq!(normalized.customer_ids, profiles.customer_ids);
        assert_eq!(normalized.values.dim(), profiles.values.dim());

        // No transacting customer lives in South America
        assert_eq!(normalized.constant_columns(), vec!["Region_South America"]);

        for (col, column) in normalized.values.axis_iter(Axis(1)).enumerate() {
            assert_close(column.mean().unwrap(), 0.0);
            if !normalized.scaler.constant_columns.contains(&col) {
                assert_close(column.std(1.0), 1.0);
            }
        }
    }
}
