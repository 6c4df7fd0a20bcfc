//! Principal coordinates analysis (classical multidimensional scaling).

use crate::data::DistanceMatrix;
use crate::error::{QcError, Result};
use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Serialize};

/// Raised when the most negative eigenvalue is within an order of magnitude
/// of the largest positive one. A projection onto the leading axes may then
/// misrepresent the distances, which happens with non-Euclidean
/// dissimilarities such as Bray-Curtis or unweighted UniFrac.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NegativeEigenvalueDiagnostic {
    pub most_negative: f64,
    pub largest_positive: f64,
}

impl std::fmt::Display for NegativeEigenvalueDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Most negative eigenvalue ({:.4e}) is comparable to the largest positive \
             ({:.4e}); the leading-axis projection may be unreliable",
            self.most_negative, self.largest_positive
        )
    }
}

/// One eigenvalue with its share of the total variance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Eigenpair {
    pub eigenvalue: f64,
    /// `eigenvalue / Σ|eigenvalues|` as a percentage. Negative for negative
    /// eigenvalues.
    pub percent_explained: f64,
}

/// Result of a classical scaling of one distance matrix.
#[derive(Debug, Clone)]
pub struct PcoaResult {
    pub sample_ids: Vec<String>,
    /// All n eigenpairs, sorted descending by signed eigenvalue.
    pub eigenpairs: Vec<Eigenpair>,
    /// Sample coordinates, one column per retained axis. Axis k is the k-th
    /// eigenvector scaled by `sqrt(|eigenvalue_k|)`.
    pub coordinates: DMatrix<f64>,
    pub diagnostic: Option<NegativeEigenvalueDiagnostic>,
}

impl PcoaResult {
    /// Number of retained axes.
    pub fn n_axes(&self) -> usize {
        self.coordinates.ncols()
    }

    /// Write coordinates and variance shares as TSV.
    ///
    /// The variance-explained percentages appear as a comment line above the
    /// header so one file carries the whole plotting contract.
    pub fn to_tsv<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        use std::io::Write;
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);

        let shares: Vec<String> = self.eigenpairs[..self.n_axes()]
            .iter()
            .map(|p| format!("{:.2}%", p.percent_explained))
            .collect();
        writeln!(writer, "# variance explained: {}", shares.join("\t"))?;

        write!(writer, "sample_id")?;
        for axis in 1..=self.n_axes() {
            write!(writer, "\tPC{}", axis)?;
        }
        writeln!(writer)?;
        for (row, sid) in self.sample_ids.iter().enumerate() {
            write!(writer, "{}", sid)?;
            for axis in 0..self.n_axes() {
                write!(writer, "\t{:.6}", self.coordinates[(row, axis)])?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}

/// Classical scaling of a distance matrix.
///
/// The matrix of squared distances is double-centered to the Gower matrix
/// `B = -1/2 J D² J` and eigendecomposed; coordinates on axis k are the k-th
/// eigenvector scaled by the square root of the eigenvalue's magnitude.
/// Negative eigenvalues are kept in the descending ordering and reported
/// as-is; when the most negative is within an order of magnitude of the
/// largest positive one the result carries a diagnostic. At least `axes`
/// axes are retained (minimum 3), clamped to the sample count.
pub fn pcoa(dm: &DistanceMatrix, axes: usize) -> Result<PcoaResult> {
    let n = dm.n_samples();
    if n == 0 {
        return Err(QcError::EmptyData("Empty distance matrix".to_string()));
    }

    // Gower centering of the squared distances.
    let mut squared = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            let d = dm.get(i, j);
            squared[(i, j)] = d * d;
        }
    }
    let row_means: Vec<f64> = (0..n).map(|i| squared.row(i).sum() / n as f64).collect();
    let grand_mean = row_means.iter().sum::<f64>() / n as f64;
    let mut gower = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            // Column means equal row means because D is symmetric.
            gower[(i, j)] = -0.5 * (squared[(i, j)] - row_means[i] - row_means[j] + grand_mean);
        }
    }

    let eigen = SymmetricEigen::new(gower);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let total_magnitude: f64 = eigen.eigenvalues.iter().map(|v| v.abs()).sum();
    let eigenpairs: Vec<Eigenpair> = order
        .iter()
        .map(|&idx| {
            let eigenvalue = eigen.eigenvalues[idx];
            let percent_explained = if total_magnitude > 0.0 {
                eigenvalue / total_magnitude * 100.0
            } else {
                0.0
            };
            Eigenpair {
                eigenvalue,
                percent_explained,
            }
        })
        .collect();

    let n_axes = axes.max(3).min(n);
    let mut coordinates = DMatrix::zeros(n, n_axes);
    for (axis, &idx) in order.iter().take(n_axes).enumerate() {
        let scale = eigen.eigenvalues[idx].abs().sqrt();
        for row in 0..n {
            coordinates[(row, axis)] = eigen.eigenvectors[(row, idx)] * scale;
        }
    }

    let most_negative = eigenpairs.last().map(|p| p.eigenvalue).unwrap_or(0.0);
    let largest_positive = eigenpairs.first().map(|p| p.eigenvalue).unwrap_or(0.0);
    let diagnostic = if most_negative < 0.0
        && largest_positive > 0.0
        && most_negative.abs() >= largest_positive / 10.0
    {
        Some(NegativeEigenvalueDiagnostic {
            most_negative,
            largest_positive,
        })
    } else {
        None
    };

    Ok(PcoaResult {
        sample_ids: dm.sample_ids().to_vec(),
        eigenpairs,
        coordinates,
        diagnostic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn matrix_from_points(points: &[(f64, f64)]) -> DistanceMatrix {
        let n = points.len();
        let mut data = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                let dx = points[i].0 - points[j].0;
                let dy = points[i].1 - points[j].1;
                data[(i, j)] = (dx * dx + dy * dy).sqrt();
            }
        }
        let sample_ids = (0..n).map(|i| format!("S{}", i)).collect();
        DistanceMatrix::new(sample_ids, data).unwrap()
    }

    #[test]
    fn test_recovers_euclidean_configuration() {
        let points = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)];
        let dm = matrix_from_points(&points);
        let result = pcoa(&dm, 3).unwrap();

        // Two real dimensions: top-2 eigenvalues carry >= 99% of |lambda| mass
        let total: f64 = result.eigenpairs.iter().map(|p| p.eigenvalue.abs()).sum();
        let top2 = result.eigenpairs[0].eigenvalue + result.eigenpairs[1].eigenvalue;
        assert!(top2 / total >= 0.99);

        // Pairwise distances reconstructed from the top-2 coordinates
        for i in 0..4 {
            for j in 0..4 {
                let dx = result.coordinates[(i, 0)] - result.coordinates[(j, 0)];
                let dy = result.coordinates[(i, 1)] - result.coordinates[(j, 1)];
                let reconstructed = (dx * dx + dy * dy).sqrt();
                assert_relative_eq!(reconstructed, dm.get(i, j), epsilon = 1e-6);
            }
        }
        assert!(result.diagnostic.is_none());
    }

    #[test]
    fn test_eigenvalues_sorted_descending() {
        let points = [(0.0, 0.0), (3.0, 0.0), (0.0, 4.0), (1.0, 1.0), (2.0, 2.0)];
        let dm = matrix_from_points(&points);
        let result = pcoa(&dm, 3).unwrap();

        for pair in result.eigenpairs.windows(2) {
            assert!(pair[0].eigenvalue >= pair[1].eigenvalue);
            assert!(pair[0].percent_explained >= pair[1].percent_explained);
        }
    }

    #[test]
    fn test_variance_shares_use_absolute_mass() {
        let points = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)];
        let dm = matrix_from_points(&points);
        let result = pcoa(&dm, 3).unwrap();

        let share_sum: f64 = result
            .eigenpairs
            .iter()
            .map(|p| p.percent_explained.abs())
            .sum();
        assert_relative_eq!(share_sum, 100.0, max_relative = 1e-9);
    }

    #[test]
    fn test_non_euclidean_matrix_yields_diagnostic() {
        // Violates the triangle inequality, so B has a large negative
        // eigenvalue (here -16 against a +50).
        let data = DMatrix::from_row_slice(
            3,
            3,
            &[0.0, 1.0, 10.0, 1.0, 0.0, 1.0, 10.0, 1.0, 0.0],
        );
        let dm = DistanceMatrix::new(
            vec!["S0".to_string(), "S1".to_string(), "S2".to_string()],
            data,
        )
        .unwrap();
        let result = pcoa(&dm, 3).unwrap();

        assert!(result.eigenpairs.last().unwrap().eigenvalue < 0.0);
        let diag = result.diagnostic.expect("diagnostic should fire");
        assert!(diag.most_negative < 0.0);
        assert!(diag.most_negative.abs() >= diag.largest_positive / 10.0);
        assert_relative_eq!(diag.largest_positive, 50.0, max_relative = 1e-6);
        assert_relative_eq!(diag.most_negative, -16.0, max_relative = 1e-6);
    }

    #[test]
    fn test_axes_clamped_to_sample_count() {
        let points = [(0.0, 0.0), (1.0, 0.0)];
        let dm = matrix_from_points(&points);
        let result = pcoa(&dm, 3).unwrap();
        assert_eq!(result.n_axes(), 2);

        let points = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (2.0, 2.0), (3.0, 1.0)];
        let dm = matrix_from_points(&points);
        assert_eq!(pcoa(&dm, 4).unwrap().n_axes(), 4);
        assert_eq!(pcoa(&dm, 1).unwrap().n_axes(), 3);
    }

    #[test]
    fn test_single_sample_degenerates() {
        let dm = DistanceMatrix::new(vec!["S0".to_string()], DMatrix::zeros(1, 1)).unwrap();
        let result = pcoa(&dm, 3).unwrap();
        assert_eq!(result.eigenpairs.len(), 1);
        assert_relative_eq!(result.eigenpairs[0].eigenvalue, 0.0);
        assert!(result.diagnostic.is_none());
    }

    #[test]
    fn test_to_tsv() {
        let points = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)];
        let dm = matrix_from_points(&points);
        let result = pcoa(&dm, 3).unwrap();

        let file = tempfile::NamedTempFile::new().unwrap();
        result.to_tsv(file.path()).unwrap();
        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.starts_with("# variance explained: "));
        assert!(content.contains("sample_id\tPC1\tPC2\tPC3"));
        assert!(content.contains("S0\t"));
    }
}
