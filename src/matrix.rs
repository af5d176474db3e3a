//! Symmetric pairwise distance table
//!
//! A [`DistanceMatrix`] is the only input the layout engine needs. Construction
//! validates the table so downstream code can rely on symmetry, a zero diagonal
//! and finite non-negative entries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance used when checking symmetry and the diagonal
const SYMMETRY_TOLERANCE: f32 = 1e-4;

/// Errors raised while validating a distance table
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatrixError {
    /// Row count and row lengths disagree
    #[error("matrix is not square: {rows} rows, row {row} has {len} entries")]
    NotSquare { rows: usize, row: usize, len: usize },

    /// `m[i][j] != m[j][i]`
    #[error("matrix is not symmetric at ({i}, {j})")]
    Asymmetric { i: usize, j: usize },

    /// `m[i][i] != 0`
    #[error("diagonal entry {0} is not zero")]
    NonZeroDiagonal(usize),

    /// Negative, NaN or infinite entry
    #[error("invalid distance at ({i}, {j})")]
    InvalidEntry { i: usize, j: usize },
}

/// A validated N×N distance table stored row-major
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    n: usize,
    data: Vec<f32>,
}

impl DistanceMatrix {
    /// Build from nested rows, validating every invariant
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, MatrixError> {
        let n = rows.len();
        let mut data = Vec::with_capacity(n * n);
        for (row, values) in rows.iter().enumerate() {
            if values.len() != n {
                return Err(MatrixError::NotSquare {
                    rows: n,
                    row,
                    len: values.len(),
                });
            }
            data.extend_from_slice(values);
        }

        let matrix = Self { n, data };
        matrix.validate()?;
        Ok(matrix)
    }

    /// An N×N table with every off-diagonal distance set to `distance`
    ///
    /// Negative or non-finite distances become zero.
    pub fn uniform(n: usize, distance: f32) -> Self {
        let distance = if distance.is_finite() {
            distance.max(0.0)
        } else {
            0.0
        };
        let mut data = vec![distance; n * n];
        for i in 0..n {
            data[i * n + i] = 0.0;
        }
        Self { n, data }
    }

    /// Convert a similarity table (1 = identical) into distances (`1 - similarity`)
    ///
    /// Similarities are clamped to [0, 1] and mirrored entries are averaged, so
    /// the result always satisfies the matrix invariants.
    pub fn from_similarities(similarities: &[Vec<f32>]) -> Result<Self, MatrixError> {
        let n = similarities.len();
        for (row, values) in similarities.iter().enumerate() {
            if values.len() != n {
                return Err(MatrixError::NotSquare {
                    rows: n,
                    row,
                    len: values.len(),
                });
            }
        }

        let mut data = vec![0.0; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let a = sanitize_similarity(similarities[i][j]);
                let b = sanitize_similarity(similarities[j][i]);
                let distance = 1.0 - (a + b) * 0.5;
                data[i * n + j] = distance;
                data[j * n + i] = distance;
            }
        }
        Ok(Self { n, data })
    }

    fn validate(&self) -> Result<(), MatrixError> {
        for i in 0..self.n {
            if self.get(i, i).abs() > SYMMETRY_TOLERANCE {
                return Err(MatrixError::NonZeroDiagonal(i));
            }
            for j in 0..self.n {
                let v = self.get(i, j);
                if !v.is_finite() || v < 0.0 {
                    return Err(MatrixError::InvalidEntry { i, j });
                }
                if j > i && (v - self.get(j, i)).abs() > SYMMETRY_TOLERANCE {
                    return Err(MatrixError::Asymmetric { i, j });
                }
            }
        }
        Ok(())
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Distance between entities `i` and `j`
    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.data[i * self.n + j]
    }

    /// Nested-row copy, used for serialization to the renderer
    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        self.data.chunks(self.n.max(1)).map(<[f32]>::to_vec).collect()
    }
}

impl Serialize for DistanceMatrix {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_rows().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DistanceMatrix {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let rows = Vec::<Vec<f32>>::deserialize(deserializer)?;
        DistanceMatrix::from_rows(&rows).map_err(serde::de::Error::custom)
    }
}

fn sanitize_similarity(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn accepts_valid_matrix() {
        let m = DistanceMatrix::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.get(0, 1), 1.0);
        assert_eq!(m.get(1, 0), 1.0);
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = DistanceMatrix::from_rows(&[vec![0.0, 1.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, MatrixError::NotSquare { row: 1, .. }));
    }

    #[test]
    fn rejects_asymmetric() {
        let err = DistanceMatrix::from_rows(&[vec![0.0, 1.0], vec![2.0, 0.0]]).unwrap_err();
        assert_eq!(err, MatrixError::Asymmetric { i: 0, j: 1 });
    }

    #[test]
    fn rejects_nonzero_diagonal() {
        let err = DistanceMatrix::from_rows(&[vec![0.5, 1.0], vec![1.0, 0.0]]).unwrap_err();
        assert_eq!(err, MatrixError::NonZeroDiagonal(0));
    }

    #[test]
    fn rejects_negative_and_nan() {
        let err = DistanceMatrix::from_rows(&[vec![0.0, -1.0], vec![-1.0, 0.0]]).unwrap_err();
        assert!(matches!(err, MatrixError::InvalidEntry { .. }));

        let err =
            DistanceMatrix::from_rows(&[vec![0.0, f32::NAN], vec![f32::NAN, 0.0]]).unwrap_err();
        assert!(matches!(err, MatrixError::InvalidEntry { .. }));
    }

    #[test]
    fn similarities_are_symmetrized() {
        let m = DistanceMatrix::from_similarities(&[
            vec![1.0, 0.8, 2.0],
            vec![0.6, 1.0, 0.1],
            vec![0.0, 0.1, 1.0],
        ])
        .unwrap();
        assert!((m.get(0, 1) - 0.3).abs() < 1e-6);
        assert_eq!(m.get(0, 1), m.get(1, 0));
        // 2.0 clamps to 1.0, averaged with 0.0
        assert!((m.get(0, 2) - 0.5).abs() < 1e-6);
        assert_eq!(m.get(2, 2), 0.0);
    }

    #[test]
    fn uniform_has_zero_diagonal() {
        let m = DistanceMatrix::uniform(3, 0.5);
        assert_eq!(m.get(1, 1), 0.0);
        assert_eq!(m.get(0, 2), 0.5);
    }

    #[test]
    fn uniform_rejects_non_finite_distances() {
        for distance in [f32::INFINITY, f32::NAN, -1.0] {
            let m = DistanceMatrix::uniform(3, distance);
            assert!(m.validate().is_ok());
            assert_eq!(m.get(0, 1), 0.0);
        }

        let positions = crate::layout::layout(
            &DistanceMatrix::uniform(3, f32::INFINITY),
            &crate::layout::LayoutParams::default(),
            &mut rand::rngs::StdRng::seed_from_u64(3),
        );
        assert!(positions.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn deserializes_and_validates() {
        let m: DistanceMatrix = serde_json::from_str("[[0, 2], [2, 0]]").unwrap();
        assert_eq!(m.get(0, 1), 2.0);

        let bad = serde_json::from_str::<DistanceMatrix>("[[0, 2], [3, 0]]");
        assert!(bad.is_err());
    }

    #[test]
    fn error_display() {
        let err = MatrixError::NonZeroDiagonal(3);
        assert_eq!(err.to_string(), "diagonal entry 3 is not zero");
    }
}
