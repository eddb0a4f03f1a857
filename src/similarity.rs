//! Cosine similarity between page and query vectors.

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use thiserror::Error;

/// Added to each column maximum before normalizing; the smallest positive
/// subnormal `f64`, so an all-zero column stays zero instead of dividing by 0.
pub const NORMALIZATION_EPSILON: f64 = 5e-324;

/// Errors surfaced while scoring.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimilarityError {
    /// A vector did not match the shared term dimension.
    #[error("vector dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Dimension of the first page vector.
        expected: usize,
        /// Offending dimension.
        found: usize,
    },
}

/// Cosine of the angle between `a` and `b`; exactly `0.0` when either is the
/// zero vector.
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Dense row-major (pages × queries) score matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    rows: usize,
    columns: usize,
    values: Vec<f64>,
}

impl SimilarityMatrix {
    /// Scores every page row against every query row.
    pub fn compute(pages: &[Vec<f64>], queries: &[Vec<f64>]) -> Result<Self, SimilarityError> {
        let expected = pages
            .first()
            .or_else(|| queries.first())
            .map(Vec::len)
            .unwrap_or(0);
        if let Some(bad) = pages.iter().chain(queries).find(|v| v.len() != expected) {
            return Err(SimilarityError::DimensionMismatch {
                expected,
                found: bad.len(),
            });
        }

        let mut values = Vec::with_capacity(pages.len() * queries.len());
        for page in pages {
            for query in queries {
                values.push(cosine(page, query));
            }
        }
        Ok(Self {
            rows: pages.len(),
            columns: queries.len(),
            values,
        })
    }

    /// Builds a matrix from row-major values.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, SimilarityError> {
        let columns = rows.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = rows.iter().find(|row| row.len() != columns) {
            return Err(SimilarityError::DimensionMismatch {
                expected: columns,
                found: bad.len(),
            });
        }
        Ok(Self {
            rows: rows.len(),
            columns,
            values: rows.into_iter().flatten().collect(),
        })
    }

    /// Number of page rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of query columns.
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Score of page `row` against query `column`.
    pub fn get(&self, row: usize, column: usize) -> Option<f64> {
        if row >= self.rows || column >= self.columns {
            return None;
        }
        self.values.get(row * self.columns + column).copied()
    }

    /// Scores of one page against every query.
    pub fn row(&self, row: usize) -> Option<&[f64]> {
        if row >= self.rows {
            return None;
        }
        let start = row * self.columns;
        Some(&self.values[start..start + self.columns])
    }

    /// Scores of every page against one query.
    pub fn column(&self, column: usize) -> Option<Vec<f64>> {
        if column >= self.columns {
            return None;
        }
        Some(
            (0..self.rows)
                .map(|row| self.values[row * self.columns + column])
                .collect(),
        )
    }

    /// Copy with each column divided by its maximum plus
    /// [`NORMALIZATION_EPSILON`]. Intended for display only.
    pub fn column_normalized(&self) -> Self {
        let mut maxima = vec![0.0f64; self.columns];
        for row in self.values.chunks(self.columns.max(1)) {
            for (max, &value) in maxima.iter_mut().zip(row) {
                if value > *max {
                    *max = value;
                }
            }
        }
        let values = self
            .values
            .iter()
            .enumerate()
            .map(|(idx, value)| value / (maxima[idx % self.columns] + NORMALIZATION_EPSILON))
            .collect();
        Self {
            rows: self.rows,
            columns: self.columns,
            values,
        }
    }

    /// Highest scoring page for `column` as `(row, score)`; ties keep the
    /// earlier row. `None` when the column is out of range or has no rows.
    pub fn best_page(&self, column: usize) -> Option<(usize, f64)> {
        self.column(column)?
            .into_iter()
            .enumerate()
            .fold(None, |best, (row, score)| match best {
                Some((_, top)) if top >= score => best,
                _ => Some((row, score)),
            })
    }

    /// Rows scoring at least `threshold` for `column`, highest first. More than
    /// one entry means several pages compete for that query.
    pub fn competing_pages(&self, column: usize, threshold: f64) -> Vec<(usize, f64)> {
        let Some(scores) = self.column(column) else {
            return Vec::new();
        };
        let mut hits: Vec<(usize, f64)> = scores
            .into_iter()
            .enumerate()
            .filter(|&(_, score)| score > 0.0 && score >= threshold)
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        hits
    }
}

impl Serialize for SimilarityMatrix {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let rows: Vec<&[f64]> = if self.columns == 0 {
            vec![&self.values[..0]; self.rows]
        } else {
            self.values.chunks(self.columns).collect()
        };
        let mut state = serializer.serialize_struct("SimilarityMatrix", 3)?;
        state.serialize_field("rows", &self.rows)?;
        state.serialize_field("columns", &self.columns)?;
        state.serialize_field("values", &rows)?;
        state.end()
    }
}
