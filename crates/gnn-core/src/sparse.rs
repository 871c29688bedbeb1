//! # Sparse Matrices
//!
//! Coordinate-format (COO) sparse matrices used for the `Adjacency`,
//! `ArcNode` and `NodeGraph` operators.
//!
//! A matrix is an explicit list of (row, col, value) triplets plus its dense
//! shape. Duplicate coordinates are kept as separate triplets and sum when the
//! matrix is read or multiplied, so a multigraph adjacency counts its parallel
//! arcs.

use crate::GnnError;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// A sparse matrix stored as COO triplets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseMatrix {
    shape: (usize, usize),
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f32>,
}

impl SparseMatrix {
    /// Build a matrix from triplet arrays, validating lengths and bounds.
    pub fn from_triplets(
        shape: (usize, usize),
        rows: Vec<usize>,
        cols: Vec<usize>,
        values: Vec<f32>,
    ) -> Result<Self, GnnError> {
        if rows.len() != cols.len() || rows.len() != values.len() {
            return Err(GnnError::InvalidGraph(format!(
                "triplet arrays differ in length: rows={}, cols={}, values={}",
                rows.len(),
                cols.len(),
                values.len()
            )));
        }
        if let Some(r) = rows.iter().find(|&&r| r >= shape.0) {
            return Err(GnnError::InvalidGraph(format!(
                "row index {} out of bounds for {} rows",
                r, shape.0
            )));
        }
        if let Some(c) = cols.iter().find(|&&c| c >= shape.1) {
            return Err(GnnError::InvalidGraph(format!(
                "column index {} out of bounds for {} columns",
                c, shape.1
            )));
        }
        Ok(Self {
            shape,
            rows,
            cols,
            values,
        })
    }

    /// An all-zero matrix with no stored triplets.
    #[must_use]
    pub fn zeros(shape: (usize, usize)) -> Self {
        Self {
            shape,
            rows: Vec::new(),
            cols: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Keep every nonzero entry of a dense matrix, in row-major order.
    #[must_use]
    pub fn from_dense(dense: &Array2<f32>) -> Self {
        let mut matrix = Self::zeros(dense.dim());
        for ((r, c), &v) in dense.indexed_iter() {
            if v != 0.0 {
                matrix.rows.push(r);
                matrix.cols.push(c);
                matrix.values.push(v);
            }
        }
        matrix
    }

    /// Dense shape (rows, cols).
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Number of stored triplets (duplicates included).
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Iterate stored triplets in storage order.
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        self.rows
            .iter()
            .zip(&self.cols)
            .zip(&self.values)
            .map(|((&r, &c), &v)| (r, c, v))
    }

    /// Value at (row, col); duplicate triplets sum.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.triplets()
            .filter(|&(r, c, _)| r == row && c == col)
            .map(|(_, _, v)| v)
            .sum()
    }

    /// Densify, summing duplicates.
    #[must_use]
    pub fn to_dense(&self) -> Array2<f32> {
        let mut dense = Array2::zeros(self.shape);
        for (r, c, v) in self.triplets() {
            dense[[r, c]] += v;
        }
        dense
    }

    /// Swap rows and columns.
    #[must_use]
    pub fn transpose(&self) -> Self {
        Self {
            shape: (self.shape.1, self.shape.0),
            rows: self.cols.clone(),
            cols: self.rows.clone(),
            values: self.values.clone(),
        }
    }

    /// Sum of each row.
    #[must_use]
    pub fn row_sums(&self) -> Vec<f32> {
        let mut sums = vec![0.0; self.shape.0];
        for (r, _, v) in self.triplets() {
            sums[r] += v;
        }
        sums
    }

    /// Sum of each column.
    #[must_use]
    pub fn col_sums(&self) -> Vec<f32> {
        let mut sums = vec![0.0; self.shape.1];
        for (_, c, v) in self.triplets() {
            sums[c] += v;
        }
        sums
    }

    /// `self · dense`, shape (rows × dense.cols).
    pub fn matmul(&self, dense: &Array2<f32>) -> Result<Array2<f32>, GnnError> {
        if dense.nrows() != self.shape.1 {
            return Err(GnnError::ShapeMismatch {
                expected: (self.shape.1, dense.ncols()),
                found: dense.dim(),
            });
        }
        let mut out = Array2::zeros((self.shape.0, dense.ncols()));
        for (r, c, v) in self.triplets() {
            let src = dense.row(c);
            let mut dst = out.row_mut(r);
            dst.scaled_add(v, &src);
        }
        Ok(out)
    }

    /// `selfᵀ · dense`, shape (cols × dense.cols), without materialising the transpose.
    ///
    /// With `self = ArcNode` and `dense` holding one message per arc, this
    /// yields the aggregated incoming message of every node.
    pub fn transpose_matmul(&self, dense: &Array2<f32>) -> Result<Array2<f32>, GnnError> {
        if dense.nrows() != self.shape.0 {
            return Err(GnnError::ShapeMismatch {
                expected: (self.shape.0, dense.ncols()),
                found: dense.dim(),
            });
        }
        let mut out = Array2::zeros((self.shape.1, dense.ncols()));
        for (r, c, v) in self.triplets() {
            let src = dense.row(r);
            let mut dst = out.row_mut(c);
            dst.scaled_add(v, &src);
        }
        Ok(out)
    }

    /// Block-diagonal composition: block k occupies rows/cols offset by the
    /// shapes of blocks 0..k.
    #[must_use]
    pub fn block_diag(blocks: &[Self]) -> Self {
        let shape = blocks
            .iter()
            .fold((0, 0), |acc, b| (acc.0 + b.shape.0, acc.1 + b.shape.1));
        let mut out = Self::zeros(shape);
        let (mut row_offset, mut col_offset) = (0, 0);
        for block in blocks {
            for (r, c, v) in block.triplets() {
                out.rows.push(r + row_offset);
                out.cols.push(c + col_offset);
                out.values.push(v);
            }
            row_offset += block.shape.0;
            col_offset += block.shape.1;
        }
        out
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn small() -> SparseMatrix {
        SparseMatrix::from_triplets((2, 3), vec![0, 1, 1], vec![2, 0, 2], vec![1.0, 2.0, 3.0])
            .expect("valid")
    }

    #[test]
    fn duplicates_sum_on_read() {
        let m = SparseMatrix::from_triplets((2, 2), vec![0, 0], vec![1, 1], vec![1.0, 1.0])
            .expect("valid");
        assert_eq!(m.nnz(), 2);
        assert_eq!(m.get(0, 1), 2.0);
        assert_eq!(m.to_dense(), array![[0.0, 2.0], [0.0, 0.0]]);
    }

    #[test]
    fn out_of_bounds_rejected() {
        let result = SparseMatrix::from_triplets((2, 2), vec![2], vec![0], vec![1.0]);
        assert!(matches!(result, Err(GnnError::InvalidGraph(_))));
    }

    #[test]
    fn matmul_matches_dense() {
        let m = small();
        let x = array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let sparse = m.matmul(&x).expect("matmul");
        assert_eq!(sparse, m.to_dense().dot(&x));
    }

    #[test]
    fn transpose_matmul_matches_dense() {
        let m = small();
        let x = array![[1.0], [2.0]];
        let sparse = m.transpose_matmul(&x).expect("matmul");
        assert_eq!(sparse, m.to_dense().t().dot(&x));
        assert_eq!(m.transpose().to_dense(), m.to_dense().t().to_owned());
    }

    #[test]
    fn matmul_shape_checked() {
        let m = small();
        let x = Array2::<f32>::zeros((2, 2));
        assert!(matches!(
            m.matmul(&x),
            Err(GnnError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn block_diag_offsets_blocks() {
        let a = SparseMatrix::from_dense(&array![[0.5], [0.5]]);
        let b = SparseMatrix::from_dense(&array![[1.0]]);
        let d = SparseMatrix::block_diag(&[a, b]);
        assert_eq!(d.shape(), (3, 2));
        assert_eq!(d.to_dense(), array![[0.5, 0.0], [0.5, 0.0], [0.0, 1.0]]);
    }

    #[test]
    fn sums_by_axis() {
        let m = small();
        assert_eq!(m.row_sums(), vec![1.0, 5.0]);
        assert_eq!(m.col_sums(), vec![2.0, 0.0, 4.0]);
    }
}
