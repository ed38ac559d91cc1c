use std::fmt::{Debug, Display};
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use itertools::Itertools;
use num_traits::NumAssign;
use rand::distributions::uniform::SampleUniform;
use rand::{thread_rng, Rng};

use crate::error::{Error, Result};

/// Numeric element a matrix can hold; satisfied by `f64` and `i64`.
pub trait Element:
    Copy
    + Debug
    + Display
    + FromStr
    + NumAssign
    + PartialOrd
    + SampleUniform
    + Send
    + Sync
    + 'static
{
}

impl<T> Element for T where
    T: Copy
        + Debug
        + Display
        + FromStr
        + NumAssign
        + PartialOrd
        + SampleUniform
        + Send
        + Sync
        + 'static
{
}

/// A dense matrix stored as one flat row-major buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Element> Matrix<T> {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![T::zero(); rows * cols],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut result = Self::zeros(n, n);
        for i in 0..n {
            result.data[i * n + i] = T::one();
        }
        result
    }

    /// Wraps an existing row-major buffer.
    ///
    /// * `rows`: Number of rows.
    /// * `cols`: Number of columns.
    /// * `data`: Flat buffer of length `rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::BufferShape {
                len: data.len(),
                rows,
                cols,
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Builds a matrix from nested rows, which must all have equal length.
    pub fn from_rows(rows: Vec<Vec<T>>) -> Self {
        assert!(!rows.is_empty());
        let cols = rows[0].len();
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in &rows {
            assert_eq!(row.len(), cols);
            data.extend_from_slice(row);
        }
        Self {
            rows: rows.len(),
            cols,
            data,
        }
    }

    /// Fills a matrix with uniformly distributed values from `[low, high)`.
    pub fn random(rows: usize, cols: usize, low: T, high: T) -> Self {
        let mut rng = thread_rng();
        let data = (0..rows * cols)
            .map(|_| rng.gen_range(low..high))
            .collect();
        Self { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    pub fn row(&self, row: usize) -> &[T] {
        assert!(row < self.rows);
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        assert!(row < self.rows);
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Performs the matrix multiplication in one go; the sequential
    /// reference for the distributed path.
    ///
    /// * `other`: Right-hand operand; its row count must equal `self.cols`.
    pub fn multiply(&self, other: &Self) -> Result<Self> {
        if self.cols != other.rows {
            return Err(Error::OperandShapes {
                left_rows: self.rows,
                left_cols: self.cols,
                right_rows: other.rows,
                right_cols: other.cols,
            });
        }
        let mut result = Self::zeros(self.rows, other.cols);
        result.multiply_accumulate(self, other);
        Ok(result)
    }

    /// Adds the product `a * b` onto `self` without resetting it.
    ///
    /// * `a`: Left block.
    /// * `b`: Right block.
    pub fn multiply_accumulate(&mut self, a: &Self, b: &Self) {
        assert_eq!(a.cols, b.rows);
        assert_eq!(self.rows, a.rows);
        assert_eq!(self.cols, b.cols);

        for i in 0..a.rows {
            for j in 0..b.cols {
                let mut sum = self.data[i * self.cols + j];
                for k in 0..a.cols {
                    sum += a.data[i * a.cols + k] * b.data[k * b.cols + j];
                }
                self.data[i * self.cols + j] = sum;
            }
        }
    }

    /// Renders the classical representation (rows stacked vertically,
    /// entries separated by tabs).
    pub fn pretty(&self) -> String {
        self.data
            .chunks(self.cols)
            .map(|row| row.iter().join("\t"))
            .join("\n")
    }
}

impl<T: Element> Index<(usize, usize)> for Matrix<T> {
    type Output = T;

    fn index(&self, (row, col): (usize, usize)) -> &T {
        assert!(row < self.rows && col < self.cols);
        &self.data[row * self.cols + col]
    }
}

impl<T: Element> IndexMut<(usize, usize)> for Matrix<T> {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut T {
        assert!(row < self.rows && col < self.cols);
        &mut self.data[row * self.cols + col]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiply_matches_hand_computed_product() {
        let a = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let b = Matrix::from_rows(vec![vec![5.0, 6.0], vec![7.0, 8.0]]);
        let c = a.multiply(&b).unwrap();
        assert_eq!(
            c,
            Matrix::from_rows(vec![vec![19.0, 22.0], vec![43.0, 50.0]])
        );
    }

    #[test]
    fn multiply_by_identity_is_a_noop() {
        let b = Matrix::<i64>::from_rows(vec![vec![2, 9, 4], vec![7, 5, 3], vec![6, 1, 8]]);
        let id = Matrix::identity(3);
        assert_eq!(id.multiply(&b).unwrap(), b);
        assert_eq!(b.multiply(&id).unwrap(), b);
    }

    #[test]
    fn multiply_rejects_mismatched_shapes() {
        let a = Matrix::<f64>::zeros(2, 3);
        let b = Matrix::<f64>::zeros(2, 3);
        assert!(matches!(
            a.multiply(&b),
            Err(Error::OperandShapes { left_cols: 3, right_rows: 2, .. })
        ));
    }

    #[test]
    fn accumulate_adds_onto_existing_entries() {
        let a = Matrix::from_rows(vec![vec![1, 0], vec![0, 1]]);
        let b = Matrix::from_rows(vec![vec![3, 4], vec![5, 6]]);
        let mut c = Matrix::from_rows(vec![vec![10, 10], vec![10, 10]]);
        c.multiply_accumulate(&a, &b);
        assert_eq!(c, Matrix::from_rows(vec![vec![13, 14], vec![15, 16]]));
    }

    #[test]
    fn from_vec_checks_the_buffer_length() {
        let result = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            result,
            Err(Error::BufferShape { len: 3, rows: 2, cols: 2 })
        ));
    }

    #[test]
    fn indexing_is_row_major() {
        let m = Matrix::from_rows(vec![vec![1, 2, 3], vec![4, 5, 6]]);
        assert_eq!(m[(0, 2)], 3);
        assert_eq!(m[(1, 0)], 4);
    }

    #[test]
    #[should_panic]
    fn column_index_out_of_bounds_panics() {
        let m = Matrix::<i64>::zeros(2, 2);
        let _ = m[(0, 2)];
    }

    #[test]
    fn random_respects_the_requested_range() {
        let m = Matrix::<i64>::random(4, 4, 0, 100);
        assert!(m.as_slice().iter().all(|&v| (0..100).contains(&v)));
    }

    #[test]
    fn pretty_prints_rows_on_separate_lines() {
        let m = Matrix::from_rows(vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(m.pretty(), "1\t2\n3\t4");
    }
}
