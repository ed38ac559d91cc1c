//! CSV loading and storing of matrices, used by the coordinator before
//! distribution and after the gather.
//!
//! The format is plain comma-separated values, one matrix row per line. A
//! UTF-8 byte order mark and CRLF line endings are tolerated on input;
//! output is written LF-terminated at full precision.

use std::fs;
use std::path::Path;

use itertools::Itertools;

use crate::error::{Error, Result};
use crate::matrix::{Element, Matrix};

/// Reads a matrix from a CSV file.
///
/// Rows must all have the same number of entries; a ragged or unparsable
/// file is reported with its path, line and column.
pub fn load_matrix<T: Element>(path: &Path) -> Result<Matrix<T>> {
    let text = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut data = Vec::new();
    let mut rows = 0;
    let mut cols = None;
    for (index, line) in text.lines().enumerate() {
        let line = line.trim_start_matches('\u{feff}');
        if line.is_empty() {
            continue;
        }

        let mut width = 0;
        for (column, token) in line.split(',').enumerate() {
            let token = token.trim();
            let value: T = token.parse().map_err(|_| Error::Parse {
                path: path.to_path_buf(),
                line: index + 1,
                column: column + 1,
                token: token.to_string(),
            })?;
            data.push(value);
            width += 1;
        }

        match cols {
            None => cols = Some(width),
            Some(expected) if expected != width => {
                return Err(Error::RaggedRow {
                    path: path.to_path_buf(),
                    line: index + 1,
                    expected,
                    found: width,
                });
            }
            Some(_) => {}
        }
        rows += 1;
    }

    match cols {
        Some(cols) => Matrix::from_vec(rows, cols, data),
        None => Err(Error::EmptyMatrix {
            path: path.to_path_buf(),
        }),
    }
}

/// Reads a matrix and checks it against the dimension declared on the
/// command line.
pub fn load_square_matrix<T: Element>(path: &Path, n: usize) -> Result<Matrix<T>> {
    let matrix = load_matrix(path)?;
    if !matrix.is_square() {
        return Err(Error::NotSquare {
            rows: matrix.rows(),
            cols: matrix.cols(),
        });
    }
    if matrix.rows() != n {
        return Err(Error::DimensionMismatch {
            rows: matrix.rows(),
            cols: matrix.cols(),
            expected: n,
        });
    }
    Ok(matrix)
}

/// Writes a matrix as CSV, one row per line.
pub fn store_matrix<T: Element>(matrix: &Matrix<T>, path: &Path) -> Result<()> {
    let mut text = matrix
        .as_slice()
        .chunks(matrix.cols())
        .map(|row| row.iter().join(","))
        .join("\n");
    text.push('\n');
    fs::write(path, text).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use tempfile::NamedTempFile;

    fn file_with(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn load_reads_a_plain_csv() {
        let file = file_with("1,2\n3,4\n");
        let matrix: Matrix<i64> = load_matrix(file.path()).unwrap();
        assert_eq!(matrix, Matrix::from_rows(vec![vec![1, 2], vec![3, 4]]));
    }

    #[test]
    fn load_tolerates_bom_and_crlf() {
        let file = file_with("\u{feff}1.5, 2.5\r\n3.5,4.5\r\n");
        let matrix: Matrix<f64> = load_matrix(file.path()).unwrap();
        assert_eq!(
            matrix,
            Matrix::from_rows(vec![vec![1.5, 2.5], vec![3.5, 4.5]])
        );
    }

    #[test]
    fn store_then_load_round_trips() {
        let matrix = Matrix::from_rows(vec![vec![1, 2, 3], vec![4, 5, 6]]);
        let file = NamedTempFile::new().unwrap();
        store_matrix(&matrix, file.path()).unwrap();
        assert_eq!(load_matrix::<i64>(file.path()).unwrap(), matrix);
    }

    #[test]
    fn parse_errors_carry_line_and_column() {
        let file = file_with("1,2\n3,oops\n");
        let err = load_matrix::<i64>(file.path()).unwrap_err();
        assert!(matches!(
            err,
            Error::Parse { line: 2, column: 2, ref token, .. } if token == "oops"
        ));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let file = file_with("1,2,3\n4,5\n");
        let err = load_matrix::<i64>(file.path()).unwrap_err();
        assert!(matches!(
            err,
            Error::RaggedRow {
                line: 2,
                expected: 3,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn empty_files_are_rejected() {
        let file = file_with("\n\n");
        assert!(matches!(
            load_matrix::<f64>(file.path()),
            Err(Error::EmptyMatrix { .. })
        ));
    }

    #[test]
    fn load_square_checks_the_declared_dimension() {
        let file = file_with("1,2\n3,4\n");
        assert!(load_square_matrix::<i64>(file.path(), 2).is_ok());
        assert!(matches!(
            load_square_matrix::<i64>(file.path(), 4),
            Err(Error::DimensionMismatch { rows: 2, expected: 4, .. })
        ));

        let ragged = file_with("1,2,3\n4,5,6\n");
        assert!(matches!(
            load_square_matrix::<i64>(ragged.path(), 3),
            Err(Error::NotSquare { rows: 2, cols: 3 })
        ));
    }
}
