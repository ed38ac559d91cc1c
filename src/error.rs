use std::path::PathBuf;

use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("process count {0} is not a perfect square")]
    NotPerfectSquare(usize),

    #[error("matrix dimension {n} is not divisible by grid side {side}")]
    IndivisibleDimension { n: usize, side: usize },

    #[error("operand shapes disagree: left is {left_rows}x{left_cols}, right is {right_rows}x{right_cols}")]
    OperandShapes {
        left_rows: usize,
        left_cols: usize,
        right_rows: usize,
        right_cols: usize,
    },

    #[error("matrix is {rows}x{cols}, expected a square matrix")]
    NotSquare { rows: usize, cols: usize },

    #[error("matrix is {rows}x{cols}, expected {expected}x{expected}")]
    DimensionMismatch {
        rows: usize,
        cols: usize,
        expected: usize,
    },

    #[error("buffer of length {len} cannot hold a {rows}x{cols} matrix")]
    BufferShape { len: usize, rows: usize, cols: usize },

    #[error("coordinator rank was started without operand matrices")]
    MissingOperands,

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}:{column}: cannot parse {token:?} as a matrix entry", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        column: usize,
        token: String,
    },

    #[error("{}:{line}: row has {found} entries, expected {expected}", path.display())]
    RaggedRow {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("{}: file contains no matrix rows", path.display())]
    EmptyMatrix { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, Error>;
