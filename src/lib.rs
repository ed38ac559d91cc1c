//! Distributed dense matrix multiplication with Cannon's algorithm.
//!
//! An n×n product C = A·B is computed by `p*p` cooperating processes laid
//! out on a periodic `p×p` grid. Each process owns one block of A and one
//! of B; after an initial alignment the grid rotates A-blocks left and
//! B-blocks up in lock-step, accumulating partial products for `p`
//! iterations, and the coordinator gathers the finished blocks back into
//! the full result.
//!
//! The algorithm itself lives in [`cannon`] and is generic over the
//! [`transport::Transport`] it communicates through: an MPI world (behind
//! the `mpi` feature) or the thread-backed [`transport::local`] group used
//! by the tests and the `cannon-local` binary.

pub mod cannon;
pub mod error;
pub mod io;
pub mod matrix;
pub mod partition;
pub mod timing;
pub mod topology;
pub mod transport;

pub use error::{Error, Result};
