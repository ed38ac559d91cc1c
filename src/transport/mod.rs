//! Message-passing boundary the distributed algorithm runs against.
//!
//! [`Transport`] is the narrow surface the block rotation needs: rank and
//! group size, broadcasts, tagged point-to-point send/receive, a barrier,
//! and whole-group abort. Implementations: [`local::LocalTransport`]
//! (thread per rank in one process; used by the test suite and the
//! `cannon-local` binary) and `mpi::MpiTransport` (rsmpi world, behind the
//! `mpi` feature).

pub mod local;
#[cfg(feature = "mpi")]
pub mod mpi;

use thiserror::Error;

/// Message tag; shares the MPI tag domain.
pub type Tag = i32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("group aborted with code {0}")]
    Aborted(i32),

    #[error("send to rank {dest} timed out")]
    SendTimeout { dest: usize },

    #[error("receive from rank {from} timed out")]
    RecvTimeout { from: usize },

    #[error("barrier timed out")]
    BarrierTimeout,

    #[error("message from rank {from} has {actual} elements, expected {expected}")]
    SizeMismatch {
        from: usize,
        expected: usize,
        actual: usize,
    },
}

/// Blocking message passing between the ranks of one process group.
///
/// All payloads are fixed-length buffers; a receive must present a buffer
/// of exactly the incoming message's length.
pub trait Transport<T> {
    /// This process's rank within the group.
    fn rank(&self) -> usize;

    /// Total number of ranks in the group.
    fn size(&self) -> usize;

    /// Broadcasts the fixed-length dimension header from `root`.
    fn broadcast_dims(&self, header: &mut [u64], root: usize) -> Result<(), TransportError>;

    /// Broadcasts a payload buffer from `root` into every rank's `buffer`.
    fn broadcast(&self, buffer: &mut [T], root: usize) -> Result<(), TransportError>;

    /// Blocking tagged send of `buffer` to `dest`.
    fn send(&self, buffer: &[T], dest: usize, tag: Tag) -> Result<(), TransportError>;

    /// Blocking tagged receive from `source` into `buffer`.
    fn recv(&self, buffer: &mut [T], source: usize, tag: Tag) -> Result<(), TransportError>;

    /// Blocks until every rank of the group has entered the barrier.
    fn barrier(&self) -> Result<(), TransportError>;

    /// Terminates the whole group with the given code.
    fn abort(&self, code: i32);
}
