//! rsmpi-backed transport; one MPI process per rank.
//!
//! A thin wrapper over the world communicator: broadcasts, tagged
//! send/receive and the barrier map one-to-one onto their MPI
//! counterparts, and `abort` is `MPI_Abort` on the world. Compiled only
//! with the `mpi` feature.

use mpi::topology::SimpleCommunicator;
use mpi::traits::{Communicator, Destination, Equivalence, Root, Source};

use super::{Tag, Transport, TransportError};

pub struct MpiTransport {
    world: SimpleCommunicator,
}

impl MpiTransport {
    pub fn new(world: SimpleCommunicator) -> Self {
        Self { world }
    }

    pub fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    pub fn size(&self) -> usize {
        self.world.size() as usize
    }

    /// Terminates every process of the world; never returns.
    pub fn abort(&self, code: i32) -> ! {
        self.world.abort(code)
    }
}

impl<T: Equivalence> Transport<T> for MpiTransport {
    fn rank(&self) -> usize {
        MpiTransport::rank(self)
    }

    fn size(&self) -> usize {
        MpiTransport::size(self)
    }

    fn broadcast_dims(&self, header: &mut [u64], root: usize) -> Result<(), TransportError> {
        self.world.process_at_rank(root as i32).broadcast_into(header);
        Ok(())
    }

    fn broadcast(&self, buffer: &mut [T], root: usize) -> Result<(), TransportError> {
        self.world.process_at_rank(root as i32).broadcast_into(buffer);
        Ok(())
    }

    fn send(&self, buffer: &[T], dest: usize, tag: Tag) -> Result<(), TransportError> {
        self.world
            .process_at_rank(dest as i32)
            .send_with_tag(buffer, tag);
        Ok(())
    }

    fn recv(&self, buffer: &mut [T], source: usize, tag: Tag) -> Result<(), TransportError> {
        let status = self
            .world
            .process_at_rank(source as i32)
            .receive_into_with_tag(buffer, tag);
        let count = status.count(T::equivalent_datatype()) as usize;
        if count != buffer.len() {
            return Err(TransportError::SizeMismatch {
                from: source,
                expected: buffer.len(),
                actual: count,
            });
        }
        Ok(())
    }

    fn barrier(&self) -> Result<(), TransportError> {
        self.world.barrier();
        Ok(())
    }

    fn abort(&self, code: i32) {
        MpiTransport::abort(self, code)
    }
}
