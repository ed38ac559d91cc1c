//! Thread-backed transport for running the algorithm inside one process.
//!
//! Each rank is an OS thread sharing one mailbox table. Sends are
//! rendezvous: the sender parks until the receiver has taken its envelope,
//! so an ordering mistake that would deadlock a real MPI run stalls here
//! too and is converted into an error by the watchdog timeout instead of
//! hanging the test run. `abort` poisons the group and wakes every parked
//! rank.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use super::{Tag, Transport, TransportError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// Tags at the top of the range are reserved for the collectives;
// point-to-point traffic keeps to small application tags.
const BCAST_DATA_TAG: Tag = Tag::MAX - 1;
const BCAST_DIMS_TAG: Tag = Tag::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Data,
    Dims,
}

enum Payload<T> {
    Data(Vec<T>),
    Dims(Vec<u64>),
}

impl<T> Payload<T> {
    fn kind(&self) -> Kind {
        match self {
            Payload::Data(_) => Kind::Data,
            Payload::Dims(_) => Kind::Dims,
        }
    }
}

struct Envelope<T> {
    id: u64,
    source: usize,
    tag: Tag,
    payload: Payload<T>,
}

struct GroupState<T> {
    mailboxes: Vec<Vec<Envelope<T>>>,
    barrier_arrived: usize,
    barrier_generation: u64,
    poisoned: Option<i32>,
}

struct Shared<T> {
    state: Mutex<GroupState<T>>,
    changed: Condvar,
    next_id: AtomicU64,
    size: usize,
    timeout: Duration,
}

impl<T> Shared<T> {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GroupState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A group of in-process ranks sharing one mailbox table.
pub struct LocalGroup<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send> LocalGroup<T> {
    pub fn new(size: usize) -> Self {
        Self::with_timeout(size, DEFAULT_TIMEOUT)
    }

    /// * `size`: Number of ranks in the group.
    /// * `timeout`: Watchdog limit for any single blocking operation.
    pub fn with_timeout(size: usize, timeout: Duration) -> Self {
        assert!(size > 0);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(GroupState {
                    mailboxes: (0..size).map(|_| Vec::new()).collect(),
                    barrier_arrived: 0,
                    barrier_generation: 0,
                    poisoned: None,
                }),
                changed: Condvar::new(),
                next_id: AtomicU64::new(0),
                size,
                timeout,
            }),
        }
    }

    /// Handle through which one rank talks to the group.
    pub fn transport(&self, rank: usize) -> LocalTransport<T> {
        assert!(rank < self.shared.size);
        LocalTransport {
            shared: Arc::clone(&self.shared),
            rank,
        }
    }
}

/// One rank's endpoint of a [`LocalGroup`].
pub struct LocalTransport<T> {
    shared: Arc<Shared<T>>,
    rank: usize,
}

impl<T: Clone + Send> LocalTransport<T> {
    /// Deposits one envelope in every other rank's mailbox and parks until
    /// all of them have been taken.
    fn deposit_to_all(
        &self,
        mut payload: impl FnMut() -> Payload<T>,
        tag: Tag,
    ) -> Result<(), TransportError> {
        let mut state = self.shared.lock();
        if let Some(code) = state.poisoned {
            return Err(TransportError::Aborted(code));
        }

        let mut pending = Vec::with_capacity(self.shared.size - 1);
        for dest in 0..self.shared.size {
            if dest == self.rank {
                continue;
            }
            let id = self.shared.next_id();
            state.mailboxes[dest].push(Envelope {
                id,
                source: self.rank,
                tag,
                payload: payload(),
            });
            pending.push((dest, id));
        }
        self.shared.changed.notify_all();

        let deadline = Instant::now() + self.shared.timeout;
        loop {
            if let Some(code) = state.poisoned {
                return Err(TransportError::Aborted(code));
            }
            pending.retain(|&(dest, id)| state.mailboxes[dest].iter().any(|e| e.id == id));
            if pending.is_empty() {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                let stalled = pending[0].0;
                for &(dest, id) in &pending {
                    state.mailboxes[dest].retain(|e| e.id != id);
                }
                return Err(TransportError::SendTimeout { dest: stalled });
            }
            let (guard, _) = self
                .shared
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Removes and returns the first envelope matching source, tag and kind.
    fn take_envelope(
        &self,
        source: usize,
        tag: Tag,
        kind: Kind,
    ) -> Result<Payload<T>, TransportError> {
        let mut state = self.shared.lock();
        let deadline = Instant::now() + self.shared.timeout;
        loop {
            if let Some(code) = state.poisoned {
                return Err(TransportError::Aborted(code));
            }
            let position = state.mailboxes[self.rank]
                .iter()
                .position(|e| e.source == source && e.tag == tag && e.payload.kind() == kind);
            if let Some(position) = position {
                let envelope = state.mailboxes[self.rank].remove(position);
                self.shared.changed.notify_all();
                return Ok(envelope.payload);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TransportError::RecvTimeout { from: source });
            }
            let (guard, _) = self
                .shared
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }
}

impl<T: Clone + Send> Transport<T> for LocalTransport<T> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn broadcast_dims(&self, header: &mut [u64], root: usize) -> Result<(), TransportError> {
        if self.rank == root {
            self.deposit_to_all(|| Payload::Dims(header.to_vec()), BCAST_DIMS_TAG)
        } else {
            match self.take_envelope(root, BCAST_DIMS_TAG, Kind::Dims)? {
                Payload::Dims(dims) => {
                    if dims.len() != header.len() {
                        return Err(TransportError::SizeMismatch {
                            from: root,
                            expected: header.len(),
                            actual: dims.len(),
                        });
                    }
                    header.copy_from_slice(&dims);
                    Ok(())
                }
                Payload::Data(_) => unreachable!(),
            }
        }
    }

    fn broadcast(&self, buffer: &mut [T], root: usize) -> Result<(), TransportError> {
        if self.rank == root {
            self.deposit_to_all(|| Payload::Data(buffer.to_vec()), BCAST_DATA_TAG)
        } else {
            match self.take_envelope(root, BCAST_DATA_TAG, Kind::Data)? {
                Payload::Data(data) => {
                    if data.len() != buffer.len() {
                        return Err(TransportError::SizeMismatch {
                            from: root,
                            expected: buffer.len(),
                            actual: data.len(),
                        });
                    }
                    buffer.clone_from_slice(&data);
                    Ok(())
                }
                Payload::Dims(_) => unreachable!(),
            }
        }
    }

    fn send(&self, buffer: &[T], dest: usize, tag: Tag) -> Result<(), TransportError> {
        assert!(dest < self.shared.size);
        let id = self.shared.next_id();
        let mut state = self.shared.lock();
        if let Some(code) = state.poisoned {
            return Err(TransportError::Aborted(code));
        }
        state.mailboxes[dest].push(Envelope {
            id,
            source: self.rank,
            tag,
            payload: Payload::Data(buffer.to_vec()),
        });
        self.shared.changed.notify_all();

        let deadline = Instant::now() + self.shared.timeout;
        loop {
            if let Some(code) = state.poisoned {
                return Err(TransportError::Aborted(code));
            }
            if !state.mailboxes[dest].iter().any(|e| e.id == id) {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                // Withdraw the unconsumed envelope so a late receiver
                // cannot match a send that already failed.
                state.mailboxes[dest].retain(|e| e.id != id);
                return Err(TransportError::SendTimeout { dest });
            }
            let (guard, _) = self
                .shared
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    fn recv(&self, buffer: &mut [T], source: usize, tag: Tag) -> Result<(), TransportError> {
        assert!(source < self.shared.size);
        match self.take_envelope(source, tag, Kind::Data)? {
            Payload::Data(data) => {
                if data.len() != buffer.len() {
                    return Err(TransportError::SizeMismatch {
                        from: source,
                        expected: buffer.len(),
                        actual: data.len(),
                    });
                }
                buffer.clone_from_slice(&data);
                Ok(())
            }
            Payload::Dims(_) => unreachable!(),
        }
    }

    fn barrier(&self) -> Result<(), TransportError> {
        let mut state = self.shared.lock();
        if let Some(code) = state.poisoned {
            return Err(TransportError::Aborted(code));
        }
        let generation = state.barrier_generation;
        state.barrier_arrived += 1;
        if state.barrier_arrived == self.shared.size {
            state.barrier_arrived = 0;
            state.barrier_generation += 1;
            self.shared.changed.notify_all();
            return Ok(());
        }

        let deadline = Instant::now() + self.shared.timeout;
        loop {
            if let Some(code) = state.poisoned {
                return Err(TransportError::Aborted(code));
            }
            if state.barrier_generation != generation {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TransportError::BarrierTimeout);
            }
            let (guard, _) = self
                .shared
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    fn abort(&self, code: i32) {
        let mut state = self.shared.lock();
        if state.poisoned.is_none() {
            state.poisoned = Some(code);
            log::warn!("rank {} aborted the local group with code {}", self.rank, code);
        }
        self.shared.changed.notify_all();
    }
}

/// Runs `body` once per rank, each on its own thread over a fresh group,
/// and returns the per-rank results in rank order.
///
/// * `processes`: Number of ranks to spawn.
/// * `body`: The program every rank executes.
pub fn run_group<T, R, F>(processes: usize, body: F) -> Vec<R>
where
    T: Clone + Send,
    R: Send,
    F: Fn(LocalTransport<T>) -> R + Sync,
{
    let group = LocalGroup::new(processes);
    let transports: Vec<LocalTransport<T>> = (0..processes).map(|r| group.transport(r)).collect();

    thread::scope(|scope| {
        let body = &body;
        let handles: Vec<_> = transports
            .into_iter()
            .map(|transport| scope.spawn(move || body(transport)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("process thread panicked"))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn send_hands_off_directly_to_the_receiver() {
        let results = run_group::<i64, _, _>(2, |t| {
            if t.rank() == 0 {
                let payload = vec![4, 5, 6];
                t.send(&payload, 1, 3)?;
                Ok::<Vec<i64>, TransportError>(payload)
            } else {
                let mut incoming = vec![0i64; 3];
                t.recv(&mut incoming, 0, 3)?;
                Ok(incoming)
            }
        });
        assert_eq!(results[0].as_deref(), Ok(&[4, 5, 6][..]));
        assert_eq!(results[1].as_deref(), Ok(&[4, 5, 6][..]));
    }

    #[test]
    fn same_tag_messages_preserve_send_order() {
        let results = run_group::<i64, _, _>(2, |t| {
            if t.rank() == 0 {
                t.send(&[1], 1, 7)?;
                t.send(&[2], 1, 7)?;
                Ok::<Vec<i64>, TransportError>(Vec::new())
            } else {
                let mut first = vec![0i64; 1];
                let mut second = vec![0i64; 1];
                t.recv(&mut first, 0, 7)?;
                t.recv(&mut second, 0, 7)?;
                Ok(vec![first[0], second[0]])
            }
        });
        assert_eq!(results[1].as_deref(), Ok(&[1, 2][..]));
    }

    #[test]
    fn broadcast_copies_the_root_buffer_everywhere() {
        let results = run_group::<f64, _, _>(4, |t| {
            let mut buffer = if t.rank() == 0 {
                vec![1.5, 2.5, 3.5]
            } else {
                vec![0.0; 3]
            };
            t.broadcast(&mut buffer, 0)?;
            Ok::<_, TransportError>(buffer)
        });
        for result in results {
            assert_eq!(result.unwrap(), vec![1.5, 2.5, 3.5]);
        }
    }

    #[test]
    fn dimension_header_reaches_every_rank() {
        let results = run_group::<f64, _, _>(4, |t| {
            let mut header = if t.rank() == 0 { [6, 2, 3] } else { [0; 3] };
            t.broadcast_dims(&mut header, 0)?;
            Ok::<_, TransportError>(header)
        });
        for result in results {
            assert_eq!(result.unwrap(), [6, 2, 3]);
        }
    }

    #[test]
    fn barrier_holds_until_every_rank_arrives() {
        let arrived = AtomicUsize::new(0);
        let results = run_group::<u8, _, _>(4, |t| {
            thread::sleep(Duration::from_millis(5 * t.rank() as u64));
            arrived.fetch_add(1, Ordering::SeqCst);
            t.barrier()?;
            Ok::<_, TransportError>(arrived.load(Ordering::SeqCst))
        });
        for result in results {
            assert_eq!(result.unwrap(), 4);
        }
    }

    #[test]
    fn abort_unblocks_a_parked_receive() {
        let results = run_group::<f64, _, _>(2, |t| {
            if t.rank() == 0 {
                let mut buffer = vec![0.0; 4];
                t.recv(&mut buffer, 1, 0)
            } else {
                thread::sleep(Duration::from_millis(50));
                t.abort(9);
                Ok(())
            }
        });
        assert_eq!(results[0], Err(TransportError::Aborted(9)));
        assert_eq!(results[1], Ok(()));
    }

    #[test]
    fn operations_after_an_abort_fail_immediately() {
        let group = LocalGroup::<i64>::new(2);
        let one = group.transport(0);
        let other = group.transport(1);
        one.abort(3);
        assert_eq!(other.send(&[1], 0, 0), Err(TransportError::Aborted(3)));
        assert_eq!(other.barrier(), Err(TransportError::Aborted(3)));
    }

    #[test]
    fn mismatched_receive_length_is_rejected() {
        let results = run_group::<i64, _, _>(2, |t| {
            if t.rank() == 0 {
                t.send(&[1, 2, 3], 1, 0)
            } else {
                let mut short = vec![0i64; 2];
                t.recv(&mut short, 0, 0)
            }
        });
        assert_eq!(results[0], Ok(()));
        assert_eq!(
            results[1],
            Err(TransportError::SizeMismatch {
                from: 0,
                expected: 2,
                actual: 3
            })
        );
    }

    #[test]
    fn unconsumed_send_times_out_and_is_withdrawn() {
        let group = LocalGroup::<i64>::with_timeout(2, Duration::from_millis(50));
        let sender = group.transport(0);
        let result = sender.send(&[1, 2, 3], 1, 0);
        assert_eq!(result, Err(TransportError::SendTimeout { dest: 1 }));

        // The withdrawn envelope must not satisfy a later receive.
        let receiver = group.transport(1);
        let mut buffer = vec![0i64; 3];
        assert_eq!(
            receiver.recv(&mut buffer, 0, 0),
            Err(TransportError::RecvTimeout { from: 0 })
        );
    }

    #[test]
    fn rank_ordered_ring_exchange_completes() {
        let results = run_group::<i64, _, _>(4, |t| {
            let me = t.rank();
            let dest = (me + 1) % 4;
            let source = (me + 3) % 4;
            let outgoing = vec![me as i64; 8];
            let mut incoming = vec![0i64; 8];
            // Lower rank of each edge sends first, the higher receives first.
            if me < dest {
                t.send(&outgoing, dest, me as Tag)?;
                t.recv(&mut incoming, source, source as Tag)?;
            } else {
                t.recv(&mut incoming, source, source as Tag)?;
                t.send(&outgoing, dest, me as Tag)?;
            }
            Ok::<_, TransportError>(incoming[0])
        });
        for (rank, value) in results.into_iter().enumerate() {
            assert_eq!(value.unwrap(), ((rank + 3) % 4) as i64);
        }
    }
}
