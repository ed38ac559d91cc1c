//! Cannon's algorithm over the transport boundary.
//!
//! Every rank of the group calls [`multiply`] with the same transport: the
//! coordinator validates and broadcasts the operands, each rank cuts out
//! its blocks, skews them into the initial alignment, runs the
//! rotate-multiply-accumulate loop, and the coordinator gathers the
//! finished blocks back into the full product.

use log::{debug, error, info};

use crate::error::{Error, Result};
use crate::matrix::{Element, Matrix};
use crate::partition::{assemble_block, extract_block};
use crate::timing::{Span, Stopwatch};
use crate::topology::{grid_side, Axis, GridTopology, ShiftTarget};
use crate::transport::{Tag, Transport};

/// Rank responsible for I/O, validation and result assembly.
pub const COORDINATOR: usize = 0;

/// Exit code the group is aborted with on an invalid configuration.
pub const CONFIG_ABORT_CODE: i32 = 2;

const SKEW_A_TAG: Tag = 101;
const SKEW_B_TAG: Tag = 102;
const ROTATE_A_TAG: Tag = 103;
const ROTATE_B_TAG: Tag = 104;

/// The two global operands; passed in on the coordinator only.
#[derive(Debug, Clone)]
pub struct Operands<T> {
    pub a: Matrix<T>,
    pub b: Matrix<T>,
}

/// Counters and phase timings one rank collects during a run.
#[derive(Debug, Clone)]
pub struct RunStats {
    /// Rotate-multiply-accumulate iterations performed; always the grid side.
    pub iterations: usize,
    /// Pairwise block exchanges this rank took part in (self-shifts excluded).
    pub exchanges: usize,
    /// Durations of the distribute, compute and gather phases.
    pub spans: Vec<Span>,
}

/// What one rank ends up with: the assembled product on the coordinator,
/// `None` everywhere else, plus this rank's [`RunStats`].
#[derive(Debug)]
pub struct Outcome<T> {
    pub result: Option<Matrix<T>>,
    pub stats: RunStats,
}

/// Runs the distributed multiplication on this rank.
///
/// * `transport`: This rank's endpoint of the process group.
/// * `operands`: The global matrices; `Some` on the coordinator, `None`
///   elsewhere.
///
/// Configuration errors (process count not a perfect square, operand shape
/// problems, dimension not divisible by the grid side) abort the whole
/// group before any data is distributed; there is no partial result.
pub fn multiply<T, Tr>(transport: &Tr, operands: Option<Operands<T>>) -> Result<Outcome<T>>
where
    T: Element,
    Tr: Transport<T>,
{
    let rank = transport.rank();
    let size = transport.size();

    let side = match grid_side(size) {
        Some(side) => side,
        None => return fail(transport, rank, Error::NotPerfectSquare(size)),
    };

    let mut watch = Stopwatch::start();

    // Coordinator-side validation must finish before the first broadcast so
    // an invalid configuration aborts the group instead of stalling it.
    let mut header = [0u64; 1];
    let operands = if rank == COORDINATOR {
        let operands = match operands.ok_or(Error::MissingOperands) {
            Ok(operands) => operands,
            Err(err) => return fail(transport, rank, err),
        };
        if let Err(err) = validate(&operands, side) {
            return fail(transport, rank, err);
        }
        header[0] = operands.a.rows() as u64;
        Some(operands)
    } else {
        None
    };
    transport.broadcast_dims(&mut header, COORDINATOR)?;
    let n = header[0] as usize;
    let block_dim = n / side;

    let grid = GridTopology::new(side, rank);
    let coord = grid.coord();
    debug!(
        "rank {} at ({}, {}) on a {side}x{side} grid, block side {block_dim}",
        grid.rank(),
        coord.row,
        coord.col
    );

    let (mut block_a, mut block_b) = distribute(transport, operands, &grid, n, block_dim)?;
    let mut stats = RunStats {
        iterations: 0,
        exchanges: 0,
        spans: Vec::new(),
    };
    stats.spans.push(watch.lap("distribute"));

    // Initial alignment: row i of A moves left by i, column j of B up by j.
    exchange(
        transport,
        &mut block_a,
        grid.shift(Axis::Col, coord.row as i64),
        SKEW_A_TAG,
        &mut stats,
    )?;
    exchange(
        transport,
        &mut block_b,
        grid.shift(Axis::Row, coord.col as i64),
        SKEW_B_TAG,
        &mut stats,
    )?;

    let mut acc = Matrix::zeros(block_dim, block_dim);
    for _ in 0..side {
        acc.multiply_accumulate(&block_a, &block_b);
        exchange(
            transport,
            &mut block_a,
            grid.shift(Axis::Col, 1),
            ROTATE_A_TAG,
            &mut stats,
        )?;
        exchange(
            transport,
            &mut block_b,
            grid.shift(Axis::Row, 1),
            ROTATE_B_TAG,
            &mut stats,
        )?;
        // No rank may start the next multiply until every rank has finished
        // this rotation; the barrier pins the iteration boundary.
        transport.barrier()?;
        stats.iterations += 1;
    }
    stats.spans.push(watch.lap("compute"));

    let result = gather(transport, &grid, acc, n)?;
    stats.spans.push(watch.lap("gather"));

    if rank == COORDINATOR {
        info!("multiplied two {n}x{n} matrices over {size} processes");
    }
    Ok(Outcome { result, stats })
}

/// Reports a configuration error; the coordinator additionally takes the
/// whole group down so no rank is left parked in a broadcast.
fn fail<T, Tr>(transport: &Tr, rank: usize, err: Error) -> Result<Outcome<T>>
where
    T: Element,
    Tr: Transport<T>,
{
    if rank == COORDINATOR {
        error!("{err}");
        transport.abort(CONFIG_ABORT_CODE);
    }
    Err(err)
}

fn validate<T: Element>(operands: &Operands<T>, side: usize) -> Result<()> {
    let (a, b) = (&operands.a, &operands.b);
    if !a.is_square() {
        return Err(Error::NotSquare {
            rows: a.rows(),
            cols: a.cols(),
        });
    }
    if !b.is_square() {
        return Err(Error::NotSquare {
            rows: b.rows(),
            cols: b.cols(),
        });
    }
    if a.rows() != b.rows() {
        return Err(Error::OperandShapes {
            left_rows: a.rows(),
            left_cols: a.cols(),
            right_rows: b.rows(),
            right_cols: b.cols(),
        });
    }
    if a.rows() % side != 0 {
        return Err(Error::IndivisibleDimension {
            n: a.rows(),
            side,
        });
    }
    Ok(())
}

/// Broadcasts both operands and cuts out this rank's blocks; the full
/// copies are dropped as soon as the blocks are extracted.
fn distribute<T, Tr>(
    transport: &Tr,
    operands: Option<Operands<T>>,
    grid: &GridTopology,
    n: usize,
    block_dim: usize,
) -> Result<(Matrix<T>, Matrix<T>)>
where
    T: Element,
    Tr: Transport<T>,
{
    let (mut a, mut b) = match operands {
        Some(operands) => (operands.a, operands.b),
        None => (Matrix::zeros(n, n), Matrix::zeros(n, n)),
    };
    transport.broadcast(a.as_mut_slice(), COORDINATOR)?;
    transport.broadcast(b.as_mut_slice(), COORDINATOR)?;

    let coord = grid.coord();
    Ok((
        extract_block(&a, coord, block_dim),
        extract_block(&b, coord, block_dim),
    ))
}

/// Rotates one block along the grid: sends the current block to
/// `target.dest` and replaces it with the one arriving from `target.source`.
///
/// Deadlock avoidance on each send edge is by rank comparison: the smaller
/// rank sends before it receives, the larger receives before it sends. A
/// rotation cycle then always contains at least one rank ready to receive,
/// so the blocking transfers cannot all stall at once. A self-shift
/// performs no communication at all.
fn exchange<T, Tr>(
    transport: &Tr,
    block: &mut Matrix<T>,
    target: ShiftTarget,
    tag: Tag,
    stats: &mut RunStats,
) -> Result<()>
where
    T: Element,
    Tr: Transport<T>,
{
    let rank = transport.rank();
    if target.source == rank {
        return Ok(());
    }

    let mut incoming = vec![T::zero(); block.as_slice().len()];
    if rank < target.dest {
        transport.send(block.as_slice(), target.dest, tag)?;
        transport.recv(&mut incoming, target.source, tag)?;
    } else {
        transport.recv(&mut incoming, target.source, tag)?;
        transport.send(block.as_slice(), target.dest, tag)?;
    }
    block.as_mut_slice().copy_from_slice(&incoming);
    stats.exchanges += 1;
    Ok(())
}

/// All-to-one collection of the finished accumulator blocks; the
/// coordinator rebuilds the product in increasing sender-rank order.
fn gather<T, Tr>(
    transport: &Tr,
    grid: &GridTopology,
    acc: Matrix<T>,
    n: usize,
) -> Result<Option<Matrix<T>>>
where
    T: Element,
    Tr: Transport<T>,
{
    let rank = transport.rank();
    if rank != COORDINATOR {
        // Tagged with the sender's own rank so the origin of every block is
        // visible on the wire.
        transport.send(acc.as_slice(), COORDINATOR, rank as Tag)?;
        return Ok(None);
    }

    let block_dim = acc.rows();
    let mut result = Matrix::zeros(n, n);
    assemble_block(&mut result, grid.coord(), &acc);
    for sender in 1..grid.side() * grid.side() {
        let mut buffer = vec![T::zero(); block_dim * block_dim];
        transport.recv(&mut buffer, sender, sender as Tag)?;
        let block = Matrix::from_vec(block_dim, block_dim, buffer)?;
        assemble_block(&mut result, grid.coord_of(sender), &block);
    }
    Ok(Some(result))
}
