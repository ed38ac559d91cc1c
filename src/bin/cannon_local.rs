//! Runs the full distributed multiplication inside one process, one thread
//! per rank, over the thread-backed transport. Useful for trying the
//! algorithm without an MPI installation; the communication pattern is the
//! same as under `mpirun`.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;

use cannon_mul::cannon::{self, Operands};
use cannon_mul::io;
use cannon_mul::matrix::Element;
use cannon_mul::timing::Stopwatch;
use cannon_mul::transport::local::run_group;
use cannon_mul::transport::Transport;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Multiplies two square CSV matrices with Cannon's algorithm on in-process threads"
)]
struct Args {
    /// CSV file holding matrix A.
    matrix_a: PathBuf,

    /// CSV file holding matrix B.
    matrix_b: PathBuf,

    /// Side length of both operands.
    n: usize,

    /// Number of logical processes to spawn; must be a perfect square.
    #[arg(short = 'c', long, default_value_t = 4)]
    processes: usize,

    /// Treat the matrices as integer-valued instead of floating-point.
    #[arg(short, long, action)]
    integers: bool,

    /// Pretty-print the result.
    #[arg(short, long, action)]
    print: bool,

    /// Store the result as CSV at this path.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.integers {
        run::<i64>(&args)
    } else {
        run::<f64>(&args)
    }
}

fn run<T: Element>(args: &Args) -> anyhow::Result<()> {
    let mut watch = Stopwatch::start();
    let a = io::load_square_matrix::<T>(&args.matrix_a, args.n)?;
    let b = io::load_square_matrix::<T>(&args.matrix_b, args.n)?;
    let load = watch.lap("load");

    let mut outcomes = run_group(args.processes, |t| {
        let operands = (t.rank() == cannon::COORDINATOR).then(|| Operands {
            a: a.clone(),
            b: b.clone(),
        });
        cannon::multiply(&t, operands)
    })
    .into_iter();

    // The coordinator's error names the actual precondition failure; the
    // other ranks only ever report the abort it triggered.
    let outcome = outcomes.next().context("group spawned no coordinator")??;
    for other in outcomes {
        other?;
    }

    let result = outcome.result.context("coordinator produced no result")?;
    info!("{load}");
    for span in &outcome.stats.spans {
        info!("{span}");
    }
    info!(
        "{} iterations, {} block exchanges on the coordinator",
        outcome.stats.iterations, outcome.stats.exchanges
    );
    if args.print {
        println!("{}", result.pretty());
    }
    if let Some(path) = &args.output {
        io::store_matrix(&result, path)?;
        info!("stored the result at {}", path.display());
    }
    Ok(())
}
