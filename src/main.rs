use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::{error, info};
use mpi::traits::Equivalence;

use cannon_mul::cannon::{self, Operands};
use cannon_mul::io;
use cannon_mul::matrix::Element;
use cannon_mul::timing::Stopwatch;
use cannon_mul::transport::mpi::MpiTransport;

#[derive(Parser, Debug)]
#[command(version, about = "Multiplies two square CSV matrices with Cannon's algorithm over MPI")]
struct Args {
    /// CSV file holding matrix A.
    matrix_a: PathBuf,

    /// CSV file holding matrix B.
    matrix_b: PathBuf,

    /// Side length of both operands.
    n: usize,

    /// Treat the matrices as integer-valued instead of floating-point.
    #[arg(short, long, action)]
    integers: bool,

    /// Pretty-print the result on the coordinator.
    #[arg(short, long, action)]
    print: bool,

    /// Store the result as CSV at this path.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    // Usage errors exit here, before any group communication starts.
    let args = Args::parse();

    let universe = mpi::initialize().context("mpi was already initialized")?;
    let transport = MpiTransport::new(universe.world());

    if args.integers {
        run::<i64>(&transport, &args)
    } else {
        run::<f64>(&transport, &args)
    }
}

fn run<T: Element + Equivalence>(transport: &MpiTransport, args: &Args) -> anyhow::Result<()> {
    let mut watch = Stopwatch::start();

    let operands = if transport.rank() == cannon::COORDINATOR {
        match load_operands::<T>(args) {
            Ok(operands) => Some(operands),
            Err(err) => {
                // The other ranks are parked in the first broadcast by now;
                // take the whole group down instead of leaving them there.
                error!("{err}");
                transport.abort(cannon::CONFIG_ABORT_CODE);
            }
        }
    } else {
        None
    };
    let load = watch.lap("load");

    let outcome = cannon::multiply(transport, operands)?;

    if let Some(result) = outcome.result {
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
    }
    Ok(())
}

fn load_operands<T: Element>(args: &Args) -> cannon_mul::Result<Operands<T>> {
    Ok(Operands {
        a: io::load_square_matrix(&args.matrix_a, args.n)?,
        b: io::load_square_matrix(&args.matrix_b, args.n)?,
    })
}
