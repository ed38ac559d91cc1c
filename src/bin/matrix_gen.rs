//! Generates a CSV matrix of random values to feed the multipliers:
//! integers in `[0, 100)` by default, floats in `[0, 1)` with `--float`.

use std::path::PathBuf;

use clap::Parser;
use log::info;

use cannon_mul::io;
use cannon_mul::matrix::Matrix;

#[derive(Parser, Debug)]
#[command(version, about = "Writes a CSV matrix filled with random values")]
struct Args {
    /// Number of rows to generate.
    rows: usize,

    /// Number of columns to generate.
    cols: usize,

    /// Where to write the CSV file.
    path: PathBuf,

    /// Generate floats in [0, 1) instead of integers in [0, 100).
    #[arg(short, long, action)]
    float: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.float {
        io::store_matrix(&Matrix::<f64>::random(args.rows, args.cols, 0.0, 1.0), &args.path)?;
    } else {
        io::store_matrix(&Matrix::<i64>::random(args.rows, args.cols, 0, 100), &args.path)?;
    }
    info!(
        "wrote a random {}x{} matrix to {}",
        args.rows,
        args.cols,
        args.path.display()
    );
    Ok(())
}
