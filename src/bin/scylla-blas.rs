// Copyright 2018-2021 Parity Technologies (UK) Ltd.
// This file is part of scylla-blas.

// scylla-blas is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// scylla-blas is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with scylla-blas.  If not, see <http://www.gnu.org/licenses/>.

//! Control surface for a scylla-blas cluster (spec §6): `init` sets up
//! the keyspace and a worker queue, `worker` runs a dispatch loop against
//! an existing queue, `benchmark` drives one of three representative
//! workloads end to end for a quick smoke test of a running cluster,
//! mirroring `benchmark.cc`'s `benchmark_mm`/`benchmark_mv`/`benchmark_vv`
//! triple (matrix*matrix, matrix*vector, vector*vector).

use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use structopt::StructOpt;

use scylla_blas::error::{BlasError, Result};
use scylla_blas::matrix::Matrix;
use scylla_blas::queue::{Cardinality, TaskQueue};
use scylla_blas::scheduler::RoutineScheduler;
use scylla_blas::store::{ScyllaStore, Store};
use scylla_blas::types::Transpose;
use scylla_blas::vector::Vector;
use scylla_blas::worker::Worker;

/// Which of the three `benchmark.cc` workloads to run.
#[derive(Copy, Clone, Debug)]
enum BenchmarkOp {
    /// `benchmark_mm`: `sgemm` over two freshly generated square matrices.
    Mm,
    /// `benchmark_mv`: `sgemv` of a generated matrix against a generated vector.
    Mv,
    /// `benchmark_vv`: `sdot` of two generated vectors.
    Vv,
}

impl FromStr for BenchmarkOp {
    type Err = BlasError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mm" | "gemm" => Ok(BenchmarkOp::Mm),
            "mv" | "gemv" => Ok(BenchmarkOp::Mv),
            "vv" | "dot" => Ok(BenchmarkOp::Vv),
            other => Err(BlasError::CorruptPayload(format!("unknown benchmark operation {other:?}"))),
        }
    }
}

#[derive(StructOpt)]
#[structopt(name = "scylla-blas", about = "distributed BLAS over a wide-column store")]
struct Opt {
    /// Store address, `host:port`.
    #[structopt(long, default_value = "127.0.0.1:9042")]
    host: String,

    /// Keyspace to create/use.
    #[structopt(long, default_value = "scylla_blas")]
    keyspace: String,

    /// Verbosity: repeat for more (e.g. -vv).
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Create the keyspace/schema and a fresh worker queue, printing its id.
    Init,
    /// Run a worker dispatch loop against an existing worker queue.
    Worker {
        /// Worker queue id returned by `init`.
        #[structopt(long)]
        queue: i64,
        /// Identity string logged alongside this worker's activity.
        #[structopt(long, default_value = "worker-0")]
        identity: String,
        /// Poll interval when the worker queue is empty.
        #[structopt(long, default_value = "500")]
        poll_micros: u64,
    },
    /// Populate random operands and run a single representative BLAS call
    /// against an existing worker queue, reporting wall-clock time.
    Benchmark {
        /// Worker queue id returned by `init`.
        #[structopt(long)]
        queue: i64,
        /// Which workload to run: `mm`/`gemm`, `mv`/`gemv`, `vv`/`dot`.
        #[structopt(long, default_value = "mm")]
        op: BenchmarkOp,
        /// Problem dimension (square matrices / vector length of size n).
        #[structopt(long, default_value = "64")]
        size: i64,
        /// Tiling size.
        #[structopt(long, default_value = "16")]
        block_size: i64,
        /// Fraction of non-zero entries to generate.
        #[structopt(long, default_value = "0.1")]
        density: f64,
        /// Number of subtask queues (and thus primary tasks) per call.
        #[structopt(long, default_value = "4")]
        workers: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::from_args();
    let level = match opt.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    scylla_blas::logger::init(level).expect("failed to initialize logger");

    match opt.cmd {
        Command::Init => run_init(&opt.host, &opt.keyspace).await,
        Command::Worker {
            queue,
            identity,
            poll_micros,
        } => run_worker(&opt.host, &opt.keyspace, queue, identity, poll_micros).await,
        Command::Benchmark {
            queue,
            op,
            size,
            block_size,
            density,
            workers,
        } => run_benchmark(&opt.host, &opt.keyspace, queue, op, size, block_size, density, workers).await,
    }
}

async fn run_init(host: &str, keyspace: &str) -> Result<()> {
    let store = Arc::new(ScyllaStore::connect(host, keyspace).await?);
    let queue_id = store.allocate_id().await?;
    TaskQueue::create(store, queue_id, Cardinality::Multi, Cardinality::Multi).await?;
    log::info!("worker queue ready: {queue_id}");
    println!("{queue_id}");
    Ok(())
}

async fn run_worker(host: &str, keyspace: &str, queue: i64, identity: String, poll_micros: u64) -> Result<()> {
    let store = Arc::new(ScyllaStore::connect(host, keyspace).await?);
    let worker = Worker::<ScyllaStore, f64>::attach(store, queue, Duration::from_micros(poll_micros), identity).await?;
    let stop = AtomicBool::new(false);
    worker.run(&stop).await
}

async fn run_benchmark(
    host: &str,
    keyspace: &str,
    queue: i64,
    op: BenchmarkOp,
    size: i64,
    block_size: i64,
    density: f64,
    workers: usize,
) -> Result<()> {
    let store = Arc::new(ScyllaStore::connect(host, keyspace).await?);
    let scheduler = RoutineScheduler::<ScyllaStore, f64>::attach(store.clone(), queue, workers, Duration::from_millis(1)).await?;

    let (label, elapsed) = match op {
        BenchmarkOp::Mm => {
            let a_id = store.allocate_id().await?;
            let b_id = store.allocate_id().await?;
            let c_id = store.allocate_id().await?;
            let a = Matrix::<ScyllaStore, f64>::init(store.clone(), a_id, size, size, block_size).await?;
            let b = Matrix::<ScyllaStore, f64>::init(store.clone(), b_id, size, size, block_size).await?;
            let c = Matrix::<ScyllaStore, f64>::init(store.clone(), c_id, size, size, block_size).await?;
            scheduler.rmgen(&a, density, 1).await?;
            scheduler.rmgen(&b, density, 2).await?;

            let start = std::time::Instant::now();
            scheduler.sgemm(Transpose::NoTrans, Transpose::NoTrans, 1.0, &a, &b, 0.0, &c).await?;
            (format!("gemm({size}x{size}, block {block_size}, density {density})"), start.elapsed())
        }
        BenchmarkOp::Mv => {
            let a_id = store.allocate_id().await?;
            let x_id = store.allocate_id().await?;
            let y_id = store.allocate_id().await?;
            let a = Matrix::<ScyllaStore, f64>::init(store.clone(), a_id, size, size, block_size).await?;
            let x = Vector::<ScyllaStore, f64>::init(store.clone(), x_id, size, block_size).await?;
            let y = Vector::<ScyllaStore, f64>::init(store.clone(), y_id, size, block_size).await?;
            scheduler.rmgen(&a, density, 1).await?;
            scheduler.rvgen(&x, 1.0, 2).await?;

            let start = std::time::Instant::now();
            scheduler.sgemv(Transpose::NoTrans, 1.0, &a, &x, 0.0, &y).await?;
            (format!("gemv({size}x{size}, block {block_size}, density {density})"), start.elapsed())
        }
        BenchmarkOp::Vv => {
            let x_id = store.allocate_id().await?;
            let y_id = store.allocate_id().await?;
            let x = Vector::<ScyllaStore, f64>::init(store.clone(), x_id, size, block_size).await?;
            let y = Vector::<ScyllaStore, f64>::init(store.clone(), y_id, size, block_size).await?;
            scheduler.rvgen(&x, 1.0, 1).await?;
            scheduler.rvgen(&y, 1.0, 2).await?;

            let start = std::time::Instant::now();
            let dot = scheduler.sdot(&x, &y).await?;
            log::debug!("dot result: {dot}");
            (format!("dot(length {size}, block {block_size})"), start.elapsed())
        }
    };

    log::info!("{label} took {elapsed:?}");
    println!("{:.3}ms", elapsed.as_secs_f64() * 1000.0);
    Ok(())
}
