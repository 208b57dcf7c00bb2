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

//! Worker dispatch loop (spec §4.4, grounded on
//! `include/scylla_blas/queue/worker_proc.hh` /
//! `src/scylla_blas/queue/worker_proc.cc`).
//!
//! A worker repeatedly claims one primary task from the shared worker
//! queue, drains every subtask out of the subtask queue it names, and marks
//! the primary task finished with whatever per-primary reduction its
//! subtasks' [`KernelOutcome`]s fold down to.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use log::{debug, error, info};

use crate::error::{BlasError, Result};
use crate::kernels::{run_subtask, KernelOutcome};
use crate::queue::proto::{PrimaryTaskPayload, SubtaskPayload};
use crate::queue::{encode_task_id, TaskQueue};
use crate::store::Store;
use crate::types::{Float, Id};

/// Folds the [`KernelOutcome`]s of every subtask one primary task drained
/// into the single reduction that primary reports on completion (spec
/// §4.4: "with a per-primary reduction (e.g. the sum of partial dots it
/// processed)"). Exactly one of the three response shapes ever applies to
/// a given task kind, so the three branches below are mutually exclusive in
/// practice; tracking all three and picking the one that was actually hit
/// keeps this code independent of a task-kind lookup table.
#[derive(Default)]
struct PrimaryAccumulator {
    sum: f64,
    saw_scalar: bool,
    argmax: Option<(Id, f64)>,
    residual: f64,
    norm: f64,
    saw_residual_norm: bool,
}

impl PrimaryAccumulator {
    fn absorb(&mut self, outcome: KernelOutcome) {
        match outcome {
            KernelOutcome::None => {}
            KernelOutcome::Scalar(v) => {
                self.saw_scalar = true;
                self.sum += v;
            }
            KernelOutcome::ArgMax(index, value) => {
                self.argmax = match self.argmax {
                    None => Some((index, value)),
                    Some((best_index, best_value))
                        if value.abs() > best_value.abs()
                            || (value.abs() == best_value.abs() && index < best_index) =>
                    {
                        Some((index, value))
                    }
                    some => some,
                };
            }
            KernelOutcome::ResidualNorm(residual, norm) => {
                self.saw_residual_norm = true;
                self.residual += residual;
                self.norm += norm;
            }
        }
    }

    /// `(response, aux_index, secondary)` as written to the primary task's
    /// response row.
    fn into_response(self) -> (Option<f64>, Option<Id>, Option<f64>) {
        if let Some((index, value)) = self.argmax {
            (Some(value), Some(index), None)
        } else if self.saw_residual_norm {
            (Some(self.residual), None, Some(self.norm))
        } else if self.saw_scalar {
            (Some(self.sum), None, None)
        } else {
            (None, None, None)
        }
    }
}

/// A long-running worker process (spec §4.4). Configured with a store
/// handle, the shared worker-queue id, and an identity used only for
/// logging; `T` fixes the element type this worker computes in (spec §9
/// "Polymorphism over value types" — see DESIGN.md for why this crate picks
/// a generic worker over a wire-level SGEMM/DGEMM tag split).
pub struct Worker<S: Store, T> {
    store: Arc<S>,
    worker_queue: TaskQueue<S>,
    poll_interval: Duration,
    identity: String,
    _marker: std::marker::PhantomData<T>,
}

impl<S: Store, T: Float> Worker<S, T> {
    pub async fn attach(
        store: Arc<S>,
        worker_queue_id: Id,
        poll_interval: Duration,
        identity: impl Into<String>,
    ) -> Result<Self> {
        let worker_queue = TaskQueue::attach(store.clone(), worker_queue_id).await?;
        Ok(Self {
            store,
            worker_queue,
            poll_interval,
            identity: identity.into(),
            _marker: std::marker::PhantomData,
        })
    }

    /// Runs the `while not stopped` loop of spec §4.4 until `stop` is set.
    pub async fn run(&self, stop: &AtomicBool) -> Result<()> {
        info!("worker {} starting", self.identity);
        while !stop.load(Ordering::Relaxed) {
            if !self.step().await? {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        info!("worker {} stopped", self.identity);
        Ok(())
    }

    /// Claims and fully drains at most one primary task. Returns `false`
    /// when the worker queue had nothing to claim, so [`Worker::run`] knows
    /// to sleep before polling again.
    pub async fn step(&self) -> Result<bool> {
        let (position, bytes) = match self.worker_queue.claim().await? {
            Some(claimed) => claimed,
            None => return Ok(false),
        };
        let task_id = encode_task_id(self.worker_queue.id, position);
        let payload = PrimaryTaskPayload::from_bytes(bytes)?;
        debug!(
            "worker {} claimed primary task {} ({:?})",
            self.identity, task_id, payload.kind
        );

        match self.drain(&payload).await {
            Ok((response, aux_index, secondary)) => {
                self.worker_queue
                    .mark_finished_full(task_id, response, aux_index, secondary)
                    .await?;
            }
            Err(err) => {
                // spec §7 worker-kernel-failure: contained here so the
                // worker process stays alive and keeps draining the worker
                // queue; this primary task is left unmarked, which is what
                // causes the scheduler's completion poll to block until the
                // caller imposes its own timeout.
                error!(
                    "worker {} kernel failure on primary task {}: {}",
                    self.identity, task_id, err
                );
            }
        }
        Ok(true)
    }

    async fn drain(&self, payload: &PrimaryTaskPayload) -> Result<(Option<f64>, Option<Id>, Option<f64>)> {
        let subtask_queue = TaskQueue::attach(self.store.clone(), payload.subtask_queue).await?;
        let mut acc = PrimaryAccumulator::default();
        loop {
            let (_, bytes) = match subtask_queue.claim().await? {
                Some(claimed) => claimed,
                None => break,
            };
            let subtask = SubtaskPayload::from_bytes(bytes)?;
            let outcome = self.run_subtask_guarded(&subtask).await?;
            acc.absorb(outcome);
        }
        Ok(acc.into_response())
    }

    /// Runs one subtask's kernel, converting a panic into
    /// [`BlasError::WorkerKernelFailure`] rather than letting it unwind
    /// through the worker loop (spec §7).
    async fn run_subtask_guarded(&self, subtask: &SubtaskPayload) -> Result<KernelOutcome> {
        let store = self.store.clone();
        AssertUnwindSafe(run_subtask::<S, T>(&store, subtask))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(BlasError::WorkerKernelFailure(format!(
                    "kernel for {:?} panicked",
                    subtask.kind
                )))
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::matrix::Matrix;
    use crate::queue::Cardinality;
    use crate::scheduler::RoutineScheduler;
    use crate::store::MemoryStore;
    use crate::vector::Vector;
    use std::sync::atomic::AtomicBool;

    /// Spawns `n` workers that poll `worker_queue_id` until `stop` is set,
    /// returning their join handles. Callers run the scheduler call
    /// concurrently, then flip `stop` once it resolves.
    fn spawn_workers(
        store: Arc<MemoryStore>,
        worker_queue_id: Id,
        n: usize,
        stop: Arc<AtomicBool>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        (0..n)
            .map(|i| {
                let store = store.clone();
                let stop = stop.clone();
                tokio::spawn(async move {
                    let worker = Worker::<MemoryStore, f64>::attach(
                        store,
                        worker_queue_id,
                        Duration::from_micros(200),
                        format!("test-worker-{i}"),
                    )
                    .await
                    .unwrap();
                    worker.run(&stop).await.unwrap();
                })
            })
            .collect()
    }

    async fn join_all(handles: Vec<tokio::task::JoinHandle<()>>, stop: &AtomicBool) {
        stop.store(true, Ordering::Relaxed);
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn dot_product_matches_reference() {
        let store = MemoryStore::new();
        let worker_queue_id = store.allocate_id().await.unwrap();
        TaskQueue::create(store.clone(), worker_queue_id, Cardinality::Single, Cardinality::Single)
            .await
            .unwrap();

        let x_id = store.allocate_id().await.unwrap();
        let y_id = store.allocate_id().await.unwrap();
        let x = Vector::<MemoryStore, f64>::init(store.clone(), x_id, 5, 4).await.unwrap();
        let y = Vector::<MemoryStore, f64>::init(store.clone(), y_id, 5, 4).await.unwrap();
        let xs = [4.234, 3214.4243, 290342.0, 0.0, -1.0];
        let ys = [3.0, 392.9001, 0.005, 5.0, 29844.05325811];
        for (i, &v) in xs.iter().enumerate() {
            x.insert_value(i as i64 + 1, v).await.unwrap();
        }
        for (i, &v) in ys.iter().enumerate() {
            y.insert_value(i as i64 + 1, v).await.unwrap();
        }

        let scheduler = RoutineScheduler::<MemoryStore, f64>::attach(
            store.clone(),
            worker_queue_id,
            2,
            Duration::from_micros(200),
        )
        .await
        .unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let handles = spawn_workers(store.clone(), worker_queue_id, 2, stop.clone());

        let result = scheduler.sdot(&x, &y).await.unwrap();
        join_all(handles, &stop).await;

        let expected: f64 = xs.iter().zip(ys.iter()).map(|(a, b)| a * b).sum();
        assert!((result - expected).abs() < 1e-6, "{result} vs {expected}");
    }

    #[tokio::test]
    async fn gemm_matches_naive_reference() {
        let store = MemoryStore::new();
        let worker_queue_id = store.allocate_id().await.unwrap();
        TaskQueue::create(store.clone(), worker_queue_id, Cardinality::Single, Cardinality::Single)
            .await
            .unwrap();

        let a_id = store.allocate_id().await.unwrap();
        let b_id = store.allocate_id().await.unwrap();
        let c_id = store.allocate_id().await.unwrap();
        let a = Matrix::<MemoryStore, f64>::init(store.clone(), a_id, 6, 4, 2).await.unwrap();
        let b = Matrix::<MemoryStore, f64>::init(store.clone(), b_id, 4, 8, 2).await.unwrap();
        let c = Matrix::<MemoryStore, f64>::init(store.clone(), c_id, 6, 8, 2).await.unwrap();

        let mut a_dense = vec![vec![0.0f64; 4]; 6];
        let mut b_dense = vec![vec![0.0f64; 8]; 4];
        let mut seed = 7u64;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((seed >> 33) as i64 % 1000) as f64 / 100.0
        };
        for r in 0..6 {
            for col in 0..4 {
                if (r + col) % 3 == 0 {
                    let v = next();
                    a_dense[r][col] = v;
                    a.insert_value(r as i64 + 1, col as i64 + 1, v).await.unwrap();
                }
            }
        }
        for r in 0..4 {
            for col in 0..8 {
                if (r + col) % 2 == 0 {
                    let v = next();
                    b_dense[r][col] = v;
                    b.insert_value(r as i64 + 1, col as i64 + 1, v).await.unwrap();
                }
            }
        }

        let scheduler = RoutineScheduler::<MemoryStore, f64>::attach(
            store.clone(),
            worker_queue_id,
            3,
            Duration::from_micros(200),
        )
        .await
        .unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let handles = spawn_workers(store.clone(), worker_queue_id, 3, stop.clone());

        scheduler
            .sgemm(crate::types::Transpose::NoTrans, crate::types::Transpose::NoTrans, 1.0, &a, &b, 0.0, &c)
            .await
            .unwrap();
        join_all(handles, &stop).await;

        for i in 0..6 {
            for j in 0..8 {
                let expected: f64 = (0..4).map(|k| a_dense[i][k] * b_dense[k][j]).sum();
                let got = c.get_value(i as i64 + 1, j as i64 + 1).await.unwrap();
                assert!((got - expected).abs() < 1e-6, "C[{i}][{j}]: {got} vs {expected}");
            }
        }
    }

    #[tokio::test]
    async fn jacobi_solve_tridiagonal_system() {
        let store = MemoryStore::new();
        let worker_queue_id = store.allocate_id().await.unwrap();
        TaskQueue::create(store.clone(), worker_queue_id, Cardinality::Single, Cardinality::Single)
            .await
            .unwrap();

        let n = 10i64;
        let a_id = store.allocate_id().await.unwrap();
        let b_id = store.allocate_id().await.unwrap();
        let helper_id = store.allocate_id().await.unwrap();
        let a = Matrix::<MemoryStore, f64>::init(store.clone(), a_id, n, n, 4).await.unwrap();
        let b = Vector::<MemoryStore, f64>::init(store.clone(), b_id, n, 4).await.unwrap();
        let helper = Vector::<MemoryStore, f64>::init(store.clone(), helper_id, n, 4).await.unwrap();

        // Diagonal 4, off-diagonals 1; exact solution x* = (1, 2, ..., 10).
        for i in 1..=n {
            a.insert_value(i, i, 4.0).await.unwrap();
            if i > 1 {
                a.insert_value(i, i - 1, 1.0).await.unwrap();
            }
            if i < n {
                a.insert_value(i, i + 1, 1.0).await.unwrap();
            }
        }
        for i in 1..=n {
            let xi = i as f64;
            let mut rhs = 4.0 * xi;
            if i > 1 {
                rhs += (i - 1) as f64;
            }
            if i < n {
                rhs += (i + 1) as f64;
            }
            b.insert_value(i, rhs).await.unwrap();
        }

        let scheduler = RoutineScheduler::<MemoryStore, f64>::attach(
            store.clone(),
            worker_queue_id,
            3,
            Duration::from_micros(200),
        )
        .await
        .unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let handles = spawn_workers(store.clone(), worker_queue_id, 3, stop.clone());

        scheduler
            .strsv(crate::types::Transpose::NoTrans, &a, &b, &helper)
            .await
            .unwrap();
        join_all(handles, &stop).await;

        let solved = helper.get_whole().await.unwrap();
        for (i, &v) in solved.iter().enumerate() {
            assert!((v - (i as f64 + 1.0)).abs() < 1e-3, "x[{i}] = {v}");
        }
    }
}
