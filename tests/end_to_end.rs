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

//! End-to-end scenarios against a [`MemoryStore`], each paired with a
//! small pool of spawned workers draining the same queue the scheduler
//! posts to.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scylla_blas::matrix::Matrix;
use scylla_blas::queue::{Cardinality, TaskQueue};
use scylla_blas::scheduler::RoutineScheduler;
use scylla_blas::store::{MemoryStore, Store};
use scylla_blas::types::Transpose;
use scylla_blas::vector::Vector;
use scylla_blas::worker::Worker;

async fn spin_up(
    store: Arc<MemoryStore>,
    worker_queue_id: i64,
    n: usize,
) -> (Arc<AtomicBool>, Vec<tokio::task::JoinHandle<()>>) {
    let stop = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::with_capacity(n);
    for i in 0..n {
        let store = store.clone();
        let stop = stop.clone();
        handles.push(tokio::spawn(async move {
            let worker = Worker::<MemoryStore, f64>::attach(
                store,
                worker_queue_id,
                Duration::from_micros(200),
                format!("e2e-worker-{i}"),
            )
            .await
            .unwrap();
            worker.run(&stop).await.unwrap();
        }));
    }
    (stop, handles)
}

async fn wind_down(stop: Arc<AtomicBool>, handles: Vec<tokio::task::JoinHandle<()>>) {
    stop.store(true, Ordering::Relaxed);
    for handle in handles {
        handle.await.unwrap();
    }
}

/// Scenario 1: dot product against the spec's fixed vectors.
#[tokio::test]
async fn dot_product_fixed_vectors() {
    let store = MemoryStore::new();
    let worker_queue_id = store.allocate_id().await.unwrap();
    TaskQueue::create(store.clone(), worker_queue_id, Cardinality::Single, Cardinality::Single)
        .await
        .unwrap();

    let xs = [4.234, 3214.4243, 290342.0, 0.0, -1.0];
    let ys = [3.0, 392.9001, 0.005, 5.0, 29844.05325811];
    let x_id = store.allocate_id().await.unwrap();
    let y_id = store.allocate_id().await.unwrap();
    let x = Vector::<MemoryStore, f64>::init(store.clone(), x_id, 5, 4).await.unwrap();
    let y = Vector::<MemoryStore, f64>::init(store.clone(), y_id, 5, 4).await.unwrap();
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
    let (stop, handles) = spin_up(store, worker_queue_id, 2).await;

    let result = scheduler.sdot(&x, &y).await.unwrap();
    wind_down(stop, handles).await;

    let expected: f64 = xs.iter().zip(ys.iter()).map(|(a, b)| a * b).sum();
    assert!((result - expected).abs() < 1e-9, "{result} vs {expected}");
}

/// Scenario 2: argmax/`isamax` ties resolved to the lowest index.
#[tokio::test]
async fn argmax_prefers_lowest_index() {
    let store = MemoryStore::new();
    let worker_queue_id = store.allocate_id().await.unwrap();
    TaskQueue::create(store.clone(), worker_queue_id, Cardinality::Single, Cardinality::Single)
        .await
        .unwrap();

    let xs = [0.00494931, 0.119193, -0.927604, 0.354004];
    let x_id = store.allocate_id().await.unwrap();
    let x = Vector::<MemoryStore, f64>::init(store.clone(), x_id, 4, 4).await.unwrap();
    for (i, &v) in xs.iter().enumerate() {
        x.insert_value(i as i64 + 1, v).await.unwrap();
    }

    let scheduler = RoutineScheduler::<MemoryStore, f64>::attach(
        store.clone(),
        worker_queue_id,
        2,
        Duration::from_micros(200),
    )
    .await
    .unwrap();
    let (stop, handles) = spin_up(store, worker_queue_id, 2).await;

    let (index, value) = scheduler.isamax(&x).await.unwrap().expect("non-empty vector");
    wind_down(stop, handles).await;

    assert_eq!(index, 3);
    assert!((value - (-0.927604)).abs() < 1e-9);
}

/// Scenario 3: gemm against a naive dense reference.
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
    let mut seed = 11u64;
    let mut next = || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        ((seed >> 33) as i64 % 1000) as f64 / 100.0
    };
    for r in 0..6 {
        for col in 0..4 {
            if (r + col) % 3 != 1 {
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
    let (stop, handles) = spin_up(store, worker_queue_id, 3).await;

    scheduler
        .sgemm(Transpose::NoTrans, Transpose::NoTrans, 1.0, &a, &b, 0.0, &c)
        .await
        .unwrap();
    wind_down(stop, handles).await;

    for i in 0..6 {
        for j in 0..8 {
            let expected: f64 = (0..4).map(|k| a_dense[i][k] * b_dense[k][j]).sum();
            let got = c.get_value(i as i64 + 1, j as i64 + 1).await.unwrap();
            assert!((got - expected).abs() < 1e-6, "C[{i}][{j}]: {got} vs {expected}");
        }
    }
}

/// `sgemm` with `TransB = Trans` must read `B` through its own transpose
/// tag independently of `A`'s (spec §3's matrix-op descriptor carries both
/// `TransA` and `TransB`): store `B` pre-transposed (shape `8x4`) and check
/// `C := A * B^T` against the same dense reference `gemm_matches_naive_reference`
/// computes with `B` stored untransposed.
#[tokio::test]
async fn gemm_transposed_b_matches_naive_reference() {
    let store = MemoryStore::new();
    let worker_queue_id = store.allocate_id().await.unwrap();
    TaskQueue::create(store.clone(), worker_queue_id, Cardinality::Single, Cardinality::Single)
        .await
        .unwrap();

    let a_id = store.allocate_id().await.unwrap();
    let b_id = store.allocate_id().await.unwrap();
    let c_id = store.allocate_id().await.unwrap();
    let a = Matrix::<MemoryStore, f64>::init(store.clone(), a_id, 6, 4, 2).await.unwrap();
    // b stores B^T: an 8x4 matrix such that b[j][k] == the logical B[k][j].
    let b = Matrix::<MemoryStore, f64>::init(store.clone(), b_id, 8, 4, 2).await.unwrap();
    let c = Matrix::<MemoryStore, f64>::init(store.clone(), c_id, 6, 8, 2).await.unwrap();

    let mut a_dense = vec![vec![0.0f64; 4]; 6];
    let mut b_dense = vec![vec![0.0f64; 8]; 4];
    let mut seed = 11u64;
    let mut next = || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        ((seed >> 33) as i64 % 1000) as f64 / 100.0
    };
    for r in 0..6 {
        for col in 0..4 {
            if (r + col) % 3 != 1 {
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
                b.insert_value(col as i64 + 1, r as i64 + 1, v).await.unwrap();
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
    let (stop, handles) = spin_up(store, worker_queue_id, 3).await;

    scheduler
        .sgemm(Transpose::NoTrans, Transpose::Trans, 1.0, &a, &b, 0.0, &c)
        .await
        .unwrap();
    wind_down(stop, handles).await;

    for i in 0..6 {
        for j in 0..8 {
            let expected: f64 = (0..4).map(|k| a_dense[i][k] * b_dense[k][j]).sum();
            let got = c.get_value(i as i64 + 1, j as i64 + 1).await.unwrap();
            assert!((got - expected).abs() < 1e-6, "C[{i}][{j}]: {got} vs {expected}");
        }
    }
}

/// `gbmv` against a banded matrix must agree with the dense `gemv` result,
/// since banding only narrows which blocks the kernel reads (spec §3,
/// §8's real-`gbmv` contract that out-of-band entries are never stored).
#[tokio::test]
async fn gbmv_matches_dense_reference() {
    let store = MemoryStore::new();
    let worker_queue_id = store.allocate_id().await.unwrap();
    TaskQueue::create(store.clone(), worker_queue_id, Cardinality::Single, Cardinality::Single)
        .await
        .unwrap();

    let n = 6i64;
    let a_id = store.allocate_id().await.unwrap();
    let x_id = store.allocate_id().await.unwrap();
    let y_id = store.allocate_id().await.unwrap();
    let a = Matrix::<MemoryStore, f64>::init(store.clone(), a_id, n, n, 2).await.unwrap();
    let x = Vector::<MemoryStore, f64>::init(store.clone(), x_id, n, 2).await.unwrap();
    let y = Vector::<MemoryStore, f64>::init(store.clone(), y_id, n, 2).await.unwrap();

    let kl = 1i64;
    let ku = 1i64;
    let mut dense = vec![vec![0.0f64; n as usize]; n as usize];
    for r in 1..=n {
        for c in 1..=n {
            if (c - r) >= -kl && (c - r) <= ku {
                let v = (r * 10 + c) as f64 / 7.0;
                dense[(r - 1) as usize][(c - 1) as usize] = v;
                a.insert_value(r, c, v).await.unwrap();
            }
        }
    }
    for i in 1..=n {
        x.insert_value(i, i as f64 * 0.5).await.unwrap();
    }

    let scheduler = RoutineScheduler::<MemoryStore, f64>::attach(
        store.clone(),
        worker_queue_id,
        2,
        Duration::from_micros(200),
    )
    .await
    .unwrap();
    let (stop, handles) = spin_up(store.clone(), worker_queue_id, 2).await;

    scheduler
        .sgbmv(Transpose::NoTrans, kl, ku, 1.0, &a, &x, 0.0, &y)
        .await
        .unwrap();
    wind_down(stop, handles).await;

    let xs = x.get_whole().await.unwrap();
    let got = y.get_whole().await.unwrap();
    for r in 0..n as usize {
        let expected: f64 = (0..n as usize).map(|c| dense[r][c] * xs[c]).sum();
        assert!((got[r] - expected).abs() < 1e-9, "y[{r}] = {} vs {expected}", got[r]);
    }
}

/// Scenario 4: Jacobi solve of a 10x10 tridiagonal system with known
/// solution `(1, 2, ..., 10)`.
#[tokio::test]
async fn jacobi_solve_tridiagonal() {
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

    for i in 1..=n {
        a.insert_value(i, i, 4.0).await.unwrap();
        if i > 1 {
            a.insert_value(i, i - 1, 1.0).await.unwrap();
        }
        if i < n {
            a.insert_value(i, i + 1, 1.0).await.unwrap();
        }
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
    let (stop, handles) = spin_up(store, worker_queue_id, 3).await;

    scheduler.strsv(Transpose::NoTrans, &a, &b, &helper).await.unwrap();
    wind_down(stop, handles).await;

    let solved = helper.get_whole().await.unwrap();
    for (i, &v) in solved.iter().enumerate() {
        assert!((v - (i as f64 + 1.0)).abs() < 1e-3, "x[{i}] = {v}");
    }
}

/// Scenario 6: Arnoldi orthogonalization, driven directly against the
/// scheduler (`sgemv`, `sdot`, `saxpy`, `sscal`, `snrm2`) the way an
/// external caller would build the iteration on top of this crate.
#[tokio::test]
async fn arnoldi_orthogonalization() {
    let store = MemoryStore::new();
    let worker_queue_id = store.allocate_id().await.unwrap();
    TaskQueue::create(store.clone(), worker_queue_id, Cardinality::Single, Cardinality::Single)
        .await
        .unwrap();

    let m = 8i64;
    let n = 4usize;
    let a_id = store.allocate_id().await.unwrap();
    let a = Matrix::<MemoryStore, f64>::init(store.clone(), a_id, m, m, 4).await.unwrap();

    let mut seed = 42u64;
    let mut next = || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        ((seed >> 33) as i64 % 1000) as f64 / 500.0 - 1.0
    };
    for r in 1..=m {
        for c in 1..=m {
            a.insert_value(r, c, next()).await.unwrap();
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
    let (stop, handles) = spin_up(store.clone(), worker_queue_id, 3).await;

    let mut q_cols: Vec<Vector<MemoryStore, f64>> = Vec::with_capacity(n + 1);
    let mut h = vec![vec![0.0f64; n]; n + 1];

    let q0_id = store.allocate_id().await.unwrap();
    let q0 = Vector::<MemoryStore, f64>::init(store.clone(), q0_id, m, 4).await.unwrap();
    q0.insert_value(1, 1.0).await.unwrap();
    q_cols.push(q0);

    for j in 0..n {
        let w_id = store.allocate_id().await.unwrap();
        let w = Vector::<MemoryStore, f64>::init(store.clone(), w_id, m, 4).await.unwrap();
        scheduler
            .sgemv(Transpose::NoTrans, 1.0, &a, &q_cols[j], 0.0, &w)
            .await
            .unwrap();

        for i in 0..=j {
            let hij = scheduler.sdot(&w, &q_cols[i]).await.unwrap();
            h[i][j] = hij;
            scheduler.saxpy(-hij, &q_cols[i], &w).await.unwrap();
        }

        let norm = scheduler.snrm2(&w).await.unwrap();
        h[j + 1][j] = norm;
        scheduler.sscal(1.0 / norm, &w).await.unwrap();
        q_cols.push(w);
    }

    wind_down(stop, handles).await;

    let dense: Vec<Vec<f64>> = {
        let mut out = Vec::with_capacity(q_cols.len());
        for q in &q_cols {
            out.push(q.get_whole().await.unwrap());
        }
        out
    };

    // Q^T Q == I on the first n+1 columns.
    for i in 0..=n {
        for j in 0..=n {
            let dot: f64 = (0..m as usize).map(|k| dense[i][k] * dense[j][k]).sum();
            let expected = if i == j { 1.0 } else { 0.0 };
            assert!((dot - expected).abs() < 1e-6, "Q^T Q [{i}][{j}] = {dot}");
        }
    }

    // A Q_k == Q_{k+1} H_k.
    let a_rows: Vec<Vec<f64>> = {
        let mut out = Vec::with_capacity(m as usize);
        for r in 1..=m {
            let mut row = Vec::with_capacity(m as usize);
            for c in 1..=m {
                row.push(a.get_value(r, c).await.unwrap());
            }
            out.push(row);
        }
        out
    };
    for r in 0..m as usize {
        for j in 0..n {
            let aq: f64 = (0..m as usize).map(|k| a_rows[r][k] * dense[j][k]).sum();
            let qh: f64 = (0..=j + 1).map(|i| dense[i][r] * h[i][j]).sum();
            assert!((aq - qh).abs() < 1e-6, "(AQ)[{r}][{j}] = {aq} vs (QH)[{r}][{j}] = {qh}");
        }
    }
}
