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

//! Per-subtask kernels run by the worker (spec §4.4, grounded on
//! `include/scylla_blas/queue/worker_proc.hh` /
//! `src/scylla_blas/queue/worker_proc.cc`). Each kernel reads whatever
//! blocks/segments its subtask names directly out of the store, computes,
//! and writes the result back; none of them know about the queue that
//! dispatched them.

mod common;
mod generate;
mod level1;
mod level2;
mod level3;

use std::sync::Arc;

use crate::error::Result;
use crate::queue::proto::{SubtaskPayload, TaskKind};
use crate::store::Store;
use crate::types::{Float, Id};

/// What a subtask hands back to the worker loop, to be folded into its
/// primary task's response.
#[derive(Copy, Clone, Debug)]
pub enum KernelOutcome {
    /// Side-effecting only: a block/segment was written, nothing to report.
    None,
    /// A single reducible scalar (`dot`, `nrm2`'s sum-of-squares, `asum`).
    Scalar(f64),
    /// `(index, value)` for `iamax`.
    ArgMax(Id, f64),
    /// `(residual, norm)` for one Jacobi sweep of `trsv`/`tbsv`.
    ResidualNorm(f64, f64),
}

/// Runs one subtask to completion against `store`.
pub async fn run_subtask<S: Store, T: Float>(store: &Arc<S>, subtask: &SubtaskPayload) -> Result<KernelOutcome> {
    match subtask.kind {
        TaskKind::Swap => level1::swap::<S, T>(store, subtask).await,
        TaskKind::Scal => level1::scal::<S, T>(store, subtask).await,
        TaskKind::Copy => level1::copy::<S, T>(store, subtask).await,
        TaskKind::Axpy => level1::axpy::<S, T>(store, subtask).await,
        TaskKind::Dot => level1::dot::<S, T>(store, subtask).await,
        TaskKind::Nrm2 => level1::nrm2::<S, T>(store, subtask).await,
        TaskKind::Asum => level1::asum::<S, T>(store, subtask).await,
        TaskKind::Iamax => level1::iamax::<S, T>(store, subtask).await,
        TaskKind::Gemv => level2::gemv::<S, T>(store, subtask).await,
        TaskKind::Ger => level2::ger::<S, T>(store, subtask).await,
        TaskKind::Trsv => level2::trsv_sweep::<S, T>(store, subtask).await,
        TaskKind::Tbsv => level2::tbsv_sweep::<S, T>(store, subtask).await,
        TaskKind::Gbmv => level2::gbmv::<S, T>(store, subtask).await,
        TaskKind::Trmv | TaskKind::Tbmv => level2::gemv::<S, T>(store, subtask).await,
        TaskKind::Gemm | TaskKind::Syrk | TaskKind::Syr2k => level3::gemm::<S, T>(store, subtask).await,
        TaskKind::Rmgen => generate::rmgen::<S, T>(store, subtask).await,
        TaskKind::Rvgen => generate::rvgen::<S, T>(store, subtask).await,
    }
}
