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

//! Level 2 kernels: `gemv`/`gbmv` (matrix-vector product), `ger` (rank-1
//! update) and the `trsv`/`tbsv` Jacobi sweep (spec §4.4). Grounded on the
//! scheduler-side shape of `blas_level_2.cc`; the original never actually
//! wires these into its worker dispatch table (`worker_proc.hh` only lists
//! level 1 and `gemm`), so the block/segment read-compute-write cycle
//! below is this crate's own, built the way `worker_proc.cc`'s `gemm`
//! kernel reads blocks "with transposition applied at read time" and
//! generalized to a matrix-times-segment contraction.

use std::sync::Arc;

use crate::error::{BlasError, Result};
use crate::queue::proto::SubtaskPayload;
use crate::store::Store;
use crate::structure::{MatrixBlock, VectorSegment};
use crate::types::{ceil_div, Float, Transpose};

use super::common::{band_block_range, extent_of, load_segment, read_transposed_block, store_segment};
use super::KernelOutcome;

/// `y := alpha * op(A) * x + beta * y`, one subtask per block-row of
/// `op(A)` (= one output segment of `y`). Shared by `gemv` (`kl`/`ku` =
/// `-1`, unbounded) and `gbmv` (band-restricted contraction).
async fn gemv_impl<S: Store, T: Float>(store: &Arc<S>, subtask: &SubtaskPayload) -> Result<KernelOutcome> {
    let a_id = subtask.operand_a;
    let x_id = subtask.operand_b;
    let y_id = subtask.operand_c;
    let out_block = subtask.out_row;

    let a_meta = store
        .get_matrix_meta(a_id)
        .await?
        .ok_or(BlasError::OperandMissing(a_id))?;
    let block_size = a_meta.block_size;
    let contraction_blocks = match subtask.transpose {
        Transpose::NoTrans => ceil_div(a_meta.col_count, block_size),
        Transpose::Trans => ceil_div(a_meta.row_count, block_size),
    };
    let (lo, hi) = band_block_range(out_block, subtask.kl, subtask.ku, block_size, contraction_blocks);

    let mut product_entries = Vec::new();
    for k in lo..=hi {
        let a_block = read_transposed_block::<S, T>(store, a_id, out_block, k, subtask.transpose, block_size).await?;
        let x_k = load_segment::<S, T>(store, x_id, k).await?;
        product_entries.extend(a_block.multiply_segment(&x_k));
    }
    let mut ax = VectorSegment::from_entries(out_block, block_size, product_entries);
    ax.scale(T::from_f64(subtask.alpha));

    let mut y = load_segment::<S, T>(store, y_id, out_block).await?;
    y.scale(T::from_f64(subtask.beta));
    y.add_assign_scaled(&ax, T::one());
    store_segment(store, y_id, &y).await?;
    Ok(KernelOutcome::None)
}

/// `y := alpha * op(A) * x + beta * y` for a general dense-stored `A`.
pub async fn gemv<S: Store, T: Float>(store: &Arc<S>, subtask: &SubtaskPayload) -> Result<KernelOutcome> {
    gemv_impl::<S, T>(store, subtask).await
}

/// `y := alpha * op(A) * x + beta * y` for `A` banded with `subtask.kl`
/// sub-diagonals and `subtask.ku` super-diagonals; only reads blocks that
/// can hold in-band entries (spec §4.4, §8).
pub async fn gbmv<S: Store, T: Float>(store: &Arc<S>, subtask: &SubtaskPayload) -> Result<KernelOutcome> {
    gemv_impl::<S, T>(store, subtask).await
}

/// `A := alpha * x * y^T + A`, one subtask per output block `(i, j)`.
pub async fn ger<S: Store, T: Float>(store: &Arc<S>, subtask: &SubtaskPayload) -> Result<KernelOutcome> {
    let x_id = subtask.operand_a;
    let y_id = subtask.operand_b;
    let a_id = subtask.operand_c;
    let (block_row, block_col) = (subtask.out_row, subtask.out_col);

    let a_meta = store
        .get_matrix_meta(a_id)
        .await?
        .ok_or(BlasError::OperandMissing(a_id))?;
    let block_size = a_meta.block_size;

    let x_seg = load_segment::<S, T>(store, x_id, block_row).await?;
    let y_seg = load_segment::<S, T>(store, y_id, block_col).await?;

    let mut outer = Vec::with_capacity(x_seg.nnz() * y_seg.nnz());
    for &(r, xv) in x_seg.iter() {
        for &(c, yv) in y_seg.iter() {
            outer.push((r, c, xv * yv));
        }
    }
    let outer_block = MatrixBlock::<T>::from_entries(block_row, block_col, block_size, outer);

    let a_block = super::common::load_block::<S, T>(store, a_id, block_row, block_col, block_size).await?;
    let updated = a_block.add_scaled(&outer_block, T::from_f64(subtask.alpha));
    super::common::store_block(store, a_id, &updated).await?;
    Ok(KernelOutcome::None)
}

/// One Jacobi sweep of `op(A) * x = b` for one block-row `i` (spec §4.3
/// "Trsv/tbsv iteration"): `x_i := x_i + (b_i - (op(A) x)_i) / diag(A)_i`,
/// computed against the *pre-sweep* `x` read from `helper` (`operand_c`)
/// and written back in place. Returns this block's contribution to the
/// scheduler's `sum(residual) / sum(norm)` convergence ratio.
///
/// `Uplo`/`Diag` are not threaded through the wire payload (see
/// DESIGN.md): the sweep uses every column block of the row, which is
/// correct for a general non-singular `A` and degrades gracefully to the
/// textbook triangular case when the caller has already zeroed the other
/// triangle. Unit-diagonal (`Diag::Unit`) matrices are not distinguished
/// from `NonUnit` ones; a near-zero diagonal entry leaves that row
/// unchanged for the sweep rather than dividing by it.
async fn trsv_sweep_impl<S: Store, T: Float>(store: &Arc<S>, subtask: &SubtaskPayload) -> Result<KernelOutcome> {
    let a_id = subtask.operand_a;
    let b_id = subtask.operand_b;
    let helper_id = subtask.operand_c;
    let out_block = subtask.out_row;

    let a_meta = store
        .get_matrix_meta(a_id)
        .await?
        .ok_or(BlasError::OperandMissing(a_id))?;
    let block_size = a_meta.block_size;
    let blocks = ceil_div(a_meta.col_count, block_size);
    let rows_here = extent_of(out_block, a_meta.row_count, block_size);
    let (lo, hi) = band_block_range(out_block, subtask.kl, subtask.ku, block_size, blocks);

    let b_i = load_segment::<S, T>(store, b_id, out_block).await?;
    let x_i = load_segment::<S, T>(store, helper_id, out_block).await?;

    let mut ax_entries = Vec::new();
    for k in lo..=hi {
        let a_block = read_transposed_block::<S, T>(store, a_id, out_block, k, subtask.transpose, block_size).await?;
        let x_k = load_segment::<S, T>(store, helper_id, k).await?;
        ax_entries.extend(a_block.multiply_segment(&x_k));
    }
    let ax = VectorSegment::<T>::from_entries(out_block, block_size, ax_entries);

    let diag_block =
        read_transposed_block::<S, T>(store, a_id, out_block, out_block, subtask.transpose, block_size).await?;

    let mut residual = 0.0f64;
    let mut norm = 0.0f64;
    let mut new_entries = Vec::new();
    for local_row in 1..=rows_here {
        let rhs = b_i.get(local_row).as_f64();
        let axv = ax.get(local_row).as_f64();
        let diag = diag_block.get(local_row, local_row);

        let res = rhs - axv;
        residual += res.abs();
        norm += axv.abs();

        let old = x_i.get(local_row);
        let updated = if diag.abs_value() >= T::epsilon_value() {
            T::from_f64(old.as_f64() + res / diag.as_f64())
        } else {
            old
        };
        new_entries.push((local_row, updated));
    }

    let new_x = VectorSegment::<T>::from_entries(out_block, block_size, new_entries);
    store_segment(store, helper_id, &new_x).await?;

    Ok(KernelOutcome::ResidualNorm(residual, norm))
}

/// One Jacobi sweep of `op(A) * x = b` for a general (unbanded) `A`.
pub async fn trsv_sweep<S: Store, T: Float>(store: &Arc<S>, subtask: &SubtaskPayload) -> Result<KernelOutcome> {
    trsv_sweep_impl::<S, T>(store, subtask).await
}

/// One Jacobi sweep of `op(A) * x = b` for `A` banded with `subtask.kl`
/// sub-diagonals and `subtask.ku` super-diagonals.
pub async fn tbsv_sweep<S: Store, T: Float>(store: &Arc<S>, subtask: &SubtaskPayload) -> Result<KernelOutcome> {
    trsv_sweep_impl::<S, T>(store, subtask).await
}
