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

//! Random matrix/vector generation (spec §4.5, `matrix_load` density
//! knob). Each subtask owns exactly one block/segment and seeds its own
//! RNG from the coordinate it is filling, so two runs against the same
//! `(alpha, out_row, out_col)` produce the same block regardless of which
//! worker claims the subtask.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{BlasError, Result};
use crate::queue::proto::SubtaskPayload;
use crate::store::Store;
use crate::structure::{MatrixBlock, VectorSegment};
use crate::types::Float;

use super::common::{extent_of, store_block, store_segment};
use super::KernelOutcome;

/// Fills one block of `operand_a` with iid uniform(-1, 1) entries, each
/// kept independently with probability `alpha` (the density passed down
/// from [`crate::scheduler::RoutineScheduler::rmgen`]). The per-block seed
/// ([`crate::scheduler::RoutineScheduler::rmgen`]'s
/// `seed ^ (block_row << 20) ^ block_col`) travels in `operand_b`, since
/// there is no dedicated seed field on the wire payload.
pub async fn rmgen<S: Store, T: Float>(store: &Arc<S>, subtask: &SubtaskPayload) -> Result<KernelOutcome> {
    let matrix_id = subtask.operand_a;
    let (block_row, block_col) = (subtask.out_row, subtask.out_col);
    let density = subtask.alpha;

    let meta = store
        .get_matrix_meta(matrix_id)
        .await?
        .ok_or(BlasError::OperandMissing(matrix_id))?;
    let block_size = meta.block_size;
    let rows_here = extent_of(block_row, meta.row_count, block_size);
    let cols_here = extent_of(block_col, meta.col_count, block_size);

    let mut rng = StdRng::seed_from_u64(subtask.operand_b as u64);
    let mut entries = Vec::new();
    for r in 1..=rows_here {
        for c in 1..=cols_here {
            if rng.gen_range(0.0..1.0) < density {
                entries.push((r, c, T::from_f64(rng.gen_range(-1.0..1.0))));
            }
        }
    }

    let block = MatrixBlock::<T>::from_entries(block_row, block_col, block_size, entries);
    store_block(store, matrix_id, &block).await?;
    Ok(KernelOutcome::None)
}

/// Fills one segment of `operand_a` the same way `rmgen` fills a block.
pub async fn rvgen<S: Store, T: Float>(store: &Arc<S>, subtask: &SubtaskPayload) -> Result<KernelOutcome> {
    let vector_id = subtask.operand_a;
    let segment = subtask.out_row;
    let density = subtask.alpha;

    let meta = store
        .get_vector_meta(vector_id)
        .await?
        .ok_or(BlasError::OperandMissing(vector_id))?;
    let block_size = meta.block_size;
    let len_here = extent_of(segment, meta.length, block_size);

    let mut rng = StdRng::seed_from_u64(subtask.operand_b as u64);
    let mut entries = Vec::new();
    for i in 1..=len_here {
        if rng.gen_range(0.0..1.0) < density {
            entries.push((i, T::from_f64(rng.gen_range(-1.0..1.0))));
        }
    }

    let seg = VectorSegment::<T>::from_entries(segment, block_size, entries);
    store_segment(store, vector_id, &seg).await?;
    Ok(KernelOutcome::None)
}
