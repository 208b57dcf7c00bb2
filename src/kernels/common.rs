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

//! Block/segment read-modify-write helpers shared by every kernel (spec
//! §4.4's "read block, compute, write block back" cycle). Kept here once
//! instead of duplicated per level, since every kernel performs the same
//! load-or-empty / write-or-delete dance around the sparsity invariant.

use std::sync::Arc;

use crate::error::{BlasError, Result};
use crate::store::Store;
use crate::structure::{MatrixBlock, VectorSegment};
use crate::types::{ceil_div, Float, Id, Index, Transpose};

pub async fn load_segment<S: Store, T: Float>(
    store: &Arc<S>,
    vector_id: Id,
    segment: Index,
) -> Result<VectorSegment<T>> {
    let meta = store
        .get_vector_meta(vector_id)
        .await?
        .ok_or(BlasError::OperandMissing(vector_id))?;
    match store.get_segment(vector_id, segment).await? {
        Some(bytes) => VectorSegment::from_bytes(segment, meta.block_size, bytes),
        None => Ok(VectorSegment::empty(segment, meta.block_size)),
    }
}

pub async fn store_segment<S: Store, T: Float>(
    store: &Arc<S>,
    vector_id: Id,
    segment: &VectorSegment<T>,
) -> Result<()> {
    if segment.is_empty() {
        store.delete_segment(vector_id, segment.segment).await
    } else {
        store.put_segment(vector_id, segment.segment, segment.to_bytes()).await
    }
}

pub async fn load_block<S: Store, T: Float>(
    store: &Arc<S>,
    matrix_id: Id,
    block_row: Index,
    block_col: Index,
    block_size: Index,
) -> Result<MatrixBlock<T>> {
    match store.get_block(matrix_id, block_row, block_col).await? {
        Some(bytes) => MatrixBlock::from_bytes(block_row, block_col, block_size, bytes),
        None => Ok(MatrixBlock::empty(block_row, block_col, block_size)),
    }
}

pub async fn store_block<S: Store, T: Float>(store: &Arc<S>, matrix_id: Id, block: &MatrixBlock<T>) -> Result<()> {
    if block.is_empty() {
        store.delete_block(matrix_id, block.block_row, block.block_col).await
    } else {
        store.put_block(matrix_id, block.block_row, block.block_col, block.to_bytes()).await
    }
}

/// Reads the block of `matrix_id` that contributes to `out_block` when
/// contracted against `contraction_block`, applying `transpose` at read
/// time (spec §4.4: "with transposition applied at read time"). Shared by
/// `gemv`, `trsv`'s Jacobi sweep and `gemm`, all of which walk an operand
/// "as if transposed" without a separate on-disk layout for A^T.
pub async fn read_transposed_block<S: Store, T: Float>(
    store: &Arc<S>,
    matrix_id: Id,
    out_block: Index,
    contraction_block: Index,
    transpose: Transpose,
    block_size: Index,
) -> Result<MatrixBlock<T>> {
    let (block_row, block_col) = match transpose {
        Transpose::NoTrans => (out_block, contraction_block),
        Transpose::Trans => (contraction_block, out_block),
    };
    let block = load_block::<S, T>(store, matrix_id, block_row, block_col, block_size).await?;
    Ok(match transpose {
        Transpose::NoTrans => block,
        Transpose::Trans => block.transpose(),
    })
}

/// Number of rows/columns actually occupied by block/segment index `i`,
/// accounting for a final partial tile (spec §8 "a block smaller than
/// `block_size` is allowed; kernels use the actual bounds from metadata").
pub fn extent_of(block_index: Index, total: Index, block_size: Index) -> Index {
    let start = (block_index - 1) * block_size;
    (total - start).min(block_size).max(0)
}

/// Range of contraction blocks `[lo, hi]` (inclusive) a `gbmv`/`tbsv`
/// kernel needs to read for output block `out_block`, given band widths
/// `kl` sub-diagonals / `ku` super-diagonals in element units (spec §3's
/// `{KL, KU, ...}` descriptor). `kl < 0` or `ku < 0` means "unbounded",
/// the case every non-banded task kind uses, and returns the full
/// `1..=total_blocks` range.
pub fn band_block_range(out_block: Index, kl: i64, ku: i64, block_size: Index, total_blocks: Index) -> (Index, Index) {
    if kl < 0 || ku < 0 {
        return (1, total_blocks);
    }
    let row_lo = (out_block - 1) * block_size + 1;
    let row_hi = out_block * block_size;
    let lo = ceil_div((row_lo - kl).max(1), block_size).max(1);
    let hi = ceil_div(row_hi + ku, block_size).min(total_blocks);
    (lo, hi.max(lo))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_band_covers_every_block() {
        assert_eq!(band_block_range(3, -1, -1, 4, 10), (1, 10));
    }

    #[test]
    fn tridiagonal_band_restricts_to_neighbors() {
        // block_size 1: row i only touches columns i-1..=i+1.
        assert_eq!(band_block_range(5, 1, 1, 1, 10), (4, 6));
        assert_eq!(band_block_range(1, 1, 1, 1, 10), (1, 2));
        assert_eq!(band_block_range(10, 1, 1, 1, 10), (9, 10));
    }

    #[test]
    fn block_level_band_widens_to_whole_blocks() {
        // block_size 4, kl=ku=1: block 2 covers rows 5..8, band reaches
        // rows 4..9, which spans blocks 1..3.
        assert_eq!(band_block_range(2, 1, 1, 4, 4), (1, 3));
    }
}
