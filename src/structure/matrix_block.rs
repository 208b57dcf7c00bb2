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

//! A single tile of a blocked sparse matrix and the algebra on it
//! (spec §4.1, grounded on `include/scylla_blas/structure/matrix_block.hh`).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use itertools::Itertools;

use crate::error::{BlasError, Result};
use crate::types::{Float, Index};

/// Non-zero entries of one `block_size` x `block_size` tile, in local
/// (1-indexed, within-block) coordinates, always kept sorted by
/// `(row, col)`. Entries whose magnitude drops below [`Float::epsilon_value`]
/// are never stored.
#[derive(Clone, Debug, PartialEq)]
pub struct MatrixBlock<T> {
    pub block_row: Index,
    pub block_col: Index,
    pub block_size: Index,
    entries: Vec<(Index, Index, T)>,
}

impl<T: Float> MatrixBlock<T> {
    pub fn empty(block_row: Index, block_col: Index, block_size: Index) -> Self {
        Self {
            block_row,
            block_col,
            block_size,
            entries: Vec::new(),
        }
    }

    /// Builds a block from arbitrary (possibly unsorted, possibly zero)
    /// local-coordinate entries, merging duplicates by addition.
    pub fn from_entries(
        block_row: Index,
        block_col: Index,
        block_size: Index,
        mut entries: Vec<(Index, Index, T)>,
    ) -> Self {
        entries.sort_by_key(|(r, c, _)| (*r, *c));
        let mut merged = Vec::with_capacity(entries.len());
        for (row, col, value) in entries {
            match merged.last_mut() {
                Some((r, c, v)) if *r == row && *c == col => *v = *v + value,
                _ => merged.push((row, col, value)),
            }
        }
        merged.retain(|(_, _, v)| v.abs_value() >= T::epsilon_value());
        Self {
            block_row,
            block_col,
            block_size,
            entries: merged,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Index, Index, T)> {
        self.entries.iter()
    }

    pub fn get(&self, row: Index, col: Index) -> T {
        self.entries
            .binary_search_by_key(&(row, col), |(r, c, _)| (*r, *c))
            .map(|idx| self.entries[idx].2)
            .unwrap_or_else(T::zero)
    }

    /// Sets `(row, col)` to `value`, deleting the entry outright if the new
    /// value is within epsilon of zero (spec §4.1 sparsity invariant).
    pub fn set(&mut self, row: Index, col: Index, value: T) {
        match self.entries.binary_search_by_key(&(row, col), |(r, c, _)| (*r, *c)) {
            Ok(idx) => {
                if value.abs_value() < T::epsilon_value() {
                    self.entries.remove(idx);
                } else {
                    self.entries[idx].2 = value;
                }
            }
            Err(idx) => {
                if value.abs_value() >= T::epsilon_value() {
                    self.entries.insert(idx, (row, col, value));
                }
            }
        }
    }

    /// `self += alpha * other`, entrywise, over the same local coordinate
    /// space (both blocks must share `block_row`/`block_col`).
    pub fn add_scaled(&self, other: &Self, alpha: T) -> Self {
        let merged = self
            .entries
            .iter()
            .map(|&(r, c, v)| (r, c, v))
            .chain(other.entries.iter().map(|&(r, c, v)| (r, c, alpha * v)))
            .collect_vec();
        Self::from_entries(self.block_row, self.block_col, self.block_size, merged)
    }

    pub fn scale(&self, alpha: T) -> Self {
        Self::from_entries(
            self.block_row,
            self.block_col,
            self.block_size,
            self.entries.iter().map(|&(r, c, v)| (r, c, alpha * v)).collect(),
        )
    }

    /// In-memory transpose: swaps `(row, col)` on every entry and the
    /// block's own `(block_row, block_col)` coordinate (spec §4.1
    /// "transposition of in-memory blocks"). Used by `gemv`/`gemm` to read
    /// an operand "as if transposed" without a separate on-disk layout.
    pub fn transpose(&self) -> Self {
        Self::from_entries(
            self.block_col,
            self.block_row,
            self.block_size,
            self.entries.iter().map(|&(r, c, v)| (c, r, v)).collect(),
        )
    }

    /// `self * x`, where `x` is a segment sharing this block's column
    /// coordinate space. Returns local-row-indexed `(row, value)` pairs
    /// rather than a [`crate::structure::VectorSegment`] directly, since
    /// the caller (a `gemv`/`trsv` kernel summing several blocks'
    /// contributions into one output segment) merges several such calls
    /// before settling on a segment id.
    pub fn multiply_segment(&self, x: &super::VectorSegment<T>) -> Vec<(Index, T)> {
        use std::collections::BTreeMap;

        let mut rows: BTreeMap<Index, T> = BTreeMap::new();
        for &(r, c, v) in &self.entries {
            let xv = x.get(c);
            if xv.abs_value() < T::epsilon_value() {
                continue;
            }
            let contribution = v * xv;
            rows.entry(r)
                .and_modify(|acc| *acc = *acc + contribution)
                .or_insert(contribution);
        }
        rows.into_iter().collect()
    }

    /// `result_block(self.block_row, other.block_col) += self * other`.
    ///
    /// Builds a row-index map of `self` and a column-index map of `other`
    /// (i.e. a transposed map, keyed by the contraction dimension), then
    /// for every `(row, col)` pair with a non-empty intersection does a
    /// sorted two-finger merge dot product, exactly the strategy in
    /// `worker_proc.cc`'s `gemm` kernel. Rows are independent of one
    /// another, so this fans them out across `rayon`'s local thread pool
    /// (spec §4.3's "independently-addressed block kernels" apply within
    /// a single block just as much as across blocks).
    pub fn multiply(&self, other: &Self) -> Self {
        use rayon::prelude::*;
        use std::collections::BTreeMap;

        let mut rows: BTreeMap<Index, Vec<(Index, T)>> = BTreeMap::new();
        for &(r, c, v) in &self.entries {
            rows.entry(r).or_default().push((c, v));
        }
        let mut cols: BTreeMap<Index, Vec<(Index, T)>> = BTreeMap::new();
        for &(r, c, v) in &other.entries {
            cols.entry(c).or_default().push((r, v));
        }
        let cols: Vec<(Index, Vec<(Index, T)>)> = cols.into_iter().collect();

        let out: Vec<(Index, Index, T)> = rows
            .into_par_iter()
            .flat_map_iter(|(row, row_entries)| {
                cols.iter().filter_map(move |(col, col_entries)| {
                    let dot = merge_dot(&row_entries, col_entries);
                    if dot.abs_value() >= T::epsilon_value() {
                        Some((row, *col, dot))
                    } else {
                        None
                    }
                })
            })
            .collect();
        Self::from_entries(self.block_row, other.block_col, self.block_size, out)
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + self.entries.len() * 24);
        buf.put_u32_le(self.entries.len() as u32);
        for &(r, c, v) in &self.entries {
            buf.put_i64_le(r);
            buf.put_i64_le(c);
            buf.put_f64_le(v.as_f64());
        }
        buf.freeze()
    }

    pub fn from_bytes(
        block_row: Index,
        block_col: Index,
        block_size: Index,
        mut bytes: Bytes,
    ) -> Result<Self> {
        if bytes.remaining() < 4 {
            return Err(BlasError::CorruptPayload("block header truncated".into()));
        }
        let count = bytes.get_u32_le() as usize;
        if bytes.remaining() != count * 24 {
            return Err(BlasError::CorruptPayload("block entry count mismatch".into()));
        }
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let row = bytes.get_i64_le();
            let col = bytes.get_i64_le();
            let value = T::from_f64(bytes.get_f64_le());
            entries.push((row, col, value));
        }
        Ok(Self {
            block_row,
            block_col,
            block_size,
            entries,
        })
    }
}

/// Sorted two-finger merge dot product over `(coordinate, value)` pairs.
fn merge_dot<T: Float>(a: &[(Index, T)], b: &[(Index, T)]) -> T {
    let (mut i, mut j) = (0usize, 0usize);
    let mut acc = T::zero();
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                acc = acc + a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    acc
}
