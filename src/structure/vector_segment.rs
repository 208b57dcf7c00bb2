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

//! A single tile of a blocked sparse vector (spec §4.1, grounded on
//! `include/scylla_blas/structure/vector_segment.hh`).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{BlasError, Result};
use crate::types::{Float, Index};

/// Non-zero entries of one `block_size`-long tile, in local (1-indexed,
/// within-segment) coordinates, always kept sorted by index.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorSegment<T> {
    pub segment: Index,
    pub block_size: Index,
    entries: Vec<(Index, T)>,
}

impl<T: Float> VectorSegment<T> {
    pub fn empty(segment: Index, block_size: Index) -> Self {
        Self {
            segment,
            block_size,
            entries: Vec::new(),
        }
    }

    pub fn from_entries(segment: Index, block_size: Index, mut entries: Vec<(Index, T)>) -> Self {
        entries.sort_by_key(|(i, _)| *i);
        let mut merged = Vec::with_capacity(entries.len());
        for (index, value) in entries {
            match merged.last_mut() {
                Some((i, v)) if *i == index => *v = *v + value,
                _ => merged.push((index, value)),
            }
        }
        merged.retain(|(_, v)| v.abs_value() >= T::epsilon_value());
        Self {
            segment,
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

    pub fn iter(&self) -> impl Iterator<Item = &(Index, T)> {
        self.entries.iter()
    }

    pub fn get(&self, index: Index) -> T {
        self.entries
            .binary_search_by_key(&index, |(i, _)| *i)
            .map(|idx| self.entries[idx].1)
            .unwrap_or_else(T::zero)
    }

    pub fn set(&mut self, index: Index, value: T) {
        match self.entries.binary_search_by_key(&index, |(i, _)| *i) {
            Ok(idx) => {
                if value.abs_value() < T::epsilon_value() {
                    self.entries.remove(idx);
                } else {
                    self.entries[idx].1 = value;
                }
            }
            Err(idx) => {
                if value.abs_value() >= T::epsilon_value() {
                    self.entries.insert(idx, (index, value));
                }
            }
        }
    }

    /// `self += alpha * other` by merging two sorted entry lists.
    pub fn add_assign_scaled(&mut self, other: &Self, alpha: T) {
        let merged: Vec<_> = self
            .entries
            .iter()
            .map(|&(i, v)| (i, v))
            .chain(other.entries.iter().map(|&(i, v)| (i, alpha * v)))
            .collect();
        *self = Self::from_entries(self.segment, self.block_size, merged);
    }

    pub fn scale(&mut self, alpha: T) {
        for (_, v) in &mut self.entries {
            *v = *v * alpha;
        }
        self.entries.retain(|(_, v)| v.abs_value() >= T::epsilon_value());
    }

    /// Sorted two-finger merge dot product against another segment sharing
    /// the same local coordinate space.
    pub fn dot(&self, other: &Self) -> T {
        let (mut i, mut j) = (0usize, 0usize);
        let mut acc = T::zero();
        while i < self.entries.len() && j < other.entries.len() {
            match self.entries[i].0.cmp(&other.entries[j].0) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    acc = acc + self.entries[i].1 * other.entries[j].1;
                    i += 1;
                    j += 1;
                }
            }
        }
        acc
    }

    pub fn sum_abs(&self) -> T {
        self.entries
            .iter()
            .fold(T::zero(), |acc, &(_, v)| acc + v.abs_value())
    }

    /// Entry of maximal magnitude, as `(local_index, value)`; ties keep the
    /// lowest index, matching `isamax`'s tie-break rule.
    pub fn max_abs(&self) -> Option<(Index, T)> {
        self.entries.iter().copied().fold(None, |best, (i, v)| match best {
            None => Some((i, v)),
            Some((_, bv)) if v.abs_value() > bv.abs_value() => Some((i, v)),
            Some(best) => Some(best),
        })
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + self.entries.len() * 16);
        buf.put_u32_le(self.entries.len() as u32);
        for &(i, v) in &self.entries {
            buf.put_i64_le(i);
            buf.put_f64_le(v.as_f64());
        }
        buf.freeze()
    }

    pub fn from_bytes(segment: Index, block_size: Index, mut bytes: Bytes) -> Result<Self> {
        if bytes.remaining() < 4 {
            return Err(BlasError::CorruptPayload("segment header truncated".into()));
        }
        let count = bytes.get_u32_le() as usize;
        if bytes.remaining() != count * 16 {
            return Err(BlasError::CorruptPayload("segment entry count mismatch".into()));
        }
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let index = bytes.get_i64_le();
            let value = T::from_f64(bytes.get_f64_le());
            entries.push((index, value));
        }
        Ok(Self {
            segment,
            block_size,
            entries,
        })
    }
}
