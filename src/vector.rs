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

//! Persistent vector handle (spec §4.1, grounded on
//! `include/scylla_blas/vector.hh`). Same base/derived split as
//! [`crate::matrix`]: [`BasicVector`] knows shape only, [`Vector`] knows
//! the element type.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{BlasError, Result};
use crate::store::{Store, VectorMeta};
use crate::structure::{VectorSegment, VectorValue};
use crate::types::{ceil_div, segment_of, Float, Id, Index};

pub struct BasicVector<S: Store> {
    pub id: Id,
    pub length: Index,
    pub block_size: Index,
    store: Arc<S>,
}

impl<S: Store> BasicVector<S> {
    pub async fn init(store: Arc<S>, id: Id, length: Index, block_size: Index) -> Result<Self> {
        store.put_vector_meta(id, VectorMeta { length, block_size }).await?;
        Ok(Self {
            id,
            length,
            block_size,
            store,
        })
    }

    pub async fn load(store: Arc<S>, id: Id) -> Result<Self> {
        let meta = store
            .get_vector_meta(id)
            .await?
            .ok_or(BlasError::OperandMissing(id))?;
        Ok(Self {
            id,
            length: meta.length,
            block_size: meta.block_size,
            store,
        })
    }

    pub fn segment_count(&self) -> Index {
        ceil_div(self.length, self.block_size)
    }

    pub async fn clear(&self) -> Result<()> {
        for segment in self.store.segment_keys(self.id).await? {
            self.store.delete_segment(self.id, segment).await?;
        }
        Ok(())
    }

    pub async fn resize(&mut self, length: Index) -> Result<()> {
        self.length = length;
        self.store
            .put_vector_meta(
                self.id,
                VectorMeta {
                    length,
                    block_size: self.block_size,
                },
            )
            .await
    }

    pub async fn drop_vector(&self) -> Result<()> {
        self.clear().await?;
        self.store.delete_vector_meta(self.id).await
    }
}

pub struct Vector<S: Store, T> {
    pub basic: BasicVector<S>,
    _marker: PhantomData<T>,
}

impl<S: Store, T: Float> Vector<S, T> {
    pub fn new(basic: BasicVector<S>) -> Self {
        Self {
            basic,
            _marker: PhantomData,
        }
    }

    pub async fn init(store: Arc<S>, id: Id, length: Index, block_size: Index) -> Result<Self> {
        Ok(Self::new(BasicVector::init(store, id, length, block_size).await?))
    }

    pub async fn load(store: Arc<S>, id: Id) -> Result<Self> {
        Ok(Self::new(BasicVector::load(store, id).await?))
    }

    fn check_bounds(&self, index: Index) -> Result<()> {
        if index < 1 || index > self.basic.length {
            return Err(BlasError::DimensionMismatch(format!(
                "index {index} out of bounds for length-{} vector",
                self.basic.length
            )));
        }
        Ok(())
    }

    fn local(&self, index: Index) -> (Index, Index) {
        let bs = self.basic.block_size;
        let segment = segment_of(index, bs);
        let local_index = index - (segment - 1) * bs;
        (segment, local_index)
    }

    async fn load_segment(&self, segment: Index) -> Result<VectorSegment<T>> {
        match self.basic.store.get_segment(self.basic.id, segment).await? {
            Some(bytes) => VectorSegment::from_bytes(segment, self.basic.block_size, bytes),
            None => Ok(VectorSegment::empty(segment, self.basic.block_size)),
        }
    }

    async fn store_segment(&self, segment: &VectorSegment<T>) -> Result<()> {
        if segment.is_empty() {
            self.basic.store.delete_segment(self.basic.id, segment.segment).await
        } else {
            self.basic
                .store
                .put_segment(self.basic.id, segment.segment, segment.to_bytes())
                .await
        }
    }

    pub async fn get_value(&self, index: Index) -> Result<T> {
        self.check_bounds(index)?;
        let (segment, local) = self.local(index);
        Ok(self.load_segment(segment).await?.get(local))
    }

    pub async fn get_segment(&self, segment: Index) -> Result<VectorSegment<T>> {
        self.load_segment(segment).await
    }

    pub async fn insert_value(&self, index: Index, value: T) -> Result<()> {
        self.check_bounds(index)?;
        let (segment, local) = self.local(index);
        let mut seg = self.load_segment(segment).await?;
        seg.set(local, value);
        self.store_segment(&seg).await
    }

    pub async fn insert_values(&self, values: &[VectorValue<T>]) -> Result<()> {
        use std::collections::BTreeMap;

        let mut by_segment: BTreeMap<Index, Vec<(Index, T)>> = BTreeMap::new();
        for v in values {
            self.check_bounds(v.index)?;
            let (segment, local) = self.local(v.index);
            by_segment.entry(segment).or_default().push((local, v.value));
        }
        for (segment, entries) in by_segment {
            let mut seg = self.load_segment(segment).await?;
            for (local, value) in entries {
                seg.set(local, value);
            }
            self.store_segment(&seg).await?;
        }
        Ok(())
    }

    pub async fn insert_segment(&self, segment: VectorSegment<T>) -> Result<()> {
        self.store_segment(&segment).await
    }

    pub async fn update_value(&self, index: Index, delta: T) -> Result<()> {
        let current = self.get_value(index).await?;
        self.insert_value(index, current + delta).await
    }

    /// Materializes the whole vector densely; intended for small vectors
    /// and tests, never for worker-side kernels.
    pub async fn get_whole(&self) -> Result<Vec<T>> {
        let mut out = vec![T::zero(); self.basic.length as usize];
        for segment in 1..=self.basic.segment_count() {
            let seg = self.load_segment(segment).await?;
            let base = (segment - 1) * self.basic.block_size;
            for &(local, value) in seg.iter() {
                let global = base + local;
                if global >= 1 && global <= self.basic.length {
                    out[(global - 1) as usize] = value;
                }
            }
        }
        Ok(out)
    }
}
