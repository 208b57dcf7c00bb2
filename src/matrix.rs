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

//! Persistent matrix handle (spec §4.1, grounded on
//! `include/scylla_blas/matrix.hh`). A `Matrix<T>` owns no data itself; it
//! is a cheap, `Clone`-able reference to a row in `matrix_meta` plus the
//! block-addressed rows in `blocks`, both reached through a [`Store`].

use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{BlasError, Result};
use crate::store::{MatrixMeta, Store};
use crate::structure::{MatrixBlock, MatrixValue};
use crate::types::{block_col, block_row, ceil_div, Float, Id, Index};

/// A persistent, possibly-untyped matrix handle. Mirrors the original's
/// `basic_matrix`/`matrix<T>` split: [`BasicMatrix`] only knows shape and
/// can be resized/cleared, while [`Matrix`] additionally knows the element
/// type and can read/write values.
pub struct BasicMatrix<S: Store> {
    pub id: Id,
    pub row_count: Index,
    pub col_count: Index,
    pub block_size: Index,
    store: Arc<S>,
}

impl<S: Store> BasicMatrix<S> {
    pub async fn init(store: Arc<S>, id: Id, row_count: Index, col_count: Index, block_size: Index) -> Result<Self> {
        store
            .put_matrix_meta(
                id,
                MatrixMeta {
                    row_count,
                    col_count,
                    block_size,
                },
            )
            .await?;
        Ok(Self {
            id,
            row_count,
            col_count,
            block_size,
            store,
        })
    }

    pub async fn load(store: Arc<S>, id: Id) -> Result<Self> {
        let meta = store
            .get_matrix_meta(id)
            .await?
            .ok_or(BlasError::OperandMissing(id))?;
        Ok(Self {
            id,
            row_count: meta.row_count,
            col_count: meta.col_count,
            block_size: meta.block_size,
            store,
        })
    }

    pub fn block_rows(&self) -> Index {
        ceil_div(self.row_count, self.block_size)
    }

    pub fn block_cols(&self) -> Index {
        ceil_div(self.col_count, self.block_size)
    }

    pub async fn clear(&self) -> Result<()> {
        for (br, bc) in self.store.block_keys(self.id).await? {
            self.store.delete_block(self.id, br, bc).await?;
        }
        Ok(())
    }

    pub async fn resize(&mut self, row_count: Index, col_count: Index) -> Result<()> {
        self.row_count = row_count;
        self.col_count = col_count;
        self.store
            .put_matrix_meta(
                self.id,
                MatrixMeta {
                    row_count,
                    col_count,
                    block_size: self.block_size,
                },
            )
            .await
    }

    pub async fn drop_matrix(&self) -> Result<()> {
        self.clear().await?;
        self.store.delete_matrix_meta(self.id).await
    }
}

/// Typed view over a [`BasicMatrix`]; all value-level reads and writes go
/// through here.
pub struct Matrix<S: Store, T> {
    pub basic: BasicMatrix<S>,
    _marker: PhantomData<T>,
}

impl<S: Store, T: Float> Matrix<S, T> {
    pub fn new(basic: BasicMatrix<S>) -> Self {
        Self {
            basic,
            _marker: PhantomData,
        }
    }

    pub async fn init(store: Arc<S>, id: Id, row_count: Index, col_count: Index, block_size: Index) -> Result<Self> {
        Ok(Self::new(
            BasicMatrix::init(store, id, row_count, col_count, block_size).await?,
        ))
    }

    pub async fn load(store: Arc<S>, id: Id) -> Result<Self> {
        Ok(Self::new(BasicMatrix::load(store, id).await?))
    }

    fn check_bounds(&self, row: Index, col: Index) -> Result<()> {
        if row < 1 || row > self.basic.row_count || col < 1 || col > self.basic.col_count {
            return Err(BlasError::DimensionMismatch(format!(
                "coordinate ({row}, {col}) out of bounds for {}x{} matrix",
                self.basic.row_count, self.basic.col_count
            )));
        }
        Ok(())
    }

    fn local(&self, row: Index, col: Index) -> (Index, Index, Index, Index) {
        let bs = self.basic.block_size;
        let br = block_row(row, bs);
        let bc = block_col(col, bs);
        let local_row = row - (br - 1) * bs;
        let local_col = col - (bc - 1) * bs;
        (br, bc, local_row, local_col)
    }

    async fn load_block(&self, br: Index, bc: Index) -> Result<MatrixBlock<T>> {
        match self.basic.store.get_block(self.basic.id, br, bc).await? {
            Some(bytes) => MatrixBlock::from_bytes(br, bc, self.basic.block_size, bytes),
            None => Ok(MatrixBlock::empty(br, bc, self.basic.block_size)),
        }
    }

    async fn store_block(&self, block: &MatrixBlock<T>) -> Result<()> {
        if block.is_empty() {
            self.basic
                .store
                .delete_block(self.basic.id, block.block_row, block.block_col)
                .await
        } else {
            self.basic
                .store
                .put_block(self.basic.id, block.block_row, block.block_col, block.to_bytes())
                .await
        }
    }

    pub async fn get_value(&self, row: Index, col: Index) -> Result<T> {
        self.check_bounds(row, col)?;
        let (br, bc, lr, lc) = self.local(row, col);
        Ok(self.load_block(br, bc).await?.get(lr, lc))
    }

    pub async fn get_block(&self, block_row: Index, block_col: Index) -> Result<MatrixBlock<T>> {
        self.load_block(block_row, block_col).await
    }

    pub async fn insert_value(&self, row: Index, col: Index, value: T) -> Result<()> {
        self.check_bounds(row, col)?;
        let (br, bc, lr, lc) = self.local(row, col);
        let mut block = self.load_block(br, bc).await?;
        block.set(lr, lc, value);
        self.store_block(&block).await
    }

    pub async fn insert_values(&self, values: &[MatrixValue<T>]) -> Result<()> {
        use std::collections::BTreeMap;

        let mut by_block: BTreeMap<(Index, Index), Vec<(Index, Index, T)>> = BTreeMap::new();
        for v in values {
            self.check_bounds(v.row, v.col)?;
            let (br, bc, lr, lc) = self.local(v.row, v.col);
            by_block.entry((br, bc)).or_default().push((lr, lc, v.value));
        }
        for ((br, bc), entries) in by_block {
            let mut block = self.load_block(br, bc).await?;
            for (lr, lc, value) in entries {
                block.set(lr, lc, value);
            }
            self.store_block(&block).await?;
        }
        Ok(())
    }

    pub async fn insert_block(&self, block: MatrixBlock<T>) -> Result<()> {
        self.store_block(&block).await
    }

    pub async fn update_value(&self, row: Index, col: Index, delta: T) -> Result<()> {
        let current = self.get_value(row, col).await?;
        self.insert_value(row, col, current + delta).await
    }
}
