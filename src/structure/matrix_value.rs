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

use crate::types::Index;

/// A single non-zero matrix entry at global (1-indexed) coordinates.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MatrixValue<T> {
    pub row: Index,
    pub col: Index,
    pub value: T,
}

impl<T> MatrixValue<T> {
    pub fn new(row: Index, col: Index, value: T) -> Self {
        Self { row, col, value }
    }
}
