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

//! Shared scalar types and BLAS enums.

/// 1-indexed row/column/segment/block coordinate.
pub type Index = i64;
/// Id of a persistent matrix, vector or queue.
pub type Id = i64;

/// Sparsity cutoff and iterative-convergence tolerance (spec ε).
pub const EPSILON: f64 = 1e-9;

/// Default Scylla native-protocol port.
pub const DEFAULT_PORT: u16 = 9042;

pub fn epsilon_for<T: Float>(_: T) -> T {
    T::epsilon_value()
}

/// Minimal abstraction over the two element types this crate supports,
/// so kernels can be written once and instantiated for f32/f64.
pub trait Float:
    Copy
    + Clone
    + PartialEq
    + PartialOrd
    + std::fmt::Debug
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + std::ops::Mul<Output = Self>
    + std::ops::Neg<Output = Self>
    + Send
    + Sync
    + 'static
{
    fn zero() -> Self;
    fn one() -> Self;
    fn abs_value(self) -> Self;
    fn epsilon_value() -> Self;
    fn sqrt_value(self) -> Self;
    fn as_f64(self) -> f64;
    fn from_f64(v: f64) -> Self;
}

impl Float for f32 {
    fn zero() -> Self {
        0.0
    }
    fn one() -> Self {
        1.0
    }
    fn abs_value(self) -> Self {
        self.abs()
    }
    fn epsilon_value() -> Self {
        EPSILON as f32
    }
    fn sqrt_value(self) -> Self {
        self.sqrt()
    }
    fn as_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl Float for f64 {
    fn zero() -> Self {
        0.0
    }
    fn one() -> Self {
        1.0
    }
    fn abs_value(self) -> Self {
        self.abs()
    }
    fn epsilon_value() -> Self {
        EPSILON
    }
    fn sqrt_value(self) -> Self {
        self.sqrt()
    }
    fn as_f64(self) -> f64 {
        self
    }
    fn from_f64(v: f64) -> Self {
        v
    }
}

/// `ceil(a / b)` for strictly positive block-size arithmetic.
#[inline]
pub const fn ceil_div(a: Index, b: Index) -> Index {
    1 + (a - 1) / b
}

#[inline]
pub const fn block_row(row: Index, block_size: Index) -> Index {
    ceil_div(row, block_size)
}

#[inline]
pub const fn block_col(col: Index, block_size: Index) -> Index {
    ceil_div(col, block_size)
}

#[inline]
pub const fn segment_of(index: Index, block_size: Index) -> Index {
    ceil_div(index, block_size)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Transpose {
    NoTrans,
    Trans,
}

impl Transpose {
    pub fn flip(self) -> Self {
        match self {
            Transpose::NoTrans => Transpose::Trans,
            Transpose::Trans => Transpose::NoTrans,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Uplo {
    Upper,
    Lower,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Diag {
    NonUnit,
    Unit,
}
