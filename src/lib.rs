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

//! Distributed dense/sparse BLAS levels 1-3 over a wide-column store.
//!
//! A matrix or vector is a row in a metadata table plus a set of blocks
//! (or segments) scattered across the store; a BLAS call is fanned out
//! into one [`queue::proto::SubtaskPayload`] per output block, posted to
//! per-worker subtask queues, and folded back into a single result by a
//! [`scheduler::RoutineScheduler`] once every worker has finished.

pub mod config;
pub mod error;
pub mod kernels;
#[cfg(feature = "logging")]
pub mod logger;
pub mod matrix;
pub mod queue;
pub mod scheduler;
pub mod store;
pub mod structure;
pub mod types;
pub mod vector;
pub mod worker;

pub use self::config::Config;
pub use self::error::{BlasError, Result};
pub use self::matrix::{BasicMatrix, Matrix};
pub use self::queue::{Cardinality, TaskQueue};
pub use self::scheduler::RoutineScheduler;
pub use self::store::{MemoryStore, ScyllaStore, Store};
pub use self::types::{Diag, Float, Id, Index, Transpose, Uplo};
pub use self::vector::{BasicVector, Vector};
pub use self::worker::Worker;

/// Path to a local directory where a `.env` file or other runtime state
/// can be kept, following the same platform-specific convention the
/// Substrate tooling uses for its own data directory.
pub fn scylla_blas_default_dir() -> std::path::PathBuf {
    let base_dirs = dirs::BaseDirs::new().expect("invalid home directory path");
    let mut path = base_dirs.data_local_dir().to_path_buf();
    path.push("scylla_blas");
    path
}
