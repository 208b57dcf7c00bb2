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

use std::io;
use thiserror::Error;

pub type Result<T, E = BlasError> = std::result::Result<T, E>;

/// scylla-blas error enum.
///
/// Transient store errors and counter-bump conflicts are not represented
/// here: they are retried internally by the queue/store layer (spec §7)
/// and never escape to a caller.
#[derive(Debug, Error)]
pub enum BlasError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("store error: {0}")]
    Store(#[from] scylla::transport::errors::QueryError),
    #[error("statement preparation failed: {0}")]
    Prepare(#[from] scylla::transport::errors::NewSessionError),

    /// Operand shapes (accounting for transposition) do not line up.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// A metadata row for the requested matrix/vector/queue id was not found.
    #[error("operand {0} has no metadata row")]
    OperandMissing(crate::types::Id),

    /// An operation that forbids operand aliasing (e.g. `gemv` with X == Y) was asked to do so.
    #[error("operand aliasing is forbidden for this operation")]
    AliasingForbidden,

    /// A claimed task's payload never became visible within the configured retry budget
    /// (spec §4.2.5 describes this as expected and transient; this variant is only raised
    /// if the caller-configured retry budget is exhausted).
    #[error("task {0} payload did not become visible before the retry budget was exhausted")]
    PayloadNotYetVisible(crate::types::Id),

    /// A task payload decoded to an unexpected size or tag (spec §8 "corrupt-payload").
    #[error("corrupt task payload: {0}")]
    CorruptPayload(String),

    /// A worker kernel panicked or returned an error while processing a subtask.
    #[error("worker kernel failed: {0}")]
    WorkerKernelFailure(String),

    /// The scheduler gave up waiting for a primary task to finish.
    #[error("operation timed out waiting for primary task {0} to finish")]
    OperationTimeout(crate::types::Id),

    /// trsv/tbsv did not converge within the caller's iteration cap.
    #[error("convergence failure after {0} iterations (ratio {1})")]
    ConvergenceFailure(usize, f64),

    #[error("unknown task kind tag {0}")]
    UnknownTaskKind(u8),
}
