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

use std::sync::Arc;

use crate::error::Result;
use crate::queue::proto::SubtaskPayload;
use crate::store::Store;
use crate::types::Float;

use super::common::{load_segment, store_segment};
use super::KernelOutcome;

pub async fn swap<S: Store, T: Float>(store: &Arc<S>, subtask: &SubtaskPayload) -> Result<KernelOutcome> {
    let segment = subtask.out_row;
    let x = load_segment::<S, T>(store, subtask.operand_a, segment).await?;
    let y = load_segment::<S, T>(store, subtask.operand_b, segment).await?;
    store_segment(store, subtask.operand_a, &y).await?;
    store_segment(store, subtask.operand_b, &x).await?;
    Ok(KernelOutcome::None)
}

pub async fn scal<S: Store, T: Float>(store: &Arc<S>, subtask: &SubtaskPayload) -> Result<KernelOutcome> {
    let mut x = load_segment::<S, T>(store, subtask.operand_a, subtask.out_row).await?;
    x.scale(T::from_f64(subtask.alpha));
    store_segment(store, subtask.operand_a, &x).await?;
    Ok(KernelOutcome::None)
}

pub async fn copy<S: Store, T: Float>(store: &Arc<S>, subtask: &SubtaskPayload) -> Result<KernelOutcome> {
    let x = load_segment::<S, T>(store, subtask.operand_a, subtask.out_row).await?;
    store_segment(store, subtask.operand_b, &x).await?;
    Ok(KernelOutcome::None)
}

pub async fn axpy<S: Store, T: Float>(store: &Arc<S>, subtask: &SubtaskPayload) -> Result<KernelOutcome> {
    let x = load_segment::<S, T>(store, subtask.operand_a, subtask.out_row).await?;
    let mut y = load_segment::<S, T>(store, subtask.operand_b, subtask.out_row).await?;
    y.add_assign_scaled(&x, T::from_f64(subtask.alpha));
    store_segment(store, subtask.operand_b, &y).await?;
    Ok(KernelOutcome::None)
}

pub async fn dot<S: Store, T: Float>(store: &Arc<S>, subtask: &SubtaskPayload) -> Result<KernelOutcome> {
    let x = load_segment::<S, T>(store, subtask.operand_a, subtask.out_row).await?;
    let y = load_segment::<S, T>(store, subtask.operand_b, subtask.out_row).await?;
    Ok(KernelOutcome::Scalar(x.dot(&y).as_f64()))
}

pub async fn nrm2<S: Store, T: Float>(store: &Arc<S>, subtask: &SubtaskPayload) -> Result<KernelOutcome> {
    let x = load_segment::<S, T>(store, subtask.operand_a, subtask.out_row).await?;
    Ok(KernelOutcome::Scalar(x.dot(&x).as_f64()))
}

pub async fn asum<S: Store, T: Float>(store: &Arc<S>, subtask: &SubtaskPayload) -> Result<KernelOutcome> {
    let x = load_segment::<S, T>(store, subtask.operand_a, subtask.out_row).await?;
    Ok(KernelOutcome::Scalar(x.sum_abs().as_f64()))
}

pub async fn iamax<S: Store, T: Float>(store: &Arc<S>, subtask: &SubtaskPayload) -> Result<KernelOutcome> {
    let x = load_segment::<S, T>(store, subtask.operand_a, subtask.out_row).await?;
    match x.max_abs() {
        Some((local_index, value)) => {
            let global_index = (subtask.out_row - 1) * x.block_size + local_index;
            Ok(KernelOutcome::ArgMax(global_index, value.as_f64()))
        }
        None => Ok(KernelOutcome::None),
    }
}
