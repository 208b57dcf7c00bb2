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

//! Persistent FIFO task queue (spec §4.2, grounded on
//! `include/scylla_blas/queue/scylla_queue.hh` /
//! `src/scylla_blas/queue/scylla_queue.cc`).
//!
//! A queue is a `(produced, claimed)` counter pair plus an append-only
//! table of payloads indexed by position. Producing bumps `produced` and
//! writes the payload at the new index; claiming bumps `claimed` and reads
//! the payload back. Multi-producer/multi-consumer queues bump counters
//! with a compare-and-swap retry loop; single-producer/single-consumer
//! queues (the common case: one scheduler, one worker dispatch loop per
//! subtask queue) bump unconditionally.

pub mod proto;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::error::{BlasError, Result};
use crate::store::{Store, TaskResponse};
use crate::types::Id;

/// Number of times [`TaskQueue::claim`] will poll for a just-produced
/// payload to become visible before giving up (spec §4.2.5).
const PAYLOAD_VISIBILITY_RETRIES: u32 = 50;
const PAYLOAD_VISIBILITY_POLL: Duration = Duration::from_millis(20);

/// A queue position only identifies a task within its own queue; the
/// scheduler and worker need a single flat id space to key the responses
/// table by, so a primary task's id is its queue id and position folded
/// into one integer. `position` is expected to stay well under 1e9 for any
/// queue's lifetime.
pub fn encode_task_id(queue_id: Id, position: i64) -> Id {
    queue_id * 1_000_000_000 + position
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Cardinality {
    Single,
    Multi,
}

pub struct TaskQueue<S: Store> {
    pub id: Id,
    store: Arc<S>,
    producer: Cardinality,
    consumer: Cardinality,
}

impl<S: Store> TaskQueue<S> {
    pub async fn create(
        store: Arc<S>,
        id: Id,
        producer: Cardinality,
        consumer: Cardinality,
    ) -> Result<Self> {
        store
            .create_queue_meta(id, producer == Cardinality::Multi, consumer == Cardinality::Multi)
            .await?;
        Ok(Self {
            id,
            store,
            producer,
            consumer,
        })
    }

    pub async fn attach(store: Arc<S>, id: Id) -> Result<Self> {
        let meta = store
            .get_queue_meta(id)
            .await?
            .ok_or(BlasError::OperandMissing(id))?;
        Ok(Self {
            id,
            store,
            producer: if meta.multi_producer {
                Cardinality::Multi
            } else {
                Cardinality::Single
            },
            consumer: if meta.multi_consumer {
                Cardinality::Multi
            } else {
                Cardinality::Single
            },
        })
    }

    pub async fn destroy(&self) -> Result<()> {
        self.store.delete_queue_meta(self.id).await
    }

    /// Appends `payload`, returning the 1-based position it was written at.
    pub async fn produce(&self, payload: Bytes) -> Result<i64> {
        let index = match self.producer {
            Cardinality::Single => self.store.bump_produced_unconditional(self.id).await?,
            Cardinality::Multi => loop {
                let meta = self
                    .store
                    .get_queue_meta(self.id)
                    .await?
                    .ok_or(BlasError::OperandMissing(self.id))?;
                if self.store.bump_produced_conditional(self.id, meta.produced).await? {
                    break meta.produced + 1;
                }
            },
        };
        self.store.put_task(self.id, index, payload).await?;
        Ok(index)
    }

    /// Claims the next payload in FIFO order, waiting for it to become
    /// visible if the producer's write hasn't propagated yet.
    pub async fn claim(&self) -> Result<Option<(i64, Bytes)>> {
        let index = match self.consumer {
            Cardinality::Single => {
                let meta = self
                    .store
                    .get_queue_meta(self.id)
                    .await?
                    .ok_or(BlasError::OperandMissing(self.id))?;
                if meta.claimed >= meta.produced {
                    return Ok(None);
                }
                self.store.bump_claimed_unconditional(self.id).await?
            }
            Cardinality::Multi => loop {
                let meta = self
                    .store
                    .get_queue_meta(self.id)
                    .await?
                    .ok_or(BlasError::OperandMissing(self.id))?;
                if meta.claimed >= meta.produced {
                    return Ok(None);
                }
                if self.store.bump_claimed_conditional(self.id, meta.claimed).await? {
                    break meta.claimed + 1;
                }
            },
        };

        for _ in 0..PAYLOAD_VISIBILITY_RETRIES {
            if let Some(payload) = self.store.get_task(self.id, index).await? {
                return Ok(Some((index, payload)));
            }
            tokio::time::sleep(PAYLOAD_VISIBILITY_POLL).await;
        }
        Err(BlasError::PayloadNotYetVisible(self.id))
    }

    pub async fn mark_finished(&self, task_id: Id, response: Option<f64>) -> Result<()> {
        self.mark_finished_full(task_id, response, None, None).await
    }

    pub async fn mark_finished_with_aux(
        &self,
        task_id: Id,
        response: Option<f64>,
        aux_index: Option<Id>,
    ) -> Result<()> {
        self.mark_finished_full(task_id, response, aux_index, None).await
    }

    pub async fn mark_finished_with_secondary(
        &self,
        task_id: Id,
        response: Option<f64>,
        secondary: Option<f64>,
    ) -> Result<()> {
        self.mark_finished_full(task_id, response, None, secondary).await
    }

    /// Writes every response channel at once; the worker dispatch loop is
    /// the only caller that knows which channels a given primary task's
    /// accumulated [`crate::kernels::KernelOutcome`]s actually populated.
    pub async fn mark_finished_full(
        &self,
        task_id: Id,
        response: Option<f64>,
        aux_index: Option<Id>,
        secondary: Option<f64>,
    ) -> Result<()> {
        self.store
            .put_response(
                task_id,
                TaskResponse {
                    finished: true,
                    response,
                    aux_index,
                    secondary,
                },
            )
            .await
    }

    pub async fn is_finished(&self, task_id: Id) -> Result<bool> {
        Ok(self.store.get_response(task_id).await?.finished)
    }

    pub async fn get_response(&self, task_id: Id) -> Result<Option<f64>> {
        Ok(self.store.get_response(task_id).await?.response)
    }

    pub async fn get_response_with_aux(&self, task_id: Id) -> Result<(Option<f64>, Option<Id>)> {
        let r = self.store.get_response(task_id).await?;
        Ok((r.response, r.aux_index))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::MemoryStore;

    /// Produces 8 distinct payloads and drains them back under every
    /// producer/consumer cardinality combination (spec §4.2 conformance),
    /// checking each payload is consumed exactly once, in FIFO order, and
    /// that `is_finished`/`get_response` track a task's own id correctly.
    async fn conformance_for(producer: Cardinality, consumer: Cardinality) {
        let store = MemoryStore::new();
        let id = store.allocate_id().await.unwrap();
        let queue = TaskQueue::create(store.clone(), id, producer, consumer).await.unwrap();

        let payloads: Vec<Bytes> = (0..8).map(|i: u8| Bytes::from(vec![i])).collect();
        for p in &payloads {
            queue.produce(p.clone()).await.unwrap();
        }

        let mut drained = Vec::new();
        while let Some((position, bytes)) = queue.claim().await.unwrap() {
            drained.push((position, bytes));
        }
        assert_eq!(drained.len(), payloads.len());
        for (i, (position, bytes)) in drained.iter().enumerate() {
            assert_eq!(*position, i as i64 + 1);
            assert_eq!(bytes, &payloads[i]);
        }
        assert!(queue.claim().await.unwrap().is_none());

        for (position, _) in &drained {
            let task_id = encode_task_id(id, *position);
            assert!(!queue.is_finished(task_id).await.unwrap());
            queue.mark_finished(task_id, Some(*position as f64)).await.unwrap();
            assert!(queue.is_finished(task_id).await.unwrap());
            assert_eq!(queue.get_response(task_id).await.unwrap(), Some(*position as f64));
        }

        queue.destroy().await.unwrap();
        assert!(TaskQueue::attach(store, id).await.is_err());
    }

    #[tokio::test]
    async fn single_producer_single_consumer() {
        conformance_for(Cardinality::Single, Cardinality::Single).await;
    }

    #[tokio::test]
    async fn single_producer_multi_consumer() {
        conformance_for(Cardinality::Single, Cardinality::Multi).await;
    }

    #[tokio::test]
    async fn multi_producer_single_consumer() {
        conformance_for(Cardinality::Multi, Cardinality::Single).await;
    }

    #[tokio::test]
    async fn multi_producer_multi_consumer() {
        conformance_for(Cardinality::Multi, Cardinality::Multi).await;
    }

    #[tokio::test]
    async fn mark_finished_with_aux_sets_only_aux_channel() {
        let store = MemoryStore::new();
        let id = store.allocate_id().await.unwrap();
        let queue = TaskQueue::create(store, id, Cardinality::Single, Cardinality::Single)
            .await
            .unwrap();
        let task_id = encode_task_id(id, 1);
        queue.mark_finished_with_aux(task_id, Some(4.0), Some(7)).await.unwrap();
        let (response, aux) = queue.get_response_with_aux(task_id).await.unwrap();
        assert_eq!(response, Some(4.0));
        assert_eq!(aux, Some(7));
    }
}
