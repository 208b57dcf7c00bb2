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

//! Storage abstraction.
//!
//! Every higher layer (structure, matrix/vector handles, the task queue,
//! the scheduler and the worker) talks to the store only through the
//! [`Store`] trait, never to `scylla::Session` directly. That keeps the
//! core logic testable against [`MemoryStore`] without a live cluster,
//! mirroring how `substrate-archive`'s actors depend on `Database` rather
//! than on `sqlx::PgPool` directly.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use scylla::{Session, SessionBuilder};
use std::sync::Arc;

use crate::error::Result;
use crate::types::{Id, Index};

/// Persisted metadata row for a matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatrixMeta {
    pub row_count: Index,
    pub col_count: Index,
    pub block_size: Index,
}

/// Persisted metadata row for a vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VectorMeta {
    pub length: Index,
    pub block_size: Index,
}

/// Persisted metadata row for a task queue (spec §4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueMeta {
    pub produced: i64,
    pub claimed: i64,
    pub multi_producer: bool,
    pub multi_consumer: bool,
}

/// Persisted finished/response row for a single task id.
///
/// `aux_index` carries a coordinate alongside the numeric response, used
/// only by `iamax`-style kernels that need to report both a value and the
/// index it was found at. `secondary` carries a second numeric channel,
/// used only by the trsv/tbsv Jacobi sweep to report an (error, norm) pair
/// in one round trip.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TaskResponse {
    pub finished: bool,
    pub response: Option<f64>,
    pub aux_index: Option<Id>,
    pub secondary: Option<f64>,
}

/// Everything the rest of this crate needs from a wide-column store.
///
/// Conditional updates (`*_conditional`) implement the "lightweight
/// transaction" producer/consumer counter bump described in spec §4.2:
/// they succeed only if the stored value still matches `expected`, and the
/// caller is expected to retry on failure. Unconditional updates are used
/// only by the single-producer/single-consumer fast path, where no other
/// writer can be racing.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn get_matrix_meta(&self, id: Id) -> Result<Option<MatrixMeta>>;
    async fn put_matrix_meta(&self, id: Id, meta: MatrixMeta) -> Result<()>;
    async fn delete_matrix_meta(&self, id: Id) -> Result<()>;

    async fn get_block(&self, matrix_id: Id, block_row: Index, block_col: Index)
        -> Result<Option<Bytes>>;
    async fn put_block(
        &self,
        matrix_id: Id,
        block_row: Index,
        block_col: Index,
        bytes: Bytes,
    ) -> Result<()>;
    async fn delete_block(&self, matrix_id: Id, block_row: Index, block_col: Index) -> Result<()>;
    async fn block_keys(&self, matrix_id: Id) -> Result<Vec<(Index, Index)>>;

    async fn get_vector_meta(&self, id: Id) -> Result<Option<VectorMeta>>;
    async fn put_vector_meta(&self, id: Id, meta: VectorMeta) -> Result<()>;
    async fn delete_vector_meta(&self, id: Id) -> Result<()>;

    async fn get_segment(&self, vector_id: Id, segment: Index) -> Result<Option<Bytes>>;
    async fn put_segment(&self, vector_id: Id, segment: Index, bytes: Bytes) -> Result<()>;
    async fn delete_segment(&self, vector_id: Id, segment: Index) -> Result<()>;
    async fn segment_keys(&self, vector_id: Id) -> Result<Vec<Index>>;

    async fn get_queue_meta(&self, id: Id) -> Result<Option<QueueMeta>>;
    async fn create_queue_meta(&self, id: Id, multi_producer: bool, multi_consumer: bool)
        -> Result<()>;
    async fn delete_queue_meta(&self, id: Id) -> Result<()>;

    /// CAS bump of `produced`; returns `true` on success.
    async fn bump_produced_conditional(&self, id: Id, expected: i64) -> Result<bool>;
    /// Unconditional bump of `produced`, single-producer path only.
    async fn bump_produced_unconditional(&self, id: Id) -> Result<i64>;
    /// CAS bump of `claimed`; returns `true` on success.
    async fn bump_claimed_conditional(&self, id: Id, expected: i64) -> Result<bool>;
    /// Unconditional bump of `claimed`, single-consumer path only.
    async fn bump_claimed_unconditional(&self, id: Id) -> Result<i64>;

    async fn put_task(&self, queue_id: Id, index: i64, payload: Bytes) -> Result<()>;
    async fn get_task(&self, queue_id: Id, index: i64) -> Result<Option<Bytes>>;

    async fn put_response(&self, task_id: Id, response: TaskResponse) -> Result<()>;
    async fn get_response(&self, task_id: Id) -> Result<TaskResponse>;

    /// Allocates a fresh id, used to name matrices/vectors/queues created
    /// at runtime (e.g. the scheduler's per-operation subtask queues).
    async fn allocate_id(&self) -> Result<Id>;
}

/// `scylla`-backed implementation. Keyspace and table layout mirror the
/// original `blas` keyspace (`include/scylla_blas/utils/scylla_types.hh`)
/// re-expressed as CQL tables instead of a hand-rolled C++ wrapper.
pub struct ScyllaStore {
    session: Session,
    keyspace: String,
}

impl ScyllaStore {
    pub async fn connect(addr: &str, keyspace: &str) -> Result<Self> {
        let session = SessionBuilder::new().known_node(addr).build().await?;
        let store = Self {
            session,
            keyspace: keyspace.to_string(),
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.session
            .query(
                format!(
                    "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
                     {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
                    self.keyspace
                ),
                &[],
            )
            .await?;

        let ks = &self.keyspace;
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {ks}.matrix_meta (id bigint PRIMARY KEY, \
                 row_count bigint, col_count bigint, block_size bigint)"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {ks}.blocks (matrix_id bigint, block_row bigint, \
                 block_col bigint, payload blob, PRIMARY KEY (matrix_id, block_row, block_col))"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {ks}.vector_meta (id bigint PRIMARY KEY, \
                 length bigint, block_size bigint)"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {ks}.segments (vector_id bigint, segment bigint, \
                 payload blob, PRIMARY KEY (vector_id, segment))"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {ks}.queue_meta (id bigint PRIMARY KEY, \
                 produced bigint, claimed bigint, multi_producer boolean, multi_consumer boolean)"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {ks}.queue_tasks (queue_id bigint, idx bigint, \
                 payload blob, PRIMARY KEY (queue_id, idx))"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {ks}.responses (task_id bigint PRIMARY KEY, \
                 finished boolean, response double, aux_index bigint, secondary double)"
            ),
            format!("CREATE TABLE IF NOT EXISTS {ks}.id_alloc (k int PRIMARY KEY, next bigint)"),
        ];
        for stmt in statements {
            self.session.query(stmt, &[]).await?;
        }
        let seed = format!(
            "INSERT INTO {} (k, next) VALUES (0, 1) IF NOT EXISTS",
            self.t("id_alloc")
        );
        self.session.query(seed, &[]).await?;
        Ok(())
    }

    fn t(&self, table: &str) -> String {
        format!("{}.{}", self.keyspace, table)
    }
}

#[async_trait]
impl Store for ScyllaStore {
    async fn get_matrix_meta(&self, id: Id) -> Result<Option<MatrixMeta>> {
        let query = format!(
            "SELECT row_count, col_count, block_size FROM {} WHERE id = ?",
            self.t("matrix_meta")
        );
        let rows = self.session.query(query, (id,)).await?.rows.unwrap_or_default();
        Ok(rows.into_iter().next().map(|row| {
            let (row_count, col_count, block_size) = row.into_typed::<(i64, i64, i64)>().unwrap();
            MatrixMeta {
                row_count,
                col_count,
                block_size,
            }
        }))
    }

    async fn put_matrix_meta(&self, id: Id, meta: MatrixMeta) -> Result<()> {
        let query = format!(
            "INSERT INTO {} (id, row_count, col_count, block_size) VALUES (?, ?, ?, ?)",
            self.t("matrix_meta")
        );
        self.session
            .query(query, (id, meta.row_count, meta.col_count, meta.block_size))
            .await?;
        Ok(())
    }

    async fn delete_matrix_meta(&self, id: Id) -> Result<()> {
        let query = format!("DELETE FROM {} WHERE id = ?", self.t("matrix_meta"));
        self.session.query(query, (id,)).await?;
        let query = format!("DELETE FROM {} WHERE matrix_id = ?", self.t("blocks"));
        self.session.query(query, (id,)).await?;
        Ok(())
    }

    async fn get_block(
        &self,
        matrix_id: Id,
        block_row: Index,
        block_col: Index,
    ) -> Result<Option<Bytes>> {
        let query = format!(
            "SELECT payload FROM {} WHERE matrix_id = ? AND block_row = ? AND block_col = ?",
            self.t("blocks")
        );
        let rows = self
            .session
            .query(query, (matrix_id, block_row, block_col))
            .await?
            .rows
            .unwrap_or_default();
        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.into_typed::<(Vec<u8>,)>().unwrap().0.into()))
    }

    async fn put_block(
        &self,
        matrix_id: Id,
        block_row: Index,
        block_col: Index,
        bytes: Bytes,
    ) -> Result<()> {
        let query = format!(
            "INSERT INTO {} (matrix_id, block_row, block_col, payload) VALUES (?, ?, ?, ?)",
            self.t("blocks")
        );
        self.session
            .query(query, (matrix_id, block_row, block_col, bytes.to_vec()))
            .await?;
        Ok(())
    }

    async fn delete_block(&self, matrix_id: Id, block_row: Index, block_col: Index) -> Result<()> {
        let query = format!(
            "DELETE FROM {} WHERE matrix_id = ? AND block_row = ? AND block_col = ?",
            self.t("blocks")
        );
        self.session
            .query(query, (matrix_id, block_row, block_col))
            .await?;
        Ok(())
    }

    async fn block_keys(&self, matrix_id: Id) -> Result<Vec<(Index, Index)>> {
        let query = format!(
            "SELECT block_row, block_col FROM {} WHERE matrix_id = ?",
            self.t("blocks")
        );
        let rows = self.session.query(query, (matrix_id,)).await?.rows.unwrap_or_default();
        Ok(rows
            .into_iter()
            .map(|row| row.into_typed::<(i64, i64)>().unwrap())
            .collect())
    }

    async fn get_vector_meta(&self, id: Id) -> Result<Option<VectorMeta>> {
        let query = format!(
            "SELECT length, block_size FROM {} WHERE id = ?",
            self.t("vector_meta")
        );
        let rows = self.session.query(query, (id,)).await?.rows.unwrap_or_default();
        Ok(rows.into_iter().next().map(|row| {
            let (length, block_size) = row.into_typed::<(i64, i64)>().unwrap();
            VectorMeta { length, block_size }
        }))
    }

    async fn put_vector_meta(&self, id: Id, meta: VectorMeta) -> Result<()> {
        let query = format!(
            "INSERT INTO {} (id, length, block_size) VALUES (?, ?, ?)",
            self.t("vector_meta")
        );
        self.session
            .query(query, (id, meta.length, meta.block_size))
            .await?;
        Ok(())
    }

    async fn delete_vector_meta(&self, id: Id) -> Result<()> {
        let query = format!("DELETE FROM {} WHERE id = ?", self.t("vector_meta"));
        self.session.query(query, (id,)).await?;
        let query = format!("DELETE FROM {} WHERE vector_id = ?", self.t("segments"));
        self.session.query(query, (id,)).await?;
        Ok(())
    }

    async fn get_segment(&self, vector_id: Id, segment: Index) -> Result<Option<Bytes>> {
        let query = format!(
            "SELECT payload FROM {} WHERE vector_id = ? AND segment = ?",
            self.t("segments")
        );
        let rows = self
            .session
            .query(query, (vector_id, segment))
            .await?
            .rows
            .unwrap_or_default();
        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.into_typed::<(Vec<u8>,)>().unwrap().0.into()))
    }

    async fn put_segment(&self, vector_id: Id, segment: Index, bytes: Bytes) -> Result<()> {
        let query = format!(
            "INSERT INTO {} (vector_id, segment, payload) VALUES (?, ?, ?)",
            self.t("segments")
        );
        self.session
            .query(query, (vector_id, segment, bytes.to_vec()))
            .await?;
        Ok(())
    }

    async fn delete_segment(&self, vector_id: Id, segment: Index) -> Result<()> {
        let query = format!(
            "DELETE FROM {} WHERE vector_id = ? AND segment = ?",
            self.t("segments")
        );
        self.session.query(query, (vector_id, segment)).await?;
        Ok(())
    }

    async fn segment_keys(&self, vector_id: Id) -> Result<Vec<Index>> {
        let query = format!("SELECT segment FROM {} WHERE vector_id = ?", self.t("segments"));
        let rows = self.session.query(query, (vector_id,)).await?.rows.unwrap_or_default();
        Ok(rows
            .into_iter()
            .map(|row| row.into_typed::<(i64,)>().unwrap().0)
            .collect())
    }

    async fn get_queue_meta(&self, id: Id) -> Result<Option<QueueMeta>> {
        let query = format!(
            "SELECT produced, claimed, multi_producer, multi_consumer FROM {} WHERE id = ?",
            self.t("queue_meta")
        );
        let rows = self.session.query(query, (id,)).await?.rows.unwrap_or_default();
        Ok(rows.into_iter().next().map(|row| {
            let (produced, claimed, multi_producer, multi_consumer) =
                row.into_typed::<(i64, i64, bool, bool)>().unwrap();
            QueueMeta {
                produced,
                claimed,
                multi_producer,
                multi_consumer,
            }
        }))
    }

    async fn create_queue_meta(
        &self,
        id: Id,
        multi_producer: bool,
        multi_consumer: bool,
    ) -> Result<()> {
        let query = format!(
            "INSERT INTO {} (id, produced, claimed, multi_producer, multi_consumer) \
             VALUES (?, 0, 0, ?, ?)",
            self.t("queue_meta")
        );
        self.session
            .query(query, (id, multi_producer, multi_consumer))
            .await?;
        Ok(())
    }

    async fn delete_queue_meta(&self, id: Id) -> Result<()> {
        let query = format!("DELETE FROM {} WHERE id = ?", self.t("queue_meta"));
        self.session.query(query, (id,)).await?;
        let query = format!("DELETE FROM {} WHERE queue_id = ?", self.t("queue_tasks"));
        self.session.query(query, (id,)).await?;
        Ok(())
    }

    async fn bump_produced_conditional(&self, id: Id, expected: i64) -> Result<bool> {
        let query = format!(
            "UPDATE {} SET produced = ? WHERE id = ? IF produced = ?",
            self.t("queue_meta")
        );
        let result = self.session.query(query, (expected + 1, id, expected)).await?;
        Ok(lwt_applied(&result))
    }

    async fn bump_produced_unconditional(&self, id: Id) -> Result<i64> {
        let meta = self
            .get_queue_meta(id)
            .await?
            .ok_or(crate::error::BlasError::OperandMissing(id))?;
        let next = meta.produced + 1;
        let query = format!("UPDATE {} SET produced = ? WHERE id = ?", self.t("queue_meta"));
        self.session.query(query, (next, id)).await?;
        Ok(next)
    }

    async fn bump_claimed_conditional(&self, id: Id, expected: i64) -> Result<bool> {
        let query = format!(
            "UPDATE {} SET claimed = ? WHERE id = ? IF claimed = ?",
            self.t("queue_meta")
        );
        let result = self.session.query(query, (expected + 1, id, expected)).await?;
        Ok(lwt_applied(&result))
    }

    async fn bump_claimed_unconditional(&self, id: Id) -> Result<i64> {
        let meta = self
            .get_queue_meta(id)
            .await?
            .ok_or(crate::error::BlasError::OperandMissing(id))?;
        let next = meta.claimed + 1;
        let query = format!("UPDATE {} SET claimed = ? WHERE id = ?", self.t("queue_meta"));
        self.session.query(query, (next, id)).await?;
        Ok(next)
    }

    async fn put_task(&self, queue_id: Id, index: i64, payload: Bytes) -> Result<()> {
        let query = format!(
            "INSERT INTO {} (queue_id, idx, payload) VALUES (?, ?, ?)",
            self.t("queue_tasks")
        );
        self.session
            .query(query, (queue_id, index, payload.to_vec()))
            .await?;
        Ok(())
    }

    async fn get_task(&self, queue_id: Id, index: i64) -> Result<Option<Bytes>> {
        let query = format!(
            "SELECT payload FROM {} WHERE queue_id = ? AND idx = ?",
            self.t("queue_tasks")
        );
        let rows = self
            .session
            .query(query, (queue_id, index))
            .await?
            .rows
            .unwrap_or_default();
        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.into_typed::<(Vec<u8>,)>().unwrap().0.into()))
    }

    async fn put_response(&self, task_id: Id, response: TaskResponse) -> Result<()> {
        let query = format!(
            "INSERT INTO {} (task_id, finished, response, aux_index, secondary) VALUES (?, ?, ?, ?, ?)",
            self.t("responses")
        );
        self.session
            .query(
                query,
                (
                    task_id,
                    response.finished,
                    response.response,
                    response.aux_index,
                    response.secondary,
                ),
            )
            .await?;
        Ok(())
    }

    async fn get_response(&self, task_id: Id) -> Result<TaskResponse> {
        let query = format!(
            "SELECT finished, response, aux_index, secondary FROM {} WHERE task_id = ?",
            self.t("responses")
        );
        let rows = self
            .session
            .query(query, (task_id,))
            .await?
            .rows
            .unwrap_or_default();
        Ok(rows
            .into_iter()
            .next()
            .map(|row| {
                let (finished, response, aux_index, secondary) =
                    row.into_typed::<(bool, Option<f64>, Option<i64>, Option<f64>)>().unwrap();
                TaskResponse {
                    finished,
                    response,
                    aux_index,
                    secondary,
                }
            })
            .unwrap_or_default())
    }

    async fn allocate_id(&self) -> Result<Id> {
        loop {
            let query = format!("SELECT next FROM {} WHERE k = 0", self.t("id_alloc"));
            let rows = self.session.query(query, &[]).await?.rows.unwrap_or_default();
            let current = rows
                .into_iter()
                .next()
                .map(|row| row.into_typed::<(i64,)>().unwrap().0)
                .unwrap_or(1);
            let query = format!(
                "UPDATE {} SET next = ? WHERE k = 0 IF next = ?",
                self.t("id_alloc")
            );
            let result = self.session.query(query, (current + 1, current)).await?;
            if lwt_applied(&result) {
                return Ok(current);
            }
        }
    }
}

fn lwt_applied(result: &scylla::QueryResult) -> bool {
    result
        .rows
        .as_ref()
        .and_then(|rows| rows.first())
        .and_then(|row| row.columns.first())
        .and_then(|col| col.as_ref())
        .map(|cql| matches!(cql, scylla::frame::response::result::CqlValue::Boolean(true)))
        .unwrap_or(false)
}

/// In-memory fake used by this crate's own test suite. No network, no
/// cluster: every table above is a plain map guarded by a `parking_lot`
/// lock, matching how `sa-work-queue`'s tests stand in a fake `QueueHandle`
/// rather than a live AMQP broker.
#[derive(Default)]
pub struct MemoryStore {
    matrices: RwLock<hashbrown::HashMap<Id, MatrixMeta>>,
    blocks: RwLock<hashbrown::HashMap<(Id, Index, Index), Bytes>>,
    vectors: RwLock<hashbrown::HashMap<Id, VectorMeta>>,
    segments: RwLock<hashbrown::HashMap<(Id, Index), Bytes>>,
    queues: RwLock<hashbrown::HashMap<Id, QueueMeta>>,
    tasks: RwLock<hashbrown::HashMap<(Id, i64), Bytes>>,
    responses: RwLock<hashbrown::HashMap<Id, TaskResponse>>,
    next_id: std::sync::atomic::AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_matrix_meta(&self, id: Id) -> Result<Option<MatrixMeta>> {
        Ok(self.matrices.read().get(&id).copied())
    }

    async fn put_matrix_meta(&self, id: Id, meta: MatrixMeta) -> Result<()> {
        self.matrices.write().insert(id, meta);
        Ok(())
    }

    async fn delete_matrix_meta(&self, id: Id) -> Result<()> {
        self.matrices.write().remove(&id);
        self.blocks.write().retain(|k, _| k.0 != id);
        Ok(())
    }

    async fn get_block(
        &self,
        matrix_id: Id,
        block_row: Index,
        block_col: Index,
    ) -> Result<Option<Bytes>> {
        Ok(self.blocks.read().get(&(matrix_id, block_row, block_col)).cloned())
    }

    async fn put_block(
        &self,
        matrix_id: Id,
        block_row: Index,
        block_col: Index,
        bytes: Bytes,
    ) -> Result<()> {
        self.blocks.write().insert((matrix_id, block_row, block_col), bytes);
        Ok(())
    }

    async fn delete_block(&self, matrix_id: Id, block_row: Index, block_col: Index) -> Result<()> {
        self.blocks.write().remove(&(matrix_id, block_row, block_col));
        Ok(())
    }

    async fn block_keys(&self, matrix_id: Id) -> Result<Vec<(Index, Index)>> {
        Ok(self
            .blocks
            .read()
            .keys()
            .filter(|k| k.0 == matrix_id)
            .map(|k| (k.1, k.2))
            .collect())
    }

    async fn get_vector_meta(&self, id: Id) -> Result<Option<VectorMeta>> {
        Ok(self.vectors.read().get(&id).copied())
    }

    async fn put_vector_meta(&self, id: Id, meta: VectorMeta) -> Result<()> {
        self.vectors.write().insert(id, meta);
        Ok(())
    }

    async fn delete_vector_meta(&self, id: Id) -> Result<()> {
        self.vectors.write().remove(&id);
        self.segments.write().retain(|k, _| k.0 != id);
        Ok(())
    }

    async fn get_segment(&self, vector_id: Id, segment: Index) -> Result<Option<Bytes>> {
        Ok(self.segments.read().get(&(vector_id, segment)).cloned())
    }

    async fn put_segment(&self, vector_id: Id, segment: Index, bytes: Bytes) -> Result<()> {
        self.segments.write().insert((vector_id, segment), bytes);
        Ok(())
    }

    async fn delete_segment(&self, vector_id: Id, segment: Index) -> Result<()> {
        self.segments.write().remove(&(vector_id, segment));
        Ok(())
    }

    async fn segment_keys(&self, vector_id: Id) -> Result<Vec<Index>> {
        Ok(self
            .segments
            .read()
            .keys()
            .filter(|k| k.0 == vector_id)
            .map(|k| k.1)
            .collect())
    }

    async fn get_queue_meta(&self, id: Id) -> Result<Option<QueueMeta>> {
        Ok(self.queues.read().get(&id).copied())
    }

    async fn create_queue_meta(
        &self,
        id: Id,
        multi_producer: bool,
        multi_consumer: bool,
    ) -> Result<()> {
        self.queues.write().insert(
            id,
            QueueMeta {
                produced: 0,
                claimed: 0,
                multi_producer,
                multi_consumer,
            },
        );
        Ok(())
    }

    async fn delete_queue_meta(&self, id: Id) -> Result<()> {
        self.queues.write().remove(&id);
        self.tasks.write().retain(|k, _| k.0 != id);
        Ok(())
    }

    async fn bump_produced_conditional(&self, id: Id, expected: i64) -> Result<bool> {
        let mut guard = self.queues.write();
        match guard.get_mut(&id) {
            Some(meta) if meta.produced == expected => {
                meta.produced += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(crate::error::BlasError::OperandMissing(id)),
        }
    }

    async fn bump_produced_unconditional(&self, id: Id) -> Result<i64> {
        let mut guard = self.queues.write();
        let meta = guard
            .get_mut(&id)
            .ok_or(crate::error::BlasError::OperandMissing(id))?;
        meta.produced += 1;
        Ok(meta.produced)
    }

    async fn bump_claimed_conditional(&self, id: Id, expected: i64) -> Result<bool> {
        let mut guard = self.queues.write();
        match guard.get_mut(&id) {
            Some(meta) if meta.claimed == expected => {
                meta.claimed += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(crate::error::BlasError::OperandMissing(id)),
        }
    }

    async fn bump_claimed_unconditional(&self, id: Id) -> Result<i64> {
        let mut guard = self.queues.write();
        let meta = guard
            .get_mut(&id)
            .ok_or(crate::error::BlasError::OperandMissing(id))?;
        meta.claimed += 1;
        Ok(meta.claimed)
    }

    async fn put_task(&self, queue_id: Id, index: i64, payload: Bytes) -> Result<()> {
        self.tasks.write().insert((queue_id, index), payload);
        Ok(())
    }

    async fn get_task(&self, queue_id: Id, index: i64) -> Result<Option<Bytes>> {
        Ok(self.tasks.read().get(&(queue_id, index)).cloned())
    }

    async fn put_response(&self, task_id: Id, response: TaskResponse) -> Result<()> {
        self.responses.write().insert(task_id, response);
        Ok(())
    }

    async fn get_response(&self, task_id: Id) -> Result<TaskResponse> {
        Ok(self.responses.read().get(&task_id).copied().unwrap_or_default())
    }

    async fn allocate_id(&self) -> Result<Id> {
        Ok(self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1)
    }
}
