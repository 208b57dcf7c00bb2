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

//! Task wire format.
//!
//! The original C++ (`include/scylla_blas/queue/proto.hh`) packs every
//! task kind into one `union` and relies on `memcpy`ing the right arm.
//! That does not translate into safe Rust, so every task and response is
//! instead an explicit tag byte followed by little-endian fields
//! (spec §9 re-architecture note).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{BlasError, Result};
use crate::types::{Id, Index, Transpose};

/// Mirrors the original `task_type` enum; the discriminant is the wire tag.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum TaskKind {
    Swap = 0,
    Scal = 1,
    Copy = 2,
    Axpy = 3,
    Dot = 4,
    Nrm2 = 5,
    Asum = 6,
    Iamax = 7,
    Gemv = 8,
    Gbmv = 9,
    Trmv = 10,
    Tbmv = 11,
    Trsv = 12,
    Tbsv = 13,
    Ger = 14,
    Gemm = 15,
    Syrk = 16,
    Syr2k = 17,
    Rmgen = 18,
    Rvgen = 19,
}

impl TaskKind {
    pub fn from_tag(tag: u8) -> Result<Self> {
        use TaskKind::*;
        Ok(match tag {
            0 => Swap,
            1 => Scal,
            2 => Copy,
            3 => Axpy,
            4 => Dot,
            5 => Nrm2,
            6 => Asum,
            7 => Iamax,
            8 => Gemv,
            9 => Gbmv,
            10 => Trmv,
            11 => Tbmv,
            12 => Trsv,
            13 => Tbsv,
            14 => Ger,
            15 => Gemm,
            16 => Syrk,
            17 => Syr2k,
            18 => Rmgen,
            19 => Rvgen,
            other => return Err(BlasError::UnknownTaskKind(other)),
        })
    }
}

/// One subtask description, addressed by the block/segment coordinates it
/// touches. Queued as the payload of an entry in a subtask queue and then
/// referenced by id from the primary task that owns the whole operation.
#[derive(Clone, Debug, PartialEq)]
pub struct SubtaskPayload {
    pub kind: TaskKind,
    pub operand_a: Id,
    pub operand_b: Id,
    pub operand_c: Id,
    /// Output coordinate (block row/segment of the result this subtask produces).
    pub out_row: Index,
    pub out_col: Index,
    pub alpha: f64,
    pub beta: f64,
    /// `TransA` (spec §3's matrix-op/mixed-op descriptors). The only
    /// operand transpose flag any task kind but `gemm`/`syrk`/`syr2k` needs.
    pub transpose: Transpose,
    /// `TransB` (spec §3's matrix-op descriptor `{..., B_id, TransB, ...}`);
    /// meaningful only for `gemm`/`syrk`/`syr2k` subtasks, ignored
    /// elsewhere and always set to `NoTrans` by every other task kind.
    pub transpose_b: Transpose,
    /// Sub-/super-diagonal band widths for `gbmv`/`tbsv` (spec §3's
    /// "mixed-op descriptor" `KL`/`KU` fields), in element units. `-1`
    /// means "unbounded" and is what every non-banded task kind sets.
    pub kl: i64,
    pub ku: i64,
}

impl SubtaskPayload {
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(83);
        buf.put_u8(self.kind as u8);
        buf.put_i64_le(self.operand_a);
        buf.put_i64_le(self.operand_b);
        buf.put_i64_le(self.operand_c);
        buf.put_i64_le(self.out_row);
        buf.put_i64_le(self.out_col);
        buf.put_f64_le(self.alpha);
        buf.put_f64_le(self.beta);
        buf.put_u8(matches!(self.transpose, Transpose::Trans) as u8);
        buf.put_u8(matches!(self.transpose_b, Transpose::Trans) as u8);
        buf.put_i64_le(self.kl);
        buf.put_i64_le(self.ku);
        buf.freeze()
    }

    pub fn from_bytes(mut bytes: Bytes) -> Result<Self> {
        if bytes.remaining() < 83 {
            return Err(BlasError::CorruptPayload("subtask payload truncated".into()));
        }
        let kind = TaskKind::from_tag(bytes.get_u8())?;
        let operand_a = bytes.get_i64_le();
        let operand_b = bytes.get_i64_le();
        let operand_c = bytes.get_i64_le();
        let out_row = bytes.get_i64_le();
        let out_col = bytes.get_i64_le();
        let alpha = bytes.get_f64_le();
        let beta = bytes.get_f64_le();
        let transpose = if bytes.get_u8() != 0 {
            Transpose::Trans
        } else {
            Transpose::NoTrans
        };
        let transpose_b = if bytes.get_u8() != 0 {
            Transpose::Trans
        } else {
            Transpose::NoTrans
        };
        let kl = bytes.get_i64_le();
        let ku = bytes.get_i64_le();
        Ok(Self {
            kind,
            operand_a,
            operand_b,
            operand_c,
            out_row,
            out_col,
            alpha,
            beta,
            transpose,
            transpose_b,
            kl,
            ku,
        })
    }
}

/// A primary task posted to a worker queue: "drain subtask queue
/// `subtask_queue` and mark yourself finished when it's empty."
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PrimaryTaskPayload {
    pub kind: TaskKind,
    pub subtask_queue: Id,
}

impl PrimaryTaskPayload {
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(9);
        buf.put_u8(self.kind as u8);
        buf.put_i64_le(self.subtask_queue);
        buf.freeze()
    }

    pub fn from_bytes(mut bytes: Bytes) -> Result<Self> {
        if bytes.remaining() < 9 {
            return Err(BlasError::CorruptPayload("primary task payload truncated".into()));
        }
        let kind = TaskKind::from_tag(bytes.get_u8())?;
        let subtask_queue = bytes.get_i64_le();
        Ok(Self { kind, subtask_queue })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtask_payload_roundtrips_with_independent_transposes() {
        let payload = SubtaskPayload {
            kind: TaskKind::Gemm,
            operand_a: 11,
            operand_b: 22,
            operand_c: 33,
            out_row: 3,
            out_col: 7,
            alpha: 1.5,
            beta: -0.25,
            transpose: Transpose::Trans,
            transpose_b: Transpose::NoTrans,
            kl: -1,
            ku: -1,
        };
        let decoded = SubtaskPayload::from_bytes(payload.to_bytes()).unwrap();
        assert_eq!(decoded, payload);
        assert_eq!(decoded.transpose, Transpose::Trans);
        assert_eq!(decoded.transpose_b, Transpose::NoTrans);
    }

    #[test]
    fn subtask_payload_rejects_truncated_bytes() {
        let payload = SubtaskPayload {
            kind: TaskKind::Gbmv,
            operand_a: 1,
            operand_b: 2,
            operand_c: 3,
            out_row: 1,
            out_col: 0,
            alpha: 1.0,
            beta: 0.0,
            transpose: Transpose::NoTrans,
            transpose_b: Transpose::NoTrans,
            kl: 1,
            ku: 2,
        };
        let mut bytes = payload.to_bytes();
        bytes.truncate(bytes.len() - 1);
        assert!(SubtaskPayload::from_bytes(bytes).is_err());
    }

    #[test]
    fn primary_task_payload_roundtrips() {
        let payload = PrimaryTaskPayload {
            kind: TaskKind::Syr2k,
            subtask_queue: 42,
        };
        let decoded = PrimaryTaskPayload::from_bytes(payload.to_bytes()).unwrap();
        assert_eq!(decoded, payload);
    }
}
