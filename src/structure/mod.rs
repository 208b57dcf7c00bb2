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

//! Pure in-memory block/segment algebra (spec §4.1). Nothing in this
//! module talks to the store; it operates on values already fetched into
//! memory by [`crate::matrix`] / [`crate::vector`].

mod matrix_block;
mod matrix_value;
mod vector_segment;
mod vector_value;

pub use matrix_block::MatrixBlock;
pub use matrix_value::MatrixValue;
pub use vector_segment::VectorSegment;
pub use vector_value::VectorValue;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn block_multiply_matches_dense_reference() {
        // A = [[1, 2], [0, 3]], B = [[1, 0], [4, 5]] -> A*B = [[9, 10], [12, 15]]
        let a = MatrixBlock::<f64>::from_entries(1, 1, 2, vec![(1, 1, 1.0), (1, 2, 2.0), (2, 2, 3.0)]);
        let b = MatrixBlock::<f64>::from_entries(1, 1, 2, vec![(1, 1, 1.0), (2, 1, 4.0), (2, 2, 5.0)]);
        let c = a.multiply(&b);
        assert_eq!(c.get(1, 1), 9.0);
        assert_eq!(c.get(1, 2), 10.0);
        assert_eq!(c.get(2, 1), 12.0);
        assert_eq!(c.get(2, 2), 15.0);
    }

    #[test]
    fn block_set_below_epsilon_deletes_entry() {
        let mut a = MatrixBlock::<f64>::from_entries(1, 1, 4, vec![(1, 1, 5.0)]);
        assert_eq!(a.nnz(), 1);
        a.set(1, 1, 1e-12);
        assert_eq!(a.nnz(), 0);
        assert_eq!(a.get(1, 1), 0.0);
    }

    #[test]
    fn block_roundtrips_through_bytes() {
        let a = MatrixBlock::<f64>::from_entries(3, 4, 8, vec![(1, 1, 1.5), (2, 3, -2.5)]);
        let bytes = a.to_bytes();
        let back = MatrixBlock::<f64>::from_bytes(3, 4, 8, bytes).unwrap();
        assert_eq!(a, back);
    }

    #[test]
    fn segment_merge_sum_and_dot() {
        let mut a = VectorSegment::<f64>::from_entries(1, 4, vec![(1, 1.0), (3, 2.0)]);
        let b = VectorSegment::<f64>::from_entries(1, 4, vec![(1, 1.0), (2, 5.0)]);
        assert_eq!(a.dot(&b), 1.0);
        a.add_assign_scaled(&b, 2.0);
        assert_eq!(a.get(1), 3.0);
        assert_eq!(a.get(2), 10.0);
        assert_eq!(a.get(3), 2.0);
    }

    #[test]
    fn segment_max_abs_prefers_lowest_index_on_tie() {
        let s = VectorSegment::<f64>::from_entries(1, 8, vec![(3, -4.0), (1, 4.0), (5, 1.0)]);
        assert_eq!(s.max_abs(), Some((1, 4.0)));
    }

    #[test]
    fn segment_roundtrips_through_bytes() {
        let s = VectorSegment::<f32>::from_entries(2, 16, vec![(1, 1.0), (9, -3.5)]);
        let bytes = s.to_bytes();
        let back = VectorSegment::<f32>::from_bytes(2, 16, bytes).unwrap();
        assert_eq!(s, back);
    }
}
