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

//! Ways to fold the per-primary-task responses of one fanned-out operation
//! into a single scalar (spec §4.3). Every BLAS routine that returns a
//! value - `dot`, `nrm2`, `asum`, `iamax`, trsv/tbsv's convergence check -
//! reduces to one of these three shapes.

use crate::types::Id;

use super::RawResponse;

/// Plain sum, used by `dot`, `nrm2` (sum of squares, square-rooted by the
/// caller) and `asum`.
pub fn sum(responses: &[RawResponse]) -> f64 {
    responses.iter().filter_map(|r| r.response).sum()
}

/// Index of the largest-magnitude value across all responses, ties
/// resolved in favor of the lowest index - used by `iamax`.
pub fn argmax_lowest_index(responses: &[RawResponse]) -> Option<(Id, f64)> {
    responses
        .iter()
        .filter_map(|r| r.response.zip(r.aux_index))
        .fold(None, |best: Option<(Id, f64)>, (value, index)| match best {
            None => Some((index, value)),
            Some((bi, bv)) if value.abs() > bv.abs() || (value.abs() == bv.abs() && index < bi) => {
                Some((index, value))
            }
            Some(best) => Some(best),
        })
}

/// Sums the `response`/`secondary` channels independently and returns
/// their ratio, the relative-residual check trsv/tbsv iterate against
/// (spec §5.6, `strsv`/`dtrsv`'s convergence loop).
pub fn residual_norm_ratio(responses: &[RawResponse]) -> f64 {
    let residual: f64 = responses.iter().filter_map(|r| r.response).sum();
    let norm: f64 = responses.iter().filter_map(|r| r.secondary).sum();
    if norm.abs() < crate::types::EPSILON {
        residual
    } else {
        residual / norm
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn resp(value: f64, index: Id) -> RawResponse {
        RawResponse {
            response: Some(value),
            aux_index: Some(index),
            secondary: None,
        }
    }

    #[test]
    fn argmax_breaks_ties_toward_lowest_index() {
        let responses = vec![resp(-3.0, 5), resp(3.0, 2), resp(1.0, 0)];
        assert_eq!(argmax_lowest_index(&responses), Some((2, 3.0)));
    }

    #[test]
    fn argmax_of_empty_is_none() {
        assert_eq!(argmax_lowest_index(&[]), None);
    }

    #[test]
    fn residual_norm_ratio_falls_back_to_raw_residual_near_zero_norm() {
        let responses = vec![RawResponse {
            response: Some(0.002),
            aux_index: None,
            secondary: Some(0.0),
        }];
        assert_eq!(residual_norm_ratio(&responses), 0.002);
    }
}
