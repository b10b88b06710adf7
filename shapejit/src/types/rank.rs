//! Rank helpers for adverb type inference.

use super::JitType;
use crate::error::{JitError, JitResult};

/// Shared rank of a list of adverb inputs.
///
/// Every array input must have the same rank; scalars (and any other
/// non-array type) broadcast against anything. Returns 0 when no input is an
/// array.
pub fn max_rank(types: &[JitType]) -> JitResult<usize> {
    let mut current = 0;
    for ty in types {
        if let JitType::Array { rank, .. } = ty {
            if current != 0 && current != *rank {
                return Err(JitError::RankMismatch {
                    expected: current,
                    found: *rank,
                });
            }
            current = *rank;
        }
    }
    Ok(current)
}

/// Number of axes an adverb loops over.
///
/// With an explicit axis the adverb walks exactly that one axis (as long as
/// there is any array input); without one it walks every axis.
pub fn num_outer_axes(types: &[JitType], axis: Option<usize>) -> JitResult<usize> {
    let rank = max_rank(types)?;
    Ok(if rank > 0 && axis.is_some() { 1 } else { rank })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarKind;

    fn arr(rank: usize) -> JitType {
        JitType::Array {
            elt: ScalarKind::Float64,
            rank,
        }
    }

    #[test]
    fn test_max_rank_scalar_and_vector() {
        assert_eq!(max_rank(&[JitType::INT64, arr(1)]).unwrap(), 1);
    }

    #[test]
    fn test_max_rank_all_scalars() {
        assert_eq!(max_rank(&[JitType::INT64, JitType::FLOAT64]).unwrap(), 0);
        assert_eq!(max_rank(&[]).unwrap(), 0);
    }

    #[test]
    fn test_max_rank_mismatch() {
        let err = max_rank(&[arr(1), arr(2)]).unwrap_err();
        assert_eq!(
            err,
            JitError::RankMismatch {
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn test_max_rank_checks_every_argument() {
        // the mismatch sits behind a scalar and a matching array
        let err = max_rank(&[JitType::INT64, arr(2), arr(2), arr(3)]);
        assert!(matches!(err, Err(JitError::RankMismatch { .. })));
    }

    #[test]
    fn test_num_outer_axes() {
        assert_eq!(num_outer_axes(&[arr(3)], None).unwrap(), 3);
        assert_eq!(num_outer_axes(&[arr(3)], Some(1)).unwrap(), 1);
        assert_eq!(num_outer_axes(&[JitType::INT64], Some(0)).unwrap(), 0);
    }
}
