//! Block analysis pipeline
//!
//! - `classifier`: voting transaction filter
//! - `retry`: exponential backoff policy for remote fetches
//! - `block`: fetch one block and reduce it to [`PerBlockStats`](crate::types::PerBlockStats)
//! - `batch`: combine per-block records into a [`BatchReport`](crate::types::BatchReport)

pub mod batch;
pub mod block;
pub mod classifier;
pub mod retry;

pub use batch::{AggregateError, BatchAggregator, BatchExtras, NOMINAL_BLOCK_TIME};
pub use block::{summarize_block, BlockAnalyzer, SkippedSlot};
pub use classifier::is_voting;
pub use retry::{retry_with_backoff, RetryOutcome, RetryPolicy};

use crate::types::Distribution;

/// Division that degrades to 0 instead of producing NaN or infinity
#[inline]
pub(crate) fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

#[inline]
pub(crate) fn mean(values: &[f64]) -> f64 {
    ratio(values.iter().sum(), values.len() as f64)
}

/// Sort `values` ascending and take max, mean and the two-case median.
/// An empty slice yields all zeros.
pub fn distribution(values: &mut [f64]) -> Distribution {
    if values.is_empty() {
        return Distribution::default();
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let len = values.len();
    let median = if len % 2 == 0 {
        (values[len / 2 - 1] + values[len / 2]) / 2.0
    } else {
        values[len / 2]
    };

    Distribution {
        max: values[len - 1],
        average: mean(values),
        median,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_median_textbook_cases() {
        assert_eq!(distribution(&mut [1.0, 2.0, 3.0, 4.0]).median, 2.5);
        assert_eq!(distribution(&mut [1.0, 2.0, 3.0]).median, 2.0);
        assert_eq!(distribution(&mut [3.0, 1.0, 2.0]).median, 2.0);
    }

    #[test]
    fn test_empty_distribution_is_zero() {
        assert_eq!(distribution(&mut []), Distribution::default());
    }

    #[test]
    fn test_ratio_never_divides_by_zero() {
        assert_eq!(ratio(10.0, 0.0), 0.0);
        assert_eq!(mean(&[]), 0.0);
    }

    proptest! {
        #[test]
        fn prop_median_within_bounds(mut values in proptest::collection::vec(0u32..1_000_000, 1..200)) {
            let mut floats: Vec<f64> = values.iter().map(|v| *v as f64).collect();
            let dist = distribution(&mut floats);
            values.sort();
            let min = values[0] as f64;
            let max = values[values.len() - 1] as f64;

            prop_assert!(dist.median >= min && dist.median <= max);
            prop_assert!(dist.average >= min && dist.average <= max);
            prop_assert_eq!(dist.max, max);
        }

        #[test]
        fn prop_distribution_is_order_independent(values in proptest::collection::vec(0u32..1_000_000, 1..100)) {
            let mut forward: Vec<f64> = values.iter().map(|v| *v as f64).collect();
            let mut backward: Vec<f64> = forward.iter().rev().copied().collect();
            let a = distribution(&mut forward);
            let b = distribution(&mut backward);
            prop_assert_eq!(a.max, b.max);
            prop_assert_eq!(a.median, b.median);
        }
    }
}
