//! Streaming running statistics on arbitrary-precision decimals.
//!
//! A [`RunningStat`] keeps only `(count, mean)`. Each sample updates the
//! mean in place:
//!
//! ```text
//! mean' = (mean * n + x) / (n + 1)
//! n'    = n + 1
//! ```
//!
//! The mean is rounded to [`MEAN_PRECISION`] significant digits after
//! every update, so the representation stays bounded however large `n`
//! grows while the error stays far below one unit of any sample.

use bigdecimal::BigDecimal;

/// Significant digits kept in a running mean.
pub const MEAN_PRECISION: u64 = 64;

/// Count and mean of all samples observed so far.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningStat {
    count: u64,
    mean: BigDecimal,
}

impl RunningStat {
    /// An empty statistic: count 0, mean 0.
    pub fn new() -> Self {
        Self {
            count: 0,
            mean: BigDecimal::from(0u32),
        }
    }

    /// Folds one sample into the mean.
    pub fn record(&mut self, value: u64) {
        let n = BigDecimal::from(self.count);
        let next = BigDecimal::from(self.count + 1);
        let total = self.mean.clone() * n + BigDecimal::from(value);
        self.mean = (total / next).with_prec(MEAN_PRECISION);
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> &BigDecimal {
        &self.mean
    }
}

impl Default for RunningStat {
    fn default() -> Self {
        Self::new()
    }
}

/// Mean of `values` computed in one pass over the full history.
///
/// Zero for an empty slice, matching [`RunningStat::new`].
pub fn batch_mean(values: &[u64]) -> BigDecimal {
    if values.is_empty() {
        return BigDecimal::from(0u32);
    }
    let sum = values
        .iter()
        .fold(BigDecimal::from(0u32), |acc, v| acc + BigDecimal::from(*v));
    sum / BigDecimal::from(values.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn tolerance() -> BigDecimal {
        BigDecimal::from_str("1e-40").unwrap()
    }

    fn assert_close(a: &BigDecimal, b: &BigDecimal) {
        let diff = (a - b).abs();
        assert!(diff < tolerance(), "{a} vs {b} differ by {diff}");
    }

    fn incremental(values: &[u64]) -> RunningStat {
        let mut stat = RunningStat::new();
        for v in values {
            stat.record(*v);
        }
        stat
    }

    #[test]
    fn test_empty_stat_is_zero() {
        let stat = RunningStat::new();
        assert_eq!(stat.count(), 0);
        assert_eq!(stat.mean(), &BigDecimal::from(0u32));
        assert_eq!(batch_mean(&[]), BigDecimal::from(0u32));
    }

    #[test]
    fn test_single_sample() {
        let stat = incremental(&[4321]);
        assert_eq!(stat.count(), 1);
        assert_eq!(stat.mean(), &BigDecimal::from(4321u32));
    }

    #[test]
    fn test_two_samples_exact_half() {
        let stat = incremental(&[1, 2]);
        assert_eq!(stat.count(), 2);
        assert_eq!(stat.mean(), &BigDecimal::from_str("1.5").unwrap());
    }

    #[test]
    fn test_incremental_matches_batch_at_various_sizes() {
        for n in [0usize, 1, 2, 100, 10_000] {
            let values: Vec<u64> = (0..n as u64).map(|i| 1_000 + (i * 7_919) % 9_001).collect();
            let stat = incremental(&values);
            assert_eq!(stat.count(), n as u64);
            assert_close(stat.mean(), &batch_mean(&values));
        }
    }

    #[test]
    fn test_repeating_thirds_stay_precise() {
        // 1/3 is not representable exactly; rounding must not drift.
        let values: Vec<u64> = (0..3_000).map(|i| if i % 3 == 0 { 1 } else { 0 }).collect();
        let stat = incremental(&values);
        assert_close(stat.mean(), &(BigDecimal::from(1u32) / BigDecimal::from(3u32)));
    }

    #[test]
    fn test_large_values_do_not_overflow() {
        let values = [u64::MAX, u64::MAX, u64::MAX];
        let stat = incremental(&values);
        assert_eq!(stat.mean(), &BigDecimal::from(u64::MAX));
    }

    proptest! {
        #[test]
        fn prop_incremental_equals_batch(values in proptest::collection::vec(0u64..1_000_000, 0..300)) {
            let stat = incremental(&values);
            let diff = (stat.mean() - &batch_mean(&values)).abs();
            prop_assert!(diff < tolerance());
            prop_assert_eq!(stat.count(), values.len() as u64);
        }
    }
}
