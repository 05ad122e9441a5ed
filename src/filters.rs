//! Outlier rejection
//!
//! Robust filters applied to a round's observations before fusion. The
//! aggregator uses the MAD filter by default; the IQR variant is kept as an
//! interchangeable strategy.

use crate::types::Observation;

/// Default z-score cutoff for the MAD filter.
pub const DEFAULT_MAD_THRESHOLD: f64 = 3.0;
/// Default whisker multiplier for the IQR filter.
pub const DEFAULT_IQR_K: f64 = 1.5;

/// Consistency constant relating MAD to the standard deviation of a normal
/// distribution.
const MAD_SCALE: f64 = 1.4826;

/// Median of a slice: mean of the two middle values for even N, the middle
/// value for odd N. Returns 0.0 for an empty slice.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Median-absolute-deviation filter.
///
/// Fewer than 3 observations pass through unchanged. When the MAD collapses
/// to zero (identical prices), 1% of the median stands in as the effective
/// deviation so the z-scores stay finite and everything is kept.
pub fn mad_filter(observations: Vec<Observation>, threshold: f64) -> Vec<Observation> {
    if observations.len() < 3 {
        return observations;
    }

    let prices: Vec<f64> = observations.iter().map(|o| o.price).collect();
    let m = median(&prices);

    let deviations: Vec<f64> = prices.iter().map(|p| (p - m).abs()).collect();
    let mad = median(&deviations);
    let effective = if mad > 0.0 { mad } else { 0.01 * m };

    observations
        .into_iter()
        .filter(|o| {
            let z = (o.price - m).abs() / (MAD_SCALE * effective);
            z <= threshold
        })
        .collect()
}

/// Interquartile-range filter. Needs at least 4 observations; smaller inputs
/// pass through unchanged. Quartiles are taken by floored index into the
/// sorted prices.
pub fn iqr_filter(observations: Vec<Observation>, k: f64) -> Vec<Observation> {
    if observations.len() < 4 {
        return observations;
    }

    let mut sorted: Vec<f64> = observations.iter().map(|o| o.price).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len();
    let q1 = sorted[n / 4];
    let q3 = sorted[(n * 3) / 4];
    let iqr = q3 - q1;
    let lo = q1 - k * iqr;
    let hi = q3 + k * iqr;

    observations
        .into_iter()
        .filter(|o| o.price >= lo && o.price <= hi)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Asset;

    fn obs(prices: &[f64]) -> Vec<Observation> {
        prices
            .iter()
            .map(|p| Observation::new(Asset::Rtx4090, *p, "test", 0))
            .collect()
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[1.0, 2.0, 3.0]), 2.0);
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_eq!(median(&[1598.0, 1599.99, 1605.0, 1610.0]), 1602.495);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn test_median_idempotent() {
        let xs = [3.0, 1.0, 7.0, 5.0, 9.0];
        let m = median(&xs);
        let mut with_median = xs.to_vec();
        with_median.push(m);
        assert_eq!(median(&with_median), m);
    }

    #[test]
    fn test_mad_filter_small_input_unchanged() {
        let input = obs(&[100.0, 9999.0]);
        let out = mad_filter(input.clone(), DEFAULT_MAD_THRESHOLD);
        assert_eq!(out.len(), input.len());
    }

    #[test]
    fn test_mad_filter_rejects_gross_outlier() {
        let out = mad_filter(
            obs(&[1199.0, 1201.0, 1200.0, 1198.0, 1202.0, 9999.0]),
            DEFAULT_MAD_THRESHOLD,
        );
        assert_eq!(out.len(), 5);
        assert!(out.iter().all(|o| o.price < 2000.0));
        let prices: Vec<f64> = out.iter().map(|o| o.price).collect();
        assert_eq!(median(&prices), 1200.0);
    }

    #[test]
    fn test_mad_filter_identical_prices_all_kept() {
        let out = mad_filter(obs(&[500.0, 500.0, 500.0, 500.0]), DEFAULT_MAD_THRESHOLD);
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_mad_filter_keeps_tight_cluster() {
        // Three agreeing sources, all within 3 MAD of the median.
        let out = mad_filter(
            obs(&[1599.99, 1605.0, 1610.0, 1598.0]),
            DEFAULT_MAD_THRESHOLD,
        );
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_iqr_filter_small_input_unchanged() {
        let input = obs(&[1.0, 2.0, 100.0]);
        assert_eq!(iqr_filter(input, DEFAULT_IQR_K).len(), 3);
    }

    #[test]
    fn test_iqr_filter_rejects_extremes() {
        let out = iqr_filter(
            obs(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0, 106.0, 1000.0]),
            DEFAULT_IQR_K,
        );
        assert!(out.iter().all(|o| o.price < 1000.0));
    }
}
