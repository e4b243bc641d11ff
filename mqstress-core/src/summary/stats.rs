use serde::Serialize;

/// Bucket count used for throughput histograms.
pub const HISTOGRAM_BUCKETS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistogramBucket {
    /// Throughput (msg/s) at the top of the bucket.
    pub upper_bound: f64,
    /// Fraction of sampled workers at or below `upper_bound`.
    pub cumulative: f64,
}

/// Cumulative distribution over equal-width buckets spanning `[min, max]`.
///
/// Only buckets holding at least one sample are listed, in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Histogram {
    pub buckets: Vec<HistogramBucket>,
}

impl Histogram {
    pub fn iter(&self) -> impl Iterator<Item = &HistogramBucket> {
        self.buckets.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Median of an ascending sequence; `0.0` when empty.
#[must_use]
pub fn median(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let len = sorted.len();
    (sorted[(len - 1) / 2] + sorted[len / 2]) / 2.0
}

/// Builds a cumulative histogram over an ascending sequence.
///
/// Bucket `i` covers `[lo + i*step, lo + (i+1)*step]`, inclusive on both ends,
/// with the last upper bound pinned to `hi`. A sample on an interior boundary
/// belongs to the first bucket that contains it. Fractions are relative to
/// `total`.
#[must_use]
pub fn histogram(sorted: &[f64], total: usize, buckets: usize) -> Histogram {
    let (Some(&lo), Some(&hi)) = (sorted.first(), sorted.last()) else {
        return Histogram::default();
    };
    let total = total.max(1) as f64;

    if hi <= lo || buckets <= 1 {
        return Histogram {
            buckets: vec![HistogramBucket {
                upper_bound: hi,
                cumulative: sorted.len() as f64 / total,
            }],
        };
    }

    let step = (hi - lo) / buckets as f64;
    let upper = |i: usize| {
        if i + 1 == buckets {
            hi
        } else {
            lo + step * (i + 1) as f64
        }
    };

    let mut counts = vec![0usize; buckets];
    for &v in sorted {
        let idx = (0..buckets)
            .find(|&i| v >= lo + step * i as f64 && v <= upper(i))
            .unwrap_or(buckets - 1);
        counts[idx] += 1;
    }

    let mut acc = 0usize;
    let buckets = counts
        .iter()
        .enumerate()
        .filter(|(_, n)| **n > 0)
        .map(|(i, n)| {
            acc += n;
            HistogramBucket {
                upper_bound: upper(i),
                cumulative: acc as f64 / total,
            }
        })
        .collect();

    Histogram { buckets }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn median_of_odd_and_even_sequences() {
        assert!(close(median(&[1.0, 2.0, 3.0]), 2.0));
        assert!(close(median(&[1.0, 2.0, 3.0, 4.0]), 2.5));
        assert!(close(median(&[7.0]), 7.0));
        assert!(close(median(&[]), 0.0));
    }

    #[test]
    fn histogram_is_cumulative_and_ends_at_one() {
        let samples: Vec<f64> = (1..=20).map(f64::from).collect();
        let h = histogram(&samples, samples.len(), HISTOGRAM_BUCKETS);

        assert!(!h.is_empty());
        let mut prev_bound = f64::NEG_INFINITY;
        let mut prev_frac = 0.0;
        for b in h.iter() {
            assert!(b.upper_bound > prev_bound);
            assert!(b.cumulative >= prev_frac);
            prev_bound = b.upper_bound;
            prev_frac = b.cumulative;
        }
        let Some(last) = h.buckets.last() else {
            panic!("histogram has no buckets");
        };
        assert!(close(last.upper_bound, 20.0));
        assert!(close(last.cumulative, 1.0));
    }

    #[test]
    fn boundary_ties_go_to_the_lower_bucket() {
        // lo=0, hi=10, step=1: the sample 1.0 sits on the edge of buckets 0 and 1.
        let samples = [0.0, 1.0, 10.0];
        let h = histogram(&samples, 3, 10);

        assert_eq!(h.len(), 2);
        assert!(close(h.buckets[0].upper_bound, 1.0));
        assert!(close(h.buckets[0].cumulative, 2.0 / 3.0));
        assert!(close(h.buckets[1].upper_bound, 10.0));
        assert!(close(h.buckets[1].cumulative, 1.0));
    }

    #[test]
    fn identical_samples_yield_a_single_bucket() {
        let h = histogram(&[5.0, 5.0, 5.0], 3, HISTOGRAM_BUCKETS);
        assert_eq!(
            h.buckets,
            vec![HistogramBucket {
                upper_bound: 5.0,
                cumulative: 1.0
            }]
        );
    }

    #[test]
    fn fractions_are_relative_to_total() {
        let h = histogram(&[1.0, 2.0], 4, HISTOGRAM_BUCKETS);
        let Some(last) = h.buckets.last() else {
            panic!("histogram has no buckets");
        };
        assert!(close(last.cumulative, 0.5));
    }

    #[test]
    fn empty_input_yields_empty_histogram() {
        assert!(histogram(&[], 0, HISTOGRAM_BUCKETS).is_empty());
    }
}
