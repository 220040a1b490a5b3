//! Pairwise merging of (count, mean, variance) summaries.
//!
//! Chan, Golub & LeVeque parallel variance: for disjoint batches A and B,
//!
//! ```text
//! delta = mean_b - mean_a
//! M2    = M2_a + M2_b + delta² · n_a · n_b / (n_a + n_b)
//! mean  = (n_a · mean_a + n_b · mean_b) / (n_a + n_b)
//! var   = M2 / (n_a + n_b - 1)
//! ```
//!
//! where `M2_x = var_x · (n_x - 1)` is the sum of squared deviations. The
//! result equals the summary of the union, so merging is associative and
//! commutative up to rounding and files can be folded in any order or tree
//! shape.

use crate::data::model::{ChannelSummaries, ChannelSummary};
use crate::error::{Error, Result};

/// Merge two per-channel summaries over the same channel set.
///
/// Works on the whole channel vector at once; both sides must list the same
/// channels in the same order.
pub fn merge(a: &ChannelSummaries, b: &ChannelSummaries) -> Result<ChannelSummaries> {
    if a.channels() != b.channels() {
        return Err(Error::ChannelMismatch {
            left: a.channels().to_vec(),
            right: b.channels().to_vec(),
        });
    }

    let (n_a, n_b) = (a.count(), b.count());
    let (means, variances): (Vec<f64>, Vec<f64>) = a
        .means()
        .iter()
        .zip(a.variances())
        .zip(b.means().iter().zip(b.variances()))
        .map(|((&ma, &va), (&mb, &vb))| combine(n_a, ma, va, n_b, mb, vb))
        .unzip();

    ChannelSummaries::from_parts(a.channels().to_vec(), n_a + n_b, means, variances)
}

/// Merge two single-channel summaries.
pub fn merge_one(a: ChannelSummary, b: ChannelSummary) -> Result<ChannelSummary> {
    for count in [a.count, b.count] {
        if count == 0 {
            return Err(Error::Domain { count });
        }
    }
    let (mean, variance) = combine(a.count, a.mean, a.variance, b.count, b.mean, b.variance);
    Ok(ChannelSummary {
        count: a.count + b.count,
        mean,
        variance,
    })
}

/// Combined `(mean, variance)` of two batches with non-zero counts.
fn combine(n_a: u64, mean_a: f64, var_a: f64, n_b: u64, mean_b: f64, var_b: f64) -> (f64, f64) {
    let (fa, fb) = (n_a as f64, n_b as f64);
    let f = fa + fb;
    let delta = mean_b - mean_a;
    let m2 = squared_deviations(var_a, n_a)
        + squared_deviations(var_b, n_b)
        + delta * delta * fa * fb / f;
    ((fa * mean_a + fb * mean_b) / f, m2 / (f - 1.0))
}

/// `var · (n - 1)`; a single sample contributes no spread.
fn squared_deviations(variance: f64, count: u64) -> f64 {
    if count < 2 {
        0.0
    } else {
        variance * (count - 1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_variance(xs: &[f64]) -> (f64, f64) {
        let n = xs.len() as f64;
        let mean = xs.iter().sum::<f64>() / n;
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
        (mean, var)
    }

    fn summary_of(xs: &[f64]) -> ChannelSummary {
        let (mean, variance) = if xs.len() > 1 {
            sample_variance(xs)
        } else {
            (xs[0], f64::NAN)
        };
        ChannelSummary {
            count: xs.len() as u64,
            mean,
            variance,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn split_batch_matches_direct_variance() {
        let xs: Vec<f64> = (0..37).map(|i| ((i * 7919) % 101) as f64 * 0.37 - 4.0).collect();
        let (mean, var) = sample_variance(&xs);
        for cut in [1, 2, 10, 36] {
            let m = merge_one(summary_of(&xs[..cut]), summary_of(&xs[cut..])).unwrap();
            assert_eq!(m.count, 37);
            assert!(close(m.mean, mean), "cut {cut}: mean {} vs {mean}", m.mean);
            assert!(close(m.variance, var), "cut {cut}: var {} vs {var}", m.variance);
        }
    }

    #[test]
    fn two_single_samples() {
        let m = merge_one(summary_of(&[1.0]), summary_of(&[3.0])).unwrap();
        assert_eq!(m.count, 2);
        assert_eq!(m.mean, 2.0);
        assert_eq!(m.variance, 2.0);
    }

    #[test]
    fn empty_side_is_a_domain_error() {
        let empty = ChannelSummary {
            count: 0,
            mean: 0.0,
            variance: 0.0,
        };
        let err = merge_one(empty, summary_of(&[1.0, 2.0])).unwrap_err();
        assert!(matches!(err, Error::Domain { count: 0 }));
    }

    #[test]
    fn vector_merge_matches_scalar_merge() {
        let a = ChannelSummaries::from_parts(
            vec!["A".into(), "B".into()],
            100,
            vec![0.0, 5.0],
            vec![4.0, 1.0],
        )
        .unwrap();
        let b = ChannelSummaries::from_parts(
            vec!["A".into(), "B".into()],
            50,
            vec![2.0, 5.0],
            vec![9.0, 0.5],
        )
        .unwrap();

        let m = merge(&a, &b).unwrap();
        assert_eq!(m.count(), 150);
        for ch in ["A", "B"] {
            let want = merge_one(a.get(ch).unwrap(), b.get(ch).unwrap()).unwrap();
            assert_eq!(m.get(ch).unwrap(), want);
        }

        // (4·99 + 9·49 + 2²·100·50/150) / 149
        let expect_a = (396.0 + 441.0 + 4.0 * 5000.0 / 150.0) / 149.0;
        assert!(close(m.get("A").unwrap().variance, expect_a));
    }

    #[test]
    fn mismatched_channels_are_rejected() {
        let a = ChannelSummaries::from_parts(vec!["A".into()], 3, vec![0.0], vec![1.0]).unwrap();
        let b = ChannelSummaries::from_parts(vec!["B".into()], 3, vec![0.0], vec![1.0]).unwrap();
        assert!(matches!(merge(&a, &b), Err(Error::ChannelMismatch { .. })));
    }
}
