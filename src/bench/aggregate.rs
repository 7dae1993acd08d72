//! Reduction of per-trial samples into one summary

use crate::bench::trial::MetricSample;

/// Mean of every timing and throughput field over k trials
///
/// `total_s` and the throughput fields are rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub load_s: f64,
    pub sample_s: f64,
    pub prompt_eval_s: f64,
    pub eval_s: f64,
    pub total_s: f64,
    pub sample_tps: Option<f64>,
    pub prompt_eval_tps: Option<f64>,
    pub eval_tps: Option<f64>,
    /// Number of samples averaged
    pub trials: usize,
}

impl Summary {
    /// Reduce `samples`; `None` when there are none
    pub fn from_samples(samples: &[MetricSample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        Some(Self {
            load_s: mean(samples.iter().map(|s| s.load_s))?,
            sample_s: mean(samples.iter().map(|s| s.sample_s))?,
            prompt_eval_s: mean(samples.iter().map(|s| s.prompt_eval_s))?,
            eval_s: mean(samples.iter().map(|s| s.eval_s))?,
            total_s: round2(mean(samples.iter().map(|s| s.total_s))?),
            sample_tps: mean(samples.iter().filter_map(|s| s.sample_tps)).map(round2),
            prompt_eval_tps: mean(samples.iter().filter_map(|s| s.prompt_eval_tps)).map(round2),
            eval_tps: mean(samples.iter().filter_map(|s| s.eval_tps)).map(round2),
            trials: samples.len(),
        })
    }
}

/// Arithmetic mean; undefined values must already be filtered out
fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample(total_s: f64, eval_tps: Option<f64>) -> MetricSample {
        MetricSample {
            load_s: 1.5,
            sample_s: 0.02,
            prompt_eval_s: 0.4,
            eval_s: 2.0,
            total_s,
            sample_tps: Some(5000.0),
            prompt_eval_tps: Some(1250.0),
            eval_tps,
        }
    }

    #[test]
    fn test_empty_has_no_summary() {
        assert!(Summary::from_samples(&[]).is_none());
    }

    #[test]
    fn test_single_sample_passes_through() {
        let s = Summary::from_samples(&[sample(2.5, Some(49.5))]).unwrap();
        assert_eq!(s.load_s, 1.5);
        assert_eq!(s.sample_s, 0.02);
        assert_eq!(s.total_s, 2.5);
        assert_eq!(s.eval_tps, Some(49.5));
        assert_eq!(s.trials, 1);
    }

    #[test]
    fn test_mean_and_rounding() {
        let s = Summary::from_samples(&[sample(2.0, Some(40.0)), sample(3.0, Some(45.125))]).unwrap();
        assert_eq!(s.total_s, 2.5);
        assert_eq!(s.eval_tps, Some(42.56));
        assert_eq!(s.trials, 2);
    }

    #[test]
    fn test_undefined_throughput_excluded() {
        let s = Summary::from_samples(&[sample(2.0, None), sample(2.0, Some(50.0))]).unwrap();
        assert_eq!(s.eval_tps, Some(50.0));

        let s = Summary::from_samples(&[sample(2.0, None), sample(2.0, None)]).unwrap();
        assert_eq!(s.eval_tps, None);
    }

    proptest! {
        #[test]
        fn test_identical_samples_are_idempotent(
            total in 0.0f64..1.0e4,
            tps in 0.0f64..1.0e5,
            load in 0.0f64..1.0e3,
            k in 1usize..8,
        ) {
            let one = MetricSample {
                load_s: load,
                total_s: total,
                eval_tps: Some(tps),
                ..Default::default()
            };
            let s = Summary::from_samples(&vec![one; k]).unwrap();
            let tol = 1e-9 * (1.0 + load.abs());
            prop_assert!((s.load_s - load).abs() <= tol);
            prop_assert!((s.total_s - round2(total)).abs() <= 0.011);
            prop_assert!((s.eval_tps.unwrap() - round2(tps)).abs() <= 0.011);
            prop_assert_eq!(s.trials, k);
        }
    }
}
