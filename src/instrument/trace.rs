//! Trace sample sets and peak search.
//!
//! A [`Trace`] is one sweep: frequencies in Hz and amplitudes in dBm, always
//! the same length and index-aligned. The constructors are the only way to
//! build one, so the invariant holds for every value in circulation.

use crate::error::{AppResult, SpecAnError};

/// Frequency/amplitude pair at the maximum of a sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Frequency of the maximum, Hz
    pub frequency_hz: f64,
    /// Amplitude of the maximum, dBm
    pub amplitude_dbm: f64,
}

impl From<Peak> for (f64, f64) {
    fn from(peak: Peak) -> Self {
        (peak.frequency_hz, peak.amplitude_dbm)
    }
}

/// One sweep worth of frequency/amplitude samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    frequencies_hz: Vec<f64>,
    amplitudes_dbm: Vec<f64>,
}

impl Trace {
    /// Build a trace from explicit, index-aligned sequences.
    ///
    /// # Errors
    /// `TraceLengthMismatch` when the sequences differ in length.
    pub fn new(frequencies_hz: Vec<f64>, amplitudes_dbm: Vec<f64>) -> AppResult<Self> {
        if frequencies_hz.len() != amplitudes_dbm.len() {
            return Err(SpecAnError::TraceLengthMismatch {
                frequencies: frequencies_hz.len(),
                amplitudes: amplitudes_dbm.len(),
            });
        }
        Ok(Self {
            frequencies_hz,
            amplitudes_dbm,
        })
    }

    /// Build a trace whose frequency axis spans `start_hz..=stop_hz` in
    /// evenly spaced bins, one per amplitude.
    ///
    /// # Errors
    /// `EmptyTrace` when `amplitudes_dbm` is empty.
    pub fn from_sweep(start_hz: f64, stop_hz: f64, amplitudes_dbm: Vec<f64>) -> AppResult<Self> {
        if amplitudes_dbm.is_empty() {
            return Err(SpecAnError::EmptyTrace);
        }
        let frequencies_hz = sweep_frequencies(start_hz, stop_hz, amplitudes_dbm.len());
        Self::new(frequencies_hz, amplitudes_dbm)
    }

    /// Frequencies in Hz.
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies_hz
    }

    /// Amplitudes in dBm.
    pub fn amplitudes(&self) -> &[f64] {
        &self.amplitudes_dbm
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.amplitudes_dbm.len()
    }

    /// True when the trace holds no samples.
    pub fn is_empty(&self) -> bool {
        self.amplitudes_dbm.is_empty()
    }

    /// Iterate over `(frequency_hz, amplitude_dbm)` pairs.
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.frequencies_hz
            .iter()
            .copied()
            .zip(self.amplitudes_dbm.iter().copied())
    }

    /// Maximum of the sweep.
    ///
    /// Equal maxima resolve to the lowest index, which is the lowest
    /// frequency for a sweep. NaN samples are ignored. `None` when there is
    /// no finite sample.
    pub fn peak(&self) -> Option<Peak> {
        let mut best: Option<Peak> = None;
        for (frequency_hz, amplitude_dbm) in self.points() {
            if amplitude_dbm.is_nan() {
                continue;
            }
            match best {
                Some(peak) if amplitude_dbm <= peak.amplitude_dbm => {}
                _ => {
                    best = Some(Peak {
                        frequency_hz,
                        amplitude_dbm,
                    })
                }
            }
        }
        best
    }

    /// Amplitude of the bin nearest to `frequency_hz`.
    pub fn amplitude_near(&self, frequency_hz: f64) -> Option<f64> {
        self.points()
            .min_by(|(a, _), (b, _)| {
                (a - frequency_hz)
                    .abs()
                    .total_cmp(&(b - frequency_hz).abs())
            })
            .map(|(_, amplitude)| amplitude)
    }

    /// Split into `(frequencies_hz, amplitudes_dbm)`.
    pub fn into_parts(self) -> (Vec<f64>, Vec<f64>) {
        (self.frequencies_hz, self.amplitudes_dbm)
    }
}

/// `points` evenly spaced frequencies from `start_hz` to `stop_hz` inclusive.
///
/// The first and last bins are exactly `start_hz` and `stop_hz`.
pub fn sweep_frequencies(start_hz: f64, stop_hz: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![start_hz],
        n => {
            let last = n - 1;
            let span = stop_hz - start_hz;
            (0..n)
                .map(|i| match i {
                    0 => start_hz,
                    i if i == last => stop_hz,
                    i => start_hz + span * (i as f64 / last as f64),
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_of_three_point_trace() {
        let trace = Trace::new(vec![1e9, 2e9, 3e9], vec![-50.0, -10.0, -30.0]).unwrap();
        let peak = trace.peak().unwrap();
        assert_eq!(peak.frequency_hz, 2e9);
        assert_eq!(peak.amplitude_dbm, -10.0);
    }

    #[test]
    fn test_peak_ties_resolve_to_first_occurrence() {
        let trace = Trace::new(
            vec![1e6, 2e6, 3e6, 4e6],
            vec![-40.0, -12.5, -60.0, -12.5],
        )
        .unwrap();
        assert_eq!(trace.peak().unwrap().frequency_hz, 2e6);
    }

    #[test]
    fn test_peak_ignores_nan() {
        let trace = Trace::new(vec![1.0, 2.0, 3.0], vec![f64::NAN, -70.0, -80.0]).unwrap();
        let peak = trace.peak().unwrap();
        assert_eq!(peak.frequency_hz, 2.0);

        let all_nan = Trace::new(vec![1.0], vec![f64::NAN]).unwrap();
        assert!(all_nan.peak().is_none());
    }

    #[test]
    fn test_peak_matches_maximum_everywhere() {
        let amplitudes: Vec<f64> = (0..601)
            .map(|i| -90.0 + ((i * 37) % 101) as f64 * 0.5)
            .collect();
        let trace = Trace::from_sweep(8.3995e9, 8.4005e9, amplitudes.clone()).unwrap();
        let peak = trace.peak().unwrap();

        let max = amplitudes.iter().copied().fold(f64::MIN, f64::max);
        let first = amplitudes.iter().position(|&a| a == max).unwrap();
        assert_eq!(peak.amplitude_dbm, max);
        assert_eq!(peak.frequency_hz, trace.frequencies()[first]);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let err = Trace::new(vec![1.0, 2.0], vec![-1.0]).unwrap_err();
        assert!(matches!(
            err,
            SpecAnError::TraceLengthMismatch {
                frequencies: 2,
                amplitudes: 1
            }
        ));
    }

    #[test]
    fn test_from_sweep_spans_start_to_stop() {
        let trace = Trace::from_sweep(1e9, 3e9, vec![-50.0, -10.0, -30.0]).unwrap();
        assert_eq!(trace.frequencies(), &[1e9, 2e9, 3e9]);
        assert_eq!(trace.len(), 3);

        let trace = Trace::from_sweep(8.3995e9, 8.4005e9, vec![-90.0; 601]).unwrap();
        assert_eq!(trace.frequencies().len(), trace.amplitudes().len());
        assert_eq!(trace.frequencies()[0], 8.3995e9);
        assert_eq!(trace.frequencies()[600], 8.4005e9);
        assert!((trace.frequencies()[300] - 8.4e9).abs() < 1e-3);
    }

    #[test]
    fn test_sweep_endpoints_are_exact() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(601);
        for _ in 0..10_000 {
            let center: f64 = rng.gen_range(1e3..26.5e9);
            let span: f64 = rng.gen_range(0.0..1e9);
            let (start, stop) = (center - span / 2.0, center + span / 2.0);

            let freqs = sweep_frequencies(start, stop, 601);
            assert_eq!(freqs[0], start);
            assert_eq!(freqs[600], stop);
            assert!(freqs.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn test_from_sweep_single_point_and_empty() {
        let trace = Trace::from_sweep(5e6, 5e6, vec![-20.0]).unwrap();
        assert_eq!(trace.frequencies(), &[5e6]);
        assert!(matches!(
            Trace::from_sweep(0.0, 1.0, Vec::new()),
            Err(SpecAnError::EmptyTrace)
        ));
    }

    #[test]
    fn test_amplitude_near_picks_closest_bin() {
        let trace = Trace::new(vec![100.0, 200.0, 300.0], vec![-1.0, -2.0, -3.0]).unwrap();
        assert_eq!(trace.amplitude_near(240.0), Some(-2.0));
        assert_eq!(trace.amplitude_near(1e9), Some(-3.0));
    }

    #[test]
    fn test_peak_into_tuple() {
        let (f, a): (f64, f64) = Peak {
            frequency_hz: 2e9,
            amplitude_dbm: -10.0,
        }
        .into();
        assert_eq!((f, a), (2e9, -10.0));
    }
}
