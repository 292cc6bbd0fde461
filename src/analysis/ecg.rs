use find_peaks::PeakFinder;
use ndarray::{s, Array1, ArrayView1};
use ndarray_stats::QuantileExt;

use crate::analysis::filter::{Bandpass, FilterSpec};
use crate::error::{ExtractionError, SignalError, SkipReason};

/// Anything that turns an ECG trace into R-peak sample indices.
pub trait BeatProcessor: Send + Sync {
    fn process(&self, signal: ArrayView1<f64>, fs: f64) -> Result<Vec<usize>, ExtractionError>;
}

/// Z-score the signal, then keep local maxima reaching half the global
/// maximum and at least 200 ms apart.
pub fn detect_beats(signal: ArrayView1<f64>, fs: f64) -> Result<Vec<usize>, SignalError> {
    let mean = signal.mean().ok_or(SignalError::EmptySignal)?;
    let std = signal.std(0.0);
    if !std.is_finite() {
        return Err(SignalError::NonFinite);
    }
    if std == 0.0 {
        return Err(SignalError::DegenerateSignal { value: mean });
    }

    let standardized: Vec<f64> = signal.iter().map(|v| (v - mean) / std).collect();
    let max = standardized
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);

    let distance = (0.2 * fs).ceil().max(1.0) as usize;
    let peaks = PeakFinder::new(&standardized)
        .with_min_height(0.5 * max)
        .with_min_distance(distance)
        .find_peaks();

    let mut peaks: Vec<usize> = peaks.iter().map(|p| p.position.start).collect();
    peaks.sort_unstable();
    peaks.dedup();
    Ok(peaks)
}

/// The simple height/distance detector behind the [`BeatProcessor`] interface.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicBeatProcessor;

impl BeatProcessor for HeuristicBeatProcessor {
    fn process(&self, signal: ArrayView1<f64>, fs: f64) -> Result<Vec<usize>, ExtractionError> {
        Ok(detect_beats(signal, fs)?)
    }
}

/// QRS detection on the smoothed absolute gradient.
///
/// The trace is band-limited, differentiated and smoothed; samples whose
/// smoothed gradient exceeds a multiple of its slower moving average form
/// QRS complexes, and the maximum of each sufficiently long complex is an
/// R-peak unless it falls inside the refractory delay of the previous one.
#[derive(Debug, Clone)]
pub struct GradientBeatProcessor {
    pub clean: FilterSpec,
    pub smooth_window_s: f64,
    pub average_window_s: f64,
    pub threshold_weight: f64,
    pub min_length_weight: f64,
    pub min_delay_s: f64,
}

impl Default for GradientBeatProcessor {
    fn default() -> Self {
        Self {
            clean: FilterSpec::new(2, 0.5, 40.0, true).unwrap_or_default(),
            smooth_window_s: 0.1,
            average_window_s: 0.75,
            threshold_weight: 1.5,
            min_length_weight: 0.4,
            min_delay_s: 0.3,
        }
    }
}

impl GradientBeatProcessor {
    fn window(&self, seconds: f64, fs: f64) -> usize {
        ((seconds * fs).round() as usize).max(1)
    }

    /// Lowest sample rate whose clamped high cut still clears the cleaning low cut.
    pub fn min_sample_rate(&self) -> f64 {
        self.clean.low_cut() / 0.45
    }

    fn cleaned(&self, signal: ArrayView1<f64>, fs: f64) -> Result<Array1<f64>, ExtractionError> {
        // keep the low-pass edge below Nyquist for slowly sampled traces
        let high = self.clean.high_cut().min(0.45 * fs);
        let spec = FilterSpec::new(
            self.clean.order(),
            self.clean.low_cut(),
            high,
            self.clean.zero_phase(),
        )?;
        Ok(Bandpass::design(fs, &spec)?.apply(signal)?)
    }
}

impl BeatProcessor for GradientBeatProcessor {
    fn process(&self, signal: ArrayView1<f64>, fs: f64) -> Result<Vec<usize>, ExtractionError> {
        if signal.is_empty() {
            return Err(SignalError::EmptySignal.into());
        }
        if !(fs.is_finite() && fs > self.min_sample_rate()) {
            return Err(ExtractionError::Unexpected(format!(
                "sample rate {fs} Hz is too low for gradient beat detection, need more than {} Hz",
                self.min_sample_rate()
            )));
        }
        let avg_window = self.window(self.average_window_s, fs);
        if avg_window > signal.len() {
            return Err(ExtractionError::Skippable(SkipReason::WindowExceedsSignal));
        }
        if signal.iter().any(|v| !v.is_finite()) {
            return Err(ExtractionError::Skippable(SkipReason::UndefinedNumeric));
        }

        let cleaned = self.cleaned(signal, fs)?;
        let abs_grad = gradient(cleaned.view()).mapv(f64::abs);
        let smooth = boxcar(abs_grad.view(), self.window(self.smooth_window_s, fs));
        let average = boxcar(smooth.view(), avg_window);

        let qrs: Vec<bool> = smooth
            .iter()
            .zip(average.iter())
            .map(|(s, a)| *s > self.threshold_weight * a)
            .collect();

        let starts: Vec<usize> = (1..qrs.len()).filter(|&i| qrs[i] && !qrs[i - 1]).collect();
        let Some(&first_start) = starts.first() else {
            return Ok(Vec::new());
        };
        let ends: Vec<usize> = (1..qrs.len())
            .filter(|&i| !qrs[i] && qrs[i - 1])
            .filter(|&i| i > first_start)
            .collect();

        let complexes: Vec<(usize, usize)> = starts.into_iter().zip(ends).collect();
        if complexes.is_empty() {
            return Ok(Vec::new());
        }
        let mean_len =
            complexes.iter().map(|(b, e)| (e - b) as f64).sum::<f64>() / complexes.len() as f64;
        let min_len = mean_len * self.min_length_weight;
        let min_delay = self.window(self.min_delay_s, fs);

        let mut peaks: Vec<usize> = Vec::new();
        let mut last: Option<usize> = None;
        for (begin, end) in complexes {
            if ((end - begin) as f64) < min_len {
                continue;
            }
            let offset = cleaned
                .slice(s![begin..end])
                .argmax()
                .map_err(|_| ExtractionError::Skippable(SkipReason::UndefinedNumeric))?;
            let peak = begin + offset;
            if last.map_or(true, |l| peak > l + min_delay) {
                peaks.push(peak);
                last = Some(peak);
            }
        }
        Ok(peaks)
    }
}

/// Central differences inside, one-sided at the ends.
pub fn gradient(data: ArrayView1<f64>) -> Array1<f64> {
    let n = data.len();
    if n < 2 {
        return Array1::zeros(n);
    }
    Array1::from_shape_fn(n, |i| match i {
        0 => data[1] - data[0],
        i if i == n - 1 => data[n - 1] - data[n - 2],
        i => (data[i + 1] - data[i - 1]) / 2.0,
    })
}

/// Centered moving average; the edges are padded with the first and last sample.
pub fn boxcar(data: ArrayView1<f64>, size: usize) -> Array1<f64> {
    let n = data.len();
    if n == 0 || size <= 1 {
        return data.to_owned();
    }
    let first = data[0];
    let last = data[n - 1];
    let padded: Vec<f64> = std::iter::repeat(first)
        .take(size)
        .chain(data.iter().copied())
        .chain(std::iter::repeat(last).take(size))
        .collect();

    let mut prefix = Vec::with_capacity(padded.len() + 1);
    prefix.push(0.0);
    for v in &padded {
        prefix.push(prefix[prefix.len() - 1] + v);
    }

    let half = size / 2;
    Array1::from_shape_fn(n, |i| {
        let start = i + size - half;
        (prefix[start + size] - prefix[start]) / size as f64
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock;

    fn spikes(n: usize, at: &[usize]) -> Array1<f64> {
        let mut signal = Array1::<f64>::zeros(n);
        for &i in at {
            signal[i] = 1.0;
            signal[i - 1] = 0.4;
            signal[i + 1] = 0.4;
        }
        signal
    }

    #[test]
    fn detects_spikes_in_order() {
        let signal = spikes(1000, &[100, 300, 520, 700]);
        let peaks = detect_beats(signal.view(), 200.0).unwrap();
        assert_eq!(peaks, vec![100, 300, 520, 700]);
    }

    #[test]
    fn refractory_distance_suppresses_close_peaks() {
        // 20 samples apart at 200 Hz is 100 ms, under the 200 ms refractory period
        let mut signal = spikes(1000, &[100, 500]);
        signal[120] = 0.9;
        let peaks = detect_beats(signal.view(), 200.0).unwrap();
        assert_eq!(peaks, vec![100, 500]);
    }

    #[test]
    fn small_bumps_are_not_beats() {
        let mut signal = spikes(1000, &[200, 600]);
        signal[400] = 0.1;
        let peaks = detect_beats(signal.view(), 200.0).unwrap();
        assert_eq!(peaks, vec![200, 600]);
    }

    #[test]
    fn flat_signal_has_no_beats_but_fails_loudly() {
        let flat = Array1::from_elem(100, 2.0);
        assert!(matches!(
            detect_beats(flat.view(), 200.0),
            Err(SignalError::DegenerateSignal { .. })
        ));
    }

    #[test]
    fn gradient_matches_central_differences() {
        let data = Array1::from_vec(vec![1.0, 2.0, 4.0, 7.0]);
        assert_eq!(gradient(data.view()), Array1::from_vec(vec![1.0, 1.5, 2.5, 3.0]));
    }

    #[test]
    fn boxcar_preserves_constant_and_length() {
        let data = Array1::from_elem(20, 3.0);
        let out = boxcar(data.view(), 5);
        assert_eq!(out.len(), 20);
        assert!(out.iter().all(|v| (v - 3.0).abs() < 1e-12));
    }

    #[test]
    fn boxcar_averages_neighbourhood() {
        let data = Array1::from_vec(vec![0.0, 0.0, 3.0, 0.0, 0.0]);
        let out = boxcar(data.view(), 3);
        assert!((out[1] - 1.0).abs() < 1e-12);
        assert!((out[2] - 1.0).abs() < 1e-12);
        assert!((out[3] - 1.0).abs() < 1e-12);
        assert!(out[0].abs() < 1e-12);
    }

    #[test]
    fn gradient_processor_finds_synthetic_beats() {
        let synthetic = mock::synthetic_ecg(300.0, 20.0, 72.0, 7);
        let peaks = GradientBeatProcessor::default()
            .process(synthetic.signal.view(), 300.0)
            .unwrap();

        assert!(
            peaks.len() + 1 >= synthetic.r_peaks.len() && peaks.len() <= synthetic.r_peaks.len(),
            "found {} of {} beats",
            peaks.len(),
            synthetic.r_peaks.len()
        );
        assert!(peaks.windows(2).all(|w| w[0] < w[1]));
        // every detection lands on a true R-peak
        for p in &peaks {
            let nearest = synthetic.r_peaks.iter().map(|r| r.abs_diff(*p)).min().unwrap();
            assert!(nearest <= 6, "peak {p} is {nearest} samples from a beat");
        }
    }

    #[test]
    fn gradient_processor_keeps_a_beat_inside_the_refractory_delay_of_the_start() {
        // the first R-peak is at sample 150; dropping 105 samples moves it to 45, inside 0.3 s
        let synthetic = mock::synthetic_ecg(300.0, 20.0, 72.0, 7);
        let trimmed = synthetic.signal.slice(s![105..]).to_owned();
        let truth: Vec<usize> = synthetic.r_peaks.iter().map(|r| r - 105).collect();
        assert_eq!(truth[0], 45);

        let peaks = GradientBeatProcessor::default().process(trimmed.view(), 300.0).unwrap();
        assert!(
            peaks[0].abs_diff(truth[0]) <= 6,
            "first beats {:?} vs {:?}",
            &peaks[..2],
            &truth[..2]
        );
        assert!(peaks.len() + 1 >= truth.len(), "found {} of {} beats", peaks.len(), truth.len());
    }

    #[test]
    fn too_low_sample_rate_is_rejected_by_name() {
        let signal = Array1::from_iter((0..40).map(|i| (i as f64).sin()));
        let processor = GradientBeatProcessor::default();
        match processor.process(signal.view(), 1.0) {
            Err(ExtractionError::Unexpected(message)) => {
                assert!(message.contains("too low"), "{message}")
            }
            other => panic!("expected a sample rate error, got {other:?}"),
        }
        assert!((processor.min_sample_rate() - 0.5 / 0.45).abs() < 1e-12);
    }

    #[test]
    fn heuristic_processor_finds_synthetic_beats() {
        let synthetic = mock::synthetic_ecg(300.0, 20.0, 72.0, 11);
        let peaks = HeuristicBeatProcessor.process(synthetic.signal.view(), 300.0).unwrap();
        assert!(peaks.len() + 1 >= synthetic.r_peaks.len());
        assert!(peaks.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn short_signal_is_skippable() {
        let signal = Array1::from_elem(100, 1.0);
        let err = GradientBeatProcessor::default().process(signal.view(), 300.0).unwrap_err();
        assert_eq!(err, ExtractionError::Skippable(SkipReason::WindowExceedsSignal));
    }

    #[test]
    fn nan_sample_is_skippable() {
        let mut signal = Array1::from_elem(1000, 1.0);
        signal[10] = f64::NAN;
        let err = GradientBeatProcessor::default().process(signal.view(), 300.0).unwrap_err();
        assert_eq!(err, ExtractionError::Skippable(SkipReason::UndefinedNumeric));
    }
}
