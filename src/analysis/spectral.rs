use std::f64::consts::PI;

use ndarray::ArrayView1;
use realfft::RealFftPlanner;

use crate::error::{ExtractionError, SignalError};

/// One-sided power spectral density.
#[derive(Debug, Clone, PartialEq)]
pub struct Psd {
    pub freqs: Vec<f64>,
    pub power: Vec<f64>,
}

/// Welch PSD: periodic Hann window, 50% overlap, per-segment mean removal,
/// density scaling. The segment length is clamped to the signal length.
pub fn welch(signal: ArrayView1<f64>, fs: f64, segment_len: usize) -> Result<Psd, ExtractionError> {
    let n = signal.len();
    if n == 0 {
        return Err(SignalError::EmptySignal.into());
    }
    if segment_len == 0 || !(fs.is_finite() && fs > 0.0) {
        return Err(ExtractionError::Unexpected(format!(
            "invalid welch parameters: segment {segment_len}, fs {fs}"
        )));
    }

    let nperseg = segment_len.min(n);
    let step = nperseg - nperseg / 2;
    let window = hann(nperseg);
    let scale = 1.0 / (fs * window.iter().map(|w| w * w).sum::<f64>());

    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(nperseg);
    let mut buffer = r2c.make_input_vec();
    let mut spectrum = r2c.make_output_vec();
    let mut power = vec![0.0; spectrum.len()];

    let samples = signal.to_vec();
    let mut segments = 0;
    for start in (0..).map(|i| i * step).take_while(|s| s + nperseg <= n) {
        let chunk = &samples[start..start + nperseg];
        let mean = chunk.iter().sum::<f64>() / nperseg as f64;
        for ((b, x), w) in buffer.iter_mut().zip(chunk).zip(&window) {
            *b = (x - mean) * w;
        }
        r2c.process(&mut buffer, &mut spectrum)
            .map_err(|e| ExtractionError::Unexpected(format!("fft: {e}")))?;
        for (p, c) in power.iter_mut().zip(&spectrum) {
            *p += c.norm_sqr() * scale;
        }
        segments += 1;
    }

    let bins = power.len();
    // fold negative frequencies in, except DC and (for even lengths) Nyquist
    let doubled_end = if nperseg % 2 == 0 { bins - 1 } else { bins };
    for (k, p) in power.iter_mut().enumerate() {
        *p /= segments as f64;
        if k > 0 && k < doubled_end {
            *p *= 2.0;
        }
    }

    let freqs = (0..bins).map(|k| k as f64 * fs / nperseg as f64).collect();
    Ok(Psd { freqs, power })
}

fn hann(len: usize) -> Vec<f64> {
    if len < 2 {
        return vec![1.0; len];
    }
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / len as f64).cos())
        .collect()
}

/// Trapezoidal integral of the PSD over bins with `low <= f <= high`.
/// Zero when fewer than two bins fall into the band.
pub fn band_power(psd: &Psd, (low, high): (f64, f64)) -> f64 {
    let band: Vec<(f64, f64)> = psd
        .freqs
        .iter()
        .zip(&psd.power)
        .filter(|(f, _)| **f >= low && **f <= high)
        .map(|(f, p)| (*f, *p))
        .collect();
    band.windows(2)
        .map(|w| 0.5 * (w[0].1 + w[1].1) * (w[1].0 - w[0].0))
        .sum()
}
