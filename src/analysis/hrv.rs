//! Beat-interval statistics: direct RR features and the HRV time-domain set.

use ndarray::Array1;
use ndarray_stats::{interpolate::Linear, Quantile1dExt, QuantileExt};
use noisy_float::types::{n64, N64};

use crate::analysis::features::Feature;
use crate::error::{ExtractionError, SkipReason};

const HTI_BIN_MS: f64 = 1000.0 / 128.0;
const MAD_SCALE: f64 = 1.4826;

/// Consecutive R-peak distances in milliseconds.
pub fn rr_intervals(peaks: &[usize], fs: f64) -> Result<Vec<f64>, ExtractionError> {
    if peaks.windows(2).any(|w| w[1] <= w[0]) {
        return Err(ExtractionError::Unexpected("R-peaks are not strictly increasing".into()));
    }
    Ok(peaks
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64 * 1000.0 / fs)
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RrFeatures {
    pub mean: f64,
    pub std: f64,
    /// Fraction of successive interval differences above the threshold.
    pub irregularity: f64,
}

impl RrFeatures {
    pub fn into_features(self) -> Vec<Feature> {
        vec![
            Feature::new("RR_mean", self.mean),
            Feature::new("RR_std", self.std),
            Feature::new("Irregularity_index", self.irregularity),
        ]
    }
}

pub fn rr_features(
    peaks: &[usize],
    fs: f64,
    threshold_ms: f64,
) -> Result<RrFeatures, ExtractionError> {
    let rri = rr_intervals(peaks, fs)?;
    let diffs = successive_differences(&rri);
    if rri.is_empty() || diffs.is_empty() {
        return Err(ExtractionError::Skippable(SkipReason::ZeroDenominator));
    }

    let irregular = diffs.iter().filter(|d| d.abs() > threshold_ms).count();
    Ok(RrFeatures {
        mean: mean(&rri)?,
        std: std(&rri, 0)?,
        irregularity: irregular as f64 / diffs.len() as f64,
    })
}

/// Standard time-domain HRV metrics from R-peak indices.
///
/// The SDANN/SDNNI family averages over 1, 2 and 5 minute windows and is
/// missing when fewer than three windows fit the recording.
pub fn hrv_time(peaks: &[usize], fs: f64) -> Result<Vec<Feature>, ExtractionError> {
    let rri = rr_intervals(peaks, fs)?;
    let diffs = successive_differences(&rri);

    let mean_nn = mean(&rri)?;
    let sdnn = std(&rri, 1)?;
    let rmssd = mean(&diffs.iter().map(|d| d * d).collect::<Vec<_>>())?.sqrt();
    let sdsd = std(&diffs, 1)?;

    let median_nn = quantile(&rri, 0.5)?;
    let deviations: Vec<f64> = rri.iter().map(|v| (v - median_nn).abs()).collect();
    let mad_nn = MAD_SCALE * quantile(&deviations, 0.5)?;
    let q25 = quantile(&rri, 0.25)?;
    let q75 = quantile(&rri, 0.75)?;

    let count_above = |ms: f64| diffs.iter().filter(|d| d.abs() > ms).count() as f64;
    let pnn50 = ratio(count_above(50.0), rri.len() as f64)? * 100.0;
    let pnn20 = ratio(count_above(20.0), rri.len() as f64)? * 100.0;

    let rr = Array1::from_vec(rri.clone());
    let min_nn = *rr.min().map_err(|_| ExtractionError::Skippable(SkipReason::UndefinedNumeric))?;
    let max_nn = *rr.max().map_err(|_| ExtractionError::Skippable(SkipReason::UndefinedNumeric))?;

    let mut features = vec![Feature::new("HRV_MeanNN", mean_nn), Feature::new("HRV_SDNN", sdnn)];
    for (minutes, sdann, sdnni) in [
        (1, "HRV_SDANN1", "HRV_SDNNI1"),
        (2, "HRV_SDANN2", "HRV_SDNNI2"),
        (5, "HRV_SDANN5", "HRV_SDNNI5"),
    ] {
        let windows = window_stats(&rri, minutes as f64 * 60_000.0);
        features.push(Feature::maybe(sdann, windows.as_ref().map(|w| w.sdann)));
        features.push(Feature::maybe(sdnni, windows.as_ref().and_then(|w| w.sdnni)));
    }
    features.extend([
        Feature::new("HRV_RMSSD", rmssd),
        Feature::new("HRV_SDSD", sdsd),
        Feature::new("HRV_CVNN", ratio(sdnn, mean_nn)?),
        Feature::new("HRV_CVSD", ratio(rmssd, mean_nn)?),
        Feature::new("HRV_MedianNN", median_nn),
        Feature::new("HRV_MadNN", mad_nn),
        Feature::new("HRV_MCVNN", ratio(mad_nn, median_nn)?),
        Feature::new("HRV_IQRNN", q75 - q25),
        Feature::new("HRV_SDRMSSD", ratio(sdnn, rmssd)?),
        Feature::new("HRV_Prc20NN", quantile(&rri, 0.2)?),
        Feature::new("HRV_Prc80NN", quantile(&rri, 0.8)?),
        Feature::new("HRV_pNN50", pnn50),
        Feature::new("HRV_pNN20", pnn20),
        Feature::new("HRV_MinNN", min_nn),
        Feature::new("HRV_MaxNN", max_nn),
        Feature::new("HRV_HTI", triangular_index(&rri, min_nn, max_nn)?),
    ]);
    Ok(features)
}

struct WindowStats {
    sdann: f64,
    sdnni: Option<f64>,
}

fn window_stats(rri: &[f64], window_ms: f64) -> Option<WindowStats> {
    let total: f64 = rri.iter().sum();
    let n_windows = (total / window_ms).round() as usize;
    if n_windows < 3 {
        return None;
    }

    let mut elapsed = Vec::with_capacity(rri.len());
    let mut acc = 0.0;
    for v in rri {
        acc += v;
        elapsed.push(acc);
    }

    let mut means = Vec::new();
    let mut sds = Vec::new();
    for w in 0..n_windows {
        let start = w as f64 * window_ms;
        let end = start + window_ms;
        let members: Vec<f64> = rri
            .iter()
            .zip(&elapsed)
            .filter(|(_, &t)| t >= start && t < end)
            .map(|(v, _)| *v)
            .collect();
        if let Ok(m) = mean(&members) {
            means.push(m);
        }
        if let Ok(sd) = std(&members, 1) {
            sds.push(sd);
        }
    }

    Some(WindowStats {
        sdann: std(&means, 1).ok()?,
        sdnni: mean(&sds).ok(),
    })
}

/// Number of intervals over the height of the tallest 1/128 s histogram bin.
fn triangular_index(rri: &[f64], min: f64, max: f64) -> Result<f64, ExtractionError> {
    let bins = to_index(((max - min) / HTI_BIN_MS).ceil())?.max(1);
    let mut counts = vec![0usize; bins];
    for v in rri {
        let bin = to_index(((v - min) / HTI_BIN_MS).floor())?.min(bins - 1);
        counts[bin] += 1;
    }
    let tallest = counts.iter().copied().max().unwrap_or(0);
    ratio(rri.len() as f64, tallest as f64)
}

/// Float to index conversion that refuses NaN.
fn to_index(v: f64) -> Result<usize, ExtractionError> {
    if v.is_nan() {
        return Err(ExtractionError::Skippable(SkipReason::UndefinedNumeric));
    }
    Ok(v.max(0.0) as usize)
}

pub(crate) fn successive_differences(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

pub(crate) fn ratio(num: f64, den: f64) -> Result<f64, ExtractionError> {
    if den == 0.0 {
        return Err(ExtractionError::Skippable(SkipReason::ZeroDenominator));
    }
    Ok(num / den)
}

pub(crate) fn mean(values: &[f64]) -> Result<f64, ExtractionError> {
    ratio(values.iter().sum(), values.len() as f64)
}

/// Standard deviation with `ddof` delta degrees of freedom.
pub(crate) fn std(values: &[f64], ddof: usize) -> Result<f64, ExtractionError> {
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    let dof = values.len().saturating_sub(ddof);
    Ok(ratio(ss, dof as f64)?.sqrt())
}

/// Linearly interpolated quantile, `q` in [0, 1].
fn quantile(values: &[f64], q: f64) -> Result<f64, ExtractionError> {
    let mut data: Array1<N64> = values
        .iter()
        .map(|&v| N64::try_new(v))
        .collect::<Option<_>>()
        .ok_or(ExtractionError::Skippable(SkipReason::UndefinedNumeric))?;
    let value = data
        .quantile_mut(n64(q), &Linear)
        .map_err(|e| ExtractionError::Unexpected(format!("quantile: {e:?}")))?;
    Ok(value.raw())
}
