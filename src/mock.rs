use std::f64::consts::PI;

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::record::{Header, Recording};

/// A generated trace together with the sample index of every R-peak in it.
pub struct SyntheticEcg {
    pub signal: Array1<f64>,
    pub r_peaks: Vec<usize>,
}

// (amplitude, width in s, offset from the R-peak in s)
const WAVES: [(f64, f64, f64); 5] = [
    (0.12, 0.025, -0.2),   // P
    (-0.12, 0.01, -0.035), // Q
    (1.0, 0.012, 0.0),     // R
    (-0.25, 0.012, 0.035), // S
    (0.25, 0.05, 0.25),    // T
];

/// Sum-of-Gaussians ECG with jittered RR intervals, baseline wander and noise.
/// The same seed always gives the same trace.
pub fn synthetic_ecg(fs: f64, duration_s: f64, heart_rate: f64, seed: u64) -> SyntheticEcg {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = (duration_s * fs) as usize;
    let mean_rr = 60.0 / heart_rate;

    let mut beat_times = Vec::new();
    let mut t = 0.5;
    while t < duration_s - 0.5 {
        beat_times.push(t);
        t += mean_rr * (1.0 + rng.gen_range(-0.08..0.08));
    }

    let signal = Array1::from_shape_fn(n, |i| {
        let t = i as f64 / fs;
        let waves: f64 = beat_times
            .iter()
            .filter(|&&beat| (t - beat).abs() < 0.6)
            .flat_map(|&beat| {
                WAVES.iter().map(move |&(amp, width, offset)| {
                    let x = (t - beat - offset) / width;
                    amp * (-0.5 * x * x).exp()
                })
            })
            .sum();
        waves + 0.08 * (2.0 * PI * 0.25 * t).sin()
    })
    .mapv(|v| v + rng.gen_range(-0.015..0.015));

    let r_peaks = beat_times.iter().map(|t| (t * fs).round() as usize).collect();
    SyntheticEcg { signal, r_peaks }
}

pub fn synthetic_recording(
    patient_id: &str,
    label: &str,
    fs: u32,
    duration_s: f64,
    seed: u64,
) -> Recording {
    let heart_rate = 60.0 + (seed % 40) as f64;
    let synthetic = synthetic_ecg(fs as f64, duration_s, heart_rate, seed);
    let header = Header::new(patient_id, fs, synthetic.signal.len());
    Recording::new(patient_id, label, header, synthetic.signal)
}

/// A small batch of recordings with rotating labels, all sampled at 300 Hz.
pub fn mock_recordings(count: usize, duration_s: f64) -> Vec<Recording> {
    const LABELS: [&str; 4] = ["N", "A", "O", "~"];
    (0..count)
        .map(|i| {
            let id = format!("S{:05}", i + 1);
            synthetic_recording(&id, LABELS[i % LABELS.len()], 300, duration_s, i as u64 + 1)
        })
        .collect()
}
