use std::f64::consts::PI;

use biquad::{Biquad, Coefficients, DirectForm2Transposed};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::analysis::signal::Signal;
use crate::error::SignalError;

/// Butterworth bandpass parameters. Only constructible through [`FilterSpec::new`],
/// so a value of this type always satisfies `0 < low_cut < high_cut`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FilterSpecFields", into = "FilterSpecFields")]
pub struct FilterSpec {
    order: usize,
    low_cut: f64,
    high_cut: f64,
    zero_phase: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct FilterSpecFields {
    order: usize,
    low_cut: f64,
    high_cut: f64,
    zero_phase: bool,
}

impl FilterSpec {
    pub fn new(
        order: usize,
        low_cut: f64,
        high_cut: f64,
        zero_phase: bool,
    ) -> Result<Self, SignalError> {
        if order == 0 {
            return Err(SignalError::Configuration("filter order must be positive".into()));
        }
        if !(low_cut.is_finite() && high_cut.is_finite()) || low_cut <= 0.0 {
            return Err(SignalError::Configuration(format!(
                "cutoffs must be positive and finite, got {low_cut}..{high_cut}"
            )));
        }
        if low_cut >= high_cut {
            return Err(SignalError::Configuration(format!(
                "low cutoff {low_cut} must be below high cutoff {high_cut}"
            )));
        }
        Ok(Self { order, low_cut, high_cut, zero_phase })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn low_cut(&self) -> f64 {
        self.low_cut
    }

    pub fn high_cut(&self) -> f64 {
        self.high_cut
    }

    pub fn zero_phase(&self) -> bool {
        self.zero_phase
    }

    /// Same cutoffs with a different phase mode.
    pub fn with_zero_phase(self, zero_phase: bool) -> Self {
        Self { zero_phase, ..self }
    }
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self { order: 6, low_cut: 0.5, high_cut: 40.0, zero_phase: true }
    }
}

impl TryFrom<FilterSpecFields> for FilterSpec {
    type Error = SignalError;

    fn try_from(f: FilterSpecFields) -> Result<Self, Self::Error> {
        FilterSpec::new(f.order, f.low_cut, f.high_cut, f.zero_phase)
    }
}

impl From<FilterSpec> for FilterSpecFields {
    fn from(s: FilterSpec) -> Self {
        FilterSpecFields {
            order: s.order,
            low_cut: s.low_cut,
            high_cut: s.high_cut,
            zero_phase: s.zero_phase,
        }
    }
}

/// A designed bandpass filter, ready to run over any number of channels.
#[derive(Clone)]
pub struct Bandpass {
    sections: Vec<Coefficients<f64>>,
    zero_phase: bool,
}

impl Bandpass {
    pub fn design(fs: f64, spec: &FilterSpec) -> Result<Self, SignalError> {
        if !(fs.is_finite() && fs > 0.0) {
            return Err(SignalError::Configuration(format!(
                "sample rate must be positive, got {fs}"
            )));
        }
        if fs <= 2.0 * spec.high_cut {
            return Err(SignalError::Configuration(format!(
                "sample rate {fs} Hz is too low for a {} Hz high cutoff",
                spec.high_cut
            )));
        }

        let nyquist = 0.5 * fs;
        let low = spec.low_cut / nyquist;
        let high = spec.high_cut / nyquist;

        Ok(Self {
            sections: butter_bandpass_sos(spec.order, low, high)?,
            zero_phase: spec.zero_phase,
        })
    }

    pub fn sections(&self) -> &[Coefficients<f64>] {
        &self.sections
    }

    /// Edge padding used by the forward-backward pass. Zero-phase filtering
    /// needs strictly more samples than this.
    pub fn pad_len(&self) -> usize {
        3 * (2 * self.sections.len() + 1)
    }

    pub fn apply(&self, data: ArrayView1<f64>) -> Result<Array1<f64>, SignalError> {
        if data.is_empty() {
            return Err(SignalError::EmptySignal);
        }
        let samples = data.to_vec();
        let filtered = if self.zero_phase {
            self.forward_backward(&samples)?
        } else {
            self.forward(samples)
        };
        Ok(Array1::from_vec(filtered))
    }

    pub fn apply_channels(&self, data: &Array2<f64>) -> Result<Array2<f64>, SignalError> {
        let mut out = Array2::<f64>::zeros(data.raw_dim());
        for (column, mut target) in data.axis_iter(Axis(1)).zip(out.axis_iter_mut(Axis(1))) {
            target.assign(&self.apply(column)?);
        }
        Ok(out)
    }

    fn forward(&self, mut samples: Vec<f64>) -> Vec<f64> {
        for coeffs in &self.sections {
            let mut filter = DirectForm2Transposed::<f64>::new(*coeffs);
            for sample in samples.iter_mut() {
                *sample = filter.run(*sample);
            }
        }
        samples
    }

    fn forward_backward(&self, samples: &[f64]) -> Result<Vec<f64>, SignalError> {
        let n = samples.len();
        let pad = self.pad_len();
        if n <= pad {
            return Err(SignalError::SignalTooShort { len: n, min_len: pad });
        }

        // odd extension at both ends
        let first = samples[0];
        let last = samples[n - 1];
        let mut ext = Vec::with_capacity(n + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| 2.0 * first - samples[i]));
        ext.extend_from_slice(samples);
        ext.extend((1..=pad).map(|i| 2.0 * last - samples[n - 1 - i]));

        let zi = steady_state(&self.sections);

        let x0 = ext[0];
        for (coeffs, state) in self.sections.iter().zip(&zi) {
            run_section(coeffs, [state[0] * x0, state[1] * x0], &mut ext);
        }

        ext.reverse();
        let y0 = ext[0];
        for (coeffs, state) in self.sections.iter().zip(&zi) {
            run_section(coeffs, [state[0] * y0, state[1] * y0], &mut ext);
        }
        ext.reverse();

        Ok(ext[pad..pad + n].to_vec())
    }
}

/// Apply a bandpass to a mono or multi-channel signal. Output has the input's shape.
pub fn bandpass(signal: &Signal, fs: f64, spec: &FilterSpec) -> Result<Signal, SignalError> {
    let filter = Bandpass::design(fs, spec)?;
    match signal {
        Signal::Mono(a) => Ok(Signal::Mono(filter.apply(a.view())?)),
        Signal::Multi(a) => Ok(Signal::Multi(filter.apply_channels(a)?)),
        Signal::Segmented(_) => Err(SignalError::StageOrder { stage: "bandpass" }),
    }
}

/// Butterworth bandpass in second-order sections.
///
/// `low` and `high` are normalized to Nyquist (0..1). Returns `order` sections,
/// each with zeros at z = 1 and z = -1. The overall gain sits in the first
/// section and is chosen for unit magnitude at the geometric band center.
pub fn butter_bandpass_sos(
    order: usize,
    low: f64,
    high: f64,
) -> Result<Vec<Coefficients<f64>>, SignalError> {
    if order == 0 {
        return Err(SignalError::Configuration("filter order must be positive".into()));
    }
    if !(0.0 < low && low < high && high < 1.0) {
        return Err(SignalError::Configuration(format!(
            "normalized cutoffs must satisfy 0 < low < high < 1, got {low}..{high}"
        )));
    }

    // pre-warped analog band edges for the bilinear transform with fs = 2
    let w1 = 4.0 * (PI * low / 2.0).tan();
    let w2 = 4.0 * (PI * high / 2.0).tan();
    let bw = w2 - w1;
    let w0 = (w1 * w2).sqrt();

    let mut complex_poles = Vec::with_capacity(order);
    let mut real_poles = Vec::new();

    for k in 0..order {
        let theta = PI * (2 * k + 1 + order) as f64 / (2 * order) as f64;
        let proto = Complex64::from_polar(1.0, theta);

        let half = proto * (bw / 2.0);
        let disc = (half * half - w0 * w0).sqrt();

        for s in [half + disc, half - disc] {
            let z = (4.0 + s) / (4.0 - s);
            if z.im > 1e-12 {
                complex_poles.push(z);
            } else if z.im.abs() <= 1e-12 {
                real_poles.push(z.re);
            }
        }
    }

    real_poles.sort_by(|a, b| a.total_cmp(b));
    if complex_poles.len() + real_poles.len() / 2 != order || real_poles.len() % 2 != 0 {
        return Err(SignalError::Configuration(format!(
            "could not pair poles into {order} sections"
        )));
    }

    let mut sections: Vec<Coefficients<f64>> = complex_poles
        .iter()
        .map(|p| section(-2.0 * p.re, p.norm_sqr()))
        .chain(real_poles.chunks(2).map(|pair| section(-(pair[0] + pair[1]), pair[0] * pair[1])))
        .collect();

    let center = 2.0 * (w0 / 4.0).atan();
    let gain = response(&sections, center).norm();
    if !(gain.is_finite() && gain > 0.0) {
        return Err(SignalError::Configuration("degenerate filter design".into()));
    }
    let first = &mut sections[0];
    first.b0 /= gain;
    first.b1 /= gain;
    first.b2 /= gain;

    Ok(sections)
}

fn section(a1: f64, a2: f64) -> Coefficients<f64> {
    Coefficients { a1, a2, b0: 1.0, b1: 0.0, b2: -1.0 }
}

/// Complex frequency response of a section cascade at `omega` rad/sample.
pub fn response(sections: &[Coefficients<f64>], omega: f64) -> Complex64 {
    let z1 = Complex64::from_polar(1.0, -omega);
    let z2 = z1 * z1;
    sections.iter().fold(Complex64::new(1.0, 0.0), |acc, c| {
        let num = c.b0 + z1 * c.b1 + z2 * c.b2;
        let den = 1.0 + z1 * c.a1 + z2 * c.a2;
        acc * num / den
    })
}

/// Per-section initial state for a unit step, cascaded.
fn steady_state(sections: &[Coefficients<f64>]) -> Vec<[f64; 2]> {
    let mut scale = 1.0;
    sections
        .iter()
        .map(|c| {
            let y = (c.b0 + c.b1 + c.b2) / (1.0 + c.a1 + c.a2);
            let z2 = c.b2 - c.a2 * y;
            let z1 = c.b1 - c.a1 * y + z2;
            let state = [scale * z1, scale * z2];
            scale *= y;
            state
        })
        .collect()
}

// Transposed direct form II with an explicit initial state.
fn run_section(c: &Coefficients<f64>, state: [f64; 2], data: &mut [f64]) {
    let [mut s1, mut s2] = state;
    for x in data.iter_mut() {
        let input = *x;
        let out = c.b0 * input + s1;
        s1 = c.b1 * input - c.a1 * out + s2;
        s2 = c.b2 * input - c.a2 * out;
        *x = out;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array};

    fn sine(freq: f64, fs: f64, n: usize) -> Array1<f64> {
        Array::from_iter((0..n).map(|i| (2.0 * PI * freq * i as f64 / fs).sin()))
    }

    #[test]
    fn rejects_sample_rate_below_nyquist() {
        let spec = FilterSpec::default();
        let signal = Signal::Mono(sine(5.0, 50.0, 500));
        assert!(matches!(bandpass(&signal, 50.0, &spec), Err(SignalError::Configuration(_))));

        let signal = Signal::Mono(sine(5.0, 200.0, 500));
        assert!(bandpass(&signal, 200.0, &spec).is_ok());
    }

    #[test]
    fn spec_rejects_inverted_cutoffs() {
        assert!(FilterSpec::new(4, 40.0, 0.5, true).is_err());
        assert!(FilterSpec::new(0, 0.5, 40.0, true).is_err());
        assert!(FilterSpec::new(4, 0.0, 40.0, true).is_err());
    }

    #[test]
    fn design_has_unit_gain_in_passband_and_none_at_dc() {
        let filter = Bandpass::design(300.0, &FilterSpec::default()).unwrap();
        assert_eq!(filter.sections().len(), 6);

        let at_10hz = response(filter.sections(), 2.0 * PI * 10.0 / 300.0).norm();
        assert!((at_10hz - 1.0).abs() < 0.01, "passband gain {at_10hz}");

        let at_dc = response(filter.sections(), 0.0).norm();
        assert!(at_dc < 1e-9);

        let at_120hz = response(filter.sections(), 2.0 * PI * 120.0 / 300.0).norm();
        assert!(at_120hz < 1e-3, "stopband gain {at_120hz}");
    }

    #[test]
    fn odd_order_design_is_stable() {
        let spec = FilterSpec::new(3, 0.5, 40.0, true).unwrap();
        let filter = Bandpass::design(300.0, &spec).unwrap();
        assert_eq!(filter.sections().len(), 3);
        for c in filter.sections() {
            // roots of z^2 + a1 z + a2 inside the unit circle
            assert!(c.a2.abs() < 1.0);
            assert!(c.a1.abs() < 1.0 + c.a2);
        }
    }

    #[test]
    fn zero_phase_keeps_passband_and_removes_stopband() {
        let fs = 200.0;
        let n = 4000;
        let input = &sine(10.0, fs, n) + &sine(90.0, fs, n);
        let out = bandpass(&Signal::Mono(input), fs, &FilterSpec::default()).unwrap();
        let out = out.as_mono().unwrap().to_owned();
        assert_eq!(out.len(), n);

        let expected = sine(10.0, fs, n);
        let err = (&out.slice(s![1500..2500]) - &expected.slice(s![1500..2500]))
            .mapv(f64::abs)
            .fold(0.0_f64, |a, &b| a.max(b));
        assert!(err < 0.05, "max deviation {err}");
    }

    #[test]
    fn zero_phase_on_constant_signal_is_zero() {
        let out = Bandpass::design(300.0, &FilterSpec::default())
            .unwrap()
            .apply(Array1::from_elem(400, 5.0).view())
            .unwrap();
        assert!(out.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn zero_phase_requires_minimum_length() {
        let filter = Bandpass::design(300.0, &FilterSpec::default()).unwrap();
        assert_eq!(filter.pad_len(), 39);

        let short = Array1::from_elem(39, 1.0);
        assert_eq!(
            filter.apply(short.view()),
            Err(SignalError::SignalTooShort { len: 39, min_len: 39 })
        );
        assert!(filter.apply(Array1::from_elem(40, 1.0).view()).is_ok());
    }

    #[test]
    fn causal_filter_accepts_short_signals() {
        let spec = FilterSpec::default().with_zero_phase(false);
        let short = Signal::Mono(Array1::from_vec(vec![1.0, 2.0, 3.0]));
        let out = bandpass(&short, 300.0, &spec).unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn multi_channel_filters_each_channel_alike() {
        let fs = 300.0;
        let a = sine(7.0, fs, 600);
        let b = sine(3.0, fs, 600);
        let mut multi = Array2::<f64>::zeros((600, 2));
        multi.column_mut(0).assign(&a);
        multi.column_mut(1).assign(&b);

        let spec = FilterSpec::default();
        let out = bandpass(&Signal::Multi(multi), fs, &spec).unwrap();
        assert_eq!(out.len(), 600);
        assert_eq!(out.channels(), 2);

        let mono = bandpass(&Signal::Mono(b), fs, &spec).unwrap();
        let Signal::Multi(out) = out else { panic!("expected multi-channel output") };
        let diff = (&out.column(1) - &mono.as_mono().unwrap()).mapv(f64::abs).sum();
        assert!(diff < 1e-9);
    }

    #[test]
    fn spec_deserializes_through_validation() {
        let ok: FilterSpec = serde_json::from_str(
            r#"{"order":4,"low_cut":1.0,"high_cut":30.0,"zero_phase":false}"#,
        )
        .unwrap();
        assert_eq!(ok.order(), 4);
        assert!(!ok.zero_phase());

        let bad = serde_json::from_str::<FilterSpec>(
            r#"{"order":4,"low_cut":30.0,"high_cut":1.0,"zero_phase":true}"#,
        );
        assert!(bad.is_err());
    }
}
