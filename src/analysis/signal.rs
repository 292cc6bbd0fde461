use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::error::SignalError;

/// Samples flowing through the preprocessing stages.
///
/// `Multi` is laid out samples × channels, so every channel has the same
/// length by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Mono(Array1<f64>),
    Multi(Array2<f64>),
    Segmented(Vec<Signal>),
}

impl Signal {
    pub fn mono(samples: Array1<f64>) -> Result<Self, SignalError> {
        if samples.is_empty() {
            return Err(SignalError::EmptySignal);
        }
        Ok(Signal::Mono(samples))
    }

    pub fn multi(samples: Array2<f64>) -> Result<Self, SignalError> {
        if samples.is_empty() {
            return Err(SignalError::EmptySignal);
        }
        Ok(Signal::Multi(samples))
    }

    /// Number of samples per channel, or number of segments when segmented.
    pub fn len(&self) -> usize {
        match self {
            Signal::Mono(a) => a.len(),
            Signal::Multi(a) => a.len_of(Axis(0)),
            Signal::Segmented(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channels(&self) -> usize {
        match self {
            Signal::Mono(_) => 1,
            Signal::Multi(a) => a.len_of(Axis(1)),
            Signal::Segmented(s) => s.first().map_or(0, Signal::channels),
        }
    }

    pub fn as_mono(&self) -> Option<ArrayView1<f64>> {
        match self {
            Signal::Mono(a) => Some(a.view()),
            _ => None,
        }
    }

    pub fn segments(&self) -> Option<&[Signal]> {
        match self {
            Signal::Segmented(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Array1<f64>> for Signal {
    fn from(samples: Array1<f64>) -> Self {
        Signal::Mono(samples)
    }
}
