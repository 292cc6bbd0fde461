use ndarray::s;
use ndarray_stats::QuantileExt;
use slog::{debug, Logger};

use crate::analysis::filter::{bandpass, FilterSpec};
use crate::analysis::signal::Signal;
use crate::config::AnalysisConfig;
use crate::error::{BatchError, SignalError};
use crate::record::Recording;

/// One pure stage of the preprocessing chain.
pub trait Transform: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, signal: Signal) -> Result<Signal, SignalError>;
}

pub struct BandpassFilter {
    pub fs: f64,
    pub spec: FilterSpec,
}

impl Transform for BandpassFilter {
    fn name(&self) -> &'static str {
        "bandpass_filter"
    }

    fn apply(&self, signal: Signal) -> Result<Signal, SignalError> {
        bandpass(&signal, self.fs, &self.spec)
    }
}

pub struct Normalizer;

impl Transform for Normalizer {
    fn name(&self) -> &'static str {
        "normalize"
    }

    fn apply(&self, signal: Signal) -> Result<Signal, SignalError> {
        normalize(&signal)
    }
}

pub struct Segmenter {
    window_size: usize,
    overlap_size: usize,
}

impl Segmenter {
    pub fn new(window_size: usize, overlap_size: usize) -> Result<Self, SignalError> {
        if window_size == 0 || overlap_size >= window_size {
            return Err(SignalError::Configuration(format!(
                "overlap {overlap_size} must be smaller than window {window_size}"
            )));
        }
        Ok(Self { window_size, overlap_size })
    }

    pub fn stride(&self) -> usize {
        self.window_size - self.overlap_size
    }
}

impl Transform for Segmenter {
    fn name(&self) -> &'static str {
        "segment"
    }

    fn apply(&self, signal: Signal) -> Result<Signal, SignalError> {
        segment(&signal, self.window_size, self.overlap_size)
    }
}

/// Min-max rescale to [0, 1]. A flat signal is an error, never NaN output.
pub fn normalize(signal: &Signal) -> Result<Signal, SignalError> {
    let (min, max) = match signal {
        Signal::Mono(a) => (
            *a.min().map_err(min_max_error)?,
            *a.max().map_err(min_max_error)?,
        ),
        Signal::Multi(a) => (
            *a.min().map_err(min_max_error)?,
            *a.max().map_err(min_max_error)?,
        ),
        Signal::Segmented(_) => return Err(SignalError::StageOrder { stage: "normalize" }),
    };
    if !(min.is_finite() && max.is_finite()) {
        return Err(SignalError::NonFinite);
    }

    let range = max - min;
    if range == 0.0 {
        return Err(SignalError::DegenerateSignal { value: min });
    }

    let rescale = |v: f64| (v - min) / range;
    match signal {
        Signal::Mono(a) => Ok(Signal::Mono(a.mapv(rescale))),
        Signal::Multi(a) => Ok(Signal::Multi(a.mapv(rescale))),
        Signal::Segmented(_) => Err(SignalError::StageOrder { stage: "normalize" }),
    }
}

fn min_max_error(e: ndarray_stats::errors::MinMaxError) -> SignalError {
    match e {
        ndarray_stats::errors::MinMaxError::EmptyInput => SignalError::EmptySignal,
        ndarray_stats::errors::MinMaxError::UndefinedOrder => SignalError::NonFinite,
    }
}

/// Fixed windows starting at 0 and advancing by `window_size - overlap_size`.
/// Trailing partial windows are dropped; a signal shorter than one window
/// yields no segments.
pub fn segment(
    signal: &Signal,
    window_size: usize,
    overlap_size: usize,
) -> Result<Signal, SignalError> {
    if window_size == 0 || overlap_size >= window_size {
        return Err(SignalError::Configuration(format!(
            "overlap {overlap_size} must be smaller than window {window_size}"
        )));
    }
    let stride = window_size - overlap_size;
    let len = signal.len();

    let starts = (0..).map(|i| i * stride).take_while(|start| start + window_size <= len);
    let segments = match signal {
        Signal::Mono(a) => starts
            .map(|start| Signal::Mono(a.slice(s![start..start + window_size]).to_owned()))
            .collect(),
        Signal::Multi(a) => starts
            .map(|start| Signal::Multi(a.slice(s![start..start + window_size, ..]).to_owned()))
            .collect(),
        Signal::Segmented(_) => return Err(SignalError::StageOrder { stage: "segment" }),
    };
    Ok(Signal::Segmented(segments))
}

/// Ordered stages, each output fed verbatim into the next.
pub struct Pipeline {
    stages: Vec<Box<dyn Transform>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Transform>>) -> Self {
        Self { stages }
    }

    /// filter -> normalize -> segment for a recording sampled at `fs`.
    pub fn for_sample_rate(fs: f64, config: &AnalysisConfig) -> Result<Self, SignalError> {
        Ok(Self::new(vec![
            Box::new(BandpassFilter { fs, spec: config.filter }),
            Box::new(Normalizer),
            Box::new(Segmenter::new(config.window_size, config.overlap_size)?),
        ]))
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn run(&self, signal: Signal) -> Result<Signal, SignalError> {
        self.stages.iter().try_fold(signal, |signal, stage| stage.apply(signal))
    }
}

/// Annotates recordings with their segmented form. Errors propagate to the caller.
pub struct Preprocessor {
    config: AnalysisConfig,
    log: Logger,
}

impl Preprocessor {
    pub fn new(config: AnalysisConfig, log: Logger) -> Self {
        Self { config, log }
    }

    pub fn process(&self, mut recording: Recording) -> Result<Recording, SignalError> {
        let fs = recording.sample_rate();
        let pipeline = Pipeline::for_sample_rate(fs, &self.config)?;

        let signal = Signal::mono(recording.signal.clone())?;
        let segmented = pipeline.run(signal)?;

        debug!(self.log, "preprocessed recording";
            "patient_id" => &recording.patient_id,
            "fs" => fs,
            "segments" => segmented.len());

        recording.segmented = Some(segmented);
        Ok(recording)
    }

    /// Sequential batch; stops at the first failing recording.
    pub fn process_all(&self, recordings: Vec<Recording>) -> Result<Vec<Recording>, BatchError> {
        recordings
            .into_iter()
            .map(|r| {
                let patient_id = r.patient_id.clone();
                self.process(r)
                    .map_err(|source| BatchError::Preprocess { patient_id, source })
            })
            .collect()
    }
}
