use thiserror::Error;

/// Failures of the filter / normalize / segment stages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("signal too short: {len} samples, need more than {min_len}")]
    SignalTooShort { len: usize, min_len: usize },

    #[error("degenerate signal: max equals min ({value}), cannot normalize")]
    DegenerateSignal { value: f64 },

    #[error("empty signal")]
    EmptySignal,

    #[error("signal contains NaN or infinite samples")]
    NonFinite,

    #[error("stage {stage} cannot be applied to a segmented signal")]
    StageOrder { stage: &'static str },
}

/// Why a single recording was left out of a feature table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A beat-processing window is larger than the recording.
    WindowExceedsSignal,
    /// A value that must be converted (to an index, a count) was NaN.
    UndefinedNumeric,
    /// A feature's denominator was exactly zero.
    ZeroDenominator,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::WindowExceedsSignal => "analysis window exceeds signal length",
            SkipReason::UndefinedNumeric => "undefined numeric value in conversion",
            SkipReason::ZeroDenominator => "zero denominator",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("skippable: {0}")]
    Skippable(SkipReason),

    #[error("unexpected: {0}")]
    Unexpected(String),
}

impl ExtractionError {
    pub fn is_skippable(&self) -> bool {
        matches!(self, ExtractionError::Skippable(_))
    }
}

impl From<SignalError> for ExtractionError {
    fn from(e: SignalError) -> Self {
        match e {
            SignalError::SignalTooShort { .. } => {
                ExtractionError::Skippable(SkipReason::WindowExceedsSignal)
            }
            other => ExtractionError::Unexpected(other.to_string()),
        }
    }
}

/// Errors escaping a batch call. Carries the offending recording's identity.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("preprocessing failed for recording {patient_id}: {source}")]
    Preprocess {
        patient_id: String,
        #[source]
        source: SignalError,
    },

    #[error("feature extraction failed for recording {patient_id} (label {label}): {source}")]
    Extraction {
        patient_id: String,
        label: String,
        #[source]
        source: ExtractionError,
    },

    #[error("recording {patient_id} produced columns that differ from the table")]
    RaggedTable { patient_id: String },

    #[error("invalid configuration: {0}")]
    Configuration(#[from] SignalError),

    #[error("cannot start worker runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
