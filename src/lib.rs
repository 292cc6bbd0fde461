pub mod analysis;
pub mod config;
pub mod error;
pub mod log;
pub mod mock;
pub mod record;

pub use analysis::ecg::{detect_beats, BeatProcessor, GradientBeatProcessor, HeuristicBeatProcessor};
pub use analysis::features::{Feature, FeatureExtractor, FeatureRecord, FeatureRow, FeatureTable};
pub use analysis::filter::{bandpass, Bandpass, FilterSpec};
pub use analysis::preprocess::{normalize, segment, Pipeline, Preprocessor, Transform};
pub use analysis::signal::Signal;
pub use analysis::Analysis;
pub use config::{AnalysisConfig, FeatureConfig};
pub use error::{BatchError, ExtractionError, SignalError, SkipReason};
pub use record::{Header, Recording};
