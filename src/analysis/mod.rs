use std::sync::Arc;

use futures::future::try_join_all;
use slog::{info, o, Logger};

use crate::config::AnalysisConfig;
use crate::error::BatchError;
use crate::record::Recording;

pub mod ecg;
pub mod features;
pub mod filter;
pub mod hrv;
pub mod preprocess;
pub mod signal;
pub mod spectral;

use ecg::BeatProcessor;
use features::{FeatureExtractor, FeatureTable};
use preprocess::Preprocessor;

/// Batch front end. Recordings are processed independently on the blocking
/// pool of an owned tokio runtime; results come back in input order.
///
/// The methods block, so call them from synchronous code only.
pub struct Analysis {
    config: Arc<AnalysisConfig>,
    preprocessor: Arc<Preprocessor>,
    extractor: Arc<FeatureExtractor>,
    rt: tokio::runtime::Runtime,
    log: Logger,
}

impl Analysis {
    pub fn new(config: AnalysisConfig, log: Logger) -> Result<Self, BatchError> {
        let extractor =
            FeatureExtractor::new(config.features.clone(), log.new(o!("stage" => "features")));
        Self::build(config, extractor, log)
    }

    pub fn with_processor(
        config: AnalysisConfig,
        processor: Arc<dyn BeatProcessor>,
        log: Logger,
    ) -> Result<Self, BatchError> {
        let extractor = FeatureExtractor::with_processor(
            config.features.clone(),
            processor,
            log.new(o!("stage" => "features")),
        );
        Self::build(config, extractor, log)
    }

    fn build(
        config: AnalysisConfig,
        extractor: FeatureExtractor,
        log: Logger,
    ) -> Result<Self, BatchError> {
        config.validate()?;
        let rt = tokio::runtime::Runtime::new()?;
        let preprocessor = Preprocessor::new(config.clone(), log.new(o!("stage" => "preprocess")));
        Ok(Self {
            config: Arc::new(config),
            preprocessor: Arc::new(preprocessor),
            extractor: Arc::new(extractor),
            rt,
            log,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Filter, normalize and segment every recording. The first failure in
    /// input order is returned; nothing is swallowed.
    pub fn preprocess(&self, recordings: Vec<Recording>) -> Result<Vec<Recording>, BatchError> {
        info!(self.log, "preprocessing"; "recordings" => recordings.len());
        let handles: Vec<_> = recordings
            .into_iter()
            .map(|recording| {
                let preprocessor = Arc::clone(&self.preprocessor);
                self.rt.spawn_blocking(move || {
                    let patient_id = recording.patient_id.clone();
                    preprocessor
                        .process(recording)
                        .map_err(|source| BatchError::Preprocess { patient_id, source })
                })
            })
            .collect();
        self.rt.block_on(try_join_all(handles))?.into_iter().collect()
    }

    /// Feature table over `recordings`, skipping the ones that hit the skip
    /// policy and aborting on the first unexpected failure in input order.
    pub fn build_features(&self, recordings: Arc<[Recording]>) -> Result<FeatureTable, BatchError> {
        info!(self.log, "extracting features"; "recordings" => recordings.len());
        let handles: Vec<_> = (0..recordings.len())
            .map(|i| {
                let extractor = Arc::clone(&self.extractor);
                let recordings = Arc::clone(&recordings);
                self.rt.spawn_blocking(move || extractor.extract_record(&recordings[i]))
            })
            .collect();
        let results = self.rt.block_on(try_join_all(handles))?;

        let mut table = FeatureTable::default();
        for (recording, result) in recordings.iter().zip(results) {
            if let Some(record) = self.extractor.settle(recording, result)? {
                table.push(&recording.patient_id, record)?;
            }
        }
        Ok(self.extractor.finish(table))
    }

    /// Preprocess, then extract features from the same recordings.
    pub fn run(
        &self,
        recordings: Vec<Recording>,
    ) -> Result<(Arc<[Recording]>, FeatureTable), BatchError> {
        let recordings: Arc<[Recording]> = self.preprocess(recordings)?.into();
        let table = self.build_features(Arc::clone(&recordings))?;
        Ok((recordings, table))
    }
}
