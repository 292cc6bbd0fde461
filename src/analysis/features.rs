use std::sync::Arc;

use ndarray::ArrayView1;
use serde::Serialize;
use slog::{error, info, warn, Logger};

use crate::analysis::ecg::{BeatProcessor, GradientBeatProcessor};
use crate::analysis::hrv::{self, hrv_time, rr_features};
use crate::analysis::spectral::{band_power, welch};
use crate::config::FeatureConfig;
use crate::error::{BatchError, ExtractionError, SkipReason};
use crate::record::Recording;

/// A named scalar. `None` marks a value that is undefined for this recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Feature {
    pub name: &'static str,
    pub value: Option<f64>,
}

impl Feature {
    pub fn new(name: &'static str, value: f64) -> Self {
        Self { name, value: Some(value) }
    }

    pub fn maybe(name: &'static str, value: Option<f64>) -> Self {
        Self { name, value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRecord {
    pub features: Vec<Feature>,
    pub label: String,
}

impl FeatureRecord {
    pub fn get(&self, name: &str) -> Option<Option<f64>> {
        self.features.iter().find(|f| f.name == name).map(|f| f.value)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.features.iter().map(|f| f.name).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub patient_id: String,
    pub label: String,
    pub values: Vec<Option<f64>>,
}

/// Rows of feature values sharing one column set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureTable {
    columns: Vec<&'static str>,
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// Appends a record. The first record fixes the columns; later records
    /// must carry exactly the same names in the same order.
    pub fn push(&mut self, patient_id: &str, record: FeatureRecord) -> Result<(), BatchError> {
        let names = record.names();
        if self.rows.is_empty() && self.columns.is_empty() {
            self.columns = names;
        } else if names != self.columns {
            return Err(BatchError::RaggedTable { patient_id: patient_id.to_string() });
        }
        self.rows.push(FeatureRow {
            patient_id: patient_id.to_string(),
            label: record.label,
            values: record.features.into_iter().map(|f| f.value).collect(),
        });
        Ok(())
    }

    pub fn drop_columns<S: AsRef<str>>(&mut self, names: &[S]) {
        let keep: Vec<bool> = self
            .columns
            .iter()
            .map(|c| !names.iter().any(|n| n.as_ref() == *c))
            .collect();
        let mut flags = keep.iter();
        self.columns.retain(|_| *flags.next().unwrap_or(&true));
        for row in &mut self.rows {
            let mut flags = keep.iter();
            row.values.retain(|_| *flags.next().unwrap_or(&true));
        }
    }

    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.columns.iter().position(|c| *c == name)?;
        Some(self.rows.iter().map(|r| r.values[idx]).collect())
    }

    pub fn labels(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.label.as_str()).collect()
    }
}

/// Turns recordings into feature records and assembles tables.
pub struct FeatureExtractor {
    config: FeatureConfig,
    processor: Arc<dyn BeatProcessor>,
    log: Logger,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig, log: Logger) -> Self {
        Self::with_processor(config, Arc::new(GradientBeatProcessor::default()), log)
    }

    pub fn with_processor(
        config: FeatureConfig,
        processor: Arc<dyn BeatProcessor>,
        log: Logger,
    ) -> Self {
        Self { config, processor, log }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// All features of one trace, in a fixed order.
    pub fn extract_features(
        &self,
        signal: ArrayView1<f64>,
        fs: f64,
    ) -> Result<Vec<Feature>, ExtractionError> {
        if signal.iter().any(|v| !v.is_finite()) {
            return Err(ExtractionError::Skippable(SkipReason::UndefinedNumeric));
        }

        let peaks = self.processor.process(signal, fs)?;

        let mut features = hrv_time(&peaks, fs)?;
        let rr = rr_features(&peaks, fs, self.config.irregularity_threshold_ms)?;
        features.extend(rr.into_features());

        let psd = welch(signal, fs, self.config.welch_segment_len)?;
        let lf = band_power(&psd, self.config.lf_band);
        let hf = band_power(&psd, self.config.hf_band);
        let lf_hf = (hf > self.config.hf_floor).then(|| lf / hf);
        features.extend([
            Feature::new("LF", lf),
            Feature::new("HF", hf),
            Feature::maybe("LF_HF_ratio", lf_hf),
        ]);

        let (skewness, kurtosis) = shape(signal)?;
        features.extend([Feature::new("Skewness", skewness), Feature::new("Kurtosis", kurtosis)]);

        Ok(features)
    }

    pub fn extract_record(&self, recording: &Recording) -> Result<FeatureRecord, ExtractionError> {
        let features = self.extract_features(recording.signal.view(), recording.sample_rate())?;
        Ok(FeatureRecord { features, label: recording.label.clone() })
    }

    /// Apply the skip policy to one extraction result: skippable errors drop
    /// the recording, anything else aborts with the recording's identity.
    pub fn settle(
        &self,
        recording: &Recording,
        result: Result<FeatureRecord, ExtractionError>,
    ) -> Result<Option<FeatureRecord>, BatchError> {
        match result {
            Ok(record) => Ok(Some(record)),
            Err(ExtractionError::Skippable(reason)) => {
                warn!(self.log, "skipping recording";
                    "patient_id" => &recording.patient_id,
                    "label" => &recording.label,
                    "reason" => %reason);
                Ok(None)
            }
            Err(source) => {
                error!(self.log, "feature extraction failed";
                    "patient_id" => &recording.patient_id,
                    "label" => &recording.label,
                    "samples" => recording.signal.len(),
                    "fs" => recording.sample_rate(),
                    "error" => %source);
                Err(BatchError::Extraction {
                    patient_id: recording.patient_id.clone(),
                    label: recording.label.clone(),
                    source,
                })
            }
        }
    }

    /// Drops the configured columns from an assembled table.
    pub fn finish(&self, mut table: FeatureTable) -> FeatureTable {
        table.drop_columns(&self.config.dropped_columns);
        info!(self.log, "feature table ready";
            "rows" => table.len(),
            "columns" => table.columns().len());
        table
    }

    /// Sequential batch over `recordings`, in order.
    pub fn build_features(&self, recordings: &[Recording]) -> Result<FeatureTable, BatchError> {
        let mut table = FeatureTable::default();
        for recording in recordings {
            if let Some(record) = self.settle(recording, self.extract_record(recording))? {
                table.push(&recording.patient_id, record)?;
            }
        }
        Ok(self.finish(table))
    }
}

/// Skewness and excess kurtosis from biased central moments.
pub fn shape(signal: ArrayView1<f64>) -> Result<(f64, f64), ExtractionError> {
    let values = signal.to_vec();
    let m = hrv::mean(&values)?;
    let moment = |k: i32| values.iter().map(|v| (v - m).powi(k)).sum::<f64>() / values.len() as f64;
    let m2 = moment(2);
    let skewness = hrv::ratio(moment(3), m2.powf(1.5))?;
    let kurtosis = hrv::ratio(moment(4), m2 * m2)? - 3.0;
    Ok((skewness, kurtosis))
}
