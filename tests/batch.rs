use std::sync::Arc;

use ndarray::ArrayView1;

use ecgfeat::log::discard_logger;
use ecgfeat::mock::{mock_recordings, synthetic_ecg};
use ecgfeat::{
    detect_beats, Analysis, AnalysisConfig, BatchError, BeatProcessor, ExtractionError,
    FeatureConfig, FeatureExtractor, Header, SkipReason,
};

/// Evenly spaced beats, failing hard on recordings shorter than `min_len`.
struct Metronome {
    period: usize,
    min_len: usize,
}

impl BeatProcessor for Metronome {
    fn process(&self, signal: ArrayView1<f64>, _fs: f64) -> Result<Vec<usize>, ExtractionError> {
        if signal.len() < self.min_len {
            return Err(ExtractionError::Unexpected(format!("only {} samples", signal.len())));
        }
        let jitter = [0, 9, 3, 14, 6];
        Ok((0..)
            .map(|i| i * self.period + jitter[i % jitter.len()])
            .take_while(|p| *p < signal.len())
            .collect())
    }
}

#[test]
fn custom_processor_drives_the_table() {
    let processor = Arc::new(Metronome { period: 240, min_len: 0 });
    let analysis =
        Analysis::with_processor(AnalysisConfig::default(), processor, discard_logger()).unwrap();
    let (_, table) = analysis.run(mock_recordings(3, 20.0)).unwrap();

    assert_eq!(table.len(), 3);
    // 240 samples at 300 Hz
    let mean = table.column("RR_mean").unwrap();
    for value in mean {
        let value = value.unwrap();
        assert!((value - 800.0).abs() < 10.0, "RR_mean {value}");
    }
}

#[test]
fn unexpected_extraction_error_aborts_with_identity() {
    let processor = Arc::new(Metronome { period: 240, min_len: 4000 });
    let analysis =
        Analysis::with_processor(AnalysisConfig::default(), processor, discard_logger()).unwrap();

    let mut recordings = mock_recordings(4, 20.0);
    recordings[1] = ecgfeat::mock::synthetic_recording("S00002", "A", 300, 10.0, 2);

    match analysis.run(recordings) {
        Err(BatchError::Extraction { patient_id, label, source }) => {
            assert_eq!(patient_id, "S00002");
            assert_eq!(label, "A");
            assert!(!source.is_skippable());
        }
        other => panic!("expected an extraction failure, got {:?}", other.map(|(_, t)| t.len())),
    }
}

#[test]
fn heuristic_detector_finds_synthetic_beats() {
    let synthetic = synthetic_ecg(300.0, 20.0, 75.0, 11);
    let peaks = detect_beats(synthetic.signal.view(), 300.0).unwrap();

    assert_eq!(peaks.len(), synthetic.r_peaks.len());
    for (found, truth) in peaks.iter().zip(&synthetic.r_peaks) {
        assert!(found.abs_diff(*truth) <= 3, "peak {found} vs {truth}");
    }
}

#[test]
fn short_window_is_a_skip_not_a_failure() {
    let extractor = FeatureExtractor::new(FeatureConfig::default(), discard_logger());
    let synthetic = synthetic_ecg(300.0, 0.5, 70.0, 1);
    assert_eq!(
        extractor.extract_features(synthetic.signal.view(), 300.0),
        Err(ExtractionError::Skippable(SkipReason::WindowExceedsSignal))
    );
}

#[test]
fn header_drives_sample_rate() {
    let text = "A00001 1 300 9000 05/05/2014 20:00:00\n\
                A00001.mat 16+24 1000/mV 16 0 -127 0 0 ECG\n";
    let header = Header::parse(text).unwrap();
    assert_eq!(header.record_name, "A00001");
    assert_eq!(header.sample_rate, 300);
    assert_eq!(header.n_samples, 9000);
}

#[test]
fn table_serializes_missing_values_as_null() {
    let processor = Arc::new(Metronome { period: 240, min_len: 0 });
    let config = AnalysisConfig {
        features: FeatureConfig { dropped_columns: Vec::new(), ..FeatureConfig::default() },
        ..AnalysisConfig::default()
    };
    let analysis = Analysis::with_processor(config, processor, discard_logger()).unwrap();
    let (_, table) = analysis.run(mock_recordings(1, 20.0)).unwrap();

    let json = serde_json::to_value(&table).unwrap();
    let columns = json["columns"].as_array().unwrap();
    let sdann5 = columns.iter().position(|c| c == "HRV_SDANN5").unwrap();
    assert!(json["rows"][0]["values"][sdann5].is_null());
}
