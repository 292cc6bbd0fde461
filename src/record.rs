use ndarray::Array1;

use crate::analysis::signal::Signal;
use crate::error::SignalError;

/// Header metadata of a recording. Only `sample_rate` is used by the analysis;
/// everything else is carried along for collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub record_name: String,
    pub n_leads: usize,
    pub sample_rate: u32,
    pub n_samples: usize,
    pub datetime: Option<String>,
    pub file_name: Option<String>,
    pub signal_details: Option<String>,
}

impl Header {
    pub fn new(record_name: impl Into<String>, sample_rate: u32, n_samples: usize) -> Self {
        Self {
            record_name: record_name.into(),
            n_leads: 1,
            sample_rate,
            n_samples,
            datetime: None,
            file_name: None,
            signal_details: None,
        }
    }

    /// Parse header text:
    ///
    /// ```text
    /// A00001 1 300 9000 05:05:15 1/05/2000
    /// A00001.mat 16+24 1000/mV 16 0 -127 0 0 ECG
    /// ```
    pub fn parse(text: &str) -> Result<Self, SignalError> {
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'));

        let first = lines
            .next()
            .ok_or_else(|| SignalError::Configuration("empty header".into()))?;
        let parts: Vec<&str> = first.split_whitespace().collect();
        if parts.len() < 4 {
            return Err(SignalError::Configuration(format!("malformed header line: {first}")));
        }

        let field = |i: usize, name: &str| -> Result<usize, SignalError> {
            parts[i].parse::<usize>().map_err(|_| {
                SignalError::Configuration(format!(
                    "header field {name} is not an integer: {}",
                    parts[i]
                ))
            })
        };
        let sample_rate = parts[2]
            .parse::<u32>()
            .ok()
            .filter(|fs| *fs > 0)
            .ok_or_else(|| {
                SignalError::Configuration(format!("invalid sample rate: {}", parts[2]))
            })?;

        let datetime = (parts.len() >= 6).then(|| format!("{} {}", parts[4], parts[5]));

        let (file_name, signal_details) = match lines.next() {
            Some(second) => {
                let mut it = second.split_whitespace();
                let file_name = it.next().map(str::to_string);
                let details = it.collect::<Vec<_>>().join(" ");
                (file_name, Some(details).filter(|d| !d.is_empty()))
            }
            None => (None, None),
        };

        Ok(Self {
            record_name: parts[0].to_string(),
            n_leads: field(1, "n_leads")?,
            sample_rate,
            n_samples: field(3, "n_samples")?,
            datetime,
            file_name,
            signal_details,
        })
    }
}

/// One recording as handed over by the data source.
#[derive(Debug, Clone)]
pub struct Recording {
    pub patient_id: String,
    pub label: String,
    pub header: Header,
    pub signal: Array1<f64>,
    /// Filled in by preprocessing.
    pub segmented: Option<Signal>,
}

impl Recording {
    pub fn new(
        patient_id: impl Into<String>,
        label: impl Into<String>,
        header: Header,
        signal: Array1<f64>,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            label: label.into(),
            header,
            signal,
            segmented: None,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.header.sample_rate as f64
    }
}
