/*
 * Copyright 2020 The Regents of the University of California
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
 */

//!
//! Sidecar metadata files for recordings and cutouts
//!

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{RecordingMeta, SampleFormat};
use crate::error::{Error, Result};

/// A JSON sidecar describing an I/Q data file
///
/// The same schema describes source recordings and per-event cutouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Sidecar {
    /// Data type name, for example "ci8" or "ci16"
    pub datatype: String,
    /// Sample rate in hertz
    pub sample_rate: f64,
    /// Captures contained in the data file
    #[serde(default)]
    pub captures: Vec<Capture>,
    /// Annotations over the data file
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

/// One contiguous capture within a data file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Capture {
    /// The sample index where this capture begins
    ///
    /// For a cutout this references the cutout's origin within the source
    /// recording.
    pub sample_start: u64,
    /// Tuned center frequency in hertz, when known
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    /// Capture timestamp, when known
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
}

/// A labeled span of samples within a data file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Annotation {
    /// First annotated sample, relative to the start of the data file
    pub sample_start: u64,
    /// Number of annotated samples
    pub sample_count: u64,
    /// Lower frequency bound in hertz
    pub freq_lower_edge: f64,
    /// Upper frequency bound in hertz
    pub freq_upper_edge: f64,
    /// Human-readable description
    pub description: String,
}

impl Sidecar {
    /// Reads a sidecar from a JSON file
    pub fn from_file<P>(path: P) -> Result<Sidecar>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path.as_ref())?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            Error::InvalidInput(format!(
                "malformed metadata file {}: {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    /// Writes this sidecar to a JSON file, replacing any existing file
    pub fn to_file<P>(&self, path: P) -> Result<()>
    where
        P: AsRef<Path>,
    {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| Error::Internal(format!("metadata serialization failed: {}", e)))?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Interprets this sidecar as recording metadata
    ///
    /// Fails if the data type is not a supported sample format or the sample
    /// rate is not positive.
    pub fn recording_meta(&self) -> Result<RecordingMeta> {
        let format = SampleFormat::from_str(&self.datatype)?;
        if !(self.sample_rate > 0.0) || !self.sample_rate.is_finite() {
            return Err(Error::InvalidInput(format!(
                "sample rate {} is not positive",
                self.sample_rate
            )));
        }
        let first_capture = self.captures.first();
        Ok(RecordingMeta {
            format,
            sample_rate: self.sample_rate,
            frequency: first_capture.and_then(|capture| capture.frequency),
            datetime: first_capture.and_then(|capture| capture.datetime.clone()),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_round_trip() {
        let sidecar = Sidecar {
            datatype: "ci16".to_owned(),
            sample_rate: 2_000_000.0,
            captures: vec![Capture {
                sample_start: 12_345,
                frequency: Some(433_920_000.0),
                datetime: Some("2021-04-02T11:30:00Z".to_owned()),
            }],
            annotations: vec![Annotation {
                sample_start: 100,
                sample_count: 5_000,
                freq_lower_edge: 433_900_000.0,
                freq_upper_edge: 433_940_000.0,
                description: "burst".to_owned(),
            }],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.iq.json");
        sidecar.to_file(&path).unwrap();
        let restored = Sidecar::from_file(&path).unwrap();
        assert_eq!(sidecar, restored);

        let mut text = String::new();
        File::open(&path).unwrap().read_to_string(&mut text).unwrap();
        assert!(text.contains("\"freq_lower_edge\""));
    }

    #[test]
    fn test_recording_meta() {
        let sidecar = Sidecar {
            datatype: "ci8".to_owned(),
            sample_rate: 250_000.0,
            captures: vec![],
            annotations: vec![],
        };
        let meta = sidecar.recording_meta().unwrap();
        assert_eq!(meta.format, SampleFormat::Ci8);
        assert_eq!(meta.sample_rate, 250_000.0);
        assert!(meta.frequency.is_none());
    }

    #[test]
    fn test_unsupported_datatype() {
        let sidecar = Sidecar {
            datatype: "cf32".to_owned(),
            sample_rate: 250_000.0,
            captures: vec![],
            annotations: vec![],
        };
        assert!(sidecar.recording_meta().is_err());
    }
}
