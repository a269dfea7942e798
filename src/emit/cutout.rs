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
//! Extraction of narrow-band I/Q cutouts around events
//!
//! Each cutout is a byte-exact copy of the source recording over the event
//! time range padded on both sides, in the original numeric format, together
//! with a sidecar metadata file. The data file is always written before its
//! sidecar so a reader never sees metadata referencing missing data.
//!

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::event::Event;
use crate::iq::meta::{Annotation, Capture, Sidecar};
use crate::iq::RecordingMeta;

/// Padding applied on each side of the event time range, in seconds
const PAD_SECONDS: f64 = 0.001;

/// Carves per-event I/Q cutouts out of a source recording
pub struct CutoutWriter {
    /// Path of the source recording
    source: PathBuf,
    /// Metadata of the source recording
    meta: RecordingMeta,
    /// Total complex samples in the source recording
    total_samples: u64,
    /// Directory cutouts are written into
    directory: PathBuf,
    /// Index assigned to the next cutout
    next_index: usize,
}

impl CutoutWriter {
    /// Creates a cutout writer over a source recording
    ///
    /// The destination directory is created if it does not exist.
    pub fn new<P, Q>(source: P, meta: RecordingMeta, directory: Q) -> Result<CutoutWriter>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let source = source.as_ref().to_path_buf();
        let length = fs::metadata(&source)?.len();
        let total_samples = length / meta.format.bytes_per_complex() as u64;
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;
        Ok(CutoutWriter {
            source,
            meta,
            total_samples,
            directory,
            next_index: 0,
        })
    }

    /// Writes the cutout and sidecar for one event
    ///
    /// Returns the paths of the data file and the sidecar, in that order.
    pub fn write_cutout(&mut self, event: &Event) -> Result<(PathBuf, PathBuf)> {
        let sample_rate = self.meta.sample_rate;
        let event_start = clamp_sample(event.start_time * sample_rate, self.total_samples);
        let event_end =
            clamp_sample((event.end_time * sample_rate).ceil(), self.total_samples).max(event_start + 1);
        let cutout_start =
            clamp_sample((event.start_time - PAD_SECONDS) * sample_rate, self.total_samples);
        let cutout_end = clamp_sample(
            ((event.end_time + PAD_SECONDS) * sample_rate).ceil(),
            self.total_samples,
        )
        .max(cutout_start + 1);

        let data_path = self.directory.join(format!("cutout_{:04}.iq", self.next_index));
        let meta_path = self
            .directory
            .join(format!("cutout_{:04}.json", self.next_index));

        self.copy_samples(cutout_start, cutout_end, &data_path)?;
        self.write_sidecar(event, cutout_start, event_start, event_end, &meta_path)?;

        self.next_index += 1;
        log::debug!(
            "wrote cutout {} covering samples {}..{}",
            data_path.display(),
            cutout_start,
            cutout_end
        );
        Ok((data_path, meta_path))
    }

    /// Copies a sample range of the source recording into a new file
    fn copy_samples(&self, start: u64, end: u64, destination: &Path) -> Result<()> {
        let bytes_per_complex = self.meta.format.bytes_per_complex() as u64;
        let mut source = File::open(&self.source)?;
        source.seek(SeekFrom::Start(start * bytes_per_complex))?;
        let mut reader = source.take((end - start) * bytes_per_complex);
        let mut writer = BufWriter::new(File::create(destination)?);
        io::copy(&mut reader, &mut writer)?;
        Ok(())
    }

    /// Writes the sidecar describing one cutout
    fn write_sidecar(
        &self,
        event: &Event,
        cutout_start: u64,
        event_start: u64,
        event_end: u64,
        destination: &Path,
    ) -> Result<()> {
        let center = self.meta.frequency.unwrap_or(0.0) + event.center_frequency;
        let sidecar = Sidecar {
            datatype: self.meta.format.name().to_owned(),
            sample_rate: self.meta.sample_rate,
            captures: vec![Capture {
                sample_start: cutout_start,
                frequency: self.meta.frequency,
                datetime: self.meta.datetime.clone(),
            }],
            annotations: vec![Annotation {
                sample_start: event_start - cutout_start,
                sample_count: event_end - event_start,
                freq_lower_edge: center - event.bandwidth / 2.0,
                freq_upper_edge: center + event.bandwidth / 2.0,
                description: format!(
                    "SNR {:.2} dB, bandwidth {:.3} Hz, {} (confidence {:.3})",
                    event.peak_snr_db, event.bandwidth, event.modulation, event.confidence
                ),
            }],
        };
        sidecar.to_file(destination)
    }

    /// Returns the number of cutouts written so far
    pub fn cutouts_written(&self) -> usize {
        self.next_index
    }
}

/// Converts a sample position to an in-range sample index
fn clamp_sample(position: f64, total: u64) -> u64 {
    if position <= 0.0 {
        0
    } else if position >= total as f64 {
        total
    } else {
        position as u64
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::iq::SampleFormat;
    use std::io::Write;

    fn test_meta() -> RecordingMeta {
        RecordingMeta {
            format: SampleFormat::Ci8,
            sample_rate: 1_000.0,
            frequency: Some(100_000.0),
            datetime: None,
        }
    }

    fn test_event() -> Event {
        Event {
            start_time: 0.010,
            end_time: 0.020,
            duration: 0.010,
            min_bin: 10,
            max_bin: 12,
            center_frequency: 250.0,
            bandwidth: 100.0,
            peak_snr_db: 25.0,
            avg_snr_db: 22.0,
            peak_power_dbfs: -10.0,
            detections: 5,
            confidence: 0.5,
            modulation: "narrowband".to_owned(),
            modulation_confidence: 0.7,
        }
    }

    #[test]
    fn test_cutout_covers_padded_range() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("recording.iq");
        // 100 complex ci8 samples whose I byte is the sample index
        let mut bytes = Vec::new();
        for index in 0..100u8 {
            bytes.push(index);
            bytes.push(0);
        }
        File::create(&source_path)
            .unwrap()
            .write_all(&bytes)
            .unwrap();

        let mut writer =
            CutoutWriter::new(&source_path, test_meta(), dir.path().join("cutouts")).unwrap();
        let (data_path, meta_path) = writer.write_cutout(&test_event()).unwrap();
        assert_eq!(writer.cutouts_written(), 1);
        assert!(data_path.ends_with("cutout_0000.iq"));
        assert!(meta_path.ends_with("cutout_0000.json"));

        // 1 ms padding at 1 kHz is one sample on each side: samples 9..21
        let data = fs::read(&data_path).unwrap();
        assert_eq!(data.len(), 12 * 2);
        assert_eq!(data[0], 9);
        assert_eq!(data[data.len() - 2], 20);

        let sidecar = Sidecar::from_file(&meta_path).unwrap();
        assert_eq!(sidecar.datatype, "ci8");
        assert_eq!(sidecar.sample_rate, 1_000.0);
        assert_eq!(sidecar.captures.len(), 1);
        assert_eq!(sidecar.captures[0].sample_start, 9);
        assert_eq!(sidecar.annotations.len(), 1);
        let annotation = &sidecar.annotations[0];
        // The annotation spans the event, not the padding
        assert_eq!(annotation.sample_start, 1);
        assert_eq!(annotation.sample_count, 10);
        assert!((annotation.freq_lower_edge - 100_200.0).abs() < 1e-9);
        assert!((annotation.freq_upper_edge - 100_300.0).abs() < 1e-9);
        assert!(annotation.description.contains("narrowband"));
    }

    #[test]
    fn test_cutout_clamps_to_recording() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("recording.iq");
        File::create(&source_path)
            .unwrap()
            .write_all(&[0u8; 40])
            .unwrap();

        let mut writer =
            CutoutWriter::new(&source_path, test_meta(), dir.path().join("cutouts")).unwrap();
        let event = Event {
            start_time: 0.0,
            end_time: 1.0,
            ..test_event()
        };
        let (data_path, _) = writer.write_cutout(&event).unwrap();
        // The padded range is clamped to the 20 samples that exist
        assert_eq!(fs::read(&data_path).unwrap().len(), 40);
    }

    #[test]
    fn test_cutout_indices_are_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("recording.iq");
        File::create(&source_path)
            .unwrap()
            .write_all(&[0u8; 200])
            .unwrap();
        let mut writer =
            CutoutWriter::new(&source_path, test_meta(), dir.path().join("cutouts")).unwrap();
        writer.write_cutout(&test_event()).unwrap();
        let (data_path, _) = writer.write_cutout(&test_event()).unwrap();
        assert!(data_path.ends_with("cutout_0001.iq"));
    }
}
