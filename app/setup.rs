/*
 * Copyright 2019 The Regents of the University of California
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

//! Resolution of a validated configuration into sources and destinations

use std::error::Error;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Stdin, Write};
use std::path::{Path, PathBuf};

use num_complex::Complex32;

use iqlab_discover::emit::{CutoutWriter, EventFormat};
use iqlab_discover::iq::wav::{self, WavSampleReader};
use iqlab_discover::iq::{RecordingMeta, SampleFormat, SampleReader, Sidecar};
use iqlab_discover_config::{self as config, Config, Destination, Input};

/// A boxed sample source
pub type SampleSource = Box<dyn Iterator<Item = iqlab_discover::Result<Complex32>>>;

/// The setup for a discovery operation
///
/// A Setup is created from a validated configuration by opening the source
/// and the destinations it names.
pub struct Setup {
    /// Source of complex samples
    pub source: SampleSource,
    /// Number of samples in the source, if known
    pub source_samples: Option<u64>,
    /// Sample rate of the source, hertz
    pub sample_rate: f64,
    /// Destination for event records
    pub destination: Box<dyn Write>,
    /// Event record flavor
    pub event_format: EventFormat,
    /// Cutout writer, when cutouts are enabled
    pub cutouts: Option<CutoutWriter>,
}

impl Setup {
    /// Opens the source and destinations named by a configuration
    pub fn from_config(config: &Config) -> Result<Self, Box<dyn Error>> {
        let (source, source_samples, sample_rate, recording) = open_source(&config.input)?;

        let destination: Box<dyn Write> = match &config.output.destination {
            Destination::Stdout => Box::new(io::stdout()),
            Destination::File { path } => Box::new(BufWriter::new(File::create(path)?)),
        };
        let event_format = match config.output.format {
            config::EventFormat::Columnar => EventFormat::Columnar,
            config::EventFormat::OneRecordPerLine => EventFormat::OneRecordPerLine,
        };

        let cutouts = if config.output.generate_cutouts {
            match recording {
                Some((path, meta)) => Some(CutoutWriter::new(
                    path,
                    meta,
                    &config.output.cutout_directory,
                )?),
                None => {
                    return Err(Box::new(iqlab_discover::Error::InvalidConfig(
                        "cutouts require a raw I/Q file source".to_owned(),
                    )));
                }
            }
        } else {
            None
        };

        Ok(Setup {
            source,
            source_samples,
            sample_rate,
            destination,
            event_format,
            cutouts,
        })
    }
}

/// Opens the configured sample source
///
/// Returns the source, its length in samples when known, its sample rate,
/// and, for raw file sources, the recording path and metadata used for
/// cutout provenance.
#[allow(clippy::type_complexity)]
fn open_source(
    input: &Input,
) -> Result<
    (
        SampleSource,
        Option<u64>,
        f64,
        Option<(PathBuf, RecordingMeta)>,
    ),
    Box<dyn Error>,
> {
    match input {
        Input::Stdin {
            format,
            sample_rate,
        } => {
            // stdin already has a BufReader
            // Use leak to create a lock with 'static lifetime.
            let stdin: &'static Stdin = Box::leak(Box::new(io::stdin()));
            let lock = stdin.lock();
            let source: SampleSource =
                Box::new(SampleReader::new(lock, sample_format(*format)));
            Ok((source, None, *sample_rate, None))
        }
        Input::File {
            path,
            format,
            sample_rate,
            metadata,
        } => {
            if path.extension() == Some(OsStr::new("wav")) {
                open_wav_source(path, *sample_rate)
            } else {
                open_raw_source(path, format.map(sample_format), *sample_rate, metadata.as_deref())
            }
        }
    }
}

/// Opens a raw interleaved I/Q file, resolving its metadata
fn open_raw_source(
    path: &Path,
    format: Option<SampleFormat>,
    sample_rate: Option<f64>,
    metadata: Option<&Path>,
) -> Result<
    (
        SampleSource,
        Option<u64>,
        f64,
        Option<(PathBuf, RecordingMeta)>,
    ),
    Box<dyn Error>,
> {
    let sidecar_meta = read_sidecar(path, metadata)?;
    // Explicit settings take precedence over the sidecar
    let format = format
        .or_else(|| sidecar_meta.as_ref().map(|meta| meta.format))
        .ok_or_else(|| missing_metadata(path, "--format"))?;
    let rate = sample_rate
        .or_else(|| sidecar_meta.as_ref().map(|meta| meta.sample_rate))
        .ok_or_else(|| missing_metadata(path, "--sample-rate"))?;
    let meta = RecordingMeta {
        format,
        sample_rate: rate,
        frequency: sidecar_meta.as_ref().and_then(|meta| meta.frequency),
        datetime: sidecar_meta.and_then(|meta| meta.datetime),
    };

    let length = fs::metadata(path)?.len();
    let samples = length / format.bytes_per_complex() as u64;
    let file = BufReader::new(File::open(path)?);
    let source: SampleSource = Box::new(SampleReader::new(file, format));
    Ok((
        source,
        Some(samples),
        rate,
        Some((path.to_path_buf(), meta)),
    ))
}

/// Opens a 16-bit PCM WAV file as an I/Q source
fn open_wav_source(
    path: &Path,
    sample_rate: Option<f64>,
) -> Result<
    (
        SampleSource,
        Option<u64>,
        f64,
        Option<(PathBuf, RecordingMeta)>,
    ),
    Box<dyn Error>,
> {
    let mut file = BufReader::new(File::open(path)?);
    let header = wav::read_header(&mut file)?;
    let rate = sample_rate.unwrap_or_else(|| f64::from(header.sample_rate));
    let source: SampleSource = Box::new(WavSampleReader::new(file, &header));
    Ok((source, Some(u64::from(header.frames())), rate, None))
}

/// Reads the sidecar for a recording, if one is named or discoverable
fn read_sidecar(path: &Path, explicit: Option<&Path>) -> Result<Option<RecordingMeta>, Box<dyn Error>> {
    match explicit {
        Some(sidecar_path) => Ok(Some(Sidecar::from_file(sidecar_path)?.recording_meta()?)),
        None => {
            // Look for a sidecar next to the recording
            let mut implied = path.as_os_str().to_owned();
            implied.push(".json");
            let implied = PathBuf::from(implied);
            if implied.exists() {
                log::info!("using metadata sidecar {}", implied.display());
                Ok(Some(Sidecar::from_file(&implied)?.recording_meta()?))
            } else {
                Ok(None)
            }
        }
    }
}

/// Converts a configuration sample format into the core sample format
fn sample_format(format: config::SampleFormat) -> SampleFormat {
    match format {
        config::SampleFormat::Ci8 => SampleFormat::Ci8,
        config::SampleFormat::Ci16 => SampleFormat::Ci16,
    }
}

/// Creates the error reported when neither a sidecar nor the command line
/// provides a required recording parameter
fn missing_metadata(path: &Path, flag: &str) -> Box<dyn Error> {
    Box::new(iqlab_discover::Error::InvalidConfig(format!(
        "{} has no metadata sidecar; {} is required",
        path.display(),
        flag
    )))
}
