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

extern crate clap;
extern crate log;
extern crate serde;
extern crate toml;

mod cli;
mod validate;

use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use crate::cli::config_from_command_line;
pub use crate::validate::ConfigError;

/// Largest supported FFT size
pub const MAX_FFT_SIZE: usize = 1 << 20;

/// A configuration for iqlab_discover
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Config {
    /// Where to read the I/Q samples (required)
    pub input: Input,
    /// Frame and transform settings (optional)
    #[serde(default)]
    pub spectral: Spectral,
    /// Detector settings (optional)
    #[serde(default)]
    pub detector: Detector,
    /// Clustering settings (optional)
    #[serde(default)]
    pub clustering: Clustering,
    /// Event output settings (optional)
    #[serde(default)]
    pub output: Output,
    /// Application user interface settings (optional)
    #[serde(default)]
    pub ui: UserInterface,
}

/// Information about where to read the I/Q samples
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum Input {
    /// Read samples from standard input in the specified format
    Stdin {
        /// On-disk sample format
        format: SampleFormat,
        /// Sample rate in hertz
        sample_rate: f64,
    },
    /// Read samples from a file (which may be a named pipe)
    ///
    /// The format and sample rate may be omitted when a metadata sidecar
    /// provides them.
    File {
        /// Path of the recording
        path: PathBuf,
        /// On-disk sample format, if not taken from a sidecar
        #[serde(default)]
        format: Option<SampleFormat>,
        /// Sample rate in hertz, if not taken from a sidecar
        #[serde(default)]
        sample_rate: Option<f64>,
        /// Explicit path of the metadata sidecar
        #[serde(default)]
        metadata: Option<PathBuf>,
    },
}

/// On-disk sample formats the discovery core can read
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// 8-bit signed interleaved
    Ci8,
    /// 16-bit signed little-endian interleaved
    Ci16,
}

/// Frame and transform settings
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Spectral {
    /// FFT size in samples, a power of two
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    /// Sample offset between consecutive frames
    #[serde(default = "default_hop_size")]
    pub hop_size: usize,
}

impl Default for Spectral {
    fn default() -> Self {
        Spectral {
            fft_size: default_fft_size(),
            hop_size: default_hop_size(),
        }
    }
}

fn default_fft_size() -> usize {
    2048
}
fn default_hop_size() -> usize {
    512
}

/// OS-CFAR detector settings
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Detector {
    /// Target probability of false alarm per bin per frame
    #[serde(default = "default_pfa")]
    pub pfa: f64,
    /// One-sided reference cell count
    #[serde(default = "default_ref_cells")]
    pub ref_cells: usize,
    /// One-sided guard cell count
    #[serde(default = "default_guard_cells")]
    pub guard_cells: usize,
    /// Order statistic rank, in [1, 2 * ref_cells]
    #[serde(default = "default_os_rank")]
    pub os_rank: usize,
}

impl Default for Detector {
    fn default() -> Self {
        Detector {
            pfa: default_pfa(),
            ref_cells: default_ref_cells(),
            guard_cells: default_guard_cells(),
            os_rank: default_os_rank(),
        }
    }
}

fn default_pfa() -> f64 {
    1e-4
}
fn default_ref_cells() -> usize {
    8
}
fn default_guard_cells() -> usize {
    2
}
fn default_os_rank() -> usize {
    12
}

/// Clustering settings
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Clustering {
    /// Maximum time gap within a cluster, milliseconds
    #[serde(default = "default_time_gap_ms")]
    pub max_time_gap_ms: f64,
    /// Maximum frequency gap for matching and merging, hertz
    #[serde(default = "default_freq_gap_hz")]
    pub max_freq_gap_hz: f64,
    /// Cap on simultaneously active clusters
    #[serde(default = "default_max_clusters")]
    pub max_clusters: usize,
}

impl Default for Clustering {
    fn default() -> Self {
        Clustering {
            max_time_gap_ms: default_time_gap_ms(),
            max_freq_gap_hz: default_freq_gap_hz(),
            max_clusters: default_max_clusters(),
        }
    }
}

fn default_time_gap_ms() -> f64 {
    100.0
}
fn default_freq_gap_hz() -> f64 {
    5_000.0
}
fn default_max_clusters() -> usize {
    100
}

/// Event output settings
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Output {
    /// Where to write the event records
    #[serde(default)]
    pub destination: Destination,
    /// Event record flavor
    #[serde(default)]
    pub format: EventFormat,
    /// Whether to carve a cutout for each event
    #[serde(default)]
    pub generate_cutouts: bool,
    /// Directory cutouts are written into
    #[serde(default = "default_cutout_directory")]
    pub cutout_directory: PathBuf,
}

impl Default for Output {
    fn default() -> Self {
        Output {
            destination: Destination::default(),
            format: EventFormat::default(),
            generate_cutouts: false,
            cutout_directory: default_cutout_directory(),
        }
    }
}

fn default_cutout_directory() -> PathBuf {
    PathBuf::from("cutouts")
}

/// Where to write the event records
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// Write records to standard output
    Stdout,
    /// Write records to a file
    File {
        /// Path of the record file
        path: PathBuf,
    },
}

impl Default for Destination {
    fn default() -> Self {
        Destination::Stdout
    }
}

/// Event record output flavors
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(rename_all = "snake_case")]
pub enum EventFormat {
    /// A header row followed by one comma-separated row per event
    Columnar,
    /// One self-describing key=value line per event
    OneRecordPerLine,
}

impl Default for EventFormat {
    fn default() -> Self {
        EventFormat::Columnar
    }
}

/// User interface options
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct UserInterface {
    /// Minimum log level to print
    #[serde(default = "log_level_warn")]
    pub log_level: LevelFilter,
}

impl Default for UserInterface {
    fn default() -> Self {
        UserInterface {
            log_level: log_level_warn(),
        }
    }
}

fn log_level_warn() -> LevelFilter {
    LevelFilter::Warn
}
