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

//!
//! Readers for raw interleaved I/Q recordings and their metadata
//!

pub mod meta;
pub mod reader;
pub mod wav;

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub use self::meta::Sidecar;
pub use self::reader::SampleReader;

/// On-disk numeric format of an I/Q recording
///
/// Samples are interleaved I, Q, I, Q, ... and are mapped to floats in
/// approximately [-1, +1] regardless of the raw bit width.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SampleFormat {
    /// 8-bit signed components, 2 bytes per complex sample
    Ci8,
    /// 16-bit signed little-endian components, 4 bytes per complex sample
    Ci16,
}

impl SampleFormat {
    /// Returns the number of bytes one complex sample occupies
    pub fn bytes_per_complex(self) -> usize {
        match self {
            SampleFormat::Ci8 => 2,
            SampleFormat::Ci16 => 4,
        }
    }

    /// Returns the conventional name of this format
    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::Ci8 => "ci8",
            SampleFormat::Ci16 => "ci16",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ci8" => Ok(SampleFormat::Ci8),
            "ci16" => Ok(SampleFormat::Ci16),
            other => Err(Error::InvalidInput(format!(
                "unsupported sample format \"{}\" (expected ci8 or ci16)",
                other
            ))),
        }
    }
}

/// Metadata describing an I/Q recording
///
/// Produced by a sidecar file or supplied by the host; consumed by the
/// framer for timestamping and by the emitter for cutout provenance.
#[derive(Debug, Clone)]
pub struct RecordingMeta {
    /// On-disk sample format
    pub format: SampleFormat,
    /// Sample rate in hertz
    pub sample_rate: f64,
    /// Tuned center frequency in hertz, when known
    pub frequency: Option<f64>,
    /// Capture timestamp, when known
    pub datetime: Option<String>,
}
