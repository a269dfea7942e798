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
//! Range validation of configurations, applied before processing begins
//!

use std::error::Error;
use std::fmt;

use crate::{Config, Input, MAX_FFT_SIZE};

/// An error describing a rejected configuration value
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError(String);

impl ConfigError {
    pub(crate) fn new<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        ConfigError(message.into())
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration: {}", self.0)
    }
}

impl Error for ConfigError {}

impl Config {
    /// Checks every recognized field against its allowed range
    ///
    /// This runs before any processing; a rejected value blocks the run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let spectral = &self.spectral;
        if spectral.fft_size < 2
            || !spectral.fft_size.is_power_of_two()
            || spectral.fft_size > MAX_FFT_SIZE
        {
            return Err(ConfigError::new(format!(
                "fft_size {} must be a power of two between 2 and {}",
                spectral.fft_size, MAX_FFT_SIZE
            )));
        }
        if spectral.hop_size == 0 || spectral.hop_size > spectral.fft_size {
            return Err(ConfigError::new(format!(
                "hop_size {} must be between 1 and fft_size {}",
                spectral.hop_size, spectral.fft_size
            )));
        }

        let detector = &self.detector;
        if !(detector.pfa > 0.0 && detector.pfa < 1.0) {
            return Err(ConfigError::new(format!(
                "pfa {} must be between 0 and 1 exclusive",
                detector.pfa
            )));
        }
        if detector.ref_cells == 0 {
            return Err(ConfigError::new("ref_cells must be positive"));
        }
        if detector.guard_cells >= detector.ref_cells {
            return Err(ConfigError::new(format!(
                "guard_cells {} must be less than ref_cells {}",
                detector.guard_cells, detector.ref_cells
            )));
        }
        if detector.os_rank == 0 || detector.os_rank > 2 * detector.ref_cells {
            return Err(ConfigError::new(format!(
                "os_rank {} must be between 1 and {}",
                detector.os_rank,
                2 * detector.ref_cells
            )));
        }

        let clustering = &self.clustering;
        if !(clustering.max_time_gap_ms > 0.0) || !clustering.max_time_gap_ms.is_finite() {
            return Err(ConfigError::new(format!(
                "max_time_gap_ms {} must be positive",
                clustering.max_time_gap_ms
            )));
        }
        if !(clustering.max_freq_gap_hz > 0.0) || !clustering.max_freq_gap_hz.is_finite() {
            return Err(ConfigError::new(format!(
                "max_freq_gap_hz {} must be positive",
                clustering.max_freq_gap_hz
            )));
        }
        if clustering.max_clusters == 0 {
            return Err(ConfigError::new("max_clusters must be positive"));
        }

        match self.input {
            Input::Stdin { sample_rate, .. } => check_sample_rate(Some(sample_rate))?,
            Input::File { sample_rate, .. } => check_sample_rate(sample_rate)?,
        }

        Ok(())
    }
}

fn check_sample_rate(sample_rate: Option<f64>) -> Result<(), ConfigError> {
    if let Some(rate) = sample_rate {
        if !(rate > 0.0) || !rate.is_finite() {
            return Err(ConfigError::new(format!(
                "sample_rate {} must be positive",
                rate
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::SampleFormat;

    fn base_config() -> Config {
        Config {
            input: Input::Stdin {
                format: SampleFormat::Ci16,
                sample_rate: 2_000_000.0,
            },
            spectral: Default::default(),
            detector: Default::default(),
            clustering: Default::default(),
            output: Default::default(),
            ui: Default::default(),
        }
    }

    #[test]
    fn defaults_are_valid() {
        base_config().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = base_config();
        config.spectral.fft_size = 1000;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.spectral.hop_size = config.spectral.fft_size + 1;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.detector.pfa = 1.5;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.detector.guard_cells = config.detector.ref_cells;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.detector.os_rank = 2 * config.detector.ref_cells + 1;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.clustering.max_time_gap_ms = 0.0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.clustering.max_clusters = 0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.input = Input::Stdin {
            format: SampleFormat::Ci16,
            sample_rate: -1.0,
        };
        assert!(config.validate().is_err());
    }
}
