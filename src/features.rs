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
//! Per-event spectral descriptors
//!
//! Given a power spectrum and a presumed center bin, the extractor locates
//! the signal lobe and measures SNR, bandwidth, peak-to-average ratio, and
//! shape statistics, then makes a coarse modulation guess from the occupied
//! bandwidth.
//!

use crate::error::{Error, Result};

/// Noise floor used when no noise samples are available
const NOISE_FALLBACK: f64 = 1e-12;

/// Fraction of the center power at which the auto-located lobe ends
const LOBE_EDGE_FRACTION: f64 = 0.1;

/// Feature extraction tuning parameters
#[derive(Debug, Copy, Clone)]
pub struct FeatureConfig {
    /// Sample rate in hertz, for bin-to-frequency conversion
    pub sample_rate: f64,
    /// Noise estimation margin outside the lobe, in cells per side
    pub noise_margin: usize,
    /// Fraction of peak power defining the -3 dB bandwidth
    pub half_power_fraction: f64,
    /// Fraction of in-lobe power defining the occupied bandwidth
    pub occupied_fraction: f64,
}

impl FeatureConfig {
    /// Creates a configuration with the default margins for a sample rate
    pub fn new(sample_rate: f64) -> Self {
        FeatureConfig {
            sample_rate,
            noise_margin: 10,
            half_power_fraction: 0.5,
            occupied_fraction: 0.99,
        }
    }
}

/// A per-event spectral descriptor
#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Features {
    /// False if the lobe contained no power; other fields are zero then
    pub valid: bool,
    /// Peak power over the local noise floor, in decibels
    pub snr_db: f64,
    /// Width of the region within half of peak power, in hertz
    pub bandwidth_3db_hz: f64,
    /// Width of the smallest symmetric window holding the occupied power
    /// fraction, in hertz; this is the primary bandwidth estimate
    pub occupied_bandwidth_hz: f64,
    /// Peak-to-average power ratio over the lobe, in decibels
    pub papr_db: f64,
    /// Geometric over arithmetic mean of positive lobe bins, in [0, 1]
    pub spectral_flatness: f64,
    /// Power-weighted mean of bin/N over the lobe
    pub spectral_centroid: f64,
    /// Power-weighted standard deviation of bin/N over the lobe
    pub spectral_spread: f64,
    /// Center frequency of the analyzed lobe, in hertz
    pub center_frequency_hz: f64,
    /// Coarse modulation guess from the occupied bandwidth
    pub modulation: &'static str,
    /// Confidence of the modulation guess
    pub modulation_confidence: f64,
}

impl Features {
    fn invalid() -> Self {
        Features {
            valid: false,
            snr_db: 0.0,
            bandwidth_3db_hz: 0.0,
            occupied_bandwidth_hz: 0.0,
            papr_db: 0.0,
            spectral_flatness: 0.0,
            spectral_centroid: 0.0,
            spectral_spread: 0.0,
            center_frequency_hz: 0.0,
            modulation: "unknown",
            modulation_confidence: 0.0,
        }
    }
}

/// Extracts spectral descriptors from power spectra
pub struct FeatureExtractor {
    /// Tuning parameters
    config: FeatureConfig,
}

impl FeatureExtractor {
    /// Creates a feature extractor
    pub fn new(config: FeatureConfig) -> Result<FeatureExtractor> {
        if !(config.sample_rate > 0.0) || !config.sample_rate.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "sample rate {} must be positive",
                config.sample_rate
            )));
        }
        if config.noise_margin == 0 {
            return Err(Error::InvalidConfig(
                "noise margin must be positive".to_owned(),
            ));
        }
        if !(config.half_power_fraction > 0.0 && config.half_power_fraction < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "half power fraction {} must be in (0, 1)",
                config.half_power_fraction
            )));
        }
        if !(config.occupied_fraction > 0.0 && config.occupied_fraction < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "occupied fraction {} must be in (0, 1)",
                config.occupied_fraction
            )));
        }
        Ok(FeatureExtractor { config })
    }

    /// Produces a descriptor for the signal around a center bin
    ///
    /// When bandwidth_bins is zero the signal lobe is auto-located by
    /// expanding from the center bin while the power stays above a tenth of
    /// the center power; otherwise the lobe is the window of that many bins
    /// around the center, clamped to the spectrum.
    pub fn analyze(
        &self,
        spectrum: &[f64],
        center_bin: usize,
        bandwidth_bins: usize,
    ) -> Result<Features> {
        let size = spectrum.len();
        if center_bin >= size {
            return Err(Error::InvalidInput(format!(
                "center bin {} out of range for spectrum length {}",
                center_bin, size
            )));
        }
        for (bin, &power) in spectrum.iter().enumerate() {
            if !power.is_finite() || power < 0.0 {
                return Err(Error::Internal(format!(
                    "invalid power {} in bin {}",
                    power, bin
                )));
            }
        }

        let (lobe_start, lobe_end) = if bandwidth_bins == 0 {
            if spectrum[center_bin] <= 0.0 {
                return Ok(Features::invalid());
            }
            let edge = LOBE_EDGE_FRACTION * spectrum[center_bin];
            let mut start = center_bin;
            while start > 0 && spectrum[start - 1] >= edge {
                start -= 1;
            }
            let mut end = center_bin;
            while end + 1 < size && spectrum[end + 1] >= edge {
                end += 1;
            }
            (start, end)
        } else {
            let half = bandwidth_bins / 2;
            (
                center_bin.saturating_sub(half),
                (center_bin + half).min(size - 1),
            )
        };

        let lobe = &spectrum[lobe_start..=lobe_end];
        let peak = lobe.iter().cloned().fold(0.0f64, f64::max);
        if peak <= 0.0 {
            return Ok(Features::invalid());
        }
        let peak_bin = lobe_start
            + lobe
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).expect("non-finite lobe power"))
                .map(|(offset, _)| offset)
                .unwrap_or(0);

        // Noise floor from the margins outside the lobe
        let margin = self.config.noise_margin;
        let mut noise_sum = 0.0;
        let mut noise_count = 0usize;
        for offset in 1..=margin {
            if lobe_start >= offset {
                let power = spectrum[lobe_start - offset];
                if power > 0.0 {
                    noise_sum += power;
                    noise_count += 1;
                }
            }
            if lobe_end + offset < size {
                let power = spectrum[lobe_end + offset];
                if power > 0.0 {
                    noise_sum += power;
                    noise_count += 1;
                }
            }
        }
        let noise_floor = if noise_count > 0 {
            noise_sum / noise_count as f64
        } else {
            NOISE_FALLBACK
        };
        let snr_db = 10.0 * (peak / noise_floor).log10();

        let bin_spacing = self.config.sample_rate / size as f64;

        // Half-power width around the peak, within the lobe
        let half_power = self.config.half_power_fraction * peak;
        let mut half_low = peak_bin;
        while half_low > lobe_start && spectrum[half_low - 1] >= half_power {
            half_low -= 1;
        }
        let mut half_high = peak_bin;
        while half_high < lobe_end && spectrum[half_high + 1] >= half_power {
            half_high += 1;
        }
        let bandwidth_3db_hz = (half_high - half_low + 1) as f64 * bin_spacing;

        // Smallest symmetric window around the center holding the occupied
        // fraction of in-lobe power
        let lobe_total: f64 = lobe.iter().sum();
        let anchor = center_bin.max(lobe_start).min(lobe_end);
        let target = self.config.occupied_fraction * lobe_total;
        let mut occupied_low = anchor;
        let mut occupied_high = anchor;
        let mut accumulated = spectrum[anchor];
        while accumulated < target && (occupied_low > lobe_start || occupied_high < lobe_end) {
            if occupied_low > lobe_start {
                occupied_low -= 1;
                accumulated += spectrum[occupied_low];
            }
            if occupied_high < lobe_end {
                occupied_high += 1;
                accumulated += spectrum[occupied_high];
            }
        }
        let occupied_bandwidth_hz = (occupied_high - occupied_low + 1) as f64 * bin_spacing;

        let mean = lobe_total / lobe.len() as f64;
        let papr_db = 10.0 * (peak / mean).log10();

        // Flatness over the positive lobe bins, accumulated in log domain
        let mut log_sum = 0.0;
        let mut positive_sum = 0.0;
        let mut positive_count = 0usize;
        for &power in lobe {
            if power > 0.0 {
                log_sum += power.ln();
                positive_sum += power;
                positive_count += 1;
            }
        }
        let spectral_flatness = if positive_count > 0 {
            let geometric = (log_sum / positive_count as f64).exp();
            let arithmetic = positive_sum / positive_count as f64;
            geometric / arithmetic
        } else {
            0.0
        };

        let mut centroid = 0.0;
        for (offset, &power) in lobe.iter().enumerate() {
            centroid += (lobe_start + offset) as f64 / size as f64 * power;
        }
        centroid /= lobe_total;
        let mut spread = 0.0;
        for (offset, &power) in lobe.iter().enumerate() {
            let deviation = (lobe_start + offset) as f64 / size as f64 - centroid;
            spread += deviation * deviation * power;
        }
        let spectral_spread = (spread / lobe_total).sqrt();

        let (modulation, modulation_confidence) = guess_modulation(occupied_bandwidth_hz);

        let features = Features {
            valid: true,
            snr_db,
            bandwidth_3db_hz,
            occupied_bandwidth_hz,
            papr_db,
            spectral_flatness,
            spectral_centroid: centroid,
            spectral_spread,
            center_frequency_hz: center_bin as f64 / size as f64 * self.config.sample_rate,
            modulation,
            modulation_confidence,
        };
        for &value in &[
            features.snr_db,
            features.bandwidth_3db_hz,
            features.occupied_bandwidth_hz,
            features.papr_db,
            features.spectral_flatness,
            features.spectral_centroid,
            features.spectral_spread,
            features.center_frequency_hz,
        ] {
            if !value.is_finite() {
                return Err(Error::Internal("non-finite spectral feature".to_owned()));
            }
        }
        Ok(features)
    }
}

/// Buckets an occupied bandwidth into a coarse modulation guess
fn guess_modulation(bandwidth_hz: f64) -> (&'static str, f64) {
    let guess = if bandwidth_hz > 150_000.0 {
        "noise"
    } else if bandwidth_hz > 20_000.0 {
        "fm"
    } else if bandwidth_hz > 5_000.0 {
        "am"
    } else if bandwidth_hz > 1_000.0 {
        "ssb"
    } else if bandwidth_hz > 100.0 {
        "cw"
    } else {
        "unknown"
    };
    (guess, 0.7)
}
