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
//! Ordered-statistics constant false alarm rate (OS-CFAR) detection
//!
//! Each bin is tested against a threshold derived from the rank-th smallest
//! of its 2R reference cells, which holds the per-bin false alarm
//! probability constant under exponential interference statistics.
//!

use crate::error::{Error, Result};

/// Floor applied to noise and threshold estimates before taking logarithms
const POWER_FLOOR: f64 = 1e-20;

/// Detector tuning parameters
#[derive(Debug, Copy, Clone)]
pub struct CfarConfig {
    /// Target probability of false alarm per bin per frame, in (0, 1)
    pub pfa: f64,
    /// One-sided reference cell count R, so 2R cells form the noise estimate
    pub ref_cells: usize,
    /// One-sided guard cell count G, excluded from the noise estimate
    pub guard_cells: usize,
    /// Which order statistic of the 2R reference cells to use, in [1, 2R]
    pub rank: usize,
}

impl Default for CfarConfig {
    fn default() -> Self {
        CfarConfig {
            pfa: 1e-4,
            ref_cells: 8,
            guard_cells: 2,
            rank: 12,
        }
    }
}

/// One triggered bin within one frame
#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Detection {
    /// Index of the triggered bin in the DC-centered spectrum
    pub bin: usize,
    /// Linear signal power in the triggered bin
    pub power: f64,
    /// Linear threshold the bin exceeded
    pub threshold: f64,
    /// Estimated signal-to-noise ratio in decibels
    ///
    /// The noise estimate is the mean of the 2R reference cells.
    pub snr_db: f64,
    /// Confidence in [0, 1] derived from the excess over threshold
    pub confidence: f64,
}

/// A per-bin OS-CFAR detector over power spectra of one fixed length
///
/// The detector is stateless between frames; only its configuration matters.
pub struct OsCfar {
    /// Expected spectrum length
    size: usize,
    /// Tuning parameters
    config: CfarConfig,
    /// Threshold scale factor solved from the OS-CFAR false alarm relation
    alpha: f64,
}

impl OsCfar {
    /// Creates a detector for spectra of the provided length
    ///
    /// The scale factor alpha is solved numerically from the OS-CFAR
    /// relation for the configured false alarm probability.
    pub fn new(size: usize, config: CfarConfig) -> Result<OsCfar> {
        if config.ref_cells == 0 {
            return Err(Error::InvalidConfig(
                "reference cell count must be positive".to_owned(),
            ));
        }
        if config.guard_cells >= config.ref_cells {
            return Err(Error::InvalidConfig(format!(
                "guard cell count {} must be less than reference cell count {}",
                config.guard_cells, config.ref_cells
            )));
        }
        if config.rank == 0 || config.rank > 2 * config.ref_cells {
            return Err(Error::InvalidConfig(format!(
                "order statistic rank {} must be in [1, {}]",
                config.rank,
                2 * config.ref_cells
            )));
        }
        if !(config.pfa > 0.0 && config.pfa < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "false alarm probability {} must be in (0, 1)",
                config.pfa
            )));
        }
        if size < 2 * (config.ref_cells + config.guard_cells) + 1 {
            return Err(Error::InvalidConfig(format!(
                "spectrum length {} is too short for {} reference and {} guard cells per side",
                size, config.ref_cells, config.guard_cells
            )));
        }
        let alpha = solve_alpha(config.pfa, 2 * config.ref_cells, config.rank);
        Ok(OsCfar {
            size,
            config,
            alpha,
        })
    }

    /// Returns the solved threshold scale factor
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Returns the configured spectrum length
    pub fn size(&self) -> usize {
        self.size
    }

    /// Tests every bin of a power spectrum and returns the triggered bins
    ///
    /// Reference cells that would fall outside the spectrum are clamped to
    /// the nearest edge bin, so a full reference set is always available.
    pub fn process_frame(&self, spectrum: &[f64]) -> Result<Vec<Detection>> {
        if spectrum.len() != self.size {
            return Err(Error::InvalidInput(format!(
                "spectrum length {} does not match configured length {}",
                spectrum.len(),
                self.size
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

        let r = self.config.ref_cells;
        let g = self.config.guard_cells;
        let mut reference = Vec::with_capacity(2 * r);
        let mut detections = Vec::new();

        for bin in 0..self.size {
            reference.clear();
            let mut noise_sum = 0.0;
            for offset in (g + 1)..=(g + r) {
                let below = clamp_index(bin as isize - offset as isize, self.size);
                let above = clamp_index(bin as isize + offset as isize, self.size);
                noise_sum += spectrum[below] + spectrum[above];
                reference.push(spectrum[below]);
                reference.push(spectrum[above]);
            }
            reference.sort_by(|a, b| a.partial_cmp(b).expect("non-finite reference cell"));
            let order_statistic = reference[self.config.rank - 1];
            let threshold = self.alpha * order_statistic;
            let power = spectrum[bin];
            if power > threshold {
                let noise_estimate = (noise_sum / (2 * r) as f64).max(POWER_FLOOR);
                let snr_db = 10.0 * (power / noise_estimate).log10();
                let excess_db = 10.0 * (power / threshold.max(POWER_FLOOR)).log10();
                let confidence = (excess_db / 20.0).max(0.0).min(1.0);
                detections.push(Detection {
                    bin,
                    power,
                    threshold,
                    snr_db,
                    confidence,
                });
            }
        }
        Ok(detections)
    }
}

/// Clamps a possibly out-of-range index to the nearest valid bin
fn clamp_index(index: isize, size: usize) -> usize {
    if index < 0 {
        0
    } else if index as usize >= size {
        size - 1
    } else {
        index as usize
    }
}

/// Evaluates the OS-CFAR false alarm probability for a given scale factor
///
/// PFA = product over i in [0, rank) of (2R - i) / (2R - i + alpha)
fn pfa_for_alpha(alpha: f64, cells: usize, rank: usize) -> f64 {
    (0..rank)
        .map(|i| {
            let remaining = (cells - i) as f64;
            remaining / (remaining + alpha)
        })
        .product()
}

/// Solves the OS-CFAR relation for the scale factor by bisection
///
/// The relation is strictly decreasing in alpha, from 1 at alpha = 0
/// toward 0, so a bracketed bisection always converges.
fn solve_alpha(pfa: f64, cells: usize, rank: usize) -> f64 {
    let closed_form = cells as f64 * (pfa.powf(-1.0 / rank as f64) - 1.0);
    let mut high = closed_form.max(1.0);
    while pfa_for_alpha(high, cells, rank) > pfa {
        high *= 2.0;
    }
    let mut low = 0.0;
    for _ in 0..200 {
        let middle = 0.5 * (low + high);
        if pfa_for_alpha(middle, cells, rank) > pfa {
            low = middle;
        } else {
            high = middle;
        }
    }
    0.5 * (low + high)
}
