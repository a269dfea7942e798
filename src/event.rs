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
//! Completed signal events
//!

/// An immutable record of one discovered signal event
///
/// Produced by the clustering engine when an active cluster times out, and
/// optionally enriched by the feature extractor before emission.
#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Event {
    /// Event start time, seconds from the start of the recording
    pub start_time: f64,
    /// Event end time, seconds from the start of the recording
    pub end_time: f64,
    /// Event duration in seconds
    pub duration: f64,
    /// Lowest triggered bin index
    pub min_bin: usize,
    /// Highest triggered bin index
    pub max_bin: usize,
    /// Center frequency in hertz, relative to the recording's tuned frequency
    pub center_frequency: f64,
    /// Estimated bandwidth in hertz
    pub bandwidth: f64,
    /// Largest single-detection SNR in decibels
    pub peak_snr_db: f64,
    /// Mean detection SNR in decibels
    pub avg_snr_db: f64,
    /// Peak bin power in dBFS
    pub peak_power_dbfs: f64,
    /// Number of detections absorbed into this event
    pub detections: u64,
    /// Overall confidence in [0, 1]
    pub confidence: f64,
    /// Coarse modulation guess
    pub modulation: String,
    /// Confidence of the modulation guess in [0, 1]
    pub modulation_confidence: f64,
}
